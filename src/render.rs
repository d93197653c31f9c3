//! Document rendering from items, stages and resolved agent values.

use crate::placeholder::{ResolvedValues, replace_placeholders};
use crate::stages::Stage;

/// Trim items and drop the empty ones.
pub fn normalize_items<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.as_ref().trim())
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Render the instruction document.
///
/// Stages are numbered from 1. The item list is nested as bullets directly under
/// the first stage only, followed by that stage's substages. Every line ends with
/// a newline. Returns an empty string when no non-blank item is present, whatever
/// the stages contain.
pub fn render<S: AsRef<str>>(items: &[S], stages: &[Stage], resolved: &ResolvedValues) -> String {
    let items = normalize_items(items);
    if items.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    for (index, stage) in stages.iter().enumerate() {
        let content = replace_placeholders(&stage.content, resolved);
        out.push_str(&format!("{}. {}\n", index + 1, content));

        if index == 0 {
            for item in &items {
                out.push_str(&format!("  - {}\n", item));
            }
        }

        for sub in stage.substages() {
            let content = replace_placeholders(&sub.content, resolved);
            out.push_str(&format!("  - {}\n", content));
        }
    }
    out
}
