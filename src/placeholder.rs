//! Placeholder discovery and substitution for stage templates.
//!
//! A placeholder is the literal token `{agent-<identifier>}` where the identifier
//! is any run of characters other than `}`. Matching is purely lexical: braces that
//! don't start with `agent-` are left alone.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(agent-[^}]+)\}").expect("placeholder pattern is valid"));

/// Extract the distinct placeholders referenced by `text`, in order of first appearance.
///
/// Returned tokens keep the `agent-` prefix and drop the braces.
pub fn extract_placeholders(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_PATTERN.captures_iter(text) {
        let token = &caps[1];
        if !found.iter().any(|existing| existing == token) {
            found.push(token.to_string());
        }
    }
    found
}

/// Append the placeholders of `text` to `into`, skipping ones already present.
pub fn collect_placeholders(text: &str, into: &mut Vec<String>) {
    for token in extract_placeholders(text) {
        if !into.contains(&token) {
            into.push(token);
        }
    }
}

/// Placeholder → value bindings, kept in insertion order.
///
/// Only resolved placeholders belong here; an unresolved placeholder is simply
/// absent, which leaves its token untouched during substitution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedValues {
    entries: Vec<(String, String)>,
}

impl ResolvedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `placeholder` to `value`, replacing any earlier binding in place.
    pub fn insert(&mut self, placeholder: impl Into<String>, value: impl Into<String>) {
        let placeholder = placeholder.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == placeholder) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((placeholder, value)),
        }
    }

    #[cfg(test)]
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == placeholder)
            .map(|(_, value)| value.as_str())
    }

    #[cfg(test)]
    pub fn contains(&self, placeholder: &str) -> bool {
        self.get(placeholder).is_some()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.insert(k, v);
        }
        values
    }
}

/// Replace every `{placeholder}` occurrence in `content` with its bound value.
///
/// Placeholders without a binding are left as their literal token.
pub fn replace_placeholders(content: &str, resolved: &ResolvedValues) -> String {
    let mut result = content.to_string();
    for (placeholder, value) in resolved.iter() {
        let pattern = format!(r"\{{{}\}}", regex::escape(placeholder));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        result = re.replace_all(&result, NoExpand(value)).into_owned();
    }
    result
}
