//! Stage data model and in-place list operations.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::placeholder::collect_placeholders;

/// The two independent document contexts, each with its own stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Requirements,
    Issues,
}

impl DocumentType {
    pub const ALL: [DocumentType; 2] = [DocumentType::Requirements, DocumentType::Issues];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Issues => "issues",
        }
    }

    /// Tab label shown in the panel.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Requirements => "Requirements",
            Self::Issues => "Issues",
        }
    }

    /// Hint shown in an empty item row.
    pub fn item_hint(&self) -> &'static str {
        match self {
            Self::Requirements => "機能要件を入力",
            Self::Issues => "課題を入力",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Self::Requirements => Self::Issues,
            Self::Issues => Self::Requirements,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "requirements" => Some(Self::Requirements),
            "issues" => Some(Self::Issues),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bullet-level sub-instruction nested under a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substage {
    pub id: i64,
    pub content: String,
}

/// One numbered instruction unit of the generated document.
///
/// `substages` stays an `Option` so that a stored record without the key can be
/// told apart from one with an empty list: the key is the schema marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substages: Option<Vec<Substage>>,
}

impl Stage {
    pub fn new(id: i64, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            substages: Some(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn with_substages(mut self, substages: Vec<Substage>) -> Self {
        self.substages = Some(substages);
        self
    }

    /// Substages in order; empty when the list is absent.
    pub fn substages(&self) -> &[Substage] {
        self.substages.as_deref().unwrap_or(&[])
    }

    /// Whether this record carries the `substages` key.
    pub fn has_substages_marker(&self) -> bool {
        self.substages.is_some()
    }
}

/// Whether a loaded stage list uses the current schema.
///
/// A list is current when at least one stage carries the `substages` key.
/// An empty list is treated as stale.
pub fn is_current_schema(stages: &[Stage]) -> bool {
    stages.iter().any(Stage::has_substages_marker)
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Ordered, mutable stage list for one document type.
///
/// Fresh ids come from the wall clock in milliseconds, bumped past the largest id
/// already handed out so two additions within the same tick never collide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageList {
    stages: Vec<Stage>,
    last_id: i64,
}

impl StageList {
    pub fn new(stages: Vec<Stage>) -> Self {
        let last_id = max_id(&stages);
        Self { stages, last_id }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn into_stages(self) -> Vec<Stage> {
        self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    fn next_id(&mut self) -> i64 {
        let id = now_millis().max(self.last_id + 1);
        self.last_id = id;
        id
    }

    /// Append an empty stage and return its id.
    pub fn add_stage(&mut self) -> i64 {
        let id = self.next_id();
        self.stages.push(Stage::new(id, ""));
        id
    }

    /// Remove the stage at `index`. Returns false when out of range.
    pub fn remove_stage(&mut self, index: usize) -> bool {
        if index >= self.stages.len() {
            return false;
        }
        self.stages.remove(index);
        true
    }

    /// Append an empty substage to the stage at `stage_index`, returning its id.
    pub fn add_substage(&mut self, stage_index: usize) -> Option<i64> {
        if stage_index >= self.stages.len() {
            return None;
        }
        let id = self.next_id();
        self.stages[stage_index]
            .substages
            .get_or_insert_with(Vec::new)
            .push(Substage {
                id,
                content: String::new(),
            });
        Some(id)
    }

    /// Remove one substage. Returns false when either index is out of range.
    pub fn remove_substage(&mut self, stage_index: usize, substage_index: usize) -> bool {
        let Some(substages) = self
            .stages
            .get_mut(stage_index)
            .and_then(|s| s.substages.as_mut())
        else {
            return false;
        };
        if substage_index >= substages.len() {
            return false;
        }
        substages.remove(substage_index);
        true
    }

    /// Move a stage from `from` to `to`, shifting the stages in between.
    /// Substages travel with their parent.
    pub fn move_stage(&mut self, from: usize, to: usize) -> bool {
        if from >= self.stages.len() || to >= self.stages.len() {
            return false;
        }
        if from != to {
            let stage = self.stages.remove(from);
            self.stages.insert(to, stage);
        }
        true
    }

    pub fn set_stage_content(&mut self, index: usize, content: impl Into<String>) -> bool {
        match self.stages.get_mut(index) {
            Some(stage) => {
                stage.content = content.into();
                true
            }
            None => false,
        }
    }

    #[allow(dead_code)]
    pub fn set_stage_content_by_id(&mut self, id: i64, content: impl Into<String>) -> bool {
        match self.stages.iter_mut().find(|s| s.id == id) {
            Some(stage) => {
                stage.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn set_substage_content(
        &mut self,
        stage_index: usize,
        substage_index: usize,
        content: impl Into<String>,
    ) -> bool {
        let substage = self
            .stages
            .get_mut(stage_index)
            .and_then(|s| s.substages.as_mut())
            .and_then(|subs| subs.get_mut(substage_index));
        match substage {
            Some(sub) => {
                sub.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn stage_content_mut(&mut self, index: usize) -> Option<&mut String> {
        self.stages.get_mut(index).map(|s| &mut s.content)
    }

    pub fn substage_content_mut(
        &mut self,
        stage_index: usize,
        substage_index: usize,
    ) -> Option<&mut String> {
        self.stages
            .get_mut(stage_index)
            .and_then(|s| s.substages.as_mut())
            .and_then(|subs| subs.get_mut(substage_index))
            .map(|sub| &mut sub.content)
    }

    /// All placeholders referenced by the list: stages top to bottom, main content
    /// before its substages, first occurrence wins.
    pub fn placeholders(&self) -> Vec<String> {
        detect_placeholders(&self.stages)
    }
}

/// Aggregate placeholders across a stage list in discovery order.
pub fn detect_placeholders(stages: &[Stage]) -> Vec<String> {
    let mut found = Vec::new();
    for stage in stages {
        collect_placeholders(&stage.content, &mut found);
        for sub in stage.substages() {
            collect_placeholders(&sub.content, &mut found);
        }
    }
    found
}

fn max_id(stages: &[Stage]) -> i64 {
    stages
        .iter()
        .flat_map(|s| std::iter::once(s.id).chain(s.substages().iter().map(|sub| sub.id)))
        .max()
        .unwrap_or(0)
}
