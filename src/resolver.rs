//! Agent value resolution: which identifier each placeholder is bound to.
//!
//! A slot exists for every placeholder discovered in the current stage list.
//! Each slot holds a choice (unselected, a catalog or recent entry, or freeform
//! text) and resolves to a concrete value or to nothing.

use serde::{Deserialize, Serialize};

use crate::config::AgentsConfig;
use crate::placeholder::ResolvedValues;
use crate::stages::{Stage, detect_placeholders};

/// One preset agent offered for a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub name: String,
}

impl AgentEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn general_purpose() -> Self {
        Self::new("@general-purpose", "General Purpose Agent")
    }
}

/// Preset catalogs, one per agent role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKey {
    SpecWriters,
    Implementers,
    IssueExplorers,
    SystemArchitects,
    SeniorEngineers,
    CodeReviewers,
}

impl CatalogKey {
    pub const ALL: [CatalogKey; 6] = [
        CatalogKey::SpecWriters,
        CatalogKey::Implementers,
        CatalogKey::IssueExplorers,
        CatalogKey::SystemArchitects,
        CatalogKey::SeniorEngineers,
        CatalogKey::CodeReviewers,
    ];

    /// Key of this catalog in the `[agents]` config section.
    pub fn config_key(&self) -> &'static str {
        match self {
            CatalogKey::SpecWriters => "spec_writers",
            CatalogKey::Implementers => "implementers",
            CatalogKey::IssueExplorers => "issue_explorers",
            CatalogKey::SystemArchitects => "system_architects",
            CatalogKey::SeniorEngineers => "senior_engineers",
            CatalogKey::CodeReviewers => "code_reviewers",
        }
    }
}

/// Placeholders that come with a preset catalog. Anything else is freeform-only.
pub const AGENT_CATALOG_TABLE: [(&str, CatalogKey); 4] = [
    ("agent-仕様設計担当", CatalogKey::SpecWriters),
    ("agent-実装担当", CatalogKey::Implementers),
    ("agent-探索担当", CatalogKey::IssueExplorers),
    ("agent-コードレビュー担当", CatalogKey::CodeReviewers),
];

pub fn catalog_for(placeholder: &str) -> Option<CatalogKey> {
    AGENT_CATALOG_TABLE
        .iter()
        .find(|(p, _)| *p == placeholder)
        .map(|(_, key)| *key)
}

/// Display label: the placeholder without its `agent-` prefix.
pub fn placeholder_label(placeholder: &str) -> &str {
    placeholder.strip_prefix("agent-").unwrap_or(placeholder)
}

/// Normalize freeform input: trim, prefix `@` when missing. Blank input is unresolved.
pub fn normalize_freeform(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.starts_with('@') {
        Some(trimmed.to_string())
    } else {
        Some(format!("@{}", trimmed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgentChoice {
    #[default]
    Unselected,
    /// A catalog or recent entry, by identifier.
    Entry(String),
    /// Freeform text as typed, normalized only when resolved.
    Custom(String),
}

impl AgentChoice {
    pub fn value(&self) -> Option<String> {
        match self {
            AgentChoice::Unselected => None,
            AgentChoice::Entry(id) => {
                if id.trim().is_empty() {
                    None
                } else {
                    Some(id.clone())
                }
            }
            AgentChoice::Custom(text) => normalize_freeform(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSlot {
    pub placeholder: String,
    pub catalog: Option<CatalogKey>,
    pub choice: AgentChoice,
}

impl AgentSlot {
    pub fn label(&self) -> &str {
        placeholder_label(&self.placeholder)
    }
}

/// Entries of a slot's selector, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOption {
    Unselected,
    Recent(String),
    Preset(AgentEntry),
    Custom,
}

impl AgentOption {
    fn matches(&self, choice: &AgentChoice) -> bool {
        match (self, choice) {
            (AgentOption::Unselected, AgentChoice::Unselected) => true,
            (AgentOption::Recent(id), AgentChoice::Entry(chosen)) => id == chosen,
            (AgentOption::Preset(entry), AgentChoice::Entry(chosen)) => &entry.id == chosen,
            (AgentOption::Custom, AgentChoice::Custom(_)) => true,
            _ => false,
        }
    }
}

/// Per-document resolver state.
#[derive(Debug, Clone)]
pub struct AgentResolver {
    catalogs: AgentsConfig,
    recent: Vec<String>,
    slots: Vec<AgentSlot>,
}

impl AgentResolver {
    pub fn new(catalogs: AgentsConfig) -> Self {
        Self {
            catalogs,
            recent: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn catalog(&self, key: CatalogKey) -> &[AgentEntry] {
        self.catalogs.catalog(key)
    }

    /// Replace the preset catalogs. Existing choices are kept.
    pub fn set_catalogs(&mut self, catalogs: AgentsConfig) {
        self.catalogs = catalogs;
    }

    pub fn recent_agents(&self) -> &[String] {
        &self.recent
    }

    pub fn set_recent_agents(&mut self, recent: Vec<String>) {
        self.recent = recent;
    }

    pub fn slots(&self) -> &[AgentSlot] {
        &self.slots
    }

    pub fn slot(&self, placeholder: &str) -> Option<&AgentSlot> {
        self.slots.iter().find(|s| s.placeholder == placeholder)
    }

    fn slot_mut(&mut self, placeholder: &str) -> Option<&mut AgentSlot> {
        self.slots.iter_mut().find(|s| s.placeholder == placeholder)
    }

    /// Rebuild slots from the placeholders referenced by `stages`.
    ///
    /// Choices of placeholders still present survive; vanished ones are dropped.
    /// A newly seen placeholder with a non-empty catalog starts on its first entry.
    pub fn detect(&mut self, stages: &[Stage]) -> Vec<String> {
        let placeholders = detect_placeholders(stages);
        let mut previous = std::mem::take(&mut self.slots);

        self.slots = placeholders
            .iter()
            .map(|placeholder| {
                if let Some(pos) = previous.iter().position(|s| &s.placeholder == placeholder) {
                    return previous.swap_remove(pos);
                }
                let catalog = catalog_for(placeholder);
                let choice = catalog
                    .and_then(|key| self.catalogs.catalog(key).first())
                    .map(|entry| AgentChoice::Entry(entry.id.clone()))
                    .unwrap_or_default();
                AgentSlot {
                    placeholder: placeholder.clone(),
                    catalog,
                    choice,
                }
            })
            .collect();

        placeholders
    }

    /// Selector entries for `placeholder`: unselected, recent, presets, custom.
    ///
    /// A recent id that is also a preset of this slot is listed once, as the preset,
    /// so every entry maps to a distinct choice.
    pub fn options(&self, placeholder: &str) -> Vec<AgentOption> {
        let presets: &[AgentEntry] = match self.slot(placeholder).and_then(|s| s.catalog) {
            Some(key) => self.catalog(key),
            None => &[],
        };
        let mut options = vec![AgentOption::Unselected];
        for id in &self.recent {
            let listed = options.iter().any(|o| matches!(o, AgentOption::Recent(r) if r == id));
            if !listed && !presets.iter().any(|e| &e.id == id) {
                options.push(AgentOption::Recent(id.clone()));
            }
        }
        options.extend(presets.iter().cloned().map(AgentOption::Preset));
        options.push(AgentOption::Custom);
        options
    }

    /// Set the choice for a placeholder. Returns false if no such slot exists.
    pub fn select(&mut self, placeholder: &str, choice: AgentChoice) -> bool {
        match self.slot_mut(placeholder) {
            Some(slot) => {
                slot.choice = choice;
                true
            }
            None => false,
        }
    }

    /// Step the choice through the selector entries, wrapping at both ends.
    pub fn cycle_choice(&mut self, placeholder: &str, forward: bool) -> bool {
        let options = self.options(placeholder);
        let Some(slot) = self.slot_mut(placeholder) else {
            return false;
        };
        let current = options
            .iter()
            .position(|o| o.matches(&slot.choice))
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % options.len()
        } else {
            (current + options.len() - 1) % options.len()
        };
        slot.choice = match &options[next] {
            AgentOption::Unselected => AgentChoice::Unselected,
            AgentOption::Recent(id) => AgentChoice::Entry(id.clone()),
            AgentOption::Preset(entry) => AgentChoice::Entry(entry.id.clone()),
            AgentOption::Custom => match &slot.choice {
                AgentChoice::Custom(text) => AgentChoice::Custom(text.clone()),
                _ => AgentChoice::Custom(String::new()),
            },
        };
        true
    }

    /// Freeform text of a slot, switching it to custom first.
    pub fn custom_text_mut(&mut self, placeholder: &str) -> Option<&mut String> {
        let slot = self.slot_mut(placeholder)?;
        if !matches!(slot.choice, AgentChoice::Custom(_)) {
            slot.choice = AgentChoice::Custom(String::new());
        }
        match &mut slot.choice {
            AgentChoice::Custom(text) => Some(text),
            _ => None,
        }
    }

    /// Bind a raw value: a known catalog or recent id is an entry, anything else freeform.
    pub fn bind_value(&mut self, placeholder: &str, raw: &str) -> bool {
        let raw = raw.trim();
        let known = self
            .options(placeholder)
            .iter()
            .any(|o| matches!(o, AgentOption::Preset(e) if e.id == raw))
            || self.recent.iter().any(|r| r == raw);
        let choice = if raw.is_empty() {
            AgentChoice::Unselected
        } else if known {
            AgentChoice::Entry(raw.to_string())
        } else {
            AgentChoice::Custom(raw.to_string())
        };
        self.select(placeholder, choice)
    }

    #[allow(dead_code)]
    pub fn get_value(&self, placeholder: &str) -> Option<String> {
        self.slot(placeholder).and_then(|s| s.choice.value())
    }

    /// Resolved values only, in discovery order.
    pub fn all_values(&self) -> ResolvedValues {
        self.slots
            .iter()
            .filter_map(|s| s.choice.value().map(|v| (s.placeholder.clone(), v)))
            .collect()
    }

    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            slot.choice = AgentChoice::Unselected;
        }
    }
}
