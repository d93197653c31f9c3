//! Persistent key-value storage and the stage store built on top of it.
//!
//! The storage service is an opaque get/set/clear-by-key store of JSON values.
//! `SqliteStorage` backs the real application; `MemoryStorage` is the test double.
//! Stage lists that predate substage support are discarded wholesale in favor of
//! the shipped defaults, and the stale stored copy is cleared.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::stages::{DocumentType, Stage, is_current_schema};
use crate::templates::default_stages;

pub const REQUIREMENTS_STAGES_KEY: &str = "instantReq.requirementsStages";
pub const ISSUES_STAGES_KEY: &str = "instantReq.issuesStages";
pub const RECENT_AGENTS_KEY: &str = "instantReq.recentAgents";

/// Default cap on the recent agents history.
pub const DEFAULT_RECENT_AGENTS_LIMIT: usize = 10;

/// Storage key holding the stage list of `doc`.
pub fn stages_key(doc: DocumentType) -> &'static str {
    match doc {
        DocumentType::Requirements => REQUIREMENTS_STAGES_KEY,
        DocumentType::Issues => ISSUES_STAGES_KEY,
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid stored value: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque key-value store of JSON values.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
";

/// SQLite-backed storage: one row per key, values stored as JSON text.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(path = ?parent, error = %e, "storage_dir_create_failed");
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = ?path, "storage_opened");
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let text = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
            params![key, text],
        )?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory storage that records which keys were cleared.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RefCell<HashMap<String, Value>>,
    cleared: RefCell<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys passed to `clear`, in call order.
    #[cfg(test)]
    pub fn cleared_keys(&self) -> Vec<String> {
        self.cleared.borrow().clone()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.values.borrow_mut().remove(key);
        self.cleared.borrow_mut().push(key.to_string());
        Ok(())
    }
}

/// Where a loaded stage list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagesSource {
    /// Current-schema list read from storage.
    Stored,
    /// Nothing stored; shipped defaults used.
    Default,
    /// Stored list was stale or unreadable; cleared and replaced by defaults.
    Migrated,
}

/// Load the stage list for `doc`, applying the default and migration policy.
///
/// Storage errors are absorbed: the caller always gets a usable list.
pub fn load_stages(storage: &dyn Storage, doc: DocumentType) -> (Vec<Stage>, StagesSource) {
    let key = stages_key(doc);
    let raw = match storage.get(key) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(tab = %doc, error = %e, "stages_read_failed");
            return (default_stages(doc), StagesSource::Default);
        }
    };

    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        debug!(tab = %doc, "stages_not_stored");
        return (default_stages(doc), StagesSource::Default);
    };

    match serde_json::from_value::<Vec<Stage>>(raw) {
        Ok(stages) if is_current_schema(&stages) => (stages, StagesSource::Stored),
        Ok(_) => {
            info!(tab = %doc, "stale_stages_discarded");
            clear_stale(storage, doc);
            (default_stages(doc), StagesSource::Migrated)
        }
        Err(e) => {
            warn!(tab = %doc, error = %e, "stored_stages_unreadable");
            clear_stale(storage, doc);
            (default_stages(doc), StagesSource::Migrated)
        }
    }
}

fn clear_stale(storage: &dyn Storage, doc: DocumentType) {
    if let Err(e) = storage.clear(stages_key(doc)) {
        warn!(tab = %doc, error = %e, "stale_stages_clear_failed");
    }
}

/// Persist the stage list for `doc`.
pub fn save_stages(
    storage: &dyn Storage,
    doc: DocumentType,
    stages: &[Stage],
) -> Result<(), StoreError> {
    let value = serde_json::to_value(stages)?;
    storage.set(stages_key(doc), &value)?;
    info!(tab = %doc, count = stages.len(), "stages_saved");
    Ok(())
}

/// Clear the persisted stage list for `doc` and return the shipped defaults.
pub fn reset_stages(storage: &dyn Storage, doc: DocumentType) -> Vec<Stage> {
    if let Err(e) = storage.clear(stages_key(doc)) {
        warn!(tab = %doc, error = %e, "stages_reset_failed");
    } else {
        info!(tab = %doc, "stages_reset");
    }
    default_stages(doc)
}

/// Recently used freeform agents, most recent first.
pub fn load_recent_agents(storage: &dyn Storage) -> Vec<String> {
    match storage.get(RECENT_AGENTS_KEY) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(error = %e, "recent_agents_unreadable");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "recent_agents_read_failed");
            Vec::new()
        }
    }
}

/// Move `agent_id` to the front of `recent`, dropping duplicates and truncating.
pub fn push_recent(recent: &[String], agent_id: &str, limit: usize) -> Vec<String> {
    std::iter::once(agent_id.to_string())
        .chain(recent.iter().filter(|a| *a != agent_id).cloned())
        .take(limit)
        .collect()
}

/// Record `agent_id` in the persisted history and return the updated list.
pub fn save_recent_agent(storage: &dyn Storage, agent_id: &str, limit: usize) -> Vec<String> {
    let updated = push_recent(&load_recent_agents(storage), agent_id, limit);
    match serde_json::to_value(&updated) {
        Ok(value) => {
            if let Err(e) = storage.set(RECENT_AGENTS_KEY, &value) {
                warn!(error = %e, "recent_agents_write_failed");
            }
        }
        Err(e) => warn!(error = %e, "recent_agents_serialize_failed"),
    }
    debug!(agent = %agent_id, count = updated.len(), "recent_agent_saved");
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_falls_back_to_defaults_when_absent() {
        let storage = MemoryStorage::new();
        for doc in DocumentType::ALL {
            let (stages, source) = load_stages(&storage, doc);
            assert_eq!(source, StagesSource::Default);
            assert_eq!(stages, default_stages(doc));
        }
        assert!(storage.cleared_keys().is_empty());
    }

    #[test]
    fn test_load_discards_old_schema_and_clears_storage() {
        let storage = MemoryStorage::new();
        storage
            .set(
                REQUIREMENTS_STAGES_KEY,
                &json!([{"id": 1, "content": "old one"}, {"id": 2, "content": "old two"}]),
            )
            .unwrap();

        let (stages, source) = load_stages(&storage, DocumentType::Requirements);
        assert_eq!(source, StagesSource::Migrated);
        assert_eq!(stages, default_stages(DocumentType::Requirements));
        assert_eq!(storage.cleared_keys(), vec![REQUIREMENTS_STAGES_KEY]);
        assert!(!storage.contains(REQUIREMENTS_STAGES_KEY));
    }

    #[test]
    fn test_load_keeps_list_when_any_stage_has_marker() {
        let storage = MemoryStorage::new();
        storage
            .set(
                ISSUES_STAGES_KEY,
                &json!([{"id": 1, "content": "a"}, {"id": 2, "content": "b", "substages": []}]),
            )
            .unwrap();
        let (stages, source) = load_stages(&storage, DocumentType::Issues);
        assert_eq!(source, StagesSource::Stored);
        assert_eq!(stages.len(), 2);
        assert!(storage.cleared_keys().is_empty());
    }

    #[test]
    fn test_load_treats_empty_stored_list_as_stale() {
        let storage = MemoryStorage::new();
        storage.set(ISSUES_STAGES_KEY, &json!([])).unwrap();
        let (stages, source) = load_stages(&storage, DocumentType::Issues);
        assert_eq!(source, StagesSource::Migrated);
        assert_eq!(stages, default_stages(DocumentType::Issues));
    }

    #[test]
    fn test_load_unparseable_value_is_discarded() {
        let storage = MemoryStorage::new();
        storage
            .set(REQUIREMENTS_STAGES_KEY, &json!({"not": "a list"}))
            .unwrap();
        let (_, source) = load_stages(&storage, DocumentType::Requirements);
        assert_eq!(source, StagesSource::Migrated);
        assert_eq!(storage.cleared_keys(), vec![REQUIREMENTS_STAGES_KEY]);
    }

    #[test]
    fn test_migration_only_touches_its_own_type() {
        let storage = MemoryStorage::new();
        storage
            .set(REQUIREMENTS_STAGES_KEY, &json!([{"id": 1, "content": "old"}]))
            .unwrap();
        save_stages(&storage, DocumentType::Issues, &[Stage::new(9, "kept")]).unwrap();

        load_stages(&storage, DocumentType::Requirements);
        let (issues, source) = load_stages(&storage, DocumentType::Issues);
        assert_eq!(source, StagesSource::Stored);
        assert_eq!(issues, vec![Stage::new(9, "kept")]);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let storage = MemoryStorage::new();
        let stages = vec![Stage::new(5, "Do {agent-x}")];
        save_stages(&storage, DocumentType::Requirements, &stages).unwrap();
        let (loaded, source) = load_stages(&storage, DocumentType::Requirements);
        assert_eq!(source, StagesSource::Stored);
        assert_eq!(loaded, stages);
    }

    #[test]
    fn test_reset_clears_and_returns_defaults() {
        let storage = MemoryStorage::new();
        save_stages(&storage, DocumentType::Issues, &[Stage::new(1, "custom")]).unwrap();
        let stages = reset_stages(&storage, DocumentType::Issues);
        assert_eq!(stages, default_stages(DocumentType::Issues));
        assert_eq!(storage.cleared_keys(), vec![ISSUES_STAGES_KEY]);
        let (_, source) = load_stages(&storage, DocumentType::Issues);
        assert_eq!(source, StagesSource::Default);
    }

    #[test]
    fn test_push_recent_dedupes_and_caps() {
        let recent: Vec<String> = (0..10).map(|i| format!("@a{i}")).collect();
        let updated = push_recent(&recent, "@a5", 10);
        assert_eq!(updated[0], "@a5");
        assert_eq!(updated.len(), 10);
        assert_eq!(updated.iter().filter(|a| *a == "@a5").count(), 1);

        let updated = push_recent(&recent, "@new", 10);
        assert_eq!(updated[0], "@new");
        assert_eq!(updated.len(), 10);
        assert!(!updated.contains(&"@a9".to_string()));
    }

    #[test]
    fn test_save_recent_agent_persists() {
        let storage = MemoryStorage::new();
        save_recent_agent(&storage, "@one", 10);
        let updated = save_recent_agent(&storage, "@two", 10);
        assert_eq!(updated, vec!["@two", "@one"]);
        assert_eq!(load_recent_agents(&storage), vec!["@two", "@one"]);
    }

    #[test]
    fn test_sqlite_storage_get_set_clear() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(storage.get("k").unwrap().is_none());
        storage.set("k", &json!(["a", "b"])).unwrap();
        assert_eq!(storage.get("k").unwrap(), Some(json!(["a", "b"])));
        storage.set("k", &json!(["c"])).unwrap();
        assert_eq!(storage.get("k").unwrap(), Some(json!(["c"])));
        storage.clear("k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_storage_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            save_stages(&storage, DocumentType::Requirements, &[Stage::new(1, "x")]).unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        let (stages, source) = load_stages(&storage, DocumentType::Requirements);
        assert_eq!(source, StagesSource::Stored);
        assert_eq!(stages, vec![Stage::new(1, "x")]);
    }
}
