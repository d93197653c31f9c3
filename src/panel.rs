//! Panel state and the actions that drive it.
//!
//! Each document type keeps its own items, agent choices, stages and output.
//! Host responses are applied to whatever state is current when they arrive.

use tracing::{debug, info};

use crate::config::AgentsConfig;
use crate::host::{HostEvent, HostLink, HostRequest};
use crate::render::render;
use crate::resolver::AgentResolver;
use crate::stages::{DocumentType, Stage, StageList};
use crate::templates::default_stages;

/// Everything one tab owns.
#[derive(Debug, Clone)]
pub struct DocumentState {
    pub items: Vec<String>,
    pub resolver: AgentResolver,
    pub stages: Vec<Stage>,
    /// Last rendered document.
    pub generated: String,
    /// Output as shown, possibly edited by the user.
    pub output: String,
    pub output_visible: bool,
}

impl DocumentState {
    fn new(doc: DocumentType, agents: AgentsConfig) -> Self {
        let stages = default_stages(doc);
        let mut resolver = AgentResolver::new(agents);
        resolver.detect(&stages);
        Self {
            items: vec![String::new()],
            resolver,
            stages,
            generated: String::new(),
            output: String::new(),
            output_visible: false,
        }
    }

    fn set_stages(&mut self, stages: Vec<Stage>) {
        self.stages = stages;
        self.resolver.detect(&self.stages);
    }
}

/// Working copy of one tab's stages while the editor is open.
#[derive(Debug, Clone)]
pub struct StageEditor {
    pub tab: DocumentType,
    pub list: StageList,
}

pub struct Panel {
    current: DocumentType,
    requirements: DocumentState,
    issues: DocumentState,
    host: HostLink,
    stage_editor: Option<StageEditor>,
    notice: Option<String>,
}

impl Panel {
    /// Build the panel on shipped defaults and ask the host for persisted state.
    pub fn new(host: HostLink, agents: AgentsConfig) -> Self {
        let panel = Self {
            current: DocumentType::Requirements,
            requirements: DocumentState::new(DocumentType::Requirements, agents.clone()),
            issues: DocumentState::new(DocumentType::Issues, agents),
            host,
            stage_editor: None,
            notice: None,
        };
        panel.host.send(HostRequest::LoadStages);
        panel
    }

    pub fn current(&self) -> DocumentType {
        self.current
    }

    pub fn switch_tab(&mut self, doc: DocumentType) {
        if self.current != doc {
            debug!(tab = %doc, "tab_switched");
            self.current = doc;
        }
    }

    pub fn document(&self, doc: DocumentType) -> &DocumentState {
        match doc {
            DocumentType::Requirements => &self.requirements,
            DocumentType::Issues => &self.issues,
        }
    }

    pub fn document_mut(&mut self, doc: DocumentType) -> &mut DocumentState {
        match doc {
            DocumentType::Requirements => &mut self.requirements,
            DocumentType::Issues => &mut self.issues,
        }
    }

    pub fn active(&self) -> &DocumentState {
        self.document(self.current)
    }

    pub fn active_mut(&mut self) -> &mut DocumentState {
        self.document_mut(self.current)
    }

    /// Append an empty item row, returning its index.
    pub fn add_item(&mut self) -> usize {
        let items = &mut self.active_mut().items;
        items.push(String::new());
        items.len() - 1
    }

    /// Remove an item row. The last remaining row is kept.
    pub fn remove_item(&mut self, index: usize) -> bool {
        let items = &mut self.active_mut().items;
        if items.len() <= 1 || index >= items.len() {
            return false;
        }
        items.remove(index);
        true
    }

    pub fn set_item(&mut self, index: usize, text: impl Into<String>) -> bool {
        match self.active_mut().items.get_mut(index) {
            Some(item) => {
                *item = text.into();
                true
            }
            None => false,
        }
    }

    /// Render the active tab. Returns false when there was nothing to render.
    pub fn generate(&mut self) -> bool {
        let doc = self.current;
        let state = self.document_mut(doc);
        let values = state.resolver.all_values();
        let text = render(&state.items, &state.stages, &values);
        if text.is_empty() {
            debug!(tab = %doc, "generate_skipped_no_items");
            return false;
        }

        state.generated = text.clone();
        state.output = text;
        state.output_visible = true;
        info!(tab = %doc, chars = state.generated.chars().count(), "document_generated");

        let freeform: Vec<String> = values
            .values()
            .filter(|v| v.starts_with('@'))
            .map(String::from)
            .collect();
        for agent_id in freeform {
            self.host.send(HostRequest::SaveRecentAgent { agent_id });
        }
        true
    }

    /// Send the shown output to the clipboard, falling back to the last render.
    pub fn copy(&mut self) -> bool {
        let state = self.active();
        let text = if state.output.is_empty() {
            state.generated.clone()
        } else {
            state.output.clone()
        };
        if text.is_empty() {
            return false;
        }
        self.host.send(HostRequest::CopyToClipboard { text });
        true
    }

    /// Reset the active tab to a single empty item with nothing selected.
    pub fn clear(&mut self) {
        let state = self.active_mut();
        state.items = vec![String::new()];
        state.resolver.clear_all();
        state.generated.clear();
        state.output.clear();
        state.output_visible = false;
        debug!(tab = %self.current, "panel_cleared");
    }

    pub fn stage_editor(&self) -> Option<&StageEditor> {
        self.stage_editor.as_ref()
    }

    pub fn stage_editor_mut(&mut self) -> Option<&mut StageEditor> {
        self.stage_editor.as_mut()
    }

    /// Open the stage editor on a copy of the active tab's stages.
    pub fn open_stage_editor(&mut self) {
        let tab = self.current;
        let list = StageList::new(self.document(tab).stages.clone());
        self.stage_editor = Some(StageEditor { tab, list });
    }

    /// Persist the working copy and re-detect placeholders for its tab only.
    pub fn save_stage_editor(&mut self) -> bool {
        let Some(editor) = self.stage_editor.take() else {
            return false;
        };
        let stages = editor.list.into_stages();
        self.host.send(HostRequest::SaveStages {
            stages: stages.clone(),
            tab_type: editor.tab,
        });
        self.document_mut(editor.tab).set_stages(stages);
        true
    }

    /// Ask the host to restore the shipped defaults for the editor's tab.
    pub fn reset_stage_editor(&mut self) -> bool {
        let Some(editor) = self.stage_editor.take() else {
            return false;
        };
        self.host.send(HostRequest::ResetStages {
            tab_type: editor.tab,
        });
        true
    }

    /// Close the editor, discarding the working copy.
    pub fn close_stage_editor(&mut self) {
        self.stage_editor = None;
    }

    /// Replace the agent catalogs of both tabs.
    pub fn set_agent_catalogs(&mut self, agents: &AgentsConfig) {
        for doc in DocumentType::ALL {
            self.document_mut(doc).resolver.set_catalogs(agents.clone());
        }
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn set_notice(&mut self, message: impl Into<String>) {
        self.notice = Some(message.into());
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::StagesLoaded {
                requirements_stages,
                issues_stages,
                recent_agents,
            } => {
                if let Some(recent) = recent_agents {
                    for doc in DocumentType::ALL {
                        self.document_mut(doc)
                            .resolver
                            .set_recent_agents(recent.clone());
                    }
                }
                if let (Some(requirements), Some(issues)) = (requirements_stages, issues_stages) {
                    self.requirements.set_stages(requirements);
                    self.issues.set_stages(issues);
                    debug!("stages_applied");
                }
            }
            HostEvent::Notice { message } => self.notice = Some(message),
        }
    }

    /// Apply every pending host event. Returns how many were applied.
    pub fn poll_host(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.host.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::RecordingClipboard;
    use crate::host::{HostEndpoint, HostService};
    use crate::resolver::AgentChoice;
    use crate::store::{ISSUES_STAGES_KEY, MemoryStorage, Storage};
    use serde_json::json;

    struct Harness {
        panel: Panel,
        endpoint: HostEndpoint,
        service: HostService,
        clipboard: RecordingClipboard,
    }

    impl Harness {
        fn with_storage(storage: MemoryStorage) -> Self {
            let (link, endpoint) = HostLink::pair();
            let clipboard = RecordingClipboard::new();
            let service = HostService::new(Box::new(storage), Box::new(clipboard.clone()), 10);
            let panel = Panel::new(link, AgentsConfig::default());
            Self {
                panel,
                endpoint,
                service,
                clipboard,
            }
        }

        fn new() -> Self {
            Self::with_storage(MemoryStorage::new())
        }

        /// Let the host answer everything queued, then apply the answers.
        fn round_trip(&mut self) {
            self.endpoint.pump(&mut self.service);
            self.panel.poll_host();
        }
    }

    #[test]
    fn test_new_panel_shows_defaults_before_host_answers() {
        let h = Harness::new();
        assert_eq!(h.panel.current(), DocumentType::Requirements);
        assert_eq!(
            h.panel.active().stages,
            default_stages(DocumentType::Requirements)
        );
        assert_eq!(h.panel.active().items, vec![String::new()]);
        assert!(!h.panel.active().resolver.slots().is_empty());
    }

    #[test]
    fn test_load_applies_stored_stages() {
        let storage = MemoryStorage::new();
        let stored = vec![Stage::new(1, "Look at {agent-探索担当}")];
        storage
            .set(ISSUES_STAGES_KEY, &serde_json::to_value(&stored).unwrap())
            .unwrap();
        let mut h = Harness::with_storage(storage);
        h.round_trip();

        assert_eq!(h.panel.document(DocumentType::Issues).stages, stored);
        let slots = h.panel.document(DocumentType::Issues).resolver.slots();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].placeholder, "agent-探索担当");
    }

    #[test]
    fn test_generate_renders_active_tab_and_records_freeform() {
        let mut h = Harness::new();
        h.round_trip();
        h.panel.set_item(0, "ログイン機能");
        h.panel.active_mut().resolver.select(
            "agent-実装担当",
            AgentChoice::Custom("backend".into()),
        );

        assert!(h.panel.generate());
        let output = h.panel.active().output.clone();
        assert!(output.starts_with("1. "));
        assert!(output.contains("  - ログイン機能\n"));
        assert!(output.contains("@backend"));
        assert!(h.panel.active().output_visible);

        h.round_trip();
        let recent = h.panel.active().resolver.recent_agents().to_vec();
        assert_eq!(recent[0], "@general-purpose");
        assert!(recent.contains(&"@backend".to_string()));
        // History reaches the other tab too.
        assert_eq!(
            h.panel.document(DocumentType::Issues).resolver.recent_agents(),
            recent.as_slice()
        );
    }

    #[test]
    fn test_generate_without_items_is_a_no_op() {
        let mut h = Harness::new();
        h.panel.set_item(0, "   ");
        assert!(!h.panel.generate());
        assert!(h.panel.active().output.is_empty());
        assert!(!h.panel.active().output_visible);
        assert_eq!(h.endpoint.pump(&mut h.service), 1); // only the initial load
    }

    #[test]
    fn test_tabs_keep_separate_state() {
        let mut h = Harness::new();
        h.panel.set_item(0, "requirement");
        h.panel.switch_tab(DocumentType::Issues);
        assert_eq!(h.panel.active().items, vec![String::new()]);
        h.panel.set_item(0, "issue");
        h.panel.switch_tab(DocumentType::Requirements);
        assert_eq!(h.panel.active().items, vec!["requirement".to_string()]);
    }

    #[test]
    fn test_item_rows_keep_one_row() {
        let mut h = Harness::new();
        assert!(!h.panel.remove_item(0));
        assert_eq!(h.panel.add_item(), 1);
        assert!(h.panel.remove_item(0));
        assert!(!h.panel.remove_item(5));
        assert_eq!(h.panel.active().items.len(), 1);
        assert!(!h.panel.set_item(3, "x"));
    }

    #[test]
    fn test_copy_prefers_edited_output() {
        let mut h = Harness::new();
        assert!(!h.panel.copy());

        h.panel.set_item(0, "item");
        h.panel.generate();
        h.panel.active_mut().output = "edited".to_string();
        assert!(h.panel.copy());
        h.round_trip();
        assert_eq!(h.clipboard.contents(), vec!["edited"]);
        assert!(h.panel.notice().is_some());

        h.panel.active_mut().output.clear();
        h.panel.copy();
        h.round_trip();
        assert_eq!(
            h.clipboard.contents()[1],
            h.panel.active().generated.clone()
        );
    }

    #[test]
    fn test_clear_resets_active_tab_only() {
        let mut h = Harness::new();
        h.panel.set_item(0, "a");
        h.panel.add_item();
        h.panel.set_item(1, "b");
        h.panel.generate();
        h.panel.clear();

        let state = h.panel.active();
        assert_eq!(state.items, vec![String::new()]);
        assert!(state.resolver.all_values().is_empty());
        assert!(state.output.is_empty());
        assert!(!state.output_visible);

        assert!(
            !h.panel
                .document(DocumentType::Issues)
                .resolver
                .all_values()
                .is_empty()
        );
    }

    #[test]
    fn test_stage_editor_save_persists_and_redetects() {
        let mut h = Harness::new();
        h.round_trip();
        h.panel.open_stage_editor();
        {
            let editor = h.panel.stage_editor_mut().unwrap();
            assert_eq!(editor.tab, DocumentType::Requirements);
            let index = editor.list.len();
            editor.list.add_stage();
            editor
                .list
                .set_stage_content(index, "Finally ask {agent-new-role}");
        }
        assert!(h.panel.save_stage_editor());
        assert!(h.panel.stage_editor().is_none());
        assert!(h.panel.active().resolver.slot("agent-new-role").is_some());
        assert!(
            h.panel
                .document(DocumentType::Issues)
                .resolver
                .slot("agent-new-role")
                .is_none()
        );

        // Reloading from the host returns the saved list.
        h.panel.host.send(HostRequest::LoadStages);
        h.round_trip();
        assert!(h.panel.active().resolver.slot("agent-new-role").is_some());
        assert_eq!(
            h.panel.document(DocumentType::Issues).stages,
            default_stages(DocumentType::Issues)
        );
    }

    #[test]
    fn test_stage_editor_close_discards_working_copy() {
        let mut h = Harness::new();
        h.panel.open_stage_editor();
        if let Some(editor) = h.panel.stage_editor_mut() {
            editor.list.remove_stage(0);
        }
        h.panel.close_stage_editor();
        assert_eq!(
            h.panel.active().stages,
            default_stages(DocumentType::Requirements)
        );
        assert!(!h.panel.save_stage_editor());
    }

    #[test]
    fn test_stage_editor_reset_restores_defaults() {
        let storage = MemoryStorage::new();
        storage
            .set(
                ISSUES_STAGES_KEY,
                &json!([{"id": 1, "content": "mine", "substages": []}]),
            )
            .unwrap();
        let mut h = Harness::with_storage(storage);
        h.round_trip();
        h.panel.switch_tab(DocumentType::Issues);
        assert_eq!(h.panel.active().stages.len(), 1);

        h.panel.open_stage_editor();
        assert!(h.panel.reset_stage_editor());
        h.round_trip();
        assert_eq!(h.panel.active().stages, default_stages(DocumentType::Issues));
    }

    #[test]
    fn test_late_response_applies_to_current_context() {
        let mut h = Harness::new();
        h.panel.open_stage_editor();
        h.panel.switch_tab(DocumentType::Issues);
        // The load answer arrives while the editor is open on another tab.
        h.round_trip();
        let editor = h.panel.stage_editor().unwrap();
        assert_eq!(editor.tab, DocumentType::Requirements);
        assert_eq!(
            editor.list.stages(),
            default_stages(DocumentType::Requirements).as_slice()
        );
        assert_eq!(h.panel.current(), DocumentType::Issues);
    }

    #[test]
    fn test_partial_stages_loaded_updates_only_history() {
        let mut h = Harness::new();
        h.panel.handle_event(HostEvent::StagesLoaded {
            requirements_stages: Some(vec![Stage::new(1, "only one list")]),
            issues_stages: None,
            recent_agents: Some(vec!["@x".into()]),
        });
        assert_eq!(
            h.panel.active().stages,
            default_stages(DocumentType::Requirements)
        );
        assert_eq!(h.panel.active().resolver.recent_agents(), ["@x".to_string()]);
    }

    #[test]
    fn test_set_agent_catalogs_reaches_both_tabs() {
        let mut h = Harness::new();
        let mut agents = AgentsConfig::default();
        agents.implementers = vec![crate::resolver::AgentEntry::new("@impl", "Impl")];
        h.panel.set_agent_catalogs(&agents);
        for doc in DocumentType::ALL {
            assert_eq!(
                h.panel
                    .document(doc)
                    .resolver
                    .catalog(crate::resolver::CatalogKey::Implementers)[0]
                    .id,
                "@impl"
            );
        }
    }
}
