//! Modal dialog state and input handling.

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::debug;

use crate::app::{App, edit_text};
use crate::stages::StageList;

/// One editable row in the stage editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorRow {
    Stage(usize),
    Substage(usize, usize),
}

impl EditorRow {
    /// Index of the stage this row belongs to.
    pub fn stage_index(self) -> usize {
        match self {
            EditorRow::Stage(i) | EditorRow::Substage(i, _) => i,
        }
    }
}

/// Rows in display order: each stage followed by its substages.
pub fn editor_rows(list: &StageList) -> Vec<EditorRow> {
    list.stages()
        .iter()
        .enumerate()
        .flat_map(|(i, stage)| {
            std::iter::once(EditorRow::Stage(i))
                .chain((0..stage.substages().len()).map(move |j| EditorRow::Substage(i, j)))
        })
        .collect()
}

pub fn row_content(list: &StageList, row: EditorRow) -> Option<&str> {
    let stage = list.get(row.stage_index())?;
    match row {
        EditorRow::Stage(_) => Some(stage.content.as_str()),
        EditorRow::Substage(_, j) => stage.substages().get(j).map(|s| s.content.as_str()),
    }
}

fn row_content_mut(list: &mut StageList, row: EditorRow) -> Option<&mut String> {
    match row {
        EditorRow::Stage(i) => list.stage_content_mut(i),
        EditorRow::Substage(i, j) => list.substage_content_mut(i, j),
    }
}

/// State for the stage editor modal.
#[derive(Debug, Clone, Default)]
pub struct StageEditorModalState {
    /// Selected row index into `editor_rows`.
    pub selected: usize,
    /// Cursor position, in chars, within the selected row.
    pub cursor_pos: usize,
    /// Scroll offset for the row list.
    pub scroll_offset: usize,
}

impl StageEditorModalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_row(&self, list: &StageList) -> Option<EditorRow> {
        editor_rows(list).get(self.selected).copied()
    }

    /// Select a row and put the cursor at the end of its text.
    fn select(&mut self, list: &StageList, index: usize) {
        let rows = editor_rows(list);
        self.selected = index.min(rows.len().saturating_sub(1));
        self.cursor_pos = rows
            .get(self.selected)
            .and_then(|row| row_content(list, *row))
            .map(|c| c.chars().count())
            .unwrap_or(0);
    }

    fn select_row(&mut self, list: &StageList, row: EditorRow) {
        if let Some(index) = editor_rows(list).iter().position(|r| *r == row) {
            self.select(list, index);
        }
    }

    pub fn select_prev(&mut self, list: &StageList) {
        if self.selected > 0 {
            self.select(list, self.selected - 1);
        }
    }

    pub fn select_next(&mut self, list: &StageList) {
        self.select(list, self.selected + 1);
    }

    /// Ensure selected item is visible, adjusting scroll_offset if needed.
    pub fn ensure_visible(&mut self, visible_height: usize) {
        if visible_height == 0 {
            return;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + visible_height {
            self.scroll_offset = self.selected - visible_height + 1;
        }
    }
}

fn close_stage_editor(app: &mut App) {
    app.stage_editor_state = None;
    app.clamp_focus();
}

/// Handle keyboard input for the stage editor modal.
pub fn handle_stage_editor_input(app: &mut App, key_code: KeyCode, modifiers: KeyModifiers) {
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);
    let alt = modifiers.contains(KeyModifiers::ALT);

    match key_code {
        KeyCode::Esc => {
            app.panel.close_stage_editor();
            close_stage_editor(app);
            debug!("stage_editor_closed");
            return;
        }
        KeyCode::Char('s') if ctrl => {
            app.panel.save_stage_editor();
            close_stage_editor(app);
            return;
        }
        KeyCode::Char('r') if ctrl => {
            app.panel.reset_stage_editor();
            close_stage_editor(app);
            return;
        }
        _ => {}
    }

    let (Some(editor), Some(state)) = (
        app.panel.stage_editor_mut(),
        app.stage_editor_state.as_mut(),
    ) else {
        return;
    };
    let list = &mut editor.list;
    let selected = state.selected_row(list);

    match key_code {
        KeyCode::Char('a') if ctrl => {
            list.add_stage();
            let last = list.len() - 1;
            state.select_row(list, EditorRow::Stage(last));
        }
        KeyCode::Char('b') if ctrl => {
            if let Some(row) = selected {
                let i = row.stage_index();
                if list.add_substage(i).is_some() {
                    let j = list.get(i).map(|s| s.substages().len()).unwrap_or(1) - 1;
                    state.select_row(list, EditorRow::Substage(i, j));
                }
            }
        }
        KeyCode::Char('d') if ctrl => {
            let removed = match selected {
                Some(EditorRow::Stage(i)) => list.remove_stage(i),
                Some(EditorRow::Substage(i, j)) => list.remove_substage(i, j),
                None => false,
            };
            if removed {
                state.select(list, state.selected.saturating_sub(1));
            }
        }
        KeyCode::Up | KeyCode::Down if ctrl || alt => {
            if let Some(row) = selected {
                let from = row.stage_index();
                let to = if key_code == KeyCode::Up {
                    from.checked_sub(1)
                } else {
                    Some(from + 1)
                };
                if let Some(to) = to
                    && list.move_stage(from, to)
                {
                    state.select_row(list, EditorRow::Stage(to));
                }
            }
        }
        KeyCode::Up => state.select_prev(list),
        KeyCode::Down | KeyCode::Tab => state.select_next(list),
        KeyCode::Enter => {}
        _ if ctrl => {}
        _ => {
            if let Some(text) = selected.and_then(|row| row_content_mut(list, row)) {
                edit_text(text, &mut state.cursor_pos, key_code);
            }
        }
    }
}

/// Handle keyboard input for the help modal.
pub fn handle_help_modal_input(app: &mut App, key_code: KeyCode) {
    if matches!(key_code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Enter) {
        app.show_help_modal = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{Stage, Substage};

    fn sample_list() -> StageList {
        StageList::new(vec![
            Stage::new(1, "one").with_substages(vec![
                Substage {
                    id: 2,
                    content: "one-a".into(),
                },
                Substage {
                    id: 3,
                    content: "one-b".into(),
                },
            ]),
            Stage::new(4, "two"),
        ])
    }

    #[test]
    fn test_editor_rows_flatten_substages() {
        let list = sample_list();
        assert_eq!(
            editor_rows(&list),
            vec![
                EditorRow::Stage(0),
                EditorRow::Substage(0, 0),
                EditorRow::Substage(0, 1),
                EditorRow::Stage(1),
            ]
        );
        assert_eq!(row_content(&list, EditorRow::Substage(0, 1)), Some("one-b"));
        assert_eq!(row_content(&list, EditorRow::Substage(1, 0)), None);
    }

    #[test]
    fn test_selection_moves_and_clamps() {
        let list = sample_list();
        let mut state = StageEditorModalState::new();
        state.select_prev(&list);
        assert_eq!(state.selected, 0);
        for _ in 0..10 {
            state.select_next(&list);
        }
        assert_eq!(state.selected, 3);
        assert_eq!(state.selected_row(&list), Some(EditorRow::Stage(1)));
        assert_eq!(state.cursor_pos, 3);
    }

    #[test]
    fn test_ensure_visible() {
        let mut state = StageEditorModalState {
            selected: 7,
            ..Default::default()
        };
        state.ensure_visible(5);
        assert_eq!(state.scroll_offset, 3);
        state.selected = 1;
        state.ensure_visible(5);
        assert_eq!(state.scroll_offset, 1);
    }

    fn editor_app() -> App {
        use crate::clipboard::RecordingClipboard;
        use crate::config::{AgentsConfig, Config, ConfigLoadStatus, LoadedConfig};
        use crate::host::{HostLink, HostService};
        use crate::panel::Panel;
        use crate::store::MemoryStorage;

        let (link, endpoint) = HostLink::pair();
        let mut service = HostService::new(
            Box::new(MemoryStorage::new()),
            Box::new(RecordingClipboard::new()),
            10,
        );
        let panel = Panel::new(link, AgentsConfig::default());
        endpoint.pump(&mut service);
        let loaded = LoadedConfig {
            config: Config::default(),
            config_path: std::path::PathBuf::from("config.toml"),
            project_config_path: None,
            status: ConfigLoadStatus::Loaded,
        };
        let mut app = App::new(panel, loaded);
        app.poll_host();
        app.open_stage_editor();
        app
    }

    fn press(app: &mut App, key_code: KeyCode, modifiers: KeyModifiers) {
        handle_stage_editor_input(app, key_code, modifiers);
    }

    #[test]
    fn test_add_stage_type_and_save() {
        let mut app = editor_app();
        let before = app.panel.active().stages.len();
        press(&mut app, KeyCode::Char('a'), KeyModifiers::CONTROL);
        for c in "ask {agent-qa}".chars() {
            press(&mut app, KeyCode::Char(c), KeyModifiers::NONE);
        }
        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);

        assert!(app.stage_editor_state.is_none());
        let stages = &app.panel.active().stages;
        assert_eq!(stages.len(), before + 1);
        assert_eq!(stages[before].content, "ask {agent-qa}");
        assert!(app.panel.active().resolver.slot("agent-qa").is_some());
    }

    #[test]
    fn test_substage_add_remove_and_move() {
        let mut app = editor_app();
        press(&mut app, KeyCode::Char('b'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Char('x'), KeyModifiers::NONE);
        {
            let list = &app.panel.stage_editor().unwrap().list;
            assert_eq!(list.get(0).unwrap().substages().len(), 1);
            assert_eq!(list.get(0).unwrap().substages()[0].content, "x");
        }
        press(&mut app, KeyCode::Char('d'), KeyModifiers::CONTROL);
        assert!(
            app.panel.stage_editor().unwrap().list.get(0).unwrap().substages().is_empty()
        );

        let first = app.panel.stage_editor().unwrap().list.get(0).unwrap().id;
        press(&mut app, KeyCode::Down, KeyModifiers::ALT);
        let list = &app.panel.stage_editor().unwrap().list;
        assert_eq!(list.get(1).unwrap().id, first);
        assert_eq!(
            app.stage_editor_state.as_ref().unwrap().selected_row(list),
            Some(EditorRow::Stage(1))
        );
    }

    #[test]
    fn test_escape_discards_edits() {
        let mut app = editor_app();
        let before = app.panel.active().stages.clone();
        press(&mut app, KeyCode::Char('d'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.panel.stage_editor().is_none());
        assert_eq!(app.panel.active().stages, before);
    }

    #[test]
    fn test_stage_index_of_rows() {
        assert_eq!(EditorRow::Stage(2).stage_index(), 2);
        assert_eq!(EditorRow::Substage(1, 4).stage_index(), 1);
    }
}
