//! Application state and main-view input handling.

use std::path::PathBuf;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigWatcher, LoadedConfig, reload_config};
use crate::logging::{self, ReloadHandle};
use crate::modals::StageEditorModalState;
use crate::panel::Panel;
use crate::resolver::AgentChoice;

/// Which row of the main view has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Item(usize),
    Agent(usize),
    Output,
}

/// Main application state.
pub struct App {
    pub panel: Panel,
    pub focus: Focus,
    /// Cursor position, in chars, within the focused text.
    pub cursor_pos: usize,
    /// Whether the output pane accepts typing.
    pub editing_output: bool,
    pub output_scroll: u16,
    pub should_quit: bool,
    pub session_id: Option<String>,
    pub log_directory: Option<PathBuf>,
    pub logging_error: Option<String>,
    /// Loaded configuration.
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    /// Load error from startup, shown until the next successful reload.
    pub config_error: Option<String>,
    pub config_watcher: Option<ConfigWatcher>,
    /// When config was last successfully reloaded (for "Reloaded" indicator fade).
    pub config_reloaded_at: Option<Instant>,
    pub log_level_handle: Option<ReloadHandle>,
    /// Current log level from config (to detect changes on reload).
    pub current_log_level: String,
    pub stage_editor_state: Option<StageEditorModalState>,
    pub show_help_modal: bool,
}

impl App {
    pub fn new(panel: Panel, loaded_config: LoadedConfig) -> Self {
        let config_error = match &loaded_config.status {
            crate::config::ConfigLoadStatus::Error(e) => Some(e.clone()),
            _ => None,
        };
        Self {
            panel,
            focus: Focus::Item(0),
            cursor_pos: 0,
            editing_output: false,
            output_scroll: 0,
            should_quit: false,
            session_id: None,
            log_directory: None,
            logging_error: None,
            current_log_level: loaded_config.config.logging.level.clone(),
            config: loaded_config.config,
            config_path: loaded_config.config_path,
            project_config_path: loaded_config.project_config_path,
            config_error,
            config_watcher: None,
            config_reloaded_at: None,
            log_level_handle: None,
            stage_editor_state: None,
            show_help_modal: false,
        }
    }

    /// Number of focusable rows: items, agents, then output when visible.
    fn row_count(&self) -> usize {
        let state = self.panel.active();
        state.items.len() + state.resolver.slots().len() + usize::from(state.output_visible)
    }

    fn focus_index(&self) -> usize {
        let items = self.panel.active().items.len();
        match self.focus {
            Focus::Item(i) => i,
            Focus::Agent(i) => items + i,
            Focus::Output => self.row_count().saturating_sub(1),
        }
    }

    fn focus_from_index(&self, index: usize) -> Focus {
        let state = self.panel.active();
        let items = state.items.len();
        let agents = state.resolver.slots().len();
        if index < items {
            Focus::Item(index)
        } else if index < items + agents {
            Focus::Agent(index - items)
        } else {
            Focus::Output
        }
    }

    /// Text under focus, if the focused row holds editable text.
    pub fn focused_text(&self) -> Option<&str> {
        let state = self.panel.active();
        match self.focus {
            Focus::Item(i) => state.items.get(i).map(String::as_str),
            Focus::Agent(i) => match state.resolver.slots().get(i).map(|s| &s.choice) {
                Some(AgentChoice::Custom(text)) => Some(text.as_str()),
                _ => None,
            },
            Focus::Output if self.editing_output => Some(state.output.as_str()),
            Focus::Output => None,
        }
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.cursor_pos = self
            .focused_text()
            .map(|t| t.chars().count())
            .unwrap_or(0);
    }

    pub fn focus_next(&mut self) {
        let count = self.row_count();
        if count == 0 {
            return;
        }
        let next = (self.focus_index() + 1) % count;
        self.set_focus(self.focus_from_index(next));
    }

    pub fn focus_prev(&mut self) {
        let count = self.row_count();
        if count == 0 {
            return;
        }
        let prev = (self.focus_index() + count - 1) % count;
        self.set_focus(self.focus_from_index(prev));
    }

    /// Pull focus back onto an existing row after the layout changed.
    pub fn clamp_focus(&mut self) {
        let index = self.focus_index().min(self.row_count().saturating_sub(1));
        let focus = self.focus_from_index(index);
        if focus != self.focus {
            self.set_focus(focus);
        } else if let Some(text) = self.focused_text() {
            self.cursor_pos = self.cursor_pos.min(text.chars().count());
        }
    }

    /// Mutable text under focus; agent rows switch to custom entry.
    fn focused_text_mut(&mut self) -> Option<&mut String> {
        let editing_output = self.editing_output;
        let focus = self.focus;
        let state = self.panel.active_mut();
        match focus {
            Focus::Item(i) => state.items.get_mut(i),
            Focus::Agent(i) => {
                let placeholder = state.resolver.slots().get(i)?.placeholder.clone();
                state.resolver.custom_text_mut(&placeholder)
            }
            Focus::Output if editing_output => Some(&mut state.output),
            Focus::Output => None,
        }
    }

    fn cycle_focused_agent(&mut self, forward: bool) {
        let Focus::Agent(i) = self.focus else {
            return;
        };
        let resolver = &mut self.panel.active_mut().resolver;
        if let Some(placeholder) = resolver.slots().get(i).map(|s| s.placeholder.clone()) {
            resolver.cycle_choice(&placeholder, forward);
        }
        self.set_focus(self.focus);
    }

    pub fn switch_tab(&mut self) {
        let next = self.panel.current().toggle();
        self.panel.switch_tab(next);
        self.editing_output = false;
        self.output_scroll = 0;
        self.set_focus(Focus::Item(0));
    }

    pub fn open_stage_editor(&mut self) {
        self.panel.open_stage_editor();
        self.stage_editor_state = Some(StageEditorModalState::new());
        debug!(tab = %self.panel.current(), "stage_editor_opened");
    }

    /// Apply host events and refocus if the rows changed underneath.
    pub fn poll_host(&mut self) {
        if self.panel.poll_host() > 0 {
            self.clamp_focus();
        }
    }

    /// Reload config when the watcher reports a change.
    pub fn poll_config(&mut self) {
        let changed = self
            .config_watcher
            .as_ref()
            .map(|w| w.changed())
            .unwrap_or(false);
        if !changed {
            return;
        }

        let reloaded = reload_config(&self.config_path, self.project_config_path.as_deref());
        let new_level = reloaded.config.logging.level.clone();
        if new_level != self.current_log_level
            && let Some(ref handle) = self.log_level_handle
        {
            match logging::update_log_level(handle, &new_level) {
                Ok(()) => {
                    debug!(
                        old_level = %self.current_log_level,
                        new_level = %new_level,
                        "log_level_updated"
                    );
                    self.current_log_level = new_level;
                }
                Err(e) => warn!(error = %e, "log_level_update_failed"),
            }
        }

        if reloaded.config.agents != self.config.agents {
            self.panel.set_agent_catalogs(&reloaded.config.agents);
            info!("agent_catalogs_reloaded");
        }
        if reloaded.config.storage != self.config.storage {
            // The host keeps its open database until restart.
            warn!("storage_path_change_needs_restart");
        }

        self.config_error = reloaded.global_error.or(reloaded.project_error);
        if self.config_error.is_none() {
            self.config_reloaded_at = Some(Instant::now());
        }
        self.config = reloaded.config;
    }
}

/// Apply an editing key to `text` at char position `cursor`.
/// Returns true when the key was consumed.
pub fn edit_text(text: &mut String, cursor: &mut usize, key_code: KeyCode) -> bool {
    let len = text.chars().count();
    *cursor = (*cursor).min(len);
    match key_code {
        KeyCode::Char(c) => {
            let at = byte_index(text, *cursor);
            text.insert(at, c);
            *cursor += 1;
        }
        KeyCode::Backspace => {
            if *cursor > 0 {
                let at = byte_index(text, *cursor - 1);
                text.remove(at);
                *cursor -= 1;
            }
        }
        KeyCode::Delete => {
            if *cursor < len {
                let at = byte_index(text, *cursor);
                text.remove(at);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(len),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = len,
        _ => return false,
    }
    true
}

fn byte_index(text: &str, char_pos: usize) -> usize {
    text.char_indices()
        .nth(char_pos)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Handle keyboard input for the main view.
pub fn handle_main_input(app: &mut App, key_code: KeyCode, modifiers: KeyModifiers) {
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);

    if ctrl {
        match key_code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char('t') => app.switch_tab(),
            KeyCode::Char('n') => {
                let index = app.panel.add_item();
                app.set_focus(Focus::Item(index));
            }
            KeyCode::Char('d') => {
                if let Focus::Item(i) = app.focus
                    && app.panel.remove_item(i)
                {
                    app.set_focus(Focus::Item(i.saturating_sub(1)));
                }
            }
            KeyCode::Char('g') => {
                if app.panel.generate() {
                    app.editing_output = false;
                    app.output_scroll = 0;
                } else {
                    app.panel.set_notice("Nothing to generate: enter at least one item");
                }
            }
            KeyCode::Char('y') => {
                if !app.panel.copy() {
                    app.panel.set_notice("Nothing to copy");
                }
            }
            KeyCode::Char('l') => {
                app.panel.clear();
                app.editing_output = false;
                app.set_focus(Focus::Item(0));
            }
            KeyCode::Char('s') => app.open_stage_editor(),
            KeyCode::Char('e') => {
                if app.panel.active().output_visible {
                    app.editing_output = !app.editing_output;
                    app.set_focus(Focus::Output);
                }
            }
            _ => {}
        }
        return;
    }

    match key_code {
        KeyCode::F(1) => app.show_help_modal = true,
        KeyCode::Esc => {
            if app.editing_output {
                app.editing_output = false;
                app.set_focus(Focus::Output);
            } else {
                app.panel.dismiss_notice();
            }
        }
        KeyCode::Tab | KeyCode::Down if !app.editing_output => app.focus_next(),
        KeyCode::BackTab | KeyCode::Up if !app.editing_output => app.focus_prev(),
        KeyCode::PageUp => app.output_scroll = app.output_scroll.saturating_sub(5),
        KeyCode::PageDown => app.output_scroll = app.output_scroll.saturating_add(5),
        KeyCode::Left | KeyCode::Right if matches!(app.focus, Focus::Agent(_)) => {
            let editing_custom = app.focused_text().is_some();
            if editing_custom && modifiers.contains(KeyModifiers::SHIFT) {
                let mut cursor = app.cursor_pos;
                if let Some(text) = app.focused_text_mut() {
                    edit_text(text, &mut cursor, key_code);
                }
                app.cursor_pos = cursor;
            } else {
                app.cycle_focused_agent(key_code == KeyCode::Right);
            }
        }
        KeyCode::Enter => match app.focus {
            Focus::Item(_) => {
                let index = app.panel.add_item();
                app.set_focus(Focus::Item(index));
            }
            Focus::Output if app.editing_output => {
                let mut cursor = app.cursor_pos;
                if let Some(text) = app.focused_text_mut() {
                    edit_text(text, &mut cursor, KeyCode::Char('\n'));
                }
                app.cursor_pos = cursor;
            }
            _ => {}
        },
        _ => {
            let mut cursor = app.cursor_pos;
            if let Some(text) = app.focused_text_mut() {
                edit_text(text, &mut cursor, key_code);
            }
            app.cursor_pos = cursor;
        }
    }
}
