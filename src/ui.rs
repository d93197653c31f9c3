//! UI rendering functions.

use std::time::Duration;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Wrap};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Focus};
use crate::modal_ui::{draw_help_modal, draw_stage_editor_modal};
use crate::resolver::{AgentChoice, AgentResolver, AgentSlot};
use crate::stages::DocumentType;

/// How long the "Reloaded" indicator stays up after a config reload.
const RELOADED_INDICATOR: Duration = Duration::from_secs(3);

/// Maximum rows the item panel grows to before it stops taking space from the output.
const MAX_ITEM_ROWS: usize = 8;

/// Truncates a string to the given display width, appending "..." if truncated.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    // Replace newlines with spaces for single-line display
    let single_line: String = s.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();

    if single_line.width() <= max_width {
        return single_line;
    }

    let budget = max_width.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for c in single_line.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push_str("...");
    out
}

/// Window of `text` that fits in `width` columns and keeps the char at
/// `cursor` visible. Returns the visible text and the cursor's char offset in it.
pub fn visible_window(text: &str, cursor: usize, width: usize) -> (String, usize) {
    let chars: Vec<char> = text.chars().collect();
    let cursor = cursor.min(chars.len());
    // The cursor cell needs a column even at end of text.
    let budget = width.saturating_sub(1);

    let mut start = 0;
    let cols = |from: usize, to: usize| -> usize {
        chars[from..to].iter().map(|c| c.width().unwrap_or(0)).sum()
    };
    while start < cursor && cols(start, cursor) > budget {
        start += 1;
    }

    let mut end = cursor;
    let mut used = cols(start, cursor);
    while end < chars.len() {
        let w = chars[end].width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        end += 1;
    }

    (chars[start..end].iter().collect(), cursor - start)
}

/// Split `text` around a block cursor at char position `cursor`.
pub fn cursor_spans(text: &str, cursor: usize, style: Style) -> Vec<Span<'static>> {
    let cursor_style = Style::default().fg(Color::Black).bg(Color::White);
    let mut chars = text.chars();
    let before: String = chars.by_ref().take(cursor).collect();
    let (at, rest) = match chars.next() {
        Some(c) => (c.to_string(), chars.collect()),
        None => (" ".to_string(), String::new()),
    };
    vec![
        Span::styled(before, style),
        Span::styled(at, cursor_style),
        Span::styled(rest, style),
    ]
}

/// Text shown for an agent slot's current choice.
pub fn choice_display(resolver: &AgentResolver, slot: &AgentSlot) -> String {
    match &slot.choice {
        AgentChoice::Unselected => "(未選択)".to_string(),
        AgentChoice::Entry(id) => slot
            .catalog
            .and_then(|key| resolver.catalog(key).iter().find(|e| &e.id == id))
            .map(|entry| format!("{} ({})", entry.name, entry.id))
            .unwrap_or_else(|| id.clone()),
        AgentChoice::Custom(text) => text.clone(),
    }
}

/// Output text as lines, with a block cursor when `cursor` is set.
fn output_lines(text: &str, cursor: Option<usize>) -> Vec<Line<'static>> {
    let style = Style::default().fg(Color::White);
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in text.split('\n') {
        let len = raw.chars().count();
        let line = match cursor {
            Some(pos) if pos >= offset && pos <= offset + len => {
                Line::from(cursor_spans(raw, pos - offset, style))
            }
            _ => Line::from(Span::styled(raw.to_string(), style)),
        };
        lines.push(line);
        offset += len + 1;
    }
    lines
}

/// Calculate a centered rectangle within the given area.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

fn panel_block(title: &str, focused: bool) -> Block<'static> {
    let color = if focused { Color::Cyan } else { Color::DarkGray };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
        .title(Line::from(format!(" {} ", title)).left_aligned())
}

fn tab_spans(current: DocumentType) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for doc in DocumentType::ALL {
        let style = if doc == current {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {} ", doc.label()), style));
        spans.push(Span::raw(" "));
    }
    spans
}

fn draw_status_panel(f: &mut Frame, app: &App, area: Rect) {
    let inner_width = area.width.saturating_sub(2) as usize;
    let mut spans = tab_spans(app.panel.current());

    let used: usize = spans.iter().map(|s| s.content.width()).sum();
    let remaining = inner_width.saturating_sub(used + 1);

    if let Some(notice) = app.panel.notice() {
        spans.push(Span::styled(
            truncate_str(notice, remaining),
            Style::default().fg(Color::Yellow),
        ));
    } else if let Some(error) = &app.config_error {
        spans.push(Span::styled(
            truncate_str(&format!("Config error: {}", error), remaining),
            Style::default().fg(Color::Red),
        ));
    } else if app
        .config_reloaded_at
        .is_some_and(|at| at.elapsed() < RELOADED_INDICATOR)
    {
        spans.push(Span::styled("Reloaded", Style::default().fg(Color::Green)));
    } else if let Some(error) = &app.logging_error {
        spans.push(Span::styled(
            truncate_str(&format!("Logging disabled: {}", error), remaining),
            Style::default().fg(Color::Red),
        ));
    }

    let mut block = panel_block("instant-req", false);
    if let Some(session_id) = &app.session_id {
        block = block.title(Line::from(format!(" {} ", session_id)).right_aligned());
    }
    if let Some(dir) = &app.log_directory {
        let display = truncate_str(&dir.display().to_string(), inner_width.saturating_sub(8));
        block = block.title_bottom(Line::from(format!(" logs: {} ", display)).right_aligned());
    }

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_items_panel(f: &mut Frame, app: &App, area: Rect) {
    let state = app.panel.active();
    let hint = app.panel.current().item_hint();
    let inner_height = area.height.saturating_sub(2) as usize;
    let inner_width = area.width.saturating_sub(2) as usize;

    let focused_row = match app.focus {
        Focus::Item(i) => Some(i),
        _ => None,
    };
    let first = focused_row
        .map(|i| (i + 1).saturating_sub(inner_height))
        .unwrap_or(0);

    let mut content = Vec::new();
    for (i, item) in state.items.iter().enumerate().skip(first).take(inner_height) {
        let prefix = format!("{:>2}. ", i + 1);
        let width = inner_width.saturating_sub(prefix.width());
        let mut spans = vec![Span::styled(prefix, Style::default().fg(Color::DarkGray))];
        if focused_row == Some(i) {
            let (visible, cursor) = visible_window(item, app.cursor_pos, width);
            spans.extend(cursor_spans(&visible, cursor, Style::default().fg(Color::White)));
        } else if item.is_empty() {
            spans.push(Span::styled(hint, Style::default().fg(Color::DarkGray)));
        } else {
            spans.push(Span::styled(
                truncate_str(item, width),
                Style::default().fg(Color::White),
            ));
        }
        content.push(Line::from(spans));
    }

    let title = format!("{} ({})", app.panel.current().label(), state.items.len());
    f.render_widget(
        Paragraph::new(content).block(panel_block(&title, focused_row.is_some())),
        area,
    );
}

fn draw_agents_panel(f: &mut Frame, app: &App, area: Rect) {
    let resolver = &app.panel.active().resolver;
    let inner_width = area.width.saturating_sub(2) as usize;
    let label_width = resolver
        .slots()
        .iter()
        .map(|s| s.label().width())
        .max()
        .unwrap_or(0);

    let focused_slot = match app.focus {
        Focus::Agent(i) => Some(i),
        _ => None,
    };

    let mut content = Vec::new();
    if resolver.slots().is_empty() {
        content.push(Line::from(Span::styled(
            "No agent placeholders in these stages",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for (i, slot) in resolver.slots().iter().enumerate() {
        let label = slot.label();
        let pad = label_width.saturating_sub(label.width());
        let is_focused = focused_slot == Some(i);
        let label_style = if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mut spans = vec![
            Span::styled(format!("{}{}", label, " ".repeat(pad)), label_style),
            Span::styled(if is_focused { " ◀ " } else { "   " }, label_style),
        ];
        let width = inner_width.saturating_sub(label_width + 6);

        match (&slot.choice, is_focused) {
            (AgentChoice::Custom(text), true) => {
                let (visible, cursor) = visible_window(text, app.cursor_pos, width);
                spans.extend(cursor_spans(&visible, cursor, Style::default().fg(Color::White)));
            }
            (AgentChoice::Unselected, _) => spans.push(Span::styled(
                choice_display(resolver, slot),
                Style::default().fg(Color::DarkGray),
            )),
            _ => spans.push(Span::styled(
                truncate_str(&choice_display(resolver, slot), width),
                Style::default().fg(Color::White),
            )),
        }
        if is_focused {
            spans.push(Span::styled(" ▶", label_style));
        }
        content.push(Line::from(spans));
    }

    f.render_widget(
        Paragraph::new(content).block(panel_block("Agents", focused_slot.is_some())),
        area,
    );
}

fn draw_output_panel(f: &mut Frame, app: &App, area: Rect) {
    let state = app.panel.active();
    let focused = app.focus == Focus::Output;

    let mut block = panel_block(
        if app.editing_output {
            "Output (editing)"
        } else {
            "Output"
        },
        focused,
    );
    if app.editing_output {
        block = block.border_style(Style::default().fg(Color::Yellow));
    }
    if state.output_visible && state.output != state.generated {
        block = block.title(Line::from(" edited ").right_aligned());
    }

    let content = if state.output_visible {
        let cursor = app.editing_output.then_some(app.cursor_pos);
        output_lines(&state.output, cursor)
    } else {
        vec![Line::from(Span::styled(
            "Ctrl+G to generate a prompt",
            Style::default().fg(Color::DarkGray),
        ))]
    };

    let panel = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.output_scroll, 0));
    f.render_widget(panel, area);
}

fn draw_command_panel(f: &mut Frame, app: &App, area: Rect) {
    let shortcuts = if app.editing_output {
        "[Esc] Done  [Ctrl+Y] Copy  [PgUp/PgDn] Scroll"
    } else {
        "[Ctrl+G] Generate  [Ctrl+Y] Copy  [Ctrl+T] Tab  [Ctrl+S] Stages  [F1] Help  [Ctrl+Q] Quit"
    };
    let line = Line::from(Span::styled(shortcuts, Style::default().fg(Color::DarkGray)));
    f.render_widget(
        Paragraph::new(line).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::DarkGray)),
        ),
        area,
    );
}

/// Draw the main UI.
pub fn draw_ui(f: &mut Frame, app: &mut App) {
    let state = app.panel.active();
    let item_rows = state.items.len().clamp(1, MAX_ITEM_ROWS) as u16;
    let agent_rows = state.resolver.slots().len().max(1) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),              // Status panel
            Constraint::Length(item_rows + 2),  // Items
            Constraint::Length(agent_rows + 2), // Agents
            Constraint::Min(3),                 // Output (flexible)
            Constraint::Length(3),              // Command panel
        ])
        .split(f.area());

    draw_status_panel(f, app, chunks[0]);
    draw_items_panel(f, app, chunks[1]);
    draw_agents_panel(f, app, chunks[2]);
    draw_output_panel(f, app, chunks[3]);
    draw_command_panel(f, app, chunks[4]);

    if app.stage_editor_state.is_some() {
        draw_stage_editor_modal(f, app);
    }

    if app.show_help_modal {
        draw_help_modal(f, app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentsConfig;
    use crate::resolver::{AgentEntry, CatalogKey};
    use crate::stages::Stage;

    fn span_text(spans: &[Span]) -> Vec<String> {
        spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_truncate_str_short_string() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_str_long_string() {
        assert_eq!(truncate_str("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_str_counts_wide_chars() {
        // Each kana is two columns wide.
        assert_eq!(truncate_str("ログイン機能", 7), "ログ...");
        assert_eq!(truncate_str("ログイン", 8), "ログイン");
    }

    #[test]
    fn test_truncate_str_with_newlines() {
        assert_eq!(truncate_str("a\nb\nc", 10), "a b c");
    }

    #[test]
    fn test_visible_window_fits() {
        assert_eq!(visible_window("abc", 1, 10), ("abc".to_string(), 1));
    }

    #[test]
    fn test_visible_window_scrolls_to_cursor_at_end() {
        let (visible, cursor) = visible_window("abcdefghij", 10, 5);
        assert_eq!(visible, "ghij");
        assert_eq!(cursor, 4);
    }

    #[test]
    fn test_visible_window_wide_chars() {
        let (visible, cursor) = visible_window("要件定義書", 5, 7);
        assert_eq!(visible, "定義書");
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_cursor_spans_middle_and_end() {
        let style = Style::default();
        assert_eq!(
            span_text(&cursor_spans("要件定義", 1, style)),
            vec!["要", "件", "定義"]
        );
        assert_eq!(span_text(&cursor_spans("ab", 2, style)), vec!["ab", " ", ""]);
    }

    #[test]
    fn test_output_lines_places_cursor_on_right_line() {
        let lines = output_lines("ab\ncd", Some(4));
        assert_eq!(lines.len(), 2);
        assert_eq!(span_text(&lines[0].spans), vec!["ab"]);
        assert_eq!(span_text(&lines[1].spans), vec!["c", "d", ""]);
    }

    #[test]
    fn test_choice_display() {
        let mut agents = AgentsConfig::default();
        agents.implementers = vec![AgentEntry::new("@impl", "Implementer")];
        let mut resolver = AgentResolver::new(agents);
        resolver.detect(&[Stage::new(1, "{agent-実装担当} {agent-other}")]);

        let slot = resolver.slot("agent-実装担当").unwrap().clone();
        assert_eq!(slot.catalog, Some(CatalogKey::Implementers));
        assert_eq!(choice_display(&resolver, &slot), "Implementer (@impl)");

        let other = resolver.slot("agent-other").unwrap().clone();
        assert_eq!(choice_display(&resolver, &other), "(未選択)");

        resolver.select("agent-other", AgentChoice::Custom("writer".into()));
        let other = resolver.slot("agent-other").unwrap().clone();
        assert_eq!(choice_display(&resolver, &other), "writer");
    }

    #[test]
    fn test_centered_rect_clamps_to_area() {
        let area = Rect::new(0, 0, 20, 10);
        assert_eq!(centered_rect(10, 4, area), Rect::new(5, 3, 10, 4));
        assert_eq!(centered_rect(40, 40, area), Rect::new(0, 0, 20, 10));
    }
}
