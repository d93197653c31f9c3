//! Modal UI rendering functions.

use ratatui::Frame;
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::app::App;
use crate::modals::{EditorRow, editor_rows, row_content};
use crate::ui::{centered_rect, cursor_spans, truncate_str, visible_window};

/// Draw the stage editor modal.
pub fn draw_stage_editor_modal(f: &mut Frame, app: &mut App) {
    let area = f.area();
    let modal_width = area.width.saturating_sub(8).clamp(40, 100);
    let modal_height = area.height.saturating_sub(4).clamp(10, 30);
    let modal_area = centered_rect(modal_width, modal_height, area);

    // Clear the area behind the modal
    f.render_widget(Clear, modal_area);

    let (Some(editor), Some(state)) = (app.panel.stage_editor(), app.stage_editor_state.as_mut())
    else {
        return;
    };
    let list = &editor.list;

    let inner_width = modal_width.saturating_sub(2) as usize;
    // Footer takes a separator and two hint lines.
    let list_height = modal_height.saturating_sub(2 + 3) as usize;
    state.ensure_visible(list_height);

    let rows = editor_rows(list);
    let mut content: Vec<Line> = Vec::new();

    if rows.is_empty() {
        content.push(Line::from(Span::styled(
            "  No stages. Ctrl+A adds one.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for (index, row) in rows
        .iter()
        .enumerate()
        .skip(state.scroll_offset)
        .take(list_height)
    {
        let is_selected = index == state.selected;
        let prefix = match row {
            EditorRow::Stage(i) => format!(" {:>2}. ", i + 1),
            EditorRow::Substage(_, _) => "      - ".to_string(),
        };
        let text = row_content(list, *row).unwrap_or_default();
        let width = inner_width.saturating_sub(prefix.chars().count());

        let prefix_style = if is_selected {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mut spans = vec![Span::styled(prefix, prefix_style)];
        if is_selected {
            let (visible, cursor) = visible_window(text, state.cursor_pos, width);
            spans.extend(cursor_spans(&visible, cursor, Style::default().fg(Color::White)));
        } else {
            spans.push(Span::styled(
                truncate_str(text, width),
                Style::default().fg(Color::White),
            ));
        }
        content.push(Line::from(spans));
    }

    // Pad so the footer sits at the bottom
    while content.len() < list_height {
        content.push(Line::from(""));
    }

    let key_style = Style::default().fg(Color::Cyan);
    let desc_style = Style::default().fg(Color::DarkGray);
    content.push(Line::from(Span::styled(
        "\u{2500}".repeat(inner_width),
        desc_style,
    )));
    content.push(Line::from(vec![
        Span::styled(" ^A", key_style),
        Span::styled(" stage  ", desc_style),
        Span::styled("^B", key_style),
        Span::styled(" substage  ", desc_style),
        Span::styled("^D", key_style),
        Span::styled(" delete  ", desc_style),
        Span::styled("Alt+↑/↓", key_style),
        Span::styled(" move", desc_style),
    ]));
    content.push(Line::from(vec![
        Span::styled(" ^S", key_style),
        Span::styled(" save  ", desc_style),
        Span::styled("^R", key_style),
        Span::styled(" reset to defaults  ", desc_style),
        Span::styled("Esc", key_style),
        Span::styled(" cancel", desc_style),
    ]));

    let title = format!(" Stages: {} ", editor.tab.label());
    let modal = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_alignment(Alignment::Center)
            .style(Style::default().fg(Color::White)),
    );

    f.render_widget(modal, modal_area);
}

/// Draw the help modal.
pub fn draw_help_modal(f: &mut Frame, _app: &App) {
    let modal_width: u16 = 54;
    let modal_height: u16 = 29;
    let modal_area = centered_rect(modal_width, modal_height, f.area());

    // Clear the area behind the modal
    f.render_widget(Clear, modal_area);

    let key_style = Style::default().fg(Color::Cyan);
    let desc_style = Style::default().fg(Color::DarkGray);
    let header_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let inner_width = modal_width.saturating_sub(4) as usize;

    let footer_text = "F1 or Esc to close";
    let footer_padding = inner_width.saturating_sub(footer_text.len());

    let entry = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::raw("    "),
            Span::styled(format!("{:<10}", key), key_style),
            Span::styled(desc, desc_style),
        ])
    };

    let content: Vec<Line> = vec![
        Line::from(Span::styled("  Prompt", header_style)),
        entry("Ctrl+G", "Generate prompt"),
        entry("Ctrl+Y", "Copy prompt to clipboard"),
        entry("Ctrl+L", "Clear items and agents"),
        entry("Ctrl+E", "Edit generated output"),
        Line::from(""),
        Line::from(Span::styled("  Items", header_style)),
        entry("Enter", "Add item below"),
        entry("Ctrl+N", "Add item"),
        entry("Ctrl+D", "Remove focused item"),
        Line::from(""),
        Line::from(Span::styled("  Agents", header_style)),
        entry("←/→", "Cycle agent choice"),
        entry("(type)", "Enter a custom agent"),
        entry("Shift+←/→", "Move cursor in custom text"),
        Line::from(""),
        Line::from(Span::styled("  Navigation", header_style)),
        entry("Tab/↓", "Next row"),
        entry("S-Tab/↑", "Previous row"),
        entry("PgUp/PgDn", "Scroll output"),
        entry("Ctrl+T", "Switch document tab"),
        entry("Ctrl+S", "Edit stages"),
        entry("Ctrl+Q", "Quit"),
        // Footer
        Line::from(""),
        Line::from(vec![
            Span::raw(" ".repeat(footer_padding)),
            Span::styled(footer_text, desc_style),
        ]),
    ];

    let modal = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .title_alignment(Alignment::Center)
            .style(Style::default().fg(Color::White)),
    );

    f.render_widget(modal, modal_area);
}
