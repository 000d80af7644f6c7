use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};
use userboard_core::QueryStatus;

use crate::app::{App, AppState};

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(2), // Controls
            Constraint::Min(3),    // User list
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, chunks[0]);
    render_controls(frame, chunks[1]);
    render_users(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);

    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame);
    }
}

fn render_title_bar(frame: &mut Frame, area: Rect) {
    let title = "  Users";
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            area.width
                .saturating_sub(title.len() as u16 + help_hint.len() as u16 + 4)
                as usize,
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_controls(frame: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled("[a]", styles::key_style()),
        Span::styled(" add user", styles::key_desc_style()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_users(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::frame_style());

    match app.users_state.status {
        QueryStatus::Pending => {
            let text = Paragraph::new(Span::styled(" Loading...", styles::muted_style()));
            frame.render_widget(text.block(block), area);
        }
        QueryStatus::Error => {
            // Every failure kind renders the same; details go to the log.
            let text = Paragraph::new(Span::styled(" Error fetching users", styles::error_style()));
            frame.render_widget(text.block(block), area);
        }
        QueryStatus::Success => {
            let items: Vec<ListItem> = app
                .users()
                .iter()
                .map(|user| ListItem::new(format!(" {}", user.name)).style(styles::row_style()))
                .collect();

            let list = List::new(items)
                .block(block)
                .highlight_style(styles::selected_row_style());

            let mut state = ListState::default();
            if !app.users().is_empty() {
                state.select(Some(app.selection));
            }
            frame.render_stateful_widget(list, area, &mut state);
        }
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = "[r]efresh | [q]uit";

    let (left_text, left_style) = match app.status_message {
        Some(ref msg) if app.mutation_state.is_error() => (format!(" {} ", msg), styles::error_style()),
        Some(ref msg) if app.mutation_state.is_success() => (format!(" {} ", msg), styles::success_style()),
        Some(ref msg) => (format!(" {} ", msg), styles::muted_style()),
        None if app.users_state.is_fetching && app.users_state.is_success() => {
            (" Refreshing... ".to_string(), styles::busy_style())
        }
        None => (
            format!(" Updated {} ", app.users_state.age_display()),
            styles::muted_style(),
        ),
    };
    let right_text = format!(" {} ", shortcuts);

    let padding_len = (area.width as usize)
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());
    let status_line = Line::from(vec![
        Span::styled(left_text, left_style),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    frame.render_widget(Paragraph::new(status_line).style(styles::status_bar_style()), area);
}

fn help_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::key_style()),
        Span::styled(desc, styles::key_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(40, 13, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let help_text = vec![
        Line::from(Span::styled(format!(" userboard {}", version), styles::title_style())),
        Line::from(""),
        help_line("a", "Add user \"john doe\""),
        help_line("r", "Refresh user list"),
        help_line("↑/↓", "Navigate list"),
        help_line("?", "Toggle help"),
        help_line("q / Esc", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Press ", styles::muted_style()),
            Span::styled("?", styles::key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::frame_style())
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}
