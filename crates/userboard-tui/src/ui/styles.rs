//! Palette for the users view. Colors are named by what they signal.

use ratatui::style::{Color, Modifier, Style};

const BRAND: Color = Color::Rgb(72, 176, 168);
const OK: Color = Color::Rgb(120, 190, 110);
const BUSY: Color = Color::Rgb(220, 180, 90);
const FAILED: Color = Color::Rgb(224, 96, 88);
const DIM: Color = Color::Rgb(118, 124, 132);
const TEXT: Color = Color::Rgb(226, 228, 232);
const ROW_SELECTED: Color = Color::Rgb(36, 64, 62);
const BAR: Color = Color::Rgb(24, 30, 34);

pub fn title_style() -> Style {
    Style::default().fg(BRAND).add_modifier(Modifier::BOLD)
}

pub fn frame_style() -> Style {
    Style::default().fg(BRAND)
}

pub fn row_style() -> Style {
    Style::default().fg(TEXT)
}

pub fn selected_row_style() -> Style {
    Style::default().bg(ROW_SELECTED).fg(TEXT).add_modifier(Modifier::BOLD)
}

pub fn muted_style() -> Style {
    Style::default().fg(DIM)
}

/// Background work in progress (refetches).
pub fn busy_style() -> Style {
    Style::default().fg(BUSY).add_modifier(Modifier::ITALIC)
}

pub fn success_style() -> Style {
    Style::default().fg(OK)
}

pub fn error_style() -> Style {
    Style::default().fg(FAILED).add_modifier(Modifier::BOLD)
}

pub fn status_bar_style() -> Style {
    Style::default().bg(BAR).fg(TEXT)
}

/// Key hint such as `[a]`.
pub fn key_style() -> Style {
    Style::default().fg(BRAND).add_modifier(Modifier::BOLD)
}

pub fn key_desc_style() -> Style {
    Style::default().fg(TEXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_styles_are_distinct() {
        assert_ne!(success_style().fg, error_style().fg);
        assert_ne!(busy_style().fg, muted_style().fg);
    }
}
