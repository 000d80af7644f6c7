//! Keyboard input handling for the TUI.

use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{App, AppState};

/// Handle keyboard input. Returns true if the app should quit.
pub fn handle_input(app: &mut App, key: KeyEvent) -> bool {
    // Handle help overlay
    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return false;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.quit();
            return true;
        }
        KeyCode::Char('?') => app.toggle_help(),
        KeyCode::Char('a') => app.add_user(),
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        _ => {}
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossterm::event::KeyModifiers;
    use userboard_core::{ApiClient, UserQueryClient};

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn offline_app() -> App {
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        App::with_client(api, Arc::new(UserQueryClient::new()))
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let mut app = offline_app();
        assert!(handle_input(&mut app, key(KeyCode::Char('q'))));
        assert_eq!(app.state, AppState::Quitting);

        let mut app = offline_app();
        assert!(handle_input(&mut app, key(KeyCode::Esc)));
    }

    #[tokio::test]
    async fn test_help_overlay_swallows_keys() {
        let mut app = offline_app();
        assert!(!handle_input(&mut app, key(KeyCode::Char('?'))));
        assert_eq!(app.state, AppState::ShowingHelp);

        // 'q' closes help instead of quitting
        assert!(!handle_input(&mut app, key(KeyCode::Char('q'))));
        assert_eq!(app.state, AppState::Normal);
    }

    #[tokio::test]
    async fn test_refresh_sets_status() {
        let mut app = offline_app();
        assert!(!handle_input(&mut app, key(KeyCode::Char('r'))));
        assert_eq!(app.status_message.as_deref(), Some("Refreshing..."));
    }
}
