//! Terminal-side state: the search box, the result list and the last
//! message from the driver. Game state itself lives in the driver's snapshot.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use typify_core::{GameCommand, GameEvent, GameSnapshot, GameState, Keystroke, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Query,
    Results,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Warning,
    Error,
}

/// What the event loop should do with a key press.
#[derive(Debug, Clone)]
pub enum Action {
    Send(GameCommand),
    Quit,
    /// Quit and forget the stored Spotify token
    SignOut,
    None,
}

#[derive(Debug, Default)]
pub struct App {
    pub query: String,
    pub results: Vec<Track>,
    pub selected: usize,
    pub focus: Focus,
    pub status: Option<(StatusKind, String)>,
}

impl App {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn highlighted(&self) -> Option<&Track> {
        self.results.get(self.selected)
    }

    /// Fold a driver event into the view state.
    pub fn on_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::TracksListed { tracks } => {
                self.status = if tracks.is_empty() {
                    Some((StatusKind::Info, "No tracks found".into()))
                } else {
                    None
                };
                self.focus = if tracks.is_empty() {
                    Focus::Query
                } else {
                    Focus::Results
                };
                self.results = tracks;
                self.selected = 0;
            }
            GameEvent::LyricsLoaded { track, total_lines } => {
                self.status = Some((
                    StatusKind::Info,
                    format!("{track}: {total_lines} lines ready. Ctrl+S to start"),
                ));
            }
            GameEvent::StateChanged { from, to } => {
                if to == GameState::TrackSelected && from != GameState::Searching {
                    self.status = Some((StatusKind::Info, "Loading lyrics...".into()));
                }
                if to.is_running() {
                    self.status = None;
                }
            }
            GameEvent::Warning { message } => {
                self.status = Some((StatusKind::Warning, message));
            }
            GameEvent::Error { message } => {
                self.status = Some((StatusKind::Error, message));
            }
            GameEvent::LineChanged { .. }
            | GameEvent::Keystroke { .. }
            | GameEvent::GameEnded(_) => {}
        }
    }

    /// Map a key press to a driver command given the current game state.
    pub fn on_key(&mut self, key: KeyEvent, snapshot: &GameSnapshot) -> Action {
        if key.kind == KeyEventKind::Release {
            return Action::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c' | 'q')) {
            return Action::Quit;
        }

        match snapshot.state {
            GameState::Countdown | GameState::Active | GameState::Paused => {
                Self::on_game_key(key, ctrl)
            }
            GameState::Ended => match key.code {
                KeyCode::Char('s') if ctrl => Action::Send(GameCommand::Start),
                KeyCode::Enter | KeyCode::Esc => Action::Send(GameCommand::Reset),
                _ => Action::None,
            },
            GameState::Idle | GameState::Searching | GameState::TrackSelected => {
                self.on_browse_key(key, ctrl, snapshot)
            }
        }
    }

    fn on_game_key(key: KeyEvent, ctrl: bool) -> Action {
        match key.code {
            KeyCode::Esc => Action::Send(GameCommand::TogglePause),
            KeyCode::Char('r') if ctrl => Action::Send(GameCommand::Reset),
            KeyCode::Char('s') if ctrl => Action::Send(GameCommand::Start),
            KeyCode::Backspace => Action::Send(GameCommand::Key(Keystroke::Backspace)),
            KeyCode::Char(c) if !ctrl => Action::Send(GameCommand::Key(Keystroke::Char(c))),
            _ => Action::None,
        }
    }

    fn on_browse_key(&mut self, key: KeyEvent, ctrl: bool, snapshot: &GameSnapshot) -> Action {
        match key.code {
            KeyCode::Char('s') if ctrl => {
                if snapshot.state == GameState::TrackSelected && snapshot.total_lines > 0 {
                    Action::Send(GameCommand::Start)
                } else {
                    Action::None
                }
            }
            KeyCode::Char('r') if ctrl => Action::Send(GameCommand::RecentlyPlayed),
            KeyCode::Char('l') if ctrl => Action::SignOut,
            KeyCode::Esc => {
                self.query.clear();
                self.results.clear();
                self.selected = 0;
                self.focus = Focus::Query;
                Action::Send(GameCommand::Reset)
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Query if !self.results.is_empty() => Focus::Results,
                    _ => Focus::Query,
                };
                Action::None
            }
            KeyCode::Up if self.focus == Focus::Results => {
                self.selected = self.selected.saturating_sub(1);
                Action::None
            }
            KeyCode::Down if self.focus == Focus::Results => {
                if self.selected + 1 < self.results.len() {
                    self.selected += 1;
                }
                Action::None
            }
            KeyCode::Down if !self.results.is_empty() => {
                self.focus = Focus::Results;
                Action::None
            }
            KeyCode::Enter => match self.focus {
                Focus::Query => Action::Send(GameCommand::Search(self.query.clone())),
                Focus::Results => self
                    .highlighted()
                    .cloned()
                    .map_or(Action::None, |track| Action::Send(GameCommand::Select(track))),
            },
            KeyCode::Backspace if self.focus == Focus::Query => {
                self.query.pop();
                Action::None
            }
            KeyCode::Char(c) if !ctrl => {
                self.focus = Focus::Query;
                self.query.push(c);
                Action::None
            }
            _ => Action::None,
        }
    }
}

#[must_use]
pub fn format_clock(elapsed_ms: u64) -> String {
    let secs = elapsed_ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Progress through the lyrics, as shown in the header.
#[must_use]
pub fn format_progress(snapshot: &GameSnapshot) -> String {
    format!("line {}/{}", snapshot.lines_reached, snapshot.total_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn in_state(state: GameState) -> GameSnapshot {
        GameSnapshot {
            state,
            ..GameSnapshot::default()
        }
    }

    fn tracks() -> Vec<Track> {
        vec![
            Track::new("a", "spotify:track:a", "First"),
            Track::new("b", "spotify:track:b", "Second"),
        ]
    }

    #[test]
    fn test_typing_query_then_search() {
        let mut app = App::new();
        for c in "abba".chars() {
            assert!(matches!(
                app.on_key(key(KeyCode::Char(c)), &in_state(GameState::Idle)),
                Action::None
            ));
        }
        app.on_key(key(KeyCode::Backspace), &in_state(GameState::Idle));
        assert_eq!(app.query, "abb");

        assert!(matches!(
            app.on_key(key(KeyCode::Enter), &in_state(GameState::Idle)),
            Action::Send(GameCommand::Search(ref query)) if query == "abb"
        ));
    }

    #[test]
    fn test_results_navigation_and_select() {
        let mut app = App::new();
        app.on_event(GameEvent::TracksListed { tracks: tracks() });
        assert_eq!(app.focus, Focus::Results);

        app.on_key(key(KeyCode::Down), &in_state(GameState::Idle));
        app.on_key(key(KeyCode::Down), &in_state(GameState::Idle));
        assert_eq!(app.selected, 1);

        assert!(matches!(
            app.on_key(key(KeyCode::Enter), &in_state(GameState::Idle)),
            Action::Send(GameCommand::Select(ref track)) if track.id == "b"
        ));
    }

    #[test]
    fn test_start_requires_loaded_lyrics() {
        let mut app = App::new();
        let mut snapshot = in_state(GameState::TrackSelected);
        assert!(matches!(app.on_key(ctrl('s'), &snapshot), Action::None));

        snapshot.total_lines = 12;
        assert!(matches!(
            app.on_key(ctrl('s'), &snapshot),
            Action::Send(GameCommand::Start)
        ));
        assert!(matches!(
            app.on_key(ctrl('s'), &in_state(GameState::Idle)),
            Action::None
        ));
    }

    #[test]
    fn test_game_keys() {
        let mut app = App::new();
        assert!(matches!(
            app.on_key(key(KeyCode::Char('x')), &in_state(GameState::Active)),
            Action::Send(GameCommand::Key(Keystroke::Char('x')))
        ));
        assert!(matches!(
            app.on_key(key(KeyCode::Backspace), &in_state(GameState::Active)),
            Action::Send(GameCommand::Key(Keystroke::Backspace))
        ));
        assert!(matches!(
            app.on_key(key(KeyCode::Esc), &in_state(GameState::Paused)),
            Action::Send(GameCommand::TogglePause)
        ));
        assert!(matches!(
            app.on_key(ctrl('r'), &in_state(GameState::Active)),
            Action::Send(GameCommand::Reset)
        ));
        assert!(matches!(
            app.on_key(ctrl('s'), &in_state(GameState::Active)),
            Action::Send(GameCommand::Start)
        ));
        assert!(app.query.is_empty());
    }

    #[test]
    fn test_replay_after_end() {
        let mut app = App::new();
        assert!(matches!(
            app.on_key(ctrl('s'), &in_state(GameState::Ended)),
            Action::Send(GameCommand::Start)
        ));
        assert!(matches!(
            app.on_key(key(KeyCode::Enter), &in_state(GameState::Ended)),
            Action::Send(GameCommand::Reset)
        ));
    }

    #[test]
    fn test_quit_anywhere() {
        let mut app = App::new();
        for state in [GameState::Idle, GameState::Active, GameState::Ended] {
            assert!(matches!(app.on_key(ctrl('c'), &in_state(state)), Action::Quit));
        }
    }

    #[test]
    fn test_sign_out_only_while_browsing() {
        let mut app = App::new();
        assert!(matches!(
            app.on_key(ctrl('l'), &in_state(GameState::Idle)),
            Action::SignOut
        ));
        assert!(matches!(
            app.on_key(ctrl('l'), &in_state(GameState::TrackSelected)),
            Action::SignOut
        ));
        assert!(matches!(
            app.on_key(ctrl('l'), &in_state(GameState::Active)),
            Action::None
        ));
        assert!(app.query.is_empty());
    }

    #[test]
    fn test_errors_shown_as_status() {
        let mut app = App::new();
        app.on_event(GameEvent::Error {
            message: "Search failed".into(),
        });
        assert_eq!(
            app.status,
            Some((StatusKind::Error, "Search failed".to_string()))
        );

        app.on_event(GameEvent::StateChanged {
            from: GameState::TrackSelected,
            to: GameState::Countdown,
        });
        assert_eq!(app.status, None);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(61_500), "1:01");
    }
}
