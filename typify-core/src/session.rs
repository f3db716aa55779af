//! The game session state machine.
//!
//! [`GameSession`] owns the clock and typing progress for one play-through and
//! is driven entirely by method calls: the host feeds it monotonic `now_ms`
//! readings on every tick and forwards keystrokes as they arrive. Each call
//! returns the [`SessionEvent`]s it produced, in order. Nothing here performs
//! I/O; playback commands are returned as events for the host to carry out.
//!
//! Operations that are not allowed in the current state return
//! [`CoreError::InvalidState`] and leave the session untouched.

use crate::clock::PlaybackClock;
use crate::config::{GameConfig, MarkerAdvance};
use crate::error::{CoreError, Result};
use crate::lyrics::{LyricLine, LyricLineStore};
use crate::normalize::NormalizedLine;
use crate::provider::Track;
use crate::resolver::resolve_current_line;
use crate::typing::{
    accuracy_percent, char_accuracy_percent, Keystroke, KeystrokeOutcome, TypingProgress,
};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info};

const LOG_TARGET: &str = "typify::session";

/// Number of lines a host shows around the current one.
pub const DEFAULT_VISIBLE_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameState {
    #[default]
    Idle,
    Searching,
    TrackSelected,
    /// Started, but no line has begun yet
    Countdown,
    Active,
    Paused,
    Ended,
}

impl GameState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
            Self::TrackSelected => "track selected",
            Self::Countdown => "counting down",
            Self::Active => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }

    /// Whether a game is in progress (clock started, not ended).
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Countdown | Self::Active | Self::Paused)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio commands the host forwards to the playback collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play { uri: String },
    Pause,
    Resume,
}

/// Final result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameSummary {
    pub score: u32,
    pub total_lines: usize,
    /// `score / (total_lines * points_per_line)` as a percentage
    pub accuracy_percent: f64,
    pub chars_typed: u32,
    pub chars_correct: u32,
}

impl GameSummary {
    /// Share of keystrokes that matched, as a percentage.
    #[must_use]
    pub fn char_accuracy_percent(&self) -> f64 {
        char_accuracy_percent(self.chars_correct, self.chars_typed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: GameState, to: GameState },
    /// The current line moved forward.
    LineChanged { index: usize },
    /// A keystroke changed the typed text.
    Keystroke { outcome: KeystrokeOutcome, score: u32 },
    GameEnded(GameSummary),
    Playback(PlaybackCommand),
}

#[derive(Debug, Clone)]
pub struct GameSession {
    state: GameState,
    /// State to return to when unpausing
    resume_state: GameState,
    generation: u64,
    search_serial: u64,
    marker_advance: MarkerAdvance,
    final_line_grace_ms: u64,
    points_per_line: u32,
    track: Option<Track>,
    lyrics: Option<Arc<LyricLineStore>>,
    clock: PlaybackClock,
    progress: TypingProgress,
    current_line_index: Option<usize>,
    score: u32,
    chars_typed: u32,
    chars_correct: u32,
    summary: Option<GameSummary>,
}

impl GameSession {
    #[must_use]
    pub fn new(config: &GameConfig) -> Self {
        Self {
            state: GameState::Idle,
            resume_state: GameState::Active,
            generation: 0,
            search_serial: 0,
            marker_advance: config.marker_advance,
            final_line_grace_ms: config.final_line_grace_ms,
            points_per_line: config.accuracy_points_per_line,
            track: None,
            lyrics: None,
            clock: PlaybackClock::new(),
            progress: TypingProgress::new(),
            current_line_index: None,
            score: 0,
            chars_typed: 0,
            chars_correct: 0,
            summary: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> GameState {
        self.state
    }

    /// Counter bumped whenever in-flight lyrics and playback results must
    /// stop applying: on a new selection and on reset.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub const fn current_line_index(&self) -> Option<usize> {
        self.current_line_index
    }

    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.lyrics.as_ref().map_or(0, |store| store.len())
    }

    #[must_use]
    pub const fn progress(&self) -> &TypingProgress {
        &self.progress
    }

    #[must_use]
    pub const fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    #[must_use]
    pub fn lyrics(&self) -> Option<&LyricLineStore> {
        self.lyrics.as_deref()
    }

    #[must_use]
    pub const fn summary(&self) -> Option<&GameSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn current_line(&self) -> Option<&LyricLine> {
        let index = self.current_line_index?;
        self.lyrics.as_ref()?.line(index)
    }

    #[must_use]
    pub fn current_normalized(&self) -> Option<&NormalizedLine> {
        let index = self.current_line_index?;
        self.lyrics.as_ref()?.normalized(index)
    }

    /// Game time at `now_ms`; frozen while paused.
    #[must_use]
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.clock.elapsed_ms(now_ms)
    }

    /// `(lines reached, total lines)` for a progress display.
    #[must_use]
    pub fn line_progress(&self) -> (usize, usize) {
        let reached = self.current_line_index.map_or(0, |index| index + 1);
        let total = self.total_lines();
        (reached.min(total), total)
    }

    /// Indices of the lines to display, centred on the current line.
    #[must_use]
    pub fn visible_window(&self, size: usize) -> Range<usize> {
        self.lyrics
            .as_ref()
            .map_or(0..0, |store| store.visible_window(self.current_line_index, size))
    }

    /// Mark a track search as in flight. A selected track and its lyrics
    /// are kept; only an older search still in flight becomes stale.
    ///
    /// Returns the serial the search result must carry back.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a game is running.
    pub fn begin_search(&mut self) -> Result<(u64, Vec<SessionEvent>)> {
        self.ensure_not_running("search")?;
        let mut events = Vec::new();
        self.search_serial += 1;
        self.transition(GameState::Searching, &mut events);
        Ok((self.search_serial, events))
    }

    /// Leave the searching state once results (or a failure) came back.
    ///
    /// # Errors
    ///
    /// `StaleCompletion` if a newer search was issued or the session was
    /// reset since this one began.
    pub fn finish_search(&mut self, serial: u64) -> Result<Vec<SessionEvent>> {
        if serial != self.search_serial {
            return Err(CoreError::StaleCompletion);
        }
        let mut events = Vec::new();
        if self.state == GameState::Searching {
            let next = if self.track.is_some() {
                GameState::TrackSelected
            } else {
                GameState::Idle
            };
            self.transition(next, &mut events);
        }
        Ok(events)
    }

    /// Choose the track to play. Any previously loaded lyrics are dropped.
    ///
    /// Returns the generation the lyrics fetch must carry back.
    ///
    /// # Errors
    ///
    /// `EmptySelection` for a track without id or uri, `InvalidState` while a
    /// game is running.
    pub fn select_track(&mut self, track: Track) -> Result<(u64, Vec<SessionEvent>)> {
        if !track.is_selectable() {
            return Err(CoreError::EmptySelection);
        }
        self.ensure_not_running("select a track")?;

        info!(target: LOG_TARGET, "Selected track: {}", track);
        let mut events = Vec::new();
        self.generation += 1;
        self.track = Some(track);
        self.lyrics = None;
        self.clear_game();
        self.transition(GameState::TrackSelected, &mut events);
        Ok((self.generation, events))
    }

    /// Attach the lyrics fetched for the selected track.
    ///
    /// # Errors
    ///
    /// `StaleCompletion` if the selection changed or the session was reset
    /// while the fetch was in flight.
    pub fn lyrics_loaded(&mut self, generation: u64, store: Arc<LyricLineStore>) -> Result<()> {
        self.ensure_current(generation)?;
        if self.track.is_none() {
            return Err(CoreError::EmptySelection);
        }
        debug!(target: LOG_TARGET, "Lyrics attached: {} lines", store.len());
        self.lyrics = Some(store);
        Ok(())
    }

    /// Start (or restart) the game at `now_ms`.
    ///
    /// Resets score, line and typing progress, starts the clock and asks the
    /// host to start audio. If the first line begins at 0 it is current
    /// immediately.
    ///
    /// # Errors
    ///
    /// `InvalidState` without a selected track or loaded lyrics.
    pub fn start(&mut self, now_ms: u64) -> Result<Vec<SessionEvent>> {
        let Some(uri) = self.track.as_ref().map(|track| track.uri.clone()) else {
            return Err(self.invalid("start"));
        };
        if self.lyrics.is_none() {
            return Err(CoreError::InvalidState {
                action: "start",
                state: "no lyrics are loaded".into(),
            });
        }
        if matches!(self.state, GameState::Idle | GameState::Searching) {
            return Err(self.invalid("start"));
        }

        self.clear_game();
        self.clock.start(now_ms)?;
        info!(
            target: LOG_TARGET,
            "Game started with {} lines", self.total_lines()
        );

        let mut events = Vec::new();
        self.transition(GameState::Countdown, &mut events);
        events.push(SessionEvent::Playback(PlaybackCommand::Play { uri }));
        self.advance_by_time(now_ms, &mut events);
        Ok(events)
    }

    /// # Errors
    ///
    /// `InvalidState` unless counting down or playing.
    pub fn pause(&mut self, now_ms: u64) -> Result<Vec<SessionEvent>> {
        if !matches!(self.state, GameState::Countdown | GameState::Active) {
            return Err(self.invalid("pause"));
        }
        self.clock.pause(now_ms);
        self.resume_state = self.state;

        let mut events = Vec::new();
        self.transition(GameState::Paused, &mut events);
        events.push(SessionEvent::Playback(PlaybackCommand::Pause));
        Ok(events)
    }

    /// # Errors
    ///
    /// `InvalidState` unless paused.
    pub fn resume(&mut self, now_ms: u64) -> Result<Vec<SessionEvent>> {
        if self.state != GameState::Paused {
            return Err(self.invalid("resume"));
        }
        self.clock.resume(now_ms);

        let mut events = Vec::new();
        self.transition(self.resume_state, &mut events);
        events.push(SessionEvent::Playback(PlaybackCommand::Resume));
        Ok(events)
    }

    /// Pause when running, resume when paused.
    ///
    /// # Errors
    ///
    /// `InvalidState` when no game is in progress.
    pub fn toggle_pause(&mut self, now_ms: u64) -> Result<Vec<SessionEvent>> {
        if self.state == GameState::Paused {
            self.resume(now_ms)
        } else {
            self.pause(now_ms)
        }
    }

    /// Periodic update: re-resolve the current line and detect the end of
    /// the track. Does nothing unless counting down or playing.
    pub fn tick(&mut self, now_ms: u64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if matches!(self.state, GameState::Countdown | GameState::Active) {
            self.advance_by_time(now_ms, &mut events);
        }
        events
    }

    /// Apply one keystroke to the current line. Ignored unless playing.
    pub fn on_keystroke(&mut self, key: Keystroke) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state != GameState::Active {
            return events;
        }
        let Some(line) = self.current_normalized().cloned() else {
            return events;
        };

        let outcome = self.progress.apply(key, &line);
        match outcome {
            KeystrokeOutcome::Ignored => {}
            KeystrokeOutcome::Typed { correct, completed } => {
                self.chars_typed = self.chars_typed.saturating_add(1);
                if correct {
                    self.chars_correct = self.chars_correct.saturating_add(1);
                    self.score = self.score.saturating_add(1);
                }
                events.push(SessionEvent::Keystroke {
                    outcome,
                    score: self.score,
                });
                if completed {
                    self.advance_line(&mut events);
                }
            }
            KeystrokeOutcome::Erased { .. } => {
                self.score = self.score.saturating_sub(1);
                events.push(SessionEvent::Keystroke {
                    outcome,
                    score: self.score,
                });
            }
            KeystrokeOutcome::Skipped => {
                debug!(target: LOG_TARGET, "Skipping non-typeable line");
                self.advance_line(&mut events);
            }
        }
        events
    }

    /// Return to `Idle`, discarding the track, lyrics and all game progress.
    /// Results still in flight become stale. If audio was playing the host is
    /// asked to pause it.
    pub fn reset(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let was_playing = matches!(self.state, GameState::Countdown | GameState::Active);

        self.generation += 1;
        self.search_serial += 1;
        self.track = None;
        self.lyrics = None;
        self.clear_game();
        self.transition(GameState::Idle, &mut events);
        if was_playing {
            events.push(SessionEvent::Playback(PlaybackCommand::Pause));
        }
        events
    }

    fn advance_by_time(&mut self, now_ms: u64, events: &mut Vec<SessionEvent>) {
        let Some(store) = self.lyrics.clone() else {
            return;
        };
        let elapsed = self.clock.elapsed_ms(now_ms);

        let resolved = resolve_current_line(elapsed, store.lines(), self.current_line_index);
        if let Some(index) = resolved {
            if resolved != self.current_line_index {
                self.enter_line(index, events);
            }
        }

        if self.state == GameState::Ended {
            return;
        }
        if self.current_line_index == Some(store.last_index()) {
            let ends_at = store.line_end_ms(store.last_index(), self.final_line_grace_ms);
            if ends_at.is_some_and(|end| elapsed >= end) {
                debug!(target: LOG_TARGET, "Final line ran out at {}ms", elapsed);
                self.end_game(events);
            }
        }
    }

    fn advance_line(&mut self, events: &mut Vec<SessionEvent>) {
        let next = self.current_line_index.map_or(0, |index| index + 1);
        self.enter_line(next, events);
    }

    /// Make `index` current, skipping non-typeable lines when configured to.
    /// Moving past the last line ends the game.
    fn enter_line(&mut self, mut index: usize, events: &mut Vec<SessionEvent>) {
        loop {
            let Some(line) = self.lyrics.as_ref().and_then(|store| store.normalized(index)) else {
                self.end_game(events);
                return;
            };
            let skip = self.marker_advance == MarkerAdvance::Immediate && !line.is_typeable();

            self.current_line_index = Some(index);
            self.progress.clear();
            events.push(SessionEvent::LineChanged { index });
            if self.state == GameState::Countdown {
                self.transition(GameState::Active, events);
            }

            if !skip {
                return;
            }
            index += 1;
        }
    }

    fn end_game(&mut self, events: &mut Vec<SessionEvent>) {
        let summary = GameSummary {
            score: self.score,
            total_lines: self.total_lines(),
            accuracy_percent: accuracy_percent(
                self.score,
                self.total_lines(),
                self.points_per_line,
            ),
            chars_typed: self.chars_typed,
            chars_correct: self.chars_correct,
        };
        info!(
            target: LOG_TARGET,
            "Game ended: score {} ({:.1}%)", summary.score, summary.accuracy_percent
        );
        self.summary = Some(summary);
        self.progress.clear();
        self.transition(GameState::Ended, events);
        events.push(SessionEvent::GameEnded(summary));
    }

    fn clear_game(&mut self) {
        self.clock.reset();
        self.resume_state = GameState::Active;
        self.progress.clear();
        self.current_line_index = None;
        self.score = 0;
        self.chars_typed = 0;
        self.chars_correct = 0;
        self.summary = None;
    }

    fn transition(&mut self, to: GameState, events: &mut Vec<SessionEvent>) {
        let from = self.state;
        if from != to {
            debug!(target: LOG_TARGET, "State: {} -> {}", from, to);
            self.state = to;
            events.push(SessionEvent::StateChanged { from, to });
        }
    }

    fn ensure_not_running(&self, action: &'static str) -> Result<()> {
        if self.state.is_running() {
            Err(self.invalid(action))
        } else {
            Ok(())
        }
    }

    const fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(CoreError::StaleCompletion)
        }
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::InvalidState {
            action,
            state: self.state.to_string(),
        }
    }
}
