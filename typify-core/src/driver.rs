//! Async host loop around [`GameSession`].
//!
//! The driver owns the session on a single task and serialises everything
//! that touches it: periodic ticks, host commands and the completions of
//! collaborator calls. Collaborator calls run on their own tasks under a
//! timeout and report back through a channel together with the generation
//! they were issued under, so results that arrive after a reset or a new
//! selection are dropped instead of applied. Playback commands share a
//! single worker task so the player receives them in the order they were
//! issued.

use crate::config::GameConfig;
use crate::error::{CoreError, Result};
use crate::lyrics::LyricLineStore;
use crate::provider::{LyricsSource, PlaybackTrigger, Track, TrackSearch};
use crate::session::{
    GameSession, GameState, GameSummary, PlaybackCommand, SessionEvent, DEFAULT_VISIBLE_LINES,
};
use crate::time::TimeSource;
use crate::typing::{Keystroke, KeystrokeOutcome};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "typify::driver";

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Requests from the host.
#[derive(Debug, Clone)]
pub enum GameCommand {
    Search(String),
    RecentlyPlayed,
    Select(Track),
    Start,
    TogglePause,
    Key(Keystroke),
    Reset,
    Quit,
}

/// Notifications for the host.
#[derive(Debug, Clone)]
pub enum GameEvent {
    StateChanged { from: GameState, to: GameState },
    /// Search or recently-played results
    TracksListed { tracks: Vec<Track> },
    LyricsLoaded { track: Track, total_lines: usize },
    LineChanged { index: usize },
    Keystroke { outcome: KeystrokeOutcome, score: u32 },
    GameEnded(GameSummary),
    /// Non-fatal problem; the game carries on
    Warning { message: String },
    /// A request failed or was rejected; the session is unchanged
    Error { message: String },
}

/// A line in the host's display window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleLine {
    pub index: usize,
    pub text: String,
    /// What the player has to type for this line
    pub expected: String,
    pub is_current: bool,
    pub is_marker: bool,
}

/// Everything a host needs to draw one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameSnapshot {
    pub state: GameState,
    pub track: Option<Track>,
    pub score: u32,
    pub elapsed_ms: u64,
    pub current_line: Option<usize>,
    pub lines_reached: usize,
    pub total_lines: usize,
    pub typed_text: String,
    pub per_char_correct: Vec<bool>,
    pub visible_lines: Vec<VisibleLine>,
    pub summary: Option<GameSummary>,
}

impl GameSnapshot {
    fn capture(session: &GameSession, now_ms: u64) -> Self {
        let (lines_reached, total_lines) = session.line_progress();
        let visible_lines = session
            .lyrics()
            .map(|store| {
                session
                    .visible_window(DEFAULT_VISIBLE_LINES)
                    .filter_map(|index| {
                        let line = store.line(index)?;
                        let normalized = store.normalized(index)?;
                        Some(VisibleLine {
                            index,
                            text: line.raw_text.clone(),
                            expected: normalized.text().to_string(),
                            is_current: session.current_line_index() == Some(index),
                            is_marker: !normalized.is_typeable(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            state: session.state(),
            track: session.track().cloned(),
            score: session.score(),
            elapsed_ms: session.elapsed_ms(now_ms),
            current_line: session.current_line_index(),
            lines_reached,
            total_lines,
            typed_text: session.progress().typed_text().to_string(),
            per_char_correct: session.progress().per_char_correct().to_vec(),
            visible_lines,
            summary: session.summary().copied(),
        }
    }
}

/// The external services a game needs.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn TrackSearch>,
    pub lyrics: Arc<dyn LyricsSource>,
    pub playback: Arc<dyn PlaybackTrigger>,
}

/// Host-side handle to a running [`GameDriver`].
#[derive(Clone)]
pub struct GameHandle {
    commands: mpsc::Sender<GameCommand>,
    events: broadcast::Sender<GameEvent>,
    snapshot: watch::Receiver<GameSnapshot>,
    cancel: CancellationToken,
}

impl GameHandle {
    /// Queue a command. Returns false once the driver has stopped.
    pub async fn send(&self, command: GameCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// Receiver that is notified whenever the snapshot changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<GameSnapshot> {
        self.snapshot.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> GameSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

enum Completion {
    Tracks {
        serial: u64,
        result: Result<Vec<Track>>,
    },
    Lyrics {
        generation: u64,
        track: Track,
        result: Result<LyricLineStore>,
    },
    Playback {
        generation: u64,
        command: PlaybackCommand,
        result: Result<()>,
    },
}

struct PlaybackJob {
    generation: u64,
    command: PlaybackCommand,
}

pub struct GameDriver {
    session: GameSession,
    config: GameConfig,
    collaborators: Collaborators,
    time: Arc<dyn TimeSource>,
    commands: mpsc::Receiver<GameCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    playback_tx: mpsc::UnboundedSender<PlaybackJob>,
    playback_rx: Option<mpsc::UnboundedReceiver<PlaybackJob>>,
    event_tx: broadcast::Sender<GameEvent>,
    snapshot_tx: watch::Sender<GameSnapshot>,
    cancel: CancellationToken,
}

impl GameDriver {
    /// Create a driver and the handle the host uses to talk to it.
    /// Nothing runs until [`GameDriver::run`] is awaited or spawned.
    #[must_use]
    pub fn new(
        config: &GameConfig,
        collaborators: Collaborators,
        time: Arc<dyn TimeSource>,
        cancel: CancellationToken,
    ) -> (Self, GameHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(GameSnapshot::default());

        let handle = GameHandle {
            commands: command_tx,
            events: event_tx.clone(),
            snapshot: snapshot_rx,
            cancel: cancel.clone(),
        };

        let driver = Self {
            session: GameSession::new(config),
            config: config.clone(),
            collaborators,
            time,
            commands,
            completion_tx,
            completion_rx,
            playback_tx,
            playback_rx: Some(playback_rx),
            event_tx,
            snapshot_tx,
            cancel,
        };

        (driver, handle)
    }

    /// Run until cancelled, sent [`GameCommand::Quit`], or every handle is
    /// dropped.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if let Some(jobs) = self.playback_rx.take() {
            tokio::spawn(run_playback_worker(
                Arc::clone(&self.collaborators.playback),
                jobs,
                self.completion_tx.clone(),
                self.config.request_timeout(),
            ));
        }
        info!(
            target: LOG_TARGET,
            "Game driver started (tick every {:?})",
            self.config.tick_interval()
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!(target: LOG_TARGET, "Game driver cancelled");
                    break;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(GameCommand::Quit) | None => {
                            info!(target: LOG_TARGET, "Game driver stopping");
                            break;
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(completion) = self.completion_rx.recv() => {
                    self.handle_completion(completion);
                }
                _ = interval.tick() => {
                    let now = self.time.now_ms();
                    let events = self.session.tick(now);
                    self.forward(events);
                }
            }
            self.publish_snapshot();
        }
    }

    fn handle_command(&mut self, command: GameCommand) {
        debug!(target: LOG_TARGET, "Command: {:?}", command);
        let now = self.time.now_ms();

        match command {
            GameCommand::Search(query) => {
                let query = query.trim().to_string();
                if query.is_empty() {
                    self.report_error(&CoreError::EmptyQuery);
                    return;
                }
                let search = Arc::clone(&self.collaborators.search);
                self.begin_track_listing("search", async move { search.search(&query).await });
            }
            GameCommand::RecentlyPlayed => {
                let search = Arc::clone(&self.collaborators.search);
                self.begin_track_listing("recently played", async move { search.recent().await });
            }
            GameCommand::Select(track) => match self.session.select_track(track.clone()) {
                Ok((generation, events)) => {
                    self.forward(events);
                    let lyrics = Arc::clone(&self.collaborators.lyrics);
                    let fetch_track = track.clone();
                    self.spawn_call(
                        "lyrics fetch",
                        async move { lyrics.fetch(&fetch_track).await },
                        move |result| Completion::Lyrics {
                            generation,
                            track,
                            result,
                        },
                    );
                }
                Err(e) => self.report_error(&e),
            },
            GameCommand::Start => {
                let result = self.session.start(now);
                self.apply(result);
            }
            GameCommand::TogglePause => {
                let result = self.session.toggle_pause(now);
                self.apply(result);
            }
            GameCommand::Key(key) => {
                let events = self.session.on_keystroke(key);
                self.forward(events);
            }
            GameCommand::Reset => {
                let events = self.session.reset();
                self.forward(events);
            }
            GameCommand::Quit => {}
        }
    }

    fn begin_track_listing<F>(&mut self, operation: &'static str, call: F)
    where
        F: Future<Output = Result<Vec<Track>>> + Send + 'static,
    {
        match self.session.begin_search() {
            Ok((serial, events)) => {
                self.forward(events);
                self.spawn_call(operation, call, move |result| Completion::Tracks {
                    serial,
                    result,
                });
            }
            Err(e) => self.report_error(&e),
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Tracks { serial, result } => match self.session.finish_search(serial) {
                Ok(events) => {
                    self.forward(events);
                    match result {
                        Ok(tracks) => {
                            debug!(target: LOG_TARGET, "{} tracks listed", tracks.len());
                            self.emit(GameEvent::TracksListed { tracks });
                        }
                        Err(e) => self.report_error(&e),
                    }
                }
                Err(_) => debug!(target: LOG_TARGET, "Discarding stale track listing"),
            },
            Completion::Lyrics {
                generation,
                track,
                result,
            } => {
                if !self.session.is_current(generation) {
                    debug!(target: LOG_TARGET, "Discarding stale lyrics for {}", track);
                    return;
                }
                match result {
                    Ok(store) => {
                        let total_lines = store.len();
                        match self.session.lyrics_loaded(generation, Arc::new(store)) {
                            Ok(()) => {
                                info!(target: LOG_TARGET, "Lyrics ready: {} lines for {}", total_lines, track);
                                self.emit(GameEvent::LyricsLoaded { track, total_lines });
                            }
                            Err(e) => self.report_error(&e),
                        }
                    }
                    Err(e) => self.report_error(&e),
                }
            }
            Completion::Playback {
                generation,
                command,
                result,
            } => match result {
                Ok(()) => debug!(target: LOG_TARGET, "Playback command done: {:?}", command),
                Err(e) if self.session.is_current(generation) => {
                    warn!(target: LOG_TARGET, "Playback command {:?} failed: {}", command, e);
                    self.emit(GameEvent::Warning {
                        message: e.to_string(),
                    });
                }
                Err(e) => debug!(target: LOG_TARGET, "Ignoring stale playback failure: {}", e),
            },
        }
    }

    fn apply(&mut self, result: Result<Vec<SessionEvent>>) {
        match result {
            Ok(events) => self.forward(events),
            Err(e) => self.report_error(&e),
        }
    }

    fn forward(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::StateChanged { from, to } => {
                    self.emit(GameEvent::StateChanged { from, to });
                }
                SessionEvent::LineChanged { index } => self.emit(GameEvent::LineChanged { index }),
                SessionEvent::Keystroke { outcome, score } => {
                    self.emit(GameEvent::Keystroke { outcome, score });
                }
                SessionEvent::GameEnded(summary) => self.emit(GameEvent::GameEnded(summary)),
                SessionEvent::Playback(command) => self.dispatch_playback(command),
            }
        }
    }

    fn dispatch_playback(&self, command: PlaybackCommand) {
        let job = PlaybackJob {
            generation: self.session.generation(),
            command,
        };
        if self.playback_tx.send(job).is_err() {
            warn!(target: LOG_TARGET, "Playback worker is gone; command dropped");
        }
    }

    /// Run a collaborator call on its own task under the request timeout and
    /// feed its result back into the loop.
    fn spawn_call<F, T, W>(&self, operation: &'static str, call: F, wrap: W)
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
        W: FnOnce(Result<T>) -> Completion + Send + 'static,
    {
        let completion_tx = self.completion_tx.clone();
        let timeout = self.config.request_timeout();

        tokio::spawn(async move {
            let result = with_timeout(operation, timeout, call).await;
            // The driver may have stopped; nothing left to report to.
            let _ = completion_tx.send(wrap(result));
        });
    }

    fn report_error(&self, error: &CoreError) {
        if error.is_collaborator_failure() {
            warn!(target: LOG_TARGET, "{}", error);
        } else {
            debug!(target: LOG_TARGET, "Rejected: {}", error);
        }
        self.emit(GameEvent::Error {
            message: error.to_string(),
        });
    }

    fn emit(&self, event: GameEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish_snapshot(&self) {
        let snapshot = GameSnapshot::capture(&self.session, self.time.now_ms());
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn with_timeout<T, F>(operation: &'static str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
        Err(CoreError::network(
            operation,
            format!("timed out after {}s", timeout.as_secs()),
        ))
    })
}

/// Send playback commands one at a time, each under its own timeout, until
/// the driver drops its sender.
async fn run_playback_worker(
    playback: Arc<dyn PlaybackTrigger>,
    mut jobs: mpsc::UnboundedReceiver<PlaybackJob>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    timeout: Duration,
) {
    while let Some(PlaybackJob { generation, command }) = jobs.recv().await {
        let call = async {
            match &command {
                PlaybackCommand::Play { uri } => playback.play(uri).await,
                PlaybackCommand::Pause => playback.pause().await,
                PlaybackCommand::Resume => playback.resume().await,
            }
        };
        let result = with_timeout("playback command", timeout, call).await;
        let completion = Completion::Playback {
            generation,
            command,
            result,
        };
        if completion_tx.send(completion).is_err() {
            break;
        }
    }
    debug!(target: LOG_TARGET, "Playback worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricLine;
    use crate::time::MonotonicTimeSource;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeSearch;

    #[async_trait]
    impl TrackSearch for FakeSearch {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, query: &str) -> Result<Vec<Track>> {
            Ok(vec![Track::new("t1", "spotify:track:t1", query)])
        }

        async fn recent(&self) -> Result<Vec<Track>> {
            Err(CoreError::NoCredential)
        }
    }

    struct FakeLyrics {
        delay: Duration,
        lines: Vec<(u64, &'static str)>,
    }

    #[async_trait]
    impl LyricsSource for FakeLyrics {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch(&self, _track: &Track) -> Result<LyricLineStore> {
            tokio::time::sleep(self.delay).await;
            LyricLineStore::new(
                self.lines
                    .iter()
                    .map(|&(start, text)| LyricLine::new(start, text))
                    .collect(),
            )
        }
    }

    #[derive(Default)]
    struct FakePlayback {
        fail: bool,
        play_delay: Duration,
        commands: Mutex<Vec<String>>,
    }

    impl FakePlayback {
        fn record(&self, command: &str) -> Result<()> {
            self.commands.lock().unwrap().push(command.to_string());
            if self.fail {
                Err(CoreError::PlaybackCommandFailed {
                    reason: "No active Spotify devices found".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PlaybackTrigger for FakePlayback {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn play(&self, track_uri: &str) -> Result<()> {
            tokio::time::sleep(self.play_delay).await;
            self.record(&format!("play {track_uri}"))
        }

        async fn pause(&self) -> Result<()> {
            self.record("pause")
        }

        async fn resume(&self) -> Result<()> {
            self.record("resume")
        }
    }

    fn start_driver(
        lyrics: FakeLyrics,
        playback: Arc<FakePlayback>,
    ) -> (GameHandle, broadcast::Receiver<GameEvent>) {
        let collaborators = Collaborators {
            search: Arc::new(FakeSearch),
            lyrics: Arc::new(lyrics),
            playback,
        };
        let (driver, handle) = GameDriver::new(
            &GameConfig::default(),
            collaborators,
            Arc::new(MonotonicTimeSource::new()),
            CancellationToken::new(),
        );
        let events = handle.subscribe();
        tokio::spawn(driver.run());
        (handle, events)
    }

    async fn wait_for<F>(events: &mut broadcast::Receiver<GameEvent>, mut matches: F) -> GameEvent
    where
        F: FnMut(&GameEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                let event = events.recv().await.unwrap();
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn drain(events: &mut broadcast::Receiver<GameEvent>) -> Vec<GameEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    fn track() -> Track {
        Track::new("t1", "spotify:track:t1", "Song")
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_game_through_driver() {
        let playback = Arc::new(FakePlayback::default());
        let lyrics = FakeLyrics {
            delay: Duration::from_millis(50),
            lines: vec![(0, "Hi!"), (1000, "yo")],
        };
        let (handle, mut events) = start_driver(lyrics, Arc::clone(&playback));

        handle.send(GameCommand::Select(track())).await;
        wait_for(&mut events, |e| matches!(e, GameEvent::LyricsLoaded { total_lines: 2, .. })).await;

        handle.send(GameCommand::Start).await;
        wait_for(&mut events, |e| matches!(e, GameEvent::LineChanged { index: 0 })).await;

        for c in "hiyo".chars() {
            handle.send(GameCommand::Key(Keystroke::Char(c))).await;
        }
        let ended = wait_for(&mut events, |e| matches!(e, GameEvent::GameEnded(_))).await;
        let GameEvent::GameEnded(summary) = ended else {
            unreachable!()
        };
        assert_eq!(summary.score, 4);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.snapshot().state, GameState::Ended);
        assert_eq!(
            playback.commands.lock().unwrap().as_slice(),
            ["play spotify:track:t1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lyrics_discarded_after_reset() {
        let lyrics = FakeLyrics {
            delay: Duration::from_secs(5),
            lines: vec![(0, "late")],
        };
        let (handle, mut events) = start_driver(lyrics, Arc::new(FakePlayback::default()));

        handle.send(GameCommand::Select(track())).await;
        handle.send(GameCommand::Reset).await;
        tokio::time::sleep(Duration::from_secs(8)).await;

        let seen = drain(&mut events);
        assert!(!seen
            .iter()
            .any(|e| matches!(e, GameEvent::LyricsLoaded { .. })));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, GameState::Idle);
        assert_eq!(snapshot.total_lines, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lyrics_time_out() {
        let lyrics = FakeLyrics {
            delay: Duration::from_secs(30),
            lines: vec![(0, "never")],
        };
        let (handle, mut events) = start_driver(lyrics, Arc::new(FakePlayback::default()));

        handle.send(GameCommand::Select(track())).await;
        let error = wait_for(&mut events, |e| matches!(e, GameEvent::Error { .. })).await;
        let GameEvent::Error { message } = error else {
            unreachable!()
        };
        assert!(message.contains("timed out"));
        assert_eq!(handle.snapshot().state, GameState::TrackSelected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_failure_is_a_warning() {
        let playback = Arc::new(FakePlayback {
            fail: true,
            ..FakePlayback::default()
        });
        let lyrics = FakeLyrics {
            delay: Duration::ZERO,
            lines: vec![(0, "keep going"), (5000, "still")],
        };
        let (handle, mut events) = start_driver(lyrics, playback);

        handle.send(GameCommand::Select(track())).await;
        wait_for(&mut events, |e| matches!(e, GameEvent::LyricsLoaded { .. })).await;
        handle.send(GameCommand::Start).await;

        let warning = wait_for(&mut events, |e| matches!(e, GameEvent::Warning { .. })).await;
        let GameEvent::Warning { message } = warning else {
            unreachable!()
        };
        assert!(message.contains("No active Spotify devices"));
        assert_eq!(handle.snapshot().state, GameState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_results_and_empty_query() {
        let lyrics = FakeLyrics {
            delay: Duration::ZERO,
            lines: vec![(0, "x")],
        };
        let (handle, mut events) = start_driver(lyrics, Arc::new(FakePlayback::default()));

        handle.send(GameCommand::Search("   ".into())).await;
        let error = wait_for(&mut events, |e| matches!(e, GameEvent::Error { .. })).await;
        assert!(matches!(error, GameEvent::Error { ref message } if message == "Please enter a search query"));

        handle.send(GameCommand::Search("numb".into())).await;
        let listed = wait_for(&mut events, |e| matches!(e, GameEvent::TracksListed { .. })).await;
        let GameEvent::TracksListed { tracks } = listed else {
            unreachable!()
        };
        assert_eq!(tracks[0].name, "numb");

        handle.send(GameCommand::RecentlyPlayed).await;
        let error = wait_for(&mut events, |e| matches!(e, GameEvent::Error { .. })).await;
        assert!(matches!(error, GameEvent::Error { ref message } if message.contains("log in")));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.snapshot().state, GameState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_toggle_mirrors_playback() {
        let playback = Arc::new(FakePlayback::default());
        let lyrics = FakeLyrics {
            delay: Duration::ZERO,
            lines: vec![(0, "one"), (60_000, "two")],
        };
        let (handle, mut events) = start_driver(lyrics, Arc::clone(&playback));

        handle.send(GameCommand::Select(track())).await;
        wait_for(&mut events, |e| matches!(e, GameEvent::LyricsLoaded { .. })).await;
        handle.send(GameCommand::Start).await;
        handle.send(GameCommand::TogglePause).await;
        wait_for(&mut events, |e| {
            matches!(e, GameEvent::StateChanged { to: GameState::Paused, .. })
        })
        .await;

        let frozen = handle.snapshot().elapsed_ms;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.snapshot().elapsed_ms, frozen);

        handle.send(GameCommand::TogglePause).await;
        wait_for(&mut events, |e| {
            matches!(e, GameEvent::StateChanged { to: GameState::Active, .. })
        })
        .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            playback.commands.lock().unwrap().as_slice(),
            ["play spotify:track:t1", "pause", "resume"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_commands_keep_issue_order() {
        let playback = Arc::new(FakePlayback {
            play_delay: Duration::from_millis(300),
            ..FakePlayback::default()
        });
        let lyrics = FakeLyrics {
            delay: Duration::ZERO,
            lines: vec![(0, "one"), (60_000, "two")],
        };
        let (handle, mut events) = start_driver(lyrics, Arc::clone(&playback));

        handle.send(GameCommand::Select(track())).await;
        wait_for(&mut events, |e| matches!(e, GameEvent::LyricsLoaded { .. })).await;
        handle.send(GameCommand::Start).await;
        handle.send(GameCommand::TogglePause).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(handle.snapshot().state, GameState::Paused);
        assert_eq!(
            playback.commands.lock().unwrap().as_slice(),
            ["play spotify:track:t1", "pause"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_driver() {
        let collaborators = Collaborators {
            search: Arc::new(FakeSearch),
            lyrics: Arc::new(FakeLyrics {
                delay: Duration::ZERO,
                lines: vec![(0, "x")],
            }),
            playback: Arc::new(FakePlayback::default()),
        };
        let cancel = CancellationToken::new();
        let (driver, handle) = GameDriver::new(
            &GameConfig::default(),
            collaborators,
            Arc::new(MonotonicTimeSource::new()),
            cancel.clone(),
        );
        let task = tokio::spawn(driver.run());

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!handle.send(GameCommand::Start).await);
    }
}
