use crate::error::Result;
use crate::lyrics::{LyricLine, LyricLineStore};
use crate::provider::{LyricsSource, Track};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "typify::cache";

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS lyrics (
    id INTEGER PRIMARY KEY,
    provider TEXT NOT NULL,
    track_id TEXT NOT NULL,
    artist TEXT NOT NULL,
    track TEXT NOT NULL,
    line_count INTEGER NOT NULL,
    content TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    UNIQUE(provider, track_id)
);

CREATE INDEX IF NOT EXISTS idx_lyrics_fetched_at ON lyrics(fetched_at);
";

/// Cached lyrics entry
#[derive(Debug, Clone)]
pub struct CachedLyrics {
    pub id: i64,
    pub provider: String,
    pub track_id: String,
    pub artist: String,
    pub track: String,
    pub line_count: i64,
    /// JSON array of lyric lines
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

impl CachedLyrics {
    /// Rebuild the line store from the stored content.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid, non-empty line list.
    pub fn to_store(&self) -> Result<LyricLineStore> {
        let lines: Vec<LyricLine> = serde_json::from_str(&self.content)?;
        LyricLineStore::new(lines)
    }
}

/// SQLite-based lyrics cache keyed by provider track ID
pub struct LyricsCache {
    conn: Connection,
}

impl LyricsCache {
    /// Create a new cache at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the cache database cannot be created or opened.
    pub async fn new() -> Result<Self> {
        let cache_path = crate::paths::lyrics_cache_db_path();
        Self::open(&cache_path).await
    }

    /// Open a cache at a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!(target: LOG_TARGET, "Opening lyrics cache database at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        Self::init(conn, true).await
    }

    /// Open a throwaway cache held in memory
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, false).await
    }

    async fn init(conn: Connection, wal: bool) -> Result<Self> {
        conn.call(move |conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            if wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            Ok(())
        })
        .await?;

        debug!(target: LOG_TARGET, "Lyrics cache database initialized");
        Ok(Self { conn })
    }

    /// Look up lyrics by provider track ID (e.g. Spotify track ID)
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, provider: &str, track_id: &str) -> Result<Option<CachedLyrics>> {
        debug!(target: LOG_TARGET, "Looking up lyrics in cache: {}:{}", provider, track_id);
        let provider = provider.to_string();
        let track_id = track_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r"
                    SELECT id, provider, track_id, artist, track, line_count, content, fetched_at
                    FROM lyrics
                    WHERE provider = ?1 AND track_id = ?2
                ",
                )?;

                let result = stmt
                    .query_row(rusqlite::params![provider, track_id], |row| {
                        Ok(CachedLyrics {
                            id: row.get(0)?,
                            provider: row.get(1)?,
                            track_id: row.get(2)?,
                            artist: row.get(3)?,
                            track: row.get(4)?,
                            line_count: row.get(5)?,
                            content: row.get(6)?,
                            fetched_at: DateTime::from_timestamp(row.get::<_, i64>(7)?, 0)
                                .unwrap_or_else(Utc::now),
                        })
                    })
                    .optional()?;

                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    /// Store the lines fetched for a track, replacing any earlier entry
    ///
    /// # Errors
    ///
    /// Returns an error if the lines cannot be serialized or stored.
    pub async fn store(&self, provider: &str, track: &Track, lyrics: &LyricLineStore) -> Result<i64> {
        self.store_at(provider, track, lyrics, Utc::now().timestamp())
            .await
    }

    async fn store_at(
        &self,
        provider: &str,
        track: &Track,
        lyrics: &LyricLineStore,
        fetched_at: i64,
    ) -> Result<i64> {
        info!(
            target: LOG_TARGET,
            "Storing lyrics in cache: {} ({}:{}, {} lines)",
            track, provider, track.id, lyrics.len()
        );
        let content = serde_json::to_string(lyrics.lines())?;
        let line_count = i64::try_from(lyrics.len()).unwrap_or(i64::MAX);
        let provider = provider.to_string();
        let track_id = track.id.clone();
        let artist = track.artist_names();
        let name = track.name.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO lyrics (provider, track_id, artist, track, line_count, content, fetched_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(provider, track_id) DO UPDATE SET
                        artist = excluded.artist,
                        track = excluded.track,
                        line_count = excluded.line_count,
                        content = excluded.content,
                        fetched_at = excluded.fetched_at
                ",
                    rusqlite::params![
                        provider, track_id, artist, name, line_count, content, fetched_at
                    ],
                )?;

                let id = conn.query_row(
                    "SELECT id FROM lyrics WHERE provider = ?1 AND track_id = ?2",
                    rusqlite::params![provider, track_id],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await
            .map_err(Into::into)
    }

    /// Delete cache entries older than `ttl_days`
    ///
    /// # Errors
    ///
    /// Returns an error if the database cleanup fails.
    pub async fn cleanup(&self, ttl_days: u32) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - (i64::from(ttl_days) * 24 * 60 * 60);

        self.conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM lyrics WHERE fetched_at < ?1",
                    rusqlite::params![cutoff],
                )?;
                Ok(deleted)
            })
            .await
            .map_err(Into::into)
    }

    /// Checkpoint WAL for clean shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL checkpoint fails.
    pub async fn checkpoint(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

/// A [`LyricsSource`] that answers from the cache first and stores what the
/// wrapped source fetches. Cache failures are logged and never fail a fetch.
pub struct CachedLyricsSource {
    inner: Arc<dyn LyricsSource>,
    cache: Arc<LyricsCache>,
}

impl CachedLyricsSource {
    pub fn new(inner: Arc<dyn LyricsSource>, cache: Arc<LyricsCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl LyricsSource for CachedLyricsSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn fetch(&self, track: &Track) -> Result<LyricLineStore> {
        let provider = self.inner.name();

        match self.cache.get(provider, &track.id).await {
            Ok(Some(cached)) => match cached.to_store() {
                Ok(store) => {
                    debug!(target: LOG_TARGET, "Cache hit for {}:{}", provider, track.id);
                    return Ok(store);
                }
                Err(e) => warn!(target: LOG_TARGET, "Discarding unreadable cache entry: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!(target: LOG_TARGET, "Cache lookup failed: {}", e),
        }

        let store = self.inner.fetch(track).await?;
        if let Err(e) = self.cache.store(provider, track, &store).await {
            warn!(target: LOG_TARGET, "Failed to cache lyrics: {}", e);
        }
        Ok(store)
    }
}
