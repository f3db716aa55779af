//! Timed lyric lines for one track.

use crate::error::{CoreError, Result};
use crate::normalize::{normalize, NormalizedLine};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

const LOG_TARGET: &str = "typify::lyrics";

/// One timed caption of a track's lyrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Offset from track start at which the line begins
    pub start_time_ms: u64,
    /// Offset at which the line ends, when the source provides one
    pub end_time_ms: Option<u64>,
    /// Text as delivered by the lyrics service
    pub raw_text: String,
}

impl LyricLine {
    pub fn new(start_time_ms: u64, raw_text: impl Into<String>) -> Self {
        Self {
            start_time_ms,
            end_time_ms: None,
            raw_text: raw_text.into(),
        }
    }

    #[must_use]
    pub const fn with_end(mut self, end_time_ms: u64) -> Self {
        self.end_time_ms = Some(end_time_ms);
        self
    }
}

/// Ordered, immutable lyric lines with their normalized forms cached.
///
/// Never empty, and start times are non-decreasing across the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLineStore {
    lines: Vec<LyricLine>,
    normalized: Vec<NormalizedLine>,
}

impl LyricLineStore {
    /// Build a store from lines in any order. Lines are stably sorted by start
    /// time so equal start times keep their delivery order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LyricsUnavailable`] if `lines` is empty.
    pub fn new(mut lines: Vec<LyricLine>) -> Result<Self> {
        if lines.is_empty() {
            return Err(CoreError::LyricsUnavailable {
                reason: "lyrics contain no lines".into(),
            });
        }

        if lines
            .windows(2)
            .any(|pair| pair[0].start_time_ms > pair[1].start_time_ms)
        {
            warn!(target: LOG_TARGET, "Lyric lines arrived out of order, sorting by start time");
            lines.sort_by_key(|line| line.start_time_ms);
        }

        let normalized = lines.iter().map(|line| normalize(&line.raw_text)).collect();
        debug!(target: LOG_TARGET, "Loaded {} lyric lines", lines.len());

        Ok(Self { lines, normalized })
    }

    /// Build a store from the lyrics service payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LyricsUnavailable`] when the payload reports an
    /// error, is not time-synced, or carries no usable lines.
    pub fn from_payload(payload: LyricsPayload) -> Result<Self> {
        let body = match payload {
            LyricsPayload::Lyrics { lyrics } => lyrics,
            LyricsPayload::Error { message } => {
                return Err(CoreError::LyricsUnavailable {
                    reason: message.unwrap_or_else(|| "lyrics service reported an error".into()),
                });
            }
        };

        if !body.is_synced() {
            return Err(CoreError::LyricsUnavailable {
                reason: format!("lyrics are not time-synced ({})", body.sync_type),
            });
        }

        let lines = body
            .lines
            .into_iter()
            .filter_map(|line| {
                let Some(start_time_ms) = line.start_time_ms else {
                    warn!(target: LOG_TARGET, "Skipping lyric line without start time: {:?}", line.words);
                    return None;
                };
                Some(LyricLine {
                    start_time_ms,
                    end_time_ms: line.end_time_ms.filter(|&end| end > 0),
                    raw_text: line.words,
                })
            })
            .collect();

        Self::new(lines)
    }

    /// Parse the lyrics service JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JsonError`] for malformed JSON, otherwise as
    /// [`LyricLineStore::from_payload`].
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_payload(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    #[must_use]
    pub fn normalized(&self, index: usize) -> Option<&NormalizedLine> {
        self.normalized.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.lines.len() - 1
    }

    /// Offset at which the line at `index` stops being current: its own end
    /// time, otherwise `start + grace_ms`.
    #[must_use]
    pub fn line_end_ms(&self, index: usize, grace_ms: u64) -> Option<u64> {
        self.lines.get(index).map(|line| {
            line.end_time_ms
                .filter(|&end| end >= line.start_time_ms)
                .unwrap_or_else(|| line.start_time_ms.saturating_add(grace_ms))
        })
    }

    /// Index range of `size` lines centred on `current`, clamped to the
    /// store bounds. Before the first line starts the window opens at 0.
    #[must_use]
    pub fn visible_window(&self, current: Option<usize>, size: usize) -> std::ops::Range<usize> {
        let len = self.lines.len();
        let size = size.min(len);
        let center = current.unwrap_or(0).min(len.saturating_sub(1));
        let start = center.saturating_sub(size / 2).min(len - size);
        start..start + size
    }
}

/// JSON returned by the lyrics service.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LyricsPayload {
    Lyrics { lyrics: LyricsBody },
    Error { message: Option<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LyricsBody {
    #[serde(rename = "syncType", default)]
    pub sync_type: String,
    #[serde(default)]
    pub lines: Vec<LyricsPayloadLine>,
}

impl LyricsBody {
    #[must_use]
    pub fn is_synced(&self) -> bool {
        matches!(self.sync_type.as_str(), "LINE_SYNCED" | "SYLLABLE_SYNCED")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LyricsPayloadLine {
    #[serde(rename = "startTimeMs", default, deserialize_with = "millis")]
    pub start_time_ms: Option<u64>,
    #[serde(default)]
    pub words: String,
    #[serde(rename = "endTimeMs", default, deserialize_with = "millis")]
    pub end_time_ms: Option<u64>,
}

/// The service sends millisecond offsets as decimal strings; accept numbers too.
fn millis<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Millis>::deserialize(deserializer)? {
        Some(Millis::Number(ms)) => Some(ms),
        Some(Millis::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}
