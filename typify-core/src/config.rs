use crate::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for the line-resolution cadence. Slower ticks make line
/// transitions visibly lag behind the music.
pub const MAX_TICK_INTERVAL_MS: u64 = 200;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypifyConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// How a non-lyric marker line (instrumental passage) is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerAdvance {
    /// Skip the marker on the next keystroke, which is consumed without scoring.
    #[default]
    OnNextInput,
    /// Skip the marker as soon as it becomes the current line.
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// How long the final line stays current when the lyrics carry no end time.
    #[serde(default = "default_final_line_grace")]
    pub final_line_grace_ms: u64,
    #[serde(default)]
    pub marker_advance: MarkerAdvance,
    /// Denominator per line for the end-of-game accuracy heuristic.
    #[serde(default = "default_points_per_line")]
    pub accuracy_points_per_line: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

const fn default_tick_interval() -> u64 {
    100
}

const fn default_final_line_grace() -> u64 {
    5000
}

const fn default_points_per_line() -> u32 {
    100
}

const fn default_request_timeout() -> u64 {
    10
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            final_line_grace_ms: default_final_line_grace(),
            marker_advance: MarkerAdvance::default(),
            accuracy_points_per_line: default_points_per_line(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GameConfig {
    /// Tick interval, clamped to `1..=MAX_TICK_INTERVAL_MS`.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.clamp(1, MAX_TICK_INTERVAL_MS))
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Base URL of the synced-lyrics endpoint
    #[serde(default = "default_lyrics_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_days: u32,
}

fn default_lyrics_endpoint() -> String {
    "http://localhost:8000".into()
}

const fn default_true() -> bool {
    true
}

const fn default_cache_ttl() -> u32 {
    30
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_lyrics_endpoint(),
            cache_enabled: true,
            cache_ttl_days: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to ~/.config/typify/typify.log
    #[serde(default)]
    pub enabled: bool,
}

/// Provider-specific sections (`[providers.<name>]`), parsed on demand by the
/// crate that owns each provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(toml::Table);

impl ProvidersConfig {
    /// Parse the section for `name` into a provider's config type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] if the section exists but does not
    /// match the expected shape.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.0
            .get(name)
            .cloned()
            .map(|value| {
                value.try_into().map_err(|e: toml::de::Error| CoreError::ConfigInvalid {
                    message: format!("providers.{name}: {e}"),
                })
            })
            .transpose()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl TypifyConfig {
    /// Get the configuration directory path (~/.config/typify/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/typify/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location, or create a template on first run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template, or an
    /// error if the file cannot be read or parsed.
    pub fn load_or_create(provider_templates: Option<&[&str]>) -> Result<Self> {
        Self::load_or_create_at(&Self::config_path(), provider_templates)
    }

    /// Same as [`TypifyConfig::load_or_create`] for an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after writing a template, or an
    /// error if the file cannot be read or parsed.
    pub fn load_or_create_at(path: &Path, provider_templates: Option<&[&str]>) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, build_config_template(provider_templates))?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a game setting is out of range.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.game.accuracy_points_per_line == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "game.accuracy_points_per_line must be greater than 0".into(),
            });
        }
        if self.game.request_timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "game.request_timeout_secs must be greater than 0".into(),
            });
        }
        if self.lyrics.endpoint.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "lyrics.endpoint".into(),
            });
        }
        Ok(())
    }
}

/// Build the full config template, appending each provider's section.
#[must_use]
pub fn build_config_template(provider_templates: Option<&[&str]>) -> String {
    let mut template = String::from(BASE_CONFIG_TEMPLATE);
    for provider in provider_templates.unwrap_or_default() {
        template.push('\n');
        template.push_str(provider);
    }
    template
}

const BASE_CONFIG_TEMPLATE: &str = r#"# typify configuration
# ~/.config/typify/config.toml

[game]
# How often the current lyric line is re-resolved (capped at 200)
tick_interval_ms = 100
# How long the last line stays on screen when the lyrics carry no end time
final_line_grace_ms = 5000
# Instrumental marker lines: "on_next_input" or "immediate"
marker_advance = "on_next_input"
# End-of-game accuracy = score / (lines * accuracy_points_per_line)
accuracy_points_per_line = 100
# Timeout for search, lyrics and playback requests
request_timeout_secs = 10

[lyrics]
# Synced lyrics endpoint, queried as <endpoint>?trackid=<spotify track id>
endpoint = "http://localhost:8000"
cache_enabled = true
cache_ttl_days = 30

[logging]
# Write logs to ~/.config/typify/typify.log
enabled = false
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct DummyProvider {
        client_id: String,
        #[serde(default)]
        limit: u32,
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config = TypifyConfig::parse(&build_config_template(None)).unwrap();
        assert_eq!(config.game.tick_interval_ms, 100);
        assert_eq!(config.game.final_line_grace_ms, 5000);
        assert_eq!(config.game.marker_advance, MarkerAdvance::OnNextInput);
        assert_eq!(config.game.accuracy_points_per_line, 100);
        assert_eq!(config.lyrics.endpoint, "http://localhost:8000");
        assert!(config.lyrics.cache_enabled);
        assert!(!config.logging.enabled);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TypifyConfig::parse("").unwrap();
        assert_eq!(config.game.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.lyrics.cache_ttl_days, 30);
    }

    #[test]
    fn test_tick_interval_is_capped() {
        let config = TypifyConfig::parse("[game]\ntick_interval_ms = 1000\n").unwrap();
        assert_eq!(config.game.tick_interval(), Duration::from_millis(200));

        let config = TypifyConfig::parse("[game]\ntick_interval_ms = 0\n").unwrap();
        assert_eq!(config.game.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_marker_advance_immediate() {
        let config = TypifyConfig::parse("[game]\nmarker_advance = \"immediate\"\n").unwrap();
        assert_eq!(config.game.marker_advance, MarkerAdvance::Immediate);
    }

    #[test]
    fn test_zero_points_per_line_rejected() {
        let result = TypifyConfig::parse("[game]\naccuracy_points_per_line = 0\n");
        assert!(matches!(result, Err(CoreError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_blank_endpoint_rejected() {
        let result = TypifyConfig::parse("[lyrics]\nendpoint = \" \"\n");
        assert!(matches!(result, Err(CoreError::ConfigMissingField { .. })));
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let result = TypifyConfig::parse("[game\n");
        assert!(matches!(result, Err(CoreError::ConfigParseError(_))));
    }

    #[test]
    fn test_providers_typed_extraction() {
        let config = TypifyConfig::parse(
            "[providers.dummy]\nclient_id = \"abc\"\nlimit = 5\n",
        )
        .unwrap();
        let dummy: DummyProvider = config.providers.get("dummy").unwrap().unwrap();
        assert_eq!(dummy.client_id, "abc");
        assert_eq!(dummy.limit, 5);
        assert!(config.providers.contains("dummy"));
        assert!(config
            .providers
            .get::<DummyProvider>("missing")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_providers_wrong_shape() {
        let config = TypifyConfig::parse("[providers.dummy]\nlimit = 5\n").unwrap();
        let result = config.providers.get::<DummyProvider>("dummy");
        assert!(matches!(result, Err(CoreError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_template_appends_providers() {
        let template = build_config_template(Some(&["[providers.dummy]\nclient_id = \"\"\n"]));
        assert!(template.contains("[providers.dummy]"));
        assert!(template.starts_with("# typify configuration"));
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = std::env::temp_dir().join(format!("typify-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME_FOR_TEST);
        let _ = fs::remove_dir_all(&dir);

        let first = TypifyConfig::load_or_create_at(&path, None);
        assert!(matches!(first, Err(CoreError::ConfigNotFound { .. })));
        assert!(path.exists());

        let second = TypifyConfig::load_or_create_at(&path, None).unwrap();
        assert_eq!(second.game.tick_interval_ms, 100);

        let _ = fs::remove_dir_all(&dir);
    }

    const CONFIG_FILE_NAME_FOR_TEST: &str = crate::paths::CONFIG_FILE_NAME;
}
