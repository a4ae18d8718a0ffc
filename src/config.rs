use anyhow::Result;
use std::{fmt, path::PathBuf, time::Duration};

use crate::sources::invidious::DEFAULT_INSTANCES;

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Cola
    pub default_volume: u8,
    pub max_queue_size: usize,

    // Tiempos (en segundos)
    pub connect_timeout_secs: u64,
    pub api_timeout_secs: u64,
    pub resolve_timeout_secs: u64,
    pub early_end_secs: u64,

    // Política de fallos
    pub max_consecutive_failures: u32,

    // Aprendizaje de duraciones
    pub duration_cache_capacity: usize,
    pub duration_cache_trim: usize,

    // Fuentes
    pub ytdlp_path: String,
    pub invidious_instances: Vec<String>,

    // Playlists para el modo loop
    pub playlists_path: Option<PathBuf>,
    pub loop_playlist: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            connect_timeout_secs: std::env::var("CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            api_timeout_secs: std::env::var("API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()?,
            resolve_timeout_secs: std::env::var("RESOLVE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "25".to_string())
                .parse()?,
            early_end_secs: std::env::var("EARLY_END_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            max_consecutive_failures: std::env::var("MAX_CONSECUTIVE_FAILURES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,

            duration_cache_capacity: std::env::var("DURATION_CACHE_CAPACITY")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            duration_cache_trim: std::env::var("DURATION_CACHE_TRIM")
                .unwrap_or_else(|_| "800".to_string())
                .parse()?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            invidious_instances: match std::env::var("INVIDIOUS_INSTANCES") {
                Ok(val) if !val.trim().is_empty() => parse_list(&val),
                _ => DEFAULT_INSTANCES.iter().map(|s| s.to_string()).collect(),
            },

            playlists_path: std::env::var("PLAYLISTS_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            loop_playlist: std::env::var("LOOP_PLAYLIST").unwrap_or_else(|_| "loop".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and prefix must not be empty
    /// - Default volume must be within the 0-10 scale used by `!volume`
    /// - Timeouts, queue size and failure cap must be non-zero
    /// - The duration cache trim target must be below its capacity
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN cannot be empty");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if self.default_volume > crate::audio::queue::MAX_VOLUME {
            anyhow::bail!(
                "Default volume must be between 0 and {}, got: {}",
                crate::audio::queue::MAX_VOLUME,
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.connect_timeout_secs == 0
            || self.api_timeout_secs == 0
            || self.resolve_timeout_secs == 0
        {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        if self.duration_cache_trim >= self.duration_cache_capacity {
            anyhow::bail!(
                "Duration cache trim ({}) must be lower than its capacity ({})",
                self.duration_cache_trim,
                self.duration_cache_capacity
            );
        }

        if self.invidious_instances.is_empty() {
            anyhow::bail!("At least one Invidious instance is required");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: '{}'\n  \
            Queue: vol {}/10, max {} tracks\n  \
            Timeouts: connect {}, api {}, resolve {}\n  \
            Playback: early end < {}, abort after {} failures\n  \
            Learner: {} records (trim to {})\n  \
            Sources: {} + {} Invidious instances\n  \
            Loop: '{}' from {}",
            self.command_prefix,
            self.default_volume,
            self.max_queue_size,
            humantime::format_duration(self.connect_timeout()),
            humantime::format_duration(self.api_timeout()),
            humantime::format_duration(self.resolve_timeout()),
            humantime::format_duration(self.early_end()),
            self.max_consecutive_failures,
            self.duration_cache_capacity,
            self.duration_cache_trim,
            self.ytdlp_path,
            self.invidious_instances.len(),
            self.loop_playlist,
            self.playlists_path
                .as_ref()
                .map_or("<sin archivo>".to_string(), |p| p.display().to_string()),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn early_end(&self) -> Duration {
        Duration::from_secs(self.early_end_secs)
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (el token no tiene valor por defecto)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: 5,
            max_queue_size: 100,

            connect_timeout_secs: 15,
            api_timeout_secs: 8,
            resolve_timeout_secs: 25,
            early_end_secs: 5,

            max_consecutive_failures: 3,

            duration_cache_capacity: 1000,
            duration_cache_trim: 800,

            ytdlp_path: "yt-dlp".to_string(),
            invidious_instances: DEFAULT_INSTANCES.iter().map(|s| s.to_string()).collect(),

            playlists_path: None,
            loop_playlist: "loop".to_string(),
        }
    }
}

// El token nunca aparece en logs ni en `{:?}`
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"***")
            .field("command_prefix", &self.command_prefix)
            .field("default_volume", &self.default_volume)
            .field("max_queue_size", &self.max_queue_size)
            .field("ytdlp_path", &self.ytdlp_path)
            .field("invidious_instances", &self.invidious_instances)
            .field("playlists_path", &self.playlists_path)
            .field("loop_playlist", &self.loop_playlist)
            .finish_non_exhaustive()
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_with_token_is_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_scale_volume() {
        let config = Config {
            default_volume: 11,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_trim_above_capacity() {
        let config = Config {
            duration_cache_capacity: 100,
            duration_cache_trim: 100,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_output_hides_token() {
        let config = Config {
            discord_token: "MTIz.secreto.abc".to_string(),
            ..Config::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secreto"));
        assert!(debug.contains("command_prefix: \"!\""));
    }

    #[test]
    fn test_summary_hides_token() {
        let summary = valid().summary();
        assert!(!summary.contains("token"));
        assert!(summary.contains("15s"));
    }

    #[test]
    fn test_parse_list_trims_entries() {
        assert_eq!(
            parse_list(" https://a.example/ , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
