use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::progress::ProgressSettings;
use crate::audio::session::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub queue_page_size: usize,

    // Progreso
    pub progress_interval: u64,       // En segundos
    pub progress_suppress_after: u64, // Reproducciones antes de silenciar los ticks

    // Resolución
    pub ytdlp_path: String,
    pub resolve_timeout: u64,   // En segundos
    pub max_song_duration: u64, // En segundos

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            queue_page_size: std::env::var("QUEUE_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Progreso
            progress_interval: std::env::var("PROGRESS_INTERVAL")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            progress_suppress_after: std::env::var("PROGRESS_SUPPRESS_AFTER")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            // Resolución
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            resolve_timeout: std::env::var("RESOLVE_TIMEOUT")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
            max_song_duration: std::env::var("MAX_SONG_DURATION")
                .unwrap_or_else(|_| "7200".to_string()) // 2 horas
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "/app/data".to_string())
                .into(),
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "/app/cache".to_string())
                .into(),
            uploads_dir: std::env::var("UPLOADS_DIR")
                .unwrap_or_else(|_| "/app/uploads".to_string())
                .into(),
        };

        // Validar antes de tocar el disco
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;
        std::fs::create_dir_all(&config.uploads_dir)?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Catches the usual mistakes (empty token, volume outside 0.0-2.0,
    /// zero-sized limits, a cache directory overlapping persistent data)
    /// before the bot connects to Discord.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.progress_interval == 0 {
            anyhow::bail!("Progress interval must be greater than 0");
        }

        if self.resolve_timeout == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        // El cache se vacía al arrancar; no puede compartir árbol con datos persistentes
        for (name, dir) in [("DATA_DIR", &self.data_dir), ("UPLOADS_DIR", &self.uploads_dir)] {
            if self.cache_dir.starts_with(dir) || dir.starts_with(&self.cache_dir) {
                anyhow::bail!(
                    "CACHE_DIR ({}) must not overlap {} ({})",
                    self.cache_dir.display(),
                    name,
                    dir.display()
                );
            }
        }

        Ok(())
    }

    /// Ajustes que comparte cada sesión de guild
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            default_volume: self.default_volume,
            max_queue_size: self.max_queue_size,
            progress: ProgressSettings {
                interval: Duration::from_secs(self.progress_interval),
                suppress_after: self.progress_suppress_after,
            },
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix '{}'\n  \
            Audio: {}% vol, {} queue, {} per page\n  \
            Progress: every {}s, quiet after {} plays\n  \
            Resolver: {} ({}s timeout, {}s max duration)\n  \
            Paths: data={}, cache={}, uploads={}",
            self.command_prefix,
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.queue_page_size,
            self.progress_interval,
            self.progress_suppress_after,
            self.ytdlp_path,
            self.resolve_timeout,
            self.max_song_duration,
            self.data_dir.display(),
            self.cache_dir.display(),
            self.uploads_dir.display(),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (el token no tiene default)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            default_volume: 1.0,
            max_queue_size: 1000,
            queue_page_size: 10,

            progress_interval: 10,
            progress_suppress_after: 30,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout: 120,
            max_song_duration: 7200,

            data_dir: "/app/data".into(),
            cache_dir: "/app/cache".into(),
            uploads_dir: "/app/uploads".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid() -> Config {
        Config {
            discord_token: "token-secreto".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults_validate_once_token_is_set() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let cases = [
            Config { default_volume: 2.5, ..valid() },
            Config { default_volume: -0.1, ..valid() },
            Config { max_queue_size: 0, ..valid() },
            Config { queue_page_size: 0, ..valid() },
            Config { progress_interval: 0, ..valid() },
            Config { command_prefix: " ".to_string(), ..valid() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn test_rejects_cache_dir_overlapping_persistent_dirs() {
        let cases = [
            Config { cache_dir: "/app/data".into(), ..valid() },
            Config { cache_dir: "/app/data/cache".into(), ..valid() },
            Config { cache_dir: "/app".into(), ..valid() },
            Config { cache_dir: "/app/uploads/".into(), ..valid() },
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("must not overlap"), "{}", err);
        }

        let sibling = Config { cache_dir: "/app/data-cache".into(), ..valid() };
        assert!(sibling.validate().is_ok());
    }

    #[test]
    fn test_session_settings_mapping() {
        let config = Config {
            default_volume: 0.8,
            max_queue_size: 50,
            progress_interval: 5,
            progress_suppress_after: 3,
            ..valid()
        };

        let settings = config.session_settings();
        assert_eq!(settings.default_volume, 0.8);
        assert_eq!(settings.max_queue_size, 50);
        assert_eq!(settings.progress.interval, Duration::from_secs(5));
        assert_eq!(settings.progress.suppress_after, 3);
    }

    #[test]
    fn test_summary_hides_token() {
        let summary = valid().summary();
        assert!(!summary.contains("token-secreto"));
        assert!(summary.contains("100% vol"));
    }
}
