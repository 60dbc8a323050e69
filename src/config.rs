use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // YouTube
    pub youtube_api_key: String,
    pub search_timeout_secs: u64,

    // Audio
    pub music_dir: PathBuf,
    pub default_volume: f32,
    pub ytdlp_format: String,
    pub audio_extension: String,

    // Cola
    pub max_queue_size: usize,
    pub tick_interval_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Builds the config from any key/value source, applying defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            command_prefix: var("COMMAND_PREFIX", "~"),

            youtube_api_key: lookup("YOUTUBE_API_KEY").context("YOUTUBE_API_KEY is not set")?,
            search_timeout_secs: var("SEARCH_TIMEOUT_SECS", "10")
                .parse()
                .context("SEARCH_TIMEOUT_SECS must be a whole number of seconds")?,

            music_dir: var("MUSIC_DIR", "./music").into(),
            default_volume: var("DEFAULT_VOLUME", "0.5")
                .parse()
                .context("DEFAULT_VOLUME must be a number")?,
            ytdlp_format: var("YTDLP_FORMAT", "bestaudio[ext=m4a]/bestaudio"),
            audio_extension: var("AUDIO_EXTENSION", "m4a"),

            max_queue_size: var("MAX_QUEUE_SIZE", "100")
                .parse()
                .context("MAX_QUEUE_SIZE must be a whole number")?,
            tick_interval_ms: var("TICK_INTERVAL_MS", "1000")
                .parse()
                .context("TICK_INTERVAL_MS must be a whole number of milliseconds")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// - Tokens must not be blank
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size, tick interval and search timeout must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is empty");
        }

        if self.youtube_api_key.trim().is_empty() {
            anyhow::bail!("YOUTUBE_API_KEY is empty");
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

        if self.tick_interval_ms == 0 {
            anyhow::bail!("Tick interval must be greater than 0");
        }

        if self.search_timeout_secs == 0 {
            anyhow::bail!("Search timeout must be greater than 0");
        }

        if self.audio_extension.is_empty() || self.audio_extension.contains(['/', '.']) {
            anyhow::bail!("Invalid audio extension: {:?}", self.audio_extension);
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging, without secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix {:?}\n  \
            Audio: {}% vol, {} via yt-dlp ({}), saved to {}\n  \
            Limits: {} queue, {}ms tick, {}s search timeout",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.audio_extension,
            self.ytdlp_format,
            self.music_dir.display(),
            self.max_queue_size,
            self.tick_interval_ms,
            self.search_timeout_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("DISCORD_TOKEN", "token"), ("YOUTUBE_API_KEY", "key")];

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = from(&REQUIRED).unwrap();

        assert_eq!(config.command_prefix, "~");
        assert_eq!(config.music_dir, PathBuf::from("./music"));
        assert_eq!(config.default_volume, 0.5);
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.search_timeout(), Duration::from_secs(10));
        assert_eq!(config.ytdlp_format, "bestaudio[ext=m4a]/bestaudio");
        assert_eq!(config.audio_extension, "m4a");
        config.validate().unwrap();
    }

    #[test]
    fn missing_secrets_are_errors() {
        assert!(from(&[("DISCORD_TOKEN", "token")]).is_err());
        assert!(from(&[("YOUTUBE_API_KEY", "key")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("COMMAND_PREFIX", "!"),
            ("MAX_QUEUE_SIZE", "5"),
            ("DEFAULT_VOLUME", "1.5"),
        ]);

        let config = from(&vars).unwrap();

        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.max_queue_size, 5);
        assert_eq!(config.default_volume, 1.5);
    }

    #[test]
    fn validation_rejects_bad_values() {
        for (key, value) in [
            ("DEFAULT_VOLUME", "3.0"),
            ("MAX_QUEUE_SIZE", "0"),
            ("TICK_INTERVAL_MS", "0"),
            ("AUDIO_EXTENSION", "../m4a"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            let config = from(&vars).unwrap();
            assert!(config.validate().is_err(), "{key}={value} should be rejected");
        }

        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_QUEUE_SIZE", "lots"));
        assert!(from(&vars).is_err());
    }

    #[test]
    fn summary_hides_secrets() {
        let summary = from(&REQUIRED).unwrap().summary();

        assert!(!summary.contains("token"));
        assert!(!summary.contains("key"));
        assert!(summary.contains("100 queue"));
    }
}
