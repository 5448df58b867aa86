use crate::utils::config_loader::{ConfigLoader, ConfigLoaderSync, LoadConfigError, load_from_file, load_from_file_sync};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SPORTS: [&str; 6] = ["Tennis", "Football", "Baseball", "Basketball", "IceHockey", "Rugby"];

/// Settings for discovery, streaming and per-fixture logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Seconds between discovery poll cycles
    pub poll_interval_secs: u64,
    /// Echo (heartbeat) interval handed to the transport when a stream starts
    pub echo_interval_secs: u64,
    /// Maximum echo delay before the transport considers the stream dead
    pub echo_max_delay_secs: u64,
    /// Directory receiving one log file per fixture
    pub log_dir: PathBuf,
    /// Sport categories polled on every cycle, in order
    pub sports: Vec<String>,
    /// Worker cap for fixture fan-out, market emission and shutdown
    pub max_concurrency: usize,
    /// Buffer of the per-fixture event channel
    pub event_channel_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            echo_interval_secs: 10,
            echo_max_delay_secs: 3,
            log_dir: PathBuf::from("logs"),
            sports: DEFAULT_SPORTS.iter().map(|s| s.to_string()).collect(),
            max_concurrency: 10,
            event_channel_size: 256,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct FeedConfigRoot {
    pub feed: FeedConfig,
}

impl FeedConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> eyre::Result<Self> {
        let mut config = Self::default();

        if let Ok(interval) = std::env::var("FIXTURE_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = interval.parse()
                .map_err(|e| eyre::eyre!("Invalid FIXTURE_POLL_INTERVAL_SECS: {}", e))?;
        }

        if let Ok(interval) = std::env::var("ECHO_INTERVAL_SECS") {
            config.echo_interval_secs = interval.parse()
                .map_err(|e| eyre::eyre!("Invalid ECHO_INTERVAL_SECS: {}", e))?;
        }

        if let Ok(delay) = std::env::var("ECHO_MAX_DELAY_SECS") {
            config.echo_max_delay_secs = delay.parse()
                .map_err(|e| eyre::eyre!("Invalid ECHO_MAX_DELAY_SECS: {}", e))?;
        }

        if let Ok(log_dir) = std::env::var("FIXTURE_LOG_PATH") {
            config.log_dir = PathBuf::from(log_dir);
        }

        if let Ok(sports) = std::env::var("FIXTURE_SPORTS") {
            config.sports = sports.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(max) = std::env::var("FIXTURE_MAX_CONCURRENCY") {
            config.max_concurrency = max.parse()
                .map_err(|e| eyre::eyre!("Invalid FIXTURE_MAX_CONCURRENCY: {}", e))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(eyre::eyre!("poll_interval_secs must be greater than zero"));
        }
        if self.max_concurrency == 0 {
            return Err(eyre::eyre!("max_concurrency must be greater than zero"));
        }
        if self.event_channel_size == 0 {
            return Err(eyre::eyre!("event_channel_size must be greater than zero"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn echo_interval(&self) -> Duration {
        Duration::from_secs(self.echo_interval_secs)
    }

    pub fn echo_max_delay(&self) -> Duration {
        Duration::from_secs(self.echo_max_delay_secs)
    }
}

#[async_trait]
impl ConfigLoader for FeedConfig {
    type SectionType = FeedConfig;

    async fn load_section_from_file(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: FeedConfigRoot = load_from_file(file_name).await?;
        Ok(root.feed)
    }
}

impl ConfigLoaderSync for FeedConfig {
    type SectionType = FeedConfig;

    fn load_section_from_file_sync(file_name: String) -> Result<Self::SectionType, LoadConfigError> {
        let root: FeedConfigRoot = load_from_file_sync(file_name)?;
        Ok(root.feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config_loader::parse_toml;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.sports.len(), 6);
        assert_eq!(config.sports[0], "Tennis");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let config = FeedConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.echo_interval(), Duration::from_secs(10));
        assert_eq!(config.echo_max_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_toml_section_keeps_defaults() {
        let root: FeedConfigRoot = parse_toml(
            r#"
            [feed]
            poll_interval_secs = 15
            sports = ["Football"]
            "#,
        )
        .unwrap();
        assert_eq!(root.feed.poll_interval_secs, 15);
        assert_eq!(root.feed.sports, vec!["Football".to_string()]);
        assert_eq!(root.feed.echo_interval_secs, 10);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<FeedConfigRoot, _> = parse_toml("[feed]\npoll_every = 3\n");
        assert!(matches!(result, Err(LoadConfigError::TomlError(_))));
    }

    #[test]
    fn test_sync_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.toml");
        std::fs::write(&path, "[feed]\nlog_dir = \"/tmp/fixtures\"\nmax_concurrency = 4\n").unwrap();
        let config = FeedConfig::load_section_from_file_sync(path.to_string_lossy().to_string()).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/tmp/fixtures"));
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let config = FeedConfig { poll_interval_secs: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
