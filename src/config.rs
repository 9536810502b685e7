use crate::{Result, SkipError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Configuration for AutoSkip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Skip backend connection settings
    pub server: ServerConfig,

    /// Episode detection triggers and polling
    pub tracker: TrackerConfig,

    /// Audio capture window, backoff and quality policy
    pub capture: CapturePolicy,

    /// Skip control timing
    pub skip: SkipConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the skip backend
    pub url: String,

    /// Timeout for backend requests (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fallback identity poll period (ms)
    pub poll_interval_ms: u64,

    /// Delay before re-detecting after a title mutation (ms)
    pub title_debounce_ms: u64,

    /// Delay before re-detecting after a background image load (ms)
    pub background_debounce_ms: u64,

    /// Media element discovery poll period (ms)
    pub media_poll_interval_ms: u64,

    /// URL fragment identifying episode background image loads
    pub background_marker: String,
}

/// Tunable capture policy. The byte thresholds are a proxy for audio
/// continuity, not protocol requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapturePolicy {
    /// Earliest playback position a capture may start at (seconds)
    pub min_start_secs: f64,

    /// Playback position from which capturing is abandoned (seconds, exclusive)
    pub max_start_secs: f64,

    /// Extra wait added when deferring until the window opens (seconds)
    pub start_margin_secs: f64,

    /// Wait before starting when already inside the window (seconds)
    pub start_delay_secs: f64,

    /// Minimum time between capture attempts (ms)
    pub cooldown_ms: u64,

    /// How far a failed attempt is backdated against the cool-down (ms)
    pub failure_backdate_ms: u64,

    /// Recorder chunk length (ms)
    pub timeslice_ms: u64,

    /// Hard limit on a single recording (ms)
    pub max_duration_ms: u64,

    /// Abort if no chunk has arrived after this long (ms)
    pub no_data_timeout_ms: u64,

    /// Progress/health check period (ms)
    pub health_check_interval_ms: u64,

    /// A chunk larger than this counts as good (bytes)
    pub good_chunk_bytes: usize,

    /// A chunk smaller than this signals buffering (bytes)
    pub tiny_chunk_bytes: usize,

    /// Number of leading chunks never treated as tiny
    pub tiny_chunk_grace: usize,

    /// Good chunks required to submit a sample
    pub min_good_chunks: usize,

    /// Minimum encoded sample size to submit (bytes)
    pub min_total_bytes: usize,

    /// Minimum media ready state before recording ("have future data")
    pub min_ready_state: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkipConfig {
    /// How long before a segment starts the skip action appears (seconds)
    pub lead_in_secs: f64,

    /// How far past the segment end a skip seeks (seconds)
    pub seek_past_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level / env filter directive
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            title_debounce_ms: 500,
            background_debounce_ms: 1000,
            media_poll_interval_ms: 1000,
            background_marker: "images.metahub.space/background/medium/".to_string(),
        }
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            min_start_secs: 3.0,
            max_start_secs: 15.0,
            start_margin_secs: 1.0,
            start_delay_secs: 1.0,
            cooldown_ms: 300_000,
            failure_backdate_ms: 240_000,
            timeslice_ms: 10_000,
            max_duration_ms: 90_000,
            no_data_timeout_ms: 30_000,
            health_check_interval_ms: 10_000,
            good_chunk_bytes: 100_000,
            tiny_chunk_bytes: 10_000,
            tiny_chunk_grace: 2,
            min_good_chunks: 3,
            min_total_bytes: 300_000,
            min_ready_state: 3,
        }
    }
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            lead_in_secs: 2.0,
            seek_past_secs: 1.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            tracker: TrackerConfig::default(),
            capture: CapturePolicy::default(),
            skip: SkipConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn title_debounce(&self) -> Duration {
        Duration::from_millis(self.title_debounce_ms)
    }

    pub fn background_debounce(&self) -> Duration {
        Duration::from_millis(self.background_debounce_ms)
    }

    pub fn media_poll_interval(&self) -> Duration {
        Duration::from_millis(self.media_poll_interval_ms)
    }
}

impl CapturePolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Effective wait after a failed attempt (cool-down minus backdate).
    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.saturating_sub(self.failure_backdate_ms))
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn no_data_timeout(&self) -> Duration {
        Duration::from_millis(self.no_data_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl Config {
    /// Load configuration from the first readable config file, falling back
    /// to defaults plus environment overrides
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("autoskip.toml"),
            PathBuf::from("config/autoskip.toml"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            config_paths.push(Path::new(&home).join(".config").join("autoskip").join("config.toml"));
        }
        config_paths.push(PathBuf::from("/etc/autoskip/config.toml"));

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("AUTOSKIP_SERVER_URL") {
            self.server.url = url;
        }

        if let Ok(timeout) = std::env::var("AUTOSKIP_TIMEOUT_SECONDS") {
            self.server.timeout_seconds = timeout.parse().unwrap_or(self.server.timeout_seconds);
        }

        if let Ok(level) = std::env::var("AUTOSKIP_LOG_LEVEL") {
            self.logging.level = level;
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| SkipError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.server.url)
            .map_err(|e| SkipError::Config(format!("invalid server url {}: {}", self.server.url, e)))?;

        let capture = &self.capture;
        if !(capture.min_start_secs >= 0.0 && capture.min_start_secs < capture.max_start_secs) {
            return Err(SkipError::Config(
                "capture window must satisfy 0 <= min_start_secs < max_start_secs".to_string(),
            ));
        }

        for (name, secs) in [
            ("start_margin_secs", capture.start_margin_secs),
            ("start_delay_secs", capture.start_delay_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(SkipError::Config(format!("{} must be a non-negative number", name)));
            }
        }

        for (name, millis) in [
            ("capture.timeslice_ms", capture.timeslice_ms),
            ("capture.health_check_interval_ms", capture.health_check_interval_ms),
            ("tracker.poll_interval_ms", self.tracker.poll_interval_ms),
            ("tracker.media_poll_interval_ms", self.tracker.media_poll_interval_ms),
        ] {
            if millis == 0 {
                return Err(SkipError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if capture.failure_backdate_ms > capture.cooldown_ms {
            return Err(SkipError::Config(
                "failure_backdate_ms cannot exceed cooldown_ms".to_string(),
            ));
        }

        if capture.min_good_chunks == 0 {
            return Err(SkipError::Config("min_good_chunks must be greater than 0".to_string()));
        }

        if !(self.skip.lead_in_secs >= 0.0 && self.skip.seek_past_secs >= 0.0) {
            return Err(SkipError::Config("skip timings cannot be negative".to_string()));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "AutoSkip Configuration:\n\
            - Server: {}\n\
            - Capture Window: [{}s, {}s)\n\
            - Cool-down: {}ms (failure: {}ms)\n\
            - Quality Gate: {} good chunks, {} bytes",
            self.server.url,
            self.capture.min_start_secs,
            self.capture.max_start_secs,
            self.capture.cooldown_ms,
            self.capture.failure_cooldown().as_millis(),
            self.capture.min_good_chunks,
            self.capture.min_total_bytes,
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server.url = url.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.config.server.timeout_seconds = seconds;
        self
    }

    pub fn with_capture_window(mut self, min_start_secs: f64, max_start_secs: f64) -> Self {
        self.config.capture.min_start_secs = min_start_secs;
        self.config.capture.max_start_secs = max_start_secs;
        self
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.config.capture.cooldown_ms = cooldown_ms;
        self
    }

    pub fn with_capture_policy(mut self, policy: CapturePolicy) -> Self {
        self.config.capture = policy;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, "http://localhost:3000");
        assert_eq!(config.capture.cooldown_ms, 300_000);
        assert_eq!(config.capture.failure_cooldown(), Duration::from_secs(60));
        assert_eq!(config.tracker.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_server_url("http://skips.local:8080")
            .with_capture_window(5.0, 20.0)
            .with_timeout(5)
            .build();

        assert_eq!(config.server.url, "http://skips.local:8080");
        assert_eq!(config.capture.min_start_secs, 5.0);
        assert_eq!(config.capture.max_start_secs, 20.0);
        assert_eq!(config.server.timeout_seconds, 5);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let inverted = ConfigBuilder::new().with_capture_window(15.0, 3.0).build();
        assert!(inverted.validate().is_err());

        let bad_url = ConfigBuilder::new().with_server_url("not a url").build();
        assert!(bad_url.validate().is_err());

        let mut backdated = Config::default();
        backdated.capture.failure_backdate_ms = backdated.capture.cooldown_ms + 1;
        assert!(backdated.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_timer_values_that_cannot_run() {
        let mut negative_delay = Config::default();
        negative_delay.capture.start_delay_secs = -1.0;
        assert!(negative_delay.validate().is_err());

        let mut nan_margin = Config::default();
        nan_margin.capture.start_margin_secs = f64::NAN;
        assert!(nan_margin.validate().is_err());

        let mut zero_poll = Config::default();
        zero_poll.tracker.poll_interval_ms = 0;
        assert!(zero_poll.validate().is_err());

        let mut zero_media_poll = Config::default();
        zero_media_poll.tracker.media_poll_interval_ms = 0;
        assert!(zero_media_poll.validate().is_err());

        let mut zero_health = Config::default();
        zero_health.capture.health_check_interval_ms = 0;
        assert!(zero_health.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            url = "http://10.0.0.2:3000"

            [capture]
            min_good_chunks = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.server.url, "http://10.0.0.2:3000");
        assert_eq!(config.server.timeout_seconds, 30);
        assert_eq!(config.capture.min_good_chunks, 4);
        assert_eq!(config.capture.min_total_bytes, 300_000);
        assert_eq!(config.skip.lead_in_secs, 2.0);
    }
}
