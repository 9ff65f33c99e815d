use crate::channel::Channel;
use crate::detector::heuristic::HeuristicTable;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Channel value written by the default template; must be replaced before running.
pub const PLACEHOLDER_CHANNEL: &str = "channel_name_here";

/// Top-level configuration loaded from recorder.toml.
///
/// Built once at startup and handed to each component by reference; never reloaded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub channel: String,
    pub recorder_name: String,
    pub check_interval_secs: u64,
    pub host: String,
    pub discord: DiscordConfig,
    pub capture: CaptureConfig,
    pub detector: DetectorConfig,
    pub heuristic: HeuristicTable,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub command: String,
    pub args: Vec<String>,
    pub extension: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub navigation_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub user_agent: String,
    pub chrome_executable: Option<PathBuf>,
    /// Pass `--no-sandbox` to Chrome (needed when running as root in containers).
    pub no_sandbox: bool,
}

// --- Default implementations ---

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            recorder_name: String::new(),
            check_interval_secs: 60,
            host: "kick.com".to_string(),
            discord: DiscordConfig::default(),
            capture: CaptureConfig::default(),
            detector: DetectorConfig::default(),
            heuristic: HeuristicTable::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "yt-dlp".to_string(),
            args: vec![
                "{url}".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
            ],
            extension: "mp4".to_string(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 30,
            settle_delay_secs: 8,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"
                .to_string(),
            chrome_executable: None,
            no_sandbox: false,
        }
    }
}

/// Content written to recorder.toml when no config file exists yet.
pub const DEFAULT_CONFIG: &str = "\
# Kick recorder configuration

# Kick channel to monitor (the part after https://kick.com/)
channel = \"channel_name_here\"
# Name identifying this recorder instance in notifications
recorder_name = \"Recorder #1\"
# Seconds between checks while the channel is offline
check_interval_secs = 60

[discord]
enabled = false
webhook_url = \"\"

[capture]
command = \"yt-dlp\"
args = [\"{url}\", \"-o\", \"{output}\"]
extension = \"mp4\"

[detector]
navigation_timeout_secs = 30
settle_delay_secs = 8
";

impl RecorderConfig {
    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let channel = self.channel()?;
        if channel.as_str() == PLACEHOLDER_CHANNEL {
            return Err(ConfigError::PlaceholderChannel);
        }
        if self.recorder_name.trim().is_empty() {
            return Err(ConfigError::MissingRecorderName);
        }
        if self.check_interval_secs < 1 {
            return Err(ConfigError::InvalidInterval(self.check_interval_secs));
        }
        if self.capture.command.trim().is_empty() {
            return Err(ConfigError::MissingCaptureCommand);
        }
        self.heuristic
            .compile()
            .map_err(|e| ConfigError::Heuristic(e.to_string()))?;
        Ok(())
    }

    pub fn channel(&self) -> Result<Channel, ConfigError> {
        Channel::new(self.channel.clone()).ok_or(ConfigError::MissingChannel)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl DetectorConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// Outcome of `load_or_create`.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Box<RecorderConfig>),
    /// No file existed; a default template was written to this path.
    Created(PathBuf),
}

/// Load the config, or write the default template if the file is missing.
///
/// The loaded config is not validated yet: CLI overrides are applied first.
pub fn load_or_create(path: &Path) -> Result<LoadOutcome, ConfigError> {
    if !path.exists() {
        write_default(path)?;
        return Ok(LoadOutcome::Created(path.to_path_buf()));
    }
    Ok(LoadOutcome::Loaded(Box::new(load(path)?)))
}

/// Read and parse a config file without validating it.
pub fn load(path: &Path) -> Result<RecorderConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = parse(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn parse(text: &str) -> Result<RecorderConfig, toml::de::Error> {
    toml::from_str(text)
}

pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Fatal configuration problems. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'channel' is missing; set it to the Kick channel you want to monitor")]
    MissingChannel,
    #[error("'channel' is still the placeholder \"channel_name_here\"; set it to the Kick channel you want to monitor")]
    PlaceholderChannel,
    #[error("'recorder_name' is missing; set it to identify this recorder")]
    MissingRecorderName,
    #[error("'check_interval_secs' must be at least 1 (got {0})")]
    InvalidInterval(u64),
    #[error("'capture.command' must not be empty")]
    MissingCaptureCommand,
    #[error("invalid [heuristic] table: {0}")]
    Heuristic(String),
}

impl ConfigError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
