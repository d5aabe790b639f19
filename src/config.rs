//! Configuration for the wildwatch agent.

use crate::core::tracker::DescriptionPolicy;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Prompt sent to the vision model with every frame.
pub const DEFAULT_PROMPT: &str =
    "What is in the video(the camera is a night vision camera so ignore the resolution)?";

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum time between captured frames
    #[serde(with = "duration_serde")]
    pub frame_interval: Duration,

    /// Frames buffered between capture and inference (oldest dropped first)
    pub queue_capacity: usize,

    /// Words that mark a description as a detection
    pub keywords: Vec<String>,

    /// Whether an open interval keeps its first or latest description
    pub description_policy: DescriptionPolicy,

    /// Consecutive positive frames needed to open an interval
    pub debounce_open_frames: u32,

    /// Consecutive negative frames needed to close an interval
    pub debounce_close_frames: u32,

    /// IANA timezone used for log dates and times
    pub timezone: String,

    /// Vision model settings
    pub inference: InferenceConfig,

    /// Directory of JPEG frames to replay as the camera
    pub source_dir: Option<PathBuf>,

    /// Restart the replay when the directory is exhausted
    pub loop_source: bool,

    /// Whether to save footage of open intervals
    pub record_footage: bool,

    /// Where footage clips are written
    pub footage_path: PathBuf,

    /// Path for the detection log and run statistics
    pub data_path: PathBuf,

    /// Port for the live feed and log views
    pub server_port: u16,

    /// Whether detection is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wildwatch-agent");

        Self {
            frame_interval: Duration::from_millis(50),
            queue_capacity: 4,
            keywords: vec!["person".to_string(), "people".to_string()],
            description_policy: DescriptionPolicy::KeepFirst,
            debounce_open_frames: 1,
            debounce_close_frames: 1,
            timezone: "UTC".to_string(),
            inference: InferenceConfig::default(),
            source_dir: None,
            loop_source: false,
            record_footage: true,
            footage_path: data_dir.join("footages"),
            data_path: data_dir,
            server_port: 5000,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wildwatch-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if self.record_footage {
            std::fs::create_dir_all(&self.footage_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Parsed timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue(format!("timezone {:?}: {e}", self.timezone)))
    }

    /// Detection log file.
    pub fn log_path(&self) -> PathBuf {
        self.data_path.join("detections.jsonl")
    }

    /// Run statistics file.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "at least one detection keyword is required".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Vision model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Ollama server base URL
    pub base_url: String,
    /// Vision model name
    pub model: String,
    /// Prompt sent with each frame
    pub prompt: String,
    /// Number of GPUs the model may use, if set
    pub num_gpu: Option<u32>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llava".to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            num_gpu: None,
            timeout_secs: 60,
        }
    }
}

impl InferenceConfig {
    /// Chat endpoint URL.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration, as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
