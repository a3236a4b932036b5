use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use uhf_engine::ProbeConfig;

pub const DEFAULT_CONFIG_PATH: &str = "uhf-editor.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channel: ChannelConfig,
    pub probe: ProbeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel directory used when `--channel` is not given.
    pub default_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Filter directives for both crates at the configured level.
    pub fn log_filter(&self) -> String {
        format!(
            "uhf_editor={level},uhf_engine={level}",
            level = self.logging.level
        )
    }

    pub fn default_template() -> &'static str {
        r#"[channel]
# Channel directory used when --channel is not given.
# default_dir = "/srv/tv/channel38"

[probe]
# External program asked for durations the container probe cannot read.
ffprobe_path = "ffprobe"
fallback_extensions = ["mkv"]
supported_extensions = ["avi", "mov", "mkv", "mp4", "m4v"]

[logging]
level = "info"
"#
    }
}
