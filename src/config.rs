use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::smoothing::FilterKind;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub acquisition: AcquisitionConfig,
    pub smoothing: SmoothingConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Pause after opening the port before the first command.
    pub settle_ms: u64,
    /// Upper bound on draining stale input before a run.
    pub flush_window_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// Consecutive empty or unparsable reads before a session times out.
    pub miss_threshold: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SmoothingConfig {
    /// Overrides the per-technique default filter.
    pub default_filter: Option<FilterKind>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExportConfig {
    pub output_dir: String,
    pub render_plots: bool,
    pub plot_width: u32,
    pub plot_height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: if cfg!(windows) { "COM3" } else { "/dev/ttyUSB0" }.to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
            settle_ms: 500,
            flush_window_ms: 500,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self { miss_threshold: 100 }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "./data".to_string(),
            render_plots: true,
            plot_width: 900,
            plot_height: 600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        for path in ["potentiostat.toml", "config.toml"] {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    // POTENTIOSTAT__SERIAL__PORT=/dev/ttyACM0
    builder = builder.add_source(
        Environment::with_prefix("POTENTIOSTAT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize::<AppConfig>()
}

pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}
