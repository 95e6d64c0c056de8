//! Engine configuration, layered from optional YAML files and
//! `ADMINCTL__`-prefixed environment variables.
//!
//! Every field carries a default so the engine runs without any file.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub shell: ShellConfig,
    pub devices: DeviceConfig,
    pub safety: SafetyConfig,
    pub accounts: AccountConfig,
    pub processes: ProcessConfig,
    pub recycle_bin: RecycleBinConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellConfig {
    /// PowerShell executable used by the Windows backend.
    pub program: String,
    /// Upper bound for read-only OS queries.
    pub query_timeout_secs: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "powershell".to_string(),
            query_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// PnP classes included in `list_devices`.
    pub classes: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let classes = [
            "Display",
            "Net",
            "USB",
            "AudioEndpoint",
            "Image",
            "PrintQueue",
            "DiskDrive",
            "Media",
            "Bluetooth",
        ];
        Self {
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// `format_disk` must carry `confirm: true`.
    pub require_format_confirmation: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            require_format_confirmation: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountConfig {
    pub min_password_length: usize,
    /// How many of upper / lower / digit / symbol a password must mix.
    pub min_character_classes: usize,
    /// Accounts `delete_local_user` refuses to remove (case-insensitive).
    pub protected: Vec<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            min_password_length: 8,
            min_character_classes: 3,
            protected: ["Administrator", "Guest", "DefaultAccount", "WDAGUtilityAccount"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Gap between the two samples used to compute per-process CPU usage.
    pub cpu_sample_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self { cpu_sample_ms: 250 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RecycleBinConfig {
    /// Override for the freedesktop trash directory on Unix.
    pub trash_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    pub redaction: RedactionConfig,
}

impl LoggingConfig {
    /// Most verbose enabled level, as an `EnvFilter` directive.
    pub fn level(&self) -> &'static str {
        let l = &self.levels;
        if l.debug {
            "debug"
        } else if l.info {
            "info"
        } else if l.warning {
            "warn"
        } else if l.error || l.critical {
            "error"
        } else {
            "off"
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub show_target: bool,
    pub show_file: bool,
    pub show_line: bool,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingFormatConfig {
    fn default() -> Self {
        Self {
            show_time: true,
            show_target: false,
            show_file: false,
            show_line: false,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

impl Default for LoggingLevelsConfig {
    fn default() -> Self {
        Self {
            debug: false,
            info: true,
            warning: true,
            error: true,
            critical: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub patterns: Vec<RedactionPattern>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![RedactionPattern {
                name: "password".to_string(),
                regex: r#"(?i)(password\s*[=:]\s*"?)[^\s",}]+"#.to_string(),
                placeholder: "${1}[REDACTED]".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

/// Load configuration from the working directory and the environment.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("adminctl.yaml").required(false))
        .add_source(File::with_name("config/adminctl.yaml").required(false))
        // Local override
        .add_source(File::with_name(".adminctl.yaml").required(false))
        .add_source(Environment::with_prefix("ADMINCTL").separator("__"));

    builder.build()?.try_deserialize()
}

/// Load configuration from an explicit file, still honouring the environment.
pub fn load_config_from(path: &std::path::Path) -> Result<EngineConfig, ConfigError> {
    Config::builder()
        .add_source(File::from(path))
        .add_source(Environment::with_prefix("ADMINCTL").separator("__"))
        .build()?
        .try_deserialize()
}

/// Parse configuration from a YAML string (no environment layering).
pub fn load_config_str(yaml: &str) -> Result<EngineConfig, ConfigError> {
    Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?
        .try_deserialize()
}
