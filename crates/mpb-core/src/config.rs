use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub slots: SlotsConfig,
}

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            other => Err(format!("logging.format: unknown format {other:?}")),
        }
    }
}

/// Victim selection on a residency miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMode {
    /// One persisted cursor shared by every slot.
    Shared,
    /// Step from the requesting slot's own identity.
    Relative,
}

impl RotationMode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "relative" => Ok(Self::Relative),
            other => Err(format!("slots.rotation: unknown mode {other:?}")),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Relative => "relative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotsConfig {
    pub switch_debounce_ms: u64,
    pub settle_delay_ms: u64,
    pub signal_buffer: usize,
    pub rotation: RotationMode,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            switch_debounce_ms: 50,
            settle_delay_ms: 150,
            signal_buffer: 64,
            rotation: RotationMode::Shared,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Console,
        }
    }
}

impl Config {
    pub fn default_from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_default();
        let data_dir = if home.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&home)
                .join(".local")
                .join("share")
                .join("mpb")
        };
        let config_dir = if home.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&home).join(".config").join("mpb")
        };
        Self {
            global: GlobalConfig {
                data_dir,
                config_dir,
            },
            database: DatabaseConfig {
                path: None,
                busy_timeout_ms: 5000,
            },
            logging: LoggingConfig::default(),
            slots: SlotsConfig::default(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }
        self.global.data_dir.join("mpb.db")
    }

    pub fn db_config(&self) -> mpb_db::Config {
        mpb_db::Config {
            path: self.database_path(),
            busy_timeout_ms: self.database.busy_timeout_ms,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        if self.slots.switch_debounce_ms > 5_000 {
            errors.push("slots.switch_debounce_ms: must be at most 5000".to_string());
        }
        if self.slots.settle_delay_ms > 10_000 {
            errors.push("slots.settle_delay_ms: must be at most 10000".to_string());
        }
        if self.slots.signal_buffer == 0 {
            errors.push("slots.signal_buffer: must be greater than 0".to_string());
        }
        if self.database.busy_timeout_ms == 0 {
            errors.push("database.busy_timeout_ms: must be greater than 0".to_string());
        }
        if self.logging.level.trim().is_empty() {
            errors.push("logging.level: must not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    global: PartialGlobalConfig,
    #[serde(default)]
    database: PartialDatabaseConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
    #[serde(default)]
    slots: PartialSlotsConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialGlobalConfig {
    #[serde(default)]
    data_dir: String,
    #[serde(default)]
    config_dir: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialDatabaseConfig {
    #[serde(default)]
    path: String,
    #[serde(default)]
    busy_timeout_ms: i64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialSlotsConfig {
    #[serde(default)]
    switch_debounce_ms: Option<u64>,
    #[serde(default)]
    settle_delay_ms: Option<u64>,
    #[serde(default)]
    signal_buffer: Option<usize>,
    #[serde(default)]
    rotation: String,
}

/// Load config: defaults < (optional) config file.
/// An explicit path that cannot be read is a hard error.
pub fn load_config(config_file: Option<&str>) -> Result<(Config, Option<PathBuf>), String> {
    let mut cfg = Config::default_from_env();

    let explicit = config_file
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let (path_to_try, used) = if let Some(path) = explicit {
        (Some(path), true)
    } else {
        (default_config_path(), false)
    };

    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                apply_yaml(&mut cfg, &text)?;
                cfg.validate()?;
                return Ok((cfg, Some(path)));
            }
            Err(err) => {
                if used {
                    return Err(format!("failed to load config file: {err}"));
                }
            }
        }
    }

    Ok((cfg, None))
}

/// Overlay a YAML document on `cfg`. Empty or zero fields keep the current value.
pub fn apply_yaml(cfg: &mut Config, text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let parsed: Option<PartialConfig> =
        serde_yaml::from_str(text).map_err(|err| format!("parse config: {err}"))?;
    apply_partial(cfg, parsed.unwrap_or_default())
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("mpb").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(
                PathBuf::from(home)
                    .join(".config")
                    .join("mpb")
                    .join("config.yaml"),
            );
        }
    }
    None
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) -> Result<(), String> {
    if !partial.global.data_dir.trim().is_empty() {
        cfg.global.data_dir = expand_tilde(partial.global.data_dir.trim())?;
    }
    if !partial.global.config_dir.trim().is_empty() {
        cfg.global.config_dir = expand_tilde(partial.global.config_dir.trim())?;
    }
    if !partial.database.path.trim().is_empty() {
        cfg.database.path = Some(expand_tilde(partial.database.path.trim())?);
    }
    if partial.database.busy_timeout_ms > 0 {
        cfg.database.busy_timeout_ms = partial.database.busy_timeout_ms as u64;
    }
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = LogFormat::parse(&partial.logging.format)?;
    }
    if let Some(ms) = partial.slots.switch_debounce_ms {
        cfg.slots.switch_debounce_ms = ms;
    }
    if let Some(ms) = partial.slots.settle_delay_ms {
        cfg.slots.settle_delay_ms = ms;
    }
    if let Some(buffer) = partial.slots.signal_buffer {
        cfg.slots.signal_buffer = buffer;
    }
    if !partial.slots.rotation.trim().is_empty() {
        cfg.slots.rotation = RotationMode::parse(&partial.slots.rotation)?;
    }
    Ok(())
}

fn expand_tilde(input: &str) -> Result<PathBuf, String> {
    if input == "~" {
        let home = std::env::var("HOME").map_err(|_| "failed to resolve HOME".to_string())?;
        return Ok(PathBuf::from(home));
    }
    if let Some(rest) = input.strip_prefix("~/") {
        let home = std::env::var("HOME").map_err(|_| "failed to resolve HOME".to_string())?;
        return Ok(PathBuf::from(home).join(rest));
    }
    Ok(Path::new(input).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_contains_expected_values() {
        let cfg = Config::default_from_env();
        assert!(!cfg.global.data_dir.as_os_str().is_empty());
        assert_eq!(cfg.database.busy_timeout_ms, 5000);
        assert_eq!(cfg.slots, SlotsConfig::default());
        assert_eq!(cfg.slots.switch_debounce_ms, 50);
        assert_eq!(cfg.slots.settle_delay_ms, 150);
        assert_eq!(cfg.slots.rotation, RotationMode::Shared);
        assert!(cfg.database_path().ends_with("mpb.db"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn yaml_overlays_only_present_fields() {
        let mut cfg = Config::default_from_env();
        let text = "database:\n  path: /tmp/x.db\nslots:\n  switch_debounce_ms: 0\n  rotation: relative\nlogging:\n  format: json\n";
        if let Err(err) = apply_yaml(&mut cfg, text) {
            panic!("apply: {err}");
        }
        assert_eq!(cfg.database.path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(cfg.slots.switch_debounce_ms, 0);
        assert_eq!(cfg.slots.settle_delay_ms, 150);
        assert_eq!(cfg.slots.rotation, RotationMode::Relative);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn empty_yaml_keeps_defaults() {
        let mut cfg = Config::default_from_env();
        if let Err(err) = apply_yaml(&mut cfg, "") {
            panic!("apply: {err}");
        }
        assert_eq!(cfg.slots, SlotsConfig::default());
    }

    #[test]
    fn unknown_rotation_mode_is_rejected() {
        let mut cfg = Config::default_from_env();
        let err = match apply_yaml(&mut cfg, "slots:\n  rotation: random\n") {
            Ok(()) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.contains("slots.rotation"), "{err}");
    }

    #[test]
    fn validate_collects_every_problem() {
        let mut cfg = Config::default_from_env();
        cfg.slots.signal_buffer = 0;
        cfg.database.busy_timeout_ms = 0;
        let err = match cfg.validate() {
            Ok(()) => panic!("expected validation error"),
            Err(err) => err,
        };
        assert!(err.contains("signal_buffer"), "{err}");
        assert!(err.contains("busy_timeout_ms"), "{err}");
    }

    #[test]
    fn explicit_missing_file_is_hard_error() {
        let path = std::env::temp_dir().join("mpb-config-does-not-exist.yaml");
        let result = load_config(path.to_str());
        assert!(result.is_err());
    }
}
