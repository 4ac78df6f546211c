//! Configuration resolution for the 2D pool.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/pool2d/settings.json)
//! 3. Project config (.pool2d/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::slot::{
    DEFAULT_CLOSE_HOUR, DEFAULT_LOCK_MINUTE, DEFAULT_OPEN_HOUR, DEFAULT_TIMEZONE, SlotClock,
};
use crate::wager::DEFAULT_MAX_SPECIALS;

/// Complete pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub markets: MarketConfig,
    #[serde(default)]
    pub draws: DrawConfig,
}

/// Daemon-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Slot clock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// IANA timezone all slot times are evaluated in.
    pub timezone: String,
    /// First valid slot hour (inclusive).
    pub open_hour: u32,
    /// Last valid slot hour (inclusive).
    pub close_hour: u32,
    /// Minute of the hour at which betting on the slot closes.
    pub lock_minute: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            open_hour: DEFAULT_OPEN_HOUR,
            close_hour: DEFAULT_CLOSE_HOUR,
            lock_minute: DEFAULT_LOCK_MINUTE,
        }
    }
}

impl ClockConfig {
    /// Build the slot clock described by this config.
    pub fn slot_clock(&self) -> Result<SlotClock> {
        Ok(SlotClock::new(
            &self.timezone,
            self.open_hour,
            self.close_hour,
            self.lock_minute,
        )?)
    }
}

/// Background scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Polling interval of the scheduler loop.
    pub tick_secs: u64,
    /// Minute of the hour from which settlement of the current slot runs.
    pub settle_minute: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            settle_minute: 52,
        }
    }
}

/// Markets (parallel draws per slot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbols: Vec<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbols: ["M", "P", "T", "S", "H", "E", "B", "K", "W"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl MarketConfig {
    /// Return the canonical symbol if `raw` names a configured market.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let wanted = raw.trim();
        self.symbols
            .iter()
            .find(|s| s.eq_ignore_ascii_case(wanted))
            .map(String::as_str)
    }
}

/// Draw result entry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawConfig {
    pub max_specials: usize,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            max_specials: DEFAULT_MAX_SPECIALS,
        }
    }
}

impl Config {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.clock.slot_clock()?;
        if self.scheduler.tick_secs == 0 {
            return Err(Error::Config("scheduler.tick_secs must be positive".into()));
        }
        if self.scheduler.settle_minute > 59 || self.scheduler.settle_minute < self.clock.lock_minute
        {
            return Err(Error::Config(format!(
                "scheduler.settle_minute {} must be between clock.lock_minute {} and 59",
                self.scheduler.settle_minute, self.clock.lock_minute
            )));
        }
        if self.markets.symbols.is_empty() {
            return Err(Error::Config("markets.symbols must not be empty".into()));
        }
        if self.markets.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::Config("markets.symbols contains a blank symbol".into()));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".pool2d").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default database path for the daemon.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("pool2d.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".pool2d"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/pool2d"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("pool2d"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.daemon.database_path.is_some() {
        base.daemon.database_path = overlay.daemon.database_path;
    }
    base.daemon.log_level = overlay.daemon.log_level;
    base.clock = overlay.clock;
    base.scheduler = overlay.scheduler;
    base.markets = overlay.markets;
    base.draws = overlay.draws;
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("POOL2D_DB_PATH") {
        config.daemon.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("POOL2D_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
    if let Some(val) = var("POOL2D_TIMEZONE") {
        config.clock.timezone = val;
    }
    if let Some(n) = var("POOL2D_OPEN_HOUR").and_then(|v| v.parse().ok()) {
        config.clock.open_hour = n;
    }
    if let Some(n) = var("POOL2D_CLOSE_HOUR").and_then(|v| v.parse().ok()) {
        config.clock.close_hour = n;
    }
    if let Some(n) = var("POOL2D_LOCK_MINUTE").and_then(|v| v.parse().ok()) {
        config.clock.lock_minute = n;
    }
    if let Some(n) = var("POOL2D_TICK_SECS").and_then(|v| v.parse().ok()) {
        config.scheduler.tick_secs = n;
    }
    if let Some(n) = var("POOL2D_SETTLE_MINUTE").and_then(|v| v.parse().ok()) {
        config.scheduler.settle_minute = n;
    }
    if let Some(val) = var("POOL2D_MARKETS") {
        config.markets.symbols = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.clock.timezone, "Asia/Kuala_Lumpur");
        assert_eq!(config.clock.lock_minute, 49);
        assert_eq!(config.scheduler.settle_minute, 52);
        assert_eq!(config.markets.symbols.len(), 9);
    }

    #[test]
    fn market_resolution_is_case_insensitive() {
        let markets = MarketConfig::default();
        assert_eq!(markets.resolve("m"), Some("M"));
        assert_eq!(markets.resolve(" K "), Some("K"));
        assert_eq!(markets.resolve("Z"), None);
    }

    #[test]
    fn settle_minute_before_lock_is_rejected() {
        let mut config = Config::default();
        config.scheduler.settle_minute = 40;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let mut config = Config::default();
        config.clock.timezone = "Nowhere/Special".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("POOL2D_TIMEZONE", "Asia/Singapore"),
            ("POOL2D_CLOSE_HOUR", "22"),
            ("POOL2D_LOCK_MINUTE", "45"),
            ("POOL2D_MARKETS", "M, P ,,T"),
            ("POOL2D_TICK_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));
        assert_eq!(config.clock.timezone, "Asia/Singapore");
        assert_eq!(config.clock.close_hour, 22);
        assert_eq!(config.clock.lock_minute, 45);
        assert_eq!(config.markets.symbols, vec!["M", "P", "T"]);
        assert_eq!(config.scheduler.tick_secs, 5);
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings_dir = dir.path().join(".pool2d");
        std::fs::create_dir_all(&settings_dir).unwrap();
        std::fs::write(
            settings_dir.join("settings.json"),
            r#"{"clock": {"timezone": "Asia/Kuala_Lumpur", "open_hour": 10, "close_hour": 20, "lock_minute": 49},
                "markets": {"symbols": ["M", "P"]}}"#,
        )
        .unwrap();

        let mut config = Config::default();
        merge_config(
            &mut config,
            load_config_file(&settings_dir.join("settings.json")).unwrap(),
        );
        assert_eq!(config.clock.open_hour, 10);
        assert_eq!(config.markets.symbols, vec!["M", "P"]);
        assert_eq!(config.scheduler.settle_minute, 52);
    }
}
