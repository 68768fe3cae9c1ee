// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host configuration loading.
//!
//! Settings come from built-in defaults, then an optional TOML file, then
//! `MODHOST_*` environment variables. Invalid environment values fall back to
//! the file or default value without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MODHOST_CONFIG` | `./modhost.toml` if present | Config file path |
//! | `MODHOST_INBOX_DIR` | `deploy` | Watched inbox directory |
//! | `MODHOST_CORE_MODULES` | `modules/core` | Core module directory |
//! | `MODHOST_SERVICE_MODULES` | `modules/service` | Service module directory |
//! | `MODHOST_CUSTOM_MODULES` | `modules/custom` | Custom module directory |
//! | `MODHOST_INITIAL_DELAY` | 30 | Delay before first scan (secs) |
//! | `MODHOST_SCAN_INTERVAL` | 10 | Delay between scans (secs) |
//! | `MODHOST_POLL_INTERVAL_MS` | 1000 | Driver state poll interval (ms) |
//! | `MODHOST_QUIESCENCE_TIMEOUT` | 0 | Max driver wait (secs, 0 = unbounded) |
//! | `MODHOST_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `MODHOST_LOG_LEVEL` | info | Log filter |
//! | `MODHOST_LOG_FORMAT` | json | `json` or `pretty` |
//!
//! Directory variables are re-read at every scan.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::modules::ModuleCategory;
use crate::telemetry::{LogConfig, LogFormat};

pub const ENV_CONFIG: &str = "MODHOST_CONFIG";
pub const ENV_INBOX_DIR: &str = "MODHOST_INBOX_DIR";
pub const ENV_CORE_MODULES: &str = "MODHOST_CORE_MODULES";
pub const ENV_SERVICE_MODULES: &str = "MODHOST_SERVICE_MODULES";
pub const ENV_CUSTOM_MODULES: &str = "MODHOST_CUSTOM_MODULES";
pub const ENV_INITIAL_DELAY: &str = "MODHOST_INITIAL_DELAY";
pub const ENV_SCAN_INTERVAL: &str = "MODHOST_SCAN_INTERVAL";
pub const ENV_POLL_INTERVAL_MS: &str = "MODHOST_POLL_INTERVAL_MS";
pub const ENV_QUIESCENCE_TIMEOUT: &str = "MODHOST_QUIESCENCE_TIMEOUT";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "MODHOST_SHUTDOWN_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "MODHOST_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "MODHOST_LOG_FORMAT";

const DEFAULT_CONFIG_FILE: &str = "modhost.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Inbox plus the three destination directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployDirs {
    pub inbox: PathBuf,
    pub core: PathBuf,
    pub service: PathBuf,
    pub custom: PathBuf,
}

impl Default for DeployDirs {
    fn default() -> Self {
        Self {
            inbox: PathBuf::from("deploy"),
            core: PathBuf::from("modules/core"),
            service: PathBuf::from("modules/service"),
            custom: PathBuf::from("modules/custom"),
        }
    }
}

impl DeployDirs {
    /// Conventional layout below `base`.
    pub fn under(base: &Path) -> Self {
        Self {
            inbox: base.join("deploy"),
            core: base.join("modules").join("core"),
            service: base.join("modules").join("service"),
            custom: base.join("modules").join("custom"),
        }
    }

    /// Destination directory for a category.
    pub fn destination_for(&self, category: ModuleCategory) -> &Path {
        match category {
            ModuleCategory::Core => &self.core,
            ModuleCategory::Service => &self.service,
            ModuleCategory::Custom => &self.custom,
        }
    }

    pub fn destinations(&self) -> [(ModuleCategory, &Path); 3] {
        [
            (ModuleCategory::Core, self.core.as_path()),
            (ModuleCategory::Service, self.service.as_path()),
            (ModuleCategory::Custom, self.custom.as_path()),
        ]
    }

    /// Create missing directories and return their absolute forms.
    pub fn ensure(&self) -> std::io::Result<DeployDirs> {
        let prepare = |p: &Path| -> std::io::Result<PathBuf> {
            std::fs::create_dir_all(p)?;
            p.canonicalize()
        };
        Ok(DeployDirs {
            inbox: prepare(&self.inbox)?,
            core: prepare(&self.core)?,
            service: prepare(&self.service)?,
            custom: prepare(&self.custom)?,
        })
    }
}

/// Where a component obtains its directories from at each use.
#[derive(Debug, Clone)]
pub enum DirectorySource {
    /// Always the given directories.
    Fixed(DeployDirs),
    /// The given directories with environment overrides re-applied each time.
    Environment(DeployDirs),
}

impl DirectorySource {
    pub fn resolve(&self) -> DeployDirs {
        match self {
            DirectorySource::Fixed(dirs) => dirs.clone(),
            DirectorySource::Environment(base) => resolve_dirs(base),
        }
    }
}

/// Apply directory environment overrides on top of `base`.
pub fn resolve_dirs(base: &DeployDirs) -> DeployDirs {
    DeployDirs {
        inbox: env_path(ENV_INBOX_DIR).unwrap_or_else(|| base.inbox.clone()),
        core: env_path(ENV_CORE_MODULES).unwrap_or_else(|| base.core.clone()),
        service: env_path(ENV_SERVICE_MODULES).unwrap_or_else(|| base.service.clone()),
        custom: env_path(ENV_CUSTOM_MODULES).unwrap_or_else(|| base.custom.clone()),
    }
}

/// All host settings.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub dirs: DeployDirs,
    pub initial_delay: Duration,
    pub scan_interval: Duration,
    pub poll_interval: Duration,
    pub quiescence_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub artifact_extensions: Vec<String>,
    pub excluded_names: Vec<String>,
    pub log: LogConfig,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            dirs: DeployDirs::default(),
            initial_delay: Duration::from_secs(30),
            scan_interval: Duration::from_secs(10),
            poll_interval: Duration::from_millis(1000),
            quiescence_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
            artifact_extensions: vec!["jar".to_string()],
            excluded_names: vec!["README.md".to_string()],
            log: LogConfig::default(),
        }
    }
}

/// On-disk config file layout. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    inbox_dir: Option<PathBuf>,
    core_modules: Option<PathBuf>,
    service_modules: Option<PathBuf>,
    custom_modules: Option<PathBuf>,
    initial_delay_secs: Option<u64>,
    scan_interval_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    quiescence_timeout_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
    artifact_extensions: Option<Vec<String>>,
    excluded_names: Option<Vec<String>>,
    log: Option<FileLogConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLogConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<PathBuf>,
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from)
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Load settings from the default file location and environment.
pub fn load() -> Result<HostSettings, ConfigError> {
    let explicit = env_path(ENV_CONFIG);
    let file = match explicit {
        Some(path) => Some(path),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    };
    load_from(file.as_deref())
}

/// Load settings from `file` (if any), then apply environment overrides.
pub fn load_from(file: Option<&Path>) -> Result<HostSettings, ConfigError> {
    let mut settings = HostSettings::default();
    if let Some(path) = file {
        let parsed = read_file(path)?;
        apply_file(&mut settings, parsed);
    }
    apply_env(&mut settings);
    Ok(settings)
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_file(settings: &mut HostSettings, file: FileConfig) {
    if let Some(p) = file.inbox_dir {
        settings.dirs.inbox = p;
    }
    if let Some(p) = file.core_modules {
        settings.dirs.core = p;
    }
    if let Some(p) = file.service_modules {
        settings.dirs.service = p;
    }
    if let Some(p) = file.custom_modules {
        settings.dirs.custom = p;
    }
    if let Some(s) = file.initial_delay_secs {
        settings.initial_delay = Duration::from_secs(s);
    }
    if let Some(s) = file.scan_interval_secs {
        settings.scan_interval = Duration::from_secs(s.max(1));
    }
    if let Some(ms) = file.poll_interval_ms {
        settings.poll_interval = Duration::from_millis(ms.max(10));
    }
    if let Some(s) = file.quiescence_timeout_secs {
        settings.quiescence_timeout = timeout_from_secs(s);
    }
    if let Some(s) = file.shutdown_timeout_secs {
        settings.shutdown_timeout = Duration::from_secs(s.max(1));
    }
    if let Some(exts) = file.artifact_extensions {
        settings.artifact_extensions = exts;
    }
    if let Some(names) = file.excluded_names {
        settings.excluded_names = names;
    }
    if let Some(log) = file.log {
        if let Some(level) = log.level {
            settings.log.level = level;
        }
        if let Some(format) = log.format.as_deref().and_then(LogFormat::parse) {
            settings.log.format = format;
        }
        if log.file.is_some() {
            settings.log.output_path = log.file;
        }
    }
}

fn apply_env(settings: &mut HostSettings) {
    settings.dirs = resolve_dirs(&settings.dirs);

    let initial = parse_u64(ENV_INITIAL_DELAY, settings.initial_delay.as_secs());
    let scan = parse_u64(ENV_SCAN_INTERVAL, settings.scan_interval.as_secs());
    let poll = parse_u64(ENV_POLL_INTERVAL_MS, settings.poll_interval.as_millis() as u64);
    let quiescence = parse_u64(
        ENV_QUIESCENCE_TIMEOUT,
        settings.quiescence_timeout.map(|d| d.as_secs()).unwrap_or(0),
    );
    let shutdown = parse_u64(ENV_SHUTDOWN_TIMEOUT, settings.shutdown_timeout.as_secs());

    settings.initial_delay = Duration::from_secs(initial);
    settings.scan_interval = Duration::from_secs(scan.max(1));
    settings.poll_interval = Duration::from_millis(poll.max(10)); // floor: 10ms
    settings.quiescence_timeout = timeout_from_secs(quiescence);
    settings.shutdown_timeout = Duration::from_secs(shutdown.max(1));

    if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
        if !level.trim().is_empty() {
            settings.log.level = level;
        }
    }
    if let Some(format) = std::env::var(ENV_LOG_FORMAT).ok().as_deref().and_then(LogFormat::parse) {
        settings.log.format = format;
    }
}

/// Flat summary of effective values, for display.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub inbox_dir: String,
    pub core_modules: String,
    pub service_modules: String,
    pub custom_modules: String,
    pub initial_delay_secs: u64,
    pub scan_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub quiescence_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub artifact_extensions: String,
    pub excluded_names: String,
    pub log_level: String,
    pub log_format: &'static str,
}

impl HostSettings {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            inbox_dir: self.dirs.inbox.display().to_string(),
            core_modules: self.dirs.core.display().to_string(),
            service_modules: self.dirs.service.display().to_string(),
            custom_modules: self.dirs.custom.display().to_string(),
            initial_delay_secs: self.initial_delay.as_secs(),
            scan_interval_secs: self.scan_interval.as_secs(),
            poll_interval_ms: self.poll_interval.as_millis() as u64,
            quiescence_timeout_secs: self.quiescence_timeout.map(|d| d.as_secs()).unwrap_or(0),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            artifact_extensions: self.artifact_extensions.join(","),
            excluded_names: self.excluded_names.join(","),
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str(),
        }
    }
}

impl EffectiveConfig {
    /// Key/value pairs keyed by environment variable name.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_INBOX_DIR, self.inbox_dir.clone()),
            (ENV_CORE_MODULES, self.core_modules.clone()),
            (ENV_SERVICE_MODULES, self.service_modules.clone()),
            (ENV_CUSTOM_MODULES, self.custom_modules.clone()),
            (ENV_INITIAL_DELAY, self.initial_delay_secs.to_string()),
            (ENV_SCAN_INTERVAL, self.scan_interval_secs.to_string()),
            (ENV_POLL_INTERVAL_MS, self.poll_interval_ms.to_string()),
            (ENV_QUIESCENCE_TIMEOUT, self.quiescence_timeout_secs.to_string()),
            (ENV_SHUTDOWN_TIMEOUT, self.shutdown_timeout_secs.to_string()),
            (ENV_LOG_LEVEL, self.log_level.clone()),
            (ENV_LOG_FORMAT, self.log_format.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        ENV_CONFIG,
        ENV_INBOX_DIR,
        ENV_CORE_MODULES,
        ENV_SERVICE_MODULES,
        ENV_CUSTOM_MODULES,
        ENV_INITIAL_DELAY,
        ENV_SCAN_INTERVAL,
        ENV_POLL_INTERVAL_MS,
        ENV_QUIESCENCE_TIMEOUT,
        ENV_SHUTDOWN_TIMEOUT,
        ENV_LOG_LEVEL,
        ENV_LOG_FORMAT,
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load_from(None).unwrap();
        assert_eq!(cfg.dirs, DeployDirs::default());
        assert_eq!(cfg.initial_delay.as_secs(), 30);
        assert_eq!(cfg.scan_interval.as_secs(), 10);
        assert_eq!(cfg.poll_interval.as_millis(), 1000);
        assert_eq!(cfg.quiescence_timeout, None);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 30);
        assert_eq!(cfg.artifact_extensions, vec!["jar"]);
        assert_eq!(cfg.excluded_names, vec!["README.md"]);
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_INBOX_DIR, "/srv/inbox");
        std::env::set_var(ENV_SCAN_INTERVAL, "5");
        std::env::set_var(ENV_QUIESCENCE_TIMEOUT, "120");
        std::env::set_var(ENV_LOG_FORMAT, "pretty");
        let cfg = load_from(None).unwrap();
        assert_eq!(cfg.dirs.inbox, PathBuf::from("/srv/inbox"));
        assert_eq!(cfg.dirs.core, PathBuf::from("modules/core"));
        assert_eq!(cfg.scan_interval.as_secs(), 5);
        assert_eq!(cfg.quiescence_timeout, Some(Duration::from_secs(120)));
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_SCAN_INTERVAL, "soon");
        std::env::set_var(ENV_POLL_INTERVAL_MS, "-3");
        std::env::set_var(ENV_LOG_FORMAT, "xml");
        let cfg = load_from(None).unwrap();
        assert_eq!(cfg.scan_interval.as_secs(), 10);
        assert_eq!(cfg.poll_interval.as_millis(), 1000);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var(ENV_SCAN_INTERVAL, "0");
        std::env::set_var(ENV_POLL_INTERVAL_MS, "1");
        let cfg = load_from(None).unwrap();
        assert!(cfg.scan_interval.as_secs() >= 1);
        assert!(cfg.poll_interval.as_millis() >= 10);
        clear_env_vars();
    }

    #[test]
    fn test_file_then_env_precedence() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "inbox_dir = \"/from/file\"\ncore_modules = \"/file/core\"\nscan_interval_secs = 20\nexcluded_names = [\"README.md\", \"NOTES.txt\"]\n\n[log]\nlevel = \"debug\"\nformat = \"pretty\""
        )
        .unwrap();
        std::env::set_var(ENV_INBOX_DIR, "/from/env");

        let cfg = load_from(Some(file.path())).unwrap();
        assert_eq!(cfg.dirs.inbox, PathBuf::from("/from/env"));
        assert_eq!(cfg.dirs.core, PathBuf::from("/file/core"));
        assert_eq!(cfg.scan_interval.as_secs(), 20);
        assert_eq!(cfg.excluded_names.len(), 2);
        assert_eq!(cfg.log.level, "debug");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "inbox = \"typo\"").unwrap();
        let err = load_from(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let err = load_from(Some(Path::new("/nonexistent/modhost.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_environment_source_rereads_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let source = DirectorySource::Environment(DeployDirs::default());
        assert_eq!(source.resolve().custom, PathBuf::from("modules/custom"));

        std::env::set_var(ENV_CUSTOM_MODULES, "/opt/custom");
        assert_eq!(source.resolve().custom, PathBuf::from("/opt/custom"));

        let fixed = DirectorySource::Fixed(DeployDirs::default());
        assert_eq!(fixed.resolve().custom, PathBuf::from("modules/custom"));
        clear_env_vars();
    }

    #[test]
    fn test_destination_for_category() {
        let dirs = DeployDirs::under(Path::new("/base"));
        assert_eq!(dirs.destination_for(ModuleCategory::Core), Path::new("/base/modules/core"));
        assert_eq!(dirs.destination_for(ModuleCategory::Service), Path::new("/base/modules/service"));
        assert_eq!(dirs.destination_for(ModuleCategory::Custom), Path::new("/base/modules/custom"));
    }

    #[test]
    fn test_ensure_creates_absolute_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DeployDirs::under(tmp.path()).ensure().unwrap();
        assert!(dirs.inbox.is_absolute());
        assert!(dirs.core.is_dir());
        assert!(dirs.service.is_dir());
        assert!(dirs.custom.is_dir());
    }

    #[test]
    fn test_effective_config_contains_all_fields() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load_from(None).unwrap().effective_config();
        let entries = eff.entries();
        assert_eq!(entries.len(), 11);
        assert!(entries.iter().all(|(_, v)| !v.is_empty()));
    }
}
