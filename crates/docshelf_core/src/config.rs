//! Store configuration.
//!
//! # Responsibility
//! - Resolve where the document database lives and how it is opened.
//! - Layer sources: defaults, then TOML file, then `DOCSHELF_*` environment.
//!
//! # Invariants
//! - `db_name` is a plain file stem; it never contains path separators.
//! - An in-memory config never touches the file system.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DOCSHELF";
const APP_DIR_NAME: &str = "docshelf";
const DEFAULT_DB_NAME: &str = "database";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DB_FILE_EXTENSION: &str = "sqlite3";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        source: toml::de::Error,
    },
    InvalidDbName(String),
    InvalidEnv {
        name: String,
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "failed to parse config `{}`: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "failed to parse config: {source}"),
            Self::InvalidDbName(name) => write!(
                f,
                "db_name `{name}` must be a non-empty file stem without path separators"
            ),
            Self::InvalidEnv { name, value } => {
                write!(f, "invalid value `{value}` for environment variable {name}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidDbName(_) => None,
            Self::InvalidEnv { .. } => None,
        }
    }
}

/// Where and how the document database is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the database file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Fixed logical database name; the file is `<db_name>.sqlite3`.
    #[serde(default = "default_db_name")]
    pub db_name: String,
    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Optional log level for hosts that bootstrap logging from this config.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Keeps the database in memory. Not read from files or environment.
    #[serde(skip)]
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_name: default_db_name(),
            busy_timeout_ms: default_busy_timeout_ms(),
            log_level: None,
            in_memory: false,
        }
    }
}

impl StoreConfig {
    /// Config for a file-backed store under `data_dir` with default naming.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Config for a non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file and applies env overrides.
    ///
    /// A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML string and applies env overrides.
    pub fn load_from_str(toml_content: &str) -> ConfigResult<Self> {
        let mut config: Self = toml::from_str(toml_content)
            .map_err(|source| ConfigError::Parse { path: None, source })?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        let name = self.db_name.trim();
        let valid = !name.is_empty()
            && name == self.db_name
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        if !valid {
            return Err(ConfigError::InvalidDbName(self.db_name.clone()));
        }
        Ok(())
    }

    /// Full path of the database file, or `None` for in-memory stores.
    pub fn db_path(&self) -> Option<PathBuf> {
        if self.in_memory {
            return None;
        }
        Some(
            self.data_dir
                .join(format!("{}.{DB_FILE_EXTENSION}", self.db_name)),
        )
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Some(value) = env_var("DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }

        if let Some(value) = env_var("DB_NAME") {
            self.db_name = value;
        }

        if let Some(value) = env_var("BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: format!("{ENV_PREFIX}_BUSY_TIMEOUT_MS"),
                value: value.clone(),
            })?;
        }

        if let Some(value) = env_var("LOG_LEVEL") {
            self.log_level = if value.trim().is_empty() {
                None
            } else {
                Some(value)
            };
        }

        Ok(())
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{suffix}")).ok()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig};
    use std::env;
    use std::path::PathBuf;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "DOCSHELF_DATA_DIR",
        "DOCSHELF_DB_NAME",
        "DOCSHELF_BUSY_TIMEOUT_MS",
        "DOCSHELF_LOG_LEVEL",
    ];

    /// Holds the env lock and restores touched variables on drop.
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard<'_> {
        fn new() -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|err| err.into_inner());
            let saved = VARS.iter().map(|&name| (name, env::var(name).ok())).collect();
            for name in VARS {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn defaults_use_fixed_logical_name() {
        let _guard = EnvGuard::new();
        let config = StoreConfig::load_from_str("").expect("empty toml should load");

        assert_eq!(config.db_name, "database");
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config
            .db_path()
            .expect("file-backed config has a path")
            .ends_with("docshelf/database.sqlite3"));
    }

    #[test]
    fn toml_values_are_applied() {
        let _guard = EnvGuard::new();
        let config = StoreConfig::load_from_str(
            r#"
            data_dir = "/tmp/shelf"
            db_name = "lists"
            busy_timeout_ms = 250
            "#,
        )
        .expect("toml should load");

        assert_eq!(config.db_path(), Some(PathBuf::from("/tmp/shelf/lists.sqlite3")));
        assert_eq!(config.busy_timeout().as_millis(), 250);
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        let _guard = EnvGuard::new();
        env::set_var("DOCSHELF_DB_NAME", "from_env");
        env::set_var("DOCSHELF_LOG_LEVEL", "debug");

        let config = StoreConfig::load_from_str("db_name = \"from_file\"").expect("should load");
        assert_eq!(config.db_name, "from_env");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn invalid_busy_timeout_env_is_rejected() {
        let _guard = EnvGuard::new();
        env::set_var("DOCSHELF_BUSY_TIMEOUT_MS", "soon");

        let err = StoreConfig::load_from_str("").expect_err("non-numeric timeout must fail");
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn db_name_with_separator_is_rejected() {
        let _guard = EnvGuard::new();
        let err = StoreConfig::load_from_str("db_name = \"../escape\"")
            .expect_err("path-like names must fail");
        assert!(matches!(err, ConfigError::InvalidDbName(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _guard = EnvGuard::new();
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StoreConfig::load_from_path(&dir.path().join("absent.toml"))
            .expect("missing file should use defaults");
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn in_memory_config_has_no_path() {
        assert_eq!(StoreConfig::in_memory().db_path(), None);
    }
}
