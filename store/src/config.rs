use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Config file is not valid YAML")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unsupported database backend {0}, use `postgres` or `sqlite`")]
    UnsupportedBackend(String),
    #[error("{variable} must be a port number, got {value}")]
    InvalidPort { variable: &'static str, value: String },
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(alias = "db", default)]
    pub database: ConnectionConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields, tag = "backend", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Postgres {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default = "default_name")]
        database: String,
        #[serde(default = "default_name")]
        user: String,
        #[serde(default = "default_name")]
        password: String,
        #[serde(default = "default_connect_timeout")]
        connect_timeout_secs: u64,
    },
    #[serde(alias = "sqlite3", rename = "sqlite")]
    SQLite {
        #[serde(default = "default_database_path")]
        path: PathBuf,
    },
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::Postgres {
            host: default_host(),
            port: default_port(),
            database: default_name(),
            user: default_name(),
            password: default_name(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ConnectionConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::SQLite { path: path.into() }
    }

    /// in-process SQLite database, gone once the connection closes
    pub fn in_memory() -> Self {
        Self::sqlite(":memory:")
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::SQLite { .. } => "sqlite",
        }
    }

    /// human readable target without credentials
    pub fn describe(&self) -> String {
        match self {
            Self::Postgres {
                host,
                port,
                database,
                user,
                ..
            } => format!("postgres://{user}@{host}:{port}/{database}"),
            Self::SQLite { path } => format!("sqlite://{}", path.to_string_lossy()),
        }
    }
}

impl StoreConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&content)
    }

    /// config file if given (defaults otherwise), then the process environment
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading store config");
                Self::load(path)?
            }
            None => Self::default(),
        };

        config.with_env_overrides()
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// apply the process environment on top of this config
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, one variable at a time.
    ///
    /// `DB_BACKEND` switches the backend first (keeping defaults for the new
    /// backend), then `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`
    /// patch a Postgres target and `DB_PATH` patches a SQLite one. Variables for
    /// the other backend are ignored with a debug message.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("DB_BACKEND") {
            let backend = backend.to_lowercase();

            if backend != self.database.backend_name() {
                self.database = match backend.as_str() {
                    "postgres" | "postgresql" => ConnectionConfig::default(),
                    "sqlite" | "sqlite3" => ConnectionConfig::sqlite(default_database_path()),
                    _ => return Err(ConfigError::UnsupportedBackend(backend)),
                };
            }
        }

        match &mut self.database {
            ConnectionConfig::Postgres {
                host,
                port,
                database,
                user,
                password,
                ..
            } => {
                if let Some(value) = lookup("DB_HOST") {
                    *host = value;
                }
                if let Some(value) = lookup("DB_PORT") {
                    *port = value.trim().parse().map_err(|_| ConfigError::InvalidPort {
                        variable: "DB_PORT",
                        value,
                    })?;
                }
                if let Some(value) = lookup("DB_NAME") {
                    *database = value;
                }
                if let Some(value) = lookup("DB_USER") {
                    *user = value;
                }
                if let Some(value) = lookup("DB_PASSWORD") {
                    *password = value;
                }
                if lookup("DB_PATH").is_some() {
                    debug!("DB_PATH is ignored for the postgres backend");
                }
            }
            ConnectionConfig::SQLite { path } => {
                if let Some(value) = lookup("DB_PATH") {
                    *path = PathBuf::from(value);
                }
                if lookup("DB_HOST").is_some() || lookup("DB_PORT").is_some() {
                    warn!("DB_HOST/DB_PORT are set but the sqlite backend is configured");
                }
            }
        }

        Ok(self)
    }
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "benchlog".to_owned()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_database_path() -> PathBuf {
    PathBuf::from("benchlog.db")
}
