//! # Configuration
//!
//! Process-start settings for the router, the HTTP server and the single
//! database connection. Loaded from TOML; every field has a default so an
//! empty document is a valid configuration (in-memory SQLite on port 8000).

use crate::error::{Error, Result};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller used when the path does not name one
    pub default_controller: String,
    /// Emit the `Server-Timing` header on rendered responses
    pub server_timing: bool,
    /// HTTP listener settings
    pub server: ServerSettings,
    /// Database connection parameters
    pub database: DatabaseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_controller: "Site".to_string(),
            server_timing: true,
            server: ServerSettings::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the document is not valid TOML or has
    /// fields of the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, `Error::Config` if it
    /// cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Seconds to wait for in-flight connections on shutdown
    pub shutdown_timeout_secs: u64,
    /// Emit logs as JSON lines instead of the human format
    pub json_logs: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            shutdown_timeout_secs: 30,
            json_logs: false,
        }
    }
}

impl ServerSettings {
    /// Shutdown drain timeout as a `Duration`
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// SQLite file or in-memory database
    #[default]
    Sqlite,
    /// MySQL / MariaDB server
    Mysql,
}

/// DSN-style connection parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend driver
    pub driver: Driver,
    /// Server host (ignored for SQLite)
    pub host: String,
    /// Server port (driver default when absent)
    pub port: Option<u16>,
    /// Database name, or the file path / `:memory:` for SQLite
    pub name: String,
    /// User name
    pub user: String,
    /// Credential
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: Driver::Sqlite,
            host: "127.0.0.1".to_string(),
            port: None,
            name: ":memory:".to_string(),
            user: "root".to_string(),
            password: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory SQLite, mostly for tests
    #[must_use]
    pub fn sqlite_memory() -> Self {
        Self::default()
    }

    /// Connection options for the SQLite file (or `:memory:`) named by `name`
    #[must_use]
    pub fn sqlite_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.name)
            .create_if_missing(true)
    }

    /// Connection options for the MySQL server; credentials are passed as-is
    #[must_use]
    pub fn mysql_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .username(&self.user)
            .database(&self.name);
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        options
    }

    /// Credential-free description for logs
    #[must_use]
    pub fn describe(&self) -> String {
        match self.driver {
            Driver::Sqlite => format!("sqlite:{}", self.name),
            Driver::Mysql => {
                let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
                format!("mysql://{}@{}{}/{}", self.user, self.host, port, self.name)
            }
        }
    }
}
