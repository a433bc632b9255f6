//! Configuration parsing and structures

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::substitute_env_vars;

/// Default MySQL host when none is configured
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default MySQL port when none is configured
pub const DEFAULT_PORT: u16 = 3306;
/// Default per-statement timeout
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Top-level connector defaults
    #[serde(default)]
    pub connectors: ConnectorDefaults,

    /// Mount points
    pub mounts: Vec<RawMountConfig>,
}

/// Top-level connector defaults section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConnectorDefaults {
    /// MySQL connection defaults shared by every mysql mount
    pub mysql: Option<MysqlConnectorOptions>,
}

/// MySQL connection options. Used both for defaults and per-mount overrides,
/// so every field is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MysqlConnectorOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Schema selected on connect
    pub database: Option<String>,

    /// Per-statement timeout (e.g., "10s")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub query_timeout: Option<Duration>,
}

/// Raw mount configuration before resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawMountConfig {
    /// Path where the filesystem will be mounted
    pub path: PathBuf,

    /// Connector configuration (may be partial, inheriting from defaults)
    pub connector: MountConnectorConfig,

    /// Mount read-only at the FUSE level
    #[serde(default)]
    pub read_only: bool,
}

/// Mount-level connector configuration (tagged enum)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MountConnectorConfig {
    /// MySQL server; missing values inherit from `connectors.mysql`
    Mysql(MysqlConnectorOptions),

    /// Local SQLite file
    Sqlite(SqliteConnectorConfig),
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Mount points (fully resolved)
    pub mounts: Vec<MountConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Mount point configuration (resolved)
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Path where the filesystem will be mounted
    pub path: PathBuf,

    /// Connector configuration (fully resolved)
    pub connector: ConnectorConfig,

    /// Mount read-only at the FUSE level
    pub read_only: bool,
}

/// Connector configuration (fully resolved)
#[derive(Debug, Clone)]
pub enum ConnectorConfig {
    Mysql(MysqlConnectorConfig),
    Sqlite(SqliteConnectorConfig),
}

impl ConnectorConfig {
    /// Name of the connector type, as written in the `type` field
    pub fn name(&self) -> &'static str {
        match self {
            ConnectorConfig::Mysql(_) => "mysql",
            ConnectorConfig::Sqlite(_) => "sqlite",
        }
    }

    pub fn query_timeout(&self) -> Duration {
        match self {
            ConnectorConfig::Mysql(c) => c.query_timeout,
            ConnectorConfig::Sqlite(c) => c.query_timeout.unwrap_or(DEFAULT_QUERY_TIMEOUT),
        }
    }
}

/// MySQL connector configuration (fully resolved)
#[derive(Debug, Clone)]
pub struct MysqlConnectorConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub query_timeout: Duration,
}

impl Default for MysqlConnectorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            database: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// SQLite connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConnectorConfig {
    /// Database file
    pub path: PathBuf,

    /// Create the Posts table if it is missing
    #[serde(default)]
    pub create_schema: bool,

    /// Per-statement timeout (e.g., "10s")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub query_timeout: Option<Duration>,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by merging mount overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            connectors,
            mounts,
        } = self;

        let mut resolved_mounts = Vec::with_capacity(mounts.len());

        for raw_mount in mounts {
            let connector = match raw_mount.connector {
                MountConnectorConfig::Mysql(mount_mysql) => ConnectorConfig::Mysql(
                    Self::resolve_mysql_connector(&connectors, mount_mysql, &raw_mount.path)?,
                ),
                MountConnectorConfig::Sqlite(sqlite) => ConnectorConfig::Sqlite(sqlite),
            };

            resolved_mounts.push(MountConfig {
                path: raw_mount.path,
                connector,
                read_only: raw_mount.read_only,
            });
        }

        Ok(Config {
            logging,
            mounts: resolved_mounts,
        })
    }

    fn resolve_mysql_connector(
        connectors: &ConnectorDefaults,
        mount: MysqlConnectorOptions,
        mount_path: &Path,
    ) -> Result<MysqlConnectorConfig, ConfigError> {
        let defaults = connectors.mysql.as_ref();

        // Mount values override defaults; username must be specified somewhere
        let username = mount
            .username
            .or_else(|| defaults.and_then(|d| d.username.clone()))
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Mount {:?} uses MySQL connector but no username specified (either on mount or in connectors.mysql defaults)",
                    mount_path
                ))
            })?;

        Ok(MysqlConnectorConfig {
            host: mount
                .host
                .or_else(|| defaults.and_then(|d| d.host.clone()))
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: mount
                .port
                .or_else(|| defaults.and_then(|d| d.port))
                .unwrap_or(DEFAULT_PORT),
            username,
            password: mount
                .password
                .or_else(|| defaults.and_then(|d| d.password.clone()))
                .unwrap_or_default(),
            database: mount
                .database
                .or_else(|| defaults.and_then(|d| d.database.clone())),
            query_timeout: mount
                .query_timeout
                .or_else(|| defaults.and_then(|d| d.query_timeout))
                .unwrap_or(DEFAULT_QUERY_TIMEOUT),
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one mount point is required".to_string(),
            ));
        }

        // Check for duplicate mount paths
        let mut paths = std::collections::HashSet::new();
        for mount in &self.mounts {
            if !paths.insert(&mount.path) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount path: {:?}",
                    mount.path
                )));
            }
        }

        for mount in &self.mounts {
            match &mount.connector {
                ConnectorConfig::Mysql(mysql) => {
                    if mysql.username.is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Mount {:?}: MySQL username cannot be empty",
                            mount.path
                        )));
                    }
                }
                ConnectorConfig::Sqlite(sqlite) => {
                    if sqlite.path.as_os_str().is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Mount {:?}: SQLite path cannot be empty",
                            mount.path
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for crate::error::PostFsError {
    fn from(e: ConfigError) -> Self {
        crate::error::PostFsError::Config(e.to_string())
    }
}

// =============================================================================
// Login form schema
// =============================================================================

/// Input type of a login form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Hidden,
    Text,
    Password,
    Number,
}

/// One field of the connection form a host renders for this connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<&'static str>,
    pub required: bool,
}

/// Connection form for the MySQL connector.
///
/// Field names match the keys of [`MysqlConnectorOptions`].
pub fn login_form() -> Vec<FormField> {
    let field = |name: &'static str, kind: FieldKind, placeholder: &'static str, required: bool| FormField {
        name,
        kind,
        placeholder: Some(placeholder),
        value: None,
        required,
    };

    vec![
        FormField {
            name: "type",
            kind: FieldKind::Hidden,
            placeholder: None,
            value: Some("mysql"),
            required: true,
        },
        field("host", FieldKind::Text, "Host", false),
        field("username", FieldKind::Text, "Username", true),
        field("password", FieldKind::Password, "Password", true),
        field("port", FieldKind::Number, "Port", false),
        field("database", FieldKind::Text, "Database", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_mysql_mount() {
        let yaml = r#"
mounts:
  - path: /mnt/posts
    connector:
      type: mysql
      username: editor
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.mounts.len(), 1);
        assert!(!config.mounts[0].read_only);

        match &config.mounts[0].connector {
            ConnectorConfig::Mysql(mysql) => {
                assert_eq!(mysql.host, "127.0.0.1");
                assert_eq!(mysql.port, 3306);
                assert_eq!(mysql.username, "editor");
                assert_eq!(mysql.password, "");
                assert_eq!(mysql.database, None);
                assert_eq!(mysql.query_timeout, DEFAULT_QUERY_TIMEOUT);
            }
            _ => panic!("Expected MySQL connector"),
        }
    }

    #[test]
    fn test_connector_defaults_with_overrides() {
        let yaml = r#"
logging:
  level: debug

connectors:
  mysql:
    host: db.internal
    port: 3307
    username: editor
    password: secret
    database: blog
    query_timeout: 5s

mounts:
  - path: /mnt/blog
    connector:
      type: mysql
  - path: /mnt/staging
    read_only: true
    connector:
      type: mysql
      database: blog_staging
      host: ""
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.mounts.len(), 2);

        match &config.mounts[0].connector {
            ConnectorConfig::Mysql(mysql) => {
                assert_eq!(mysql.host, "db.internal");
                assert_eq!(mysql.port, 3307);
                assert_eq!(mysql.password, "secret");
                assert_eq!(mysql.database.as_deref(), Some("blog"));
                assert_eq!(mysql.query_timeout, Duration::from_secs(5));
            }
            _ => panic!("Expected MySQL connector"),
        }

        assert!(config.mounts[1].read_only);
        match &config.mounts[1].connector {
            ConnectorConfig::Mysql(mysql) => {
                // empty host falls back to the built-in default
                assert_eq!(mysql.host, "127.0.0.1");
                assert_eq!(mysql.database.as_deref(), Some("blog_staging"));
                assert_eq!(mysql.username, "editor");
            }
            _ => panic!("Expected MySQL connector"),
        }
    }

    #[test]
    fn test_missing_username_error() {
        let yaml = r#"
mounts:
  - path: /mnt/posts
    connector:
      type: mysql
      host: localhost
"#;

        let err = Config::from_str(yaml).unwrap_err();
        assert!(
            err.to_string().contains("no username specified"),
            "Error should mention missing username: {}",
            err
        );
    }

    #[test]
    fn test_sqlite_mount() {
        let yaml = r#"
mounts:
  - path: /mnt/local
    connector:
      type: sqlite
      path: /var/lib/posts.db
      create_schema: true
      query_timeout: 2s
"#;

        let config = Config::from_str(yaml).unwrap();
        config.validate().unwrap();
        let connector = &config.mounts[0].connector;
        assert_eq!(connector.name(), "sqlite");
        assert_eq!(connector.query_timeout(), Duration::from_secs(2));
        match connector {
            ConnectorConfig::Sqlite(sqlite) => {
                assert_eq!(sqlite.path, PathBuf::from("/var/lib/posts.db"));
                assert!(sqlite.create_schema);
            }
            _ => panic!("Expected SQLite connector"),
        }
    }

    #[test]
    fn test_env_substitution_in_config() {
        std::env::set_var("POSTFS_TEST_DB_PASSWORD", "from-env");
        let yaml = r#"
mounts:
  - path: /mnt/posts
    connector:
      type: mysql
      username: editor
      password: ${POSTFS_TEST_DB_PASSWORD}
"#;

        let config = Config::from_str(yaml).unwrap();
        match &config.mounts[0].connector {
            ConnectorConfig::Mysql(mysql) => assert_eq!(mysql.password, "from-env"),
            _ => panic!("Expected MySQL connector"),
        }
        std::env::remove_var("POSTFS_TEST_DB_PASSWORD");
    }

    #[test]
    fn test_validate_empty_mounts() {
        let config = Config {
            logging: LoggingConfig::default(),
            mounts: vec![],
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_paths() {
        let mount = MountConfig {
            path: PathBuf::from("/mnt/posts"),
            connector: ConnectorConfig::Mysql(MysqlConnectorConfig {
                username: "editor".to_string(),
                ..Default::default()
            }),
            read_only: false,
        };
        let config = Config {
            logging: LoggingConfig::default(),
            mounts: vec![mount.clone(), mount],
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate mount path"));
    }

    #[test]
    fn test_login_form_schema() {
        let form = login_form();
        let names: Vec<_> = form.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec!["type", "host", "username", "password", "port", "database"]
        );

        let required: Vec<_> = form
            .iter()
            .filter(|f| f.required && f.kind != FieldKind::Hidden)
            .map(|f| f.name)
            .collect();
        assert_eq!(required, vec!["username", "password"]);

        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json[0]["type"], "hidden");
        assert_eq!(json[0]["value"], "mysql");
        assert_eq!(json[3]["type"], "password");
        assert!(json[1].get("value").is_none());
    }
}
