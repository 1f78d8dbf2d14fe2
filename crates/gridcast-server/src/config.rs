//! Server configuration loading from file and environment variables.

use std::net::{IpAddr, Ipv4Addr};

use gridcast_types::Topic;
use serde::Deserialize;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The topics to serve, one listener each.
    #[serde(default)]
    pub topics: Vec<Topic>,
}

/// Network configuration shared by all topic listeners.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address each topic port binds to.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Host name advertised in validation callback URLs.
    #[serde(default = "default_host")]
    pub host: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "gridcast_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            host: default_host(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `GRIDCAST_BIND` overrides `server.bind`
/// - `GRIDCAST_HOST` overrides `server.host`
/// - `GRIDCAST_LOG_LEVEL` overrides `logging.level`
/// - `GRIDCAST_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Topic validation happens later, when the registry is built; this only
/// covers reading and deserializing the document.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(bind) = std::env::var("GRIDCAST_BIND") {
        if let Ok(parsed) = bind.parse() {
            config.server.bind = parsed;
        }
    }
    if let Ok(host) = std::env::var("GRIDCAST_HOST") {
        config.server.host = host;
    }
    if let Ok(level) = std::env::var("GRIDCAST_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("GRIDCAST_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcast_types::{FilterOperator, MappingKind, SchemaKind};
    use std::io::Write as _;

    const SAMPLE: &str = r#"
[server]
host = "events.local"

[logging]
level = "debug"

[[topics]]
name = "orders"
port = 60101
key = "OrdersKey1"
schema = "eventgrid"

[[topics.webhook_subscribers]]
name = "audit-hook"
endpoint = "https://localhost:5050/hook"

[topics.webhook_subscribers.filter]
included_event_types = ["Order.Created", "All"]
subject_begins_with = "orders/"

[[topics.webhook_subscribers.filter.advanced_filters]]
key = "Data.Amount"
operator = "NumberGreaterThan"
value = 100

[[topics.servicebus_subscribers]]
name = "sb-orders"
namespace = "my-namespace"
topic = "orders-in"
shared_access_key_name = "RootManageSharedAccessKey"
shared_access_key = "c2VjcmV0"

[topics.servicebus_subscribers.properties.SessionId]
kind = "dynamic"
value = "Subject"

[[topics]]
name = "telemetry"
port = 60102
key = "TelemetryKey1"
schema = "cloudevent"
disabled = true
"#;

    #[test]
    fn parses_a_full_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.host, "events.local");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.topics.len(), 2);

        let orders = &config.topics[0];
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.port, 60101);
        assert_eq!(orders.schema, SchemaKind::EventGrid);
        assert_eq!(orders.webhook_subscribers.len(), 1);

        let hook = &orders.webhook_subscribers[0];
        let filter = hook.filter.as_ref().unwrap();
        assert_eq!(filter.advanced_filters.len(), 1);
        assert_eq!(
            filter.advanced_filters[0].operator,
            FilterOperator::NumberGreaterThan
        );

        let sb = &orders.servicebus_subscribers[0];
        assert_eq!(sb.properties["SessionId"].kind, MappingKind::Dynamic);

        assert!(config.topics[1].disabled);
        assert_eq!(config.topics[1].schema, SchemaKind::CloudEvent);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/definitely/not/here.toml")).unwrap();
        assert!(config.topics.is_empty());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.host, "localhost");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"topics = 'not a table'").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }
}
