use chrono::FixedOffset;
use common::domain::{DomainError, DomainResult};
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use common::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use ingestion_worker::mqtt::MqttSubscriberConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable pointing at an optional YAML config file
pub const CONFIG_FILE_ENV: &str = "RDAS_CONFIG_FILE";

const DEFAULT_CONFIG_FILE: &str = "config/config.yaml";

const ENV_PREFIX: &str = "RDAS";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// Empty means an anonymous connection
    #[serde(default)]
    pub mqtt_username: String,

    #[serde(default)]
    pub mqtt_password: String,

    /// tcp, mqtt, ssl, tls or mqtts
    #[serde(default = "default_mqtt_protocol")]
    pub mqtt_protocol: String,

    /// Topic filter; device id must be the third level
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Largest MQTT packet in bytes; bigger telemetry batches drop the connection
    #[serde(default = "default_mqtt_max_packet_size")]
    pub mqtt_max_packet_size: usize,

    /// Reconnect attempts before giving up, 0 retries forever
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    #[serde(default = "default_max_retry_delay_secs")]
    pub mqtt_max_retry_delay_secs: u64,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Connection attempts at start-up, 0 retries forever
    #[serde(default = "default_postgres_connect_max_attempts")]
    pub postgres_connect_max_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub postgres_connect_retry_delay_secs: u64,

    // Audit trail
    /// Directory for the per-device HTML audit logs
    #[serde(default = "default_audit_log_dir")]
    pub audit_log_dir: String,

    /// UTC offset of the reporting system, e.g. +07:00
    #[serde(default = "default_reading_utc_offset")]
    pub reading_utc_offset: String,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// MQTT defaults
fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_protocol() -> String {
    "tcp".to_string()
}

fn default_mqtt_topic() -> String {
    "v1/devices/+/+".to_string()
}

fn default_mqtt_client_id() -> String {
    "rdas-bridge".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    60
}

fn default_mqtt_max_packet_size() -> usize {
    1024 * 1024
}

fn default_mqtt_max_retry_attempts() -> u32 {
    0
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_max_retry_delay_secs() -> u64 {
    300
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "rdas".to_string()
}

fn default_postgres_username() -> String {
    "rdas".to_string()
}

fn default_postgres_password() -> String {
    "rdas".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_connect_max_attempts() -> u32 {
    10
}

fn default_audit_log_dir() -> String {
    "/opt/lampp/htdocs/DAQ/LOG".to_string()
}

fn default_reading_utc_offset() -> String {
    "+07:00".to_string()
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "rdas-bridge".to_string()
}

impl ServiceConfig {
    /// Optional YAML file (`RDAS_CONFIG_FILE`, else `config/config.yaml`)
    /// overridden by `RDAS_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    pub fn reading_offset(&self) -> DomainResult<FixedOffset> {
        FixedOffset::from_str(self.reading_utc_offset.trim()).map_err(|e| {
            DomainError::InvalidConfig(format!(
                "reading_utc_offset '{}' is not a UTC offset like +07:00: {}",
                self.reading_utc_offset, e
            ))
        })
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn postgres_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.postgres_connect_max_attempts,
            Duration::from_secs(self.postgres_connect_retry_delay_secs),
            Duration::from_secs(default_max_retry_delay_secs()),
        )
    }

    pub fn mqtt_subscriber_config(&self) -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            protocol: self.mqtt_protocol.clone(),
            topic: self.mqtt_topic.clone(),
            client_id: self.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            max_packet_size: self.mqtt_max_packet_size,
            retry_policy: RetryPolicy::new(
                self.mqtt_max_retry_attempts,
                Duration::from_secs(self.mqtt_retry_delay_secs),
                Duration::from_secs(self.mqtt_max_retry_delay_secs),
            ),
        }
    }

    pub fn audit_log_dir(&self) -> PathBuf {
        PathBuf::from(&self.audit_log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const TEST_VARS: [&str; 6] = [
        "RDAS_LOG_LEVEL",
        "RDAS_MQTT_MAX_PACKET_SIZE",
        "RDAS_MQTT_HOST",
        "RDAS_MQTT_PORT",
        "RDAS_READING_UTC_OFFSET",
        CONFIG_FILE_ENV,
    ];

    fn clear_env() {
        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            for var in TEST_VARS {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::load().unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.mqtt_port, 1883);
        assert_eq!(config.mqtt_client_id, "rdas-bridge");
        assert_eq!(config.reading_utc_offset, "+07:00");
        assert!(!config.otel_enabled);
        assert_eq!(
            config.reading_offset().unwrap(),
            FixedOffset::east_opt(7 * 3600).unwrap()
        );
    }

    #[test]
    fn test_env_overrides() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("RDAS_LOG_LEVEL", "debug");
            std::env::set_var("RDAS_MQTT_HOST", "broker.example.com");
            std::env::set_var("RDAS_MQTT_PORT", "8883");
            std::env::set_var("RDAS_MQTT_MAX_PACKET_SIZE", "4194304");
        }

        let config = ServiceConfig::load().unwrap();
        clear_env();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.mqtt_host, "broker.example.com");
        assert_eq!(config.mqtt_port, 8883);
        assert_eq!(config.mqtt_subscriber_config().max_packet_size, 4 * 1024 * 1024);
    }

    #[test]
    fn test_yaml_file_under_env() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "mqtt_host: yaml-broker").unwrap();
        writeln!(file, "log_level: warn").unwrap();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var(CONFIG_FILE_ENV, file.path());
            std::env::set_var("RDAS_LOG_LEVEL", "trace");
        }

        let config = ServiceConfig::load().unwrap();
        clear_env();

        assert_eq!(config.mqtt_host, "yaml-broker");
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_invalid_reading_offset() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("RDAS_READING_UTC_OFFSET", "Asia/Bangkok");
        }

        let config = ServiceConfig::load().unwrap();
        clear_env();

        assert!(matches!(
            config.reading_offset(),
            Err(DomainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_component_configs() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::load().unwrap();

        let mqtt = config.mqtt_subscriber_config();
        assert_eq!(mqtt.topic, "v1/devices/+/+");
        assert_eq!(mqtt.keep_alive, Duration::from_secs(60));
        assert_eq!(mqtt.max_packet_size, 1024 * 1024);
        assert!(mqtt.retry_policy.is_unbounded());

        let postgres = config.postgres_config();
        assert_eq!(postgres.database, "rdas");

        let policy = config.postgres_retry_policy();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
    }
}
