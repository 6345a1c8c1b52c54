use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::channel::ChannelKind;
use crate::export::FileFormat;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub integration: IntegrationConfig,
    pub api: ApiConfig,
    pub file: FileConfig,
    #[serde(default)]
    pub ftp: FtpConfig,
    pub delivery: DeliveryConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    /// Which delivery channel moves the queue: "api" or "file"
    pub channel: ChannelKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Endpoint receiving the JSON batch payload
    pub url: String,
    /// Bearer token for the Authorization header
    pub token: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Directory receiving generated batch files (created if absent)
    pub output_dir: PathBuf,
    /// csv | xml | json
    pub format: FileFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FtpConfig {
    /// Upload generated files after writing them
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_ftp_port(),
            user: String::new(),
            password: String::new(),
        }
    }
}

fn default_ftp_port() -> u16 {
    21
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum entries per transmitted batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Total attempts for the API channel, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_batch_size() -> usize {
    100
}

fn default_retry_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Start firing on boot; `stop`/`start` toggle at runtime
    #[serde(default)]
    pub enabled: bool,
    /// Quartz-style six/seven-field cron expression
    pub cron: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("api.timeout_secs", 30)?
            .set_default("delivery.batch_size", 100)?
            .set_default("delivery.retry_attempts", 3)?
            .set_default("database.max_connections", 5)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RELAY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RELAY_API__TOKEN, etc.)
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values; collects every violation
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.delivery.batch_size == 0 {
            errors.push("delivery.batch_size must be at least 1".to_string());
        }

        if self.delivery.retry_attempts == 0 {
            errors.push("delivery.retry_attempts must be at least 1".to_string());
        }

        match self.integration.channel {
            ChannelKind::Api => {
                if self.api.url.is_empty() {
                    errors.push("api.url must be set for the api channel".to_string());
                }
                if self.api.token.is_empty() {
                    errors.push("api.token must be set for the api channel".to_string());
                }
            }
            ChannelKind::File => {
                if self.file.output_dir.as_os_str().is_empty() {
                    errors.push("file.output_dir must be set for the file channel".to_string());
                }
                if self.ftp.enabled && self.ftp.host.is_empty() {
                    errors.push("ftp.host must be set when ftp.enabled".to_string());
                }
            }
        }

        if let Err(e) = cron::Schedule::from_str(&self.scheduler.cron) {
            errors.push(format!(
                "scheduler.cron is not a valid cron expression: {e}"
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            integration: IntegrationConfig {
                channel: ChannelKind::Api,
            },
            api: ApiConfig {
                url: "https://erp.example.com/lancamentos".to_string(),
                token: "secret".to_string(),
                timeout_secs: 30,
            },
            file: FileConfig {
                output_dir: PathBuf::from("/tmp/relay-out"),
                format: FileFormat::Csv,
            },
            ftp: FtpConfig::default(),
            delivery: DeliveryConfig {
                batch_size: 100,
                retry_attempts: 3,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                cron: "0 0/30 * * * ?".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/ledger_relay".to_string(),
                max_connections: 5,
            },
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn invalid_cron_is_rejected_before_any_delivery() {
        let mut config = base_config();
        config.scheduler.cron = "every 30 minutes".to_string();
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("scheduler.cron")));
    }

    #[test]
    fn api_channel_requires_url_and_token() {
        let mut config = base_config();
        config.api.url.clear();
        config.api.token.clear();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn default_ftp_port_matches_deserialization_default() {
        assert_eq!(FtpConfig::default().port, 21);
    }

    #[test]
    fn ftp_host_required_only_when_enabled() {
        let mut config = base_config();
        config.integration.channel = ChannelKind::File;
        assert!(config.validate().is_ok());

        config.ftp.enabled = true;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("ftp.host")));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = base_config();
        config.delivery.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_var_overrides_file_value() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
            [integration]
            channel = "api"

            [api]
            url = "https://erp.example.com/lancamentos"
            token = "change-me"

            [file]
            output_dir = "./out"
            format = "csv"

            [scheduler]
            enabled = false
            cron = "0 0/30 * * * ?"

            [database]
            url = "postgres://localhost/ledger_relay"
            "#,
        )
        .unwrap();

        std::env::set_var("RELAY_API__TOKEN", "from-environment");
        let config = AppConfig::load_from(dir.path()).unwrap();
        std::env::remove_var("RELAY_API__TOKEN");

        assert_eq!(config.api.token, "from-environment");
        assert_eq!(config.api.url, "https://erp.example.com/lancamentos");
    }
}
