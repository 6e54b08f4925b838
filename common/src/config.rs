// Configuration management with layered configuration (file, env)

use crate::errors::ValidationError;
use crate::models::TASK_EXEC_PHP;
use crate::queue::NatsConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub nats: NatsConfig,
    pub client: ClientConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

/// Submission client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Task every submission targets
    pub task_name: String,
    /// Number of submissions when none is given on the command line
    pub default_count: u64,
    pub publish_timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            task_name: TASK_EXEC_PHP.to_string(),
            default_count: 10,
            publish_timeout_seconds: 5,
        }
    }
}

impl ClientConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_seconds)
    }
}

/// Script-running worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Working directory scripts are resolved against
    pub basedir: PathBuf,
    /// Scripts still running after this many seconds are killed
    pub timeout_seconds: u64,
    /// Interpreter used for `execphp` jobs
    pub php_binary: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            basedir: PathBuf::from("./script/"),
            timeout_seconds: 30,
            php_binary: "php".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Prometheus listener port; metrics are disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.nats.url.is_empty() {
            return Err(invalid("nats.url", "cannot be empty"));
        }
        if self.nats.stream_name.is_empty() {
            return Err(invalid("nats.stream_name", "cannot be empty"));
        }
        if self.nats.subject_prefix.is_empty() {
            return Err(invalid("nats.subject_prefix", "cannot be empty"));
        }

        if self.client.task_name.is_empty() {
            return Err(invalid("client.task_name", "cannot be empty"));
        }
        if self.client.task_name.contains(['.', '*', '>', ' ']) {
            return Err(invalid(
                "client.task_name",
                "must be a single subject token",
            ));
        }
        if self.client.publish_timeout_seconds == 0 {
            return Err(invalid(
                "client.publish_timeout_seconds",
                "must be greater than 0",
            ));
        }

        if self.worker.timeout_seconds == 0 {
            return Err(invalid("worker.timeout_seconds", "must be greater than 0"));
        }
        // A job still running when JetStream's ack deadline passes is never
        // redelivered, so the script must be killed first
        if self.worker.timeout_seconds >= self.nats.ack_wait_seconds {
            return Err(invalid(
                "worker.timeout_seconds",
                "must be less than nats.ack_wait_seconds",
            ));
        }
        if self.worker.php_binary.is_empty() {
            return Err(invalid("worker.php_binary", "cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidFieldValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.client.task_name, "execphp");
        assert_eq!(settings.client.default_count, 10);
        assert_eq!(settings.worker.basedir, PathBuf::from("./script/"));
    }

    #[test]
    fn test_validation_catches_empty_nats_url() {
        let mut settings = Settings::default();
        settings.nats.url = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_timeout() {
        let mut settings = Settings::default();
        settings.worker.timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_requires_timeout_below_ack_wait() {
        let mut settings = Settings::default();
        settings.nats.ack_wait_seconds = 60;
        settings.worker.timeout_seconds = 60;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("worker.timeout_seconds"));

        settings.worker.timeout_seconds = 59;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_wildcard_task_name() {
        let mut settings = Settings::default();
        settings.client.task_name = "exec.*".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("client.task_name"));
    }

    #[test]
    fn test_load_from_directory_with_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[client]\ndefault_count = 3\n\n[worker]\nbasedir = \"/srv/scripts\"\n",
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.client.default_count, 3);
        assert_eq!(settings.client.task_name, "execphp");
        assert_eq!(settings.worker.basedir, PathBuf::from("/srv/scripts"));
        assert_eq!(settings.nats.stream_name, "GEARMAN_JOBS");
    }
}
