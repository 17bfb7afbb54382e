//! Service configuration loaded from a TOML file, with CLI overrides
//! applied on top.

use crate::defaults::*;
use crate::SchedulerError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,
    #[serde(default = "default_graceful_shutdown_timeout_seconds")]
    pub graceful_shutdown_timeout_seconds: u64,
    #[serde(default = "default_http_default_timeout_seconds")]
    pub http_default_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            listen_address: default_listen_address(),
            log_directory: default_log_directory(),
            log_file_name: default_log_file_name(),
            graceful_shutdown_timeout_seconds: default_graceful_shutdown_timeout_seconds(),
            http_default_timeout_seconds: default_http_default_timeout_seconds(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SchedulerError::Internal(format!(
                "failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: ServiceConfig = toml::from_str(&contents)
            .map_err(|e| SchedulerError::InvalidArgument(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            SchedulerError::InvalidArgument(format!(
                "invalid listen_address '{}': {e}",
                self.listen_address
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let mut config = ServiceConfig::default();
        config.listen_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(&path, "listen_address = \"0.0.0.0:9090\"\n").unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.listen_address, "0.0.0.0:9090");
        assert_eq!(config.log_file_name, default_log_file_name());
    }
}
