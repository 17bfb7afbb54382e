//! Default values for [`crate::config::ServiceConfig`] fields.
//!
//! Centralized here so `serde`'s `#[serde(default = "...")]` attributes stay
//! short and the defaults are easy to audit in one place.

/// Default HTTP control plane listen address.
pub fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

/// Default directory for the append-only task log.
pub fn default_log_directory() -> String {
    "./logs".to_string()
}

/// Default task log file name, continuously appended and read back by the
/// log filter.
pub fn default_log_file_name() -> String {
    "tasks.log".to_string()
}

/// Default time budget for in-flight task runs to finish during shutdown.
pub fn default_graceful_shutdown_timeout_seconds() -> u64 {
    30
}

/// Default timeout applied to the built-in `http_request` callable when the
/// task itself doesn't specify one.
pub fn default_http_default_timeout_seconds() -> u64 {
    30
}
