//! Domain types and pure logic shared by the scheduling engine and the
//! control plane: the task/task-group data model, trigger resolution,
//! template resolution, and configuration.

pub mod config;
pub mod defaults;
pub mod model;
pub mod template;
pub mod trigger;
pub mod utils;

pub use config::ServiceConfig;
pub use model::{
    CallableInfo, ParameterInfo, Task, TaskGroup, TaskGroupStatus, TaskStatus, TriggerSpec,
};
pub use trigger::Trigger;

/// Result type alias used throughout the workspace.
pub type Result<T> = anyhow::Result<T>;

/// Domain error kinds for the scheduling and pipeline service. Variants map
/// 1:1 onto the control API's HTTP status codes via `IntoResponse` in the
/// `api` crate.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_their_detail() {
        let err = SchedulerError::NotFound("task t1".to_string());
        assert_eq!(err.to_string(), "not found: task t1");
    }
}
