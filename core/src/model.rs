//! Domain types shared by the scheduler engine and the control plane.
//!
//! `Task` and `TaskGroup` mirror the record shapes the control API accepts
//! and returns; both carry a `serde_json::Value` bag for arguments and
//! execution context so new callables never need a schema migration here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single schedulable unit of work bound to one registered callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub function: String,
    #[serde(default)]
    pub args: HashMap<String, Value>,
    /// Scheduling fields persisted from the last arm, flattened into the
    /// record so the control API reports `interval`/`cron`/`start_time`/
    /// `end_time` directly on the task.
    #[serde(flatten)]
    pub trigger: TriggerSpec,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: String,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    #[serde(default)]
    pub run_count: u64,
    /// Job handle id under which the scheduler knows the armed firing,
    /// opaque to API callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// An ordered pipeline of task ids executed sequentially under one trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(flatten)]
    pub trigger: TriggerSpec,
    #[serde(default)]
    pub status: TaskGroupStatus,
    pub created_at: String,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub current_task_index: usize,
    #[serde(skip)]
    pub context: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl TaskGroup {
    pub fn set_context_value(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn get_context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskGroupStatus {
    #[default]
    Created,
    Running,
    Stopped,
    Completed,
    Error,
}

/// Raw trigger configuration as accepted from the control API, before
/// [`crate::trigger::Trigger`] resolves it into a concrete schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

/// Descriptor for a registered callable, as reported by the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallableInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
}

/// One formal parameter of a registered callable, with its default value
/// when the callable has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterInfo {
    pub fn required(name: impl Into<String>) -> Self {
        ParameterInfo {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: Value) -> Self {
        ParameterInfo {
            name: name.into(),
            default: Some(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_group_context_round_trips() {
        let mut group = TaskGroup {
            id: "g1".into(),
            name: "group".into(),
            task_ids: vec!["t1".into()],
            trigger: TriggerSpec::default(),
            status: TaskGroupStatus::Created,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            last_run: None,
            next_run: None,
            run_count: 0,
            current_task_index: 0,
            context: HashMap::new(),
            job_id: None,
        };
        group.set_context_value("last_result", serde_json::json!({"status_code": 200}));
        assert_eq!(
            group.get_context_value("last_result").unwrap()["status_code"],
            200
        );
        group.clear_context();
        assert!(group.get_context_value("last_result").is_none());
    }

    #[test]
    fn task_status_defaults_to_created() {
        assert_eq!(TaskStatus::default(), TaskStatus::Created);
        assert_eq!(TaskGroupStatus::default(), TaskGroupStatus::Created);
    }

    #[test]
    fn scheduling_fields_serialize_at_the_top_level() {
        let task = Task {
            id: "t1".into(),
            name: "t1".into(),
            function: "hello_world".into(),
            args: HashMap::new(),
            trigger: TriggerSpec {
                interval: Some(5),
                ..Default::default()
            },
            status: TaskStatus::Created,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            last_run: None,
            next_run: None,
            run_count: 0,
            job_id: None,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["interval"], 5);
        assert!(json.get("trigger").is_none());
        assert!(json.get("cron").is_none());
    }
}
