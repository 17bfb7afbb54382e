//! Pipeline executor: runs a `TaskGroup`'s steps sequentially against
//! a shared per-run context, threading each step's resolved arguments
//! through the template resolver before dispatch.

use crate::http_action::{execute_http_request, HttpRequestParams};
use crate::registry::CallableRegistry;
use crate::store::TaskStore;
use reqwest::Client;
use scheduler_core::{template, SchedulerError, TaskGroup, TaskGroupStatus};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct PipelineExecutor {
    registry: CallableRegistry,
    http_client: Client,
    http_default_timeout_seconds: u64,
}

impl PipelineExecutor {
    pub fn new(registry: CallableRegistry, http_client: Client, http_default_timeout_seconds: u64) -> Self {
        Self {
            registry,
            http_client,
            http_default_timeout_seconds,
        }
    }

    pub fn registry(&self) -> &CallableRegistry {
        &self.registry
    }

    /// Runs `group_id` exactly once. Rejects if the group is already
    /// running, per the executor's no-overlap rule; the check and the
    /// transition into the run are atomic in the store.
    pub async fn run_group(&self, store: &TaskStore, group_id: &str) -> Result<(), SchedulerError> {
        let mut group = store
            .begin_group_run(group_id, scheduler_core::utils::now_iso8601())
            .await?;

        info!(
            "开始定时执行任务组: {} (ID: {})",
            group.name, group.id
        );

        let terminal_status = self.run_steps(store, &mut group).await;

        store
            .update_group(group_id, |g| {
                g.status = terminal_status;
                g.current_task_index = group.current_task_index;
                g.clear_context();
            })
            .await?;

        Ok(())
    }

    async fn run_steps(&self, store: &TaskStore, group: &mut TaskGroup) -> TaskGroupStatus {
        while group.current_task_index < group.task_ids.len() {
            let step_id = group.task_ids[group.current_task_index].clone();
            let Some(mut task) = store.get_task(&step_id).await else {
                error!(
                    "任务组 {} (ID: {}) 中的任务不存在: {}",
                    group.name, group.id, step_id
                );
                return TaskGroupStatus::Error;
            };

            let is_http_request = task.function == "http_request";
            let callable = if is_http_request {
                None
            } else {
                match self.registry.get(&task.function) {
                    Some(c) => Some(c),
                    None => {
                        error!(
                            "任务组 {} (ID: {}) 中的任务函数不存在: {}",
                            group.name, group.id, task.function
                        );
                        return TaskGroupStatus::Error;
                    }
                }
            };

            info!(
                "任务组 {} (ID: {}) 正在执行任务 {}/{}: {} (ID: {})",
                group.name,
                group.id,
                group.current_task_index + 1,
                group.task_ids.len(),
                task.name,
                step_id
            );

            let resolved_args: std::collections::HashMap<String, Value> = task
                .args
                .iter()
                .map(|(k, v)| (k.clone(), template::resolve(v, group)))
                .collect();

            let result = match &callable {
                Some(callable) => callable.call(resolved_args).await,
                None => {
                    let mut params = match HttpRequestParams::from_args(
                        &resolved_args,
                        self.http_default_timeout_seconds,
                    ) {
                        Ok(p) => p,
                        Err(e) => {
                            error!(
                                "任务组 {} (ID: {}) 中的任务执行失败: {} (ID: {}), 错误: {e}",
                                group.name, group.id, task.name, step_id
                            );
                            return TaskGroupStatus::Error;
                        }
                    };
                    params.task_id = Some(step_id.clone());
                    Ok(execute_http_request(&self.http_client, &params).await)
                }
            };

            task.last_run = Some(scheduler_core::utils::now_iso8601());
            store
                .update_task(&step_id, |t| {
                    t.last_run = task.last_run.clone();
                    t.run_count += 1;
                })
                .await
                .ok();

            let value = match result {
                Ok(v) => v,
                Err(e) => {
                    error!(
                        "任务组 {} (ID: {}) 中的任务执行失败: {} (ID: {}), 错误: {e}",
                        group.name, group.id, task.name, step_id
                    );
                    return TaskGroupStatus::Error;
                }
            };

            group.set_context_value("last_result", value.clone());
            group.set_context_value(format!("task_{step_id}_result"), value.clone());

            if task.function == "http_request" {
                if let Some(content) = value.get("content").and_then(|c| c.as_str()) {
                    match serde_json::from_str::<Value>(content) {
                        Ok(json_content) => {
                            group.set_context_value("last_json", json_content.clone());
                            group.set_context_value(format!("task_{step_id}_json"), json_content);
                        }
                        Err(_) => {
                            group.set_context_value("last_content", Value::String(content.to_string()));
                            group.set_context_value(
                                format!("task_{step_id}_content"),
                                Value::String(content.to_string()),
                            );
                        }
                    }
                }
                let status_code = value.get("status_code").and_then(|v| v.as_u64());
                let success = value.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
                info!(
                    "任务组 {} (ID: {}) 中的HTTP请求任务执行完成: {} (ID: {}), 状态: {}, 状态码: {:?}",
                    group.name,
                    group.id,
                    task.name,
                    step_id,
                    if success { "成功" } else { "失败" },
                    status_code
                );
            } else {
                info!(
                    "任务组 {} (ID: {}) 中的任务执行成功: {} (ID: {}), 结果: {}",
                    group.name,
                    group.id,
                    task.name,
                    step_id,
                    scheduler_core::utils::truncate_string(&value.to_string(), 100)
                );
            }

            group.current_task_index += 1;
        }

        info!("任务组执行完成: {} (ID: {})", group.name, group.id);
        TaskGroupStatus::Completed
    }

    /// Runs a single task's callable in isolation (`execute_now` on a bare
    /// task, outside of any pipeline). The task's own args are used as-is;
    /// there is no group context to resolve references against.
    pub async fn run_task_once(&self, task_id: &str, store: &TaskStore) -> Result<Value, SchedulerError> {
        let task = store
            .get_task(task_id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(format!("task '{task_id}' not found")))?;

        let is_http_request = task.function == "http_request";
        let callable = if is_http_request {
            None
        } else {
            Some(self.registry.get(&task.function).ok_or_else(|| {
                SchedulerError::InvalidArgument(format!("unknown callable '{}'", task.function))
            })?)
        };

        let result = match &callable {
            Some(callable) => callable.call(task.args.clone()).await,
            None => {
                let mut params =
                    HttpRequestParams::from_args(&task.args, self.http_default_timeout_seconds)
                        .map_err(SchedulerError::InvalidArgument)?;
                params.task_id = Some(task_id.to_string());
                Ok(execute_http_request(&self.http_client, &params).await)
            }
        };

        store
            .update_task(task_id, |t| {
                t.run_count += 1;
                t.last_run = Some(scheduler_core::utils::now_iso8601());
            })
            .await?;

        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("task '{}' execution failed: {e}", task_id);
                Err(SchedulerError::UpstreamFailure(e))
            }
        }
    }
}
