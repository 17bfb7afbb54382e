//! Task store: the in-memory source of truth for tasks and task
//! groups, guarded by a single mutex so cross-entity invariants (delete
//! cascade, reorder-is-a-permutation) are checked and applied atomically.

use scheduler_core::{SchedulerError, Task, TaskGroup, TaskGroupStatus};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    tasks: HashMap<String, Task>,
    groups: HashMap<String, TaskGroup>,
}

#[derive(Default)]
pub struct TaskStore {
    tables: Mutex<Tables>,
}

/// The groups a deleted task was removed from, returned to the caller so
/// the control API can report cascade effects.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AffectedGroup {
    pub id: String,
    pub name: String,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_task(&self, task: Task) {
        self.tables.lock().await.tasks.insert(task.id.clone(), task);
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.tables.lock().await.tasks.get(id).cloned()
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tables.lock().await.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub async fn update_task<F>(&self, id: &str, f: F) -> Result<Task, SchedulerError>
    where
        F: FnOnce(&mut Task),
    {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(format!("task '{id}' not found")))?;
        f(task);
        Ok(task.clone())
    }

    /// Deletes a task and removes it from every group's `task_ids`,
    /// returning the groups that were affected.
    pub async fn delete_task(&self, id: &str) -> Result<Vec<AffectedGroup>, SchedulerError> {
        let mut tables = self.tables.lock().await;
        if tables.tasks.remove(id).is_none() {
            return Err(SchedulerError::NotFound(format!("task '{id}' not found")));
        }
        let mut affected = Vec::new();
        for group in tables.groups.values_mut() {
            if group.task_ids.iter().any(|t| t == id) {
                group.task_ids.retain(|t| t != id);
                affected.push(AffectedGroup {
                    id: group.id.clone(),
                    name: group.name.clone(),
                });
            }
        }
        Ok(affected)
    }

    pub async fn insert_group(&self, group: TaskGroup) {
        self.tables.lock().await.groups.insert(group.id.clone(), group);
    }

    pub async fn get_group(&self, id: &str) -> Option<TaskGroup> {
        self.tables.lock().await.groups.get(id).cloned()
    }

    pub async fn list_groups(&self) -> Vec<TaskGroup> {
        let mut groups: Vec<TaskGroup> = self.tables.lock().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups
    }

    pub async fn update_group<F>(&self, id: &str, f: F) -> Result<TaskGroup, SchedulerError>
    where
        F: FnOnce(&mut TaskGroup),
    {
        let mut tables = self.tables.lock().await;
        let group = tables
            .groups
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
        f(group);
        Ok(group.clone())
    }

    pub async fn delete_group(&self, id: &str) -> Result<(), SchedulerError> {
        let mut tables = self.tables.lock().await;
        tables
            .groups
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))
    }

    /// Atomically gates a group into its next run: rejects if a run is
    /// already in flight, otherwise stamps `last_run`, bumps `run_count`,
    /// resets the step cursor and context, and marks the group running.
    /// Check and transition happen under one lock so concurrent firings
    /// (scheduled and `execute_now`) can't both enter.
    pub async fn begin_group_run(
        &self,
        id: &str,
        now: String,
    ) -> Result<TaskGroup, SchedulerError> {
        let mut tables = self.tables.lock().await;
        let group = tables
            .groups
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
        if group.status == TaskGroupStatus::Running {
            return Err(SchedulerError::Conflict(format!(
                "task group '{id}' is already running"
            )));
        }
        group.last_run = Some(now);
        group.run_count += 1;
        group.current_task_index = 0;
        group.clear_context();
        group.status = TaskGroupStatus::Running;
        Ok(group.clone())
    }

    /// Reorders a group's task list. The submitted ids must be a
    /// permutation of the group's current task ids.
    pub async fn reorder_group(
        &self,
        id: &str,
        new_order: Vec<String>,
    ) -> Result<TaskGroup, SchedulerError> {
        let mut tables = self.tables.lock().await;
        let group = tables
            .groups
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;

        let mut current_sorted = group.task_ids.clone();
        let mut new_sorted = new_order.clone();
        current_sorted.sort();
        new_sorted.sort();
        if current_sorted != new_sorted {
            return Err(SchedulerError::InvalidArgument(
                "reordered task ids must be a permutation of the group's current task ids"
                    .to_string(),
            ));
        }

        group.task_ids = new_order;
        Ok(group.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::{TaskGroupStatus, TaskStatus, TriggerSpec};
    use std::collections::HashMap as StdHashMap;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            function: "hello_world".to_string(),
            args: StdHashMap::new(),
            trigger: TriggerSpec::default(),
            status: TaskStatus::Created,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            last_run: None,
            next_run: None,
            run_count: 0,
            job_id: None,
        }
    }

    fn sample_group(id: &str, task_ids: Vec<&str>) -> TaskGroup {
        TaskGroup {
            id: id.to_string(),
            name: id.to_string(),
            task_ids: task_ids.into_iter().map(String::from).collect(),
            trigger: TriggerSpec::default(),
            status: TaskGroupStatus::Created,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            last_run: None,
            next_run: None,
            run_count: 0,
            current_task_index: 0,
            context: StdHashMap::new(),
            job_id: None,
        }
    }

    #[tokio::test]
    async fn delete_task_cascades_into_groups() {
        let store = TaskStore::new();
        store.insert_task(sample_task("t1")).await;
        store.insert_task(sample_task("t2")).await;
        store.insert_group(sample_group("g1", vec!["t1", "t2"])).await;

        let affected = store.delete_task("t1").await.unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].id, "g1");

        let group = store.get_group("g1").await.unwrap();
        assert_eq!(group.task_ids, vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn delete_missing_task_is_not_found() {
        let store = TaskStore::new();
        let err = store.delete_task("missing").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(_)));
    }

    #[tokio::test]
    async fn begin_group_run_rejects_a_running_group() {
        let store = TaskStore::new();
        store.insert_group(sample_group("g1", vec!["t1"])).await;

        let started = store
            .begin_group_run("g1", "2026-01-01T00:00:00+00:00".to_string())
            .await
            .unwrap();
        assert_eq!(started.status, TaskGroupStatus::Running);
        assert_eq!(started.run_count, 1);

        let err = store
            .begin_group_run("g1", "2026-01-01T00:00:01+00:00".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Conflict(_)));
    }

    #[tokio::test]
    async fn reorder_requires_a_permutation() {
        let store = TaskStore::new();
        store.insert_group(sample_group("g1", vec!["t1", "t2"])).await;

        let err = store
            .reorder_group("g1", vec!["t1".to_string(), "t3".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));

        let reordered = store
            .reorder_group("g1", vec!["t2".to_string(), "t1".to_string()])
            .await
            .unwrap();
        assert_eq!(reordered.task_ids, vec!["t2".to_string(), "t1".to_string()]);
    }
}
