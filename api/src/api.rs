//! HTTP control plane: translates REST requests into calls against the
//! task store, scheduler, and pipeline executor. Handlers stay thin - all
//! invariant checking lives in the engine and core crates; this module's
//! job is request parsing, dispatch, and mapping domain errors onto HTTP
//! status codes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scheduler_core::{CallableInfo, SchedulerError, Task, TaskGroup, TaskGroupStatus, TaskStatus, Trigger, TriggerSpec};
use scheduler_engine::{EntityRef, LogFilter, PipelineExecutor, Scheduler, TaskStore};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub scheduler: Arc<Scheduler>,
    pub executor: PipelineExecutor,
    pub logs: Arc<LogFilter>,
}

impl AppState {
    pub fn new(store: Arc<TaskStore>, scheduler: Arc<Scheduler>, executor: PipelineExecutor, logs: Arc<LogFilter>) -> Self {
        Self {
            store,
            scheduler,
            executor,
            logs,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/start", post(arm_task))
        .route("/api/tasks/{id}/stop", post(disarm_task))
        .route("/api/tasks/{id}/execute", post(execute_task))
        .route("/api/functions", get(list_functions))
        .route(
            "/api/task-groups",
            get(list_groups).post(create_group),
        )
        .route(
            "/api/task-groups/{id}",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route("/api/task-groups/{id}/start", post(arm_group))
        .route("/api/task-groups/{id}/stop", post(disarm_group))
        .route("/api/task-groups/{id}/execute", post(execute_group))
        .route(
            "/api/task-groups/{id}/tasks",
            post(add_group_member).delete(remove_group_member),
        )
        .route("/api/task-groups/{id}/reorder", post(reorder_group))
        .route("/api/logs", get(get_all_logs).delete(clear_all_logs))
        .route("/api/logs/{id}", get(get_entity_logs).delete(clear_entity_logs))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "healthy", "service": "scheduler-api"}))
}

// ---------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    name: String,
    function: String,
    #[serde(default)]
    args: HashMap<String, Value>,
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::new_v4().to_string();
    let task = Task {
        id: id.clone(),
        name: req.name,
        function: req.function,
        args: req.args,
        trigger: TriggerSpec::default(),
        status: TaskStatus::Created,
        created_at: scheduler_core::utils::now_iso8601(),
        last_run: None,
        next_run: None,
        run_count: 0,
        job_id: None,
    };
    state.store.insert_task(task).await;
    info!("created task '{id}'");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "status": "created"})),
    ))
}

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let mut tasks = state.store.list_tasks().await;
    for task in &mut tasks {
        overlay_next_run(&state, &task.id, &mut task.next_run).await;
    }
    Json(serde_json::json!({"tasks": tasks}))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let mut task = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task '{id}' not found")))?;
    overlay_next_run(&state, &id, &mut task.next_run).await;
    Ok(Json(task))
}

#[derive(Debug, Deserialize, Default)]
struct UpdateTaskRequest {
    name: Option<String>,
    function: Option<String>,
    args: Option<HashMap<String, Value>>,
    interval: Option<u64>,
    cron: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task '{id}' not found")))?;
    if existing.status == TaskStatus::Running {
        return Err(SchedulerError::InvalidArgument(
            "cannot update a running task; stop it first".to_string(),
        )
        .into());
    }

    let mut task = state
        .store
        .update_task(&id, |t| {
            if let Some(name) = req.name {
                t.name = name;
            }
            if let Some(function) = req.function {
                t.function = function;
            }
            if let Some(args) = req.args {
                t.args = args;
            }
            if let Some(interval) = req.interval {
                t.trigger.interval = Some(interval);
            }
            if let Some(cron) = req.cron {
                t.trigger.cron = Some(cron);
            }
            if let Some(start_time) = req.start_time {
                t.trigger.start_time = Some(start_time);
            }
            if let Some(end_time) = req.end_time {
                t.trigger.end_time = Some(end_time);
            }
        })
        .await?;
    overlay_next_run(&state, &id, &mut task.next_run).await;
    Ok(Json(task))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.disarm(&id).await;
    let affected = state.store.delete_task(&id).await?;
    Ok(Json(
        serde_json::json!({"status": "deleted", "affected_groups": affected}),
    ))
}

async fn arm_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<TriggerSpec>>,
) -> Result<impl IntoResponse, ApiError> {
    let trigger_spec = body.map(|Json(spec)| spec).unwrap_or_default();
    let task = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task '{id}' not found")))?;
    if task.status == TaskStatus::Running {
        return Err(SchedulerError::InvalidArgument(format!("task '{id}' is already running")).into());
    }

    let trigger = Trigger::from_spec(&trigger_spec)?;
    let store = state.store.clone();
    let executor = state.executor.clone();
    let job_id = id.clone();
    state
        .scheduler
        .arm(id.clone(), trigger, move || {
            let store = store.clone();
            let executor = executor.clone();
            let job_id = job_id.clone();
            async move {
                if let Err(e) = executor.run_task_once(&job_id, &store).await {
                    warn!("scheduled run of task '{job_id}' failed: {e}");
                }
            }
        })
        .await?;

    let mut task = state
        .store
        .update_task(&id, |t| {
            t.trigger = trigger_spec;
            t.status = TaskStatus::Running;
            t.job_id = Some(id.clone());
        })
        .await?;
    overlay_next_run(&state, &id, &mut task.next_run).await;
    Ok(Json(task))
}

async fn disarm_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task '{id}' not found")))?;
    if task.status != TaskStatus::Running {
        return Err(SchedulerError::InvalidArgument(format!("task '{id}' is not running")).into());
    }
    state.scheduler.disarm(&id).await;
    let task = state
        .store
        .update_task(&id, |t| {
            t.status = TaskStatus::Stopped;
            t.job_id = None;
            t.next_run = None;
        })
        .await?;
    Ok(Json(task))
}

async fn execute_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let result = state.executor.run_task_once(&id, &state.store).await?;
    Ok(Json(
        serde_json::json!({"status": "executed", "result": result.to_string()}),
    ))
}

async fn list_functions(State(state): State<AppState>) -> impl IntoResponse {
    let functions: Vec<CallableInfo> = state.executor.registry().list();
    Json(serde_json::json!({"functions": functions}))
}

// ---------------------------------------------------------------------
// Task groups
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    task_ids: Vec<String>,
}

async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for task_id in &req.task_ids {
        state
            .store
            .get_task(task_id)
            .await
            .ok_or_else(|| SchedulerError::InvalidArgument(format!("task '{task_id}' does not exist")))?;
    }
    let id = Uuid::new_v4().to_string();
    let group = TaskGroup {
        id: id.clone(),
        name: req.name,
        task_ids: req.task_ids,
        trigger: TriggerSpec::default(),
        status: TaskGroupStatus::Created,
        created_at: scheduler_core::utils::now_iso8601(),
        last_run: None,
        next_run: None,
        run_count: 0,
        current_task_index: 0,
        context: HashMap::new(),
        job_id: None,
    };
    state.store.insert_group(group).await;
    info!("created task group '{id}'");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "status": "created"})),
    ))
}

async fn list_groups(State(state): State<AppState>) -> impl IntoResponse {
    let mut groups = state.store.list_groups().await;
    for group in &mut groups {
        overlay_next_run(&state, &group.id, &mut group.next_run).await;
    }
    Json(serde_json::json!({"task_groups": groups}))
}

async fn get_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let mut group = state
        .store
        .get_group(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
    overlay_next_run(&state, &id, &mut group.next_run).await;
    Ok(Json(group))
}

#[derive(Debug, Deserialize, Default)]
struct UpdateGroupRequest {
    name: Option<String>,
}

async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state
        .store
        .get_group(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
    if existing.status == TaskGroupStatus::Running {
        return Err(SchedulerError::InvalidArgument(
            "cannot update a running task group; stop it first".to_string(),
        )
        .into());
    }
    let mut group = state
        .store
        .update_group(&id, |g| {
            if let Some(name) = req.name {
                g.name = name;
            }
        })
        .await?;
    overlay_next_run(&state, &id, &mut group.next_run).await;
    Ok(Json(group))
}

async fn delete_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.disarm(&id).await;
    state.store.delete_group(&id).await?;
    Ok(Json(serde_json::json!({"status": "deleted"})))
}

async fn arm_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<TriggerSpec>>,
) -> Result<impl IntoResponse, ApiError> {
    let trigger_spec = body.map(|Json(spec)| spec).unwrap_or_default();
    let group = state
        .store
        .get_group(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
    // An armed group cycles running -> completed between fires, so the
    // double-arm check is on the job handle, not the status.
    if group.job_id.is_some() {
        return Err(SchedulerError::InvalidArgument(format!("task group '{id}' is already armed")).into());
    }

    let trigger = Trigger::from_spec(&trigger_spec)?;
    let store = state.store.clone();
    let executor = state.executor.clone();
    let job_id = id.clone();
    state
        .scheduler
        .arm(id.clone(), trigger, move || {
            let store = store.clone();
            let executor = executor.clone();
            let job_id = job_id.clone();
            async move {
                if let Err(e) = executor.run_group(&store, &job_id).await {
                    warn!("scheduled run of task group '{job_id}' failed: {e}");
                }
            }
        })
        .await?;

    let mut group = state
        .store
        .update_group(&id, |g| {
            g.trigger = trigger_spec;
            g.status = TaskGroupStatus::Running;
            g.job_id = Some(id.clone());
        })
        .await?;
    overlay_next_run(&state, &id, &mut group.next_run).await;
    Ok(Json(group))
}

async fn disarm_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let group = state
        .store
        .get_group(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
    if group.job_id.is_none() {
        return Err(SchedulerError::InvalidArgument(format!("task group '{id}' is not armed")).into());
    }
    state.scheduler.disarm(&id).await;
    let group = state
        .store
        .update_group(&id, |g| {
            g.status = TaskGroupStatus::Stopped;
            g.job_id = None;
            g.next_run = None;
        })
        .await?;
    Ok(Json(group))
}

/// Out-of-band run: rejects synchronously if the group is mid-run, then
/// executes on a detached worker - the run's outcome lands in the group's
/// status and the log, not in this response.
async fn execute_group(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let group = state
        .store
        .get_group(&id)
        .await
        .ok_or_else(|| SchedulerError::NotFound(format!("task group '{id}' not found")))?;
    if group.status == TaskGroupStatus::Running {
        return Err(SchedulerError::Conflict(format!("task group '{id}' is already running")).into());
    }
    let store = state.store.clone();
    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(e) = executor.run_group(&store, &id).await {
            warn!("manual run of task group '{id}' failed: {e}");
        }
    });
    Ok(Json(serde_json::json!({"status": "executed"})))
}

#[derive(Debug, Deserialize)]
struct GroupMemberRequest {
    task_id: String,
}

async fn add_group_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<GroupMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .get_task(&req.task_id)
        .await
        .ok_or_else(|| SchedulerError::InvalidArgument(format!("task '{}' does not exist", req.task_id)))?;
    let group = state
        .store
        .update_group(&id, |g| {
            if !g.task_ids.iter().any(|t| t == &req.task_id) {
                g.task_ids.push(req.task_id.clone());
            }
        })
        .await?;
    Ok(Json(group))
}

async fn remove_group_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<GroupMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state
        .store
        .update_group(&id, |g| {
            g.task_ids.retain(|t| t != &req.task_id);
        })
        .await?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    task_ids: Vec<String>,
}

async fn reorder_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state.store.reorder_group(&id, req.task_ids).await?;
    Ok(Json(group))
}

// ---------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_lines")]
    lines: usize,
    #[serde(default = "default_days")]
    days: u32,
}

fn default_lines() -> usize {
    100
}

fn default_days() -> u32 {
    1
}

async fn get_all_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Result<impl IntoResponse, ApiError> {
    let logs = state.logs.get_all(q.lines, q.days)?;
    Ok(Json(serde_json::json!({"logs": logs})))
}

async fn get_entity_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(task) = state.store.get_task(&id).await {
        let entity = EntityRef { id: task.id, name: task.name };
        let logs = state.logs.get_for_task(&entity, q.lines, q.days)?;
        return Ok(Json(serde_json::json!({"logs": logs})));
    }
    if let Some(group) = state.store.get_group(&id).await {
        let members = member_refs(&state, &group).await;
        let entity = EntityRef { id: group.id, name: group.name };
        let logs = state.logs.get_for_group(&entity, &members, q.lines, q.days)?;
        return Ok(Json(serde_json::json!({"logs": logs})));
    }
    Err(SchedulerError::NotFound(format!("no task or task group '{id}'")).into())
}

#[derive(Debug, Deserialize, Default)]
struct ClearLogsQuery {
    #[serde(default)]
    days: u32,
}

async fn clear_all_logs(
    State(state): State<AppState>,
    Query(q): Query<ClearLogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.logs.clear(&[], q.days, &backup_stamp())?;
    Ok(Json(
        serde_json::json!({"status": "cleared", "message": format!("removed {removed} log lines")}),
    ))
}

async fn clear_entity_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ClearLogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entities = if let Some(task) = state.store.get_task(&id).await {
        vec![EntityRef { id: task.id, name: task.name }]
    } else if let Some(group) = state.store.get_group(&id).await {
        let mut entities = member_refs(&state, &group).await;
        entities.push(EntityRef { id: group.id, name: group.name });
        entities
    } else {
        return Err(SchedulerError::NotFound(format!("no task or task group '{id}'")).into());
    };
    let removed = state.logs.clear(&entities, q.days, &backup_stamp())?;
    Ok(Json(
        serde_json::json!({"status": "cleared", "message": format!("removed {removed} log lines")}),
    ))
}

fn backup_stamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

async fn member_refs(state: &AppState, group: &TaskGroup) -> Vec<EntityRef> {
    let mut refs = Vec::with_capacity(group.task_ids.len());
    for task_id in &group.task_ids {
        if let Some(task) = state.store.get_task(task_id).await {
            refs.push(EntityRef { id: task.id, name: task.name });
        }
    }
    refs
}

async fn overlay_next_run(state: &AppState, job_id: &str, next_run: &mut Option<String>) {
    if let Some(at) = state.scheduler.inspect(job_id).await {
        *next_run = Some(scheduler_core::utils::datetime_to_iso8601(at));
    }
}

// ---------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------

pub struct ApiError(SchedulerError);

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self.0 {
            SchedulerError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            SchedulerError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            SchedulerError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            SchedulerError::UpstreamFailure(_) => (StatusCode::BAD_GATEWAY, "Upstream Failure"),
            SchedulerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };
        let body = Json(serde_json::json!({
            "error": error_message,
            "details": self.0.to_string()
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use scheduler_engine::registry::register_demo_callables;
    use scheduler_engine::CallableRegistry;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut registry = CallableRegistry::new();
        register_demo_callables(&mut registry);
        let executor = PipelineExecutor::new(registry, reqwest::Client::new(), 30);
        AppState::new(
            Arc::new(TaskStore::new()),
            Arc::new(Scheduler::new()),
            executor,
            Arc::new(LogFilter::new(std::env::temp_dir().join("scheduler-api-tests.log"))),
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_fetch_task_round_trips() {
        let app = create_router(test_state());
        let create = json_request(
            "POST",
            "/api/tasks",
            serde_json::json!({"name": "greet", "function": "hello_world", "args": {}}),
        );
        let response = app.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_str().unwrap().to_string();

        let get = Request::builder()
            .uri(format!("/api/tasks/{id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task = body_json(response).await;
        assert_eq!(task["name"], "greet");
        assert_eq!(task["status"], "created");
    }

    #[tokio::test]
    async fn get_unknown_task_is_not_found() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn arming_twice_is_a_conflict() {
        let state = test_state();
        let task = Task {
            id: "t1".to_string(),
            name: "greet".to_string(),
            function: "hello_world".to_string(),
            args: HashMap::new(),
            trigger: TriggerSpec::default(),
            status: TaskStatus::Created,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            last_run: None,
            next_run: None,
            run_count: 0,
            job_id: None,
        };
        state.store.insert_task(task).await;
        let app = create_router(state);

        let arm = json_request("POST", "/api/tasks/t1/start", serde_json::json!({"interval": 60}));
        let response = app.clone().oneshot(arm).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let arm_again = json_request("POST", "/api/tasks/t1/start", serde_json::json!({"interval": 60}));
        let response = app.oneshot(arm_again).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disarming_a_stopped_task_is_rejected() {
        let state = test_state();
        state
            .store
            .insert_task(Task {
                id: "t1".to_string(),
                name: "greet".to_string(),
                function: "hello_world".to_string(),
                args: HashMap::new(),
                trigger: TriggerSpec::default(),
                status: TaskStatus::Created,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                last_run: None,
                next_run: None,
                run_count: 0,
                job_id: None,
            })
            .await;
        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks/t1/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reorder_rejects_non_permutation() {
        let state = test_state();
        state
            .store
            .insert_group(TaskGroup {
                id: "g1".to_string(),
                name: "pipeline".to_string(),
                task_ids: vec!["t1".to_string(), "t2".to_string()],
                trigger: TriggerSpec::default(),
                status: TaskGroupStatus::Created,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                last_run: None,
                next_run: None,
                run_count: 0,
                current_task_index: 0,
                context: HashMap::new(),
                job_id: None,
            })
            .await;
        let app = create_router(state);
        let reorder = json_request(
            "POST",
            "/api/task-groups/g1/reorder",
            serde_json::json!({"task_ids": ["t1", "t3"]}),
        );
        let response = app.oneshot(reorder).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_task_reports_affected_groups() {
        let state = test_state();
        state
            .store
            .insert_task(Task {
                id: "t1".to_string(),
                name: "greet".to_string(),
                function: "hello_world".to_string(),
                args: HashMap::new(),
                trigger: TriggerSpec::default(),
                status: TaskStatus::Created,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                last_run: None,
                next_run: None,
                run_count: 0,
                job_id: None,
            })
            .await;
        state
            .store
            .insert_group(TaskGroup {
                id: "g1".to_string(),
                name: "pipeline".to_string(),
                task_ids: vec!["t1".to_string()],
                trigger: TriggerSpec::default(),
                status: TaskGroupStatus::Created,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                last_run: None,
                next_run: None,
                run_count: 0,
                current_task_index: 0,
                context: HashMap::new(),
                job_id: None,
            })
            .await;
        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/tasks/t1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["affected_groups"][0]["id"], "g1");
    }

    #[tokio::test]
    async fn list_functions_includes_builtin_http_request() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/functions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let names: Vec<&str> = body["functions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"http_request"));
        assert!(names.contains(&"hello_world"));
    }

    #[tokio::test]
    async fn execute_task_runs_the_callable_immediately() {
        let state = test_state();
        state
            .store
            .insert_task(Task {
                id: "t1".to_string(),
                name: "greet".to_string(),
                function: "hello_world".to_string(),
                args: HashMap::new(),
                trigger: TriggerSpec::default(),
                status: TaskStatus::Created,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                last_run: None,
                next_run: None,
                run_count: 0,
                job_id: None,
            })
            .await;
        let app = create_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tasks/t1/execute")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task = state.store.get_task("t1").await.unwrap();
        assert_eq!(task.run_count, 1);
    }
}
