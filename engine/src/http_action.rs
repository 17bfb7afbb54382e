//! Built-in `http_request` callable: issues an HTTP request and
//! returns a structured `{status_code, headers, content, success}` result,
//! or `{error, success: false}` on failure.
//!
//! The Chinese log lines frame each request as a multi-line span; the log
//! filter matches their start and terminal markers to keep the whole span
//! attached to the task that opened it, so their wording is load-bearing.

use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Response body size above which the service stops buffering it, to bound
/// memory use for misbehaving endpoints.
const MAX_RESPONSE_SIZE: u64 = 100 * 1024 * 1024;

pub struct HttpRequestParams {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub timeout_seconds: u64,
    pub verify: bool,
    pub task_id: Option<String>,
}

impl HttpRequestParams {
    pub fn from_args(args: &HashMap<String, Value>, default_timeout_seconds: u64) -> Result<Self, String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "http_request requires a string 'url' argument".to_string())?
            .to_string();
        let method = args
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();
        let headers = args
            .get("headers")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let body = args.get("body").cloned();
        let timeout_seconds = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(default_timeout_seconds);
        let verify = args.get("verify").and_then(|v| v.as_bool()).unwrap_or(true);
        let task_id = args
            .get("task_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(HttpRequestParams {
            url,
            method,
            headers,
            body,
            timeout_seconds,
            verify,
            task_id,
        })
    }
}

/// Executes the HTTP action and returns the result as a JSON value, never
/// erroring itself - failures are reported in the returned object's
/// `success`/`error` fields, so a pipeline step always receives a usable
/// context value.
pub async fn execute_http_request(client: &Client, params: &HttpRequestParams) -> Value {
    let prefix = params
        .task_id
        .as_deref()
        .map(|id| format!("[任务ID: {id}] "))
        .unwrap_or_default();

    info!("{prefix}开始执行HTTP请求: {} {}", params.method, params.url);
    info!("{prefix}请求头: {:?}", params.headers);
    if !matches!(params.method.as_str(), "GET" | "HEAD" | "OPTIONS") {
        if let Some(body) = &params.body {
            info!("{prefix}请求体: {body}");
        }
    }
    info!(
        "{prefix}超时设置: {}秒, SSL验证: {}",
        params.timeout_seconds,
        if params.verify { "启用" } else { "禁用" }
    );

    let start = Instant::now();
    let timeout = Duration::from_secs(params.timeout_seconds);

    // TLS verification is a client-level setting in reqwest, so requests
    // with `verify: false` go through a separate shared client.
    let client = if params.verify {
        client
    } else {
        insecure_client()
    };
    let mut builder = client
        .request(
            params.method.parse().unwrap_or(reqwest::Method::GET),
            &params.url,
        )
        .timeout(timeout);

    for (name, value) in &params.headers {
        builder = builder.header(name, value);
    }
    builder = match &params.body {
        Some(Value::Object(_)) | Some(Value::Array(_)) => builder.json(&params.body),
        Some(Value::String(s)) if looks_like_json(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed) => builder.json(&parsed),
            Err(_) => builder.body(s.clone()),
        },
        Some(Value::String(s)) => builder.body(s.clone()),
        _ => builder,
    };

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            let error_msg = e.to_string();
            error!("{prefix}HTTP请求发生错误: {error_msg}");
            return failure(error_msg);
        }
    };

    let status_code = response.status().as_u16();
    let headers: Map<String, Value> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    info!("{prefix}收到响应: 状态码 {status_code}");
    info!("{prefix}响应头: {:?}", headers);

    if let Some(content_length) = response.content_length() {
        if content_length > MAX_RESPONSE_SIZE {
            let msg = format!(
                "response size ({content_length} bytes) exceeds maximum of {MAX_RESPONSE_SIZE} bytes"
            );
            error!("{prefix}HTTP请求发生错误: {msg}");
            return failure(msg);
        }
    }

    let content = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            let error_msg = e.to_string();
            error!("{prefix}HTTP请求发生错误: {error_msg}");
            return failure(error_msg);
        }
    };

    if content.len() as u64 > MAX_RESPONSE_SIZE {
        let msg = format!(
            "response body ({} bytes) exceeds maximum of {MAX_RESPONSE_SIZE} bytes",
            content.len()
        );
        error!("{prefix}HTTP请求发生错误: {msg}");
        return failure(msg);
    }

    let success = status_code < 400;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        "{prefix}HTTP请求完成: {}",
        if success { "成功" } else { "失败" }
    );
    tracing::debug!("{prefix}请求耗时: {}", scheduler_core::utils::format_duration(elapsed_ms));

    Value::Object(
        [
            ("status_code".to_string(), Value::from(status_code)),
            ("headers".to_string(), Value::Object(headers)),
            ("content".to_string(), Value::String(content)),
            ("success".to_string(), Value::Bool(success)),
        ]
        .into_iter()
        .collect(),
    )
}

/// A templated `${...}` reference can resolve to a string that is itself a
/// JSON object or array; such bodies are re-parsed and sent as structured
/// JSON rather than a literal string.
fn looks_like_json(s: &str) -> bool {
    matches!(s.trim_start().as_bytes().first(), Some(b'{') | Some(b'['))
}

fn insecure_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

fn failure(error: String) -> Value {
    Value::Object(
        [
            ("error".to_string(), Value::String(error)),
            ("success".to_string(), Value::Bool(false)),
        ]
        .into_iter()
        .collect(),
    )
}
