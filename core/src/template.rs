//! Template resolution: resolves `${...}` references in task arguments
//! against a pipeline run's accumulated context.
//!
//! Two substitution modes:
//! - **Whole-value**: the argument value is *exactly* one reference
//!   (`${context:last_json.id}`) - the referenced value is substituted with
//!   its original JSON type (object, number, bool, ...).
//! - **Embedded**: the reference appears inside a larger string
//!   (`"id is ${context:last_json.id}"`) - the referenced value is
//!   stringified and spliced in.
//!
//! A reference that can't be resolved is left in place, literally, and
//! logged at `warn`.

use crate::model::TaskGroup;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn whole_value_pattern(kind: &str) -> Regex {
    Regex::new(&format!(r"^\$\{{{kind}:([\w.-]+)\}}$")).expect("static pattern")
}

fn embedded_pattern(kind: &str) -> Regex {
    Regex::new(&format!(r"\$\{{{kind}:([\w.-]+)\}}")).expect("static pattern")
}

const KINDS: &[&str] = &[
    "context",
    "http\\.response_body",
    "http\\.response_json",
    "http\\.headers",
    "http\\.status",
];

fn embedded_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| KINDS.iter().map(|k| (*k, embedded_pattern(k))).collect())
        .as_slice()
}

/// Resolves all `${...}` references inside `value`, recursing into objects
/// and arrays. Strings that are themselves a single whole-value reference
/// keep the referenced value's original type.
pub fn resolve(value: &Value, group: &TaskGroup) -> Value {
    match value {
        Value::String(s) => resolve_string(s, group),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, group)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, group)).collect()),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, group: &TaskGroup) -> Value {
    for kind in KINDS {
        if let Some(caps) = whole_value_pattern(kind).captures(s) {
            let path = &caps[1];
            if let Some(resolved) = resolve_reference(kind, path, group) {
                return resolved;
            }
            tracing::warn!(reference = %s, "unresolved template reference");
            return Value::String(s.to_string());
        }
    }

    let mut result = s.to_string();
    for (kind, pattern) in embedded_patterns() {
        let captured_paths: Vec<String> = pattern
            .captures_iter(&result)
            .map(|c| c[1].to_string())
            .collect();
        for path in captured_paths {
            if let Some(resolved) = resolve_reference(kind, &path, group) {
                let literal = format!("${{{}:{}}}", kind.replace("\\.", "."), path);
                let replacement = match &resolved {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                result = result.replace(&literal, &replacement);
            } else {
                tracing::warn!(kind, path, "unresolved template reference");
            }
        }
    }
    Value::String(result)
}

fn resolve_reference(kind: &str, path: &str, group: &TaskGroup) -> Option<Value> {
    match kind {
        "context" => extract_context_value(path, group),
        "http\\.response_body" => {
            let key = result_key(path, "result");
            group
                .get_context_value(&key)?
                .get("content")
                .cloned()
                .or(Some(Value::String(String::new())))
        }
        "http\\.response_json" => {
            let mut parts = path.split('.');
            let head = parts.next()?;
            let key = if head == "last" {
                "last_json".to_string()
            } else {
                format!("task_{head}_json")
            };
            let mut current = group.get_context_value(&key)?.clone();
            for part in parts {
                current = current.get(part)?.clone();
            }
            Some(current)
        }
        "http\\.headers" => {
            let mut parts = path.splitn(2, '.');
            let head = parts.next()?;
            let header_name = parts.next();
            let key = result_key(head, "result");
            let headers = group.get_context_value(&key)?.get("headers")?;
            match header_name {
                Some(name) => headers.get(name).cloned(),
                None => Some(headers.clone()),
            }
        }
        "http\\.status" => {
            let key = result_key(path, "result");
            group.get_context_value(&key)?.get("status_code").cloned()
        }
        _ => None,
    }
}

fn result_key(head: &str, suffix: &str) -> String {
    if head == "last" {
        format!("last_{suffix}")
    } else {
        format!("task_{head}_{suffix}")
    }
}

fn extract_context_value(path: &str, group: &TaskGroup) -> Option<Value> {
    let mut parts = path.split('.');
    let key = parts.next()?;
    let mut current = group.get_context_value(key)?.clone();
    for part in parts {
        current = current.get(part)?.clone();
    }
    Some(current)
}
