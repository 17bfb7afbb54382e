//! Callable registry: the set of named functions a [`crate::executor`]
//! can dispatch a `Task` to.
//!
//! An explicit registry of boxed async closures, populated once at
//! startup; each registration supplies the descriptor `/api/functions`
//! reports. `http_request` is a reserved name that always resolves to the
//! built-in HTTP action (`crate::http_action`) rather than a registry
//! entry; [`CallableRegistry::list`] still reports its fixed descriptor so
//! `/api/functions` sees it.

use scheduler_core::{CallableInfo, ParameterInfo};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type CallableFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// A registered function a task can invoke, taking its resolved arguments
/// and returning either a JSON result or an error message.
pub trait Callable: Send + Sync {
    fn call(&self, args: HashMap<String, Value>) -> CallableFuture;
    fn description(&self) -> Option<&str> {
        None
    }
    fn parameters(&self) -> Vec<ParameterInfo> {
        Vec::new()
    }
}

struct Described<F> {
    func: F,
    description: &'static str,
    parameters: Vec<ParameterInfo>,
}

impl<F, Fut> Callable for Described<F>
where
    F: Fn(HashMap<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    fn call(&self, args: HashMap<String, Value>) -> CallableFuture {
        Box::pin((self.func)(args))
    }

    fn description(&self) -> Option<&str> {
        Some(self.description)
    }

    fn parameters(&self) -> Vec<ParameterInfo> {
        self.parameters.clone()
    }
}

#[derive(Clone, Default)]
pub struct CallableRegistry {
    callables: HashMap<String, Arc<dyn Callable>>,
}

/// `http_request`'s fixed descriptor:
/// `{url, method=GET, headers={}, body=none, timeout=30, verify=true}`.
pub const HTTP_REQUEST: &str = "http_request";

fn http_request_descriptor() -> CallableInfo {
    CallableInfo {
        name: HTTP_REQUEST.to_string(),
        description: Some("Issues an outbound HTTP request".to_string()),
        parameters: vec![
            ParameterInfo::required("url"),
            ParameterInfo::with_default("method", json!("GET")),
            ParameterInfo::with_default("headers", json!({})),
            ParameterInfo::with_default("body", Value::Null),
            ParameterInfo::with_default("timeout", json!(30)),
            ParameterInfo::with_default("verify", json!(true)),
        ],
    }
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_described(
        &mut self,
        name: impl Into<String>,
        description: &'static str,
        parameters: Vec<ParameterInfo>,
        func: impl Fn(HashMap<String, Value>) -> CallableFuture + Send + Sync + 'static,
    ) {
        self.callables.insert(
            name.into(),
            Arc::new(Described {
                func,
                description,
                parameters,
            }),
        );
    }

    /// Looks up a registered callable. `http_request` never resolves here -
    /// callers must special-case it to dispatch to `crate::http_action`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Callable>> {
        self.callables.get(name).cloned()
    }

    pub fn list(&self) -> Vec<CallableInfo> {
        let mut infos: Vec<CallableInfo> = self
            .callables
            .iter()
            .map(|(name, callable)| CallableInfo {
                name: name.clone(),
                description: callable.description().map(str::to_string),
                parameters: callable.parameters(),
            })
            .collect();
        infos.push(http_request_descriptor());
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

/// Registers the demo callables shipped alongside the built-in
/// `http_request` action so the service is runnable out of the box.
pub fn register_demo_callables(registry: &mut CallableRegistry) {
    registry.register_described(
        "hello_world",
        "Prints a greeting",
        vec![ParameterInfo::with_default("name", json!("world"))],
        |args| {
            Box::pin(async move {
                let name = args
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("world")
                    .to_string();
                Ok(Value::String(format!("Hello, {name}!")))
            })
        },
    );

    registry.register_described(
        "random_number",
        "Generates a pseudo-random number in a range",
        vec![
            ParameterInfo::with_default("min_val", json!(1)),
            ParameterInfo::with_default("max_val", json!(100)),
        ],
        |args| {
            Box::pin(async move {
                let min = args.get("min_val").and_then(|v| v.as_i64()).unwrap_or(1);
                let max = args.get("max_val").and_then(|v| v.as_i64()).unwrap_or(100);
                if min > max {
                    return Err(format!("min_val ({min}) must not exceed max_val ({max})"));
                }
                let span = (max - min + 1) as u64;
                let pick = min + (pseudo_random_u64() % span.max(1)) as i64;
                Ok(Value::from(pick))
            })
        },
    );

    registry.register_described(
        "echo",
        "Returns its arguments unchanged",
        Vec::new(),
        |args| Box::pin(async move { Ok(Value::Object(args.into_iter().collect())) }),
    );

    registry.register_described(
        "fail",
        "Always fails, for testing error propagation",
        vec![ParameterInfo::with_default(
            "message",
            json!("intentional failure"),
        )],
        |args| {
            Box::pin(async move {
                let message = args
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("intentional failure")
                    .to_string();
                Err(message)
            })
        },
    );
}

/// A small linear-congruential generator so `random_number` doesn't need a
/// `rand` dependency for a demo callable with no security relevance.
fn pseudo_random_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    seed.wrapping_mul(6364136223846793005).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hello_world_greets_by_name() {
        let mut registry = CallableRegistry::new();
        register_demo_callables(&mut registry);
        let callable = registry.get("hello_world").unwrap();
        let mut args = HashMap::new();
        args.insert("name".to_string(), Value::String("Ferris".to_string()));
        let result = callable.call(args).await.unwrap();
        assert_eq!(result, Value::String("Hello, Ferris!".to_string()));
    }

    #[tokio::test]
    async fn fail_propagates_its_message() {
        let mut registry = CallableRegistry::new();
        register_demo_callables(&mut registry);
        let callable = registry.get("fail").unwrap();
        let err = callable.call(HashMap::new()).await.unwrap_err();
        assert_eq!(err, "intentional failure");
    }

    #[test]
    fn list_is_sorted_and_describes_entries() {
        let mut registry = CallableRegistry::new();
        register_demo_callables(&mut registry);
        let names: Vec<String> = registry.list().into_iter().map(|c| c.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(registry.list().iter().all(|c| c.description.is_some()));
    }

    #[test]
    fn http_request_is_listed_but_not_gettable() {
        let registry = CallableRegistry::new();
        assert!(registry.get(HTTP_REQUEST).is_none());
        assert!(registry.list().iter().any(|c| c.name == HTTP_REQUEST));
    }

    #[test]
    fn unknown_callable_is_none() {
        let registry = CallableRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
