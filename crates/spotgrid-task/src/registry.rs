//! Process-wide function registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{TaskError, TaskResult};

/// A remotely-executable unit of work: takes the deserialized argument
/// map, returns a JSON-representable result.
///
/// Functions must tolerate at-least-once execution: a crash between
/// completion and acknowledgment redelivers the same arguments.
pub type TaskFn =
    Arc<dyn Fn(serde_json::Value) -> anyhow::Result<serde_json::Value> + Send + Sync>;

/// Name → callable mapping shared by the dispatching and executing
/// sides of a process.
///
/// An explicit context object rather than a global: constructed once at
/// process start and cloned into the dispatcher and worker. Clones
/// share the same map.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    inner: Arc<RwLock<HashMap<String, TaskFn>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the mapping for `name`. The last
    /// registration under a given name wins. Returns the callable
    /// unchanged, so registration composes as a pass-through wrapper.
    pub fn register<F>(&self, name: &str, func: F) -> TaskFn
    where
        F: Fn(serde_json::Value) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        let func: TaskFn = Arc::new(func);
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), func.clone());
        debug!(name, "function registered");
        func
    }

    /// Look up a callable by name.
    pub fn resolve(&self, name: &str) -> TaskResult<TaskFn> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| TaskError::NotRegistered(name.to_string()))
    }

    /// Registered names, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_returns_the_same_callable() {
        let registry = FunctionRegistry::new();
        let registered = registry.register("add", |args| {
            let a = args["a"].as_i64().unwrap_or(0);
            let b = args["b"].as_i64().unwrap_or(0);
            Ok(serde_json::json!(a + b))
        });

        let resolved = registry.resolve("add").unwrap();
        assert!(Arc::ptr_eq(&registered, &resolved));

        let result = resolved(serde_json::json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(result, serde_json::json!(3));
    }

    #[test]
    fn re_registration_replaces_the_prior_mapping() {
        let registry = FunctionRegistry::new();
        registry.register("f", |_| Ok(serde_json::json!("first")));
        registry.register("f", |_| Ok(serde_json::json!("second")));

        let resolved = registry.resolve("f").unwrap();
        assert_eq!(
            resolved(serde_json::json!({})).unwrap(),
            serde_json::json!("second")
        );
    }

    #[test]
    fn unregistered_name_is_an_error() {
        let registry = FunctionRegistry::new();
        assert!(matches!(
            registry.resolve("ghost"),
            Err(TaskError::NotRegistered(name)) if name == "ghost"
        ));
    }

    #[test]
    fn clones_share_the_map() {
        let registry = FunctionRegistry::new();
        let clone = registry.clone();
        registry.register("f", |_| Ok(serde_json::Value::Null));
        assert!(clone.resolve("f").is_ok());
        assert_eq!(clone.names(), vec!["f"]);
    }
}
