//! `ExecutionVariables` (§3): string-keyed scalars used for control
//! variables (loop indices exposed via `expose_index_as`, condition
//! results, sub-diagram batch indices). Lifetime is the whole execution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct ExecutionVariables {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl ExecutionVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial(inputs: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(inputs)),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.write().unwrap().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().unwrap().get(key).cloned()
    }

    pub fn all(&self) -> HashMap<String, Value> {
        self.inner.read().unwrap().clone()
    }
}
