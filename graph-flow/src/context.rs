use dashmap::DashMap;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::error::{GraphError, Result};

/// Per-run state shared between the tasks of one graph execution.
///
/// Values are stored as JSON so they can be inspected and logged. Large
/// binary payloads that should not round-trip through JSON (document
/// buffers, decoded images) are stored as typed attachments instead.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    attachments: Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        self.set_sync(key, value)
    }

    pub fn set_sync(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| GraphError::ContextError(format!("cannot store '{}': {}", key, e)))?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    /// Synchronous read, usable from edge conditions.
    pub fn get_sync<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like `get`, but a missing or mistyped key is an error naming the key.
    pub async fn require<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_sync(key)
            .ok_or_else(|| GraphError::ContextError(format!("'{}' not found in context", key)))
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Store a typed value shared by reference. One attachment per type.
    pub fn attach<T: Any + Send + Sync>(&self, value: Arc<T>) {
        self.attachments.insert(TypeId::of::<T>(), value);
    }

    pub fn attachment<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.attachments
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    pub async fn clear(&self) {
        self.data.clear();
        self.attachments.clear();
    }
}
