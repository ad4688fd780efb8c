//! Persisted per-instance state: the durable key and the last server-confirmed snapshot.

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Storage owned by the caller for one resource instance.
pub trait StateStore: Send {
    /// Durable key, `None` while the resource is absent.
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn get(&self, attribute: &str) -> Option<&Value>;
    fn set(&mut self, attribute: &str, value: Value);
    fn attributes(&self) -> Map<String, Value>;
    /// Marks the resource absent and forgets its snapshot.
    fn remove(&mut self);
}

#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("no resource recorded in state")]
    MissingId,
    #[error("no attribute snapshot recorded for {0}")]
    MissingSnapshot(String),
    #[error("persisted snapshot of {id} cannot be decoded: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },
    #[error("snapshot cannot be encoded: {0}")]
    Encode(serde_json::Error),
    #[error("snapshot is not an attribute map")]
    NotAMap,
}

/// In-memory [`StateStore`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InstanceState {
    id: Option<String>,
    attributes: IndexMap<String, Value>,
}

impl InstanceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State as left by an import request: a key and nothing else.
    pub fn with_id(id: impl Into<String>) -> Self {
        InstanceState {
            id: Some(id.into()),
            attributes: IndexMap::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.id.is_some()
    }
}

impl StateStore for InstanceState {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    fn set(&mut self, attribute: &str, value: Value) {
        self.attributes.insert(attribute.to_string(), value);
    }

    fn attributes(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn remove(&mut self) {
        self.id = None;
        self.attributes.clear();
    }
}

/// Stores every attribute of `model`, replacing the previous snapshot.
pub fn write_snapshot<M: Serialize>(
    state: &mut dyn StateStore,
    model: &M,
) -> Result<(), StateError> {
    let Value::Object(attributes) = serde_json::to_value(model).map_err(StateError::Encode)?
    else {
        return Err(StateError::NotAMap);
    };
    for (attribute, value) in attributes {
        state.set(&attribute, value);
    }
    Ok(())
}

/// The last confirmed snapshot, or `None` when the resource is absent or has only a key.
pub fn read_snapshot<M: DeserializeOwned>(state: &dyn StateStore) -> Result<Option<M>, StateError> {
    let Some(id) = state.id() else {
        return Ok(None);
    };
    let attributes = state.attributes();
    if attributes.is_empty() {
        return Ok(None);
    }
    serde_json::from_value(Value::Object(attributes))
        .map(Some)
        .map_err(|source| StateError::Decode {
            id: id.to_string(),
            source,
        })
}
