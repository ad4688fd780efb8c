//! Minimal update payloads.
//!
//! Every resource kind declares a table of [`Field`]s: which attribute it is, the name the
//! API uses for it, how the caller may set it and how two values of it compare. [`plan`]
//! walks that table against the last-read snapshot and the desired intent and emits only
//! the attributes that changed. Anything left out of the patch is never sent, so the server
//! keeps its own value for it.
//!
//! Attributes that form the identity or can only be set on create are not listed in the
//! update table; changing them means replacing the resource.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// How the caller may set an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeMode {
    /// Must be supplied.
    Required,
    /// May be absent. Absence is meaningful: an unset value replaces a set one with null.
    Optional,
    /// May be set by the caller; when unset, the server default stands.
    OptionalComputed,
    /// Server-assigned. Never sent.
    Computed,
}

/// How two values of an attribute are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Equality {
    Scalar,
    /// Unordered collection; order and repetition are ignored.
    Set,
    /// Ordered collection, replaced wholesale when any element differs.
    Sequence,
}

impl Equality {
    pub fn equal(&self, a: &Value, b: &Value) -> bool {
        match (self, a, b) {
            (Equality::Set, Value::Array(a), Value::Array(b)) => {
                a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v))
            }
            _ => a == b,
        }
    }
}

/// One row of a resource's update table.
pub struct Field<M> {
    /// Attribute name in the persisted snapshot.
    pub attribute: &'static str,
    /// Key used in the update payload.
    pub api_name: &'static str,
    pub mode: AttributeMode,
    pub equality: Equality,
    /// Renders the attribute of a model the way the API expects it.
    pub value: fn(&M) -> Value,
}

impl<M> Field<M> {
    pub fn has_change(&self, snapshot: &M, intent: &M) -> bool {
        let desired = (self.value)(intent);
        match self.mode {
            AttributeMode::Computed => false,
            AttributeMode::OptionalComputed if desired.is_null() => false,
            _ => !self.equality.equal(&(self.value)(snapshot), &desired),
        }
    }
}

/// Declares a [`Field`] reading `model.attribute` through serde.
///
/// `field!(TeamModel, Required, Scalar, name => "name")`, or with a custom renderer as a
/// trailing `|m: &Model| ...` closure.
macro_rules! field {
    ($model:ty, $mode:ident, $eq:ident, $attr:ident => $api:literal) => {
        $crate::planner::Field::<$model> {
            attribute: stringify!($attr),
            api_name: $api,
            mode: $crate::planner::AttributeMode::$mode,
            equality: $crate::planner::Equality::$eq,
            value: |m: &$model| serde_json::json!(m.$attr),
        }
    };
    ($model:ty, $mode:ident, $eq:ident, $attr:ident => $api:literal, $value:expr) => {
        $crate::planner::Field::<$model> {
            attribute: stringify!($attr),
            api_name: $api,
            mode: $crate::planner::AttributeMode::$mode,
            equality: $crate::planner::Equality::$eq,
            value: $value,
        }
    };
}

pub(crate) use field;

/// Sparse update payload. Only changed attributes are present; a present null is an
/// explicit request to clear the value.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Patch {
    values: IndexMap<&'static str, Value>,
    attributes: Vec<&'static str>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, api_name: &str) -> Option<&Value> {
        self.values.get(api_name)
    }

    pub fn contains(&self, api_name: &str) -> bool {
        self.values.contains_key(api_name)
    }

    /// Snapshot names of the changed attributes, in table order.
    pub fn attributes(&self) -> &[&'static str] {
        &self.attributes
    }

    /// Adds a value the table does not cover, e.g. a field the API requires on every update.
    pub fn insert(&mut self, api_name: &'static str, value: Value) {
        self.values.insert(api_name, value);
    }

    fn push<M>(&mut self, field: &Field<M>, value: Value) {
        self.values.insert(field.api_name, value);
        self.attributes.push(field.attribute);
    }
}

impl Serialize for Patch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

/// Computes the minimal patch taking `snapshot` to `intent`. An empty patch means no update
/// call should be made.
pub fn plan<M>(fields: &[Field<M>], snapshot: &M, intent: &M) -> Patch {
    let mut patch = Patch::default();
    for field in fields {
        if field.has_change(snapshot, intent) {
            patch.push(field, (field.value)(intent));
        }
    }
    patch
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AttributeError {
    #[error("attribute {0} is required")]
    Required(&'static str),
    #[error("attribute {0} is computed by the server and cannot be set")]
    Computed(&'static str),
    #[error("attribute {attribute}: {reason}")]
    Invalid {
        attribute: &'static str,
        reason: String,
    },
}

/// Checks that required attributes are set and computed ones are not.
pub fn validate_intent<M>(fields: &[Field<M>], intent: &M) -> Result<(), AttributeError> {
    for field in fields {
        let value = (field.value)(intent);
        match field.mode {
            AttributeMode::Required if value.is_null() => {
                return Err(AttributeError::Required(field.attribute));
            }
            AttributeMode::Computed if !value.is_null() => {
                return Err(AttributeError::Computed(field.attribute));
            }
            _ => {}
        }
    }
    Ok(())
}
