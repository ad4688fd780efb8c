//! One [`ResourceKind`] per remote resource type.
//!
//! A kind knows its identity shape, its update table and the four remote calls. Everything
//! around those calls (state bookkeeping, planning, absent-resource handling) lives in
//! [`crate::lifecycle`].

use crate::client::{ApiClient, ApiError};
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::planner::{Field, Patch};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;

pub mod client_key;
pub mod metric_alert;
pub mod organization;
pub mod organization_member;
pub mod project;
pub mod team;
pub mod team_member;
pub mod uptime_monitor;

pub use client_key::ClientKey;
pub use metric_alert::MetricAlert;
pub use organization::Organization;
pub use organization_member::OrganizationMember;
pub use project::Project;
pub use team::Team;
pub use team_member::TeamMember;
pub use uptime_monitor::UptimeMonitor;

#[async_trait]
pub trait ResourceKind: Send + Sync {
    /// Attribute snapshot, as persisted in state and as declared by the caller.
    type Model: Serialize + DeserializeOwned + Clone + Debug + Send + Sync;

    const TYPE_NAME: &'static str;
    /// Labels of the identity parts, in key order.
    const ID_LABELS: &'static [&'static str];

    /// Attributes that can change in place.
    fn fields(&self) -> Vec<Field<Self::Model>>;

    /// Checks beyond required/computed, such as role vocabularies.
    fn validate(&self, _intent: &Self::Model) -> Result<(), ReconcileError> {
        Ok(())
    }

    /// Creates the resource and returns its server-assigned identity.
    async fn create(
        &self,
        client: &ApiClient,
        intent: &Self::Model,
    ) -> Result<Identity, ReconcileError>;

    /// Reads the current server state. `prior` is the last snapshot (or the intent just
    /// written), for attributes the server never returns.
    async fn fetch(
        &self,
        client: &ApiClient,
        id: &Identity,
        prior: Option<&Self::Model>,
    ) -> Result<Self::Model, ReconcileError>;

    /// Sends a non-empty patch. Returns the identity afterwards, which differs from `id` when
    /// the patch renamed a slug that is part of it.
    async fn submit(
        &self,
        client: &ApiClient,
        id: &Identity,
        intent: &Self::Model,
        patch: &Patch,
    ) -> Result<Identity, ReconcileError>;

    async fn destroy(&self, client: &ApiClient, id: &Identity) -> Result<(), ReconcileError>;
}

/// IDs arrive as strings from most endpoints and as numbers from a few.
pub(crate) fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Deletes an object whose create call succeeded but whose follow-up write failed, then
/// hands back the write error. The caller never learns the identity, so nothing else would
/// clean it up.
pub(crate) async fn roll_back(client: &ApiClient, path: &str, err: ApiError) -> ReconcileError {
    tracing::warn!(path, error = %err, "Follow-up write failed, deleting new object");
    if let Err(e) = client.delete(path).await {
        tracing::error!(path, error = %e, "Could not delete partially created object");
    }
    err.into()
}
