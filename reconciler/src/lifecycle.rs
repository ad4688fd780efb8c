//! Create, read, update, delete and import for any [`ResourceKind`].
//!
//! The snapshot in state is always server truth: create and update finish with a read, and
//! a read replaces the snapshot wholesale. Updates are planned against that snapshot, so an
//! unchanged intent never reaches the server.

use crate::client::ApiClient;
use crate::errors::ReconcileError;
use crate::identity::Identity;
use crate::metrics_defs::{PATCH_FIELDS, RECONCILE_OPERATIONS};
use crate::planner::{plan, validate_intent};
use crate::resources::ResourceKind;
use crate::state::{StateError, StateStore, read_snapshot, write_snapshot};
use shared::{counter, histogram};

fn record<K: ResourceKind>(operation: &'static str) {
    counter!(RECONCILE_OPERATIONS, "kind" => K::TYPE_NAME, "operation" => operation).increment(1);
}

fn validate<K: ResourceKind>(kind: &K, intent: &K::Model) -> Result<(), ReconcileError> {
    validate_intent(&kind.fields(), intent)?;
    kind.validate(intent)
}

fn current_id<K: ResourceKind>(state: &dyn StateStore) -> Result<Option<Identity>, ReconcileError> {
    match state.id() {
        Some(key) => Ok(Some(Identity::parse(key, K::ID_LABELS)?)),
        None => Ok(None),
    }
}

/// Reads back a resource that was just written. Absence at this point is an error.
async fn refresh<K: ResourceKind>(
    kind: &K,
    client: &ApiClient,
    state: &mut dyn StateStore,
    id: &Identity,
    intent: &K::Model,
) -> Result<(), ReconcileError> {
    match kind.fetch(client, id, Some(intent)).await {
        Ok(model) => {
            write_snapshot(state, &model)?;
            Ok(())
        }
        Err(e) if e.is_not_found() => Err(ReconcileError::Vanished {
            kind: K::TYPE_NAME,
            id: id.key(),
        }),
        Err(e) => Err(e),
    }
}

pub async fn create<K: ResourceKind>(
    kind: &K,
    client: &ApiClient,
    state: &mut dyn StateStore,
    intent: &K::Model,
) -> Result<(), ReconcileError> {
    validate(kind, intent)?;
    record::<K>("create");

    let id = kind.create(client, intent).await?;
    tracing::debug!(kind = K::TYPE_NAME, id = %id, "Created resource");
    state.set_id(id.key());

    refresh(kind, client, state, &id, intent).await
}

/// Refreshes the snapshot. A resource the server no longer knows is removed from state and
/// the read still succeeds.
pub async fn read<K: ResourceKind>(
    kind: &K,
    client: &ApiClient,
    state: &mut dyn StateStore,
) -> Result<(), ReconcileError> {
    let Some(id) = current_id::<K>(state)? else {
        return Ok(());
    };
    record::<K>("read");

    // The prior only shapes the response, so a snapshot that no longer decodes is dropped.
    let prior: Option<K::Model> = match read_snapshot(state) {
        Ok(prior) => prior,
        Err(e) => {
            tracing::warn!(
                kind = K::TYPE_NAME,
                id = %id,
                error = %e,
                "Ignoring undecodable snapshot"
            );
            None
        }
    };
    match kind.fetch(client, &id, prior.as_ref()).await {
        Ok(model) => {
            write_snapshot(state, &model)?;
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            tracing::info!(
                kind = K::TYPE_NAME,
                id = %id,
                "Removing resource from state because it no longer exists"
            );
            state.remove();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub async fn update<K: ResourceKind>(
    kind: &K,
    client: &ApiClient,
    state: &mut dyn StateStore,
    intent: &K::Model,
) -> Result<(), ReconcileError> {
    let id = current_id::<K>(state)?.ok_or(StateError::MissingId)?;
    validate(kind, intent)?;

    let snapshot: K::Model =
        read_snapshot(state)?.ok_or_else(|| StateError::MissingSnapshot(id.key()))?;
    let patch = plan(&kind.fields(), &snapshot, intent);

    let id = if patch.is_empty() {
        tracing::debug!(kind = K::TYPE_NAME, id = %id, "No attribute changes");
        id
    } else {
        record::<K>("update");
        histogram!(PATCH_FIELDS).record(patch.len() as f64);
        tracing::debug!(
            kind = K::TYPE_NAME,
            id = %id,
            changed = ?patch.attributes(),
            "Updating resource"
        );

        let new_id = kind.submit(client, &id, intent, &patch).await?;
        if new_id != id {
            tracing::debug!(kind = K::TYPE_NAME, from = %id, to = %new_id, "Identity changed");
            state.set_id(new_id.key());
        }
        new_id
    };

    refresh(kind, client, state, &id, intent).await
}

/// Deletes the resource. One that is already gone counts as deleted.
pub async fn delete<K: ResourceKind>(
    kind: &K,
    client: &ApiClient,
    state: &mut dyn StateStore,
) -> Result<(), ReconcileError> {
    let Some(id) = current_id::<K>(state)? else {
        return Ok(());
    };
    record::<K>("delete");

    match kind.destroy(client, &id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            tracing::info!(kind = K::TYPE_NAME, id = %id, "Resource already deleted");
        }
        Err(e) => return Err(e),
    }
    state.remove();
    Ok(())
}

/// Adopts an existing resource by its key. The key is decoded before anything is fetched.
pub async fn import<K: ResourceKind>(
    kind: &K,
    client: &ApiClient,
    state: &mut dyn StateStore,
    key: &str,
) -> Result<(), ReconcileError> {
    let id = Identity::parse(key, K::ID_LABELS)?;
    record::<K>("import");

    match kind.fetch(client, &id, None).await {
        Ok(model) => {
            state.set_id(id.key());
            write_snapshot(state, &model)?;
            Ok(())
        }
        Err(e) if e.is_not_found() => Err(ReconcileError::NotFound {
            kind: K::TYPE_NAME,
            query: id.key(),
        }),
        Err(e) => Err(e),
    }
}
