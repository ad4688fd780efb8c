//! Reconciles declared Sentry organization objects with the live service.
//!
//! The pieces, bottom-up:
//! - [`identity`] turns composite identities into the durable keys kept in state and back.
//! - [`pagination`] and [`cursor`] walk cursor-paged list endpoints to exhaustion.
//! - [`planner`] computes the minimal update payload between a snapshot and an intent.
//! - [`roles`] orders organization and team roles and resolves the effective team role.
//!
//! [`resources`] and [`lifecycle`] put these together into create, read, update, delete and
//! import for every supported object, over the HTTP [`client`].

pub mod client;
pub mod config;
pub mod cursor;
pub mod data_sources;
pub mod errors;
pub mod identity;
pub mod lifecycle;
pub mod metrics_defs;
pub mod pagination;
pub mod planner;
pub mod resources;
pub mod roles;
pub mod state;

#[cfg(test)]
mod testutils;

pub use client::{ApiClient, ApiError, HttpTransport, Transport};
pub use config::ApiConfig;
pub use errors::ReconcileError;
pub use identity::{Identity, IdentityError};
pub use planner::{Patch, plan};
pub use roles::{Role, RoleError, RoleScope};
pub use state::{InstanceState, StateStore};
