use crate::client::ApiError;
use crate::identity::IdentityError;
use crate::planner::AttributeError;
use crate::roles::RoleError;
use crate::state::StateError;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Role(#[from] RoleError),
    #[error("invalid attribute: {0}")]
    InvalidAttribute(#[from] AttributeError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("no {kind} matching {query}")]
    NotFound { kind: &'static str, query: String },
    #[error("{kind} {id} is absent right after being written")]
    Vanished { kind: &'static str, id: String },
}

impl ReconcileError {
    /// The remote service reported the resource absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::Api(e) if e.is_not_found())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Api(ApiError::Cancelled))
    }
}
