//! Error types for the parameter registry.
//!
//! Two families are kept apart:
//!
//! - [`Error`]: structural / configuration errors. The registry cannot be
//!   partially repaired after one of these, so they are returned at the point
//!   where they occur (duplicate names, alias collisions, originators without
//!   any naming context, ...).
//! - [`AccessError`]: every access-control or value-level failure (locked
//!   parameters, wrong tokens, vetoed writes, malformed value text). These are
//!   recoverable: the caller inspects the reason and may retry.

use crate::callback::ObserverId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("parameter '{0}' is already registered")]
    DuplicateParam(String),

    #[error("parameter '{0}' is not the registered object for that name")]
    NotRegistered(String),

    #[error("alias '{alias}' collides with an existing parameter")]
    AliasCollision { alias: String },

    #[error("alias '{0}' cannot point to itself")]
    SelfAlias(String),

    #[error("an originator needs an object path or a non-empty name")]
    MissingOriginator,

    #[error("parameter name is empty")]
    EmptyName,

    #[error("observer {observer} already has a {callback_type} callback on '{target}'")]
    DuplicateCallback {
        observer: ObserverId,
        callback_type: crate::callback::CallbackType,
        target: String,
    },

    #[error("{0} callbacks cannot be registered on a single parameter")]
    UnsupportedCallback(crate::callback::CallbackType),

    #[error("parameter '{0}' already exists, init value cannot take priority")]
    ParamExists(String),

    #[error("invalid init value override '{0}': expected 'name=value'")]
    InvalidOverride(String),

    #[error("failed to parse init value for '{name}': {reason}")]
    InvalidInitValue { name: String, reason: String },

    #[error("broker already registered for context '{0}'")]
    ContextTaken(String),

    #[error("context '{context}' already has parameters in broker '{broker}'")]
    ContextInUse { context: String, broker: String },
}

/// Failure of a read, write, lock or unlock on a single parameter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("parameter is locked")]
    Locked,

    #[error("parameter is already locked")]
    AlreadyLocked,

    #[error("parameter is not locked")]
    NotLocked,

    #[error("lock token does not match")]
    WrongToken,

    #[error("parameter is immutable")]
    Immutable,

    #[error("parameter only accepts writes during elaboration")]
    ElaborationClosed,

    #[error("value change rejected by {observers:?}")]
    Rejected { observers: Vec<ObserverId> },

    #[error("cannot unpack value: {reason}")]
    Unpack { reason: String },

    #[error("value {value} has no canonical text")]
    NotRepresentable { value: String },

    #[error("type mismatch, expected {expected} but parameter holds {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("parameter has been destroyed")]
    Destroyed,
}

impl From<serde_json::Error> for AccessError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unpack {
            reason: e.to_string(),
        }
    }
}
