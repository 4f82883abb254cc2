use std::time::Duration;

use patchwork_proto::{DecodeError, Uid};
use thiserror::Error;

use crate::registry::ModelType;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("alias '{0}' is already registered")]
    DuplicateAlias(String),

    #[error("{0} already has an alias")]
    DuplicateType(ModelType),

    #[error("invalid alias '{0}': aliases must be non-empty and must not contain ':'")]
    InvalidAlias(String),
}

/// Failure to build a patch set from a tracked graph.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("no alias registered for {0}")]
    UnregisteredType(ModelType),

    #[error("aggregate cycle through {model} {uid}")]
    Cycle { model: ModelType, uid: Uid },

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{model} does not serialize to a JSON object")]
    NotAnObject { model: &'static str },

    #[error("{model} has no property '{property}'")]
    UnknownProperty { model: &'static str, property: String },

    #[error("mapping onto {model} {expected} changed its uid to {given}")]
    IdentityChanged { model: &'static str, expected: Uid, given: Uid },

    #[error("failed to map onto {model}: {source}")]
    Json {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("aggregate of {expected} cannot hold a {given}")]
    MemberType { expected: &'static str, given: ModelType },
}

/// Errors surfaced by a [`crate::repository::PatchRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{model} {uid} not found")]
    NotFound { model: String, uid: Uid },

    #[error("{model} {uid} already exists")]
    AlreadyExists { model: String, uid: Uid },

    /// No typed handler was registered for the runtime type. A configuration error, not a data error.
    #[error("no repository handler registered for {0}")]
    Unregistered(ModelType),

    #[error("entity handle holds a {given}, expected {expected}")]
    HandleMismatch { expected: &'static str, given: ModelType },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("serialization error: {0}")]
    SerializationError(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("backend error: {0}")]
    BackendError(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl RepositoryError {
    pub fn not_found(model: impl Into<String>, uid: &Uid) -> Self { RepositoryError::NotFound { model: model.into(), uid: uid.clone() } }

    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self { RepositoryError::BackendError(Box::new(err)) }
}

/// Error type for [`crate::resolver::PatchResolver::apply`].
///
/// Repository failures pass through untouched in the `Repository` variant.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("unknown model alias '{0}'")]
    UnknownModel(String),

    #[error("{model} {uid} not found")]
    NotFound { model: String, uid: Uid },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("aggregate accessor for {model}.{property} does not match the retrieved entity")]
    SchemaMismatch { model: ModelType, property: String },

    #[error("patch batch rejected: {0}")]
    Rejected(String),

    #[error("patch batch timed out after {0:?}")]
    Timeout(Duration),
}

impl ApplyError {
    /// True for every flavor of "the thing a patch refers to does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApplyError::UnknownModel(_) | ApplyError::NotFound { .. } | ApplyError::Repository(RepositoryError::NotFound { .. }))
    }
}
