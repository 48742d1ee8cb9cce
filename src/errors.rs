/// Failures raised by storage drivers and the storage factory.
///
/// Drivers return these wrapped in an [`anyhow::Error`]; callers that need to
/// recognise a specific failure downcast with [`StorageError::from_anyhow`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing medium cannot be used in this context (blocked cookies,
    /// unopenable database, no usable driver).
    #[error("No available storage method found: {0}")]
    NoStorageAvailable(String),

    #[error("Malformed value stored under key {key:?}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required storage config field: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("Unknown storage driver: {0}")]
    UnknownDriver(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True for the failure signature that permission lookups treat as
    /// "nothing stored yet".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::NoStorageAvailable(_))
    }

    /// Returns the storage error carried by `err`, if any.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&StorageError> {
        err.downcast_ref::<StorageError>()
    }
}

/// Errors surfaced by the permission manager, handler registry and container.
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    #[error("Permission denied: {0}")]
    NotAllowed(String),

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Work attached to an unregister notification failed; nothing was removed.
    #[error("Unregister listener failed")]
    Unregister(#[source] anyhow::Error),

    /// The consent function failed before producing a status.
    #[error("Consent request failed")]
    Consent(#[source] anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl MediatorError {
    /// True when the error wraps the constrained-storage failure signature.
    pub fn is_storage_unavailable(&self) -> bool {
        match self {
            MediatorError::Storage(err) => StorageError::from_anyhow(err).is_some_and(StorageError::is_unavailable),
            _ => false,
        }
    }
}

impl From<StorageError> for MediatorError {
    fn from(err: StorageError) -> Self {
        MediatorError::Storage(err.into())
    }
}
