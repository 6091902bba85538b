//! Error types shared by every allocator, store and orchestrator in this
//! crate.
//!
//! Errors are `Clone` so a single backend failure can be fanned out to every
//! waiter of a dispatcher batch.

use bytes::Bytes;

/// A result type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `grouphead` can emit.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A backing store (table, counter, row store) failed or timed out.
    #[error("Backend error: {context}")]
    Backend { context: String },

    /// A persisted record could not be encoded or decoded.
    #[error("Codec error: {context}")]
    Codec { context: String },

    /// The caller violated an input contract (duplicate groups, length
    /// mismatch, oversized batch).
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The group is unknown to the store that was asked about it.
    #[error("No such group: {group}")]
    NoSuchGroup { group: String },

    /// A bulk allocator answered without error but handed out no ids.
    #[error("Bulk allocator returned no ids for group {group}")]
    Exhausted { group: String },

    /// Internal channel send/receive failure between a caller and a worker.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The component is shutting down and refuses new work.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    /// Shorthand for [`Error::Backend`].
    pub fn backend(context: impl Into<String>) -> Self {
        Self::Backend {
            context: context.into(),
        }
    }

    /// Shorthand for [`Error::InvalidRequest`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub(crate) fn no_such_group(group: &[u8]) -> Self {
        Self::NoSuchGroup {
            group: String::from_utf8_lossy(group).into_owned(),
        }
    }

    pub(crate) fn exhausted(group: &[u8]) -> Self {
        Self::Exhausted {
            group: String::from_utf8_lossy(group).into_owned(),
        }
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec {
            context: err.to_string(),
        }
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec {
            context: err.to_string(),
        }
    }
}

/// Rejects a group list containing the same name twice.
///
/// Allocators lock one slot per group; a repeated name would deadlock on its
/// own lock.
pub(crate) fn ensure_distinct(groups: &[Bytes]) -> Result<()> {
    for (i, group) in groups.iter().enumerate() {
        if groups[..i].contains(group) {
            return Err(Error::invalid(format!(
                "duplicate group {:?}",
                String::from_utf8_lossy(group)
            )));
        }
    }
    Ok(())
}
