//! Error type of the remote protocol.
//!
//! Transport and framing failures are kept apart from errors the remote
//! allocator reported, so callers can tell a broken connection from a
//! refused request.

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reading from or writing to the stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something the protocol does not allow, or the request
    /// cannot be framed.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// The remote allocator answered with an error string.
    #[error("Remote error: {message}")]
    Remote { message: String },

    /// The local allocator behind a server failed.
    #[error(transparent)]
    Allocator(#[from] grouphead::Error),
}

impl Error {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }
}

impl From<Error> for grouphead::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Allocator(e) => e,
            Error::Protocol { reason } => Self::invalid(reason),
            other => Self::backend(other.to_string()),
        }
    }
}
