use crate::keys::KeyError;
use crate::storage::StorageError;
use thiserror::Error;

/// Failures of the upload, gallery and deletion operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid caller-supplied fields
    #[error("{0}")]
    BadRequest(String),

    /// Key outside the managed namespace
    #[error("{0}")]
    Forbidden(String),

    /// Malformed or unresolvable image path
    #[error("{0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] StorageError),
}

impl Error {
    /// Machine-readable code used in error responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Backend(_) => "BACKEND_ERROR",
        }
    }

    /// Malformed image path
    pub(crate) fn not_found(err: KeyError) -> Self {
        Error::NotFound(format!("Image not found: {err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
