use std::error::Error as StdError;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to the user.
    ///
    /// Internal is never a guarantee that the user is not at fault, merely
    /// that the code cannot tell.
    Internal,

    /// The user provided invalid input or asked for something that cannot be
    /// done.
    User,
}

/// Classification callers branch on when deciding what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Empty passphrase, missing or unreadable input, wrong file suffix, or
    /// a refused overwrite.
    InvalidInput,
    /// Input is too short to hold a nonce and a tag; no cryptographic
    /// verification was attempted.
    MalformedContainer,
    /// Tag verification failed. Wrong passphrase and tampering are
    /// deliberately indistinguishable.
    AuthenticationFailure,
    /// Reading or writing a file or stream failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct GcmboxError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Specific failure kind, always provided.
    pub kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl GcmboxError {
    /// Creates a new error with a category, kind and display message.
    pub fn new(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that retains the originating source error.
    pub fn with_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind,
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::InvalidInput, msg)
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCategory::User, ErrorKind::MalformedContainer, msg)
    }

    pub fn authentication() -> Self {
        Self::new(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailure,
            "authentication failed: wrong passphrase, or corrupt or tampered-with data",
        )
    }

    /// Wraps an I/O error, attributing `NotFound` and `PermissionDenied` to
    /// the user.
    pub fn io(msg: impl Into<String>, err: io::Error) -> Self {
        let category = match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCategory::User,
            _ => ErrorCategory::Internal,
        };
        Self::with_source(category, ErrorKind::Io, msg, err)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving
    /// the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

pub(crate) fn read_error(path: &Path, err: io::Error) -> GcmboxError {
    GcmboxError::io(format!("failed to read from {}", path.display()), err)
}

pub(crate) fn write_error(path: &Path, err: io::Error) -> GcmboxError {
    GcmboxError::io(format!("failed to write to {}", path.display()), err)
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GcmboxError>;
