//! Error types for secret handling.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while handling or sealing secrets.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The secret-encryption key could not be parsed.
    #[error("invalid secret-encryption key: {0}")]
    InvalidKey(String),

    /// A secret name is empty or looks like a pasted `NAME=value` pair.
    ///
    /// The rejected name is kept redacted since it may carry the value.
    #[error("invalid secret name: {0}")]
    InvalidName(Redacted<String>),

    /// Encryption error.
    #[error("encryption error")]
    Encryption(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Decryption error.
    #[error("decryption error")]
    Decryption(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The sealed envelope could not be encoded or decoded.
    #[error("envelope encoding error: {0}")]
    Encoding(String),
}

impl SecretsError {
    pub(crate) fn encryption(e: impl fmt::Display) -> Self {
        Self::Encryption(e.to_string().into())
    }

    pub(crate) fn decryption(e: impl fmt::Display) -> Self {
        Self::Decryption(e.to_string().into())
    }
}

/// Error context that prints as `[REDACTED]`.
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    /// Wrap a value.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// The wrapped value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
