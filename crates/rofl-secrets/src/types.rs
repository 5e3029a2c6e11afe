//! Core types for secret handling.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SecretsError;

/// A secret value with automatic memory zeroisation.
///
/// The value is stored as a `SecretString` which prevents accidental logging
/// and ensures memory is zeroed when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    #[zeroize(skip)]
    inner: SecretString,
}

impl SecretValue {
    /// Creates a new secret value from a string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: SecretString::from(value.into()),
        }
    }

    /// Creates a new secret value from bytes (UTF-8 encoded).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, std::str::Utf8Error> {
        let s = std::str::from_utf8(bytes)?;
        Ok(Self::new(s))
    }

    /// Exposes the secret value for use.
    ///
    /// The returned reference should not be logged, stored, or otherwise
    /// exposed.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.inner.expose_secret()
    }

    /// Returns the length of the secret value in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns true if the secret value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    /// Constant-time comparison to prevent timing attacks.
    fn eq(&self, other: &Self) -> bool {
        let self_bytes = self.inner.expose_secret().as_bytes();
        let other_bytes = other.inner.expose_secret().as_bytes();

        if self_bytes.len() != other_bytes.len() {
            return false;
        }

        self_bytes.ct_eq(other_bytes).into()
    }
}

impl Eq for SecretValue {}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Length of an X25519 public key.
pub const KEY_LEN: usize = 32;

/// An application's secret-encryption key (SEK).
///
/// This is the X25519 public key published in the on-chain application
/// record. Secrets sealed to it can only be opened inside the application's
/// enclaves.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretEncryptionKey([u8; KEY_LEN]);

impl SecretEncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SecretsError> {
        let raw: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            SecretsError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", bytes.len()))
        })?;
        Ok(Self(raw))
    }

    /// Parse a base64-encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretsError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SecretsError::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Return the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Return the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl fmt::Debug for SecretEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretEncryptionKey({})", self.to_base64())
    }
}

impl fmt::Display for SecretEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for SecretEncryptionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for SecretEncryptionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn secret_value_is_redacted() {
        let value = SecretValue::new("sk_live_123");
        assert_eq!(format!("{value:?}"), "[REDACTED]");
        assert_eq!(value.expose(), "sk_live_123");
        assert_eq!(value.len(), 11);
        assert!(!value.is_empty());
    }

    #[test]
    fn secret_value_equality() {
        assert_eq!(SecretValue::new("a"), SecretValue::new("a"));
        assert_ne!(SecretValue::new("a"), SecretValue::new("b"));
        assert_ne!(SecretValue::new("a"), SecretValue::new("aa"));
    }

    #[test]
    fn secret_value_deserializes_from_string() {
        let value: SecretValue = serde_json::from_str(r#""token""#).unwrap();
        assert_eq!(value.expose(), "token");
    }

    #[test]
    fn sek_base64_roundtrip() {
        let key = SecretEncryptionKey::from_bytes([7u8; KEY_LEN]);
        let parsed = SecretEncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, parsed);
    }

    #[rstest]
    #[case::too_short(3)]
    #[case::one_short(KEY_LEN - 1)]
    #[case::one_long(KEY_LEN + 1)]
    #[case::empty(0)]
    fn sek_rejects_wrong_length(#[case] len: usize) {
        let err = SecretEncryptionKey::from_base64(&STANDARD.encode(vec![0u8; len])).unwrap_err();
        assert!(matches!(err, SecretsError::InvalidKey(_)));
    }

    #[test]
    fn sek_rejects_invalid_base64() {
        let err = SecretEncryptionKey::from_base64("not base64!").unwrap_err();
        assert!(matches!(err, SecretsError::InvalidKey(_)));
    }

    #[test]
    fn sek_deserializes_from_json_string() {
        let encoded = format!(r#""{}""#, STANDARD.encode([1u8; KEY_LEN]));
        let key: SecretEncryptionKey = serde_json::from_str(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[1u8; KEY_LEN]);
    }
}
