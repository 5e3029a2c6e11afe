//! Secret handling for ROFL app deployments.
//!
//! Secrets supplied by the user are held in memory as [`SecretValue`]s,
//! protected by the `secrecy` and `zeroize` crates, and leave the process only
//! after being sealed to the application's [`SecretEncryptionKey`] (SEK).
//! Sealed secrets can be opened solely by the holder of the SEK's private
//! half, i.e. the application's enclaves.
//!
//! # Example
//!
//! ```rust,ignore
//! use rofl_secrets::{seal_all, SecretEncryptionKey, SecretValue, X25519Sealer};
//!
//! let sek = SecretEncryptionKey::from_base64(&record.sek)?;
//! let mut secrets = BTreeMap::new();
//! secrets.insert("API_KEY".to_owned(), SecretValue::new("sk_live_..."));
//!
//! // name -> base64(CBOR envelope), ready for the update transaction
//! let sealed = seal_all(&X25519Sealer, &secrets, &sek)?;
//! ```

#![forbid(unsafe_code)]

mod error;
mod seal;
mod types;

pub use error::{Redacted, SecretsError};
pub use seal::{open, seal_all, SealedSecret, SecretSealer, X25519Sealer, NONCE_LEN};
pub use types::{SecretEncryptionKey, SecretValue, KEY_LEN};
