//! Sealing secrets to an application's secret-encryption key.
//!
//! Every secret is sealed independently. A fresh X25519 key pair is generated
//! per secret and agreed with the SEK; the shared secret is expanded into one
//! AES-256-GCM key for the name and one for the value, so both can safely use
//! the same nonce. The envelope is CBOR-encoded:
//!
//! ```text
//! { "pk": bstr(32), "nonce": bstr(12), "name": bstr, "value": bstr }
//! ```
//!
//! and travels base64-encoded in the update transaction's `secrets` map,
//! keyed by the plaintext secret name.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ciborium::Value;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::{Redacted, SecretsError};
use crate::types::{SecretEncryptionKey, SecretValue, KEY_LEN};

type HmacSha256 = Hmac<Sha256>;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

const NAME_LABEL: &[u8] = b"rofl-secret-name";
const VALUE_LABEL: &[u8] = b"rofl-secret-value";

/// A secret sealed to a secret-encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    /// Ephemeral public key of the sender.
    pub pk: [u8; KEY_LEN],
    /// Nonce shared by both ciphertexts.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted secret name.
    pub name: Vec<u8>,
    /// Encrypted secret value.
    pub value: Vec<u8>,
}

impl SealedSecret {
    /// Encode the envelope as CBOR.
    pub fn to_cbor(&self) -> Result<Vec<u8>, SecretsError> {
        let envelope = Value::Map(vec![
            (Value::Text("pk".to_owned()), Value::Bytes(self.pk.to_vec())),
            (
                Value::Text("nonce".to_owned()),
                Value::Bytes(self.nonce.to_vec()),
            ),
            (Value::Text("name".to_owned()), Value::Bytes(self.name.clone())),
            (
                Value::Text("value".to_owned()),
                Value::Bytes(self.value.clone()),
            ),
        ]);

        let mut buf = Vec::new();
        ciborium::into_writer(&envelope, &mut buf)
            .map_err(|e| SecretsError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// Decode an envelope from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, SecretsError> {
        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| SecretsError::Encoding(e.to_string()))?;

        let Value::Map(entries) = value else {
            return Err(SecretsError::Encoding("envelope is not a map".to_owned()));
        };

        let field = |key: &str| -> Result<Vec<u8>, SecretsError> {
            entries
                .iter()
                .find_map(|(k, v)| match (k, v) {
                    (Value::Text(name), Value::Bytes(bytes)) if name == key => Some(bytes.clone()),
                    _ => None,
                })
                .ok_or_else(|| SecretsError::Encoding(format!("missing envelope field: {key}")))
        };

        let pk: [u8; KEY_LEN] = field("pk")?
            .try_into()
            .map_err(|_| SecretsError::Encoding("bad public key length".to_owned()))?;
        let nonce: [u8; NONCE_LEN] = field("nonce")?
            .try_into()
            .map_err(|_| SecretsError::Encoding("bad nonce length".to_owned()))?;

        Ok(Self {
            pk,
            nonce,
            name: field("name")?,
            value: field("value")?,
        })
    }

    /// Encode the envelope as base64-wrapped CBOR.
    pub fn to_base64(&self) -> Result<String, SecretsError> {
        Ok(STANDARD.encode(self.to_cbor()?))
    }

    /// Decode a base64-wrapped CBOR envelope.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretsError> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| SecretsError::Encoding(e.to_string()))?;
        Self::from_cbor(&bytes)
    }
}

/// Seals secrets for delivery to an application's enclaves.
pub trait SecretSealer: Send + Sync {
    /// Seal a single named secret to the given key.
    fn seal(
        &self,
        name: &str,
        value: &SecretValue,
        sek: &SecretEncryptionKey,
    ) -> Result<SealedSecret, SecretsError>;
}

/// Default sealer: X25519 key agreement, HMAC-SHA256 key derivation and
/// AES-256-GCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Sealer;

impl SecretSealer for X25519Sealer {
    fn seal(
        &self,
        name: &str,
        value: &SecretValue,
        sek: &SecretEncryptionKey,
    ) -> Result<SealedSecret, SecretsError> {
        if !is_valid_name(name) {
            return Err(SecretsError::InvalidName(Redacted::new(name.to_owned())));
        }

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let pk = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&PublicKey::from(*sek.as_bytes()));
        if !shared.was_contributory() {
            return Err(SecretsError::InvalidKey(
                "secret-encryption key is a low-order point".to_owned(),
            ));
        }

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut name_key = derive_key(shared.as_bytes(), NAME_LABEL, pk.as_bytes(), sek)?;
        let mut value_key = derive_key(shared.as_bytes(), VALUE_LABEL, pk.as_bytes(), sek)?;

        let name_ct = encrypt(&name_key, &nonce, pk.as_bytes(), name.as_bytes());
        let value_ct = encrypt(&value_key, &nonce, pk.as_bytes(), value.expose().as_bytes());

        name_key.zeroize();
        value_key.zeroize();

        Ok(SealedSecret {
            pk: *pk.as_bytes(),
            nonce,
            name: name_ct?,
            value: value_ct?,
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('=') && !name.chars().any(char::is_control)
}

/// Open a sealed secret with the recipient's X25519 secret key.
///
/// Returns the plaintext name and value.
pub fn open(
    sealed: &SealedSecret,
    recipient: &[u8; KEY_LEN],
) -> Result<(String, SecretValue), SecretsError> {
    let secret = StaticSecret::from(*recipient);
    let sek = SecretEncryptionKey::from_bytes(*PublicKey::from(&secret).as_bytes());
    let shared = secret.diffie_hellman(&PublicKey::from(sealed.pk));

    let mut name_key = derive_key(shared.as_bytes(), NAME_LABEL, &sealed.pk, &sek)?;
    let mut value_key = derive_key(shared.as_bytes(), VALUE_LABEL, &sealed.pk, &sek)?;

    let name = decrypt(&name_key, &sealed.nonce, &sealed.pk, &sealed.name);
    let value = decrypt(&value_key, &sealed.nonce, &sealed.pk, &sealed.value);

    name_key.zeroize();
    value_key.zeroize();

    let name = String::from_utf8(name?).map_err(SecretsError::decryption)?;
    let mut value = value?;
    let secret_value = SecretValue::from_bytes(&value).map_err(SecretsError::decryption);
    value.zeroize();

    Ok((name, secret_value?))
}

/// Seal every secret in `secrets`, returning base64 envelopes keyed by name.
pub fn seal_all(
    sealer: &dyn SecretSealer,
    secrets: &BTreeMap<String, SecretValue>,
    sek: &SecretEncryptionKey,
) -> Result<BTreeMap<String, String>, SecretsError> {
    secrets
        .iter()
        .map(|(name, value)| {
            let sealed = sealer.seal(name, value, sek)?;
            Ok((name.clone(), sealed.to_base64()?))
        })
        .collect()
}

fn derive_key(
    shared: &[u8; KEY_LEN],
    label: &[u8],
    ephemeral_pk: &[u8; KEY_LEN],
    sek: &SecretEncryptionKey,
) -> Result<[u8; KEY_LEN], SecretsError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(shared).map_err(SecretsError::encryption)?;
    mac.update(label);
    mac.update(ephemeral_pk);
    mac.update(sek.as_bytes());
    Ok(mac.finalize().into_bytes().into())
}

fn encrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SecretsError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(SecretsError::encryption)
}

fn decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SecretsError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(SecretsError::decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> ([u8; KEY_LEN], SecretEncryptionKey) {
        let secret = [42u8; KEY_LEN];
        let public = PublicKey::from(&StaticSecret::from(secret));
        (secret, SecretEncryptionKey::from_bytes(*public.as_bytes()))
    }

    #[test]
    fn sealed_secret_opens_with_recipient_key() {
        let (secret, sek) = recipient();
        let sealed = X25519Sealer
            .seal("API_KEY", &SecretValue::new("sk_live_abc"), &sek)
            .unwrap();

        let (name, value) = open(&sealed, &secret).unwrap();
        assert_eq!(name, "API_KEY");
        assert_eq!(value.expose(), "sk_live_abc");
    }

    #[test]
    fn ciphertext_does_not_contain_plaintext() {
        let (_, sek) = recipient();
        let sealed = X25519Sealer
            .seal("API_KEY", &SecretValue::new("sk_live_abc"), &sek)
            .unwrap();

        assert_ne!(sealed.name, b"API_KEY");
        assert!(!sealed
            .value
            .windows(b"sk_live_abc".len())
            .any(|w| w == b"sk_live_abc"));
    }

    #[test]
    fn each_seal_uses_fresh_ephemeral_key() {
        let (_, sek) = recipient();
        let value = SecretValue::new("v");
        let a = X25519Sealer.seal("K", &value, &sek).unwrap();
        let b = X25519Sealer.seal("K", &value, &sek).unwrap();
        assert_ne!(a.pk, b.pk);
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let (_, sek) = recipient();
        let sealed = X25519Sealer
            .seal("K", &SecretValue::new("v"), &sek)
            .unwrap();

        let err = open(&sealed, &[9u8; KEY_LEN]).unwrap_err();
        assert!(matches!(err, SecretsError::Decryption(_)));
    }

    #[test]
    fn empty_name_is_rejected() {
        let (_, sek) = recipient();
        let err = X25519Sealer
            .seal("  ", &SecretValue::new("v"), &sek)
            .unwrap_err();
        assert!(matches!(err, SecretsError::InvalidName(_)));
    }

    #[test]
    fn pasted_assignment_is_rejected_without_echoing_it() {
        let (_, sek) = recipient();
        let err = X25519Sealer
            .seal("API_KEY=sk_live_abc", &SecretValue::new("v"), &sek)
            .unwrap_err();
        assert!(matches!(err, SecretsError::InvalidName(_)));
        assert!(!err.to_string().contains("sk_live"));
    }

    #[test]
    fn low_order_key_is_rejected() {
        let sek = SecretEncryptionKey::from_bytes([0u8; KEY_LEN]);
        let err = X25519Sealer
            .seal("K", &SecretValue::new("v"), &sek)
            .unwrap_err();
        assert!(matches!(err, SecretsError::InvalidKey(_)));
    }

    #[test]
    fn envelope_survives_base64_transport() {
        let (secret, sek) = recipient();
        let sealed = X25519Sealer
            .seal("DB_URL", &SecretValue::new("postgres://db"), &sek)
            .unwrap();

        let decoded = SealedSecret::from_base64(&sealed.to_base64().unwrap()).unwrap();
        assert_eq!(decoded, sealed);

        let (name, value) = open(&decoded, &secret).unwrap();
        assert_eq!(name, "DB_URL");
        assert_eq!(value.expose(), "postgres://db");
    }

    #[test]
    fn envelope_rejects_missing_fields() {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &Value::Map(vec![(Value::Text("pk".to_owned()), Value::Bytes(vec![0; 32]))]),
            &mut buf,
        )
        .unwrap();

        let err = SealedSecret::from_cbor(&buf).unwrap_err();
        assert!(matches!(err, SecretsError::Encoding(_)));
    }

    #[test]
    fn seal_all_keys_by_plaintext_name() {
        let (secret, sek) = recipient();
        let mut secrets = BTreeMap::new();
        secrets.insert("A".to_owned(), SecretValue::new("1"));
        secrets.insert("B".to_owned(), SecretValue::new("2"));

        let sealed = seal_all(&X25519Sealer, &secrets, &sek).unwrap();
        assert_eq!(sealed.keys().collect::<Vec<_>>(), vec!["A", "B"]);

        let envelope = SealedSecret::from_base64(&sealed["B"]).unwrap();
        let (name, value) = open(&envelope, &secret).unwrap();
        assert_eq!(name, "B");
        assert_eq!(value.expose(), "2");
    }
}
