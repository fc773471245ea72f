//! # Keys
//!
//! Ed25519 public key encodings used in DIDs and verification methods, and
//! default [`Signer`] and [`Verifier`] implementations.

use anyhow::{Result, anyhow, bail};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use multibase::Base;
use rand::rngs::OsRng;

use crate::provider::{Signer, Verifier};

/// Multicodec prefix for an Ed25519 public key.
pub const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Encode a public key as a multibase (base58btc) string carrying the Ed25519
/// multicodec prefix. This is the form used as the DID fingerprint.
#[must_use]
pub fn to_multibase(key: &VerifyingKey) -> String {
    let mut bytes = ED25519_CODEC.to_vec();
    bytes.extend_from_slice(key.as_bytes());
    multibase::encode(Base::Base58Btc, bytes)
}

/// Decode a multibase public key. Both multicodec-prefixed and raw 32-byte
/// keys are accepted.
///
/// # Errors
///
/// Will fail if the string is not valid multibase or does not hold an Ed25519
/// public key.
pub fn from_multibase(multi: &str) -> Result<VerifyingKey> {
    let (_, bytes) = multibase::decode(multi).map_err(|e| anyhow!("invalid multibase key: {e}"))?;
    if bytes.len() == ED25519_CODEC.len() + 32 && bytes.starts_with(&ED25519_CODEC) {
        return from_bytes(&bytes[ED25519_CODEC.len()..]);
    }
    from_bytes(&bytes)
}

/// Encode a public key as a bare base58 string (no multibase prefix).
#[must_use]
pub fn to_base58(key: &VerifyingKey) -> String {
    Base::Base58Btc.encode(key.as_bytes())
}

/// Decode a bare base58 public key.
///
/// # Errors
///
/// Will fail if the string is not valid base58 or does not hold an Ed25519
/// public key.
pub fn from_base58(b58: &str) -> Result<VerifyingKey> {
    let bytes = Base::Base58Btc.decode(b58).map_err(|e| anyhow!("invalid base58 key: {e}"))?;
    from_bytes(&bytes)
}

fn from_bytes(bytes: &[u8]) -> Result<VerifyingKey> {
    let Ok(raw) = <[u8; 32]>::try_from(bytes) else {
        bail!("public key must be 32 bytes, got {}", bytes.len());
    };
    VerifyingKey::from_bytes(&raw).map_err(|e| anyhow!("invalid Ed25519 public key: {e}"))
}

/// Verifier bound to a single Ed25519 public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Bind a verifier to the given public key.
    #[must_use]
    pub const fn new(key: VerifyingKey) -> Self {
        Self { key }
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.key.verify(msg, &signature).is_ok()
    }
}

/// In-process Ed25519 signer.
#[derive(Clone, Debug)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a new random signing key.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a signer from a 32-byte secret key.
    #[must_use]
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }
}

impl Signer for Ed25519Signer {
    fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(msg).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn multibase_round_trip() {
        let signer = Ed25519Signer::from_bytes(&[7; 32]);
        let key = signer.verifying_key();

        let multi = to_multibase(&key);
        assert!(multi.starts_with("z6Mk"));
        assert_eq!(from_multibase(&multi).unwrap(), key);

        // raw keys without the codec prefix are also accepted
        let raw = multibase::encode(Base::Base58Btc, key.as_bytes());
        assert_eq!(from_multibase(&raw).unwrap(), key);

        assert_eq!(from_base58(&to_base58(&key)).unwrap(), key);
    }

    #[test]
    fn bad_key_length() {
        let short = multibase::encode(Base::Base58Btc, [1u8; 16]);
        assert!(from_multibase(&short).is_err());
    }

    #[test]
    fn sign_and_verify() {
        let signer = Ed25519Signer::generate();
        let verifier = Ed25519Verifier::new(signer.verifying_key());

        let sig = signer.sign(b"hello").unwrap();
        assert!(verifier.verify(b"hello", &sig));
        assert!(!verifier.verify(b"hullo", &sig));
        assert!(!verifier.verify(b"hello", b"short"));
    }
}
