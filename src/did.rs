//! # DID
//!
//! Identifiers of the form
//!
//! `did:<method>:<network>:<fingerprint>_<topic-id>`
//!
//! where `fingerprint` is the multibase-encoded owner public key and
//! `topic-id` addresses the log holding the DID's entries.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use ed25519_dalek::VerifyingKey;
use regex::Regex;

use crate::error::{Err, Error};
use crate::{key, tracerr};

/// Method name used when constructing new DIDs.
pub const METHOD: &str = "hedera";

/// Fragment identifying the immutable root verification method.
pub const ROOT_KEY_FRAGMENT: &str = "did-root-key";

static DID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "^did:(?<method>[a-z0-9]+):(?<network>[a-z0-9]+):(?<fingerprint>[A-Za-z0-9]+)_(?<topic>[0-9]+\\.[0-9]+\\.[0-9]+)$",
    )
    .expect("should compile")
});

/// A parsed DID.
#[derive(Clone, Debug)]
pub struct Did {
    /// DID method.
    pub method: String,

    /// Ledger network, e.g. `mainnet` or `testnet`.
    pub network: String,

    /// Owner public key fingerprint.
    pub fingerprint: String,

    /// Address of the topic holding the DID's log entries.
    pub topic_id: String,
}

impl Did {
    /// Construct a DID for an owner key and topic on the given network.
    #[must_use]
    pub fn new(network: impl Into<String>, key: &VerifyingKey, topic_id: impl Into<String>) -> Self {
        Self {
            method: METHOD.to_string(),
            network: network.into(),
            fingerprint: key::to_multibase(key),
            topic_id: topic_id.into(),
        }
    }

    /// Parse a DID string.
    ///
    /// # Errors
    ///
    /// Will fail with `InvalidDid` if the string is not a well-formed DID.
    pub fn parse(did: &str) -> crate::Result<Self> {
        let Some(caps) = DID_REGEX.captures(did) else {
            tracerr!(Err::InvalidDid, "invalid DID: {did}");
        };
        Ok(Self {
            method: caps["method"].to_string(),
            network: caps["network"].to_string(),
            fingerprint: caps["fingerprint"].to_string(),
            topic_id: caps["topic"].to_string(),
        })
    }

    /// The owner public key encoded in the fingerprint, when it is a
    /// multibase Ed25519 key.
    ///
    /// # Errors
    ///
    /// Will fail if the fingerprint does not decode to an Ed25519 key.
    pub fn public_key(&self) -> anyhow::Result<VerifyingKey> {
        key::from_multibase(&self.fingerprint)
    }

    /// Id of the root verification method, `<did>#did-root-key`.
    #[must_use]
    pub fn root_key_id(&self) -> String {
        format!("{self}#{ROOT_KEY_FRAGMENT}")
    }

    /// Qualify an id with this DID if it is a bare fragment (`#key-1`).
    #[must_use]
    pub fn qualify(&self, id: &str) -> String {
        if id.starts_with('#') { format!("{self}{id}") } else { id.to_string() }
    }
}

impl PartialEq for Did {
    fn eq(&self, other: &Self) -> bool {
        self.network == other.network
            && self.fingerprint == other.fingerprint
            && self.topic_id == other.topic_id
    }
}

impl Eq for Did {}

impl Display for Did {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}:{}_{}", self.method, self.network, self.fingerprint, self.topic_id)
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Ed25519Signer;
    use crate::provider::Signer;

    #[test]
    fn parse_and_display() {
        let did = Did::parse("did:example:testnet:K_0.0.1").expect("should parse");
        assert_eq!(did.method, "example");
        assert_eq!(did.network, "testnet");
        assert_eq!(did.fingerprint, "K");
        assert_eq!(did.topic_id, "0.0.1");
        assert_eq!(did.to_string(), "did:example:testnet:K_0.0.1");
        assert_eq!(did.root_key_id(), "did:example:testnet:K_0.0.1#did-root-key");
        assert_eq!(did.qualify("#s1"), "did:example:testnet:K_0.0.1#s1");
    }

    #[test]
    fn equality_ignores_method() {
        let a = Did::parse("did:example:testnet:K_0.0.1").unwrap();
        let b = Did::parse("did:hedera:testnet:K_0.0.1").unwrap();
        let c = Did::parse("did:hedera:testnet:K_0.0.2").unwrap();
        assert_eq!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn invalid() {
        let err = Did::parse("did:example:testnet:K").expect_err("should fail");
        assert!(err.is(Err::InvalidDid));
        assert!(Did::parse("not-a-did").is_err());
    }

    #[test]
    fn from_key() {
        let signer = Ed25519Signer::from_bytes(&[3; 32]);
        let did = Did::new("testnet", &signer.verifying_key(), "0.0.42");
        let parsed = Did::parse(&did.to_string()).unwrap();
        assert_eq!(parsed, did);
        assert_eq!(parsed.public_key().unwrap(), signer.verifying_key());
    }
}
