//! # Signed Envelope
//!
//! Wire format of a single log entry:
//!
//! ```json
//! {
//!   "message": {
//!     "timestamp": "2024-01-01T00:00:00.000Z",
//!     "operation": "update",
//!     "did": "did:hedera:testnet:z6Mk..._0.0.1234",
//!     "event": "<base64 JSON event>"
//!   },
//!   "signature": "<base64 signature>"
//! }
//! ```
//!
//! The signature covers the compact JSON serialization of `message` with its
//! fields in the order shown.

use std::fmt::{self, Display, Formatter};

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Err;
use crate::event::Event;
use crate::provider::Verifier;
use crate::tracerr;

/// Log entry operation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Establish the DID (owner event) or add an element.
    Create,

    /// Add or replace an element, or rotate the owner key.
    Update,

    /// Remove an element.
    Revoke,

    /// Deactivate the DID. Terminal.
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Revoke => write!(f, "revoke"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// The signed portion of a log entry.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EntryMessage {
    /// ISO-8601 time the entry was produced.
    pub timestamp: String,

    /// Operation the event is applied with.
    pub operation: Operation,

    /// DID the entry applies to.
    pub did: String,

    /// Base64-encoded JSON event. `None` (serialized as `null`) for `delete`.
    pub event: Option<String>,
}

impl EntryMessage {
    /// Canonical bytes covered by the entry signature.
    ///
    /// # Errors
    ///
    /// Will fail if the message cannot be serialized.
    pub fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The entry timestamp, if it parses as RFC 3339.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok().map(|dt| dt.with_timezone(&Utc))
    }

    /// Decode the carried event. Returns `None` for `delete` entries.
    ///
    /// # Errors
    ///
    /// Will fail with `MalformedEntry` if the event is missing or does not
    /// decode to a known shape for the operation.
    pub fn event(&self) -> crate::Result<Option<Event>> {
        if self.operation == Operation::Delete {
            return Ok(None);
        }
        let Some(encoded) = &self.event else {
            tracerr!(Err::MalformedEntry, "{} entry has no event", self.operation);
        };
        Ok(Some(Event::decode(self.operation, encoded)?))
    }
}

/// A log entry as submitted to, and read back from, a topic.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LogEntry {
    /// The signed message.
    pub message: EntryMessage,

    /// Base64 (standard, padded) signature over the message's signing bytes.
    pub signature: String,
}

impl LogEntry {
    /// Wrap a message and its raw signature.
    #[must_use]
    pub fn new(message: EntryMessage, signature: &[u8]) -> Self {
        Self {
            message,
            signature: Base64::encode_string(signature),
        }
    }

    /// Decode an entry from raw topic message bytes and check its shape.
    ///
    /// # Errors
    ///
    /// Will fail with `MalformedEntry` if the bytes are not a JSON log entry or
    /// a non-`delete` entry has no event.
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        let entry: Self = serde_json::from_slice(bytes)?;
        if entry.message.operation != Operation::Delete && entry.message.event.is_none() {
            tracerr!(Err::MalformedEntry, "{} entry has no event", entry.message.operation);
        }
        Ok(entry)
    }

    /// Serialize the entry for submission.
    ///
    /// # Errors
    ///
    /// Will fail if the entry cannot be serialized.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decoded signature bytes.
    ///
    /// # Errors
    ///
    /// Will fail with `MalformedEntry` if the signature is not base64.
    pub fn signature_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(Base64::decode_vec(&self.signature)?)
    }

    /// Check the entry signature with `verifier`.
    ///
    /// # Errors
    ///
    /// Will fail with `MalformedEntry` if the signature is not base64 and with
    /// `InvalidSignature` if it does not verify.
    pub fn verify(&self, verifier: &dyn Verifier) -> crate::Result<()> {
        let signature = self.signature_bytes()?;
        if !verifier.verify(&self.message.signing_bytes()?, &signature) {
            tracerr!(Err::InvalidSignature, "signature does not verify for {}", self.message.did);
        }
        Ok(())
    }
}
