//! # Provider Traits
//!
//! Capabilities supplied by the host application: signing, signature
//! verification, and access to the topic log.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

/// [`Signer`] produces signatures over a lifecycle message's canonical bytes.
///
/// Signing is synchronous: keys that cannot be used in-process (hardware keys,
/// remote custody) are handled by pausing a lifecycle and applying the
/// signature on resume.
pub trait Signer: Send + Sync {
    /// The public key matching the signing key.
    fn verifying_key(&self) -> VerifyingKey;

    /// Sign the provided message bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature cannot be produced.
    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>>;
}

/// [`Verifier`] is bound to exactly one public key and checks signatures made
/// by the matching private key.
pub trait Verifier: Send + Sync {
    /// Returns `true` if `signature` is a valid signature over `msg`.
    fn verify(&self, msg: &[u8], signature: &[u8]) -> bool;
}

/// [`Client`] is the log transport: it creates topics, submits messages and
/// reads them back in consensus order.
///
/// Implementations may be backed by a streaming subscription or a paginated
/// mirror. Messages returned by `read_messages` MUST be in non-decreasing
/// consensus timestamp order.
pub trait Client: Send + Sync {
    /// Identifier for the ledger (network) this client talks to. Used to
    /// partition cached data.
    fn ledger_id(&self) -> String;

    /// Create a new topic, returning its id.
    fn create_topic(&self, request: TopicCreate) -> impl Future<Output = Result<String>> + Send;

    /// Submit a message to a topic.
    fn submit_message(
        &self, topic_id: &str, message: &[u8],
    ) -> impl Future<Output = Result<Receipt>> + Send;

    /// Read messages with consensus timestamps in the inclusive range
    /// `[from, to]`. Open bounds read from the start or to the latest message.
    fn read_messages(
        &self, topic_id: &str, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Vec<TopicMessage>>> + Send;

    /// Fetch the topic's descriptor.
    fn topic_info(&self, topic_id: &str) -> impl Future<Output = Result<TopicInfo>> + Send;
}

/// Request to create a topic.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicCreate {
    /// Descriptive memo stored with the topic.
    pub memo: String,

    /// Key allowed to modify or delete the topic. `None` makes the topic
    /// immutable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,

    /// Key required to submit messages. `None` allows anyone to submit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_key: Option<String>,
}

/// Topic descriptor returned by the log transport.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicInfo {
    /// Topic id.
    pub topic_id: String,

    /// Descriptive memo stored with the topic.
    pub memo: String,

    /// Administrative key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,

    /// Submit key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_key: Option<String>,
}

/// A message read back from a topic.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopicMessage {
    /// Consensus timestamp assigned by the ledger.
    pub consensus_timestamp: DateTime<Utc>,

    /// Position of the message in the topic.
    pub sequence_number: u64,

    /// Raw message bytes.
    pub contents: Vec<u8>,
}

/// Receipt for a submitted message.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Topic the message was submitted to.
    pub topic_id: String,

    /// Sequence number assigned to the message.
    pub sequence_number: u64,
}
