//! Lifecycle message producing DID log entries.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::did::{Did, METHOD, ROOT_KEY_FRAGMENT};
use crate::document::{Relationship, Service, VerificationMethod};
use crate::envelope::{EntryMessage, LogEntry, Operation};
use crate::error::Err;
use crate::event::Event;
use crate::lifecycle::Message;
use crate::{key, tracerr};

/// A DID operation on its way to the DID's topic.
///
/// Owner messages for a new DID start without a topic; the topic is created
/// (and the DID fixed) by the lifecycle's first step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DidMessage {
    /// DID method.
    pub method: String,

    /// Ledger network.
    pub network: String,

    /// Owner key fingerprint.
    pub fingerprint: String,

    /// DID topic, once assigned.
    pub topic_id: Option<String>,

    /// Time the message was produced.
    pub timestamp: DateTime<Utc>,

    /// Entry operation.
    pub operation: Operation,

    /// Event carried by the entry. `None` for deactivation.
    pub event: Option<Event>,

    /// Signature over [`Message::signing_bytes`].
    pub signature: Option<Vec<u8>>,
}

impl DidMessage {
    fn for_did(did: &Did, operation: Operation, event: Option<Event>) -> Self {
        Self {
            method: did.method.clone(),
            network: did.network.clone(),
            fingerprint: did.fingerprint.clone(),
            topic_id: Some(did.topic_id.clone()),
            timestamp: Utc::now(),
            operation,
            event,
            signature: None,
        }
    }

    /// Establish a new DID owned by `key`. The DID's topic is created when the
    /// message is processed.
    #[must_use]
    pub fn owner(network: impl Into<String>, key: &VerifyingKey) -> Self {
        let vm = VerificationMethod::ed25519(format!("#{ROOT_KEY_FRAGMENT}"), "", key);
        Self {
            method: METHOD.to_string(),
            network: network.into(),
            fingerprint: key::to_multibase(key),
            topic_id: None,
            timestamp: Utc::now(),
            operation: Operation::Create,
            event: Some(Event::Owner(vm)),
            signature: None,
        }
    }

    /// Publish the owner event for a DID whose topic already exists.
    #[must_use]
    pub fn owner_for(did: &Did, key: &VerifyingKey) -> Self {
        let vm = VerificationMethod::ed25519(format!("#{ROOT_KEY_FRAGMENT}"), "", key);
        Self::for_did(did, Operation::Create, Some(Event::Owner(vm)))
    }

    /// Rotate the owner key. Must be signed with the current owner key.
    #[must_use]
    pub fn rotate_owner(did: &Did, key: &VerifyingKey) -> Self {
        let vm = VerificationMethod::ed25519(format!("#{ROOT_KEY_FRAGMENT}"), "", key);
        Self::for_did(did, Operation::Update, Some(Event::Owner(vm)))
    }

    /// Add (or replace) a verification method.
    #[must_use]
    pub fn add_verification_method(did: &Did, vm: VerificationMethod) -> Self {
        Self::for_did(did, Operation::Update, Some(Event::AddVerificationMethod(vm)))
    }

    /// Remove a verification method.
    #[must_use]
    pub fn remove_verification_method(did: &Did, id: impl Into<String>) -> Self {
        let event = Event::RemoveVerificationMethod { id: id.into() };
        Self::for_did(did, Operation::Revoke, Some(event))
    }

    /// Bind a verification method to a relationship.
    #[must_use]
    pub fn add_relationship(did: &Did, relationship: Relationship, vm: VerificationMethod) -> Self {
        let event = Event::AddRelationship {
            relationship,
            method: vm,
        };
        Self::for_did(did, Operation::Update, Some(event))
    }

    /// Remove a relationship binding.
    #[must_use]
    pub fn remove_relationship(
        did: &Did, id: impl Into<String>, relationship: Option<Relationship>,
    ) -> Self {
        let event = Event::RemoveRelationship {
            id: id.into(),
            relationship,
        };
        Self::for_did(did, Operation::Revoke, Some(event))
    }

    /// Add (or replace) a service.
    #[must_use]
    pub fn add_service(did: &Did, service: Service) -> Self {
        Self::for_did(did, Operation::Update, Some(Event::AddService(service)))
    }

    /// Remove a service.
    #[must_use]
    pub fn remove_service(did: &Did, id: impl Into<String>) -> Self {
        Self::for_did(did, Operation::Revoke, Some(Event::RemoveService { id: id.into() }))
    }

    /// Deactivate the DID.
    #[must_use]
    pub fn deactivate(did: &Did) -> Self {
        Self::for_did(did, Operation::Delete, None)
    }

    /// The DID, once the topic is known.
    #[must_use]
    pub fn did(&self) -> Option<Did> {
        Some(Did {
            method: self.method.clone(),
            network: self.network.clone(),
            fingerprint: self.fingerprint.clone(),
            topic_id: self.topic_id.clone()?,
        })
    }

    /// The signed envelope message.
    ///
    /// # Errors
    ///
    /// Will fail with `InvalidInput` if no topic has been assigned.
    pub fn entry_message(&self) -> crate::Result<EntryMessage> {
        let Some(did) = self.did() else {
            tracerr!(Err::InvalidInput, "message has no topic");
        };
        let event = match &self.event {
            Some(event) => Some(event.clone().qualify(&did).encode()?),
            None => None,
        };
        Ok(EntryMessage {
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            operation: self.operation,
            did: did.to_string(),
            event,
        })
    }

    /// The signed log entry ready for submission.
    ///
    /// # Errors
    ///
    /// Will fail with `MissingSignature` if the message has not been signed.
    pub fn entry(&self) -> crate::Result<LogEntry> {
        let Some(signature) = &self.signature else {
            tracerr!(Err::MissingSignature, "message has not been signed");
        };
        Ok(LogEntry::new(self.entry_message()?, signature))
    }
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Persisted {
    method: String,
    network: String,
    fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic_id: Option<String>,
    timestamp: DateTime<Utc>,
    operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl Message for DidMessage {
    fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
        self.entry_message()?.signing_bytes()
    }

    fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = Some(signature);
    }

    fn topic_id(&self) -> Option<&str> {
        self.topic_id.as_deref()
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let event = match &self.event {
            Some(event) => Some(event.encode()?),
            None => None,
        };
        let persisted = Persisted {
            method: self.method.clone(),
            network: self.network.clone(),
            fingerprint: self.fingerprint.clone(),
            topic_id: self.topic_id.clone(),
            timestamp: self.timestamp,
            operation: self.operation,
            event,
            signature: self.signature.as_ref().map(|s| Base64::encode_string(s)),
        };
        Ok(serde_json::to_vec(&persisted)?)
    }

    fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let persisted: Persisted = serde_json::from_slice(bytes)?;
        let event = match &persisted.event {
            Some(encoded) => Some(Event::decode(persisted.operation, encoded)?),
            None => None,
        };
        let signature = match &persisted.signature {
            Some(encoded) => Some(Base64::decode_vec(encoded)?),
            None => None,
        };
        Ok(Self {
            method: persisted.method,
            network: persisted.network,
            fingerprint: persisted.fingerprint,
            topic_id: persisted.topic_id,
            timestamp: persisted.timestamp,
            operation: persisted.operation,
            event,
            signature,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::key::{Ed25519Signer, Ed25519Verifier};
    use crate::provider::Signer;

    #[test]
    fn owner_needs_topic() {
        let signer = Ed25519Signer::from_bytes(&[4; 32]);
        let mut message = DidMessage::owner("testnet", &signer.verifying_key());
        assert!(message.did().is_none());
        let err = message.signing_bytes().expect_err("should fail");
        assert!(err.is(Err::InvalidInput));

        message.topic_id = Some("0.0.9".into());
        let did = message.did().unwrap();
        assert_eq!(did.public_key().unwrap(), signer.verifying_key());

        let entry_message = message.entry_message().unwrap();
        let Some(Event::Owner(vm)) = entry_message.event().unwrap() else {
            panic!("should be an owner event");
        };
        assert_eq!(vm.id, did.root_key_id());
        assert_eq!(vm.controller, did.to_string());
    }

    #[test]
    fn signed_entry_verifies() {
        let signer = Ed25519Signer::from_bytes(&[4; 32]);
        let did = Did::new("testnet", &signer.verifying_key(), "0.0.9");
        let mut message = DidMessage::add_service(&did, Service::new("#s1", "X", "https://e.com"));
        assert!(message.entry().unwrap_err().is(Err::MissingSignature));

        message.set_signature(signer.sign(&message.signing_bytes().unwrap()).unwrap());
        let entry = message.entry().unwrap();
        assert_eq!(entry.message.operation, Operation::Update);
        entry.verify(&Ed25519Verifier::new(signer.verifying_key())).expect("should verify");
    }

    #[test]
    fn persisted_form() {
        let signer = Ed25519Signer::from_bytes(&[4; 32]);
        let did = Did::new("testnet", &signer.verifying_key(), "0.0.9");
        let mut message = DidMessage::remove_relationship(&did, "#key-2", None);
        message.set_signature(vec![7; 64]);

        let bytes = message.to_bytes().unwrap();
        assert_ne!(bytes, message.signing_bytes().unwrap());
        assert_eq!(DidMessage::from_bytes(&bytes).unwrap(), message);

        let deactivate = DidMessage::deactivate(&did);
        let restored = DidMessage::from_bytes(&deactivate.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, deactivate);
        assert_eq!(restored.operation(), Operation::Delete);
    }
}
