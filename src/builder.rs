//! # Document Builder
//!
//! Replays a topic's log entries to reconstruct the DID document.
//!
//! Entries are folded in arrival order in a single forward pass. Entries that
//! fail to decode, target another DID, carry an unknown event or a bad
//! signature are skipped; the fold continues. The first valid `delete` entry
//! deactivates the document and ends the fold.
//!
//! The verifier used to check signatures is either supplied up front or bound
//! from the key carried in the `DIDOwner` event. An owner event is
//! self-certifying: its key is bound *before* its own signature is checked.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::core::Kind;
use crate::did::Did;
use crate::document::{
    DID_CONTEXT, Document, DocumentMetadata, ED25519_CONTEXT, Relationship, Service,
    VerificationMethod,
};
use crate::envelope::{LogEntry, Operation};
use crate::error::{Context, Err};
use crate::event::Event;
use crate::key::Ed25519Verifier;
use crate::provider::Verifier;
use crate::resolve::Resolved;
use crate::tracerr;

/// Build the DID document for `did` from raw log entries.
///
/// # Errors
///
/// Will fail with `NotFound` if no valid `DIDOwner` entry for the DID is found
/// and with `ProtocolViolation` if an entry must be verified before any
/// verifier has been bound.
pub fn build<I, B>(entries: I, did: &Did, verifier: Option<&dyn Verifier>) -> crate::Result<Document>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut builder = DocumentBuilder::new(did);
    if let Some(verifier) = verifier {
        builder = builder.verifier(verifier);
    }
    builder.apply_all(entries)?;
    builder.document()
}

/// Result of applying a single entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The entry changed the document.
    Applied,

    /// The entry was ignored.
    Skipped,

    /// The document is deactivated and accepts no further entries.
    Terminated,
}

/// Incremental DID document reducer.
pub struct DocumentBuilder<'a> {
    did: Did,
    binding: Option<Binding<'a>>,
    root_id: Option<String>,
    controller: Option<String>,
    methods: OrderedMap<VerificationMethod>,
    relationships: [OrderedMap<Kind<VerificationMethod>>; 5],
    services: OrderedMap<Service>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    deactivated: bool,
}

enum Binding<'a> {
    External(&'a dyn Verifier),
    Key(Ed25519Verifier),
}

impl Binding<'_> {
    fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::External(verifier) => verifier.verify(msg, signature),
            Self::Key(verifier) => verifier.verify(msg, signature),
        }
    }
}

impl<'a> DocumentBuilder<'a> {
    /// Create a builder for the given DID.
    #[must_use]
    pub fn new(did: &Did) -> Self {
        Self {
            did: did.clone(),
            binding: None,
            root_id: None,
            controller: None,
            methods: OrderedMap::new(),
            relationships: std::array::from_fn(|_| OrderedMap::new()),
            services: OrderedMap::new(),
            created: None,
            updated: None,
            deactivated: false,
        }
    }

    /// Verify every entry with `verifier` instead of binding one from the
    /// `DIDOwner` key.
    #[must_use]
    pub fn verifier(mut self, verifier: &'a dyn Verifier) -> Self {
        self.binding = Some(Binding::External(verifier));
        self
    }

    /// Apply entries in order until they run out or the document is
    /// deactivated.
    ///
    /// # Errors
    ///
    /// Will fail with `ProtocolViolation` if an entry must be verified before
    /// any verifier has been bound.
    pub fn apply_all<I, B>(&mut self, entries: I) -> crate::Result<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        for entry in entries {
            if self.apply(entry.as_ref())? == Outcome::Terminated {
                break;
            }
        }
        Ok(())
    }

    /// Apply a single raw log entry.
    ///
    /// # Errors
    ///
    /// Will fail with `ProtocolViolation` if the entry must be verified but no
    /// verifier has been bound.
    pub fn apply(&mut self, raw: &[u8]) -> crate::Result<Outcome> {
        if self.deactivated {
            return Ok(Outcome::Terminated);
        }

        let entry = match LogEntry::decode(raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping malformed entry: {e}");
                return Ok(Outcome::Skipped);
            }
        };
        match Did::parse(&entry.message.did) {
            Ok(did) if did == self.did => {}
            _ => {
                debug!("skipping entry for {}", entry.message.did);
                return Ok(Outcome::Skipped);
            }
        }
        let Ok(signature) = entry.signature_bytes() else {
            debug!("skipping entry with undecodable signature");
            return Ok(Outcome::Skipped);
        };
        let payload = entry.message.signing_bytes()?;
        let operation = entry.message.operation;
        let timestamp = entry.message.timestamp();

        if operation == Operation::Delete {
            if !self.verify(&payload, &signature)? {
                warn!("rejecting delete for {}: invalid signature", self.did);
                return Ok(Outcome::Skipped);
            }
            self.deactivate(timestamp);
            return Ok(Outcome::Terminated);
        }

        let event = match entry.message.event() {
            Ok(Some(event)) => event.qualify(&self.did),
            Ok(None) => return Ok(Outcome::Skipped),
            Err(e) => {
                debug!("skipping {operation} entry: {e}");
                return Ok(Outcome::Skipped);
            }
        };

        // bind, then verify
        let mut rotation = None;
        if let Event::Owner(vm) = &event {
            let key = match vm.key.verifying_key() {
                Ok(key) => key,
                Err(e) => {
                    debug!("skipping owner entry with unusable key: {e}");
                    return Ok(Outcome::Skipped);
                }
            };
            match (operation, &self.root_id) {
                (Operation::Create, None) => {
                    if !matches!(self.binding, Some(Binding::External(_))) {
                        self.binding = Some(Binding::Key(Ed25519Verifier::new(key)));
                    }
                }
                (Operation::Create, Some(_)) => {
                    debug!("ignoring owner entry: {} already has an owner", self.did);
                    return Ok(Outcome::Skipped);
                }
                (_, None) => {
                    debug!("ignoring owner rotation: {} has no owner", self.did);
                    return Ok(Outcome::Skipped);
                }
                (_, Some(_)) => rotation = Some(key),
            }
        }

        if !self.verify(&payload, &signature)? {
            warn!("rejecting {operation} entry for {}: invalid signature", self.did);
            return Ok(Outcome::Skipped);
        }

        let applied = match event {
            Event::Owner(vm) => {
                self.apply_owner(vm, timestamp);
                if let (Some(key), Some(Binding::Key(_))) = (rotation, &self.binding) {
                    self.binding = Some(Binding::Key(Ed25519Verifier::new(key)));
                }
                true
            }
            _ if self.root_id.is_none() => {
                debug!("skipping {operation} entry: {} has no owner yet", self.did);
                false
            }
            event => self.apply_event(event),
        };

        if !applied {
            return Ok(Outcome::Skipped);
        }
        if timestamp.is_some() {
            self.updated = timestamp;
        }
        Ok(Outcome::Applied)
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> crate::Result<bool> {
        let Some(binding) = &self.binding else {
            tracerr!(Err::ProtocolViolation, "no verifier bound for {}", self.did);
        };
        Ok(binding.verify(payload, signature))
    }

    fn apply_owner(&mut self, mut vm: VerificationMethod, timestamp: Option<DateTime<Utc>>) {
        if let Some(root_id) = &self.root_id {
            // rotation replaces the root method in place
            vm.id.clone_from(root_id);
        } else {
            self.root_id = Some(vm.id.clone());
            self.created = timestamp;
        }
        self.controller = Some(vm.controller.clone());
        self.methods.insert(vm.id.clone(), vm);
    }

    fn apply_event(&mut self, event: Event) -> bool {
        let root_id = self.root_id.clone();
        let is_root = |id: &str| root_id.as_deref() == Some(id);

        match event {
            Event::Owner(_) => false,
            Event::AddVerificationMethod(vm) => {
                if is_root(&vm.id) {
                    debug!("ignoring change to root key {}", vm.id);
                    return false;
                }
                self.methods.insert(vm.id.clone(), vm);
                true
            }
            Event::RemoveVerificationMethod { id } => {
                if is_root(&id) {
                    debug!("ignoring removal of root key {id}");
                    return false;
                }
                self.methods.remove(&id).is_some()
            }
            Event::AddRelationship { relationship, method } => {
                let id = method.id.clone();
                let item = if self.methods.contains_key(&id) {
                    Kind::String(id.clone())
                } else {
                    Kind::Object(method)
                };
                self.relationships[relationship.index()].insert(id, item);
                true
            }
            Event::RemoveRelationship { id, relationship } => {
                if is_root(&id) {
                    debug!("ignoring removal of root key {id}");
                    return false;
                }
                match relationship {
                    Some(relationship) => {
                        self.relationships[relationship.index()].remove(&id).is_some()
                    }
                    None => self.relationships.iter_mut().any(|map| map.remove(&id).is_some()),
                }
            }
            Event::AddService(service) => {
                self.services.insert(service.id.clone(), service);
                true
            }
            Event::RemoveService { id } => self.services.remove(&id).is_some(),
        }
    }

    fn deactivate(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.deactivated = true;
        self.methods.clear();
        self.relationships.iter_mut().for_each(OrderedMap::clear);
        self.services.clear();
        if timestamp.is_some() {
            self.updated = timestamp;
        }
    }

    /// `true` once a valid `delete` entry has been applied.
    #[must_use]
    pub const fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    /// The plain DID document.
    ///
    /// # Errors
    ///
    /// Will fail with `NotFound` if no valid `DIDOwner` entry was applied.
    pub fn document(&self) -> crate::Result<Document> {
        let Some(root_id) = &self.root_id else {
            tracerr!(Err::NotFound, "no DIDOwner entry found for {}", self.did);
        };
        let id = self.did.to_string();
        let controller = self.controller.clone().unwrap_or_else(|| id.clone());

        if self.deactivated {
            return Ok(Document {
                id,
                controller,
                ..Document::default()
            });
        }

        let mut relationships: [Vec<Kind<VerificationMethod>>; 5] =
            std::array::from_fn(|i| self.relationships[i].values().cloned().collect());
        for relationship in [Relationship::Authentication, Relationship::AssertionMethod] {
            let items = &mut relationships[relationship.index()];
            let present = items.iter().any(|item| match item {
                Kind::String(reference) => reference == root_id,
                Kind::Object(vm) => &vm.id == root_id,
            });
            if !present {
                items.push(Kind::String(root_id.clone()));
            }
        }
        let [authentication, assertion_method, key_agreement, capability_invocation, capability_delegation] =
            relationships;

        Ok(Document {
            context: vec![],
            id,
            controller,
            verification_method: self.methods.values().cloned().collect(),
            authentication: Some(authentication),
            assertion_method: Some(assertion_method),
            key_agreement: Some(key_agreement),
            capability_invocation: Some(capability_invocation),
            capability_delegation: Some(capability_delegation),
            service: Some(self.services.values().cloned().collect()),
        })
    }

    /// The document annotated with JSON-LD contexts.
    ///
    /// # Errors
    ///
    /// Will fail with `NotFound` if no valid `DIDOwner` entry was applied.
    pub fn json_ld(&self) -> crate::Result<Document> {
        let mut document = self.document()?;
        document.context = vec![Kind::from(DID_CONTEXT), Kind::from(ED25519_CONTEXT)];
        Ok(document)
    }

    /// Document metadata.
    #[must_use]
    pub const fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            created: self.created,
            updated: self.updated,
            deactivated: self.deactivated,
        }
    }

    /// Full resolution result: JSON-LD document plus metadata.
    ///
    /// # Errors
    ///
    /// Will fail with `NotFound` if no valid `DIDOwner` entry was applied.
    pub fn resolution(&self) -> crate::Result<Resolved> {
        Ok(Resolved::new(self.json_ld()?, self.metadata()))
    }

    /// CBOR encoding of the plain document.
    ///
    /// # Errors
    ///
    /// Will fail with `NotFound` if no valid `DIDOwner` entry was applied.
    pub fn cbor(&self) -> crate::Result<Vec<u8>> {
        let document = self.document()?;
        serde_cbor::to_vec(&document).context("encoding document as CBOR")
    }
}

/// A map that iterates in insertion order.
///
/// Replacing a value keeps its position; a key removed and added again moves
/// to the end.
#[derive(Clone, Debug)]
pub struct OrderedMap<V> {
    entries: Vec<Option<(String, V)>>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> OrderedMap<V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert or replace the value for `key`, returning the old value.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        if let Some(&pos) = self.index.get(&key) {
            let slot = self.entries[pos].replace((key, value));
            return slot.map(|(_, v)| v);
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(Some((key, value)));
        None
    }

    /// Remove the value for `key`.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let pos = self.index.remove(key)?;
        self.entries[pos].take().map(|(_, v)| v)
    }

    /// Get the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        let pos = self.index.get(key)?;
        self.entries[*pos].as_ref().map(|(_, v)| v)
    }

    /// `true` if the map holds `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// `true` if the map has no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().flatten().map(|(k, v)| (k.as_str(), v))
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().flatten().map(|(_, v)| v)
    }
}
