//! # Events
//!
//! State transitions carried by log entries. On the wire an event is a JSON
//! object keyed by event name (`DIDOwner`, `VerificationMethod`,
//! `VerificationRelationship` or `Service`). Whether it adds or removes is
//! decided by the entry's operation: `create` and `update` carry full
//! payloads, `revoke` carries only the target `id`.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use crate::did::Did;
use crate::document::{Relationship, Service, VerificationMethod};
use crate::envelope::Operation;
use crate::error::Err;
use crate::tracerr;

/// A decoded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Establish (or, under `update`, rotate) the DID owner's root key.
    Owner(VerificationMethod),

    /// Add or replace a verification method.
    AddVerificationMethod(VerificationMethod),

    /// Remove a verification method by id.
    RemoveVerificationMethod {
        /// Verification method id.
        id: String,
    },

    /// Bind a verification method to a relationship.
    AddRelationship {
        /// The relationship to bind to.
        relationship: Relationship,

        /// The verification method.
        method: VerificationMethod,
    },

    /// Remove a relationship binding by verification method id.
    RemoveRelationship {
        /// Verification method id.
        id: String,

        /// The relationship, when the producer recorded it.
        relationship: Option<Relationship>,
    },

    /// Add or replace a service.
    AddService(Service),

    /// Remove a service by id.
    RemoveService {
        /// Service id.
        id: String,
    },
}

impl Event {
    /// Parse an event from its JSON form, interpreted according to the entry
    /// operation.
    ///
    /// # Errors
    ///
    /// Will fail with `MalformedEntry` if the JSON does not match a known event
    /// shape for the operation.
    pub fn from_json(operation: Operation, json: &[u8]) -> crate::Result<Self> {
        let event: Self = match operation {
            Operation::Create | Operation::Update => serde_json::from_slice::<AddWire>(json)?.into(),
            Operation::Revoke => serde_json::from_slice::<RemoveWire>(json)?.into(),
            Operation::Delete => tracerr!(Err::MalformedEntry, "delete entries carry no event"),
        };
        Ok(event)
    }

    /// Decode a base64-encoded event.
    ///
    /// # Errors
    ///
    /// Will fail with `MalformedEntry` if the value is not base64 or does not
    /// hold a known event shape.
    pub fn decode(operation: Operation, encoded: &str) -> crate::Result<Self> {
        let json = Base64::decode_vec(encoded)?;
        Self::from_json(operation, &json)
    }

    /// Serialize the event to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Will fail if the event cannot be serialized.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        let json = match self.clone() {
            Self::Owner(vm) => serde_json::to_vec(&AddWire::Owner(vm))?,
            Self::AddVerificationMethod(vm) => serde_json::to_vec(&AddWire::VerificationMethod(vm))?,
            Self::AddRelationship { relationship, method } => {
                serde_json::to_vec(&AddWire::VerificationRelationship(RelationshipPayload {
                    method,
                    relationship_type: relationship,
                }))?
            }
            Self::AddService(service) => serde_json::to_vec(&AddWire::Service(service))?,
            Self::RemoveVerificationMethod { id } => {
                serde_json::to_vec(&RemoveWire::VerificationMethod(IdPayload { id }))?
            }
            Self::RemoveRelationship { id, relationship } => {
                serde_json::to_vec(&RemoveWire::VerificationRelationship(
                    RemoveRelationshipPayload {
                        id,
                        relationship_type: relationship,
                    },
                ))?
            }
            Self::RemoveService { id } => serde_json::to_vec(&RemoveWire::Service(IdPayload { id }))?,
        };
        Ok(json)
    }

    /// Serialize and base64-encode the event.
    ///
    /// # Errors
    ///
    /// Will fail if the event cannot be serialized.
    pub fn encode(&self) -> crate::Result<String> {
        Ok(Base64::encode_string(&self.to_json()?))
    }

    /// Expand bare fragment ids (`#key-1`) into full DID URLs and default empty
    /// controllers to the DID.
    #[must_use]
    pub fn qualify(mut self, did: &Did) -> Self {
        let qualify_method = |vm: &mut VerificationMethod| {
            vm.id = did.qualify(&vm.id);
            if vm.controller.is_empty() {
                vm.controller = did.to_string();
            }
        };
        match &mut self {
            Self::Owner(vm) | Self::AddVerificationMethod(vm) => qualify_method(vm),
            Self::AddRelationship { method, .. } => qualify_method(method),
            Self::AddService(service) => service.id = did.qualify(&service.id),
            Self::RemoveVerificationMethod { id }
            | Self::RemoveRelationship { id, .. }
            | Self::RemoveService { id } => *id = did.qualify(id),
        }
        self
    }
}

#[derive(Deserialize, Serialize)]
enum AddWire {
    #[serde(rename = "DIDOwner")]
    Owner(VerificationMethod),
    VerificationMethod(VerificationMethod),
    VerificationRelationship(RelationshipPayload),
    Service(Service),
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipPayload {
    #[serde(flatten)]
    method: VerificationMethod,
    relationship_type: Relationship,
}

#[derive(Deserialize, Serialize)]
enum RemoveWire {
    VerificationMethod(IdPayload),
    VerificationRelationship(RemoveRelationshipPayload),
    Service(IdPayload),
}

#[derive(Deserialize, Serialize)]
struct IdPayload {
    id: String,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoveRelationshipPayload {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relationship_type: Option<Relationship>,
}

impl From<AddWire> for Event {
    fn from(wire: AddWire) -> Self {
        match wire {
            AddWire::Owner(vm) => Self::Owner(vm),
            AddWire::VerificationMethod(vm) => Self::AddVerificationMethod(vm),
            AddWire::VerificationRelationship(payload) => Self::AddRelationship {
                relationship: payload.relationship_type,
                method: payload.method,
            },
            AddWire::Service(service) => Self::AddService(service),
        }
    }
}

impl From<RemoveWire> for Event {
    fn from(wire: RemoveWire) -> Self {
        match wire {
            RemoveWire::VerificationMethod(IdPayload { id }) => {
                Self::RemoveVerificationMethod { id }
            }
            RemoveWire::VerificationRelationship(payload) => Self::RemoveRelationship {
                id: payload.id,
                relationship: payload.relationship_type,
            },
            RemoveWire::Service(IdPayload { id }) => Self::RemoveService { id },
        }
    }
}
