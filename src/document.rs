//! # DID Document
//!
//! A DID Document is a JSON-LD document that contains information related to a
//! DID.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Kind, OneMany};
use crate::key;

/// Base JSON-LD context for DID documents.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// JSON-LD context for Ed25519 verification keys.
pub const ED25519_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// DID Document
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The context of the DID document. Empty for the plain (non JSON-LD)
    /// representation.
    #[serde(rename = "@context")]
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub context: Vec<Kind<Value>>,

    /// The DID for a particular DID subject.
    pub id: String,

    /// The DID of the entity authorized to make changes to the document.
    /// Defaults to the subject itself.
    pub controller: String,

    /// Verification methods for the DID subject.
    pub verification_method: Vec<VerificationMethod>,

    /// The `authentication` verification relationship is used to specify how
    /// the DID subject is expected to be authenticated.
    ///
    /// <https://www.w3.org/TR/did-core/#authentication>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<Kind<VerificationMethod>>>,

    /// The `assertion_method` verification relationship is used to specify how
    /// the DID subject is expected to express claims.
    ///
    /// <https://www.w3.org/TR/did-core/#assertion>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_method: Option<Vec<Kind<VerificationMethod>>>,

    /// The `key_agreement` verification relationship is used to specify how an
    /// entity can generate encryption material for the DID subject.
    ///
    /// <https://www.w3.org/TR/did-core/#key-agreement>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_agreement: Option<Vec<Kind<VerificationMethod>>>,

    /// The `capability_invocation` verification relationship.
    ///
    /// <https://www.w3.org/TR/did-core/#capability-invocation>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_invocation: Option<Vec<Kind<VerificationMethod>>>,

    /// The `capability_delegation` verification relationship.
    ///
    /// <https://www.w3.org/TR/did-core/#capability-delegation>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_delegation: Option<Vec<Kind<VerificationMethod>>>,

    /// A set of services, that express ways of communicating with the DID
    /// subject or related entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,
}

impl Document {
    /// Retrieve a service by its ID.
    #[must_use]
    pub fn service(&self, id: &str) -> Option<&Service> {
        self.service.as_ref()?.iter().find(|s| s.id == id)
    }

    /// Retrieve a verification method by its ID.
    #[must_use]
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|vm| vm.id == id)
    }

    /// Relationship collections paired with their relationship type.
    #[must_use]
    pub fn relationships(&self) -> Vec<(Relationship, &[Kind<VerificationMethod>])> {
        Relationship::ALL
            .iter()
            .filter_map(|r| {
                let items = match r {
                    Relationship::Authentication => &self.authentication,
                    Relationship::AssertionMethod => &self.assertion_method,
                    Relationship::KeyAgreement => &self.key_agreement,
                    Relationship::CapabilityInvocation => &self.capability_invocation,
                    Relationship::CapabilityDelegation => &self.capability_delegation,
                };
                items.as_deref().map(|items| (*r, items))
            })
            .collect()
    }
}

/// Verification relationships a verification method can be bound to.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Relationship {
    /// `authentication`
    Authentication,

    /// `assertionMethod`
    AssertionMethod,

    /// `keyAgreement`
    KeyAgreement,

    /// `capabilityInvocation`
    CapabilityInvocation,

    /// `capabilityDelegation`
    CapabilityDelegation,
}

impl Relationship {
    /// All relationships, in document order.
    pub const ALL: [Self; 5] = [
        Self::Authentication,
        Self::AssertionMethod,
        Self::KeyAgreement,
        Self::CapabilityInvocation,
        Self::CapabilityDelegation,
    ];

    /// Position of the relationship in [`Relationship::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Authentication => 0,
            Self::AssertionMethod => 1,
            Self::KeyAgreement => 2,
            Self::CapabilityInvocation => 3,
            Self::CapabilityDelegation => 4,
        }
    }
}

/// Services are used to express ways of communicating with the DID subject or
/// associated entities.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// A URI unique to the service.
    pub id: String,

    /// The service type. SHOULD be registered in the DID Specification
    /// Registries.
    #[serde(rename = "type")]
    pub type_: String,

    /// One or more endpoints for the service.
    #[allow(clippy::struct_field_names)]
    pub service_endpoint: OneMany<Kind<Value>>,
}

impl Service {
    /// Create a service with a single URL endpoint.
    #[must_use]
    pub fn new(id: impl Into<String>, type_: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            service_endpoint: OneMany::One(Kind::String(endpoint.into())),
        }
    }
}

/// A verification method, such as a public key, bound to the DID subject.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// A DID URL that identifies the verification method.
    pub id: String,

    /// The type of verification method.
    #[serde(rename = "type")]
    pub type_: MethodType,

    /// The DID of the controller of the verification method.
    pub controller: String,

    /// The format of the public key material.
    #[serde(flatten)]
    pub key: PublicKeyFormat,
}

impl VerificationMethod {
    /// Create an Ed25519 verification method with a multibase key.
    #[must_use]
    pub fn ed25519(id: impl Into<String>, controller: impl Into<String>, key: &VerifyingKey) -> Self {
        Self {
            id: id.into(),
            type_: MethodType::Ed25519VerificationKey2020,
            controller: controller.into(),
            key: PublicKeyFormat::PublicKeyMultibase {
                public_key_multibase: key::to_multibase(key),
            },
        }
    }
}

/// The format of the public key material.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all_fields = "camelCase")]
#[serde(untagged)]
pub enum PublicKeyFormat {
    /// The key is encoded as a Multibase string.
    PublicKeyMultibase {
        /// The public key encoded as a Multibase.
        public_key_multibase: String,
    },

    /// The key is encoded as a bare base58 string.
    PublicKeyBase58 {
        /// The public key encoded as base58.
        public_key_base58: String,
    },
}

impl Default for PublicKeyFormat {
    fn default() -> Self {
        Self::PublicKeyMultibase {
            public_key_multibase: String::new(),
        }
    }
}

impl PublicKeyFormat {
    /// Decode the key material as an Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Will fail if the key is not a valid Ed25519 public key in the declared
    /// encoding.
    pub fn verifying_key(&self) -> anyhow::Result<VerifyingKey> {
        match self {
            Self::PublicKeyMultibase { public_key_multibase } => {
                key::from_multibase(public_key_multibase)
            }
            Self::PublicKeyBase58 { public_key_base58 } => key::from_base58(public_key_base58),
        }
    }
}

/// Verification method types supported by this library.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub enum MethodType {
    /// `ED25519` Verification key, version 2018.
    Ed25519VerificationKey2018,

    /// `ED25519` Verification key, version 2020.
    #[default]
    Ed25519VerificationKey2020,

    /// `X25519` Key Agreement Key, version 2019.
    X25519KeyAgreementKey2019,

    /// Secp256k1 Verification Key, version 2019.
    EcdsaSecp256k1VerificationKey2019,

    /// Generic Multi-key format.
    Multikey,
}

impl Display for MethodType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519VerificationKey2018 => write!(f, "Ed25519VerificationKey2018"),
            Self::Ed25519VerificationKey2020 => write!(f, "Ed25519VerificationKey2020"),
            Self::X25519KeyAgreementKey2019 => write!(f, "X25519KeyAgreementKey2019"),
            Self::EcdsaSecp256k1VerificationKey2019 => {
                write!(f, "EcdsaSecp256k1VerificationKey2019")
            }
            Self::Multikey => write!(f, "Multikey"),
        }
    }
}

/// DID document metadata. This typically does not change unless the DID
/// document changes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::module_name_repetitions)]
pub struct DocumentMetadata {
    /// Consensus timestamp of the entry that created the DID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Consensus timestamp of the last applied entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    /// `true` once the DID has been deactivated.
    pub deactivated: bool,
}
