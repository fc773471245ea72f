//! # DID Resolution
//!
//! Resolution results and DID URL dereferencing against an already-built
//! document.
//!
//! See [DID resolution](https://www.w3.org/TR/did-core/#did-resolution) for more.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Kind, OneMany};
use crate::document::{Document, DocumentMetadata, Service, VerificationMethod};
use crate::error::Err;
use crate::tracerr;
use crate::url::Url;

/// Context used for resolution results.
pub const RESOLUTION_CONTEXT: &str = "https://w3id.org/did-resolution/v1";

/// Returned when resolving a DID.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resolved {
    /// The DID resolution context.
    #[serde(rename = "@context")]
    pub context: String,

    /// Resolution metadata.
    pub metadata: Metadata,

    /// The DID document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,

    /// DID document metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_metadata: Option<DocumentMetadata>,
}

impl Resolved {
    /// Wrap a document and its metadata.
    #[must_use]
    pub fn new(document: Document, document_metadata: DocumentMetadata) -> Self {
        Self {
            context: RESOLUTION_CONTEXT.to_string(),
            metadata: Metadata::default(),
            document: Some(document),
            document_metadata: Some(document_metadata),
        }
    }

    /// Dereference a DID URL against the resolved document.
    ///
    /// # Errors
    ///
    /// Will fail with `NotFound` if nothing was resolved or the resource is not
    /// in the document, with `Deactivated` if the DID has been deactivated and
    /// with `Unsupported` for unsupported query parameters or endpoint shapes.
    pub fn dereference(&self, url: &Url) -> crate::Result<Resource> {
        let Some(document) = &self.document else {
            tracerr!(Err::NotFound, "no document resolved for {}", url.did);
        };
        if self.document_metadata.as_ref().is_some_and(|m| m.deactivated) {
            tracerr!(Err::Deactivated, "{} has been deactivated", url.did);
        }
        dereference(document, url)
    }
}

/// Resource represents the DID document resource returned as a result of DID
/// dereferencing. The resource is a DID document or a subset of a DID document.
#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Resource {
    ///  DID `Document` resource.
    Document(Document),

    /// `VerificationMethod` resource.
    VerificationMethod(VerificationMethod),

    /// `Service` resource.
    Service(Service),

    /// A service endpoint URL selected with the `service` query parameter.
    ServiceEndpoint(String),
}

/// Resolution metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// The Media Type of the returned resource.
    pub content_type: ContentType,

    /// The error code from the resolution process, if applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// A human-readable explanation of the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// The Media Type of the returned resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ContentType {
    /// JSON-LD representation of a DID document.
    #[default]
    #[serde(rename = "application/did+ld+json")]
    DidLdJson,
}

/// Get a resource from a DID document.
///
/// A fragment selects a verification method, relationship entry or service
/// whose id ends with `#<fragment>`. A `service` query parameter selects a
/// service endpoint, with `relativeRef` appended when present. A URL with
/// neither returns the whole document.
///
/// # Errors
///
/// Will fail with `NotFound` if the resource is not in the document and with
/// `Unsupported` for the `hl`, `versionId` and `versionTime` parameters or for
/// service endpoints that are not a single string.
pub fn dereference(document: &Document, url: &Url) -> crate::Result<Resource> {
    if let Some(query) = &url.query {
        if query.hashlink.is_some() || query.version_id.is_some() || query.version_time.is_some() {
            tracerr!(Err::Unsupported, "versioned and hashlinked DID URLs are not supported: {url}");
        }
        if let Some(service_id) = &query.service {
            return service_endpoint(document, url, service_id, query.relative_ref.as_deref());
        }
    }

    let Some(fragment) = &url.fragment else {
        return Ok(Resource::Document(document.clone()));
    };
    let suffix = format!("#{fragment}");

    if let Some(vm) = document.verification_method.iter().find(|vm| vm.id.ends_with(&suffix)) {
        return Ok(Resource::VerificationMethod(vm.clone()));
    }
    for (_, items) in document.relationships() {
        for item in items {
            if let Kind::Object(vm) = item {
                if vm.id.ends_with(&suffix) {
                    return Ok(Resource::VerificationMethod(vm.clone()));
                }
            }
        }
    }
    if let Some(service) =
        document.service.iter().flatten().find(|service| service.id.ends_with(&suffix))
    {
        return Ok(Resource::Service(service.clone()));
    }

    tracerr!(Err::NotFound, "{url} not found in document")
}

fn service_endpoint(
    document: &Document, url: &Url, service_id: &str, relative_ref: Option<&str>,
) -> crate::Result<Resource> {
    let id = url.did.qualify(&format!("#{}", service_id.trim_start_matches('#')));
    let Some(service) = document.service(&id) else {
        tracerr!(Err::NotFound, "service {service_id} not found in document");
    };

    let endpoint = match &service.service_endpoint {
        OneMany::One(Kind::String(endpoint)) => endpoint,
        OneMany::One(Kind::Object(Value::String(endpoint))) => endpoint,
        _ => tracerr!(Err::Unsupported, "service {service_id} endpoint is not a single URL"),
    };

    let mut endpoint = endpoint.clone();
    if let Some(relative) = relative_ref {
        endpoint.push_str(relative);
    }
    Ok(Resource::ServiceEndpoint(endpoint))
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    const DID: &str = "did:example:testnet:K_0.0.1";

    fn document() -> Document {
        serde_json::from_value(json!({
            "id": DID,
            "controller": DID,
            "verificationMethod": [{
                "id": format!("{DID}#did-root-key"),
                "type": "Ed25519VerificationKey2020",
                "controller": DID,
                "publicKeyMultibase": "z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"
            }],
            "authentication": [format!("{DID}#did-root-key")],
            "keyAgreement": [{
                "id": format!("{DID}#kx"),
                "type": "X25519KeyAgreementKey2019",
                "controller": DID,
                "publicKeyBase58": "JhNWeSVLMYccCk7iopQW4guaSJTojqpMEELgSLhKwRr"
            }],
            "service": [
                {"id": format!("{DID}#agent"), "type": "Agent", "serviceEndpoint": "https://agent.example.com"},
                {"id": format!("{DID}#many"), "type": "Agent", "serviceEndpoint": ["https://a.com", "https://b.com"]},
                {"id": format!("{DID}#obj"), "type": "Agent", "serviceEndpoint": {"uri": "https://a.com"}}
            ]
        }))
        .expect("should deserialize")
    }

    fn deref(url: &str) -> crate::Result<Resource> {
        dereference(&document(), &Url::from_str(url).expect("should parse"))
    }

    #[test]
    fn fragment() {
        let Resource::VerificationMethod(vm) = deref(&format!("{DID}#did-root-key")).unwrap() else {
            panic!("should be a verification method");
        };
        assert_eq!(vm.id, format!("{DID}#did-root-key"));

        let Resource::VerificationMethod(vm) = deref(&format!("{DID}#kx")).unwrap() else {
            panic!("should be an embedded relationship method");
        };
        assert_eq!(vm.id, format!("{DID}#kx"));

        let Resource::Service(service) = deref(&format!("{DID}#agent")).unwrap() else {
            panic!("should be a service");
        };
        assert_eq!(service.type_, "Agent");

        let err = deref(&format!("{DID}#missing")).expect_err("should fail");
        assert!(err.is(Err::NotFound));
    }

    #[test]
    fn whole_document() {
        assert!(matches!(deref(DID).unwrap(), Resource::Document(_)));
    }

    #[test]
    fn service_query() {
        let resource = deref(&format!("{DID}?service=agent&relativeRef=%2Fpath")).unwrap();
        assert_eq!(resource, Resource::ServiceEndpoint("https://agent.example.com/path".into()));

        let err = deref(&format!("{DID}?service=many")).expect_err("should fail");
        assert!(err.is(Err::Unsupported));
        let err = deref(&format!("{DID}?service=obj")).expect_err("should fail");
        assert!(err.is(Err::Unsupported));
        let err = deref(&format!("{DID}?service=nope")).expect_err("should fail");
        assert!(err.is(Err::NotFound));
    }

    #[test]
    fn unsupported_parameters() {
        for query in ["hl=abc", "versionId=1", "versionTime=2024-01-01T00:00:00Z"] {
            let err = deref(&format!("{DID}?{query}")).expect_err("should fail");
            assert!(err.is(Err::Unsupported), "{query}");
        }
    }

    #[test]
    fn resolved_without_document() {
        let resolved = Resolved::default();
        let url = Url::from_str(&format!("{DID}#agent")).unwrap();
        let err = resolved.dereference(&url).expect_err("should fail");
        assert!(err.is(Err::NotFound));
    }

    #[test]
    fn deactivated() {
        let metadata = DocumentMetadata {
            deactivated: true,
            ..DocumentMetadata::default()
        };
        let resolved = Resolved::new(document(), metadata);
        let url = Url::from_str(&format!("{DID}#agent")).unwrap();
        let err = resolved.dereference(&url).expect_err("should fail");
        assert!(err.is(Err::Deactivated));
    }
}
