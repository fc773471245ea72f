//! Destructure DID URLs into strongly typed components.
//!
//! A DID URL is of the form
//!
//! `did:<method>:<method-specific-id>[/<path>][?<query>][#<fragment>]`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::did::Did;
use crate::error::{Err, Error};
use crate::tracerr;

/// Structure of a DID URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    /// The DID the URL is relative to.
    pub did: Did,

    /// Path segments, if any.
    pub path: Option<Vec<String>>,

    /// Query.
    ///
    /// If present, the query parameters refine the resolution of the specific
    /// instance (eg. version) of a DID document or other resource defined by a
    /// DID document (for example, a service endpoint).
    pub query: Option<QueryParams>,

    /// Fragment.
    ///
    /// If present, the fragment is a string that corresponds to a specific
    /// resource identifier within a DID document. Typically a service or a
    /// verification method.
    pub fragment: Option<String>,
}

impl Display for Url {
    /// Format the URL as a DID URL string.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.did)?;
        if let Some(path) = &self.path {
            write!(f, "/{}", path.join("/"))?;
        }
        if let Some(query) = &self.query {
            let pairs = query.pairs();
            if !pairs.is_empty() {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                write!(f, "?{encoded}")?;
            }
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl FromStr for Url {
    type Err = Error;

    /// Parse a string if possible into a strongly typed DID URL struct.
    ///
    /// # Errors:
    /// If the string is not a valid format or portions of the string cannot be
    /// de-serialized into the expected types, an error is returned.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, fragment) = match s.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (s, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(QueryParams::parse(query)?)),
            None => (rest, None),
        };
        let (did, path) = match rest.split_once('/') {
            Some((did, path)) => {
                let segments = path
                    .split('/')
                    .filter(|p| !p.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                (did, if segments.is_empty() { None } else { Some(segments) })
            }
            None => (rest, None),
        };

        Ok(Self {
            did: Did::parse(did)?,
            path,
            query,
            fragment,
        })
    }
}

impl Url {
    /// Get the internal resource identifier from the DID URL.
    ///
    /// This is in the form of `<did>#<fragment>` and is used to dereference a
    /// service or verification method that is internal to the DID document.
    #[must_use]
    pub fn resource_id(&self) -> String {
        let mut id = self.did.to_string();
        if let Some(fragment) = &self.fragment {
            id.push('#');
            id.push_str(fragment);
        }
        id
    }
}

/// The DID URL syntax supports parameters in the URL query component. Adding a
/// DID parameter to a DID URL means the parameter becomes part of the
/// identifier for a resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    /// Identifies a service from the DID document by service's ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// A relative URI reference that identifies a resource at a service
    /// endpoint, which is selected from a DID document by using the service
    /// parameter. MUST use URL encoding if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_ref: Option<String>,

    /// Identifies a specific version of a DID document to be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    /// Identifies a version timestamp of a DID document to be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_time: Option<String>,

    /// A resource hash of the DID document to add integrity protection.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "hl")]
    pub hashlink: Option<String>,
}

impl QueryParams {
    fn parse(query: &str) -> crate::Result<Self> {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "service" => params.service = value,
                "relativeRef" | "relative-ref" => params.relative_ref = value,
                "versionId" => params.version_id = value,
                "versionTime" => params.version_time = value,
                "hl" => params.hashlink = value,
                other => tracerr!(Err::Unsupported, "unsupported DID URL parameter: {other}"),
            }
        }
        Ok(params)
    }

    fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("service", &self.service),
            ("relativeRef", &self.relative_ref),
            ("versionId", &self.version_id),
            ("versionTime", &self.version_time),
            ("hl", &self.hashlink),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DID: &str = "did:hedera:testnet:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK_0.0.29613327";

    #[test]
    fn simple_url() {
        let url = Url::from_str(&format!("{DID}#key-1")).unwrap();
        assert_eq!(url.did.topic_id, "0.0.29613327");
        assert_eq!(url.path, None);
        assert_eq!(url.query, None);
        assert_eq!(url.fragment, Some("key-1".to_string()));
        assert_eq!(url.resource_id(), format!("{DID}#key-1"));
        assert_eq!(url.to_string(), format!("{DID}#key-1"));
    }

    #[test]
    fn url_with_query() {
        let url = Url::from_str(&format!("{DID}?service=agent&relativeRef=%2Fpath%3Fa%3D1")).unwrap();
        assert_eq!(
            url.query,
            Some(QueryParams {
                service: Some("agent".to_string()),
                relative_ref: Some("/path?a=1".to_string()),
                ..Default::default()
            })
        );
        assert_eq!(url.fragment, None);
        assert_eq!(url.to_string(), format!("{DID}?service=agent&relativeRef=%2Fpath%3Fa%3D1"));
    }

    #[test]
    fn url_with_the_works() {
        let url = Url::from_str(&format!("{DID}/path/to/resource?service=example&hl=hashlink#key-1"))
            .unwrap();
        assert_eq!(
            url.path,
            Some(vec!["path".to_string(), "to".to_string(), "resource".to_string()])
        );
        assert_eq!(
            url.query,
            Some(QueryParams {
                service: Some("example".to_string()),
                hashlink: Some("hashlink".to_string()),
                ..Default::default()
            })
        );
        assert_eq!(url.resource_id(), format!("{DID}#key-1"));
    }

    #[test]
    fn unknown_parameter() {
        let err = Url::from_str(&format!("{DID}?foo=bar")).expect_err("should fail");
        assert!(err.is(Err::Unsupported));
    }
}
