//! # Errors
//!
//! Error types used across the crate, including by traits implemented in
//! other crates.
//!
//! Individual log entries that are malformed or carry bad signatures are never
//! surfaced as errors when building a document; they are skipped. The codes
//! below are reserved for structural failures a caller must handle.

use std::fmt::Display;

use thiserror::Error;

/// Log an error with `tracing` and return it, optionally with context.
///
/// # Example
/// ```
/// use vercre_didhcs::error::Err;
/// use vercre_didhcs::{tracerr, Result};
///
/// fn with_msg() -> Result<()> {
///     tracerr!(Err::InvalidInput, "message: {}", "some message")
/// }
///
/// fn no_msg() -> Result<()> {
///     tracerr!(Err::InvalidInput)
/// }
/// ```
#[macro_export]
macro_rules! tracerr {
    // with context
    ($code:expr, $($msg:tt)*) => {
        {
        use $crate::error::Context as _;
        tracing::error!($($msg)*);
        return Err($code).context(format!($($msg)*));
        }
    };
    // no context
    ($code:expr) => {
        {
        tracing::error!("{}", $code);
        return Err($code.into());
        }
    }
}

/// Public error type.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] anyhow::Error);

impl Error {
    /// Render the error as a JSON object with an `error` code and a
    /// human-readable `error_description`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code().map_or_else(|| self.0.root_cause().to_string(), |c| c.to_string()),
            "error_description": self.to_string(),
        })
    }

    /// Returns true if the error was raised with the given code.
    #[must_use]
    pub fn is(&self, err: Err) -> bool {
        self.code() == Some(err)
    }

    /// The typed code for this error, if it was raised with one.
    #[must_use]
    pub fn code(&self) -> Option<Err> {
        self.0
            .downcast_ref::<Err>()
            .or_else(|| self.0.chain().find_map(|e| e.downcast_ref::<Err>()))
            .copied()
    }
}

/// Typed error codes.
#[derive(Clone, Copy, Error, Debug, PartialEq, Eq)]
pub enum Err {
    /// No valid `DIDOwner` entry was ever observed for the requested DID.
    #[error("not_found")]
    NotFound,

    /// A signature failed verification.
    #[error("invalid_signature")]
    InvalidSignature,

    /// A log entry could not be parsed into the expected shape.
    #[error("malformed_entry")]
    MalformedEntry,

    /// The DID has been deactivated.
    #[error("deactivated")]
    Deactivated,

    /// A consistency wait expired before the condition was met.
    #[error("timeout")]
    Timeout,

    /// Checksum, memo or admin key checks on a chunked file failed.
    #[error("integrity_failure")]
    IntegrityFailure,

    /// The caller or configuration broke the protocol, for example an entry
    /// was signed but no verifier could be bound.
    #[error("protocol_violation")]
    ProtocolViolation,

    /// The DID or DID URL is not well formed.
    #[error("invalid_did")]
    InvalidDid,

    /// Invalid input. (See context for details)
    #[error("invalid_input")]
    InvalidInput,

    /// The feature or parameter is not supported.
    #[error("not_supported")]
    Unsupported,

    /// A signing step ran without a signer.
    #[error("missing_signer")]
    MissingSigner,

    /// An external signature step ran without a signature.
    #[error("missing_signature")]
    MissingSignature,

    /// The log transport returned an error.
    #[error("transport_error")]
    Transport,
}

/// Context is used to decorate errors with useful context information.
pub trait Context<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Adds context to the error.
    ///
    /// # Errors
    ///
    /// Original error with context appended.
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T, Error>
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Ok(ok) => Ok(ok),
            Err(e) => Err(Error(anyhow::Error::from(e).context(context))),
        }
    }
}

/// Wrap an error returned by a [`crate::provider::Client`] as a
/// `Transport` error.
pub(crate) fn transport(err: anyhow::Error) -> Error {
    Error(err.context(Err::Transport))
}

impl From<Err> for Error {
    fn from(error: Err) -> Self {
        Self(error.into())
    }
}

impl From<base64ct::Error> for Error {
    fn from(err: base64ct::Error) -> Self {
        Self(anyhow::Error::new(err).context(Err::MalformedEntry))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self(anyhow::Error::new(err).context(Err::MalformedEntry))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::Result;

    #[test]
    fn base_err() {
        let err: Error = Err::IntegrityFailure.into();

        assert_eq!(
            err.to_json(),
            json!({"error":"integrity_failure","error_description":"integrity_failure"})
        );
        assert!(err.is(Err::IntegrityFailure));
    }

    #[test]
    fn context_err() {
        let res: Result<()> = Err(Err::Timeout).context("waited 5s for topic");
        let err = res.expect_err("expected error");

        assert_eq!(
            err.to_json(),
            json!({"error":"timeout","error_description":"waited 5s for topic"})
        );
        assert!(err.is(Err::Timeout));
        assert!(!err.is(Err::NotFound));
    }

    #[test]
    fn macro_err() {
        let Err(e) = run_macro() else {
            panic!("expected error");
        };
        assert_eq!(e.to_string(), "no owner for did:hedera:testnet");
        assert!(e.is(Err::NotFound));
    }

    #[test]
    fn transport_err() {
        let err = transport(anyhow::anyhow!("connection reset"));
        assert!(err.is(Err::Transport));
        assert_eq!(err.to_json()["error"], "transport_error");

        let err: Error = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert_eq!(err.to_json()["error"], "malformed_entry");
    }

    fn run_macro() -> Result<()> {
        tracerr!(Err::NotFound, "no owner for {}", "did:hedera:testnet")
    }
}
