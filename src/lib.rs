//! # DID over Consensus Topics
//!
//! A DID method layered on an append-only, consensus-ordered topic log. The
//! DID document is the result of replaying the signed entries on the DID's
//! topic; only holders of the owner key can extend it.
//!
//! - [`builder`] replays log entries into a document.
//! - [`lifecycle`] sequences signing and publication of new entries, with
//!   support for pausing while a signature is produced elsewhere.
//! - [`cache`] and [`wait`] bridge writes with the ledger's eventually
//!   consistent read side.
//! - [`hcs1`] stores large payloads as chunked topic messages.

pub mod builder;
pub mod cache;
pub mod core;
pub mod did;
pub mod document;
pub mod envelope;
pub mod error;
pub mod event;
pub mod hcs1;
pub mod key;
pub mod lifecycle;
pub mod provider;
pub mod resolve;
pub mod resolver;
pub mod url;
pub mod wait;

pub use self::builder::{DocumentBuilder, build};
pub use self::did::Did;
pub use self::document::{Document, DocumentMetadata, Service, VerificationMethod};
pub use self::envelope::{LogEntry, Operation};
pub use self::error::Error;
pub use self::event::Event;
pub use self::provider::{Client, Signer, Verifier};
pub use self::resolve::{Resolved, Resource};
pub use self::resolver::Resolver;

/// Result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
