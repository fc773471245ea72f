//! # Resolver
//!
//! Resolves DIDs by reading the DID's topic, optionally through a
//! [`MessageCache`], and replaying its entries with the document builder.

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::builder::DocumentBuilder;
use crate::cache::{CacheOptions, CacheStore, MemoryStore, MessageCache};
use crate::did::Did;
use crate::document::Document;
use crate::error::transport;
use crate::provider::{Client, TopicMessage};
use crate::resolve::{Resolved, Resource};
use crate::url::Url;
use crate::wait::{WaitOptions, wait_for};

/// Resolver configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverOptions {
    /// Polling used by [`Resolver::resolve_when`].
    pub wait: WaitOptions,

    /// Message cache settings.
    pub cache: CacheOptions,
}

/// DID resolver over a ledger client.
pub struct Resolver<C, S = MemoryStore> {
    client: C,
    cache: Option<MessageCache<S>>,
    options: ResolverOptions,
}

impl<C: Client> Resolver<C> {
    /// A resolver that reads the full topic on every call.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self {
            client,
            cache: None,
            options: ResolverOptions::default(),
        }
    }

    /// A resolver caching topic messages in memory.
    #[must_use]
    pub fn with_memory_cache(client: C, options: ResolverOptions) -> Self {
        Self::with_cache(client, MemoryStore::new(), options)
    }
}

impl<C: Client, S: CacheStore> Resolver<C, S> {
    /// A resolver caching topic messages in `store`.
    #[must_use]
    pub fn with_cache(client: C, store: S, options: ResolverOptions) -> Self {
        let cache = MessageCache::new(client.ledger_id(), store, options.cache);
        Self {
            client,
            cache: Some(cache),
            options,
        }
    }

    /// The underlying client.
    pub const fn client(&self) -> &C {
        &self.client
    }

    async fn messages(&self, did: &Did) -> crate::Result<Vec<TopicMessage>> {
        match &self.cache {
            Some(cache) => cache.messages(&self.client, &did.topic_id, Utc::now()).await,
            None => {
                self.client.read_messages(&did.topic_id, None, None).await.map_err(transport)
            }
        }
    }

    async fn builder(&self, did: &str) -> crate::Result<DocumentBuilder<'static>> {
        let did = Did::parse(did)?;
        let messages = self.messages(&did).await?;
        let mut builder = DocumentBuilder::new(&did);
        builder.apply_all(messages.iter().map(|m| &m.contents))?;
        Ok(builder)
    }

    /// Resolve a DID to its JSON-LD document and metadata.
    ///
    /// # Errors
    ///
    /// Will fail with `InvalidDid` for a malformed DID, `NotFound` if the topic
    /// holds no valid owner entry and `Transport` if the topic cannot be read.
    pub async fn resolve(&self, did: &str) -> crate::Result<Resolved> {
        self.builder(did).await?.resolution()
    }

    /// Resolve a DID to its plain document.
    ///
    /// # Errors
    ///
    /// As [`Resolver::resolve`].
    pub async fn document(&self, did: &str) -> crate::Result<Document> {
        self.builder(did).await?.document()
    }

    /// Resolve a DID to its CBOR-encoded plain document.
    ///
    /// # Errors
    ///
    /// As [`Resolver::resolve`].
    pub async fn cbor(&self, did: &str) -> crate::Result<Vec<u8>> {
        self.builder(did).await?.cbor()
    }

    /// Dereference a DID URL.
    ///
    /// # Errors
    ///
    /// As [`Resolver::resolve`], and as [`crate::resolve::dereference`].
    pub async fn dereference(&self, did_url: &str) -> crate::Result<Resource> {
        let url = Url::from_str(did_url)?;
        let resolved = self.resolve(&url.did.to_string()).await?;
        resolved.dereference(&url)
    }

    /// Resolve repeatedly until `check` accepts the result, bridging a write
    /// with the ledger's eventually consistent read side.
    ///
    /// # Errors
    ///
    /// Will fail with `Timeout` if `check` does not pass in time.
    pub async fn resolve_when(
        &self, did: &str, check: impl Fn(&Resolved) -> bool,
    ) -> crate::Result<Resolved> {
        wait_for(|| self.resolve(did), check, &self.options.wait).await
    }
}
