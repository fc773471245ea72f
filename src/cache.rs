//! # Message Cache
//!
//! Read-through cache for topic descriptors, topic messages and files
//! reassembled from topic messages.
//!
//! Entries are keyed by `(ledger, kind, topic)`. The message list is cached
//! "to date": a read up to time `T` only fetches the window between the last
//! cached message and `T + ε` from the ledger, then merges it into the cached
//! list.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::transport;
use crate::provider::{Client, TopicInfo, TopicMessage};

/// Byte store backing a [`MessageCache`].
pub trait CacheStore: Send + Sync {
    /// Get the value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = anyhow::Result<Option<Vec<u8>>>> + Send;

    /// Store `value` under `key`.
    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Remove the value stored under `key`.
    fn remove(&self, key: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// In-memory [`CacheStore`]. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Kinds of cached resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// Topic descriptor.
    Info,

    /// Topic messages.
    Messages,

    /// File reassembled from topic messages.
    File,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Messages => write!(f, "messages"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Cache configuration.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheOptions {
    /// Margin added to the requested read time, in milliseconds, to absorb
    /// clock skew between the caller and the ledger.
    pub epsilon_ms: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { epsilon_ms: 1_000 }
    }
}

/// Read-through cache over a ledger's topics.
#[derive(Clone, Debug)]
pub struct MessageCache<S = MemoryStore> {
    ledger_id: String,
    store: S,
    options: CacheOptions,
}

impl<S: CacheStore> MessageCache<S> {
    /// Create a cache for `ledger_id` backed by `store`.
    #[must_use]
    pub fn new(ledger_id: impl Into<String>, store: S, options: CacheOptions) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            store,
            options,
        }
    }

    /// Storage key for a resource.
    #[must_use]
    pub fn key(&self, kind: ResourceKind, topic_id: &str) -> String {
        format!("{}:{kind}:{topic_id}", self.ledger_id)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> crate::Result<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            debug!("cache miss: {key}");
            return Ok(None);
        };
        debug!("cache hit: {key}");
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> crate::Result<()> {
        self.store.set(key, serde_json::to_vec(value)?).await?;
        Ok(())
    }

    /// Cached topic descriptor.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails or holds an unreadable value.
    pub async fn info(&self, topic_id: &str) -> crate::Result<Option<TopicInfo>> {
        self.get_json(&self.key(ResourceKind::Info, topic_id)).await
    }

    /// Cache a topic descriptor. Cached messages and file for the topic are
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails.
    pub async fn set_info(&self, topic_id: &str, info: &TopicInfo) -> crate::Result<()> {
        let key = self.key(ResourceKind::Info, topic_id);
        self.store.remove(&key).await?;
        self.set_json(&key, info).await?;
        self.store.remove(&self.key(ResourceKind::Messages, topic_id)).await?;
        self.store.remove(&self.key(ResourceKind::File, topic_id)).await?;
        Ok(())
    }

    /// Remove a cached topic descriptor.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails.
    pub async fn remove_info(&self, topic_id: &str) -> crate::Result<()> {
        self.store.remove(&self.key(ResourceKind::Info, topic_id)).await?;
        Ok(())
    }

    /// Cached messages, without consulting the ledger.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails or holds an unreadable value.
    pub async fn cached_messages(&self, topic_id: &str) -> crate::Result<Vec<TopicMessage>> {
        Ok(self.get_json(&self.key(ResourceKind::Messages, topic_id)).await?.unwrap_or_default())
    }

    /// Replace the cached messages. The cached file for the topic is
    /// invalidated.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails.
    pub async fn set_messages(&self, topic_id: &str, messages: &[TopicMessage]) -> crate::Result<()> {
        self.set_json(&self.key(ResourceKind::Messages, topic_id), &messages).await?;
        self.store.remove(&self.key(ResourceKind::File, topic_id)).await?;
        Ok(())
    }

    /// Messages with consensus timestamps up to `to + ε`, fetching only what
    /// is not cached yet.
    ///
    /// # Errors
    ///
    /// Will fail with `Transport` if the ledger read fails, or if the store
    /// fails.
    pub async fn messages<C: Client>(
        &self, client: &C, topic_id: &str, to: DateTime<Utc>,
    ) -> crate::Result<Vec<TopicMessage>> {
        let horizon = to
            .checked_add_signed(TimeDelta::milliseconds(i64::from(self.options.epsilon_ms)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let cached = self.cached_messages(topic_id).await?;

        let last = cached.last().map(|m| m.consensus_timestamp);
        if last.is_some_and(|last| last >= horizon) {
            debug!("messages for {topic_id} cached past {horizon}");
            return Ok(cached.into_iter().filter(|m| m.consensus_timestamp <= horizon).collect());
        }

        let fetched =
            client.read_messages(topic_id, last, Some(horizon)).await.map_err(transport)?;
        debug!("fetched {} messages for {topic_id} since {last:?}", fetched.len());

        let merged = merge(cached, fetched);
        self.set_messages(topic_id, &merged).await?;
        Ok(merged.into_iter().filter(|m| m.consensus_timestamp <= horizon).collect())
    }

    /// Cached file contents.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails.
    pub async fn file(&self, topic_id: &str) -> crate::Result<Option<Vec<u8>>> {
        Ok(self.store.get(&self.key(ResourceKind::File, topic_id)).await?)
    }

    /// Cache file contents.
    ///
    /// # Errors
    ///
    /// Will fail if the store fails.
    pub async fn set_file(&self, topic_id: &str, contents: &[u8]) -> crate::Result<()> {
        self.store.set(&self.key(ResourceKind::File, topic_id), contents.to_vec()).await?;
        Ok(())
    }
}

/// Merge two message lists, keeping the first message seen for each
/// consensus timestamp, sorted by timestamp.
#[must_use]
pub fn merge(cached: Vec<TopicMessage>, fetched: Vec<TopicMessage>) -> Vec<TopicMessage> {
    let mut merged = BTreeMap::new();
    for message in cached.into_iter().chain(fetched) {
        merged.entry(message.consensus_timestamp).or_insert(message);
    }
    merged.into_values().collect()
}
