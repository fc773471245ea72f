use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use vercre_didhcs::provider::{Client, Receipt, TopicCreate, TopicInfo, TopicMessage};

// 2024-01-01T00:00:00Z
const GENESIS: i64 = 1_704_067_200;

/// In-memory ledger. Each submitted message is stamped one second after the
/// previous one. Clones share the same topics.
#[derive(Clone, Debug)]
pub struct Ledger {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    network: String,
    topics: DashMap<String, Topic>,
    next_topic: AtomicU64,
    clock: AtomicI64,
    reads: AtomicUsize,
    submissions: AtomicUsize,
    fail_after: AtomicUsize,
}

#[derive(Debug)]
struct Topic {
    info: TopicInfo,
    messages: Vec<TopicMessage>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new("testnet")
    }
}

impl Ledger {
    #[must_use]
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                network: network.into(),
                topics: DashMap::new(),
                next_topic: AtomicU64::new(1000),
                clock: AtomicI64::new(0),
                reads: AtomicUsize::new(0),
                submissions: AtomicUsize::new(0),
                fail_after: AtomicUsize::new(usize::MAX),
            }),
        }
    }

    /// Consensus time of the most recent message.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        stamp(self.inner.clock.load(Ordering::SeqCst))
    }

    /// Number of `read_messages` calls served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Reject every submission after the next `n`.
    pub fn fail_after(&self, n: usize) {
        let submitted = self.inner.submissions.load(Ordering::SeqCst);
        self.inner.fail_after.store(submitted + n, Ordering::SeqCst);
    }

    /// Accept submissions again.
    pub fn recover(&self) {
        self.inner.fail_after.store(usize::MAX, Ordering::SeqCst);
    }

    /// All messages on a topic.
    #[must_use]
    pub fn messages(&self, topic_id: &str) -> Vec<TopicMessage> {
        self.inner.topics.get(topic_id).map(|t| t.messages.clone()).unwrap_or_default()
    }

    /// Append a message with an explicit consensus timestamp, keeping the
    /// topic in timestamp order.
    pub fn append_at(&self, topic_id: &str, timestamp: DateTime<Utc>, contents: &[u8]) {
        let mut topic = self.topic_mut(topic_id);
        let sequence_number = topic.messages.len() as u64 + 1;
        topic.messages.push(TopicMessage {
            consensus_timestamp: timestamp,
            sequence_number,
            contents: contents.to_vec(),
        });
        topic.messages.sort_by_key(|m| m.consensus_timestamp);
    }

    /// Overwrite the contents of a message.
    pub fn tamper(&self, topic_id: &str, sequence_number: u64, contents: &[u8]) {
        let mut topic = self.topic_mut(topic_id);
        if let Some(message) =
            topic.messages.iter_mut().find(|m| m.sequence_number == sequence_number)
        {
            message.contents = contents.to_vec();
        }
    }

    /// Replace a topic's descriptor fields.
    pub fn update_info(&self, topic_id: &str, memo: Option<&str>, admin_key: Option<&str>) {
        let mut topic = self.topic_mut(topic_id);
        if let Some(memo) = memo {
            topic.info.memo = memo.to_string();
        }
        topic.info.admin_key = admin_key.map(ToString::to_string);
    }

    fn topic_mut(&self, topic_id: &str) -> dashmap::mapref::one::RefMut<'_, String, Topic> {
        self.inner.topics.entry(topic_id.to_string()).or_insert_with(|| Topic {
            info: TopicInfo {
                topic_id: topic_id.to_string(),
                ..TopicInfo::default()
            },
            messages: Vec::new(),
        })
    }
}

fn stamp(tick: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(GENESIS, 0).unwrap_or_default() + TimeDelta::seconds(tick)
}

impl Client for Ledger {
    fn ledger_id(&self) -> String {
        self.inner.network.clone()
    }

    async fn create_topic(&self, request: TopicCreate) -> Result<String> {
        let topic_id = format!("0.0.{}", self.inner.next_topic.fetch_add(1, Ordering::SeqCst));
        let topic = Topic {
            info: TopicInfo {
                topic_id: topic_id.clone(),
                memo: request.memo,
                admin_key: request.admin_key,
                submit_key: request.submit_key,
            },
            messages: Vec::new(),
        };
        self.inner.topics.insert(topic_id.clone(), topic);
        Ok(topic_id)
    }

    async fn submit_message(&self, topic_id: &str, message: &[u8]) -> Result<Receipt> {
        let submitted = self.inner.submissions.fetch_add(1, Ordering::SeqCst);
        if submitted >= self.inner.fail_after.load(Ordering::SeqCst) {
            bail!("submission rejected");
        }

        let mut topic =
            self.inner.topics.get_mut(topic_id).ok_or_else(|| anyhow!("unknown topic {topic_id}"))?;
        let tick = self.inner.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let sequence_number = topic.messages.len() as u64 + 1;
        topic.messages.push(TopicMessage {
            consensus_timestamp: stamp(tick),
            sequence_number,
            contents: message.to_vec(),
        });

        Ok(Receipt {
            topic_id: topic_id.to_string(),
            sequence_number,
        })
    }

    async fn read_messages(
        &self, topic_id: &str, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TopicMessage>> {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        let topic =
            self.inner.topics.get(topic_id).ok_or_else(|| anyhow!("unknown topic {topic_id}"))?;
        Ok(topic
            .messages
            .iter()
            .filter(|m| from.map_or(true, |from| m.consensus_timestamp >= from))
            .filter(|m| to.map_or(true, |to| m.consensus_timestamp <= to))
            .cloned()
            .collect())
    }

    async fn topic_info(&self, topic_id: &str) -> Result<TopicInfo> {
        let topic =
            self.inner.topics.get(topic_id).ok_or_else(|| anyhow!("unknown topic {topic_id}"))?;
        Ok(topic.info.clone())
    }
}
