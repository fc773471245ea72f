//! # HCS-1 Files
//!
//! Large payloads stored on a topic as an ordered set of small messages.
//!
//! The payload is zstd-compressed, base64-encoded and prefixed with a data URI
//! marker, then split into fixed-size windows. Each window is submitted as
//! `{"o": <index>, "c": "<content>"}`. The topic memo carries the SHA-256 of
//! the uncompressed payload (`<hex>:zstd:base64`) and the topic has no admin
//! key, so the file cannot be changed once written.
//!
//! Chunks are submitted one at a time with no rollback: an upload that fails
//! part way leaves a topic that does not reassemble. [`FileMessage`] records
//! how many chunks were submitted, so processing the same message again
//! continues from the first missing chunk.

use std::sync::LazyLock;

use base64ct::{Base64, Encoding};
use chrono::Utc;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, MessageCache};
use crate::envelope::Operation;
use crate::error::{Context, Err, transport};
use crate::lifecycle::{Lifecycle, Message, Options, Status};
use crate::provider::{Client, TopicCreate, TopicInfo, TopicMessage};
use crate::tracerr;

/// Bytes of encoded payload per chunk.
pub const CHUNK_SIZE: usize = 960;

/// Default payload media type.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static MEMO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Fa-f0-9]{64}:zstd:base64$").expect("should compile"));

/// Encoding options.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Hcs1Options {
    /// Bytes of encoded payload per chunk.
    pub chunk_size: usize,

    /// Media type recorded in the data URI marker.
    pub mime_type: String,
}

impl Default for Hcs1Options {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
        }
    }
}

/// A single chunk message.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk order.
    pub o: usize,

    /// Chunk content.
    pub c: String,
}

/// Topic memo for a payload: `<hex sha256>:zstd:base64`.
#[must_use]
pub fn memo(payload: &[u8]) -> String {
    format!("{}:zstd:base64", hex::encode(Sha256::digest(payload)))
}

/// Split a payload into chunks.
///
/// # Errors
///
/// Will fail with `InvalidInput` if the chunk size is zero or the media type is
/// not ASCII, or if compression fails.
pub fn encode(payload: &[u8], options: &Hcs1Options) -> crate::Result<Vec<Chunk>> {
    if options.chunk_size == 0 || !options.mime_type.is_ascii() {
        tracerr!(Err::InvalidInput, "invalid chunk size or media type");
    }
    let compressed = zstd::encode_all(payload, 0)?;
    let data = format!("data:{};base64,{}", options.mime_type, Base64::encode_string(&compressed));

    // the data URI is ASCII, so byte windows are valid UTF-8
    let chunks = data
        .as_bytes()
        .chunks(options.chunk_size)
        .enumerate()
        .map(|(o, window)| Chunk {
            o,
            c: String::from_utf8_lossy(window).into_owned(),
        })
        .collect();
    Ok(chunks)
}

/// Reassemble and verify a payload from its chunks and topic memo.
///
/// # Errors
///
/// Will fail with `IntegrityFailure` if the memo is malformed, the chunks do
/// not decode, or the payload hash does not match the memo.
pub fn decode(mut chunks: Vec<Chunk>, memo: &str) -> crate::Result<Vec<u8>> {
    if !MEMO_REGEX.is_match(memo) {
        tracerr!(Err::IntegrityFailure, "invalid file topic memo: {memo}");
    }
    let Some((expected, _)) = memo.split_once(':') else {
        tracerr!(Err::IntegrityFailure, "invalid file topic memo: {memo}");
    };

    chunks.sort_by_key(|chunk| chunk.o);
    chunks.dedup_by_key(|chunk| chunk.o);
    let data = chunks.into_iter().map(|chunk| chunk.c).collect::<String>();

    let Some(encoded) = data.strip_prefix("data:").and_then(|d| d.split_once(";base64,")) else {
        tracerr!(Err::IntegrityFailure, "file is missing its data URI marker");
    };
    let compressed = Base64::decode_vec(encoded.1).context(Err::IntegrityFailure)?;
    let payload = zstd::decode_all(compressed.as_slice()).context(Err::IntegrityFailure)?;

    if !hex::encode(Sha256::digest(&payload)).eq_ignore_ascii_case(expected) {
        tracerr!(Err::IntegrityFailure, "file hash does not match topic memo");
    }
    Ok(payload)
}

/// Reassemble a file from raw topic messages and the topic descriptor.
///
/// # Errors
///
/// Will fail with `IntegrityFailure` if the topic has an admin key or the file
/// does not verify.
pub fn assemble(messages: &[TopicMessage], info: &TopicInfo) -> crate::Result<Vec<u8>> {
    if info.admin_key.is_some() {
        tracerr!(Err::IntegrityFailure, "file topic {} has an admin key", info.topic_id);
    }
    let chunks = messages
        .iter()
        .filter_map(|message| match serde_json::from_slice::<Chunk>(&message.contents) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                debug!("skipping non-chunk message {}: {e}", message.sequence_number);
                None
            }
        })
        .collect();
    decode(chunks, &info.memo)
}

/// A file on its way to a new topic.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMessage {
    /// Topic memo.
    pub memo: String,

    /// Chunks to submit.
    pub chunks: Vec<Chunk>,

    /// File topic, once created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,

    /// Number of chunks submitted so far.
    pub submitted: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<Vec<u8>>,
}

impl FileMessage {
    /// Prepare a payload for upload.
    ///
    /// # Errors
    ///
    /// As [`encode`].
    pub fn new(payload: &[u8], options: &Hcs1Options) -> crate::Result<Self> {
        Ok(Self {
            memo: memo(payload),
            chunks: encode(payload, options)?,
            topic_id: None,
            submitted: 0,
            signature: None,
        })
    }
}

impl Message for FileMessage {
    fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(self.memo.as_bytes().to_vec())
    }

    fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = Some(signature);
    }

    fn topic_id(&self) -> Option<&str> {
        self.topic_id.as_deref()
    }

    fn operation(&self) -> Operation {
        Operation::Create
    }

    fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Create the file topic, then submit chunks in order.
///
/// A failed run ends with [`Status::Error`] and a message recording its
/// progress; processing that message again picks up where it stopped.
#[must_use]
pub fn upload_lifecycle<C: Client + 'static>() -> Lifecycle<FileMessage, C> {
    Lifecycle::builder()
        .callback(create_topic::<C>)
        .callback(submit_chunks::<C>)
        .catch(|e| warn!("file upload failed: {e}"))
        .build()
}

fn create_topic<'a, C: Client>(
    message: &'a mut FileMessage, client: &'a C,
) -> BoxFuture<'a, crate::Result<()>> {
    Box::pin(async move {
        if message.topic_id.is_some() {
            return Ok(());
        }
        let request = TopicCreate {
            memo: message.memo.clone(),
            admin_key: None,
            submit_key: None,
        };
        message.topic_id = Some(client.create_topic(request).await.map_err(transport)?);
        Ok(())
    })
}

fn submit_chunks<'a, C: Client>(
    message: &'a mut FileMessage, client: &'a C,
) -> BoxFuture<'a, crate::Result<()>> {
    Box::pin(async move {
        let Some(topic_id) = message.topic_id.clone() else {
            tracerr!(Err::InvalidInput, "file has no topic");
        };
        while message.submitted < message.chunks.len() {
            let chunk = serde_json::to_vec(&message.chunks[message.submitted])?;
            client.submit_message(&topic_id, &chunk).await.map_err(transport)?;
            message.submitted += 1;
        }
        info!("uploaded {} chunks to {topic_id}", message.chunks.len());
        Ok(())
    })
}

/// Upload a payload to a new topic, returning the topic id.
///
/// # Errors
///
/// Will fail with `Transport` if the ledger rejects a request.
pub async fn upload<C: Client + 'static>(
    client: &C, payload: &[u8], options: &Hcs1Options,
) -> crate::Result<String> {
    let message = FileMessage::new(payload, options)?;
    let state = upload_lifecycle().process(message, Options::new(client), None).await?;
    match (state.status, state.message.topic_id) {
        (Status::Success, Some(topic_id)) => Ok(topic_id),
        _ => tracerr!(Err::Transport, "file upload did not complete"),
    }
}

/// Read and verify the file stored on a topic.
///
/// # Errors
///
/// Will fail with `Transport` if the ledger cannot be read and with
/// `IntegrityFailure` if the file does not verify.
pub async fn read_file<C: Client>(client: &C, topic_id: &str) -> crate::Result<Vec<u8>> {
    let info = client.topic_info(topic_id).await.map_err(transport)?;
    let messages = client.read_messages(topic_id, None, None).await.map_err(transport)?;
    assemble(&messages, &info)
}

/// Read and verify the file stored on a topic through `cache`.
///
/// # Errors
///
/// As [`read_file`], or if the cache store fails.
pub async fn read_file_cached<C: Client, S: CacheStore>(
    client: &C, topic_id: &str, cache: &MessageCache<S>,
) -> crate::Result<Vec<u8>> {
    if let Some(file) = cache.file(topic_id).await? {
        return Ok(file);
    }

    let info = if let Some(info) = cache.info(topic_id).await? {
        info
    } else {
        let info = client.topic_info(topic_id).await.map_err(transport)?;
        cache.set_info(topic_id, &info).await?;
        info
    };
    let messages = cache.messages(client, topic_id, Utc::now()).await?;
    let file = assemble(&messages, &info)?;
    cache.set_file(topic_id, &file).await?;
    Ok(file)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = (0..10_000u32).flat_map(u32::to_le_bytes).collect::<Vec<_>>();
        let chunks = encode(&payload, &Hcs1Options::default()).unwrap();
        assert!(chunks.iter().all(|chunk| chunk.c.len() <= CHUNK_SIZE));
        assert!(chunks[0].c.starts_with("data:application/octet-stream;base64,"));

        // order on the topic does not matter
        let mut shuffled = chunks;
        shuffled.reverse();
        assert_eq!(decode(shuffled, &memo(&payload)).unwrap(), payload);
    }

    #[test]
    fn empty_payload() {
        let chunks = encode(b"", &Hcs1Options::default()).unwrap();
        assert_eq!(decode(chunks, &memo(b"")).unwrap(), b"");
    }

    #[test]
    fn small_chunks() {
        let options = Hcs1Options {
            chunk_size: 7,
            mime_type: "text/plain".into(),
        };
        let chunks = encode(b"hello world", &options).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks.iter().map(|chunk| chunk.o).collect::<Vec<_>>(), (0..chunks.len()).collect::<Vec<_>>());
        assert_eq!(decode(chunks, &memo(b"hello world")).unwrap(), b"hello world");
    }

    #[test]
    fn memo_checks() {
        let chunks = encode(b"payload", &Hcs1Options::default()).unwrap();

        let err = decode(chunks.clone(), "not-a-memo").expect_err("should fail");
        assert!(err.is(Err::IntegrityFailure));

        let err = decode(chunks, &memo(b"other payload")).expect_err("should fail");
        assert!(err.is(Err::IntegrityFailure));
    }

    #[test]
    fn corrupt_chunk() {
        let payload = vec![42u8; 4096];
        let mut chunks = encode(&payload, &Hcs1Options::default()).unwrap();
        chunks[0].c = chunks[0].c.replace("base64,", "base64,AAAA");
        let err = decode(chunks, &memo(&payload)).expect_err("should fail");
        assert!(err.is(Err::IntegrityFailure));
    }

    #[test]
    fn admin_key_rejected() {
        let info = TopicInfo {
            topic_id: "0.0.3".into(),
            memo: memo(b"x"),
            admin_key: Some("z6Mk".into()),
            submit_key: None,
        };
        let err = assemble(&[], &info).expect_err("should fail");
        assert!(err.is(Err::IntegrityFailure));
    }
}
