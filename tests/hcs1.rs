//! Tests for storing files on topics and reading them back.

use test_utils::Ledger;
use vercre_didhcs::cache::{CacheOptions, MemoryStore, MessageCache};
use vercre_didhcs::error::Err;
use vercre_didhcs::hcs1::{self, FileMessage, Hcs1Options};
use vercre_didhcs::lifecycle::{Options, Status};
use vercre_didhcs::provider::Client;

fn payload(len: usize) -> Vec<u8> {
    // low-entropy bytes would compress to a single chunk
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state.to_le_bytes()[0]
        })
        .collect()
}

fn small_chunks() -> Hcs1Options {
    Hcs1Options {
        chunk_size: 64,
        ..Hcs1Options::default()
    }
}

// Upload a file and read it back.
#[tokio::test]
async fn upload_and_read() {
    let ledger = Ledger::default();
    let payload = payload(4_000);

    let topic_id = hcs1::upload(&ledger, &payload, &Hcs1Options::default()).await.expect("should upload");

    let info = ledger.topic_info(&topic_id).await.expect("should have topic");
    assert_eq!(info.memo, hcs1::memo(&payload));
    assert!(info.admin_key.is_none());
    assert!(ledger.messages(&topic_id).len() > 1);

    let read = hcs1::read_file(&ledger, &topic_id).await.expect("should read");
    assert_eq!(read, payload);
}

// A changed chunk fails verification.
#[tokio::test]
async fn tampered_chunk() {
    let ledger = Ledger::default();
    let payload = payload(1_000);
    let topic_id = hcs1::upload(&ledger, &payload, &small_chunks()).await.expect("should upload");

    ledger.tamper(&topic_id, 2, br#"{"o":1,"c":"AAAAAAAA"}"#);
    let err = hcs1::read_file(&ledger, &topic_id).await.expect_err("should fail");
    assert!(err.is(Err::IntegrityFailure));
}

// A changed memo or an admin key fails verification.
#[tokio::test]
async fn topic_descriptor_checked() {
    let ledger = Ledger::default();
    let payload = payload(500);
    let topic_id = hcs1::upload(&ledger, &payload, &small_chunks()).await.expect("should upload");

    let other = hcs1::memo(b"something else");
    ledger.update_info(&topic_id, Some(&other), None);
    let err = hcs1::read_file(&ledger, &topic_id).await.expect_err("should fail");
    assert!(err.is(Err::IntegrityFailure));

    let memo = hcs1::memo(&payload);
    ledger.update_info(&topic_id, Some(&memo), Some("z6Mkadmin"));
    let err = hcs1::read_file(&ledger, &topic_id).await.expect_err("should fail");
    assert!(err.is(Err::IntegrityFailure));

    ledger.update_info(&topic_id, None, None);
    assert_eq!(hcs1::read_file(&ledger, &topic_id).await.expect("should read"), payload);
}

// Messages that are not chunks are ignored.
#[tokio::test]
async fn noise_ignored() {
    let ledger = Ledger::default();
    let payload = payload(500);
    let topic_id = hcs1::upload(&ledger, &payload, &small_chunks()).await.expect("should upload");

    ledger.submit_message(&topic_id, b"hello").await.expect("should submit");
    assert_eq!(hcs1::read_file(&ledger, &topic_id).await.expect("should read"), payload);
}

// An interrupted upload leaves an unreadable file until it is processed again.
#[tokio::test]
async fn interrupted_upload() {
    let ledger = Ledger::default();
    let payload = payload(2_000);
    let message = FileMessage::new(&payload, &small_chunks()).expect("should encode");
    let total = message.chunks.len();
    assert!(total > 5);

    ledger.fail_after(3);
    let lifecycle = hcs1::upload_lifecycle::<Ledger>();
    let state = lifecycle.process(message, Options::new(&ledger), None).await.expect("should catch");
    assert_eq!(state.status, Status::Error);
    assert_eq!(state.step_index, 1);
    assert_eq!(state.message.submitted, 3);

    let topic_id = state.message.topic_id.clone().expect("should have topic");
    let err = hcs1::read_file(&ledger, &topic_id).await.expect_err("should fail");
    assert!(err.is(Err::IntegrityFailure));

    ledger.recover();
    let state =
        lifecycle.process(state.message, Options::new(&ledger), None).await.expect("should process");
    assert_eq!(state.status, Status::Success);
    assert_eq!(state.message.submitted, total);
    assert_eq!(ledger.messages(&topic_id).len(), total);
    assert_eq!(hcs1::read_file(&ledger, &topic_id).await.expect("should read"), payload);

    // upload reports failure as a transport error
    ledger.fail_after(1);
    let err = hcs1::upload(&ledger, &payload, &small_chunks()).await.expect_err("should fail");
    assert!(err.is(Err::Transport));
}

// Cached reads serve the reassembled file without reading the topic again.
#[tokio::test]
async fn cached_read() {
    let ledger = Ledger::default();
    let payload = payload(1_500);
    let topic_id = hcs1::upload(&ledger, &payload, &small_chunks()).await.expect("should upload");

    let store = MemoryStore::new();
    let cache = MessageCache::new(ledger.ledger_id(), store.clone(), CacheOptions::default());

    let first = hcs1::read_file_cached(&ledger, &topic_id, &cache).await.expect("should read");
    assert_eq!(first, payload);
    assert_eq!(ledger.reads(), 1);
    assert_eq!(store.len(), 3);

    let second = hcs1::read_file_cached(&ledger, &topic_id, &cache).await.expect("should read");
    assert_eq!(second, payload);
    assert_eq!(ledger.reads(), 1);
    assert_eq!(cache.file(&topic_id).await.expect("should read cache"), Some(payload));
}
