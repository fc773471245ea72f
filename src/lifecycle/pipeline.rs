//! Stock DID lifecycles.

use futures::future::BoxFuture;
use tracing::info;

use crate::envelope::Operation;
use crate::error::{Err, transport};
use crate::lifecycle::{DidMessage, Lifecycle};
use crate::provider::{Client, TopicCreate};
use crate::tracerr;

/// Prepare, sign with the run's signer, publish.
#[must_use]
pub fn default_lifecycle<C: Client + 'static>() -> Lifecycle<DidMessage, C> {
    Lifecycle::builder()
        .callback(prepare::<C>)
        .sign_with_signer()
        .callback(publish::<C>)
        .callback(log::<C>)
        .build()
}

/// Prepare, pause for an external signature, apply it, publish.
///
/// The paused state's message exposes the bytes to sign through
/// [`crate::lifecycle::Message::signing_bytes`].
#[must_use]
pub fn split_custody_lifecycle<C: Client + 'static>() -> Lifecycle<DidMessage, C> {
    Lifecycle::builder()
        .callback(prepare::<C>)
        .pause()
        .apply_external_signature()
        .callback(publish::<C>)
        .callback(log::<C>)
        .build()
}

// Create the DID topic for owner messages that do not have one yet. The owner
// key controls submission to the topic.
fn prepare<'a, C: Client>(message: &'a mut DidMessage, client: &'a C) -> BoxFuture<'a, crate::Result<()>> {
    Box::pin(async move {
        if message.topic_id.is_some() {
            return Ok(());
        }
        if message.operation != Operation::Create {
            tracerr!(Err::InvalidInput, "only owner messages can create a DID topic");
        }

        let request = TopicCreate {
            memo: format!("did:{}:{}", message.method, message.network),
            admin_key: Some(message.fingerprint.clone()),
            submit_key: Some(message.fingerprint.clone()),
        };
        let topic_id = client.create_topic(request).await.map_err(transport)?;
        message.topic_id = Some(topic_id);
        Ok(())
    })
}

fn publish<'a, C: Client>(message: &'a mut DidMessage, client: &'a C) -> BoxFuture<'a, crate::Result<()>> {
    Box::pin(async move {
        let Some(topic_id) = &message.topic_id else {
            tracerr!(Err::InvalidInput, "message has no topic");
        };
        let entry = message.entry()?;
        client.submit_message(topic_id, &entry.encode()?).await.map_err(transport)?;
        Ok(())
    })
}

fn log<'a, C: Client>(message: &'a mut DidMessage, _: &'a C) -> BoxFuture<'a, crate::Result<()>> {
    Box::pin(async move {
        if let Some(did) = message.did() {
            info!(did = %did, operation = %message.operation, "published DID message");
        }
        Ok(())
    })
}
