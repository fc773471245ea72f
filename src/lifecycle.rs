//! # Lifecycle
//!
//! A lifecycle is an ordered list of steps that take a message from
//! construction to publication: submitting transactions, signing, pausing for
//! an external signature and publishing the signed entry.
//!
//! Execution state is an explicit step index plus the message, so a paused
//! lifecycle can be serialized with [`RunnerState::to_bytes`], handed to a
//! remote signer, and resumed later, possibly in another process.
//!
//! ```rust,ignore
//! let lifecycle = Lifecycle::builder()
//!     .callback(|message, client| Box::pin(submit(message, client)))
//!     .pause()
//!     .apply_external_signature()
//!     .callback(|message, client| Box::pin(publish(message, client)))
//!     .build();
//!
//! let state = lifecycle.process(message, Options::new(&client), None).await?;
//! // ... obtain a signature over `state.message.signing_bytes()` ...
//! let state = lifecycle.resume(state, Options::new(&client).signature(sig)).await?;
//! ```

mod message;
mod pipeline;

use std::sync::Arc;

use base64ct::{Base64, Encoding};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use self::message::DidMessage;
pub use self::pipeline::{default_lifecycle, split_custody_lifecycle};
use crate::envelope::Operation;
use crate::error::{Err, Error};
use crate::provider::Signer;
use crate::tracerr;

/// A message that can be taken through a lifecycle.
pub trait Message: Sized + Send + Sync {
    /// Canonical bytes covered by the signature.
    ///
    /// # Errors
    ///
    /// Will fail if the message is not yet complete enough to sign.
    fn signing_bytes(&self) -> crate::Result<Vec<u8>>;

    /// The signature, once applied.
    fn signature(&self) -> Option<&[u8]>;

    /// Store a signature on the message.
    fn set_signature(&mut self, signature: Vec<u8>);

    /// Topic the message is published to, once known.
    fn topic_id(&self) -> Option<&str>;

    /// Operation the message performs.
    fn operation(&self) -> Operation;

    /// Persisted form, independent of the signing bytes.
    ///
    /// # Errors
    ///
    /// Will fail if the message cannot be serialized.
    fn to_bytes(&self) -> crate::Result<Vec<u8>>;

    /// Rehydrate a message from its persisted form.
    ///
    /// # Errors
    ///
    /// Will fail if the bytes do not hold a persisted message.
    fn from_bytes(bytes: &[u8]) -> crate::Result<Self>;
}

/// Async step callback.
pub type Callback<M, P> =
    Arc<dyn for<'a> Fn(&'a mut M, &'a P) -> BoxFuture<'a, crate::Result<()>> + Send + Sync>;

/// Error handler invoked when a step fails.
pub type Catch = Arc<dyn Fn(&Error) + Send + Sync>;

/// A lifecycle step.
pub enum Step<M, P> {
    /// Run side effects, typically through the publisher.
    Callback(Callback<M, P>),

    /// Sign the message with the signer passed in [`Options`].
    SignWithSigner,

    /// Store the signature passed in [`Options`].
    ApplyExternalSignature,

    /// Stop and hand control back to the caller.
    Pause,
}

impl<M, P> Clone for Step<M, P> {
    fn clone(&self) -> Self {
        match self {
            Self::Callback(callback) => Self::Callback(Arc::clone(callback)),
            Self::SignWithSigner => Self::SignWithSigner,
            Self::ApplyExternalSignature => Self::ApplyExternalSignature,
            Self::Pause => Self::Pause,
        }
    }
}

/// An ordered list of steps with an optional error handler.
pub struct Lifecycle<M, P> {
    steps: Vec<Step<M, P>>,
    catch: Option<Catch>,
}

impl<M, P> Clone for Lifecycle<M, P> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            catch: self.catch.clone(),
        }
    }
}

/// Per-run inputs.
pub struct Options<'a, P> {
    /// Publisher passed to callback steps.
    pub publisher: &'a P,

    /// Signer used by the sign step.
    pub signer: Option<&'a dyn Signer>,

    /// Signature applied by the external signature step.
    pub signature: Option<Vec<u8>>,
}

impl<'a, P> Options<'a, P> {
    /// Options with only a publisher.
    #[must_use]
    pub const fn new(publisher: &'a P) -> Self {
        Self {
            publisher,
            signer: None,
            signature: None,
        }
    }

    /// Sign with `signer`.
    #[must_use]
    pub fn signer(mut self, signer: &'a dyn Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Apply `signature` at the external signature step.
    #[must_use]
    pub fn signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Runner status.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Stopped at a pause step.
    Pause,

    /// All steps ran.
    Success,

    /// A step failed and the error handler ran.
    Error,
}

/// State returned by a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerState<M> {
    /// The message, as left by the last step run.
    pub message: M,

    /// How the run ended.
    pub status: Status,

    /// Index of the step the run stopped at, `-1` on success.
    pub step_index: i64,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    message: String,
    status: Status,
    step_index: i64,
}

impl<M: Message> RunnerState<M> {
    /// Serialize the state as JSON `{message, status, stepIndex}` with the
    /// message in its base64-encoded persisted form.
    ///
    /// # Errors
    ///
    /// Will fail if the message cannot be serialized.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let persisted = PersistedState {
            message: Base64::encode_string(&self.message.to_bytes()?),
            status: self.status,
            step_index: self.step_index,
        };
        Ok(serde_json::to_vec(&persisted)?)
    }

    /// Rehydrate serialized state.
    ///
    /// # Errors
    ///
    /// Will fail if the bytes do not hold serialized state.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let persisted: PersistedState = serde_json::from_slice(bytes)?;
        let message = M::from_bytes(&Base64::decode_vec(&persisted.message)?)?;
        Ok(Self {
            message,
            status: persisted.status,
            step_index: persisted.step_index,
        })
    }
}

impl<M: Message, P: Sync> Lifecycle<M, P> {
    /// Start building a lifecycle.
    #[must_use]
    pub const fn builder() -> LifecycleBuilder<M, P> {
        LifecycleBuilder {
            steps: Vec::new(),
            catch: None,
        }
    }

    /// The lifecycle's steps.
    #[must_use]
    pub fn steps(&self) -> &[Step<M, P>] {
        &self.steps
    }

    /// Run steps in order, starting after step `after` (from the first step
    /// when `None`).
    ///
    /// # Errors
    ///
    /// Returns the first step error when no error handler is set.
    pub async fn process(
        &self, mut message: M, options: Options<'_, P>, after: Option<usize>,
    ) -> crate::Result<RunnerState<M>> {
        let start = after.map_or(0, |step| step + 1);

        for (index, step) in self.steps.iter().enumerate().skip(start) {
            let step_index = i64::try_from(index).unwrap_or(i64::MAX);

            let result = match step {
                Step::Callback(callback) => callback(&mut message, options.publisher).await,
                Step::SignWithSigner => sign(&mut message, options.signer),
                Step::ApplyExternalSignature => apply_signature(&mut message, &options.signature),
                Step::Pause => {
                    debug!("lifecycle paused at step {index}");
                    return Ok(RunnerState {
                        message,
                        status: Status::Pause,
                        step_index,
                    });
                }
            };

            if let Err(e) = result {
                let Some(catch) = &self.catch else {
                    return Err(e);
                };
                catch(&e);
                return Ok(RunnerState {
                    message,
                    status: Status::Error,
                    step_index,
                });
            }
        }

        Ok(RunnerState {
            message,
            status: Status::Success,
            step_index: -1,
        })
    }

    /// Continue a paused run from the step after the pause.
    ///
    /// # Errors
    ///
    /// Will fail with `InvalidInput` if the state is not paused at one of this
    /// lifecycle's pause steps, otherwise as [`Lifecycle::process`].
    pub async fn resume(
        &self, state: RunnerState<M>, options: Options<'_, P>,
    ) -> crate::Result<RunnerState<M>> {
        if state.status != Status::Pause {
            tracerr!(Err::InvalidInput, "only paused lifecycles can be resumed");
        }
        let Ok(after) = usize::try_from(state.step_index) else {
            tracerr!(Err::InvalidInput, "invalid step index {}", state.step_index);
        };
        if !matches!(self.steps.get(after), Some(Step::Pause)) {
            tracerr!(Err::InvalidInput, "step {after} is not a pause step");
        }
        self.process(state.message, options, Some(after)).await
    }
}

fn sign<M: Message>(message: &mut M, signer: Option<&dyn Signer>) -> crate::Result<()> {
    let Some(signer) = signer else {
        tracerr!(Err::MissingSigner, "sign step requires a signer");
    };
    let signature = signer.sign(&message.signing_bytes()?)?;
    message.set_signature(signature);
    Ok(())
}

fn apply_signature<M: Message>(message: &mut M, signature: &Option<Vec<u8>>) -> crate::Result<()> {
    let Some(signature) = signature else {
        tracerr!(Err::MissingSignature, "external signature step requires a signature");
    };
    message.set_signature(signature.clone());
    Ok(())
}

/// Builds a [`Lifecycle`] step by step.
pub struct LifecycleBuilder<M, P> {
    steps: Vec<Step<M, P>>,
    catch: Option<Catch>,
}

impl<M, P> LifecycleBuilder<M, P> {
    /// Add a callback step.
    #[must_use]
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a mut M, &'a P) -> BoxFuture<'a, crate::Result<()>> + Send + Sync + 'static,
    {
        self.steps.push(Step::Callback(Arc::new(callback)));
        self
    }

    /// Add a step signing the message with the run's signer.
    #[must_use]
    pub fn sign_with_signer(mut self) -> Self {
        self.steps.push(Step::SignWithSigner);
        self
    }

    /// Add a step applying the run's externally produced signature.
    #[must_use]
    pub fn apply_external_signature(mut self) -> Self {
        self.steps.push(Step::ApplyExternalSignature);
        self
    }

    /// Add a pause step.
    #[must_use]
    pub fn pause(mut self) -> Self {
        self.steps.push(Step::Pause);
        self
    }

    /// Handle step errors with `catch` instead of returning them.
    #[must_use]
    pub fn catch(mut self, catch: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.catch = Some(Arc::new(catch));
        self
    }

    /// Finish the lifecycle.
    #[must_use]
    pub fn build(self) -> Lifecycle<M, P> {
        Lifecycle {
            steps: self.steps,
            catch: self.catch,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::key::Ed25519Signer;

    #[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
    struct Note {
        text: String,
        topic_id: Option<String>,
        signature: Option<Vec<u8>>,
    }

    impl Message for Note {
        fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
            Ok(self.text.as_bytes().to_vec())
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
            Operation::Update
        }

        fn to_bytes(&self) -> crate::Result<Vec<u8>> {
            Ok(serde_json::to_vec(self)?)
        }

        fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
            Ok(serde_json::from_slice(bytes)?)
        }
    }

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl Journal {
        fn record(&self, entry: impl Into<String>) {
            self.0.lock().expect("should lock").push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().expect("should lock").clone()
        }
    }

    fn note() -> Note {
        Note {
            text: "hello".into(),
            ..Note::default()
        }
    }

    fn split_custody() -> Lifecycle<Note, Journal> {
        Lifecycle::builder()
            .callback(|note: &mut Note, journal: &Journal| {
                Box::pin(async move {
                    note.topic_id = Some("0.0.7".into());
                    journal.record("submitted");
                    Ok(())
                })
            })
            .pause()
            .apply_external_signature()
            .callback(|note: &mut Note, journal: &Journal| {
                Box::pin(async move {
                    journal.record(format!("published {}", note.signature.is_some()));
                    Ok(())
                })
            })
            .build()
    }

    #[tokio::test]
    async fn runs_to_completion() {
        let journal = Journal::default();
        let signer = Ed25519Signer::from_bytes(&[5; 32]);
        let lifecycle = Lifecycle::builder()
            .callback(|_: &mut Note, journal: &Journal| {
                Box::pin(async move {
                    journal.record("submitted");
                    Ok(())
                })
            })
            .sign_with_signer()
            .build();

        let state = lifecycle
            .process(note(), Options::new(&journal).signer(&signer), None)
            .await
            .expect("should run");
        assert_eq!(state.status, Status::Success);
        assert_eq!(state.step_index, -1);
        assert_eq!(
            state.message.signature().unwrap(),
            signer.sign(b"hello").unwrap().as_slice()
        );
        assert_eq!(journal.entries(), vec!["submitted"]);
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let journal = Journal::default();
        let lifecycle = split_custody();

        let paused = lifecycle.process(note(), Options::new(&journal), None).await.unwrap();
        assert_eq!(paused.status, Status::Pause);
        assert_eq!(paused.step_index, 1);
        assert_eq!(paused.message.topic_id(), Some("0.0.7"));
        assert_eq!(journal.entries(), vec!["submitted"]);

        // cross a serialization boundary
        let bytes = paused.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], "pause");
        assert_eq!(value["stepIndex"], 1);
        let restored = RunnerState::<Note>::from_bytes(&bytes).unwrap();
        assert_eq!(restored, paused);

        let done = lifecycle
            .resume(restored, Options::new(&journal).signature(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(done.status, Status::Success);
        assert_eq!(done.message.signature(), Some([1, 2, 3].as_slice()));
        assert_eq!(journal.entries(), vec!["submitted", "published true"]);
    }

    #[tokio::test]
    async fn missing_inputs() {
        let journal = Journal::default();
        let lifecycle = Lifecycle::<Note, Journal>::builder().sign_with_signer().build();
        let err = lifecycle.process(note(), Options::new(&journal), None).await.unwrap_err();
        assert!(err.is(Err::MissingSigner));

        let lifecycle = split_custody();
        let paused = lifecycle.process(note(), Options::new(&journal), None).await.unwrap();
        let err = lifecycle.resume(paused, Options::new(&journal)).await.unwrap_err();
        assert!(err.is(Err::MissingSignature));
    }

    #[tokio::test]
    async fn catch_reports_error() {
        let journal = Journal::default();
        let caught = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&caught);

        let lifecycle = Lifecycle::<Note, Journal>::builder()
            .callback(|_: &mut Note, _: &Journal| {
                Box::pin(async move { Err(Error::from(Err::Transport)) })
            })
            .callback(|_: &mut Note, journal: &Journal| {
                Box::pin(async move {
                    journal.record("unreachable");
                    Ok(())
                })
            })
            .catch(move |e| *sink.lock().expect("should lock") = e.code())
            .build();

        let state = lifecycle.process(note(), Options::new(&journal), None).await.unwrap();
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.step_index, 0);
        assert_eq!(*caught.lock().unwrap(), Some(Err::Transport));
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn only_paused_state_resumes() {
        let journal = Journal::default();
        let lifecycle = split_custody();
        let state = RunnerState {
            message: note(),
            status: Status::Success,
            step_index: -1,
        };
        let err = lifecycle.resume(state, Options::new(&journal)).await.unwrap_err();
        assert!(err.is(Err::InvalidInput));

        // a paused state must point at a pause step
        for step_index in [0, 2, 9] {
            let state = RunnerState {
                message: note(),
                status: Status::Pause,
                step_index,
            };
            let err = lifecycle
                .resume(state, Options::new(&journal).signature(vec![1]))
                .await
                .unwrap_err();
            assert!(err.is(Err::InvalidInput));
        }
        assert!(journal.entries().is_empty());
    }
}
