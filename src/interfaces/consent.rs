use crate::domain::ports::{ConsentGate, InteractionProof};
use crate::error::ConsentError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
enum Decision {
    Confirm(InteractionProof),
    Abort(String),
}

/// Runs waiting for consent, keyed by the redirect URL they presented.
#[derive(Default)]
struct Waiting(Mutex<HashMap<String, oneshot::Sender<Decision>>>);

impl Waiting {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Decision>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Consent gate resolved from elsewhere in the process, e.g. an HTTP handler
/// receiving the finish redirect.
///
/// Created together with a [`ConsentHandle`]. The gate publishes each
/// redirect URL to the handle and waits for the decision addressed to that
/// URL, so several runs can wait on one gate at the same time. If the handle
/// is dropped, every wait ends as [`ConsentError::Closed`].
pub struct ChannelConsentGate {
    presented: mpsc::UnboundedSender<String>,
    waiting: Arc<Waiting>,
}

/// The deciding side of a [`ChannelConsentGate`].
pub struct ConsentHandle {
    presented: mpsc::UnboundedReceiver<String>,
    waiting: Arc<Waiting>,
}

impl ChannelConsentGate {
    pub fn new() -> (Self, ConsentHandle) {
        let (presented_tx, presented_rx) = mpsc::unbounded_channel();
        let waiting = Arc::new(Waiting::default());
        (
            Self {
                presented: presented_tx,
                waiting: waiting.clone(),
            },
            ConsentHandle {
                presented: presented_rx,
                waiting,
            },
        )
    }
}

impl ConsentHandle {
    /// Waits for the next redirect URL the gate presents.
    pub async fn redirect_url(&mut self) -> Option<String> {
        self.presented.recv().await
    }

    /// Reports consent for `redirect_url` as completed. Returns false if no
    /// run is waiting on that URL.
    pub fn confirm(&self, redirect_url: &str, proof: InteractionProof) -> bool {
        self.decide(redirect_url, Decision::Confirm(proof))
    }

    /// Reports that the operator declined `redirect_url`. Returns false if no
    /// run is waiting on that URL.
    pub fn abort(&self, redirect_url: &str, reason: impl Into<String>) -> bool {
        self.decide(redirect_url, Decision::Abort(reason.into()))
    }

    /// Redirect URLs presented and not yet decided.
    pub fn pending(&self) -> Vec<String> {
        self.waiting.lock().keys().cloned().collect()
    }

    fn decide(&self, redirect_url: &str, decision: Decision) -> bool {
        let waiter = self.waiting.lock().remove(redirect_url);
        waiter.is_some_and(|tx| tx.send(decision).is_ok())
    }
}

impl Drop for ConsentHandle {
    fn drop(&mut self) {
        // close first so a gate registering concurrently fails its send
        self.presented.close();
        self.waiting.lock().clear();
    }
}

#[async_trait]
impl ConsentGate for ChannelConsentGate {
    async fn present_and_await(
        &self,
        redirect_url: &str,
    ) -> Result<InteractionProof, ConsentError> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(redirect_url.to_string(), tx);
        if self.presented.send(redirect_url.to_string()).is_err() {
            self.waiting.lock().remove(redirect_url);
            return Err(ConsentError::Closed);
        }

        match rx.await {
            Ok(Decision::Confirm(proof)) => Ok(proof),
            Ok(Decision::Abort(reason)) => Err(ConsentError::Aborted(reason)),
            Err(_) => Err(ConsentError::Closed),
        }
    }
}
