//! Fetch channel whose completions are released by the test.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use vigil_tracker::{FetchChannel, FetchError, FetchRequest, FetchResponse};

type Completion = Result<FetchResponse, FetchError>;

/// A fetch the tracker is waiting on.
#[derive(Debug)]
pub struct HeldFetch {
    request: FetchRequest,
    responder: oneshot::Sender<Completion>,
}

impl HeldFetch {
    /// Request the tracker issued.
    #[must_use]
    pub const fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// Deliver a response. Returns `false` if the fetch was already cancelled.
    pub fn respond(self, response: FetchResponse) -> bool {
        self.responder.send(Ok(response)).is_ok()
    }

    /// Deliver a failure. Returns `false` if the fetch was already cancelled.
    pub fn fail(self, error: FetchError) -> bool {
        self.responder.send(Err(error)).is_ok()
    }

    /// Whether the tracker has cancelled this fetch.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }
}

/// Fetch channel that parks every request until the test answers it.
#[derive(Debug)]
pub struct ScriptedFetchChannel {
    requests: Mutex<Vec<FetchRequest>>,
    sender: mpsc::UnboundedSender<HeldFetch>,
    held: AsyncMutex<mpsc::UnboundedReceiver<HeldFetch>>,
}

impl ScriptedFetchChannel {
    /// Construct a channel with no pending fetches.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (sender, held) = mpsc::unbounded_channel();
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            sender,
            held: AsyncMutex::new(held),
        })
    }

    /// Number of fetches issued so far.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every request issued so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the next issued fetch.
    pub async fn next_fetch(&self) -> Option<HeldFetch> {
        self.held.lock().await.recv().await
    }

    /// Take an already issued fetch without waiting.
    #[must_use]
    pub fn try_next_fetch(&self) -> Option<HeldFetch> {
        self.held.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl FetchChannel for ScriptedFetchChannel {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let (responder, completion) = oneshot::channel();
        self.sender
            .send(HeldFetch { request, responder })
            .map_err(|_| FetchError::Unavailable {
                reason: "scripted channel closed",
            })?;
        completion.await.unwrap_or(Err(FetchError::Unavailable {
            reason: "scripted fetch dropped",
        }))
    }
}
