//! Tracker handle and the owner task driving it.
//!
//! Every event (explicit refresh, startup timer, connectivity change, fetch
//! completion) is marshalled onto one owner task per tracker, which is the
//! only place the [`TrackerEngine`] is touched. Fetches run as separate tasks
//! so the owner can abort them on shutdown; a completion is applied only if
//! its generation token still names the in-flight fetch.

use std::fmt;
use std::future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::TrackerConfig;
use crate::connectivity::{ConnectionType, ConnectivitySource, ConnectivityStream};
use crate::engine::{FetchTicket, TrackerEngine, schedules_startup};
use crate::error::{FetchError, TrackerError, TrackerResult};
use crate::fetch::{FetchChannel, FetchResponse};
use crate::machine::{RequestId, TrackerPhase};
use crate::policy::{DomainPolicy, ResponsePolicy, VersionedSettingsPolicy};
use crate::store::PreferenceStore;
use crate::subscribers::{SubscriberRegistry, Subscription};

/// Tracker for the canonical search domain.
pub type DomainTracker = Tracker<DomainPolicy>;

/// Tracker for versioned provider settings.
pub type ProviderSettingsTracker = Tracker<VersionedSettingsPolicy>;

#[derive(Debug)]
enum Command {
    RequestServerCheck,
    FinishSleep,
    Phase { reply: oneshot::Sender<TrackerPhase> },
    Shutdown { ack: oneshot::Sender<()> },
}

/// Cloneable handle to a running tracker.
///
/// Dropping the last handle stops the owner task exactly like
/// [`Tracker::shutdown`].
pub struct Tracker<P: ResponsePolicy> {
    name: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    value: watch::Receiver<P::Value>,
    subscribers: SubscriberRegistry,
}

impl<P: ResponsePolicy> Tracker<P> {
    /// Start a tracker on the current tokio runtime.
    ///
    /// Reads the initial value from `store`, subscribes to `connectivity`,
    /// schedules the startup timer (normal mode only) and spawns the owner
    /// task.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::RuntimeUnavailable` when called outside a tokio
    /// runtime, or the connectivity source's error when subscribing fails.
    pub fn spawn(
        config: TrackerConfig,
        policy: P,
        fetcher: Arc<dyn FetchChannel>,
        store: Arc<dyn PreferenceStore>,
        connectivity: &dyn ConnectivitySource,
    ) -> TrackerResult<Self> {
        let runtime =
            Handle::try_current().map_err(|source| TrackerError::RuntimeUnavailable { source })?;
        let connectivity = connectivity.subscribe()?;

        let kind = policy.kind();
        let engine = TrackerEngine::new(&config, policy, store);
        let value = engine.watch();
        let subscribers = engine.subscribers();
        let (commands, receiver) = mpsc::unbounded_channel();

        let wake_at = schedules_startup(config.mode).then(|| Instant::now() + config.startup_delay);
        info!(
            tracker = %config.name,
            kind,
            mode = config.mode.as_str(),
            startup_delay_ms = u64::try_from(config.startup_delay.as_millis()).unwrap_or(u64::MAX),
            "tracker spawned"
        );

        let owner = OwnerTask {
            engine,
            fetcher,
            commands: receiver,
            connectivity: Some(connectivity),
            pending: None,
        };
        let span = info_span!("tracker", tracker = %config.name, kind);
        runtime.spawn(owner.run(wake_at).instrument(span));

        Ok(Self {
            name: Arc::from(config.name),
            commands,
            value,
            subscribers,
        })
    }

    /// Tracker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current value.
    ///
    /// Keeps answering with the last value after the tracker has stopped.
    #[must_use]
    pub fn current(&self) -> P::Value {
        self.value.borrow().clone()
    }

    /// Receiver that observes every accepted value.
    #[must_use]
    pub fn subscribe_updates(&self) -> watch::Receiver<P::Value> {
        self.value.clone()
    }

    /// Register a zero-argument callback fired after each accepted change.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn register_callback<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribers.register(callback)
    }

    /// Ask the tracker to re-check the server.
    ///
    /// Ignored while a fetch is in flight; that fetch serves the request.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Shutdown` once the tracker has stopped.
    pub fn request_server_check(&self) -> TrackerResult<()> {
        self.send(Command::RequestServerCheck, "request_server_check")
    }

    /// End the startup sleep early. Later calls, and the startup timer, have
    /// no further effect.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Shutdown` once the tracker has stopped.
    pub fn finish_sleep(&self) -> TrackerResult<()> {
        self.send(Command::FinishSleep, "finish_sleep")
    }

    /// Current lifecycle phase, as seen by the owner task.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Shutdown` once the tracker has stopped.
    pub async fn phase(&self) -> TrackerResult<TrackerPhase> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Phase { reply }, "phase")?;
        response.await.map_err(|_| TrackerError::Shutdown { operation: "phase" })
    }

    /// Stop the tracker, cancelling any in-flight fetch. Resolves once the
    /// owner task has released its resources; calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; the result is kept for parity with the other
    /// commands.
    pub async fn shutdown(&self) -> TrackerResult<()> {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { ack }).is_err() {
            return Ok(());
        }
        // A dropped ack means another handle's shutdown won the race.
        let _ = done.await;
        Ok(())
    }

    /// Whether the owner task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command, operation: &'static str) -> TrackerResult<()> {
        self.commands
            .send(command)
            .map_err(|_| TrackerError::Shutdown { operation })
    }
}

impl<P: ResponsePolicy> Clone for Tracker<P> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            commands: self.commands.clone(),
            value: self.value.clone(),
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<P: ResponsePolicy> fmt::Debug for Tracker<P> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Tracker")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

struct PendingFetch {
    id: RequestId,
    handle: JoinHandle<Result<FetchResponse, FetchError>>,
}

struct OwnerTask<P: ResponsePolicy> {
    engine: TrackerEngine<P>,
    fetcher: Arc<dyn FetchChannel>,
    commands: mpsc::UnboundedReceiver<Command>,
    connectivity: Option<ConnectivityStream>,
    pending: Option<PendingFetch>,
}

impl<P: ResponsePolicy> OwnerTask<P> {
    async fn run(mut self, wake_at: Option<Instant>) {
        let mut sleeping = wake_at.is_some();
        let startup = tokio::time::sleep_until(wake_at.unwrap_or_else(Instant::now));
        tokio::pin!(startup);

        loop {
            let ticket = tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::RequestServerCheck) => self.engine.request_server_check(),
                    Some(Command::FinishSleep) => {
                        sleeping = false;
                        self.engine.finish_sleep()
                    }
                    Some(Command::Phase { reply }) => {
                        let _ = reply.send(self.engine.phase());
                        None
                    }
                    Some(Command::Shutdown { ack }) => {
                        self.stop();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        debug!(tracker = %self.engine.name(), "all handles dropped");
                        self.stop();
                        break;
                    }
                },
                () = &mut startup, if sleeping => {
                    sleeping = false;
                    self.engine.finish_sleep()
                }
                change = next_connectivity(&mut self.connectivity) => match change {
                    Some(connection) => self.engine.connectivity_changed(connection),
                    None => {
                        debug!(tracker = %self.engine.name(), "connectivity source closed");
                        self.connectivity = None;
                        None
                    }
                },
                (id, result) = next_completion(&mut self.pending) => {
                    self.pending = None;
                    self.engine.complete(id, result)
                }
            };

            if let Some(ticket) = ticket {
                self.start_fetch(ticket);
            }
        }
    }

    fn start_fetch(&mut self, ticket: FetchTicket) {
        if let Some(previous) = self.pending.take() {
            warn!(
                tracker = %self.engine.name(),
                request_id = %previous.id,
                "replacing unfinished fetch"
            );
            previous.handle.abort();
        }
        let fetcher = Arc::clone(&self.fetcher);
        let request = ticket.request;
        let handle = tokio::spawn(async move { fetcher.fetch(request).await }.in_current_span());
        self.pending = Some(PendingFetch {
            id: ticket.id,
            handle,
        });
    }

    fn stop(&mut self) {
        let cancelled = self.engine.shutdown();
        if let Some(pending) = self.pending.take() {
            debug!(
                tracker = %self.engine.name(),
                request_id = %pending.id,
                matches_engine = cancelled == Some(pending.id),
                "aborting in-flight fetch"
            );
            pending.handle.abort();
        }
        self.connectivity = None;
        self.commands.close();
    }
}

async fn next_connectivity(stream: &mut Option<ConnectivityStream>) -> Option<ConnectionType> {
    match stream {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn next_completion(
    pending: &mut Option<PendingFetch>,
) -> (RequestId, Result<FetchResponse, FetchError>) {
    let Some(fetch) = pending else {
        return future::pending().await;
    };
    let result = match (&mut fetch.handle).await {
        Ok(result) => result,
        Err(err) => {
            warn!(request_id = %fetch.id, error = %err, "fetch task ended abnormally");
            Err(FetchError::Unavailable {
                reason: "fetch task ended abnormally",
            })
        }
    };
    (fetch.id, result)
}
