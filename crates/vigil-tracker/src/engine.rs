//! Synchronous tracker core: state machine, policy, store, and fan-out.
//!
//! # Design
//! - Every method runs on the tracker's owner task; nothing here blocks on I/O
//!   other than the synchronous preference store.
//! - Methods that may start a fetch return a [`FetchTicket`] which the owner
//!   task must execute and later feed back through [`TrackerEngine::complete`].
//! - The published value is replaced before subscribers are notified, so a
//!   callback reading the tracker always observes the new value.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{TrackerConfig, TrackerMode};
use crate::connectivity::ConnectionType;
use crate::error::FetchError;
use crate::fetch::{FetchRequest, FetchResponse};
use crate::machine::{CompletionOutcome, RefreshMachine, RequestId, TrackerPhase};
use crate::policy::{Evaluation, ResponsePolicy};
use crate::store::PreferenceStore;
use crate::subscribers::SubscriberRegistry;

/// A fetch the owner task must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    /// Generation token to hand back on completion.
    pub id: RequestId,
    /// Request to perform.
    pub request: FetchRequest,
}

/// Tracker state owned by a single task.
pub struct TrackerEngine<P: ResponsePolicy> {
    name: String,
    check_url: Url,
    machine: RefreshMachine,
    policy: P,
    store: Arc<dyn PreferenceStore>,
    subscribers: SubscriberRegistry,
    value: watch::Sender<P::Value>,
}

impl<P: ResponsePolicy> TrackerEngine<P> {
    /// Build an engine, loading the initial value from `store`.
    pub fn new(config: &TrackerConfig, policy: P, store: Arc<dyn PreferenceStore>) -> Self {
        let initial = policy.initial_value(config.mode, store.as_ref());
        debug!(
            tracker = %config.name,
            kind = policy.kind(),
            mode = config.mode.as_str(),
            initial = ?initial,
            "tracker value loaded"
        );
        let (value, _) = watch::channel(initial);
        Self {
            name: config.name.clone(),
            check_url: config.check_url.clone(),
            machine: RefreshMachine::new(),
            policy,
            store,
            subscribers: SubscriberRegistry::new(),
            value,
        }
    }

    /// Tracker name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn current(&self) -> P::Value {
        self.value.borrow().clone()
    }

    /// Receiver observing every accepted value.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<P::Value> {
        self.value.subscribe()
    }

    /// Registry of zero-argument update callbacks.
    #[must_use]
    pub fn subscribers(&self) -> SubscriberRegistry {
        self.subscribers.clone()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> TrackerPhase {
        self.machine.phase()
    }

    /// Number of fetches issued so far.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.machine.issued()
    }

    /// End the startup sleep.
    pub fn finish_sleep(&mut self) -> Option<FetchTicket> {
        if matches!(self.machine.phase(), TrackerPhase::Sleeping { .. }) {
            info!(tracker = %self.name, "startup sleep finished");
        }
        let issued = self.machine.finish_sleep();
        self.ticket(issued)
    }

    /// Explicit refresh request.
    pub fn request_server_check(&mut self) -> Option<FetchTicket> {
        debug!(tracker = %self.name, phase = self.machine.phase().as_str(), "server check requested");
        let issued = self.machine.request_server_check();
        self.ticket(issued)
    }

    /// Apply a connectivity change.
    pub fn connectivity_changed(&mut self, connection: ConnectionType) -> Option<FetchTicket> {
        debug!(
            tracker = %self.name,
            connection = connection.as_str(),
            "connectivity changed"
        );
        let issued = self.machine.connectivity_changed(connection.is_online());
        self.ticket(issued)
    }

    /// Apply the completion of fetch `id`.
    ///
    /// Stale completions (cancelled or superseded) are discarded without
    /// touching state. Returns the follow-up fetch, if any.
    pub fn complete(
        &mut self,
        id: RequestId,
        result: Result<FetchResponse, FetchError>,
    ) -> Option<FetchTicket> {
        if !self.machine.is_in_flight(id) {
            debug!(tracker = %self.name, request_id = %id, "discarding stale completion");
            return None;
        }

        let outcome = match result {
            Ok(response) => self.apply_response(id, &response),
            Err(err) => {
                warn!(
                    tracker = %self.name,
                    request_id = %id,
                    error = %err,
                    "fetch failed; keeping last known value"
                );
                CompletionOutcome::Failed
            }
        };

        let follow_up = self.machine.complete(id, outcome).flatten();
        self.ticket(follow_up)
    }

    /// Enter the terminal phase, returning the fetch that must be cancelled.
    pub fn shutdown(&mut self) -> Option<RequestId> {
        let cancelled = self.machine.shutdown();
        info!(
            tracker = %self.name,
            cancelled = cancelled.map(RequestId::get),
            "tracker shut down"
        );
        cancelled
    }

    fn apply_response(&mut self, id: RequestId, response: &FetchResponse) -> CompletionOutcome {
        if let Err(err) = self
            .policy
            .record_side_channel(response, self.store.as_ref())
        {
            warn!(tracker = %self.name, error = %err, "failed to persist side-channel values");
        }

        let evaluation = {
            let current = self.value.borrow();
            self.policy.evaluate(&current, response)
        };

        match evaluation {
            Evaluation::Unchanged => {
                debug!(tracker = %self.name, request_id = %id, "value unchanged");
                CompletionOutcome::Loaded
            }
            Evaluation::Rejected(rejection) => {
                debug!(
                    tracker = %self.name,
                    request_id = %id,
                    reason = %rejection,
                    malformed = rejection.is_malformed(),
                    "response rejected"
                );
                CompletionOutcome::Failed
            }
            Evaluation::Changed(value) => {
                if let Err(err) = self.policy.persist(&value, self.store.as_ref()) {
                    warn!(tracker = %self.name, error = %err, "failed to persist accepted value");
                    return CompletionOutcome::Failed;
                }
                info!(tracker = %self.name, request_id = %id, value = ?value, "value updated");
                self.value.send_replace(value);
                let notified = self.subscribers.notify();
                debug!(tracker = %self.name, notified, "subscribers notified");
                CompletionOutcome::Loaded
            }
        }
    }

    fn ticket(&self, issued: Option<RequestId>) -> Option<FetchTicket> {
        let id = issued?;
        info!(tracker = %self.name, request_id = %id, url = %self.check_url, "fetch issued");
        Some(FetchTicket {
            id,
            request: FetchRequest::new(self.check_url.clone()),
        })
    }
}

impl<P: ResponsePolicy> std::fmt::Debug for TrackerEngine<P> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TrackerEngine")
            .field("name", &self.name)
            .field("phase", &self.machine.phase())
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

/// Whether `mode` schedules the startup timer.
#[must_use]
pub const fn schedules_startup(mode: TrackerMode) -> bool {
    matches!(mode, TrackerMode::Normal)
}
