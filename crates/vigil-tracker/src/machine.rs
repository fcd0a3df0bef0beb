//! Refresh state machine shared by every tracker.
//!
//! The machine is pure bookkeeping: it decides when a fetch should be issued
//! and hands back a [`RequestId`] naming it, but never performs I/O. Each
//! transition re-evaluates load desirability, so there is no polling.
//!
//! A fetch is issued only when the tracker is awake, not loaded in the current
//! connectivity epoch, idle, and asked to load. Those flags only co-exist in
//! the phases where they are meaningful, which rules out combinations such as
//! "loading while sleeping".

use std::fmt;

/// Generation token naming one issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle phase of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// Startup delay has not elapsed; fetches are deferred.
    Sleeping {
        /// A refresh was requested while asleep.
        need_to_load: bool,
    },
    /// Awake with no fetch in flight.
    Idle {
        /// A refresh was requested but not yet issued.
        need_to_load: bool,
        /// A fetch succeeded in the current connectivity epoch.
        already_loaded: bool,
    },
    /// Exactly one fetch is in flight.
    Loading {
        /// The in-flight fetch.
        request: RequestId,
        /// Connectivity came up while the fetch was in flight.
        epoch_changed: bool,
    },
    /// Terminal; no further transitions.
    ShutDown,
}

impl TrackerPhase {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sleeping { .. } => "sleeping",
            Self::Idle { .. } => "idle",
            Self::Loading { .. } => "loading",
            Self::ShutDown => "shut_down",
        }
    }
}

/// Result of applying a completion to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The response was accepted (changed or unchanged).
    Loaded,
    /// Transport failure, malformed response, or rejection.
    Failed,
}

/// Refresh state machine.
#[derive(Debug, Clone)]
pub struct RefreshMachine {
    phase: TrackerPhase,
    armed: bool,
    issued: u64,
}

impl RefreshMachine {
    /// Machine in the initial sleeping phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: TrackerPhase::Sleeping {
                need_to_load: false,
            },
            armed: false,
            issued: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TrackerPhase {
        self.phase
    }

    /// Number of fetches issued so far.
    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.issued
    }

    /// Whether `request` is the fetch currently in flight.
    #[must_use]
    pub fn is_in_flight(&self, request: RequestId) -> bool {
        matches!(self.phase, TrackerPhase::Loading { request: current, .. } if current == request)
    }

    /// End the startup sleep. Only the first call has any effect.
    pub fn finish_sleep(&mut self) -> Option<RequestId> {
        let TrackerPhase::Sleeping { need_to_load } = self.phase else {
            return None;
        };
        self.phase = TrackerPhase::Idle {
            need_to_load,
            already_loaded: false,
        };
        self.start_load_if_desirable()
    }

    /// Explicit refresh request.
    ///
    /// Ignored while a fetch is in flight; that fetch answers the request.
    pub fn request_server_check(&mut self) -> Option<RequestId> {
        match &mut self.phase {
            TrackerPhase::Sleeping { need_to_load } | TrackerPhase::Idle { need_to_load, .. } => {
                *need_to_load = true;
                self.armed = true;
            }
            TrackerPhase::Loading { .. } | TrackerPhase::ShutDown => return None,
        }
        self.start_load_if_desirable()
    }

    /// Connectivity changed; `online` is `false` for the "none" signal.
    ///
    /// Offline signals are ignored. An online signal starts a new epoch: the
    /// loaded marker is cleared and, once any refresh has ever been requested,
    /// a new load is requested.
    pub fn connectivity_changed(&mut self, online: bool) -> Option<RequestId> {
        if !online {
            return None;
        }
        let armed = self.armed;
        match &mut self.phase {
            TrackerPhase::Sleeping { need_to_load } => *need_to_load |= armed,
            TrackerPhase::Idle {
                need_to_load,
                already_loaded,
            } => {
                *already_loaded = false;
                *need_to_load |= armed;
            }
            TrackerPhase::Loading { epoch_changed, .. } => *epoch_changed = true,
            TrackerPhase::ShutDown => return None,
        }
        self.start_load_if_desirable()
    }

    /// Apply the completion of `request`.
    ///
    /// Returns `None` without touching state when `request` is not the fetch
    /// in flight (a cancelled or superseded completion). Otherwise returns the
    /// follow-up fetch, if the new state makes one desirable.
    pub fn complete(
        &mut self,
        request: RequestId,
        outcome: CompletionOutcome,
    ) -> Option<Option<RequestId>> {
        let TrackerPhase::Loading {
            request: current,
            epoch_changed,
        } = self.phase
        else {
            return None;
        };
        if current != request {
            return None;
        }

        self.phase = TrackerPhase::Idle {
            need_to_load: epoch_changed && self.armed,
            already_loaded: outcome == CompletionOutcome::Loaded && !epoch_changed,
        };
        Some(self.start_load_if_desirable())
    }

    /// Enter the terminal phase, returning the fetch that must be cancelled.
    pub fn shutdown(&mut self) -> Option<RequestId> {
        let cancelled = match self.phase {
            TrackerPhase::Loading { request, .. } => Some(request),
            _ => None,
        };
        self.phase = TrackerPhase::ShutDown;
        cancelled
    }

    fn start_load_if_desirable(&mut self) -> Option<RequestId> {
        let TrackerPhase::Idle {
            need_to_load: true,
            already_loaded: false,
        } = self.phase
        else {
            return None;
        };

        self.issued += 1;
        let request = RequestId(self.issued);
        self.phase = TrackerPhase::Loading {
            request,
            epoch_changed: false,
        };
        Some(request)
    }
}

impl Default for RefreshMachine {
    fn default() -> Self {
        Self::new()
    }
}
