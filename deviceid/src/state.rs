//! Resolution state shared between the resolver and its accessors.
//!
//! A [`ResolutionSlot`] holds at most one [`ResolutionHandle`]. The handle
//! observes one resolution attempt through a `watch` channel: the resolution
//! task publishes exactly one outcome and never touches it again.

use crate::config::ReinitializePolicy;
use crate::errors::{ResolutionError, ResolutionResult};
use crate::types::DeviceId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Sequence number of a resolution attempt within one slot, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(u64);

impl AttemptId {
    /// The raw sequence number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a resolution attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// Still racing.
    Pending,
    /// Settled with a device ID.
    Succeeded,
    /// Settled with a failure.
    Failed,
    /// The resolution task ended without settling.
    Abandoned,
}

pub(crate) type SettledOutcome = Option<ResolutionResult<DeviceId>>;

/// Handle on one in-flight or settled resolution attempt.
///
/// Cloning is cheap; all clones observe the same outcome.
#[derive(Clone)]
pub struct ResolutionHandle {
    attempt: AttemptId,
    outcome: watch::Receiver<SettledOutcome>,
}

impl ResolutionHandle {
    pub(crate) fn new(attempt: AttemptId) -> (watch::Sender<SettledOutcome>, Self) {
        let (tx, outcome) = watch::channel(None);
        (tx, Self { attempt, outcome })
    }

    /// The attempt this handle observes.
    pub const fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Waits for the attempt to settle and returns its outcome.
    pub async fn outcome(&self) -> ResolutionResult<DeviceId> {
        let mut outcome = self.outcome.clone();
        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Err(ResolutionError::Abandoned))
    }

    /// Returns the outcome if the attempt has settled, without waiting.
    pub fn peek(&self) -> Option<ResolutionResult<DeviceId>> {
        self.outcome.borrow().clone()
    }

    /// Current status of the attempt.
    pub fn status(&self) -> AttemptStatus {
        match &*self.outcome.borrow() {
            Some(Ok(_)) => AttemptStatus::Succeeded,
            Some(Err(_)) => AttemptStatus::Failed,
            None if self.outcome.has_changed().is_err() => AttemptStatus::Abandoned,
            None => AttemptStatus::Pending,
        }
    }
}

impl fmt::Debug for ResolutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionHandle")
            .field("attempt", &self.attempt)
            .field("status", &self.status())
            .finish()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    current: Option<ResolutionHandle>,
    attempts: u64,
}

/// Single-slot store for the outstanding resolution attempt.
///
/// Cloning shares the slot. Each resolver owns one, so independent resolvers
/// (and tests) never see each other's state.
#[derive(Debug, Clone, Default)]
pub struct ResolutionSlot {
    state: Arc<Mutex<SlotState>>,
}

impl ResolutionSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The attempt currently held, if any.
    pub fn current(&self) -> Option<ResolutionHandle> {
        self.state.lock().current.clone()
    }

    /// Number of attempts started through this slot.
    pub fn attempts_started(&self) -> u64 {
        self.state.lock().attempts
    }

    /// Keeps the held attempt or installs a fresh pending one.
    ///
    /// Only the keep-or-replace decision happens under the lock. A
    /// [`Claim::Started`] hands the publisher back so the caller can start
    /// the attempt after the lock is released.
    pub(crate) fn claim(&self, policy: ReinitializePolicy) -> Claim {
        let mut state = self.state.lock();

        if let Some(current) = &state.current {
            let keep = match (current.status(), policy) {
                (AttemptStatus::Succeeded, _)
                | (AttemptStatus::Pending, ReinitializePolicy::JoinInFlight) => true,
                (AttemptStatus::Pending, ReinitializePolicy::Restart)
                | (AttemptStatus::Failed | AttemptStatus::Abandoned, _) => false,
            };
            if keep {
                return Claim::Joined(current.clone());
            }
        }

        state.attempts += 1;
        let (publisher, handle) = ResolutionHandle::new(AttemptId(state.attempts));
        state.current = Some(handle.clone());
        drop(state);
        Claim::Started(handle, publisher)
    }
}

/// Result of [`ResolutionSlot::claim`].
pub(crate) enum Claim {
    /// The held attempt is kept.
    Joined(ResolutionHandle),
    /// A new pending attempt was installed and must be published through
    /// the sender.
    Started(ResolutionHandle, watch::Sender<SettledOutcome>),
}

impl Claim {
    #[cfg(test)]
    fn handle(&self) -> &ResolutionHandle {
        match self {
            Self::Joined(handle) | Self::Started(handle, _) => handle,
        }
    }
}
