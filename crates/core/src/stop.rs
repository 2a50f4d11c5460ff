// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stop signal threaded through every stage execution
//!
//! A signal starts active and transitions exactly once: to fired (cancel,
//! timeout or terminate) or to consumed when the stage finishes first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Longest timeout a stage may be configured with
pub const MAX_STAGE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Why a stage execution was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    None,
    /// An operator or the controller requested the stage to stop
    Cancelled,
    /// The stage deadline elapsed
    Timeout,
    /// The agent is shutting down
    Terminate,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Terminate => "terminate",
        };
        f.write_str(s)
    }
}

/// Returned by cancellation-aware calls when the signal fired first
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("stage execution stopped ({0})")]
pub struct Stopped(pub StopReason);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalState {
    Active,
    Fired(StopReason),
    Consumed,
}

struct Shared {
    state: watch::Sender<SignalState>,
    deadline: Option<Instant>,
}

impl Shared {
    fn new(deadline: Option<Instant>) -> Arc<Self> {
        let (state, _) = watch::channel(SignalState::Active);
        Arc::new(Self { state, deadline })
    }

    /// Move from active to `next`. Returns false if already transitioned.
    fn transition(&self, next: SignalState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SignalState::Active {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Current reason, recording a timeout if the deadline has passed
    fn observe(&self) -> StopReason {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.transition(SignalState::Fired(StopReason::Timeout));
            }
        }
        match *self.state.borrow() {
            SignalState::Fired(reason) => reason,
            SignalState::Active | SignalState::Consumed => StopReason::None,
        }
    }
}

/// Cancellation/timeout token for one stage execution
#[derive(Clone)]
pub struct StopSignal {
    shared: Arc<Shared>,
}

/// Controller-side half used to fire a [`StopSignal`]
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopSignal {
    /// Create a signal without a deadline
    pub fn new() -> (Self, StopHandle) {
        Self::build(None)
    }

    /// Create a signal that times out after `timeout`.
    ///
    /// A timeout past the clock's range leaves the signal without a deadline.
    pub fn with_timeout(timeout: Duration) -> (Self, StopHandle) {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> (Self, StopHandle) {
        let shared = Shared::new(deadline);
        (
            Self {
                shared: Arc::clone(&shared),
            },
            StopHandle { shared },
        )
    }

    /// Reason observed so far. Never blocks.
    pub fn signal(&self) -> StopReason {
        self.shared.observe()
    }

    pub fn is_stopped(&self) -> bool {
        self.signal() != StopReason::None
    }

    /// Handle for blocking calls that must unblock promptly on stop
    pub fn context(&self) -> StopContext {
        StopContext {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Mark the execution finished.
    ///
    /// Returns the reason observed at that moment. Once consumed, later
    /// cancel or timeout requests have no effect.
    pub fn consume(&self) -> StopReason {
        let reason = self.shared.observe();
        if reason == StopReason::None && self.shared.transition(SignalState::Consumed) {
            return StopReason::None;
        }
        self.shared.observe()
    }
}

impl StopHandle {
    /// Request cancellation. Returns false if the signal already transitioned.
    pub fn cancel(&self) -> bool {
        self.shared
            .transition(SignalState::Fired(StopReason::Cancelled))
    }

    /// Request a stop because the agent is shutting down
    pub fn terminate(&self) -> bool {
        self.shared
            .transition(SignalState::Fired(StopReason::Terminate))
    }
}

/// Cancellation-aware view of a [`StopSignal`] for blocking remote calls
#[derive(Clone)]
pub struct StopContext {
    shared: Arc<Shared>,
}

impl StopContext {
    /// Fail fast if the signal already fired
    pub fn check(&self) -> Result<(), Stopped> {
        match self.shared.observe() {
            StopReason::None => Ok(()),
            reason => Err(Stopped(reason)),
        }
    }

    /// Resolve once the signal fires. Never resolves for a consumed signal.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.shared.state.subscribe();
        let fired = async {
            loop {
                let state = *rx.borrow_and_update();
                if let SignalState::Fired(reason) = state {
                    return reason;
                }
                if rx.changed().await.is_err() {
                    return std::future::pending::<StopReason>().await;
                }
            }
        };

        match self.shared.deadline {
            Some(deadline) => tokio::select! {
                reason = fired => reason,
                _ = tokio::time::sleep_until(deadline) => match self.shared.observe() {
                    StopReason::None => std::future::pending::<StopReason>().await,
                    reason => reason,
                },
            },
            None => fired.await,
        }
    }

    /// Drive `fut` to completion unless the signal fires first
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, Stopped>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.stopped() => Err(Stopped(reason)),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
#[path = "stop_tests.rs"]
mod tests;
