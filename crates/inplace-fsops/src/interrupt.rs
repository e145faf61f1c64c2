//! Deferral of termination signals across the replacement critical section.
//!
//! # Design
//! - One mutex guards both the critical-section depth and the received
//!   signal, so a signal is never acted on between entering and leaving.
//! - The first signal wins and stays recorded for the rest of the run.
//! - Outside a critical section a signal cancels the run: the running filter
//!   command is stopped and the pipeline unwinds with
//!   [`FilterError::Interrupted`], releasing every temp file on the way.
//! - Inside a critical section the signal surfaces once the section completes.

use std::sync::{Arc, Mutex, MutexGuard};

use nix::sys::signal::Signal;
use tracing::{debug, error};

use crate::error::{FilterError, FilterResult};

#[derive(Debug, Default)]
struct GateState {
    depth: usize,
    received: Option<Signal>,
}

/// What happened to a delivered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A replacement is running; the signal is honoured once it completes.
    Deferred,
    /// The run stops at the next checkpoint.
    Cancelled,
}

/// Shared gate consulted by signal listeners, filter stages and the
/// replacement engine.
#[derive(Debug, Clone, Default)]
pub struct SignalGate {
    state: Arc<Mutex<GateState>>,
}

impl SignalGate {
    /// Create an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            error!("signal gate lock poisoned; recovering state");
            poisoned.into_inner()
        })
    }

    /// Hand a received signal to the gate. The first signal is kept.
    pub fn deliver(&self, signal: Signal) -> Delivery {
        let mut state = self.lock();
        state.received.get_or_insert(signal);
        if state.depth > 0 {
            debug!(signal = %signal, "deferring signal until replacement completes");
            Delivery::Deferred
        } else {
            debug!(signal = %signal, "cancelling run");
            Delivery::Cancelled
        }
    }

    /// Signal received so far, if any.
    pub(crate) fn received(&self) -> Option<Signal> {
        self.lock().received
    }

    /// Fail with [`FilterError::Interrupted`] once a signal has been received.
    pub(crate) fn checkpoint(&self) -> FilterResult<()> {
        self.received()
            .map_or(Ok(()), |signal| Err(FilterError::Interrupted { signal }))
    }

    /// Run `work` with signals deferred.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Interrupted`] without running `work` when a
    /// signal was already received. Otherwise returns the error from `work`,
    /// or [`FilterError::Interrupted`] if a signal arrived meanwhile. Fatal
    /// errors take precedence over the signal.
    pub fn critical<T, F>(&self, work: F) -> FilterResult<T>
    where
        F: FnOnce() -> FilterResult<T>,
    {
        let section = CriticalSection::enter(self)?;
        let result = work();
        let received = section.leave();
        match (result, received) {
            (Err(err), _) if err.is_fatal() => Err(err),
            (_, Some(signal)) => Err(FilterError::Interrupted { signal }),
            (result, None) => result,
        }
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.lock().depth
    }
}

struct CriticalSection<'a> {
    gate: &'a SignalGate,
    active: bool,
}

impl<'a> CriticalSection<'a> {
    fn enter(gate: &'a SignalGate) -> FilterResult<Self> {
        let mut state = gate.lock();
        if let Some(signal) = state.received {
            return Err(FilterError::Interrupted { signal });
        }
        state.depth += 1;
        Ok(Self { gate, active: true })
    }

    fn leave(mut self) -> Option<Signal> {
        self.active = false;
        let mut state = self.gate.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.received
        } else {
            None
        }
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        if self.active {
            let mut state = self.gate.lock();
            state.depth = state.depth.saturating_sub(1);
        }
    }
}
