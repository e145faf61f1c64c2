//! Termination signal listener.
//!
//! Signals are received on the async runtime and handed to the shared
//! [`SignalGate`]; the filter pipeline itself runs on a blocking thread and
//! unwinds with an interrupted error once it notices the signal.

use std::io;

use inplace_fsops::{Delivery, SignalGate};
use nix::sys::signal::Signal;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::debug;

/// Install handlers for SIGINT, SIGTERM and SIGQUIT and forward them to `gate`.
pub(crate) fn spawn_listener(gate: SignalGate) -> io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigint.recv() => Signal::SIGINT,
                Some(()) = sigterm.recv() => Signal::SIGTERM,
                Some(()) = sigquit.recv() => Signal::SIGQUIT,
                else => break,
            };
            match gate.deliver(received) {
                Delivery::Deferred => debug!(signal = %received, "signal deferred"),
                Delivery::Cancelled => debug!(signal = %received, "run cancelled"),
            }
        }
    }))
}
