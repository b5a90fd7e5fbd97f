//! One-shot stop signal for logtap.
//!
//! A logtap process runs a single task runner next to a handful of
//! collaborators: the status server, the duration timer, the OS signal
//! handler. All of them must agree on when emission ends. This crate provides
//! that agreement as a pair of types, a `Broadcaster` and any number of
//! `Watcher` instances.
//!
//! The signal is level-triggered. Once the `Broadcaster` fires, every
//! `Watcher` that exists, and every `Watcher` cloned from one afterward,
//! observes it immediately and forever. Dropping the `Broadcaster` without
//! firing counts as firing. A timeout is built by a caller that fires the
//! `Broadcaster` when its own timer elapses.
//!
//! Registered watchers additionally let the `Broadcaster` wait, through
//! [`Broadcaster::signal_and_wait`], until each of them has seen the signal
//! or been dropped. Each registered watcher holds a departure token, the
//! sending half of a channel nothing is ever sent on. The broadcaster is done
//! waiting when that channel closes.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]

use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Construct a `Watcher` and `Broadcaster` pair.
///
/// The returned `Watcher` is registered: [`Broadcaster::signal_and_wait`] will
/// not return until it has received the signal or been dropped.
#[must_use]
pub fn signal() -> (Watcher, Broadcaster) {
    let (sender, receiver) = watch::channel(false);
    let (token, departures) = mpsc::channel(1);

    let w = Watcher {
        receiver,
        registry: token.downgrade(),
        token: Some(token),
        received: false,
    };
    let b = Broadcaster { sender, departures };

    (w, b)
}

#[derive(Debug)]
/// The sending half of the stop signal. There is exactly one per signal.
pub struct Broadcaster {
    sender: watch::Sender<bool>,
    departures: mpsc::Receiver<()>,
}

impl Broadcaster {
    /// Fire the signal. Does not wait for watchers to acknowledge it.
    pub fn signal(self) {
        self.sender.send_replace(true);
    }

    /// Fire the signal and wait until every registered watcher has received
    /// it or been dropped.
    pub async fn signal_and_wait(mut self) {
        self.sender.send_replace(true);
        debug!("stop signalled, waiting on registered watchers");
        // Nothing is sent on this channel, `recv` only returns once the last
        // departure token is dropped.
        while self.departures.recv().await.is_some() {}
    }
}

/// Errors for `Watcher::try_recv`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// The signal was already received by this watcher.
    #[error("stop signal already received")]
    SignalReceived,
}

/// Errors for `Watcher::register`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// The signal was already received by this watcher, registering a new
    /// peer would make the broadcaster wait on something already finished.
    #[error("stop signal already received")]
    SignalReceived,
    /// Every registered watcher has departed, the broadcaster may already be
    /// done waiting.
    #[error("all registered watchers have departed")]
    Departed,
}

#[derive(Debug)]
/// The receiving half of the stop signal.
pub struct Watcher {
    receiver: watch::Receiver<bool>,
    /// Used to mint departure tokens for newly registered watchers.
    registry: mpsc::WeakSender<()>,
    /// Present while the broadcaster waits on this instance.
    token: Option<mpsc::Sender<()>>,
    /// Set once this instance has observed the signal.
    received: bool,
}

impl Watcher {
    fn observe(&mut self) {
        self.received = true;
        self.token = None;
    }

    /// Wait for the stop signal. Returns immediately if it has already been
    /// sent.
    pub async fn recv(mut self) {
        if self.received {
            // Yield so a `select!` arm built on an already-fired watcher
            // cannot starve its siblings.
            tokio::task::yield_now().await;
            return;
        }
        // An error means the broadcaster is gone, which counts as the signal.
        let _ = self.receiver.wait_for(|stopped| *stopped).await;
        self.observe();
    }

    /// Check for the stop signal without blocking.
    ///
    /// Returns `Ok(true)` the first time the signal is observed, `Ok(false)`
    /// while it has not been sent.
    ///
    /// # Errors
    ///
    /// Returns `TryRecvError::SignalReceived` on every call after the one that
    /// observed the signal.
    pub fn try_recv(&mut self) -> Result<bool, TryRecvError> {
        if self.received {
            return Err(TryRecvError::SignalReceived);
        }
        let fired = *self.receiver.borrow();
        let stopped = fired || self.receiver.has_changed().is_err();
        if stopped {
            self.observe();
        }
        Ok(stopped)
    }

    /// Create a new registered `Watcher` from this one. The broadcaster will
    /// wait for it in `signal_and_wait`.
    ///
    /// # Errors
    ///
    /// Returns `RegisterError::SignalReceived` if this watcher has already
    /// observed the signal, `RegisterError::Departed` if no registered watcher
    /// remains.
    pub fn register(&self) -> Result<Self, RegisterError> {
        if self.received {
            return Err(RegisterError::SignalReceived);
        }
        let token = self.registry.upgrade().ok_or(RegisterError::Departed)?;

        Ok(Self {
            receiver: self.receiver.clone(),
            registry: self.registry.clone(),
            token: Some(token),
            received: false,
        })
    }
}

impl Clone for Watcher {
    /// Clones are unregistered: the broadcaster never waits on them.
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            registry: self.registry.clone(),
            token: None,
            received: self.received,
        }
    }
}
