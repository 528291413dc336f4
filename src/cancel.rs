use crate::error::MigrationError;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, never, select};
use log::{debug, warn};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{thread::spawn, time::Duration};

/// The cancelling side of a migration run
pub struct CancelHandle {
    sender: Option<Sender<()>>,
}

/// A cheap cloneable token observed by every blocking operation
#[derive(Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelHandle {
    /// Create a new handle together with its token
    pub fn new() -> (Self, CancelToken) {
        let (sender, receiver) = bounded(0);
        (
            Self {
                sender: Some(sender),
            },
            CancelToken { receiver },
        )
    }

    /// Cancel all tokens. Dropping the sender disconnects every receiver.
    pub fn cancel(&mut self) {
        if self.sender.take().is_some() {
            debug!("Cancellation requested");
        }
    }

    /// Cancel the run on SIGINT or SIGTERM
    pub fn on_signals(mut self) -> Result<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        spawn(move || {
            if let Some(signal) = signals.forever().next() {
                warn!("Received signal {}, stopping after the current step", signal);
                self.cancel();
            }
        });
        Ok(())
    }
}

impl CancelToken {
    /// A token which never gets cancelled
    pub fn never() -> Self {
        Self { receiver: never() }
    }

    /// Returns true if the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Return an error if the run has been cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(MigrationError::Cancelled.into());
        }
        Ok(())
    }

    /// Block for the provided duration, returning early with an error on
    /// cancellation
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        select! {
            recv(self.receiver) -> _ => Err(MigrationError::Cancelled.into()),
            default(duration) => Ok(()),
        }
    }
}
