//! Response correlation: matching an outstanding INFO query to its
//! asynchronous reply.
//!
//! Exactly one query may be in flight at a time. The request lock spans
//! "send query" through "consume reply"; the receive loop hands the reply
//! over through a single-capacity channel. Waiters block with a timeout,
//! never by polling.

use std::sync::{Mutex, TryLockError};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::warn;

use crate::error::{ChannelError, TriggerError, TriggerResult};
use crate::transport::Transport;

use super::message::{Command, Field, QueryCategory};

#[derive(Debug)]
struct PendingSlot {
    category: QueryCategory,
    reply_tx: Sender<Vec<Field>>,
}

/// Single-in-flight query correlator.
#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    /// Held from send through consume; `try_lock` makes a second caller
    /// fail fast instead of queueing behind the first.
    request_lock: Mutex<()>,
    pending: Mutex<Option<PendingSlot>>,
}

impl ResponseCorrelator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sends an INFO query and blocks until the matching reply arrives.
    ///
    /// # Errors
    ///
    /// `ChannelError::QueryInProgress` if another query is outstanding,
    /// `TriggerError::Timeout` if no correlated reply arrives in time,
    /// `ChannelError::Disconnected` if the link goes away while waiting.
    pub fn query(
        &self,
        transport: &dyn Transport,
        category: QueryCategory,
        id: Option<&str>,
        timeout: Duration,
    ) -> TriggerResult<Vec<Field>> {
        let _guard = match self.request_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(ChannelError::QueryInProgress.into());
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(ChannelError::Io {
                    message: "request lock poisoned".to_string(),
                }
                .into());
            }
        };

        let (reply_tx, reply_rx) = bounded::<Vec<Field>>(1);
        self.set_pending(Some(PendingSlot { category, reply_tx }))?;

        let command = Command::Info {
            category,
            id: id.map(str::to_string),
        };
        if let Err(e) = transport.send_line(&command.to_string()) {
            self.set_pending(None)?;
            return Err(e.into());
        }

        match reply_rx.recv_timeout(timeout) {
            Ok(fields) => Ok(fields),
            Err(RecvTimeoutError::Timeout) => {
                self.set_pending(None)?;
                Err(TriggerError::Timeout {
                    duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.set_pending(None)?;
                Err(ChannelError::Disconnected.into())
            }
        }
    }

    /// Hands an INFO reply to the waiter, if its category matches.
    ///
    /// Called from the receive loop. A reply with no matching pending
    /// query (none outstanding, mismatched category, or a waiter that
    /// already timed out) is dropped, never mis-delivered.
    pub(crate) fn deliver(&self, category: &str, fields: Vec<Field>) {
        let slot = {
            let Ok(mut pending) = self.pending.lock() else {
                return;
            };
            match pending.as_ref() {
                Some(p) if p.category.as_str() == category => pending.take(),
                Some(p) => {
                    warn!(
                        expected = p.category.as_str(),
                        received = category,
                        "dropping INFO reply with mismatched category"
                    );
                    return;
                }
                None => {
                    warn!(received = category, "dropping unsolicited INFO reply");
                    return;
                }
            }
        };

        if let Some(slot) = slot {
            if slot.reply_tx.try_send(fields).is_err() {
                warn!(
                    category,
                    "waiter gone before reply handoff; reply dropped"
                );
            }
        }
    }

    /// Drops any pending reply sender, unblocking the waiter with a
    /// disconnection outcome. Called when the link winds down.
    pub(crate) fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = None;
        }
    }

    fn set_pending(&self, slot: Option<PendingSlot>) -> TriggerResult<()> {
        let mut pending = self.pending.lock().map_err(|_| {
            TriggerError::from(ChannelError::Io {
                message: "pending slot lock poisoned".to_string(),
            })
        })?;
        *pending = slot;
        Ok(())
    }
}
