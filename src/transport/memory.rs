//! In-process loopback transport backed by crossbeam channels.
//!
//! Tests and demos stand in for the remote service by driving the
//! [`LoopbackPeer`] end: commands sent through the transport arrive at the
//! peer, lines sent by the peer arrive at the receive loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::ChannelError;

use super::Transport;

/// The session-side end of a loopback pair.
pub struct LoopbackTransport {
    tx: Sender<String>,
    rx: Receiver<String>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    connected: AtomicBool,
}

/// The remote-service end of a loopback pair.
pub struct LoopbackPeer {
    tx: Sender<String>,
    rx: Receiver<String>,
}

/// Creates a connected transport/peer pair.
#[must_use]
pub fn loopback_pair() -> (LoopbackTransport, LoopbackPeer) {
    let (out_tx, out_rx) = unbounded();
    let (in_tx, in_rx) = unbounded();
    let (shutdown_tx, shutdown_rx) = bounded(1);

    let transport = LoopbackTransport {
        tx: out_tx,
        rx: in_rx,
        shutdown_tx,
        shutdown_rx,
        connected: AtomicBool::new(true),
    };
    let peer = LoopbackPeer {
        tx: in_tx,
        rx: out_rx,
    };

    (transport, peer)
}

impl Transport for LoopbackTransport {
    fn send_line(&self, line: &str) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::Disconnected);
        }
        self.tx.send(line.to_string()).map_err(|_| {
            self.connected.store(false, Ordering::Release);
            ChannelError::Disconnected
        })
    }

    fn recv_line(&self) -> Result<Option<String>, ChannelError> {
        if !self.is_connected() {
            return Ok(None);
        }

        select! {
            recv(self.rx) -> msg => match msg {
                Ok(line) => Ok(Some(line)),
                Err(_) => {
                    self.connected.store(false, Ordering::Release);
                    Ok(None)
                }
            },
            recv(self.shutdown_rx) -> _ => Ok(None),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown_tx.try_send(());
    }
}

impl LoopbackPeer {
    /// Sends one inbound line to the session.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Disconnected` if the session side is gone.
    pub fn send_line(&self, line: &str) -> Result<(), ChannelError> {
        self.tx
            .send(line.to_string())
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Receives the next outbound command from the session, with timeout.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Disconnected` on timeout or hangup.
    pub fn recv_command(&self, timeout: Duration) -> Result<String, ChannelError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ChannelError::Io {
                message: format!("no command within {}ms", timeout.as_millis()),
            },
            RecvTimeoutError::Disconnected => ChannelError::Disconnected,
        })
    }

    /// Drains any already-sent commands without blocking.
    #[must_use]
    pub fn drain_commands(&self) -> Vec<String> {
        self.rx.try_iter().collect()
    }
}
