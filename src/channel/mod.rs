//! Control channel to the remote instance.
//!
//! A [`ControlLink`] owns a [`Transport`] and runs a receive-loop thread
//! for the connection's lifetime: one inbound line is decoded into one
//! [`Inbound`] message and dispatched to the listener registry, the
//! response correlator, or the registered passthrough handler.

pub mod correlate;
pub mod message;
pub mod registry;

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::TriggerResult;
use crate::transport::Transport;

pub use correlate::ResponseCorrelator;
pub use message::{Command, Field, Inbound, QueryCategory};
pub use registry::{ListenerKind, ListenerRegistry, UNREGISTERED_ID};

/// Callback invoked once per fully decoded inbound line.
///
/// The raw line is passed uninterpreted; known kinds are additionally
/// dispatched internally.
pub type MessageHandler = Box<dyn Fn(&str) + Send + Sync>;

type SharedHandler = Arc<Mutex<Option<MessageHandler>>>;

/// Live control connection: transport + receive loop + shared channel
/// state.
pub struct ControlLink {
    transport: Arc<dyn Transport>,
    registry: Arc<ListenerRegistry>,
    correlator: Arc<ResponseCorrelator>,
    handler: SharedHandler,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ControlLink {
    /// Wraps a connected transport and starts the receive loop.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let correlator = Arc::new(ResponseCorrelator::new());
        let handler: SharedHandler = Arc::new(Mutex::new(None));

        let join = {
            let transport = Arc::clone(&transport);
            let registry = Arc::clone(&registry);
            let correlator = Arc::clone(&correlator);
            let handler = Arc::clone(&handler);
            thread::Builder::new()
                .name("pathtrigger-recv".to_string())
                .spawn(move || receive_loop(&*transport, &registry, &correlator, &handler))
                .expect("failed to spawn pathtrigger receive loop")
        };

        Self {
            transport,
            registry,
            correlator,
            handler,
            reader: Mutex::new(Some(join)),
        }
    }

    /// Registers the passthrough message handler for the lifetime of the
    /// connection. Replaces any previous handler.
    pub fn on_message(&self, handler: MessageHandler) {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
    }

    /// Sends one command line.
    ///
    /// # Errors
    ///
    /// `ChannelError::Disconnected` once the stream is closed.
    pub fn send(&self, command: &Command) -> TriggerResult<()> {
        self.transport.send_line(&command.to_string())?;
        Ok(())
    }

    /// Sends an INFO query and waits for its correlated reply.
    ///
    /// # Errors
    ///
    /// See [`ResponseCorrelator::query`].
    pub fn query(
        &self,
        category: QueryCategory,
        id: Option<&str>,
        timeout: Duration,
    ) -> TriggerResult<Vec<Field>> {
        self.correlator
            .query(self.transport.as_ref(), category, id, timeout)
    }

    /// The listener registry fed by this link's receive loop.
    #[must_use]
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Returns true while the underlying stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Closes the session: best-effort `CLOSE`, transport teardown, and
    /// cancellation of any pending query. Idempotent.
    pub fn close(&self) {
        if self.transport.is_connected() {
            let _ = self.transport.send_line(&Command::Close.to_string());
        }
        self.transport.shutdown();
        self.correlator.cancel();

        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ControlLink {
    fn drop(&mut self) {
        self.transport.shutdown();
        self.correlator.cancel();
        // The receive loop exits once the transport reports end-of-stream;
        // detach rather than block a drop on a remote that never hangs up.
        if let Ok(mut reader) = self.reader.lock() {
            drop(reader.take());
        }
    }
}

fn receive_loop(
    transport: &dyn Transport,
    registry: &ListenerRegistry,
    correlator: &ResponseCorrelator,
    handler: &SharedHandler,
) {
    loop {
        let line = match transport.recv_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "receive loop ending on transport fault");
                break;
            }
        };

        if let Ok(slot) = handler.lock() {
            if let Some(h) = slot.as_ref() {
                h(&line);
            }
        }

        let Some(message) = Inbound::parse(&line) else {
            continue;
        };

        match message {
            Inbound::Info {
                category, fields, ..
            } => {
                correlator.deliver(&category, fields);
            }
            Inbound::NewListener { category, id } => match ListenerKind::parse(&category) {
                Some(kind) => {
                    debug!(kind = kind.as_str(), id = %id, "listener announced");
                    registry.on_listener_announced(kind, id);
                }
                None => {
                    warn!(category = %category, "ignoring announcement for unknown listener kind");
                }
            },
            Inbound::Close => {
                debug!("remote closed the session");
                break;
            }
            Inbound::Other { line } => {
                debug!(line = %line, "passthrough message");
            }
        }
    }

    transport.shutdown();
    correlator.cancel();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::transport::loopback_pair;

    use super::*;

    #[test]
    fn test_new_listener_updates_registry() {
        let (transport, peer) = loopback_pair();
        let link = ControlLink::new(Arc::new(transport));

        peer.send_line("NEW_LISTENER location 42").unwrap();

        // The receive loop runs on its own thread; poll the registry
        // briefly rather than assuming scheduling order.
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while link.registry().current_id(ListenerKind::Location) == UNREGISTERED_ID {
            assert!(std::time::Instant::now() < deadline, "announcement not applied");
            thread::yield_now();
        }
        assert_eq!(link.registry().current_id(ListenerKind::Location), "42");
        assert_eq!(link.registry().current_id(ListenerKind::Alarm), "0");
    }

    #[test]
    fn test_query_correlates_through_receive_loop() {
        let (transport, peer) = loopback_pair();
        let link = Arc::new(ControlLink::new(Arc::new(transport)));

        let waiter = {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                link.query(QueryCategory::Time, None, Duration::from_secs(1))
            })
        };

        let cmd = peer.recv_command(Duration::from_secs(1)).unwrap();
        assert_eq!(cmd, "INFO time");
        peer.send_line("INFO time 0 time:1700000000").unwrap();

        let fields = waiter.join().unwrap().unwrap();
        assert_eq!(fields, vec![Field::new("time", "1700000000")]);
    }

    #[test]
    fn test_passthrough_handler_sees_every_line() {
        let (transport, peer) = loopback_pair();
        let link = ControlLink::new(Arc::new(transport));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        link.on_message(Box::new(move |_line| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        peer.send_line("HEARTBEAT 1").unwrap();
        peer.send_line("NEW_LISTENER alarm 5").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while seen.load(Ordering::SeqCst) < 2 {
            assert!(std::time::Instant::now() < deadline, "handler not invoked");
            thread::yield_now();
        }
    }

    #[test]
    fn test_close_cancels_pending_query() {
        let (transport, peer) = loopback_pair();
        let link = Arc::new(ControlLink::new(Arc::new(transport)));

        let waiter = {
            let link = Arc::clone(&link);
            thread::spawn(move || {
                link.query(QueryCategory::Alarm, Some("0"), Duration::from_secs(5))
            })
        };

        peer.recv_command(Duration::from_secs(1)).unwrap();
        link.close();

        let result = waiter.join().unwrap();
        assert!(result.is_err());
        assert!(!link.is_connected());
    }

    #[test]
    fn test_send_after_close_is_disconnected() {
        let (transport, _peer) = loopback_pair();
        let link = ControlLink::new(Arc::new(transport));

        link.close();
        let err = link
            .send(&Command::Start {
                package: "com.example".to_string(),
            })
            .unwrap_err();
        assert!(err.is_channel());
    }
}
