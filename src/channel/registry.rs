//! Listener registry: remote-assigned ids for alarm/location listeners.

use std::collections::HashMap;
use std::sync::Mutex;

/// Listener id reported until the remote instance announces one.
pub const UNREGISTERED_ID: &str = "0";

/// Kinds of remote listeners with runtime-assigned ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Alarm,
    Location,
}

impl ListenerKind {
    /// Parses a wire category token.
    #[must_use]
    pub fn parse(category: &str) -> Option<Self> {
        match category {
            "alarm" => Some(Self::Alarm),
            "location" => Some(Self::Location),
            _ => None,
        }
    }

    /// The wire category token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alarm => "alarm",
            Self::Location => "location",
        }
    }
}

/// Tracks the current remote id per listener kind.
///
/// Updated only by inbound `NEW_LISTENER` notifications on the receive
/// loop; read by the orchestrator. A query issued before the matching
/// announcement arrives observes the stale id (initially
/// [`UNREGISTERED_ID`]). That is a known limitation of the protocol, not
/// something this registry papers over.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    ids: Mutex<HashMap<ListenerKind, String>>,
}

impl ListenerRegistry {
    /// Creates an empty registry (all kinds unregistered).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an announced id for a listener kind.
    pub fn on_listener_announced(&self, kind: ListenerKind, id: impl Into<String>) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.insert(kind, id.into());
        }
    }

    /// The latest known id for a kind, or [`UNREGISTERED_ID`].
    #[must_use]
    pub fn current_id(&self, kind: ListenerKind) -> String {
        self.ids
            .lock()
            .ok()
            .and_then(|ids| ids.get(&kind).cloned())
            .unwrap_or_else(|| UNREGISTERED_ID.to_string())
    }
}
