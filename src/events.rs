//! Typed event stream published to front-end subscribers.
//!
//! Entries, the registry and the orchestrator all push [`DockEvent`]s onto a
//! shared [`EventHub`]; a front-end subscribes and receives events over a
//! plain `mpsc` channel. Dropped subscribers are pruned on the next publish
//! and never block the publisher.

use std::sync::{Arc, Mutex, mpsc};

use crate::entry::EntryMode;
use crate::geometry::Rect;
use crate::hide::HideState;

/// Per-window snapshot exported to the front-end for change detection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WindowInfo {
    pub title: String,
    pub attention: bool,
    pub uuid: String,
}

/// Everything the dock publishes to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum DockEvent {
    EntryAdded { path: String, index: usize },
    EntryRemoved { id: u32 },
    EntryIcon { id: u32, icon: String },
    EntryName { id: u32, name: String },
    EntryActive { id: u32, active: bool },
    EntryDocked { id: u32, docked: bool },
    EntryDesktopFile { id: u32, path: String },
    EntryCurrentWindow { id: u32, window: u64 },
    EntryWindowInfos { id: u32, infos: Vec<(u64, WindowInfo)> },
    EntryMode { id: u32, mode: EntryMode },
    EntryMenu { id: u32, menu: String },
    HideStateChanged(HideState),
    FrontendRectChanged(Rect),
    ShowRecentChanged(bool),
    ShowMultiWindowChanged(bool),
}

/// Broadcast hub in the style of a subscription API: each subscriber gets its
/// own receiver, publication fans out to all live senders.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<DockEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> mpsc::Receiver<DockEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Fan the event out to every live subscriber, dropping dead ones.
    pub fn publish(&self, event: DockEvent) {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
