//! Backend-facing event and command surface.
//!
//! Each backend runs a dedicated thread blocking on its event source and
//! translates raw platform traffic into [`PlatformEvent`]s pushed over a
//! bounded channel into the orchestrator's single processing loop. Lifecycle
//! commands travel the other way over the backend's command channel.

#[cfg(target_os = "linux")]
pub mod x11;

pub mod wayland;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::geometry::Rect;
use crate::window::{WindowAction, WindowId, WindowRecord, WindowStates, WindowType};

/// Bound of the event queue into the orchestrator. Backends block when the
/// orchestrator falls behind rather than growing without limit.
pub const EVENT_QUEUE_BOUND: usize = 256;

/// One refreshed window property. Backends re-read only what the platform
/// reported changed.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowProperty {
    Title(String),
    Icon(String),
    Geometry(Rect),
    Pid(u32),
    States(WindowStates),
    WmClass { instance: String, class: String },
    GtkAppId(String),
    /// `_NET_WM_ALLOWED_ACTIONS` together with the motif close bit; either
    /// hint changing re-reads both, since close permission weighs them
    /// against each other.
    AllowedActions {
        actions: Option<Vec<WindowAction>>,
        motif_allow_close: Option<bool>,
    },
    WindowTypes(Vec<WindowType>),
    TransientFor(Option<WindowId>),
    Embedded(bool),
    Command(Vec<String>),
    Desktop(i32),
    // Compositor-backend properties.
    AppId(String),
    Attention(bool),
    ActiveState(bool),
    Minimized(bool),
}

/// Raw identified traffic handed to the orchestrator.
#[derive(Debug)]
pub enum PlatformEvent {
    /// A window worth tracking appeared; the record carries a full property
    /// snapshot.
    WindowAppeared(WindowRecord),
    WindowGone(WindowId),
    WindowChanged {
        window: WindowId,
        property: WindowProperty,
    },
    ActiveChanged(Option<WindowId>),
    CurrentDesktopChanged(i32),
    ShowingDesktopChanged(bool),
}

/// Lifecycle requests sent back to a backend thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCommand {
    Close { window: WindowId, timestamp: u32 },
    Activate { window: WindowId },
    Minimize { window: WindowId },
    KillClient { window: WindowId },
    Refresh { window: WindowId },
}

/// Running backend: its command channel plus the shutdown handle.
pub struct BackendHandle {
    pub commands: mpsc::Sender<PlatformCommand>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl BackendHandle {
    pub fn new(
        commands: mpsc::Sender<PlatformCommand>,
        stop: Arc<AtomicBool>,
        threads: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            commands,
            stop,
            threads,
        }
    }

    /// Ask the backend threads to wind down and wait for them.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        drop(self.commands);
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}
