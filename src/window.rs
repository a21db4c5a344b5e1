//! One tracked window, with backend-specific property sets.
//!
//! The legacy (X11) and compositor (Wayland) backends cache different raw
//! properties, so the record carries a tagged variant; the capability surface
//! (§skip/close/activate/minimize) is backend-agnostic. Lifecycle operations
//! are routed back to the owning backend thread over its command channel, so
//! a window that vanished between event delivery and processing degrades to
//! neutral no-ops instead of failing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use tracing::debug;

use crate::geometry::Rect;
use crate::platform::PlatformCommand;

/// Opaque platform window handle.
pub type WindowId = u64;

static CREATED_SEQ: AtomicU64 = AtomicU64::new(1);

/// EWMH window types the legacy backend cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Normal,
    Dialog,
    Utility,
    Menu,
    DropdownMenu,
    PopupMenu,
    Tooltip,
    Dock,
    Desktop,
    Splash,
    Notification,
}

/// Cached `_NET_WM_STATE` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStates {
    pub skip_taskbar: bool,
    pub hidden: bool,
    pub modal: bool,
    pub demands_attention: bool,
}

/// Subset of `_NET_WM_ALLOWED_ACTIONS` consulted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Close,
    Minimize,
}

/// Properties cached for a legacy-backend window.
#[derive(Debug, Clone, Default)]
pub struct X11WindowData {
    pub wm_class: String,
    pub wm_instance: String,
    pub gtk_app_id: String,
    pub window_types: Vec<WindowType>,
    pub states: WindowStates,
    /// `None` when the window never published an allowed-actions list; the
    /// motif hint (if any) decides instead.
    pub allowed_actions: Option<Vec<WindowAction>>,
    pub motif_allow_close: Option<bool>,
    pub transient_for: Option<WindowId>,
    /// XEmbed-style embedding hint; embedded windows never show in the dock.
    pub embedded: bool,
    /// Legacy `WM_COMMAND`, still the best identity source for a few old
    /// clients.
    pub command: Vec<String>,
    /// Virtual desktop index, -1 for sticky windows.
    pub desktop: i32,
}

/// Properties cached for a compositor-backend window.
#[derive(Debug, Clone, Default)]
pub struct WaylandWindowData {
    pub app_id: String,
    pub skip_taskbar: bool,
    pub minimizable: bool,
    pub active: bool,
    pub minimized: bool,
    pub attention: bool,
}

#[derive(Debug, Clone)]
pub enum BackendData {
    X11(X11WindowData),
    Wayland(WaylandWindowData),
}

impl BackendData {
    pub fn as_x11(&self) -> Option<&X11WindowData> {
        match self {
            BackendData::X11(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_wayland(&self) -> Option<&WaylandWindowData> {
        match self {
            BackendData::Wayland(data) => Some(data),
            _ => None,
        }
    }
}

/// One tracked window. Owned by its [`crate::entry::Entry`]; the back
/// reference is the entry id, never a pointer.
#[derive(Debug, Clone)]
pub struct WindowRecord {
    pub id: WindowId,
    pub title: String,
    /// Icon as a name or a base64 data payload, empty when unknown.
    pub icon: String,
    pub pid: u32,
    pub geometry: Rect,
    /// Monotonic creation stamp, used for tie-breaking and close ordering.
    pub created_seq: u64,
    /// Stable identity, empty until identification has run.
    pub inner_id: String,
    /// Compositor-assigned uuid, empty on the legacy backend.
    pub uuid: String,
    /// Id of the owning entry, `None` while unattached.
    pub entry_id: Option<u32>,
    pub backend: BackendData,
    commands: Option<mpsc::Sender<PlatformCommand>>,
}

impl WindowRecord {
    pub fn new_x11(id: WindowId, data: X11WindowData) -> Self {
        Self::new(id, BackendData::X11(data))
    }

    pub fn new_wayland(id: WindowId, data: WaylandWindowData) -> Self {
        Self::new(id, BackendData::Wayland(data))
    }

    fn new(id: WindowId, backend: BackendData) -> Self {
        Self {
            id,
            title: String::new(),
            icon: String::new(),
            pid: 0,
            geometry: Rect::default(),
            created_seq: CREATED_SEQ.fetch_add(1, Ordering::Relaxed),
            inner_id: String::new(),
            uuid: String::new(),
            entry_id: None,
            backend,
            commands: None,
        }
    }

    /// Wire the record to its backend's command channel.
    pub fn with_commands(mut self, commands: mpsc::Sender<PlatformCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Whether the window should never appear in the dock.
    ///
    /// `force_show_app_ids` is the compositor-backend override list for app
    /// ids that must show even when reported non-minimizable.
    pub fn should_skip(&self, force_show_app_ids: &[String]) -> bool {
        match &self.backend {
            BackendData::X11(data) => {
                if data.states.skip_taskbar || data.embedded {
                    return true;
                }
                for t in &data.window_types {
                    match t {
                        WindowType::Utility
                        | WindowType::Menu
                        | WindowType::DropdownMenu
                        | WindowType::PopupMenu
                        | WindowType::Tooltip
                        | WindowType::Dock
                        | WindowType::Desktop
                        | WindowType::Splash
                        | WindowType::Notification => return true,
                        WindowType::Dialog => {
                            // Dialogs that cannot be minimized are transient
                            // helpers, not taskbar material.
                            if !self.allows_minimize() {
                                return true;
                            }
                        }
                        WindowType::Normal => {}
                    }
                }
                false
            }
            BackendData::Wayland(data) => {
                if data.skip_taskbar {
                    return true;
                }
                if !data.minimizable {
                    return !force_show_app_ids.iter().any(|id| id == &data.app_id);
                }
                false
            }
        }
    }

    /// Whether close may be offered for this window.
    pub fn allow_close(&self) -> bool {
        match &self.backend {
            BackendData::X11(data) => match (&data.allowed_actions, data.motif_allow_close) {
                (Some(actions), _) => actions.contains(&WindowAction::Close),
                (None, Some(allow)) => allow,
                (None, None) => true,
            },
            BackendData::Wayland(_) => true,
        }
    }

    fn allows_minimize(&self) -> bool {
        match &self.backend {
            BackendData::X11(data) => data
                .allowed_actions
                .as_ref()
                .map(|actions| actions.contains(&WindowAction::Minimize))
                .unwrap_or(true),
            BackendData::Wayland(data) => data.minimizable,
        }
    }

    pub fn is_demanding_attention(&self) -> bool {
        match &self.backend {
            BackendData::X11(data) => data.states.demands_attention,
            BackendData::Wayland(data) => data.attention,
        }
    }

    pub fn is_minimized(&self) -> bool {
        match &self.backend {
            BackendData::X11(data) => data.states.hidden,
            BackendData::Wayland(data) => data.minimized,
        }
    }

    /// Display title, falling back to class/app-id when the window never set
    /// one.
    pub fn display_name(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        match &self.backend {
            BackendData::X11(data) => {
                if !data.wm_class.is_empty() {
                    data.wm_class.clone()
                } else {
                    data.wm_instance.clone()
                }
            }
            BackendData::Wayland(data) => data.app_id.clone(),
        }
    }

    pub fn close(&self, timestamp: u32) {
        self.send(PlatformCommand::Close {
            window: self.id,
            timestamp,
        });
    }

    pub fn activate(&self) {
        self.send(PlatformCommand::Activate { window: self.id });
    }

    pub fn minimize(&self) {
        self.send(PlatformCommand::Minimize { window: self.id });
    }

    /// Request a full property refresh from the backend.
    pub fn update(&self) {
        self.send(PlatformCommand::Refresh { window: self.id });
    }

    pub fn kill_client(&self) {
        self.send(PlatformCommand::KillClient { window: self.id });
    }

    fn send(&self, command: PlatformCommand) {
        let Some(commands) = &self.commands else {
            return;
        };
        if commands.send(command).is_err() {
            // Backend thread is gone; the window will be detached on the
            // next lifecycle event.
            debug!(window = self.id, "command channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x11_window(data: X11WindowData) -> WindowRecord {
        WindowRecord::new_x11(100, data)
    }

    #[test]
    fn created_seq_is_monotonic() {
        let a = x11_window(X11WindowData::default());
        let b = x11_window(X11WindowData::default());
        assert!(b.created_seq > a.created_seq);
    }

    #[test]
    fn skip_taskbar_state_skips() {
        let w = x11_window(X11WindowData {
            states: WindowStates {
                skip_taskbar: true,
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(w.should_skip(&[]));
    }

    #[test]
    fn utility_and_dock_types_skip() {
        for t in [WindowType::Utility, WindowType::Dock, WindowType::Desktop] {
            let w = x11_window(X11WindowData {
                window_types: vec![t],
                ..Default::default()
            });
            assert!(w.should_skip(&[]), "{t:?} should be skipped");
        }
    }

    #[test]
    fn minimizable_dialog_shows() {
        let w = x11_window(X11WindowData {
            window_types: vec![WindowType::Dialog],
            allowed_actions: Some(vec![WindowAction::Close, WindowAction::Minimize]),
            ..Default::default()
        });
        assert!(!w.should_skip(&[]));
    }

    #[test]
    fn non_minimizable_dialog_skips() {
        let w = x11_window(X11WindowData {
            window_types: vec![WindowType::Dialog],
            allowed_actions: Some(vec![WindowAction::Close]),
            ..Default::default()
        });
        assert!(w.should_skip(&[]));
    }

    #[test]
    fn allow_close_prefers_action_list_over_motif_hint() {
        let w = x11_window(X11WindowData {
            allowed_actions: Some(vec![WindowAction::Minimize]),
            motif_allow_close: Some(true),
            ..Default::default()
        });
        assert!(!w.allow_close());

        let w = x11_window(X11WindowData {
            allowed_actions: None,
            motif_allow_close: Some(false),
            ..Default::default()
        });
        assert!(!w.allow_close());

        let w = x11_window(X11WindowData::default());
        assert!(w.allow_close());
    }

    #[test]
    fn wayland_force_show_overrides_non_minimizable() {
        let data = WaylandWindowData {
            app_id: "dde-osd".to_string(),
            minimizable: false,
            ..Default::default()
        };
        let w = WindowRecord::new_wayland(5, data);
        assert!(w.should_skip(&[]));
        assert!(!w.should_skip(&["dde-osd".to_string()]));
    }

    #[test]
    fn display_name_falls_back_to_class() {
        let mut w = x11_window(X11WindowData {
            wm_class: "Firefox".to_string(),
            wm_instance: "Navigator".to_string(),
            ..Default::default()
        });
        assert_eq!(w.display_name(), "Firefox");
        w.title = "Mozilla Firefox".to_string();
        assert_eq!(w.display_name(), "Mozilla Firefox");
    }

    #[test]
    fn ops_without_backend_are_neutral() {
        let w = x11_window(X11WindowData::default());
        // No command channel wired: all lifecycle ops must be silent no-ops.
        w.close(0);
        w.activate();
        w.minimize();
        w.update();
        w.kill_client();
    }
}
