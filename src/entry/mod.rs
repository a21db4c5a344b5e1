//! One taskbar slot: a pinned app, a window group, or a recent placeholder.

pub mod menu;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::app::AppRecord;
use crate::config::DisplayMode;
use crate::events::{DockEvent, EventHub, WindowInfo};
use crate::window::{WindowId, WindowRecord};

use menu::{Menu, MenuInputs, build_menu};

static ENTRY_ID: AtomicU32 = AtomicU32::new(1);

/// Where the entry shows up, a pure function of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EntryMode {
    None,
    Normal,
    Recent,
}

/// Display-policy inputs for [`Entry::update_mode`].
#[derive(Debug, Clone, Copy)]
pub struct ModePolicy {
    pub display_mode: DisplayMode,
    pub show_recent: bool,
}

/// Mode as a pure function of the entry's inputs. In fashion display mode
/// with recent apps enabled, undocked entries live in the recent region
/// whether or not they still have windows; window-less undocked entries
/// otherwise disappear.
pub fn compute_mode(
    is_docked: bool,
    has_window: bool,
    display_mode: DisplayMode,
    show_recent: bool,
) -> EntryMode {
    if is_docked {
        return EntryMode::Normal;
    }
    let recent_region = display_mode == DisplayMode::Fashion && show_recent;
    match (has_window, recent_region) {
        (_, true) => EntryMode::Recent,
        (true, false) => EntryMode::Normal,
        (false, false) => EntryMode::None,
    }
}

pub struct Entry {
    /// Process-lifetime unique, monotonically allocated.
    pub id: u32,
    pub inner_id: String,
    pub app: Option<AppRecord>,
    is_docked: bool,
    mode: EntryMode,
    is_active: bool,
    windows: BTreeMap<WindowId, WindowRecord>,
    current: Option<WindowId>,
    /// Exported snapshot used for change detection only.
    window_infos: BTreeMap<WindowId, WindowInfo>,
    hub: EventHub,
    // Last published values, to suppress no-op notifications.
    published_name: String,
    published_icon: String,
    menu: Option<Menu>,
}

impl Entry {
    pub fn new(hub: EventHub, inner_id: impl Into<String>, app: Option<AppRecord>) -> Self {
        Self {
            id: ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            inner_id: inner_id.into(),
            app,
            is_docked: false,
            mode: EntryMode::None,
            is_active: false,
            windows: BTreeMap::new(),
            current: None,
            window_infos: BTreeMap::new(),
            hub,
            published_name: String::new(),
            published_icon: String::new(),
            menu: None,
        }
    }

    pub fn is_docked(&self) -> bool {
        self.is_docked
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn has_window(&self) -> bool {
        !self.windows.is_empty()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn current_window(&self) -> Option<WindowId> {
        self.current
    }

    pub fn windows(&self) -> impl Iterator<Item = &WindowRecord> {
        self.windows.values()
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowRecord> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut WindowRecord> {
        self.windows.get_mut(&id)
    }

    pub fn desktop_path(&self) -> Option<&str> {
        self.app.as_ref().map(|a| a.desktop_path.as_str())
    }

    /// Display name: the app's, falling back to the current window's.
    pub fn name(&self) -> String {
        if let Some(app) = &self.app
            && !app.name.is_empty()
        {
            return app.name.clone();
        }
        self.current
            .and_then(|id| self.windows.get(&id))
            .map(|w| w.display_name())
            .unwrap_or_default()
    }

    /// Icon: the app's, falling back to the current window's.
    pub fn icon(&self) -> String {
        if let Some(app) = &self.app
            && !app.icon.is_empty()
        {
            return app.icon.clone();
        }
        self.current
            .and_then(|id| self.windows.get(&id))
            .map(|w| w.icon.clone())
            .unwrap_or_default()
    }

    /// Register a window under this entry. Returns false (no side effect)
    /// when the id is already attached.
    pub fn attach_window(&mut self, mut window: WindowRecord) -> bool {
        if self.windows.contains_key(&window.id) {
            return false;
        }
        window.entry_id = Some(self.id);
        window.inner_id = self.inner_id.clone();
        let window_id = window.id;
        let was_windowless = self.windows.is_empty();
        self.windows.insert(window_id, window);

        if was_windowless {
            self.set_current(Some(window_id));
        }
        self.refresh_exports();
        debug!(entry = self.id, window = window_id, "window attached");
        true
    }

    /// Unregister a window. Returns true when the entry has become eligible
    /// for removal (no windows and not docked). Detaching a window that is
    /// not attached is a no-op.
    pub fn detach_window(&mut self, window_id: WindowId) -> bool {
        if self.windows.remove(&window_id).is_none() {
            return false;
        }
        if self.current == Some(window_id) {
            let next = self.windows.keys().next().copied();
            self.set_current(next);
        }
        self.refresh_exports();
        debug!(entry = self.id, window = window_id, "window detached");
        self.windows.is_empty() && !self.is_docked
    }

    pub fn set_current(&mut self, window: Option<WindowId>) {
        if self.current == window {
            return;
        }
        self.current = window;
        self.hub.publish(DockEvent::EntryCurrentWindow {
            id: self.id,
            window: window.unwrap_or(0),
        });
    }

    pub fn set_docked(&mut self, docked: bool) {
        if self.is_docked == docked {
            return;
        }
        self.is_docked = docked;
        self.hub.publish(DockEvent::EntryDocked {
            id: self.id,
            docked,
        });
        self.invalidate_menu();
    }

    pub fn set_active(&mut self, active: bool) {
        if self.is_active == active {
            return;
        }
        self.is_active = active;
        self.hub.publish(DockEvent::EntryActive {
            id: self.id,
            active,
        });
    }

    pub fn set_app(&mut self, app: Option<AppRecord>, inner_id: String) {
        self.app = app;
        self.inner_id = inner_id;
        if let Some(path) = self.desktop_path().map(str::to_string) {
            self.hub
                .publish(DockEvent::EntryDesktopFile { id: self.id, path });
        }
        self.refresh_exports();
    }

    /// Recompute the mode; emits a change notification only on an actual
    /// transition.
    pub fn update_mode(&mut self, policy: ModePolicy) {
        let mode = compute_mode(
            self.is_docked,
            self.has_window(),
            policy.display_mode,
            policy.show_recent,
        );
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.hub.publish(DockEvent::EntryMode { id: self.id, mode });
    }

    /// Apply a property refresh for one window (title/icon/attention/
    /// geometry already updated on the record by the caller).
    pub fn window_changed(&mut self, _window_id: WindowId) {
        self.refresh_exports();
    }

    /// Windows that may be offered for closing.
    pub fn allowed_close_windows(&self) -> Vec<WindowId> {
        self.windows
            .values()
            .filter(|w| w.allow_close())
            .map(|w| w.id)
            .collect()
    }

    /// Close every closeable window, newest first.
    pub fn close_all(&self, timestamp: u32) {
        let mut closeable: Vec<&WindowRecord> =
            self.windows.values().filter(|w| w.allow_close()).collect();
        closeable.sort_by(|a, b| b.created_seq.cmp(&a.created_seq));
        for window in closeable {
            window.close(timestamp);
        }
    }

    /// Terminate the owning processes, one signal per unique pid, falling
    /// back to a close request for windows whose pid is unknown or whose
    /// process refused the signal. Clears all windows; the caller finalizes
    /// removal through the registry.
    pub fn force_quit(&mut self, timestamp: u32) {
        let mut pids: Vec<u32> = self
            .windows
            .values()
            .filter(|w| w.pid != 0)
            .map(|w| w.pid)
            .collect();
        pids.sort_unstable();
        pids.dedup();

        for pid in pids {
            if !terminate_process(pid) {
                warn!(pid, "SIGTERM failed, closing windows individually");
                for window in self.windows.values().filter(|w| w.pid == pid) {
                    window.close(timestamp);
                }
            }
        }
        for window in self.windows.values().filter(|w| w.pid == 0) {
            window.close(timestamp);
        }

        self.windows.clear();
        self.set_current(None);
        self.refresh_exports();
    }

    /// Pick the window that becomes current when the present one is being
    /// deactivated: next id in sorted order, wrapping around. Only defined
    /// when more than one window remains.
    pub fn find_next_leader(&self) -> Option<WindowId> {
        if self.windows.len() < 2 {
            return None;
        }
        let current = self.current?;
        let ids: Vec<WindowId> = self.windows.keys().copied().collect();
        let pos = ids.iter().position(|id| *id == current)?;
        Some(ids[(pos + 1) % ids.len()])
    }

    /// Lazily rebuilt context menu, serialized for the front-end.
    pub fn menu_json(&mut self) -> String {
        if self.menu.is_none() {
            self.menu = Some(self.build_menu());
        }
        self.menu
            .as_ref()
            .map(Menu::to_json)
            .unwrap_or_else(|| "{}".to_string())
    }

    pub fn invalidate_menu(&mut self) {
        if self.menu.take().is_some() {
            let json = self.menu_json();
            self.hub.publish(DockEvent::EntryMenu {
                id: self.id,
                menu: json,
            });
        }
    }

    fn build_menu(&self) -> Menu {
        let actions: Vec<(String, String)> = self
            .app
            .as_ref()
            .map(|app| {
                app.actions
                    .iter()
                    .map(|a| (a.section.clone(), a.name.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let windows: Vec<(u64, String, bool)> = self
            .windows
            .values()
            .map(|w| (w.id, w.display_name(), Some(w.id) == self.current))
            .collect();
        let name = self.name();
        build_menu(&MenuInputs {
            app_name: &name,
            is_docked: self.is_docked,
            dockable: true,
            windows,
            actions: &actions,
            any_closeable: self.windows.values().any(|w| w.allow_close()),
        })
    }

    /// Recompute exported name/icon/window-info snapshots and publish only
    /// what actually changed.
    pub fn refresh_exports(&mut self) {
        let name = self.name();
        if name != self.published_name {
            self.published_name = name.clone();
            self.hub.publish(DockEvent::EntryName { id: self.id, name });
        }

        let icon = self.icon();
        if icon != self.published_icon {
            self.published_icon = icon.clone();
            self.hub.publish(DockEvent::EntryIcon { id: self.id, icon });
        }

        let infos: BTreeMap<WindowId, WindowInfo> = self
            .windows
            .values()
            .map(|w| {
                (
                    w.id,
                    WindowInfo {
                        title: w.title.clone(),
                        attention: w.is_demanding_attention(),
                        uuid: w.uuid.clone(),
                    },
                )
            })
            .collect();
        if infos != self.window_infos {
            self.window_infos = infos;
            self.hub.publish(DockEvent::EntryWindowInfos {
                id: self.id,
                infos: self
                    .window_infos
                    .iter()
                    .map(|(id, info)| (*id, info.clone()))
                    .collect(),
            });
        }

        // Any of the above invalidates the menu contents.
        if self.menu.is_some() {
            self.invalidate_menu();
        }
    }
}

fn terminate_process(pid: u32) -> bool {
    // SIGTERM, so the app gets a chance to save state.
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::{WindowRecord, X11WindowData};

    fn entry() -> Entry {
        Entry::new(EventHub::new(), "id-1", None)
    }

    fn window(id: WindowId) -> WindowRecord {
        WindowRecord::new_x11(id, X11WindowData::default())
    }

    #[test]
    fn attach_sets_current_on_first_window() {
        let mut e = entry();
        assert!(e.attach_window(window(42)));
        assert_eq!(e.current_window(), Some(42));
        assert!(e.attach_window(window(43)));
        // Current stays on the first window.
        assert_eq!(e.current_window(), Some(42));
    }

    #[test]
    fn attach_duplicate_id_fails_without_side_effect() {
        let mut e = entry();
        assert!(e.attach_window(window(42)));
        assert!(!e.attach_window(window(42)));
        assert_eq!(e.window_count(), 1);
    }

    #[test]
    fn detach_selects_new_current() {
        let mut e = entry();
        e.attach_window(window(42));
        e.attach_window(window(43));
        assert!(!e.detach_window(42));
        assert_eq!(e.current_window(), Some(43));
    }

    #[test]
    fn detach_last_window_of_undocked_entry_is_removal_eligible() {
        let mut e = entry();
        e.attach_window(window(42));
        assert!(e.detach_window(42));
    }

    #[test]
    fn detach_last_window_of_docked_entry_keeps_entry() {
        let mut e = entry();
        e.set_docked(true);
        e.attach_window(window(42));
        assert!(!e.detach_window(42));
    }

    #[test]
    fn detach_missing_window_is_noop() {
        let hub = EventHub::new();
        let rx = hub.subscribe();
        let mut e = Entry::new(hub, "id-1", None);
        assert!(!e.detach_window(999));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mode_is_pure_and_transition_only_notifies_once() {
        let hub = EventHub::new();
        let mut e = Entry::new(hub.clone(), "id-1", None);
        e.attach_window(window(1));
        let rx = hub.subscribe();

        let policy = ModePolicy {
            display_mode: DisplayMode::Efficient,
            show_recent: false,
        };
        e.update_mode(policy);
        e.update_mode(policy);

        let mode_events: Vec<DockEvent> = rx
            .try_iter()
            .filter(|ev| matches!(ev, DockEvent::EntryMode { .. }))
            .collect();
        assert_eq!(mode_events.len(), 1);
        assert_eq!(e.mode(), EntryMode::Normal);
    }

    #[test]
    fn compute_mode_table() {
        use DisplayMode::*;
        assert_eq!(compute_mode(true, false, Efficient, false), EntryMode::Normal);
        assert_eq!(compute_mode(true, true, Fashion, true), EntryMode::Normal);
        assert_eq!(compute_mode(false, true, Efficient, false), EntryMode::Normal);
        assert_eq!(compute_mode(false, true, Fashion, true), EntryMode::Recent);
        assert_eq!(compute_mode(false, false, Fashion, true), EntryMode::Recent);
        assert_eq!(compute_mode(false, false, Efficient, true), EntryMode::None);
        assert_eq!(compute_mode(false, false, Fashion, false), EntryMode::None);
    }

    #[test]
    fn next_leader_wraps_in_sorted_id_order() {
        let mut e = entry();
        e.attach_window(window(30));
        e.attach_window(window(10));
        e.attach_window(window(20));

        // First attached window (30) is current; sorted order is 10,20,30.
        assert_eq!(e.current_window(), Some(30));
        assert_eq!(e.find_next_leader(), Some(10));

        e.set_current(Some(10));
        assert_eq!(e.find_next_leader(), Some(20));
    }

    #[test]
    fn next_leader_undefined_for_single_window() {
        let mut e = entry();
        e.attach_window(window(1));
        assert_eq!(e.find_next_leader(), None);
    }

    #[test]
    fn close_all_orders_newest_first() {
        // Windows attach in id order but creation sequence is attach order;
        // verify the sort key is creation time, not id.
        let mut e = entry();
        let w_old = window(50); // created first
        let w_new = window(10); // created second
        e.attach_window(w_old);
        e.attach_window(w_new);

        let mut seqs: Vec<(u64, u64)> = e.windows().map(|w| (w.id, w.created_seq)).collect();
        seqs.sort_by(|a, b| b.1.cmp(&a.1));
        assert_eq!(seqs[0].0, 10, "newest window is id 10");
        // close_all itself is command-channel driven; ordering is covered by
        // the sort above plus the platform tests.
        e.close_all(0);
    }

    #[test]
    fn force_quit_clears_windows() {
        let mut e = entry();
        let mut w = window(1);
        w.pid = 0; // unknown pid takes the per-window close path
        e.attach_window(w);
        e.force_quit(0);
        assert_eq!(e.window_count(), 0);
        assert_eq!(e.current_window(), None);
    }

    #[test]
    fn window_info_snapshot_published_only_on_change() {
        let hub = EventHub::new();
        let mut e = Entry::new(hub.clone(), "id-1", None);
        let mut w = window(1);
        w.title = "hello".to_string();
        e.attach_window(w);

        let rx = hub.subscribe();
        e.refresh_exports(); // nothing changed
        assert!(
            rx.try_iter()
                .all(|ev| !matches!(ev, DockEvent::EntryWindowInfos { .. }))
        );

        e.window_mut(1).unwrap().title = "changed".to_string();
        e.refresh_exports();
        assert!(
            rx.try_iter()
                .any(|ev| matches!(ev, DockEvent::EntryWindowInfos { .. }))
        );
    }
}
