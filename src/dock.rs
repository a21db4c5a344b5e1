//! The orchestrator: single-threaded core that owns all dock state.
//!
//! Backends and the front-end feed one bounded channel; every message is
//! processed on the dock-core thread, so entries, settings and the hide
//! machine never need internal locking. Hide evaluation is debounced with a
//! deadline woven into the loop's receive timeout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::app::{
    AppLauncher, DesktopEntryProvider, LaunchRecorder, WindowMatcher, autostart_dir, is_under_dir,
};
use crate::config::{
    ConfigContext, ConfigStore, DisplayMode, DockSettings, HideMode, MAX_RECENT_APPS,
};
use crate::entry::menu::{
    MENU_ACTION_PREFIX, MENU_CLOSE_ALL, MENU_DOCK, MENU_FORCE_QUIT, MENU_LAUNCH, MENU_UNDOCK,
    MENU_WINDOW_PREFIX,
};
use crate::entry::{Entry, EntryMode, ModePolicy};
use crate::error::{DockError, DockResult};
use crate::events::{DockEvent, EventHub};
use crate::geometry::{Position, Rect};
use crate::hide::{self, HideInputs, HideState};
use crate::identify::{
    IdentificationChain, IdentifyContext, IdentifyResult, ProcessInfo, RuleTable,
    inner_id_for_app, window_fallback_inner_id,
};
use crate::platform::{EVENT_QUEUE_BOUND, PlatformEvent, WindowProperty};
use crate::registry::EntryRegistry;
use crate::scratch::ScratchManager;
use crate::window::{BackendData, WindowId, WindowRecord};

/// Wake-up period when no hide evaluation is pending.
const IDLE_TICK: Duration = Duration::from_millis(500);

/// External collaborators handed to [`Dock::new`].
pub struct DockServices {
    pub provider: Arc<dyn DesktopEntryProvider>,
    pub launcher: Arc<dyn AppLauncher>,
    pub recorder: Arc<dyn LaunchRecorder>,
    pub matcher: Option<Arc<dyn WindowMatcher>>,
    pub process: Arc<dyn ProcessInfo>,
    pub store: Arc<dyn ConfigStore>,
    pub rules: RuleTable,
    pub scratch_dir: PathBuf,
}

/// Front-end request surface, processed on the core thread.
#[derive(Debug)]
pub enum DockRequest {
    MoveEntry { from: usize, to: usize },
    ActivateEntry { entry: u32, timestamp: u32 },
    ActivateWindow { window: WindowId },
    CloseWindow { window: WindowId, timestamp: u32 },
    MenuItem { entry: u32, item: String, timestamp: u32 },
    DropFiles { entry: u32, files: Vec<String>, timestamp: u32 },
    Dock { desktop_path: String, index: isize },
    Undock { entry: u32 },
    UndockPath { path: String },
    IsDocked { path: String, reply: mpsc::Sender<bool> },
    EntryPaths { reply: mpsc::Sender<Vec<String>> },
    QueryMenu { entry: u32, reply: mpsc::Sender<String> },
    QueryCloseableWindows { entry: u32, reply: mpsc::Sender<Vec<WindowId>> },
    QuerySettings { reply: mpsc::Sender<DockSettings> },
    QueryHideState { reply: mpsc::Sender<HideState> },
    QueryPluginSettings { reply: mpsc::Sender<String> },
    MergePluginSettings(String),
    RemovePluginSettings { plugin: String, keys: Vec<String> },
    SetHideMode(HideMode),
    SetDisplayMode(DisplayMode),
    SetPosition(Position),
    SetIconSize(u32),
    SetShowRecent(bool),
    SetShowMultiWindow(bool),
    SetHideTimeout(u64),
    SetShowTimeout(u64),
    FrontendRect(Rect),
    LauncherVisible(bool),
}

/// Everything the core loop receives.
#[derive(Debug)]
pub enum DockMessage {
    Platform(PlatformEvent),
    Request(DockRequest),
    Shutdown,
}

impl From<PlatformEvent> for DockMessage {
    fn from(event: PlatformEvent) -> Self {
        DockMessage::Platform(event)
    }
}

pub struct Dock {
    registry: EntryRegistry,
    config: ConfigContext,
    chain: IdentificationChain,
    identify_ctx: IdentifyContext,
    scratch: ScratchManager,
    hub: EventHub,
    launcher: Arc<dyn AppLauncher>,
    recorder: Arc<dyn LaunchRecorder>,
    /// Windows seen by a backend but currently ineligible for the taskbar.
    /// Kept so a later property change can bring them in.
    skipped: HashMap<WindowId, WindowRecord>,
    active_window: Option<WindowId>,
    active_entry: Option<u32>,
    current_desktop: i32,
    showing_desktop: bool,
    launcher_visible: bool,
    frontend_rect: Rect,
    hide_state: HideState,
    hide_deadline: Option<Instant>,
}

impl Dock {
    pub fn new(services: DockServices) -> Self {
        let hub = EventHub::new();
        let config = ConfigContext::load(services.store);
        let identify_ctx = IdentifyContext {
            provider: services.provider,
            matcher: services.matcher,
            process: services.process,
            scratch_dir: services.scratch_dir.clone(),
            rules: services.rules,
        };
        Self {
            registry: EntryRegistry::new(hub.clone()),
            config,
            chain: IdentificationChain::standard(),
            identify_ctx,
            scratch: ScratchManager::new(services.scratch_dir),
            hub,
            launcher: services.launcher,
            recorder: services.recorder,
            skipped: HashMap::new(),
            active_window: None,
            active_entry: None,
            current_desktop: 0,
            showing_desktop: false,
            launcher_visible: false,
            frontend_rect: Rect::default(),
            hide_state: HideState::Unknown,
            hide_deadline: None,
        }
    }

    /// Event hub for front-end subscriptions. Subscribe before [`spawn`]
    /// to catch the entries created during initialization.
    ///
    /// [`spawn`]: Dock::spawn
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn hide_state(&self) -> HideState {
        self.hide_state
    }

    pub fn registry(&self) -> &EntryRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DockSettings {
        self.config.settings()
    }

    /// Restore persisted state: docked pins first, then the recent region,
    /// then the first hide evaluation.
    pub fn init(&mut self) {
        self.restore_docked();
        self.materialize_recent();
        self.apply_hide_now();
    }

    /// Move the core onto its own thread.
    pub fn spawn(mut self) -> DockHandle {
        let (tx, rx) = mpsc::sync_channel(EVENT_QUEUE_BOUND);
        let thread = thread::Builder::new()
            .name("dock-core".to_string())
            .spawn(move || {
                self.init();
                self.run(rx);
            })
            .expect("spawn dock core thread");
        DockHandle {
            tx,
            thread: Some(thread),
        }
    }

    fn run(mut self, rx: mpsc::Receiver<DockMessage>) {
        info!("dock core loop started");
        loop {
            let timeout = self
                .hide_deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_TICK);
            match rx.recv_timeout(timeout) {
                Ok(DockMessage::Shutdown) => break,
                Ok(DockMessage::Platform(event)) => self.handle_platform_event(event),
                Ok(DockMessage::Request(request)) => self.handle_request(request),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            self.flush_hide_deadline();
        }
        info!("dock core loop stopped");
    }

    /* ── platform traffic ─────────────────────────────────── */

    pub fn handle_platform_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::WindowAppeared(record) => self.window_appeared(record),
            PlatformEvent::WindowGone(id) => self.window_gone(id),
            PlatformEvent::WindowChanged { window, property } => {
                self.window_changed(window, property)
            }
            PlatformEvent::ActiveChanged(window) => {
                self.active_window = window;
                self.refresh_active_entry();
                self.schedule_hide_eval();
            }
            PlatformEvent::CurrentDesktopChanged(desktop) => {
                self.current_desktop = desktop;
                self.schedule_hide_eval();
            }
            PlatformEvent::ShowingDesktopChanged(showing) => {
                self.showing_desktop = showing;
                self.schedule_hide_eval();
            }
        }
    }

    fn window_appeared(&mut self, record: WindowRecord) {
        if self.registry.by_window(record.id).is_some() || self.skipped.contains_key(&record.id) {
            debug!(window = record.id, "duplicate window announcement ignored");
            return;
        }
        let force_show = self.config.settings().force_show_app_ids.clone();
        if record.should_skip(&force_show) {
            debug!(window = record.id, "window not taskbar material, parked");
            self.skipped.insert(record.id, record);
            return;
        }
        self.identify_and_place(record);
        self.refresh_active_entry();
        self.schedule_hide_eval();
    }

    fn window_gone(&mut self, id: WindowId) {
        if self.skipped.remove(&id).is_some() {
            return;
        }
        let policy = self.policy();
        let Some(entry) = self.registry.by_window_mut(id) else {
            return;
        };
        let entry_id = entry.id;
        let removable = entry.detach_window(id);
        entry.update_mode(policy);
        if removable && entry.mode() == EntryMode::None {
            self.registry.remove(entry_id);
        }
        if self.active_window == Some(id) {
            self.active_window = None;
        }
        self.refresh_active_entry();
        self.schedule_hide_eval();
    }

    fn window_changed(&mut self, id: WindowId, property: WindowProperty) {
        let force_show = self.config.settings().force_show_app_ids.clone();

        // Parked windows may become eligible.
        if let Some(mut record) = self.skipped.remove(&id) {
            apply_property(&mut record, property);
            if record.should_skip(&force_show) {
                self.skipped.insert(id, record);
            } else {
                self.identify_and_place(record);
                self.refresh_active_entry();
                self.schedule_hide_eval();
            }
            return;
        }

        let policy = self.policy();
        let (entry_id, impact, snapshot) = {
            let Some(entry) = self.registry.by_window_mut(id) else {
                return;
            };
            let entry_id = entry.id;
            let Some(record) = entry.window_mut(id) else {
                return;
            };
            let impact = apply_property(record, property);
            (entry_id, impact, record.clone())
        };

        if impact.eligibility && snapshot.should_skip(&force_show) {
            debug!(window = id, "window became ineligible, parked");
            self.remove_window_from_entry(entry_id, id, policy);
            self.skipped.insert(id, snapshot);
            self.refresh_active_entry();
            self.schedule_hide_eval();
            return;
        }

        if impact.identity {
            let result = self.chain.identify(&self.identify_ctx, &snapshot, &self.registry);
            let current_inner = self
                .registry
                .by_id(entry_id)
                .map(|e| e.inner_id.clone())
                .unwrap_or_default();
            if result.inner_id != current_inner {
                debug!(
                    window = id,
                    from = %current_inner,
                    to = %result.inner_id,
                    "window identity changed, reattaching"
                );
                self.remove_window_from_entry(entry_id, id, policy);
                self.place_window(snapshot, result);
                self.refresh_active_entry();
            } else if let Some(entry) = self.registry.by_id_mut(entry_id) {
                entry.window_changed(id);
            }
        } else if let Some(entry) = self.registry.by_id_mut(entry_id) {
            entry.window_changed(id);
        }

        if impact.hide {
            self.schedule_hide_eval();
        }
    }

    fn identify_and_place(&mut self, record: WindowRecord) {
        let result = self.chain.identify(&self.identify_ctx, &record, &self.registry);
        self.place_window(record, result);
    }

    /// Attach a window to the entry of its identity, creating the entry when
    /// none exists yet.
    fn place_window(&mut self, record: WindowRecord, result: IdentifyResult) {
        let policy = self.policy();
        if let Some(entry) = self.registry.by_inner_id_mut(&result.inner_id) {
            entry.attach_window(record);
            entry.update_mode(policy);
            return;
        }
        let path = result.app.as_ref().map(|a| a.desktop_path.clone());
        let mut entry = Entry::new(self.hub.clone(), result.inner_id, result.app);
        entry.attach_window(record);
        let id = self.registry.append(entry);
        if let Some(entry) = self.registry.by_id_mut(id) {
            entry.update_mode(policy);
        }
        if let Some(path) = path {
            self.mark_recent(&path);
        }
    }

    fn remove_window_from_entry(&mut self, entry_id: u32, window: WindowId, policy: ModePolicy) {
        let Some(entry) = self.registry.by_id_mut(entry_id) else {
            return;
        };
        let removable = entry.detach_window(window);
        entry.update_mode(policy);
        if removable && entry.mode() == EntryMode::None {
            self.registry.remove(entry_id);
        }
    }

    /// Recompute which entry is active and keep its current window in sync
    /// with the platform's active window.
    fn refresh_active_entry(&mut self) {
        let active_window = self.active_window;
        let active_entry = active_window.and_then(|w| self.registry.by_window(w).map(|e| e.id));
        for entry in self.registry.iter_mut() {
            let is_active = Some(entry.id) == active_entry;
            entry.set_active(is_active);
            if is_active && let Some(w) = active_window {
                entry.set_current(Some(w));
            }
        }
        self.active_entry = active_entry;
    }

    /* ── requests ─────────────────────────────────────────── */

    pub fn handle_request(&mut self, request: DockRequest) {
        match request {
            DockRequest::MoveEntry { from, to } => {
                if self.registry.move_entry(from, to) {
                    self.persist_docked();
                }
            }
            DockRequest::ActivateEntry { entry, timestamp } => {
                self.activate_entry(entry, timestamp)
            }
            DockRequest::ActivateWindow { window } => {
                if let Some(w) = self.registry.by_window(window).and_then(|e| e.window(window)) {
                    w.activate();
                }
            }
            DockRequest::CloseWindow { window, timestamp } => {
                if let Some(w) = self.registry.by_window(window).and_then(|e| e.window(window)) {
                    w.close(timestamp);
                }
            }
            DockRequest::MenuItem {
                entry,
                item,
                timestamp,
            } => self.menu_item(entry, &item, timestamp),
            DockRequest::DropFiles {
                entry,
                files,
                timestamp,
            } => {
                let path = self
                    .registry
                    .by_id(entry)
                    .and_then(|e| e.desktop_path().map(str::to_string));
                if let Some(path) = path {
                    self.launch(&path, &files, timestamp);
                }
            }
            DockRequest::Dock {
                desktop_path,
                index,
            } => {
                self.dock_path(&desktop_path, index);
            }
            DockRequest::Undock { entry } => {
                self.undock_entry(entry);
            }
            DockRequest::UndockPath { path } => {
                if let Some(id) = self.registry.by_desktop_path(&path).map(|e| e.id) {
                    self.undock_entry(id);
                }
            }
            DockRequest::IsDocked { path, reply } => {
                let docked = self
                    .registry
                    .by_desktop_path(&path)
                    .is_some_and(|e| e.is_docked());
                let _ = reply.send(docked);
            }
            DockRequest::EntryPaths { reply } => {
                let _ = reply.send(self.registry.entry_paths());
            }
            DockRequest::QueryMenu { entry, reply } => {
                let json = self
                    .registry
                    .by_id_mut(entry)
                    .map(|e| e.menu_json())
                    .unwrap_or_else(|| "{}".to_string());
                let _ = reply.send(json);
            }
            DockRequest::QueryCloseableWindows { entry, reply } => {
                let windows = self
                    .registry
                    .by_id(entry)
                    .map(|e| e.allowed_close_windows())
                    .unwrap_or_default();
                let _ = reply.send(windows);
            }
            DockRequest::QuerySettings { reply } => {
                let _ = reply.send(self.config.settings().clone());
            }
            DockRequest::QueryHideState { reply } => {
                let _ = reply.send(self.hide_state);
            }
            DockRequest::QueryPluginSettings { reply } => {
                let _ = reply.send(self.config.plugin_settings_json());
            }
            DockRequest::MergePluginSettings(json) => {
                if let Err(e) = self.config.merge_plugin_settings(&json) {
                    warn!("malformed plugin settings rejected: {e}");
                }
            }
            DockRequest::RemovePluginSettings { plugin, keys } => {
                self.config.remove_plugin_settings(&plugin, &keys);
            }
            DockRequest::SetHideMode(mode) => {
                if self.config.settings().hide_mode != mode {
                    self.config.update(|s| s.hide_mode = mode);
                    self.apply_hide_now();
                }
            }
            DockRequest::SetDisplayMode(mode) => {
                if self.config.settings().display_mode != mode {
                    self.config.update(|s| s.display_mode = mode);
                    self.refresh_modes();
                    self.materialize_recent();
                }
            }
            DockRequest::SetPosition(position) => {
                if self.config.settings().position != position {
                    self.config.update(|s| s.position = position);
                    self.schedule_hide_eval();
                }
            }
            DockRequest::SetIconSize(size) => {
                if size > 0 && self.config.settings().icon_size != size {
                    self.config.update(|s| s.icon_size = size);
                }
            }
            DockRequest::SetShowRecent(show) => {
                if self.config.settings().show_recent != show {
                    self.config.update(|s| s.show_recent = show);
                    self.refresh_modes();
                    self.materialize_recent();
                    self.hub.publish(DockEvent::ShowRecentChanged(show));
                }
            }
            DockRequest::SetShowMultiWindow(show) => {
                if self.config.settings().show_multi_window != show {
                    self.config.update(|s| s.show_multi_window = show);
                    self.hub.publish(DockEvent::ShowMultiWindowChanged(show));
                }
            }
            DockRequest::SetHideTimeout(ms) => {
                self.config.update(|s| s.hide_timeout_ms = ms);
            }
            DockRequest::SetShowTimeout(ms) => {
                self.config.update(|s| s.show_timeout_ms = ms);
            }
            DockRequest::FrontendRect(rect) => {
                if self.frontend_rect != rect {
                    self.frontend_rect = rect;
                    self.hub.publish(DockEvent::FrontendRectChanged(rect));
                    self.schedule_hide_eval();
                }
            }
            DockRequest::LauncherVisible(visible) => {
                if self.launcher_visible != visible {
                    self.launcher_visible = visible;
                    self.schedule_hide_eval();
                }
            }
        }
    }

    /// Click on an entry: launch when windowless, otherwise cycle or
    /// minimize when already active, otherwise raise.
    fn activate_entry(&mut self, entry_id: u32, timestamp: u32) {
        enum Action {
            Launch(String),
            None,
        }
        let action = {
            let Some(entry) = self.registry.by_id(entry_id) else {
                return;
            };
            if !entry.has_window() {
                match entry.desktop_path() {
                    Some(path) => Action::Launch(path.to_string()),
                    None => Action::None,
                }
            } else {
                if entry.is_active() {
                    if let Some(next) = entry.find_next_leader() {
                        if let Some(w) = entry.window(next) {
                            w.activate();
                        }
                    } else if let Some(w) =
                        entry.current_window().and_then(|id| entry.window(id))
                    {
                        w.minimize();
                    }
                } else if let Some(w) = entry.current_window().and_then(|id| entry.window(id)) {
                    w.activate();
                }
                Action::None
            }
        };
        if let Action::Launch(path) = action {
            self.launch(&path, &[], timestamp);
        }
    }

    fn menu_item(&mut self, entry_id: u32, item: &str, timestamp: u32) {
        match item {
            MENU_LAUNCH => {
                let path = self
                    .registry
                    .by_id(entry_id)
                    .and_then(|e| e.desktop_path().map(str::to_string));
                if let Some(path) = path {
                    self.launch(&path, &[], timestamp);
                }
            }
            MENU_DOCK => {
                self.dock_entry(entry_id);
            }
            MENU_UNDOCK => {
                self.undock_entry(entry_id);
            }
            MENU_CLOSE_ALL => {
                if let Some(entry) = self.registry.by_id(entry_id) {
                    entry.close_all(timestamp);
                }
            }
            MENU_FORCE_QUIT => {
                let policy = self.policy();
                let Some(entry) = self.registry.by_id_mut(entry_id) else {
                    return;
                };
                entry.force_quit(timestamp);
                entry.update_mode(policy);
                if !entry.is_docked() && entry.mode() == EntryMode::None {
                    self.registry.remove(entry_id);
                }
                self.refresh_active_entry();
                self.schedule_hide_eval();
            }
            _ if item.starts_with(MENU_WINDOW_PREFIX) => {
                let id = item[MENU_WINDOW_PREFIX.len()..].parse::<WindowId>().ok();
                if let Some(w) = id
                    .and_then(|id| self.registry.by_id(entry_id).and_then(|e| e.window(id)))
                {
                    w.activate();
                }
            }
            _ if item.starts_with(MENU_ACTION_PREFIX) => {
                let section = &item[MENU_ACTION_PREFIX.len()..];
                let path = self
                    .registry
                    .by_id(entry_id)
                    .and_then(|e| e.desktop_path().map(str::to_string));
                if let Some(path) = path {
                    if let Err(e) = self.launcher.launch_action(&path, section, timestamp) {
                        warn!(path, section, "action launch failed: {e}");
                    } else {
                        self.recorder.mark_launched(&path);
                    }
                }
            }
            other => warn!(entry = entry_id, item = other, "unknown menu item"),
        }
    }

    /* ── dock / undock ────────────────────────────────────── */

    /// Pin an entry. Entries without a resolved application get a scratch
    /// desktop entry first; failure to create it aborts the pin.
    pub fn dock_entry(&mut self, entry_id: u32) -> bool {
        let policy = self.policy();
        let (is_docked, app, current_window) = {
            let Some(entry) = self.registry.by_id(entry_id) else {
                return false;
            };
            (
                entry.is_docked(),
                entry.app.clone(),
                entry.current_window().and_then(|id| entry.window(id).cloned()),
            )
        };
        if is_docked {
            return true;
        }

        let app = match app {
            None => {
                let Some(window) = current_window else {
                    warn!(entry = entry_id, "nothing to derive a scratch entry from");
                    return false;
                };
                let inner = window_fallback_inner_id(&self.identify_ctx, &window);
                let cmdline = self
                    .identify_ctx
                    .process
                    .cmdline(window.pid)
                    .unwrap_or_default();
                match self.scratch.create_for_window(&window, &inner, &cmdline) {
                    Ok(app) => app,
                    Err(e) => {
                        warn!(entry = entry_id, "scratch entry failed, dock aborted: {e}");
                        return false;
                    }
                }
            }
            // Autostart symlink targets are volatile; pin a private copy.
            Some(app)
                if is_under_dir(&app.desktop_path, &autostart_dir())
                    && !self.scratch.contains(&app.desktop_path) =>
            {
                match self.scratch.copy_desktop_file(&app) {
                    Ok(copy) => copy,
                    Err(e) => {
                        warn!(entry = entry_id, "desktop file copy failed, dock aborted: {e}");
                        return false;
                    }
                }
            }
            Some(app) => app,
        };

        let inner_id = inner_id_for_app(&app.desktop_path);
        if let Some(entry) = self.registry.by_id_mut(entry_id) {
            if entry.inner_id != inner_id || entry.app.as_ref() != Some(&app) {
                entry.set_app(Some(app), inner_id);
            }
            entry.set_docked(true);
            entry.update_mode(policy);
        }
        self.persist_docked();
        true
    }

    /// Unpin an entry. Scratch files are removed and, when windows remain,
    /// the current window is re-identified to restore its natural identity.
    pub fn undock_entry(&mut self, entry_id: u32) -> bool {
        let policy = self.policy();
        let (is_docked, app, current_window, has_window) = {
            let Some(entry) = self.registry.by_id(entry_id) else {
                return false;
            };
            (
                entry.is_docked(),
                entry.app.clone(),
                entry.current_window().and_then(|id| entry.window(id).cloned()),
                entry.has_window(),
            )
        };
        if !is_docked {
            return true;
        }

        let was_scratch = app
            .as_ref()
            .is_some_and(|a| self.scratch.contains(&a.desktop_path));
        if was_scratch && let Some(app) = &app {
            self.scratch.remove(&app.desktop_path);
        }

        if was_scratch && has_window {
            if let Some(window) = current_window {
                let result = self.chain.identify(&self.identify_ctx, &window, &self.registry);
                if let Some(entry) = self.registry.by_id_mut(entry_id) {
                    entry.set_app(result.app, result.inner_id);
                }
            }
        }

        if let Some(entry) = self.registry.by_id_mut(entry_id) {
            entry.set_docked(false);
            entry.update_mode(policy);
            let junk = !has_window && (entry.mode() == EntryMode::None || entry.app.is_none());
            if junk {
                self.registry.remove(entry_id);
            }
        }
        self.persist_docked();
        true
    }

    /// Pin by desktop path, creating the entry when the app has no windows.
    pub fn dock_path(&mut self, path: &str, index: isize) -> bool {
        if let Some(id) = self.registry.by_desktop_path(path).map(|e| e.id) {
            let ok = self.dock_entry(id);
            if ok && index >= 0
                && let Some(current) = self.registry.index_of(id)
            {
                self.registry.move_entry(current, index as usize);
            }
            return ok;
        }

        let Some(app) = self.identify_ctx.provider.by_path(path) else {
            warn!(path, "{}", DockError::DesktopEntryNotFound(path.to_string()));
            return false;
        };
        let policy = self.policy();
        let inner_id = inner_id_for_app(&app.desktop_path);
        let entry = Entry::new(self.hub.clone(), inner_id, Some(app));
        let id = self.registry.insert(entry, index);
        if let Some(entry) = self.registry.by_id_mut(id) {
            entry.set_docked(true);
            entry.update_mode(policy);
        }
        self.persist_docked();
        true
    }

    /* ── launching and persistence ────────────────────────── */

    fn launch(&mut self, path: &str, files: &[String], timestamp: u32) {
        match self.launcher.launch(path, files, timestamp) {
            Ok(()) => {
                self.recorder.mark_launched(path);
                self.mark_recent(path);
            }
            Err(e) => warn!(path, "launch failed: {e}"),
        }
    }

    fn mark_recent(&mut self, path: &str) {
        let path = path.to_string();
        self.config.update(move |s| {
            s.recent_apps.retain(|p| p != &path);
            s.recent_apps.insert(0, path);
            s.recent_apps.truncate(MAX_RECENT_APPS);
        });
    }

    fn persist_docked(&mut self) {
        let paths = self.registry.docked_paths();
        self.config.update(move |s| s.docked_apps = paths);
    }

    fn restore_docked(&mut self) {
        let paths = self.config.settings().docked_apps.clone();
        for path in paths {
            if self.registry.by_desktop_path(&path).is_some() {
                continue;
            }
            let Some(app) = self.identify_ctx.provider.by_path(&path) else {
                warn!(path, "docked desktop entry vanished, dropping pin");
                continue;
            };
            let policy = self.policy();
            let inner_id = inner_id_for_app(&app.desktop_path);
            let entry = Entry::new(self.hub.clone(), inner_id, Some(app));
            let id = self.registry.append(entry);
            if let Some(entry) = self.registry.by_id_mut(id) {
                entry.set_docked(true);
                entry.update_mode(policy);
            }
        }
        self.persist_docked();
    }

    /// Create recent-region placeholders for remembered apps, in fashion
    /// mode with the recent region enabled.
    fn materialize_recent(&mut self) {
        let policy = self.policy();
        if policy.display_mode != DisplayMode::Fashion || !policy.show_recent {
            return;
        }
        let recents = self.config.settings().recent_apps.clone();
        for path in recents {
            if self.registry.by_desktop_path(&path).is_some() {
                continue;
            }
            let Some(app) = self.identify_ctx.provider.by_path(&path) else {
                continue;
            };
            let inner_id = inner_id_for_app(&app.desktop_path);
            let entry = Entry::new(self.hub.clone(), inner_id, Some(app));
            let id = self.registry.append(entry);
            if let Some(entry) = self.registry.by_id_mut(id) {
                entry.update_mode(policy);
            }
        }
    }

    /// Re-apply the display policy to every entry and drop the ones that no
    /// longer show anywhere.
    fn refresh_modes(&mut self) {
        let policy = self.policy();
        let mut prune = Vec::new();
        for entry in self.registry.iter_mut() {
            entry.update_mode(policy);
            if !entry.is_docked() && !entry.has_window() && entry.mode() == EntryMode::None {
                prune.push(entry.id);
            }
        }
        for id in prune {
            self.registry.remove(id);
        }
    }

    fn policy(&self) -> ModePolicy {
        let settings = self.config.settings();
        ModePolicy {
            display_mode: settings.display_mode,
            show_recent: settings.show_recent,
        }
    }

    /* ── hide machine ─────────────────────────────────────── */

    fn desired_hide_state(&self) -> HideState {
        let active_window = if self.showing_desktop {
            None
        } else {
            self.active_window.and_then(|w| {
                self.registry
                    .by_window(w)
                    .and_then(|e| e.window(w))
                    .or_else(|| self.skipped.get(&w))
            })
        };
        let inputs = HideInputs {
            frontend_rect: self.frontend_rect,
            position: self.config.settings().position,
            launcher_visible: self.launcher_visible,
            current_desktop: self.current_desktop,
            active_window,
        };
        hide::evaluate(self.config.settings().hide_mode, &inputs)
    }

    /// Arm (or re-arm) the debounce deadline. A pending change back to the
    /// published state cancels the timer instead.
    fn schedule_hide_eval(&mut self) {
        let desired = self.desired_hide_state();
        if desired == self.hide_state {
            self.hide_deadline = None;
            return;
        }
        let delay_ms = match desired {
            HideState::Hide => self.config.settings().hide_timeout_ms,
            _ => self.config.settings().show_timeout_ms,
        };
        self.hide_deadline = Some(Instant::now() + Duration::from_millis(delay_ms));
    }

    fn flush_hide_deadline(&mut self) {
        let Some(deadline) = self.hide_deadline else {
            return;
        };
        if Instant::now() < deadline {
            return;
        }
        self.hide_deadline = None;
        let desired = self.desired_hide_state();
        if desired != self.hide_state {
            self.hide_state = desired;
            self.hub.publish(DockEvent::HideStateChanged(desired));
        }
    }

    /// Evaluate and publish without waiting out the debounce. Used at
    /// startup and for explicit mode switches.
    pub fn apply_hide_now(&mut self) {
        self.hide_deadline = None;
        let desired = self.desired_hide_state();
        if desired != self.hide_state {
            self.hide_state = desired;
            self.hub.publish(DockEvent::HideStateChanged(desired));
        }
    }
}

/// Core-thread handle: request channel plus shutdown.
pub struct DockHandle {
    tx: mpsc::SyncSender<DockMessage>,
    thread: Option<JoinHandle<()>>,
}

impl DockHandle {
    pub fn request(&self, request: DockRequest) -> DockResult<()> {
        self.tx
            .send(DockMessage::Request(request))
            .map_err(|_| DockError::BackendGone)
    }

    pub fn sender(&self) -> mpsc::SyncSender<DockMessage> {
        self.tx.clone()
    }

    /// Channel for a backend's event stream, forwarded onto the core loop.
    pub fn platform_sender(&self) -> mpsc::SyncSender<PlatformEvent> {
        let (tx, rx) = mpsc::sync_channel::<PlatformEvent>(EVENT_QUEUE_BOUND);
        let core = self.tx.clone();
        thread::Builder::new()
            .name("platform-forward".to_string())
            .spawn(move || {
                for event in rx {
                    if core.send(DockMessage::Platform(event)).is_err() {
                        break;
                    }
                }
            })
            .expect("spawn platform forward thread");
        tx
    }

    pub fn shutdown(mut self) {
        let _ = self.tx.send(DockMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PropertyImpact {
    identity: bool,
    eligibility: bool,
    hide: bool,
}

/// Fold one refreshed property into the record and report what it affects.
fn apply_property(record: &mut WindowRecord, property: WindowProperty) -> PropertyImpact {
    let mut impact = PropertyImpact::default();
    match property {
        WindowProperty::Title(title) => record.title = title,
        WindowProperty::Icon(icon) => record.icon = icon,
        WindowProperty::Geometry(geometry) => {
            record.geometry = geometry;
            impact.hide = true;
        }
        WindowProperty::Pid(pid) => {
            record.pid = pid;
            impact.identity = true;
        }
        WindowProperty::States(states) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.states = states;
                impact.eligibility = true;
                impact.hide = true;
            }
        }
        WindowProperty::WmClass { instance, class } => {
            if let BackendData::X11(data) = &mut record.backend {
                data.wm_instance = instance;
                data.wm_class = class;
                impact.identity = true;
            }
        }
        WindowProperty::GtkAppId(id) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.gtk_app_id = id;
                impact.identity = true;
            }
        }
        WindowProperty::AllowedActions {
            actions,
            motif_allow_close,
        } => {
            if let BackendData::X11(data) = &mut record.backend {
                data.allowed_actions = actions;
                data.motif_allow_close = motif_allow_close;
                impact.eligibility = true;
            }
        }
        WindowProperty::WindowTypes(types) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.window_types = types;
                impact.eligibility = true;
                impact.hide = true;
            }
        }
        WindowProperty::TransientFor(parent) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.transient_for = parent;
            }
        }
        WindowProperty::Embedded(embedded) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.embedded = embedded;
                impact.eligibility = true;
            }
        }
        WindowProperty::Command(command) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.command = command;
                impact.identity = true;
            }
        }
        WindowProperty::Desktop(desktop) => {
            if let BackendData::X11(data) = &mut record.backend {
                data.desktop = desktop;
                impact.hide = true;
            }
        }
        WindowProperty::AppId(app_id) => {
            if let BackendData::Wayland(data) = &mut record.backend {
                data.app_id = app_id;
                impact.identity = true;
                impact.eligibility = true;
            }
        }
        WindowProperty::Attention(attention) => {
            if let BackendData::Wayland(data) = &mut record.backend {
                data.attention = attention;
            }
        }
        WindowProperty::ActiveState(active) => {
            if let BackendData::Wayland(data) = &mut record.backend {
                data.active = active;
                impact.hide = true;
            }
        }
        WindowProperty::Minimized(minimized) => {
            if let BackendData::Wayland(data) = &mut record.backend {
                data.minimized = minimized;
                impact.hide = true;
            }
        }
    }
    impact
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::app::{
        AppRecord, MemoryDesktopEntryProvider, MemoryLaunchRecorder, RecordingLauncher,
    };
    use crate::config::MemoryConfigStore;
    use crate::identify::{FakeProcessInfo, RuleTable};
    use crate::window::{WindowStates, X11WindowData};

    struct Fixture {
        dock: Dock,
        launcher: Arc<RecordingLauncher>,
        store: Arc<MemoryConfigStore>,
        _scratch: tempfile::TempDir,
    }

    fn fixture_with(
        provider: MemoryDesktopEntryProvider,
        process: FakeProcessInfo,
        settings: Option<DockSettings>,
    ) -> Fixture {
        let launcher = Arc::new(RecordingLauncher::default());
        let store = Arc::new(match settings {
            Some(s) => MemoryConfigStore::with_settings(s),
            None => MemoryConfigStore::new(),
        });
        let scratch = tempfile::tempdir().expect("scratch dir");
        let dock = Dock::new(DockServices {
            provider: Arc::new(provider),
            launcher: launcher.clone(),
            recorder: Arc::new(MemoryLaunchRecorder::default()),
            matcher: None,
            process: Arc::new(process),
            store: store.clone(),
            rules: RuleTable::empty(),
            scratch_dir: scratch.path().to_path_buf(),
        });
        Fixture {
            dock,
            launcher,
            store,
            _scratch: scratch,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            MemoryDesktopEntryProvider::new(),
            FakeProcessInfo::new(),
            None,
        )
    }

    fn editor_provider() -> (MemoryDesktopEntryProvider, FakeProcessInfo) {
        let mut provider = MemoryDesktopEntryProvider::new();
        provider.insert(
            AppRecord::new("/apps/editor.desktop", "Editor").with_exec("/usr/bin/editor"),
        );
        let process = FakeProcessInfo::new();
        process.set_cmdline(100, &["/usr/bin/editor"]);
        process.set_exe(100, "/usr/bin/editor");
        (provider, process)
    }

    fn editor_window(id: WindowId) -> WindowRecord {
        let mut w = WindowRecord::new_x11(
            id,
            X11WindowData {
                wm_class: "editor".to_string(),
                wm_instance: "editor".to_string(),
                ..Default::default()
            },
        );
        w.pid = 100;
        w.title = "Editor".to_string();
        w
    }

    #[test]
    fn appearing_window_creates_entry_and_second_groups() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);

        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        assert_eq!(f.dock.registry().len(), 1);

        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(2)));
        assert_eq!(f.dock.registry().len(), 1, "same identity groups");
        assert_eq!(f.dock.registry().iter().next().map(|e| e.window_count()), Some(2));
    }

    #[test]
    fn skip_taskbar_window_is_parked_until_eligible() {
        let mut f = fixture();
        let mut w = editor_window(1);
        if let BackendData::X11(data) = &mut w.backend {
            data.states.skip_taskbar = true;
        }
        f.dock.handle_platform_event(PlatformEvent::WindowAppeared(w));
        assert_eq!(f.dock.registry().len(), 0);

        f.dock.handle_platform_event(PlatformEvent::WindowChanged {
            window: 1,
            property: WindowProperty::States(WindowStates::default()),
        });
        assert_eq!(f.dock.registry().len(), 1);
    }

    #[test]
    fn motif_hint_change_updates_close_permission() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        let allow = |f: &Fixture| {
            f.dock
                .registry()
                .by_window(1)
                .and_then(|e| e.window(1))
                .map(|w| w.allow_close())
        };
        assert_eq!(allow(&f), Some(true));

        // No action list published: the refreshed motif bit decides.
        f.dock.handle_platform_event(PlatformEvent::WindowChanged {
            window: 1,
            property: WindowProperty::AllowedActions {
                actions: None,
                motif_allow_close: Some(false),
            },
        });
        assert_eq!(allow(&f), Some(false));
    }

    #[test]
    fn last_window_gone_removes_undocked_entry() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        f.dock.handle_platform_event(PlatformEvent::WindowGone(1));
        assert_eq!(f.dock.registry().len(), 0);
    }

    #[test]
    fn docked_entry_survives_last_window() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        let id = f.dock.registry().iter().next().map(|e| e.id).unwrap();
        assert!(f.dock.dock_entry(id));

        f.dock.handle_platform_event(PlatformEvent::WindowGone(1));
        let entry = f.dock.registry().by_id(id).unwrap();
        assert!(entry.is_docked());
        assert!(!entry.has_window());
        assert_eq!(entry.mode(), EntryMode::Normal);
    }

    #[test]
    fn dock_without_app_synthesizes_scratch_entry() {
        let mut f = fixture();
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        let id = f.dock.registry().iter().next().map(|e| e.id).unwrap();
        assert!(f.dock.registry().by_id(id).unwrap().app.is_none());

        assert!(f.dock.dock_entry(id));
        let entry = f.dock.registry().by_id(id).unwrap();
        let app = entry.app.as_ref().unwrap();
        assert!(!app.installed);
        assert!(std::path::Path::new(&app.desktop_path).exists());
        assert_eq!(f.store.load().unwrap().docked_apps, vec![app.desktop_path.clone()]);
    }

    #[test]
    fn undock_scratch_entry_removes_files_and_restores_identity() {
        let mut f = fixture();
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        let id = f.dock.registry().iter().next().map(|e| e.id).unwrap();
        f.dock.dock_entry(id);
        let scratch_path = f
            .dock
            .registry()
            .by_id(id)
            .unwrap()
            .desktop_path()
            .unwrap()
            .to_string();

        assert!(f.dock.undock_entry(id));
        assert!(!std::path::Path::new(&scratch_path).exists());
        let entry = f.dock.registry().by_id(id).unwrap();
        assert!(!entry.is_docked());
        assert!(entry.app.is_none(), "window identity restored");
        assert!(f.store.load().unwrap().docked_apps.is_empty());
    }

    #[test]
    fn dock_path_creates_windowless_pinned_entry() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);
        assert!(f.dock.dock_path("/apps/editor.desktop", -1));

        let entry = f.dock.registry().by_desktop_path("/apps/editor.desktop").unwrap();
        assert!(entry.is_docked());
        assert_eq!(entry.mode(), EntryMode::Normal);
        assert!(!f.dock.dock_path("/apps/missing.desktop", -1));
    }

    #[test]
    fn restore_docked_drops_vanished_pins() {
        let (provider, process) = editor_provider();
        let mut settings = DockSettings::with_defaults();
        settings.docked_apps = vec![
            "/apps/editor.desktop".to_string(),
            "/apps/gone.desktop".to_string(),
        ];
        let mut f = fixture_with(provider, process, Some(settings));
        f.dock.init();

        assert_eq!(f.dock.registry().len(), 1);
        assert_eq!(
            f.store.load().unwrap().docked_apps,
            vec!["/apps/editor.desktop".to_string()]
        );
    }

    #[test]
    fn activate_windowless_entry_launches() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);
        f.dock.dock_path("/apps/editor.desktop", -1);
        let id = f.dock.registry().iter().next().map(|e| e.id).unwrap();

        f.dock.handle_request(DockRequest::ActivateEntry {
            entry: id,
            timestamp: 7,
        });
        let launched = f.launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].0, "/apps/editor.desktop");

        // Launch lands in the recent list.
        drop(launched);
        assert_eq!(
            f.store.load().unwrap().recent_apps[0],
            "/apps/editor.desktop"
        );
    }

    #[test]
    fn active_window_marks_entry_active() {
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, None);
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        f.dock
            .handle_platform_event(PlatformEvent::ActiveChanged(Some(1)));
        assert!(f.dock.registry().iter().next().unwrap().is_active());

        f.dock
            .handle_platform_event(PlatformEvent::ActiveChanged(None));
        assert!(!f.dock.registry().iter().next().unwrap().is_active());
    }

    #[test]
    fn identity_change_reattaches_window() {
        let (mut provider, process) = editor_provider();
        provider.insert(AppRecord::new("/apps/other.desktop", "Other"));
        let mut f = fixture_with(provider, process, None);
        f.dock
            .handle_platform_event(PlatformEvent::WindowAppeared(editor_window(1)));
        let first_inner = f.dock.registry().iter().next().unwrap().inner_id.clone();

        f.dock.handle_platform_event(PlatformEvent::WindowChanged {
            window: 1,
            property: WindowProperty::WmClass {
                instance: "other".to_string(),
                class: "other".to_string(),
            },
        });

        assert_eq!(f.dock.registry().len(), 1);
        let entry = f.dock.registry().by_window(1).unwrap();
        assert_ne!(entry.inner_id, first_inner);
    }

    #[test]
    fn smart_hide_debounces_and_publishes_transition() {
        let mut settings = DockSettings::with_defaults();
        settings.hide_mode = HideMode::SmartHide;
        settings.hide_timeout_ms = 0;
        settings.show_timeout_ms = 0;
        let (provider, process) = editor_provider();
        let mut f = fixture_with(provider, process, Some(settings));
        f.dock.init();
        assert_eq!(f.dock.hide_state(), HideState::Show);

        let rx = f.dock.hub().subscribe();
        f.dock
            .handle_request(DockRequest::FrontendRect(Rect::new(560, 1040, 800, 40)));
        let mut w = editor_window(1);
        w.geometry = Rect::new(0, 0, 1920, 1080);
        f.dock.handle_platform_event(PlatformEvent::WindowAppeared(w));
        f.dock
            .handle_platform_event(PlatformEvent::ActiveChanged(Some(1)));

        // Zero timeout: the armed deadline is already due.
        f.dock.flush_hide_deadline();
        assert_eq!(f.dock.hide_state(), HideState::Hide);
        assert!(
            rx.try_iter()
                .any(|e| e == DockEvent::HideStateChanged(HideState::Hide))
        );
    }

    #[test]
    fn keep_hidden_mode_applies_immediately() {
        let mut f = fixture();
        f.dock.init();
        assert_eq!(f.dock.hide_state(), HideState::Show);
        f.dock
            .handle_request(DockRequest::SetHideMode(HideMode::KeepHidden));
        assert_eq!(f.dock.hide_state(), HideState::Hide);
    }

    #[test]
    fn show_recent_toggle_materializes_and_prunes() {
        let (provider, process) = editor_provider();
        let mut settings = DockSettings::with_defaults();
        settings.display_mode = DisplayMode::Fashion;
        settings.show_recent = false;
        settings.recent_apps = vec!["/apps/editor.desktop".to_string()];
        let mut f = fixture_with(provider, process, Some(settings));
        f.dock.init();
        assert_eq!(f.dock.registry().len(), 0);

        f.dock.handle_request(DockRequest::SetShowRecent(true));
        assert_eq!(f.dock.registry().len(), 1);
        assert_eq!(
            f.dock.registry().iter().next().unwrap().mode(),
            EntryMode::Recent
        );

        f.dock.handle_request(DockRequest::SetShowRecent(false));
        assert_eq!(f.dock.registry().len(), 0);
    }

    #[test]
    fn move_entry_persists_docked_order() {
        let (mut provider, process) = editor_provider();
        provider.insert(AppRecord::new("/apps/term.desktop", "Term"));
        let mut f = fixture_with(provider, process, None);
        f.dock.dock_path("/apps/editor.desktop", -1);
        f.dock.dock_path("/apps/term.desktop", -1);

        f.dock.handle_request(DockRequest::MoveEntry { from: 0, to: 1 });
        assert_eq!(
            f.store.load().unwrap().docked_apps,
            vec!["/apps/term.desktop".to_string(), "/apps/editor.desktop".to_string()]
        );
    }
}
