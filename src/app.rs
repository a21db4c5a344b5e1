//! Resolved application metadata and the external collaborator seams.
//!
//! Desktop-entry parsing, application launching and the legacy
//! window-to-desktop-file matcher all live outside this crate; they are
//! consumed through the traits below. In-memory implementations are provided
//! for tests and for front-ends that bring their own services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{DockError, DockResult};

/// One desktop-entry action (the "New Window" style extra launchers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAction {
    pub section: String,
    pub name: String,
}

/// Resolved application metadata from an already-parsed desktop entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    /// Absolute path of the desktop entry this record came from.
    pub desktop_path: String,
    /// Desktop-entry id, the file stem (e.g. `org.gnome.Nautilus`).
    pub id: String,
    pub name: String,
    pub icon: String,
    /// Exec line with field codes intact.
    pub exec: String,
    /// False for scratch entries synthesized by the dock itself.
    pub installed: bool,
    pub actions: Vec<AppAction>,
}

impl AppRecord {
    pub fn new(desktop_path: impl Into<String>, name: impl Into<String>) -> Self {
        let desktop_path = desktop_path.into();
        let id = Path::new(&desktop_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            desktop_path,
            id,
            name: name.into(),
            icon: String::new(),
            exec: String::new(),
            installed: true,
            actions: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_exec(mut self, exec: impl Into<String>) -> Self {
        self.exec = exec.into();
        self
    }

    pub fn scratch(mut self) -> Self {
        self.installed = false;
        self
    }
}

/// Desktop-entry metadata provider.
pub trait DesktopEntryProvider: Send + Sync {
    /// Look up a parsed desktop entry by absolute path.
    fn by_path(&self, path: &str) -> Option<AppRecord>;
    /// Look up by desktop-entry id, searching the usual application dirs.
    fn by_id(&self, id: &str) -> Option<AppRecord>;
    /// Resolve symlinked autostart entries to their real target, if `path`
    /// is a symlink under an autostart directory.
    fn autostart_target(&self, path: &str) -> Option<AppRecord>;
}

/// Process/launch collaborator.
pub trait AppLauncher: Send + Sync {
    fn launch(&self, desktop_path: &str, files: &[String], timestamp: u32) -> DockResult<()>;
    fn launch_action(&self, desktop_path: &str, section: &str, timestamp: u32) -> DockResult<()>;
}

/// "Mark app launched" recorder, feeds the launcher's recent/frequent lists.
pub trait LaunchRecorder: Send + Sync {
    fn mark_launched(&self, desktop_path: &str);
}

/// Legacy window-matcher service: maps an X window id to a desktop-entry
/// path. Some applications register late, so callers retry a bounded number
/// of times.
pub trait WindowMatcher: Send + Sync {
    fn match_window(&self, window_id: u64) -> Option<String>;
}

/// Provider backed by a plain map, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDesktopEntryProvider {
    by_path: HashMap<String, AppRecord>,
    autostart_links: HashMap<String, AppRecord>,
}

impl MemoryDesktopEntryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: AppRecord) {
        self.by_path.insert(record.desktop_path.clone(), record);
    }

    /// Register `link_path` as an autostart symlink resolving to `target`.
    pub fn insert_autostart_link(&mut self, link_path: impl Into<String>, target: AppRecord) {
        self.autostart_links.insert(link_path.into(), target);
    }
}

impl DesktopEntryProvider for MemoryDesktopEntryProvider {
    fn by_path(&self, path: &str) -> Option<AppRecord> {
        self.by_path.get(path).cloned()
    }

    fn by_id(&self, id: &str) -> Option<AppRecord> {
        self.by_path.values().find(|r| r.id == id).cloned()
    }

    fn autostart_target(&self, path: &str) -> Option<AppRecord> {
        self.autostart_links.get(path).cloned()
    }
}

/// Launcher that records invocations without spawning anything.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    pub launched: Mutex<Vec<(String, Vec<String>)>>,
    pub fail: bool,
}

impl AppLauncher for RecordingLauncher {
    fn launch(&self, desktop_path: &str, files: &[String], _timestamp: u32) -> DockResult<()> {
        if self.fail {
            return Err(DockError::Launch(desktop_path.to_string()));
        }
        if let Ok(mut launched) = self.launched.lock() {
            launched.push((desktop_path.to_string(), files.to_vec()));
        }
        Ok(())
    }

    fn launch_action(&self, desktop_path: &str, section: &str, _timestamp: u32) -> DockResult<()> {
        if self.fail {
            return Err(DockError::Launch(desktop_path.to_string()));
        }
        if let Ok(mut launched) = self.launched.lock() {
            launched.push((
                format!("{desktop_path}#{section}"),
                Vec::new(),
            ));
        }
        Ok(())
    }
}

/// Recorder that appends to an in-memory list.
#[derive(Debug, Default)]
pub struct MemoryLaunchRecorder {
    pub marked: Mutex<Vec<String>>,
}

impl LaunchRecorder for MemoryLaunchRecorder {
    fn mark_launched(&self, desktop_path: &str) {
        if let Ok(mut marked) = self.marked.lock() {
            marked.push(desktop_path.to_string());
        }
    }
}

/// Matcher answering from a static table, optionally only after a number of
/// queries (to exercise the retry path).
#[derive(Debug, Default)]
pub struct StaticWindowMatcher {
    table: HashMap<u64, String>,
    answer_after: Mutex<HashMap<u64, u32>>,
}

impl StaticWindowMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, window_id: u64, desktop_path: impl Into<String>) {
        self.table.insert(window_id, desktop_path.into());
    }

    /// The matcher will return `None` for the first `misses` queries of this
    /// window, mimicking an application that registers late.
    pub fn insert_late(&mut self, window_id: u64, desktop_path: impl Into<String>, misses: u32) {
        self.table.insert(window_id, desktop_path.into());
        if let Ok(mut late) = self.answer_after.lock() {
            late.insert(window_id, misses);
        }
    }
}

impl WindowMatcher for StaticWindowMatcher {
    fn match_window(&self, window_id: u64) -> Option<String> {
        if let Ok(mut late) = self.answer_after.lock()
            && let Some(remaining) = late.get_mut(&window_id)
        {
            if *remaining > 0 {
                *remaining -= 1;
                return None;
            }
        }
        self.table.get(&window_id).cloned()
    }
}

/// Path helpers shared by identification and docking.
pub fn is_under_dir(path: &str, dir: &Path) -> bool {
    Path::new(path).starts_with(dir)
}

/// Desktop-entry id from a path: file stem without the `.desktop` suffix.
pub fn desktop_id_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The usual per-user autostart directory.
pub fn autostart_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("autostart")
}
