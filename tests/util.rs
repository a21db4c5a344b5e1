//! Common test utilities for dock integration tests

#![allow(dead_code)]

use std::sync::Arc;

use dockd::app::{
    AppRecord, MemoryDesktopEntryProvider, MemoryLaunchRecorder, RecordingLauncher,
};
use dockd::config::{DockSettings, MemoryConfigStore};
use dockd::dock::{Dock, DockServices};
use dockd::identify::{FakeProcessInfo, RuleTable};
use dockd::window::{WindowRecord, X11WindowData};

/// Fully wired core with in-memory collaborators.
pub struct TestDock {
    pub dock: Dock,
    pub launcher: Arc<RecordingLauncher>,
    pub recorder: Arc<MemoryLaunchRecorder>,
    pub store: Arc<MemoryConfigStore>,
    pub process: Arc<FakeProcessInfo>,
    pub scratch: tempfile::TempDir,
}

/// Route core tracing through the test harness. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Build a core over the given desktop entries and settings.
///
/// # Arguments
/// * `apps` - Desktop entries visible to the provider
/// * `settings` - Persisted settings, or `None` for defaults
///
/// # Returns
/// A [`TestDock`] with every collaborator accessible for assertions
pub fn build_dock(apps: &[AppRecord], settings: Option<DockSettings>) -> TestDock {
    build_dock_with_rules(apps, settings, RuleTable::empty())
}

pub fn build_dock_with_rules(
    apps: &[AppRecord],
    settings: Option<DockSettings>,
    rules: RuleTable,
) -> TestDock {
    init_tracing();
    let mut provider = MemoryDesktopEntryProvider::new();
    for app in apps {
        provider.insert(app.clone());
    }
    let launcher = Arc::new(RecordingLauncher::default());
    let recorder = Arc::new(MemoryLaunchRecorder::default());
    let process = Arc::new(FakeProcessInfo::new());
    let store = Arc::new(match settings {
        Some(s) => MemoryConfigStore::with_settings(s),
        None => MemoryConfigStore::new(),
    });
    let scratch = tempfile::tempdir().expect("scratch dir");

    let dock = Dock::new(DockServices {
        provider: Arc::new(provider),
        launcher: launcher.clone(),
        recorder: recorder.clone(),
        matcher: None,
        process: process.clone(),
        store: store.clone(),
        rules,
        scratch_dir: scratch.path().to_path_buf(),
    });

    TestDock {
        dock,
        launcher,
        recorder,
        store,
        process,
        scratch,
    }
}

/// New core over an existing store, simulating a daemon restart.
pub fn rebuild_dock(prev: &TestDock, apps: &[AppRecord]) -> Dock {
    let mut provider = MemoryDesktopEntryProvider::new();
    for app in apps {
        provider.insert(app.clone());
    }
    Dock::new(DockServices {
        provider: Arc::new(provider),
        launcher: prev.launcher.clone(),
        recorder: prev.recorder.clone(),
        matcher: None,
        process: prev.process.clone(),
        store: prev.store.clone(),
        rules: RuleTable::empty(),
        scratch_dir: prev.scratch.path().to_path_buf(),
    })
}

/// Legacy-backend window with a class and pid, titled after the class.
pub fn x11_window(id: u64, class: &str, pid: u32) -> WindowRecord {
    let mut w = WindowRecord::new_x11(
        id,
        X11WindowData {
            wm_class: class.to_string(),
            wm_instance: class.to_lowercase(),
            ..Default::default()
        },
    );
    w.pid = pid;
    w.title = class.to_string();
    w
}

/// First entry id in display order; panics when the registry is empty.
pub fn first_entry_id(dock: &Dock) -> u32 {
    dock.registry()
        .iter()
        .next()
        .map(|e| e.id)
        .expect("registry has an entry")
}
