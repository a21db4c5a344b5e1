//! Entry lifecycle: window attach/detach, grouping, docking and the events
//! published along the way.

mod util;

use std::sync::mpsc;

use dockd::app::AppRecord;
use dockd::config::{DisplayMode, DockSettings};
use dockd::entry::EntryMode;
use dockd::events::DockEvent;
use dockd::platform::{PlatformCommand, PlatformEvent};
use util::*;

fn editor_app() -> AppRecord {
    AppRecord::new("/apps/editor.desktop", "Editor").with_exec("/usr/bin/editor")
}

#[test]
fn window_lifecycle_publishes_add_and_remove() {
    let mut f = build_dock(&[editor_app()], None);
    let rx = f.dock.hub().subscribe();

    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(1, "editor", 100)));
    let events: Vec<DockEvent> = rx.try_iter().collect();
    assert!(
        events.iter().any(|e| matches!(e, DockEvent::EntryAdded { index: 0, .. })),
        "expected EntryAdded, got {events:?}"
    );

    let id = first_entry_id(&f.dock);
    f.dock.handle_platform_event(PlatformEvent::WindowGone(1));
    assert!(
        rx.try_iter()
            .any(|e| e == DockEvent::EntryRemoved { id }),
        "entry removal must be published"
    );
    assert!(f.dock.registry().is_empty());
}

#[test]
fn same_identity_windows_group_under_one_entry() {
    let mut f = build_dock(&[editor_app()], None);
    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(1, "editor", 100)));
    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(2, "editor", 101)));
    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(3, "browser", 200)));

    assert_eq!(f.dock.registry().len(), 2);
    let editor = f
        .dock
        .registry()
        .by_desktop_path("/apps/editor.desktop")
        .expect("editor entry");
    assert_eq!(editor.window_count(), 2);
    // First attached window leads.
    assert_eq!(editor.current_window(), Some(1));
}

#[test]
fn docked_pin_survives_restart() {
    let apps = [editor_app()];
    let mut f = build_dock(&apps, None);
    assert!(f.dock.dock_path("/apps/editor.desktop", -1));

    let mut restarted = rebuild_dock(&f, &apps);
    restarted.init();

    let entry = restarted
        .registry()
        .by_desktop_path("/apps/editor.desktop")
        .expect("pin restored");
    assert!(entry.is_docked());
    assert_eq!(entry.mode(), EntryMode::Normal);
}

#[test]
fn undocked_windowless_entry_disappears_after_restart() {
    let apps = [editor_app()];
    let mut f = build_dock(&apps, None);
    f.dock.dock_path("/apps/editor.desktop", -1);
    let id = first_entry_id(&f.dock);
    assert!(f.dock.undock_entry(id));
    assert!(f.dock.registry().is_empty());

    let mut restarted = rebuild_dock(&f, &apps);
    restarted.init();
    assert!(restarted.registry().is_empty());
}

#[test]
fn close_all_reaches_backend_newest_first() {
    let mut f = build_dock(&[editor_app()], None);
    let (tx, rx) = mpsc::channel();

    let older = x11_window(5, "editor", 100).with_commands(tx.clone());
    let newer = x11_window(4, "editor", 100).with_commands(tx);
    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(older));
    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(newer));
    let id = first_entry_id(&f.dock);

    f.dock.handle_request(dockd::DockRequest::MenuItem {
        entry: id,
        item: "close-all".to_string(),
        timestamp: 42,
    });

    let commands: Vec<PlatformCommand> = rx.try_iter().collect();
    assert_eq!(
        commands,
        vec![
            PlatformCommand::Close {
                window: 4,
                timestamp: 42
            },
            PlatformCommand::Close {
                window: 5,
                timestamp: 42
            },
        ]
    );
}

#[test]
fn window_menu_item_activates_that_window() {
    let mut f = build_dock(&[editor_app()], None);
    let (tx, rx) = mpsc::channel();
    f.dock.handle_platform_event(PlatformEvent::WindowAppeared(
        x11_window(7, "editor", 100).with_commands(tx),
    ));
    let id = first_entry_id(&f.dock);

    f.dock.handle_request(dockd::DockRequest::MenuItem {
        entry: id,
        item: "win:7".to_string(),
        timestamp: 0,
    });
    assert_eq!(
        rx.try_recv().unwrap(),
        PlatformCommand::Activate { window: 7 }
    );
}

#[test]
fn menu_and_closeable_windows_are_queryable() {
    let mut f = build_dock(&[editor_app()], None);
    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(7, "editor", 100)));
    let id = first_entry_id(&f.dock);

    let (tx, rx) = mpsc::channel();
    f.dock
        .handle_request(dockd::DockRequest::QueryMenu { entry: id, reply: tx });
    let menu = rx.recv().unwrap();
    assert!(menu.contains("\"close-all\""), "menu json: {menu}");

    let (tx, rx) = mpsc::channel();
    f.dock
        .handle_request(dockd::DockRequest::QueryCloseableWindows { entry: id, reply: tx });
    assert_eq!(rx.recv().unwrap(), vec![7]);
}

#[test]
fn drag_drop_launches_with_files() {
    let mut f = build_dock(&[editor_app()], None);
    f.dock.dock_path("/apps/editor.desktop", -1);
    let id = first_entry_id(&f.dock);

    f.dock.handle_request(dockd::DockRequest::DropFiles {
        entry: id,
        files: vec!["/home/u/notes.txt".to_string()],
        timestamp: 9,
    });

    let launched = f.launcher.launched.lock().unwrap();
    assert_eq!(
        launched.as_slice(),
        &[(
            "/apps/editor.desktop".to_string(),
            vec!["/home/u/notes.txt".to_string()]
        )]
    );
}

#[test]
fn fashion_mode_keeps_closed_app_as_recent() {
    let mut settings = DockSettings::with_defaults();
    settings.display_mode = DisplayMode::Fashion;
    settings.show_recent = true;
    let mut f = build_dock(&[editor_app()], Some(settings));

    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(1, "editor", 100)));
    f.dock.handle_platform_event(PlatformEvent::WindowGone(1));

    let entry = f
        .dock
        .registry()
        .by_desktop_path("/apps/editor.desktop")
        .expect("entry lives on in recent region");
    assert_eq!(entry.mode(), EntryMode::Recent);
    assert!(!entry.has_window());
}

#[test]
fn scratch_dock_and_undock_round_trip() {
    let mut f = build_dock(&[], None);
    f.process.set_cmdline(300, &["/opt/custom/tool", "--serve"]);

    f.dock
        .handle_platform_event(PlatformEvent::WindowAppeared(x11_window(1, "Tool", 300)));
    let id = first_entry_id(&f.dock);
    assert!(f.dock.registry().by_id(id).unwrap().app.is_none());

    assert!(f.dock.dock_entry(id));
    let path = f
        .dock
        .registry()
        .by_id(id)
        .unwrap()
        .desktop_path()
        .unwrap()
        .to_string();
    assert!(path.starts_with(f.scratch.path().to_str().unwrap()));
    assert!(std::path::Path::new(&path).exists());

    assert!(f.dock.undock_entry(id));
    assert!(!std::path::Path::new(&path).exists());
    // The entry stays while its window lives.
    assert!(f.dock.registry().by_id(id).is_some());
}
