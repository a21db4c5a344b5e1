//! Compositor-protocol backend.
//!
//! The wire protocol itself lives outside this crate; a protocol adapter
//! feeds [`CompositorEvent`]s in over a channel and accepts lifecycle calls
//! through [`CompositorControl`]. This backend owns the dedicated thread that
//! drains the link and translates its traffic into [`PlatformEvent`]s, plus a
//! command pump for the reverse direction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::geometry::Rect;
use crate::window::{WaylandWindowData, WindowId, WindowRecord};

use super::{BackendHandle, PlatformCommand, PlatformEvent, WindowProperty};

/// Full initial snapshot for a newly mapped toplevel.
#[derive(Debug, Clone, Default)]
pub struct ToplevelInfo {
    pub id: WindowId,
    pub uuid: String,
    pub app_id: String,
    pub title: String,
    pub icon: String,
    pub pid: u32,
    pub geometry: Rect,
    pub skip_taskbar: bool,
    pub minimizable: bool,
    pub active: bool,
    pub minimized: bool,
    pub attention: bool,
}

/// Events the compositor protocol adapter delivers.
#[derive(Debug, Clone)]
pub enum CompositorEvent {
    WindowCreated(ToplevelInfo),
    WindowRemoved(WindowId),
    TitleChanged { window: WindowId, title: String },
    IconChanged { window: WindowId, icon: String },
    GeometryChanged { window: WindowId, geometry: Rect },
    AppIdChanged { window: WindowId, app_id: String },
    AttentionChanged { window: WindowId, demanding: bool },
    ActiveChanged { window: WindowId, active: bool },
    MinimizedChanged { window: WindowId, minimized: bool },
}

/// Outgoing lifecycle calls into the protocol adapter.
pub trait CompositorControl: Send {
    fn close(&self, window: WindowId);
    fn activate(&self, window: WindowId);
    fn minimize(&self, window: WindowId);
    fn kill(&self, window: WindowId);
    /// Re-announce all cached state for one toplevel.
    fn refresh(&self, window: WindowId);
}

/// Control sink that drops everything, for tests and event-only links.
pub struct NullCompositorControl;

impl CompositorControl for NullCompositorControl {
    fn close(&self, _window: WindowId) {}
    fn activate(&self, _window: WindowId) {}
    fn minimize(&self, _window: WindowId) {}
    fn kill(&self, _window: WindowId) {}
    fn refresh(&self, _window: WindowId) {}
}

pub struct WaylandBackend {
    link_events: mpsc::Receiver<CompositorEvent>,
    control: Box<dyn CompositorControl>,
}

impl WaylandBackend {
    pub fn new(
        link_events: mpsc::Receiver<CompositorEvent>,
        control: Box<dyn CompositorControl>,
    ) -> Self {
        Self {
            link_events,
            control,
        }
    }

    /// Start the event pump and command pump threads.
    pub fn spawn(self, events_out: mpsc::SyncSender<PlatformEvent>) -> BackendHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel::<PlatformCommand>();

        let pump_stop = Arc::clone(&stop);
        let commands_for_records = command_tx.clone();
        let link_events = self.link_events;
        let event_thread = thread::Builder::new()
            .name("wayland-events".to_string())
            .spawn(move || {
                event_pump(
                    link_events,
                    events_out,
                    commands_for_records,
                    pump_stop,
                );
            })
            .expect("spawn wayland event thread");

        let control = self.control;
        let command_stop = Arc::clone(&stop);
        let command_thread = thread::Builder::new()
            .name("wayland-commands".to_string())
            .spawn(move || {
                command_pump(command_rx, control, command_stop);
            })
            .expect("spawn wayland command thread");

        BackendHandle::new(command_tx, stop, vec![event_thread, command_thread])
    }
}

fn event_pump(
    link: mpsc::Receiver<CompositorEvent>,
    out: mpsc::SyncSender<PlatformEvent>,
    commands: mpsc::Sender<PlatformCommand>,
    stop: Arc<AtomicBool>,
) {
    info!("compositor event pump started");
    let mut active: Option<WindowId> = None;

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        // Bounded wait so the stop flag is honored even on an idle link.
        let event = match link.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("compositor link closed");
                break;
            }
        };

        let forward = translate(event, &commands, &mut active);
        for event in forward {
            if out.send(event).is_err() {
                debug!("orchestrator queue closed, stopping event pump");
                return;
            }
        }
    }
}

/// Translate one link event into orchestrator traffic. Active-state changes
/// fan out into both the per-window property and the dock-level active
/// window notification.
fn translate(
    event: CompositorEvent,
    commands: &mpsc::Sender<PlatformCommand>,
    active: &mut Option<WindowId>,
) -> Vec<PlatformEvent> {
    match event {
        CompositorEvent::WindowCreated(info) => {
            let mut record = WindowRecord::new_wayland(
                info.id,
                WaylandWindowData {
                    app_id: info.app_id,
                    skip_taskbar: info.skip_taskbar,
                    minimizable: info.minimizable,
                    active: info.active,
                    minimized: info.minimized,
                    attention: info.attention,
                },
            )
            .with_commands(commands.clone());
            record.title = info.title;
            record.icon = info.icon;
            record.pid = info.pid;
            record.geometry = info.geometry;
            record.uuid = info.uuid;

            let mut out = vec![PlatformEvent::WindowAppeared(record)];
            if info.active {
                *active = Some(info.id);
                out.push(PlatformEvent::ActiveChanged(*active));
            }
            out
        }
        CompositorEvent::WindowRemoved(window) => {
            let mut out = vec![PlatformEvent::WindowGone(window)];
            if *active == Some(window) {
                *active = None;
                out.push(PlatformEvent::ActiveChanged(None));
            }
            out
        }
        CompositorEvent::TitleChanged { window, title } => vec![PlatformEvent::WindowChanged {
            window,
            property: WindowProperty::Title(title),
        }],
        CompositorEvent::IconChanged { window, icon } => vec![PlatformEvent::WindowChanged {
            window,
            property: WindowProperty::Icon(icon),
        }],
        CompositorEvent::GeometryChanged { window, geometry } => {
            vec![PlatformEvent::WindowChanged {
                window,
                property: WindowProperty::Geometry(geometry),
            }]
        }
        CompositorEvent::AppIdChanged { window, app_id } => vec![PlatformEvent::WindowChanged {
            window,
            property: WindowProperty::AppId(app_id),
        }],
        CompositorEvent::AttentionChanged { window, demanding } => {
            vec![PlatformEvent::WindowChanged {
                window,
                property: WindowProperty::Attention(demanding),
            }]
        }
        CompositorEvent::MinimizedChanged { window, minimized } => {
            vec![PlatformEvent::WindowChanged {
                window,
                property: WindowProperty::Minimized(minimized),
            }]
        }
        CompositorEvent::ActiveChanged { window, active: is_active } => {
            let mut out = vec![PlatformEvent::WindowChanged {
                window,
                property: WindowProperty::ActiveState(is_active),
            }];
            if is_active {
                *active = Some(window);
                out.push(PlatformEvent::ActiveChanged(*active));
            } else if *active == Some(window) {
                *active = None;
                out.push(PlatformEvent::ActiveChanged(None));
            }
            out
        }
    }
}

fn command_pump(
    commands: mpsc::Receiver<PlatformCommand>,
    control: Box<dyn CompositorControl>,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let command = match commands.recv_timeout(Duration::from_millis(100)) {
            Ok(command) => command,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        match command {
            PlatformCommand::Close { window, .. } => control.close(window),
            PlatformCommand::Activate { window } => control.activate(window),
            PlatformCommand::Minimize { window } => control.minimize(window),
            PlatformCommand::KillClient { window } => control.kill(window),
            PlatformCommand::Refresh { window } => control.refresh(window),
        }
    }
    warn!("compositor command pump stopped");
}
