//! Legacy windowing backend.
//!
//! One dedicated thread drains the X event stream and translates it into
//! [`PlatformEvent`]s; a second thread executes [`PlatformCommand`]s against
//! the shared connection. Root-window and per-window event masks are
//! registered once at startup. Property queries on vanished windows return
//! neutral values and never propagate errors.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt, EventMask,
    PropertyNotifyEvent, Window,
};
use x11rb::rust_connection::RustConnection;

use crate::error::{DockError, DockResult};
use crate::geometry::Rect;
use crate::window::{
    WindowAction, WindowId, WindowRecord, WindowStates, WindowType, X11WindowData,
};

use super::{BackendHandle, PlatformCommand, PlatformEvent, WindowProperty};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Iconic state for `WM_CHANGE_STATE`.
const ICONIC_STATE: u32 = 3;
/// `_MOTIF_WM_HINTS` layout.
const MWM_HINTS_FUNCTIONS: u32 = 1 << 0;
const MWM_FUNC_ALL: u32 = 1 << 0;
const MWM_FUNC_CLOSE: u32 = 1 << 5;

/// All atoms interned once at startup.
#[derive(Debug, Clone)]
struct Atoms {
    net_client_list: u32,
    net_active_window: u32,
    net_showing_desktop: u32,
    net_current_desktop: u32,
    net_close_window: u32,
    net_wm_name: u32,
    net_wm_pid: u32,
    net_wm_icon: u32,
    net_wm_desktop: u32,
    net_wm_state: u32,
    net_wm_state_skip_taskbar: u32,
    net_wm_state_hidden: u32,
    net_wm_state_modal: u32,
    net_wm_state_demands_attention: u32,
    net_wm_window_type: u32,
    net_wm_window_type_normal: u32,
    net_wm_window_type_dialog: u32,
    net_wm_window_type_utility: u32,
    net_wm_window_type_menu: u32,
    net_wm_window_type_dropdown_menu: u32,
    net_wm_window_type_popup_menu: u32,
    net_wm_window_type_tooltip: u32,
    net_wm_window_type_dock: u32,
    net_wm_window_type_desktop: u32,
    net_wm_window_type_splash: u32,
    net_wm_window_type_notification: u32,
    net_wm_allowed_actions: u32,
    net_wm_action_close: u32,
    net_wm_action_minimize: u32,
    gtk_application_id: u32,
    motif_wm_hints: u32,
    xembed_info: u32,
    wm_change_state: u32,
    utf8_string: u32,
}

fn get_atom(conn: &impl Connection, name: &[u8]) -> DockResult<u32> {
    Ok(conn
        .intern_atom(false, name)
        .map_err(|e| DockError::Platform(e.to_string()))?
        .reply()
        .map_err(|e| DockError::Platform(e.to_string()))?
        .atom)
}

impl Atoms {
    fn setup(conn: &impl Connection) -> DockResult<Self> {
        Ok(Self {
            net_client_list: get_atom(conn, b"_NET_CLIENT_LIST")?,
            net_active_window: get_atom(conn, b"_NET_ACTIVE_WINDOW")?,
            net_showing_desktop: get_atom(conn, b"_NET_SHOWING_DESKTOP")?,
            net_current_desktop: get_atom(conn, b"_NET_CURRENT_DESKTOP")?,
            net_close_window: get_atom(conn, b"_NET_CLOSE_WINDOW")?,
            net_wm_name: get_atom(conn, b"_NET_WM_NAME")?,
            net_wm_pid: get_atom(conn, b"_NET_WM_PID")?,
            net_wm_icon: get_atom(conn, b"_NET_WM_ICON")?,
            net_wm_desktop: get_atom(conn, b"_NET_WM_DESKTOP")?,
            net_wm_state: get_atom(conn, b"_NET_WM_STATE")?,
            net_wm_state_skip_taskbar: get_atom(conn, b"_NET_WM_STATE_SKIP_TASKBAR")?,
            net_wm_state_hidden: get_atom(conn, b"_NET_WM_STATE_HIDDEN")?,
            net_wm_state_modal: get_atom(conn, b"_NET_WM_STATE_MODAL")?,
            net_wm_state_demands_attention: get_atom(conn, b"_NET_WM_STATE_DEMANDS_ATTENTION")?,
            net_wm_window_type: get_atom(conn, b"_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_normal: get_atom(conn, b"_NET_WM_WINDOW_TYPE_NORMAL")?,
            net_wm_window_type_dialog: get_atom(conn, b"_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_wm_window_type_utility: get_atom(conn, b"_NET_WM_WINDOW_TYPE_UTILITY")?,
            net_wm_window_type_menu: get_atom(conn, b"_NET_WM_WINDOW_TYPE_MENU")?,
            net_wm_window_type_dropdown_menu: get_atom(conn, b"_NET_WM_WINDOW_TYPE_DROPDOWN_MENU")?,
            net_wm_window_type_popup_menu: get_atom(conn, b"_NET_WM_WINDOW_TYPE_POPUP_MENU")?,
            net_wm_window_type_tooltip: get_atom(conn, b"_NET_WM_WINDOW_TYPE_TOOLTIP")?,
            net_wm_window_type_dock: get_atom(conn, b"_NET_WM_WINDOW_TYPE_DOCK")?,
            net_wm_window_type_desktop: get_atom(conn, b"_NET_WM_WINDOW_TYPE_DESKTOP")?,
            net_wm_window_type_splash: get_atom(conn, b"_NET_WM_WINDOW_TYPE_SPLASH")?,
            net_wm_window_type_notification: get_atom(conn, b"_NET_WM_WINDOW_TYPE_NOTIFICATION")?,
            net_wm_allowed_actions: get_atom(conn, b"_NET_WM_ALLOWED_ACTIONS")?,
            net_wm_action_close: get_atom(conn, b"_NET_WM_ACTION_CLOSE")?,
            net_wm_action_minimize: get_atom(conn, b"_NET_WM_ACTION_MINIMIZE")?,
            gtk_application_id: get_atom(conn, b"_GTK_APPLICATION_ID")?,
            motif_wm_hints: get_atom(conn, b"_MOTIF_WM_HINTS")?,
            xembed_info: get_atom(conn, b"_XEMBED_INFO")?,
            wm_change_state: get_atom(conn, b"WM_CHANGE_STATE")?,
            utf8_string: get_atom(conn, b"UTF8_STRING")?,
        })
    }
}

pub struct X11Backend {
    conn: Arc<RustConnection>,
    root: Window,
    atoms: Atoms,
}

impl X11Backend {
    /// Connect to the X server, mapping a missing display to
    /// [`DockError::NoDisplay`].
    pub fn connect() -> DockResult<Self> {
        let (conn, screen_num) = RustConnection::connect(None).map_err(|e| {
            let error_str = e.to_string();
            if error_str.contains("DISPLAY")
                || error_str.contains("display")
                || error_str.contains("No such file or directory")
            {
                DockError::NoDisplay
            } else {
                DockError::Platform(error_str)
            }
        })?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::setup(&conn)?;
        Ok(Self {
            conn: Arc::new(conn),
            root,
            atoms,
        })
    }

    /// Register the root-window event mask and start the event and command
    /// threads.
    pub fn spawn(self, events_out: mpsc::SyncSender<PlatformEvent>) -> DockResult<BackendHandle> {
        self.conn
            .change_window_attributes(
                self.root,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
            )
            .map_err(|e| DockError::Platform(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| DockError::Platform(e.to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel::<PlatformCommand>();

        let event_state = EventState {
            conn: Arc::clone(&self.conn),
            root: self.root,
            atoms: self.atoms.clone(),
            commands: command_tx.clone(),
            tracked: HashSet::new(),
        };
        let event_stop = Arc::clone(&stop);
        let event_out = events_out.clone();
        let event_thread = thread::Builder::new()
            .name("x11-events".to_string())
            .spawn(move || event_loop(event_state, event_out, event_stop))
            .expect("spawn x11 event thread");

        let command_state = CommandState {
            conn: self.conn,
            root: self.root,
            atoms: self.atoms,
            events_out,
        };
        let command_stop = Arc::clone(&stop);
        let command_thread = thread::Builder::new()
            .name("x11-commands".to_string())
            .spawn(move || command_loop(command_state, command_rx, command_stop))
            .expect("spawn x11 command thread");

        Ok(BackendHandle::new(
            command_tx,
            stop,
            vec![event_thread, command_thread],
        ))
    }
}

/* ------------------------------------------------------------ */
/* Event thread                                                  */
/* ------------------------------------------------------------ */

struct EventState {
    conn: Arc<RustConnection>,
    root: Window,
    atoms: Atoms,
    commands: mpsc::Sender<PlatformCommand>,
    tracked: HashSet<Window>,
}

fn event_loop(mut state: EventState, out: mpsc::SyncSender<PlatformEvent>, stop: Arc<AtomicBool>) {
    info!("x11 event loop started");

    // Initial client-list scan before the first event.
    sync_client_list(&mut state, &out);
    emit_active_window(&state, &out);

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let event = match state.conn.poll_for_event() {
            Ok(Some(event)) => event,
            Ok(None) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                info!("x11 error: {e}");
                thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        let keep_going = handle_event(&mut state, &out, event);
        if !keep_going {
            debug!("orchestrator queue closed, stopping x11 event loop");
            break;
        }
        if let Err(e) = state.conn.flush() {
            info!("failed to flush connection: {e}");
        }
    }
}

fn handle_event(
    state: &mut EventState,
    out: &mpsc::SyncSender<PlatformEvent>,
    event: Event,
) -> bool {
    match event {
        Event::PropertyNotify(PropertyNotifyEvent { window, atom, .. }) => {
            if window == state.root {
                handle_root_property(state, out, atom)
            } else if state.tracked.contains(&window) {
                handle_window_property(state, out, window, atom)
            } else {
                true
            }
        }
        Event::DestroyNotify(e) => {
            if state.tracked.remove(&e.window) {
                return out.send(PlatformEvent::WindowGone(e.window as WindowId)).is_ok();
            }
            true
        }
        Event::ConfigureNotify(e) => {
            if state.tracked.contains(&e.window) {
                let geometry = window_geometry(&state.conn, state.root, e.window)
                    .unwrap_or(Rect::new(e.x as i32, e.y as i32, e.width as u32, e.height as u32));
                return out
                    .send(PlatformEvent::WindowChanged {
                        window: e.window as WindowId,
                        property: WindowProperty::Geometry(geometry),
                    })
                    .is_ok();
            }
            true
        }
        _ => true,
    }
}

fn handle_root_property(
    state: &mut EventState,
    out: &mpsc::SyncSender<PlatformEvent>,
    atom: u32,
) -> bool {
    if atom == state.atoms.net_client_list {
        sync_client_list(state, out)
    } else if atom == state.atoms.net_active_window {
        emit_active_window(state, out)
    } else if atom == state.atoms.net_showing_desktop {
        let showing = get_cardinal(&state.conn, state.root, state.atoms.net_showing_desktop)
            .map(|v| v != 0)
            .unwrap_or(false);
        out.send(PlatformEvent::ShowingDesktopChanged(showing)).is_ok()
    } else if atom == state.atoms.net_current_desktop {
        let desktop = get_cardinal(&state.conn, state.root, state.atoms.net_current_desktop)
            .map(|v| v as i32)
            .unwrap_or(0);
        out.send(PlatformEvent::CurrentDesktopChanged(desktop)).is_ok()
    } else {
        true
    }
}

/// Diff the window manager's client list against the locally tracked set:
/// attach newly appeared clients that carry identifying info, detach
/// vanished ones.
fn sync_client_list(state: &mut EventState, out: &mpsc::SyncSender<PlatformEvent>) -> bool {
    let clients: HashSet<Window> =
        get_window_list(&state.conn, state.root, state.atoms.net_client_list)
            .into_iter()
            .collect();

    let gone: Vec<Window> = state.tracked.difference(&clients).copied().collect();
    for window in gone {
        state.tracked.remove(&window);
        if !out.send(PlatformEvent::WindowGone(window as WindowId)).is_ok() {
            return false;
        }
    }

    let appeared: Vec<Window> = clients.difference(&state.tracked).copied().collect();
    for window in appeared {
        let data = read_window_data(&state.conn, window, &state.atoms);
        // Only clients with some identifying information are worth
        // tracking; the rest would be unresolvable noise.
        let title = get_window_title(&state.conn, window, &state.atoms);
        if data.wm_class.is_empty()
            && data.wm_instance.is_empty()
            && data.command.is_empty()
            && title.is_empty()
            && read_pid(&state.conn, window, &state.atoms).is_none()
        {
            debug!(window, "skipping client without identifying info");
            continue;
        }

        if let Err(e) = state.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::PROPERTY_CHANGE
                    | EventMask::STRUCTURE_NOTIFY
                    | EventMask::VISIBILITY_CHANGE,
            ),
        ) {
            info!(window, "failed to set window event mask: {e}");
        }

        let mut record = WindowRecord::new_x11(window as WindowId, data)
            .with_commands(state.commands.clone());
        record.title = title;
        record.pid = read_pid(&state.conn, window, &state.atoms).unwrap_or(0);
        record.geometry = window_geometry(&state.conn, state.root, window).unwrap_or_default();
        record.icon = read_icon(&state.conn, window, &state.atoms).unwrap_or_default();

        state.tracked.insert(window);
        if out.send(PlatformEvent::WindowAppeared(record)).is_err() {
            return false;
        }
    }
    true
}

fn emit_active_window(state: &EventState, out: &mpsc::SyncSender<PlatformEvent>) -> bool {
    let active = get_window_list(&state.conn, state.root, state.atoms.net_active_window)
        .first()
        .copied()
        .filter(|w| *w != 0)
        .map(|w| w as WindowId);
    out.send(PlatformEvent::ActiveChanged(active)).is_ok()
}

/// Map a changed atom to a selective property refresh.
fn handle_window_property(
    state: &EventState,
    out: &mpsc::SyncSender<PlatformEvent>,
    window: Window,
    atom: u32,
) -> bool {
    let conn = &state.conn;
    let atoms = &state.atoms;
    let property = if atom == atoms.net_wm_state {
        Some(WindowProperty::States(read_states(conn, window, atoms)))
    } else if atom == atoms.gtk_application_id {
        Some(WindowProperty::GtkAppId(
            get_string_property(conn, window, atoms.gtk_application_id, atoms.utf8_string)
                .unwrap_or_default(),
        ))
    } else if atom == atoms.net_wm_pid {
        Some(WindowProperty::Pid(read_pid(conn, window, atoms).unwrap_or(0)))
    } else if atom == atoms.net_wm_name || atom == u32::from(AtomEnum::WM_NAME) {
        Some(WindowProperty::Title(get_window_title(conn, window, atoms)))
    } else if atom == atoms.net_wm_allowed_actions || atom == atoms.motif_wm_hints {
        Some(WindowProperty::AllowedActions {
            actions: read_allowed_actions(conn, window, atoms),
            motif_allow_close: read_motif_allow_close(conn, window, atoms),
        })
    } else if atom == u32::from(AtomEnum::WM_CLASS) {
        let (instance, class) = read_wm_class(conn, window);
        Some(WindowProperty::WmClass { instance, class })
    } else if atom == atoms.net_wm_window_type {
        Some(WindowProperty::WindowTypes(read_window_types(
            conn, window, atoms,
        )))
    } else if atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
        Some(WindowProperty::TransientFor(read_transient_for(conn, window)))
    } else if atom == atoms.xembed_info {
        Some(WindowProperty::Embedded(read_embedded(conn, window, atoms)))
    } else if atom == atoms.net_wm_icon {
        Some(WindowProperty::Icon(
            read_icon(conn, window, atoms).unwrap_or_default(),
        ))
    } else if atom == atoms.net_wm_desktop {
        Some(WindowProperty::Desktop(read_desktop(conn, window, atoms)))
    } else if atom == u32::from(AtomEnum::WM_COMMAND) {
        Some(WindowProperty::Command(read_wm_command(conn, window)))
    } else {
        None
    };

    match property {
        Some(property) => out
            .send(PlatformEvent::WindowChanged {
                window: window as WindowId,
                property,
            })
            .is_ok(),
        None => true,
    }
}

/* ------------------------------------------------------------ */
/* Command thread                                                */
/* ------------------------------------------------------------ */

struct CommandState {
    conn: Arc<RustConnection>,
    root: Window,
    atoms: Atoms,
    events_out: mpsc::SyncSender<PlatformEvent>,
}

fn command_loop(
    state: CommandState,
    commands: mpsc::Receiver<PlatformCommand>,
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
        run_command(&state, command);
        if let Err(e) = state.conn.flush() {
            info!("failed to flush connection: {e}");
        }
    }
    debug!("x11 command loop stopped");
}

fn run_command(state: &CommandState, command: PlatformCommand) {
    let conn = &state.conn;
    match command {
        PlatformCommand::Close { window, timestamp } => {
            send_root_message(
                state,
                window as Window,
                state.atoms.net_close_window,
                [timestamp, 2, 0, 0, 0],
            );
        }
        PlatformCommand::Activate { window } => {
            send_root_message(
                state,
                window as Window,
                state.atoms.net_active_window,
                [2, 0, 0, 0, 0],
            );
        }
        PlatformCommand::Minimize { window } => {
            send_root_message(
                state,
                window as Window,
                state.atoms.wm_change_state,
                [ICONIC_STATE, 0, 0, 0, 0],
            );
        }
        PlatformCommand::KillClient { window } => {
            if let Err(e) = conn.kill_client(window as u32) {
                warn!(window, "kill_client failed: {e}");
            }
        }
        PlatformCommand::Refresh { window } => refresh_window(state, window as Window),
    }
}

fn send_root_message(state: &CommandState, window: Window, message: u32, data: [u32; 5]) {
    let event = ClientMessageEvent::new(32, window, message, data);
    if let Err(e) = state.conn.send_event(
        false,
        state.root,
        EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
        event,
    ) {
        warn!(window, "failed to send client message: {e}");
    }
}

/// Re-read every cached property and push the refreshed values through the
/// normal change path.
fn refresh_window(state: &CommandState, window: Window) {
    let conn = &state.conn;
    let atoms = &state.atoms;
    let (instance, class) = read_wm_class(conn, window);
    let updates = vec![
        WindowProperty::Title(get_window_title(conn, window, atoms)),
        WindowProperty::Pid(read_pid(conn, window, atoms).unwrap_or(0)),
        WindowProperty::States(read_states(conn, window, atoms)),
        WindowProperty::WmClass { instance, class },
        WindowProperty::WindowTypes(read_window_types(conn, window, atoms)),
        WindowProperty::AllowedActions {
            actions: read_allowed_actions(conn, window, atoms),
            motif_allow_close: read_motif_allow_close(conn, window, atoms),
        },
        WindowProperty::Desktop(read_desktop(conn, window, atoms)),
        WindowProperty::Icon(read_icon(conn, window, atoms).unwrap_or_default()),
        WindowProperty::Geometry(window_geometry(conn, state.root, window).unwrap_or_default()),
    ];
    for property in updates {
        if state
            .events_out
            .send(PlatformEvent::WindowChanged {
                window: window as WindowId,
                property,
            })
            .is_err()
        {
            return;
        }
    }
}

/* ------------------------------------------------------------ */
/* Property readers                                              */
/* ------------------------------------------------------------ */

fn read_window_data(conn: &RustConnection, window: Window, atoms: &Atoms) -> X11WindowData {
    let (wm_instance, wm_class) = read_wm_class(conn, window);
    X11WindowData {
        wm_class,
        wm_instance,
        gtk_app_id: get_string_property(conn, window, atoms.gtk_application_id, atoms.utf8_string)
            .unwrap_or_default(),
        window_types: read_window_types(conn, window, atoms),
        states: read_states(conn, window, atoms),
        allowed_actions: read_allowed_actions(conn, window, atoms),
        motif_allow_close: read_motif_allow_close(conn, window, atoms),
        transient_for: read_transient_for(conn, window),
        embedded: read_embedded(conn, window, atoms),
        command: read_wm_command(conn, window),
        desktop: read_desktop(conn, window, atoms),
    }
}

fn get_property_values32(
    conn: &RustConnection,
    window: Window,
    atom: u32,
    prop_type: impl Into<u32>,
) -> Option<Vec<u32>> {
    let reply = conn
        .get_property(false, window, atom, prop_type.into(), 0, u32::MAX / 4)
        .ok()?
        .reply()
        .ok()?;
    reply.value32().map(|values| values.collect())
}

fn get_property_bytes(
    conn: &RustConnection,
    window: Window,
    atom: u32,
    prop_type: impl Into<u32>,
) -> Option<Vec<u8>> {
    let reply = conn
        .get_property(false, window, atom, prop_type.into(), 0, u32::MAX / 4)
        .ok()?
        .reply()
        .ok()?;
    if reply.value.is_empty() {
        None
    } else {
        Some(reply.value)
    }
}

fn get_string_property(
    conn: &RustConnection,
    window: Window,
    atom: u32,
    utf8_string: u32,
) -> Option<String> {
    let bytes = get_property_bytes(conn, window, atom, utf8_string)
        .or_else(|| get_property_bytes(conn, window, atom, AtomEnum::STRING))?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn get_cardinal(conn: &RustConnection, window: Window, atom: u32) -> Option<u32> {
    get_property_values32(conn, window, atom, AtomEnum::CARDINAL)?
        .first()
        .copied()
}

fn get_window_list(conn: &RustConnection, window: Window, atom: u32) -> Vec<Window> {
    get_property_values32(conn, window, atom, AtomEnum::WINDOW).unwrap_or_default()
}

fn get_window_title(conn: &RustConnection, window: Window, atoms: &Atoms) -> String {
    get_string_property(conn, window, atoms.net_wm_name, atoms.utf8_string)
        .or_else(|| {
            get_string_property(conn, window, u32::from(AtomEnum::WM_NAME), atoms.utf8_string)
        })
        .unwrap_or_default()
}

fn read_pid(conn: &RustConnection, window: Window, atoms: &Atoms) -> Option<u32> {
    get_cardinal(conn, window, atoms.net_wm_pid)
}

fn read_wm_class(conn: &RustConnection, window: Window) -> (String, String) {
    let Some(bytes) =
        get_property_bytes(conn, window, u32::from(AtomEnum::WM_CLASS), AtomEnum::STRING)
    else {
        return (String::new(), String::new());
    };
    let mut parts = bytes.split(|b| *b == 0);
    let instance = parts
        .next()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default();
    let class = parts
        .next()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default();
    (instance, class)
}

fn read_wm_command(conn: &RustConnection, window: Window) -> Vec<String> {
    get_property_bytes(conn, window, u32::from(AtomEnum::WM_COMMAND), AtomEnum::STRING)
        .map(|bytes| {
            bytes
                .split(|b| *b == 0)
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn read_states(conn: &RustConnection, window: Window, atoms: &Atoms) -> WindowStates {
    let values =
        get_property_values32(conn, window, atoms.net_wm_state, AtomEnum::ATOM).unwrap_or_default();
    WindowStates {
        skip_taskbar: values.contains(&atoms.net_wm_state_skip_taskbar),
        hidden: values.contains(&atoms.net_wm_state_hidden),
        modal: values.contains(&atoms.net_wm_state_modal),
        demands_attention: values.contains(&atoms.net_wm_state_demands_attention),
    }
}

fn read_window_types(conn: &RustConnection, window: Window, atoms: &Atoms) -> Vec<WindowType> {
    let values = get_property_values32(conn, window, atoms.net_wm_window_type, AtomEnum::ATOM)
        .unwrap_or_default();
    values
        .into_iter()
        .filter_map(|atom| {
            if atom == atoms.net_wm_window_type_normal {
                Some(WindowType::Normal)
            } else if atom == atoms.net_wm_window_type_dialog {
                Some(WindowType::Dialog)
            } else if atom == atoms.net_wm_window_type_utility {
                Some(WindowType::Utility)
            } else if atom == atoms.net_wm_window_type_menu {
                Some(WindowType::Menu)
            } else if atom == atoms.net_wm_window_type_dropdown_menu {
                Some(WindowType::DropdownMenu)
            } else if atom == atoms.net_wm_window_type_popup_menu {
                Some(WindowType::PopupMenu)
            } else if atom == atoms.net_wm_window_type_tooltip {
                Some(WindowType::Tooltip)
            } else if atom == atoms.net_wm_window_type_dock {
                Some(WindowType::Dock)
            } else if atom == atoms.net_wm_window_type_desktop {
                Some(WindowType::Desktop)
            } else if atom == atoms.net_wm_window_type_splash {
                Some(WindowType::Splash)
            } else if atom == atoms.net_wm_window_type_notification {
                Some(WindowType::Notification)
            } else {
                None
            }
        })
        .collect()
}

fn read_allowed_actions(
    conn: &RustConnection,
    window: Window,
    atoms: &Atoms,
) -> Option<Vec<WindowAction>> {
    let values = get_property_values32(conn, window, atoms.net_wm_allowed_actions, AtomEnum::ATOM)?;
    if values.is_empty() {
        return None;
    }
    let mut actions = Vec::new();
    if values.contains(&atoms.net_wm_action_close) {
        actions.push(WindowAction::Close);
    }
    if values.contains(&atoms.net_wm_action_minimize) {
        actions.push(WindowAction::Minimize);
    }
    Some(actions)
}

fn read_motif_allow_close(conn: &RustConnection, window: Window, atoms: &Atoms) -> Option<bool> {
    let values = get_property_values32(conn, window, atoms.motif_wm_hints, atoms.motif_wm_hints)?;
    let flags = *values.first()?;
    if flags & MWM_HINTS_FUNCTIONS == 0 {
        return None;
    }
    let functions = *values.get(1)?;
    Some(functions & MWM_FUNC_ALL != 0 || functions & MWM_FUNC_CLOSE != 0)
}

fn read_transient_for(conn: &RustConnection, window: Window) -> Option<WindowId> {
    get_property_values32(
        conn,
        window,
        u32::from(AtomEnum::WM_TRANSIENT_FOR),
        AtomEnum::WINDOW,
    )?
    .first()
    .copied()
    .filter(|w| *w != 0)
    .map(|w| w as WindowId)
}

fn read_embedded(conn: &RustConnection, window: Window, atoms: &Atoms) -> bool {
    get_property_values32(conn, window, atoms.xembed_info, atoms.xembed_info)
        .map(|values| !values.is_empty())
        .unwrap_or(false)
}

fn read_desktop(conn: &RustConnection, window: Window, atoms: &Atoms) -> i32 {
    match get_cardinal(conn, window, atoms.net_wm_desktop) {
        Some(u32::MAX) => -1,
        Some(desktop) => desktop as i32,
        None => 0,
    }
}

/// Window geometry in root coordinates; `None` when the window vanished.
fn window_geometry(conn: &RustConnection, root: Window, window: Window) -> Option<Rect> {
    let geometry = conn.get_geometry(window).ok()?.reply().ok()?;
    let translated = conn
        .translate_coordinates(window, root, 0, 0)
        .ok()?
        .reply()
        .ok()?;
    Some(Rect::new(
        translated.dst_x as i32,
        translated.dst_y as i32,
        geometry.width as u32,
        geometry.height as u32,
    ))
}

/// `_NET_WM_ICON` decoded from packed ARGB and re-encoded as a base64 PNG
/// payload. Picks the largest icon the client published.
fn read_icon(conn: &RustConnection, window: Window, atoms: &Atoms) -> Option<String> {
    let values = get_property_values32(conn, window, atoms.net_wm_icon, AtomEnum::CARDINAL)?;
    let (width, height, pixels) = largest_icon(&values)?;

    let mut rgba = Vec::with_capacity(pixels.len() * 4);
    for argb in pixels {
        let [a, r, g, b] = argb.to_be_bytes();
        rgba.extend_from_slice(&[r, g, b, a]);
    }
    let img = image::RgbaImage::from_raw(width, height, rgba)?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .ok()?;
    Some(format!("data:image/png;base64,{}", BASE64.encode(png)))
}

/// The property may carry several icon sizes back to back:
/// `[w, h, w*h pixels, w, h, ...]`.
fn largest_icon(values: &[u32]) -> Option<(u32, u32, &[u32])> {
    let mut best: Option<(u32, u32, &[u32])> = None;
    let mut rest = values;
    while rest.len() >= 2 {
        let width = rest[0];
        let height = rest[1];
        let count = (width as usize).checked_mul(height as usize)?;
        if width == 0 || height == 0 || rest.len() < 2 + count {
            break;
        }
        let pixels = &rest[2..2 + count];
        if best.map(|(w, h, _)| (width * height) > w * h).unwrap_or(true) {
            best = Some((width, height, pixels));
        }
        rest = &rest[2 + count..];
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_icon_picks_biggest_variant() {
        // Two icons: 1x1 and 2x2.
        let mut values = vec![1u32, 1, 0xff0000ff];
        values.extend_from_slice(&[2, 2, 1, 2, 3, 4]);
        let (w, h, pixels) = largest_icon(&values).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(pixels, &[1, 2, 3, 4]);
    }

    #[test]
    fn largest_icon_rejects_truncated_data() {
        let values = vec![4u32, 4, 1, 2]; // claims 16 pixels, has 2
        assert!(largest_icon(&values).is_none());
    }

    #[test]
    fn largest_icon_empty() {
        assert!(largest_icon(&[]).is_none());
        assert!(largest_icon(&[0, 0]).is_none());
    }
}
