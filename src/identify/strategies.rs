//! The individual resolver strategies, in their fixed priority order.

use std::time::Duration;

use tracing::debug;

use crate::app::AppRecord;
use crate::window::{BackendData, WindowRecord};

use super::process::is_shell;
use super::{IdentifyContext, IdentifyStrategy, RunningApps, window_fallback_inner_id};

/// How far up the parent chain the launch-marker check walks.
const ANCESTOR_WALK_LIMIT: usize = 6;
/// Matcher service retry policy: some apps register late.
const MATCHER_RETRIES: u32 = 3;
const MATCHER_RETRY_SLEEP: Duration = Duration::from_millis(100);

/// The fixed default order. First non-null result wins.
pub fn default_strategies() -> Vec<Box<dyn IdentifyStrategy>> {
    vec![
        Box::new(EnvLaunchMarker),
        Box::new(CmdlineConvention),
        Box::new(RuleTableStrategy),
        Box::new(MatcherQuery),
        Box::new(PidLookup),
        Box::new(ScratchEntry),
        Box::new(CompositorAppId),
        Box::new(ClassInstance),
    ]
}

/// `GIO_LAUNCHED_DESKTOP_FILE` left in the environment by the launcher.
///
/// The variable is inherited by every child, so it is only trusted when the
/// recorded launcher pid is the window's process, its direct parent, or a
/// shell ancestor (wrapper scripts).
pub struct EnvLaunchMarker;

impl IdentifyStrategy for EnvLaunchMarker {
    fn name(&self) -> &'static str {
        "env-launch-marker"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        if window.pid == 0 {
            return None;
        }
        let env = ctx.process.environ(window.pid)?;
        let path = env.get("GIO_LAUNCHED_DESKTOP_FILE")?;
        let marker_pid: u32 = env.get("GIO_LAUNCHED_DESKTOP_FILE_PID")?.parse().ok()?;

        if !marker_trusted(ctx, window.pid, marker_pid) {
            debug!(
                window = window.id,
                marker_pid, "stale launch marker, not trusted"
            );
            return None;
        }
        ctx.provider.by_path(path)
    }
}

fn marker_trusted(ctx: &IdentifyContext, window_pid: u32, marker_pid: u32) -> bool {
    if marker_pid == window_pid {
        return true;
    }
    let mut pid = window_pid;
    for depth in 0..ANCESTOR_WALK_LIMIT {
        let Some(parent) = ctx.process.ppid(pid) else {
            return false;
        };
        if parent <= 1 {
            return false;
        }
        if parent == marker_pid {
            // Direct parent is always trusted; a deeper ancestor only when
            // every hop in between is a shell wrapper.
            return depth == 0 || shell_chain(ctx, window_pid, marker_pid);
        }
        pid = parent;
    }
    false
}

fn shell_chain(ctx: &IdentifyContext, from: u32, to: u32) -> bool {
    let mut pid = ctx.process.ppid(from).unwrap_or(0);
    while pid > 1 && pid != to {
        match ctx.process.exe(pid) {
            Some(exe) if is_shell(&exe) => {}
            _ => return false,
        }
        pid = ctx.process.ppid(pid).unwrap_or(0);
    }
    pid == to
}

/// Launcher command-line conventions: booster processes carry the desktop
/// file on their command line, `flatpak run` carries the app id, and
/// snap-confined executables encode the snap name in their path.
pub struct CmdlineConvention;

impl IdentifyStrategy for CmdlineConvention {
    fn name(&self) -> &'static str {
        "cmdline-convention"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        let cmdline = ctx.process.cmdline(window.pid)?;
        let argv0 = cmdline.first()?;
        let base = argv0.rsplit('/').next().unwrap_or(argv0);

        if base.contains("booster") || base.contains("turbo") {
            for arg in &cmdline[1..] {
                if let Some(path) = arg.strip_prefix("--desktop-file=") {
                    return ctx.provider.by_path(path);
                }
                if arg.ends_with(".desktop") {
                    return ctx.provider.by_path(arg);
                }
            }
            return None;
        }

        if base == "flatpak" {
            // `flatpak run [options] <app-id> [args]`: the id is the first
            // non-option argument after `run`.
            let mut after_run = false;
            for arg in &cmdline[1..] {
                if !after_run {
                    after_run = arg == "run";
                    continue;
                }
                if arg.starts_with('-') {
                    continue;
                }
                return ctx.provider.by_id(arg);
            }
            return None;
        }

        if let Some(rest) = argv0.strip_prefix("/snap/") {
            let name = rest.split('/').next()?;
            return ctx.provider.by_id(name);
        }
        None
    }
}

/// Site-local JSON rule table.
pub struct RuleTableStrategy;

impl IdentifyStrategy for RuleTableStrategy {
    fn name(&self) -> &'static str {
        "rule-table"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        let exe = ctx.process.exe(window.pid).unwrap_or_default();
        let rule = ctx.rules.first_match(window, &exe)?;
        resolve_id_or_path(ctx, &rule.result)
    }
}

/// Legacy window-matcher service, queried with bounded retries.
pub struct MatcherQuery;

impl IdentifyStrategy for MatcherQuery {
    fn name(&self) -> &'static str {
        "window-matcher"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        // The matcher only knows legacy windowing clients.
        if window.backend.as_x11().is_none() {
            return None;
        }
        let matcher = ctx.matcher.as_ref()?;
        for attempt in 0..MATCHER_RETRIES {
            if let Some(path) = matcher.match_window(window.id) {
                return ctx.provider.by_path(&path);
            }
            if attempt + 1 < MATCHER_RETRIES {
                std::thread::sleep(MATCHER_RETRY_SLEEP);
            }
        }
        None
    }
}

/// Another window of the same process has already been identified.
pub struct PidLookup;

impl IdentifyStrategy for PidLookup {
    fn name(&self) -> &'static str {
        "pid-lookup"
    }

    fn identify(
        &self,
        _ctx: &IdentifyContext,
        window: &WindowRecord,
        running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        if window.pid == 0 {
            return None;
        }
        running.app_for_pid(window.pid)
    }
}

/// Scratch desktop entry previously synthesized for this window identity.
pub struct ScratchEntry;

impl IdentifyStrategy for ScratchEntry {
    fn name(&self) -> &'static str {
        "scratch-entry"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        let inner_id = window_fallback_inner_id(ctx, window);
        let path = ctx.scratch_dir.join(format!("{inner_id}.desktop"));
        if !path.is_file() {
            return None;
        }
        let path = path.to_string_lossy().into_owned();
        Some(
            AppRecord::new(path, window.display_name())
                .with_icon(window.icon.clone())
                .scratch(),
        )
    }
}

/// Compositor app-id (or the gtk application id on the legacy backend)
/// matched against installed desktop entries.
pub struct CompositorAppId;

impl IdentifyStrategy for CompositorAppId {
    fn name(&self) -> &'static str {
        "app-id"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        let app_id = match &window.backend {
            BackendData::Wayland(data) => data.app_id.as_str(),
            BackendData::X11(data) => data.gtk_app_id.as_str(),
        };
        if app_id.is_empty() {
            return None;
        }
        ctx.provider
            .by_id(app_id)
            .or_else(|| ctx.provider.by_id(&app_id.to_lowercase()))
    }
}

/// Raw window class/instance, the last resort.
pub struct ClassInstance;

impl IdentifyStrategy for ClassInstance {
    fn name(&self) -> &'static str {
        "class-instance"
    }

    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        _running: &dyn RunningApps,
    ) -> Option<AppRecord> {
        let data = window.backend.as_x11()?;
        for candidate in [
            data.wm_class.as_str(),
            &data.wm_class.to_lowercase(),
            data.wm_instance.as_str(),
        ] {
            if candidate.is_empty() {
                continue;
            }
            if let Some(app) = ctx.provider.by_id(candidate) {
                return Some(app);
            }
        }
        None
    }
}

fn resolve_id_or_path(ctx: &IdentifyContext, result: &str) -> Option<AppRecord> {
    if result.starts_with('/') {
        ctx.provider.by_path(result)
    } else {
        ctx.provider.by_id(result)
    }
}
