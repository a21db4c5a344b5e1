//! Multi-strategy window-to-application resolver.
//!
//! Strategies run in a fixed priority order; the first one producing an
//! [`AppRecord`] wins and later strategies are never consulted. Every winning
//! result is re-checked against the autostart-symlink fixup. A window no
//! strategy can resolve keeps an empty inner id and falls back to
//! window-derived name and icon.

mod process;
mod rules;
mod strategies;

pub use process::{FakeProcessInfo, ProcProcessInfo, ProcessInfo};
pub use rules::{Rule, RuleKey, RuleOp, RuleTable};
pub use strategies::default_strategies;

use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use fxhash::FxHasher64;
use tracing::debug;

use crate::app::{AppRecord, DesktopEntryProvider, WindowMatcher};
use crate::window::WindowRecord;

/// Stable content-addressed identity joining windows to entries.
///
/// Same inputs always produce the same id; the hash is rendered as 16 hex
/// digits prefixed to keep scratch filenames filesystem-safe.
pub fn hash_inner_id(parts: &[&str]) -> String {
    let mut hasher = FxHasher64::default();
    for part in parts {
        hasher.write(part.as_bytes());
        hasher.write_u8(0);
    }
    format!("{:016x}", hasher.finish())
}

/// Identity for a resolved application: hashed from its desktop-entry path.
pub fn inner_id_for_app(desktop_path: &str) -> String {
    hash_inner_id(&["app", desktop_path])
}

/// Identity for an unresolved window: hashed from its class, instance,
/// executable, arguments and gtk app id.
pub fn inner_id_for_window(
    class: &str,
    instance: &str,
    exe: &str,
    args: &str,
    gtk_app_id: &str,
) -> String {
    hash_inner_id(&["win", class, instance, exe, args, gtk_app_id])
}

/// Resolution outcome: the app may be absent, the inner id only when nothing
/// at all matched.
#[derive(Debug, Clone, Default)]
pub struct IdentifyResult {
    pub app: Option<AppRecord>,
    pub inner_id: String,
}

/// Lookup into already-identified entries, implemented by the registry.
pub trait RunningApps {
    /// App of any identified entry owning a window of this process.
    fn app_for_pid(&self, pid: u32) -> Option<AppRecord>;
}

/// Empty lookup for call sites with no registry at hand.
pub struct NoRunningApps;

impl RunningApps for NoRunningApps {
    fn app_for_pid(&self, _pid: u32) -> Option<AppRecord> {
        None
    }
}

/// Shared services every strategy may consult.
pub struct IdentifyContext {
    pub provider: Arc<dyn DesktopEntryProvider>,
    pub matcher: Option<Arc<dyn WindowMatcher>>,
    pub process: Arc<dyn ProcessInfo>,
    /// Directory holding scratch desktop entries synthesized on dock.
    pub scratch_dir: PathBuf,
    pub rules: RuleTable,
}

/// One resolver strategy. Returning `None` passes the window to the next
/// strategy in the chain.
pub trait IdentifyStrategy: Send {
    fn name(&self) -> &'static str;
    fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        running: &dyn RunningApps,
    ) -> Option<AppRecord>;
}

/// The prioritized strategy list.
pub struct IdentificationChain {
    strategies: Vec<Box<dyn IdentifyStrategy>>,
}

impl IdentificationChain {
    pub fn new(strategies: Vec<Box<dyn IdentifyStrategy>>) -> Self {
        Self { strategies }
    }

    /// Chain with the default strategy order.
    pub fn standard() -> Self {
        Self::new(default_strategies())
    }

    /// Resolve `window` to an application and inner id.
    pub fn identify(
        &self,
        ctx: &IdentifyContext,
        window: &WindowRecord,
        running: &dyn RunningApps,
    ) -> IdentifyResult {
        for strategy in &self.strategies {
            let Some(app) = strategy.identify(ctx, window, running) else {
                continue;
            };
            debug!(
                window = window.id,
                strategy = strategy.name(),
                app = %app.desktop_path,
                "window identified"
            );
            let app = self.fixup_autostart(ctx, app);
            let inner_id = inner_id_for_app(&app.desktop_path);
            return IdentifyResult {
                app: Some(app),
                inner_id,
            };
        }

        debug!(window = window.id, "no strategy matched");
        IdentifyResult {
            app: None,
            inner_id: window_fallback_inner_id(ctx, window),
        }
    }

    /// A desktop entry that is really an autostart-folder symlink stands in
    /// for its target; substitute the target's own identity.
    fn fixup_autostart(&self, ctx: &IdentifyContext, app: AppRecord) -> AppRecord {
        match ctx.provider.autostart_target(&app.desktop_path) {
            Some(target) => {
                debug!(
                    from = %app.desktop_path,
                    to = %target.desktop_path,
                    "autostart symlink fixup"
                );
                target
            }
            None => app,
        }
    }
}

/// Window-derived identity used when every strategy failed and for naming
/// scratch entries.
pub fn window_fallback_inner_id(ctx: &IdentifyContext, window: &WindowRecord) -> String {
    let (class, instance, gtk_app_id) = match &window.backend {
        crate::window::BackendData::X11(data) => (
            data.wm_class.as_str(),
            data.wm_instance.as_str(),
            data.gtk_app_id.as_str(),
        ),
        crate::window::BackendData::Wayland(data) => (data.app_id.as_str(), "", ""),
    };
    let cmdline = ctx.process.cmdline(window.pid).unwrap_or_default();
    let exe = cmdline.first().cloned().unwrap_or_default();
    let args = cmdline.get(1..).unwrap_or_default().join(" ");
    inner_id_for_window(class, instance, &exe, &args, gtk_app_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::MemoryDesktopEntryProvider;
    use crate::window::{WindowRecord, X11WindowData};

    fn ctx() -> IdentifyContext {
        IdentifyContext {
            provider: Arc::new(MemoryDesktopEntryProvider::new()),
            matcher: None,
            process: Arc::new(FakeProcessInfo::new()),
            scratch_dir: PathBuf::from("/nonexistent"),
            rules: RuleTable::empty(),
        }
    }

    #[test]
    fn inner_id_is_deterministic() {
        let a = inner_id_for_window("Firefox", "Navigator", "/usr/bin/firefox", "", "");
        let b = inner_id_for_window("Firefox", "Navigator", "/usr/bin/firefox", "", "");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn inner_id_distinguishes_field_boundaries() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = inner_id_for_window("ab", "c", "", "", "");
        let b = inner_id_for_window("a", "bc", "", "", "");
        assert_ne!(a, b);
    }

    #[test]
    fn app_and_window_ids_never_collide() {
        assert_ne!(inner_id_for_app("x"), inner_id_for_window("x", "", "", "", ""));
    }

    struct Fixed(Option<AppRecord>);

    impl IdentifyStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn identify(
            &self,
            _ctx: &IdentifyContext,
            _window: &WindowRecord,
            _running: &dyn RunningApps,
        ) -> Option<AppRecord> {
            self.0.clone()
        }
    }

    #[test]
    fn first_match_wins_regardless_of_later_strategies() {
        let winner = AppRecord::new("/apps/winner.desktop", "Winner");
        let loser = AppRecord::new("/apps/loser.desktop", "Loser");
        let chain = IdentificationChain::new(vec![
            Box::new(Fixed(None)),
            Box::new(Fixed(Some(winner.clone()))),
            Box::new(Fixed(Some(loser))),
        ]);

        let window = WindowRecord::new_x11(1, X11WindowData::default());
        let result = chain.identify(&ctx(), &window, &NoRunningApps);
        assert_eq!(result.app.unwrap().desktop_path, winner.desktop_path);
        assert_eq!(result.inner_id, inner_id_for_app(&winner.desktop_path));
    }

    #[test]
    fn unidentified_window_gets_window_hash_id() {
        let chain = IdentificationChain::new(vec![Box::new(Fixed(None))]);
        let window = WindowRecord::new_x11(
            1,
            X11WindowData {
                wm_class: "Scribble".to_string(),
                ..Default::default()
            },
        );
        let result = chain.identify(&ctx(), &window, &NoRunningApps);
        assert!(result.app.is_none());
        assert_eq!(
            result.inner_id,
            inner_id_for_window("Scribble", "", "", "", "")
        );
    }

    #[test]
    fn autostart_fixup_substitutes_target() {
        let mut provider = MemoryDesktopEntryProvider::new();
        let target = AppRecord::new("/usr/share/applications/real.desktop", "Real");
        provider.insert_autostart_link("/home/u/.config/autostart/real.desktop", target.clone());

        let link = AppRecord::new("/home/u/.config/autostart/real.desktop", "Real");
        let chain = IdentificationChain::new(vec![Box::new(Fixed(Some(link)))]);
        let mut ctx = ctx();
        ctx.provider = Arc::new(provider);

        let window = WindowRecord::new_x11(1, X11WindowData::default());
        let result = chain.identify(&ctx, &window, &NoRunningApps);
        assert_eq!(result.app.unwrap().desktop_path, target.desktop_path);
        assert_eq!(result.inner_id, inner_id_for_app(&target.desktop_path));
    }
}
