//! Dock settings and the persistence collaborator.
//!
//! The daemon never reads configuration files itself; everything goes through
//! the [`ConfigStore`] trait so the real desktop's settings service can sit
//! behind it. A failing store degrades every value to its default and logs,
//! it never takes the orchestrator down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{DockError, DockResult};
use crate::geometry::Position;

/// Default icon size in pixels when the store has no value.
pub const DEFAULT_ICON_SIZE: u32 = 36;
/// Debounce applied to smart-hide evaluation, milliseconds.
pub const DEFAULT_HIDE_TIMEOUT_MS: u64 = 400;
pub const DEFAULT_SHOW_TIMEOUT_MS: u64 = 100;
/// Recent list is clamped to this many apps when first loaded.
pub const MAX_RECENT_APPS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HideMode {
    KeepShowing,
    KeepHidden,
    SmartHide,
}

impl Default for HideMode {
    fn default() -> Self {
        HideMode::KeepShowing
    }
}

/// Taskbar display policy. `Fashion` groups windows and shows recent apps,
/// `Efficient` shows one slot per running app only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    Fashion,
    Efficient,
}

impl Default for DisplayMode {
    fn default() -> Self {
        DisplayMode::Efficient
    }
}

/// Snapshot of every persisted setting the core consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockSettings {
    pub hide_mode: HideMode,
    pub display_mode: DisplayMode,
    pub position: Position,
    pub icon_size: u32,
    pub hide_timeout_ms: u64,
    pub show_timeout_ms: u64,
    pub show_recent: bool,
    pub show_multi_window: bool,
    /// Ordered desktop-entry paths of docked apps.
    pub docked_apps: Vec<String>,
    /// Most recently launched apps, newest first.
    pub recent_apps: Vec<String>,
    /// App identifiers that must stay visible even when the compositor
    /// reports them non-minimizable.
    pub force_show_app_ids: Vec<String>,
}

impl DockSettings {
    pub fn with_defaults() -> Self {
        Self {
            hide_mode: HideMode::default(),
            display_mode: DisplayMode::default(),
            position: Position::default(),
            icon_size: DEFAULT_ICON_SIZE,
            hide_timeout_ms: DEFAULT_HIDE_TIMEOUT_MS,
            show_timeout_ms: DEFAULT_SHOW_TIMEOUT_MS,
            show_recent: true,
            show_multi_window: true,
            docked_apps: Vec::new(),
            recent_apps: Vec::new(),
            force_show_app_ids: vec!["dde-osd".to_string(), "dde-polkit-agent".to_string()],
        }
    }
}

/// External persistence collaborator.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> DockResult<DockSettings>;
    fn save(&self, settings: &DockSettings) -> DockResult<()>;
    /// Raw per-plugin JSON blob, keyed by plugin name.
    fn load_plugin_settings(&self) -> DockResult<HashMap<String, Value>>;
    fn save_plugin_settings(&self, settings: &HashMap<String, Value>) -> DockResult<()>;
}

/// In-memory store used by tests and as the fallback when no real store is
/// wired up.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: Mutex<(DockSettings, HashMap<String, Value>)>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((DockSettings::with_defaults(), HashMap::new())),
        }
    }

    pub fn with_settings(settings: DockSettings) -> Self {
        Self {
            inner: Mutex::new((settings, HashMap::new())),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> DockResult<DockSettings> {
        Ok(self.inner.lock()?.0.clone())
    }

    fn save(&self, settings: &DockSettings) -> DockResult<()> {
        self.inner.lock()?.0 = settings.clone();
        Ok(())
    }

    fn load_plugin_settings(&self) -> DockResult<HashMap<String, Value>> {
        Ok(self.inner.lock()?.1.clone())
    }

    fn save_plugin_settings(&self, settings: &HashMap<String, Value>) -> DockResult<()> {
        self.inner.lock()?.1 = settings.clone();
        Ok(())
    }
}

/// Live configuration context handed to the orchestrator at startup.
///
/// Owns the loaded settings plus the store used to persist changes back.
pub struct ConfigContext {
    store: Arc<dyn ConfigStore>,
    settings: DockSettings,
    plugin_settings: HashMap<String, Value>,
}

impl ConfigContext {
    /// Load settings from the store, degrading to defaults on failure.
    pub fn load(store: Arc<dyn ConfigStore>) -> Self {
        let mut settings = match store.load() {
            Ok(s) => s,
            Err(e) => {
                warn!("config store unavailable, using defaults: {e}");
                DockSettings::with_defaults()
            }
        };
        if settings.icon_size == 0 {
            settings.icon_size = DEFAULT_ICON_SIZE;
        }
        settings.recent_apps.truncate(MAX_RECENT_APPS);

        let plugin_settings = match store.load_plugin_settings() {
            Ok(p) => p,
            Err(e) => {
                warn!("plugin settings unavailable: {e}");
                HashMap::new()
            }
        };

        Self {
            store,
            settings,
            plugin_settings,
        }
    }

    pub fn settings(&self) -> &DockSettings {
        &self.settings
    }

    /// Mutate settings and persist the result. Persistence failure is logged
    /// and the in-memory value kept, matching the degrade-don't-crash policy.
    pub fn update<F: FnOnce(&mut DockSettings)>(&mut self, f: F) {
        f(&mut self.settings);
        if let Err(e) = self.store.save(&self.settings) {
            warn!("failed to persist settings: {e}");
        }
    }

    pub fn plugin_settings(&self) -> &HashMap<String, Value> {
        &self.plugin_settings
    }

    pub fn plugin_settings_json(&self) -> String {
        serde_json::to_string(&self.plugin_settings).unwrap_or_else(|_| "{}".to_string())
    }

    /// Merge an incoming `{plugin: {key: value}}` tree into the stored blob.
    /// Incoming keys overwrite existing ones, keys absent from the incoming
    /// tree are left untouched.
    pub fn merge_plugin_settings(&mut self, incoming: &str) -> DockResult<()> {
        let incoming: HashMap<String, Value> = serde_json::from_str(incoming)?;
        for (plugin, values) in incoming {
            let merged = match (self.plugin_settings.remove(&plugin), values) {
                (Some(Value::Object(mut existing)), Value::Object(new_values)) => {
                    for (k, v) in new_values {
                        existing.insert(k, v);
                    }
                    Value::Object(existing)
                }
                (_, values) => values,
            };
            self.plugin_settings.insert(plugin, merged);
        }
        self.persist_plugins();
        Ok(())
    }

    /// Remove the listed keys from one plugin's blob. An empty key list
    /// removes the plugin's blob entirely.
    pub fn remove_plugin_settings(&mut self, plugin: &str, keys: &[String]) {
        if keys.is_empty() {
            self.plugin_settings.remove(plugin);
        } else if let Some(Value::Object(map)) = self.plugin_settings.get_mut(plugin) {
            for key in keys {
                map.remove(key);
            }
        }
        self.persist_plugins();
    }

    fn persist_plugins(&self) {
        if let Err(e) = self.store.save_plugin_settings(&self.plugin_settings) {
            warn!("failed to persist plugin settings: {e}");
        }
    }
}

/// Store stub that always fails, for exercising the degraded path.
#[cfg(test)]
pub struct FailingConfigStore;

#[cfg(test)]
impl ConfigStore for FailingConfigStore {
    fn load(&self) -> DockResult<DockSettings> {
        Err(DockError::ConfigStore("down".to_string()))
    }
    fn save(&self, _: &DockSettings) -> DockResult<()> {
        Err(DockError::ConfigStore("down".to_string()))
    }
    fn load_plugin_settings(&self) -> DockResult<HashMap<String, Value>> {
        Err(DockError::ConfigStore("down".to_string()))
    }
    fn save_plugin_settings(&self, _: &HashMap<String, Value>) -> DockResult<()> {
        Err(DockError::ConfigStore("down".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ConfigContext {
        ConfigContext::load(Arc::new(MemoryConfigStore::new()))
    }

    #[test]
    fn failing_store_degrades_to_defaults() {
        let ctx = ConfigContext::load(Arc::new(FailingConfigStore));
        assert_eq!(ctx.settings().hide_mode, HideMode::KeepShowing);
        assert_eq!(ctx.settings().icon_size, DEFAULT_ICON_SIZE);
    }

    #[test]
    fn recent_apps_bounded_on_load() {
        let mut settings = DockSettings::with_defaults();
        settings.recent_apps = (0..20).map(|i| format!("app-{i}.desktop")).collect();
        let store = Arc::new(MemoryConfigStore::with_settings(settings));
        let ctx = ConfigContext::load(store);
        assert_eq!(ctx.settings().recent_apps.len(), MAX_RECENT_APPS);
        assert_eq!(ctx.settings().recent_apps[0], "app-0.desktop");
    }

    #[test]
    fn plugin_merge_overwrites_only_incoming_keys() {
        let mut ctx = context();
        ctx.merge_plugin_settings(r#"{"tray":{"size":24,"visible":true}}"#)
            .unwrap();
        ctx.merge_plugin_settings(r#"{"tray":{"size":32}}"#).unwrap();

        let tray = ctx.plugin_settings().get("tray").unwrap();
        assert_eq!(tray.get("size"), Some(&json!(32)));
        assert_eq!(tray.get("visible"), Some(&json!(true)));
    }

    #[test]
    fn plugin_merge_leaves_other_plugins_alone() {
        let mut ctx = context();
        ctx.merge_plugin_settings(r#"{"tray":{"size":24}}"#).unwrap();
        ctx.merge_plugin_settings(r#"{"datetime":{"format":"24h"}}"#)
            .unwrap();

        assert!(ctx.plugin_settings().contains_key("tray"));
        assert!(ctx.plugin_settings().contains_key("datetime"));
    }

    #[test]
    fn remove_plugin_keys_and_whole_blob() {
        let mut ctx = context();
        ctx.merge_plugin_settings(r#"{"tray":{"size":24,"visible":true}}"#)
            .unwrap();

        ctx.remove_plugin_settings("tray", &["size".to_string()]);
        let tray = ctx.plugin_settings().get("tray").unwrap();
        assert!(tray.get("size").is_none());
        assert!(tray.get("visible").is_some());

        ctx.remove_plugin_settings("tray", &[]);
        assert!(ctx.plugin_settings().get("tray").is_none());
    }

    #[test]
    fn update_persists_through_store() {
        let store = Arc::new(MemoryConfigStore::new());
        let mut ctx = ConfigContext::load(store.clone());
        ctx.update(|s| s.hide_mode = HideMode::SmartHide);
        assert_eq!(store.load().unwrap().hide_mode, HideMode::SmartHide);
    }
}
