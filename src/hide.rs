//! Auto-hide state evaluation.
//!
//! The orchestrator debounces evaluation; this module is the pure decision
//! core. `KeepShowing` and `KeepHidden` are unconditional. `SmartHide` hides
//! the dock exactly when the active window overlaps the dock's screen
//! rectangle, with edge-adjacent windows on the dock's own screen edge
//! counting as overlap.

use serde::Serialize;

use crate::config::HideMode;
use crate::geometry::{Position, Rect};
use crate::window::{BackendData, WindowRecord, WindowType};

/// App ids (compositor) and window classes (legacy) of system overlay
/// surfaces, never a reason to hide the dock.
const SYSTEM_SURFACE_APP_IDS: &[&str] = &["dde-launcher", "dde-osd", "dde-lock", "dde-shutdown"];

/// Published dock visibility. `Unknown` exists only before the first
/// evaluation after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HideState {
    Unknown,
    Show,
    Hide,
}

/// Everything one smart-hide evaluation looks at.
pub struct HideInputs<'a> {
    /// Dock rectangle in screen coordinates, as reported by the front-end.
    pub frontend_rect: Rect,
    pub position: Position,
    /// The launcher overlay keeps the dock visible while it is up.
    pub launcher_visible: bool,
    pub current_desktop: i32,
    pub active_window: Option<&'a WindowRecord>,
}

/// Decide the dock's visibility. Pure: same inputs, same answer.
pub fn evaluate(mode: HideMode, inputs: &HideInputs<'_>) -> HideState {
    match mode {
        HideMode::KeepShowing => HideState::Show,
        HideMode::KeepHidden => HideState::Hide,
        HideMode::SmartHide => {
            if inputs.launcher_visible {
                return HideState::Show;
            }
            let Some(active) = inputs.active_window else {
                return HideState::Show;
            };
            if should_hide_for(active, inputs) {
                HideState::Hide
            } else {
                HideState::Show
            }
        }
    }
}

/// Whether the active window is a reason to hide the dock.
fn should_hide_for(window: &WindowRecord, inputs: &HideInputs<'_>) -> bool {
    match &window.backend {
        BackendData::X11(data) => {
            if SYSTEM_SURFACE_APP_IDS
                .iter()
                .any(|id| data.wm_class.eq_ignore_ascii_case(id))
            {
                return false;
            }
            if data.states.hidden {
                return false;
            }
            if data.window_types.contains(&WindowType::Desktop)
                || data.window_types.contains(&WindowType::Dock)
            {
                return false;
            }
            // Sticky windows (-1) are on every desktop.
            if data.desktop != -1 && data.desktop != inputs.current_desktop {
                return false;
            }
            window
                .geometry
                .intersects_dock(&inputs.frontend_rect, inputs.position)
        }
        BackendData::Wayland(data) => {
            if SYSTEM_SURFACE_APP_IDS.contains(&data.app_id.as_str()) {
                return false;
            }
            if !data.active || data.minimized {
                return false;
            }
            window
                .geometry
                .intersects_dock(&inputs.frontend_rect, inputs.position)
        }
    }
}
