pub mod app;
pub mod config;
pub mod dock;
pub mod entry;
pub mod error;
pub mod events;
pub mod geometry;
pub mod hide;
pub mod identify;
pub mod platform;
pub mod registry;
pub mod scratch;
pub mod window;

pub use config::{DisplayMode, DockSettings, HideMode};
pub use dock::{Dock, DockHandle, DockMessage, DockRequest, DockServices};
pub use error::{DockError, DockResult};
pub use events::{DockEvent, EventHub};
pub use geometry::{Position, Rect};
pub use hide::HideState;
pub use window::{WindowId, WindowRecord};

/// Build the core and move it onto its own thread.
///
/// Subscribe to events through [`Dock::hub`] before calling this when the
/// initialization traffic matters; [`DockHandle`] only exposes the request
/// side.
pub fn start(services: DockServices) -> DockHandle {
    Dock::new(services).spawn()
}

/// Start the core wired to the legacy windowing backend.
///
/// # Returns
/// The core handle plus the backend handle; shut the backend down first.
#[cfg(target_os = "linux")]
pub fn start_with_x11(
    services: DockServices,
) -> DockResult<(DockHandle, platform::BackendHandle)> {
    let handle = start(services);
    let backend = platform::x11::X11Backend::connect()?.spawn(handle.platform_sender())?;
    Ok((handle, backend))
}
