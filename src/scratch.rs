//! Scratch desktop entries.
//!
//! Docking a window no desktop entry claims still has to survive a restart,
//! so the dock synthesizes one: a minimal desktop file plus a wrapper script
//! reproducing the window's command line, both named after the window's inner
//! id inside a private scratch directory. Undocking removes the synthesized
//! files again.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use crate::app::AppRecord;
use crate::error::{DockError, DockResult};
use crate::window::WindowRecord;

/// Icon used when the window never published one.
const FALLBACK_ICON: &str = "application-default-icon";

pub struct ScratchManager {
    dir: PathBuf,
}

impl ScratchManager {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `path` names a file inside the scratch directory.
    pub fn contains(&self, path: &str) -> bool {
        Path::new(path).starts_with(&self.dir)
    }

    /// Synthesize a scratch entry for an unidentified window.
    ///
    /// `cmdline` is the window process's command line; an empty one still
    /// produces an entry, it just cannot be relaunched.
    pub fn create_for_window(
        &self,
        window: &WindowRecord,
        inner_id: &str,
        cmdline: &[String],
    ) -> DockResult<AppRecord> {
        fs::create_dir_all(&self.dir)?;

        let name = window.display_name();
        let icon = self.write_icon(window, inner_id)?;
        let exec = self.write_script(inner_id, cmdline)?;

        let desktop_path = self.dir.join(format!("{inner_id}.desktop"));
        let content = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name={name}\n\
             Icon={icon}\n\
             Exec={exec} %f\n\
             NoDisplay=true\n\
             StartupNotify=true\n"
        );
        fs::write(&desktop_path, content)?;
        debug!(path = %desktop_path.display(), "scratch entry written");

        Ok(AppRecord::new(desktop_path.to_string_lossy(), name)
            .with_icon(icon)
            .with_exec(format!("{exec} %f"))
            .scratch())
    }

    /// Copy an existing desktop file into the scratch directory, for entries
    /// whose source file lives outside the application directories.
    pub fn copy_desktop_file(&self, app: &AppRecord) -> DockResult<AppRecord> {
        fs::create_dir_all(&self.dir)?;
        let file_name = Path::new(&app.desktop_path)
            .file_name()
            .ok_or_else(|| DockError::Scratch(format!("bad desktop path {}", app.desktop_path)))?;
        let target = self.dir.join(file_name);
        fs::copy(&app.desktop_path, &target)?;

        let mut copy = app.clone().scratch();
        copy.desktop_path = target.to_string_lossy().into_owned();
        Ok(copy)
    }

    /// Remove the desktop file and its synthesized siblings. Already-removed
    /// files are fine.
    pub fn remove(&self, desktop_path: &str) {
        let Some(stem) = Path::new(desktop_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
        else {
            return;
        };
        for suffix in ["desktop", "sh", "png"] {
            let path = self.dir.join(format!("{stem}.{suffix}"));
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "scratch file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to remove scratch file: {e}"),
            }
        }
    }

    /// Wrapper script reproducing the command line; the desktop Exec points
    /// here so field-code expansion never mangles the original arguments.
    fn write_script(&self, inner_id: &str, cmdline: &[String]) -> DockResult<String> {
        let script_path = self.dir.join(format!("{inner_id}.sh"));
        let command = if cmdline.is_empty() {
            String::from("true")
        } else {
            cmdline
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" ")
        };
        fs::write(&script_path, format!("#!/bin/sh\nexec {command} \"$@\"\n"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
        }

        Ok(script_path.to_string_lossy().into_owned())
    }

    /// Materialize a data-url icon as a file; plain icon names pass through.
    fn write_icon(&self, window: &WindowRecord, inner_id: &str) -> DockResult<String> {
        let icon = window.icon.as_str();
        if icon.is_empty() {
            return Ok(FALLBACK_ICON.to_string());
        }
        let Some(encoded) = icon.strip_prefix("data:image/png;base64,") else {
            return Ok(icon.to_string());
        };
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| DockError::Scratch(format!("bad icon payload: {e}")))?;
        let icon_path = self.dir.join(format!("{inner_id}.png"));
        fs::write(&icon_path, bytes)?;
        Ok(icon_path.to_string_lossy().into_owned())
    }
}

/// Single-quote an argument for /bin/sh.
fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/' | b':' | b'=' | b'@' | b'%' | b'+' | b','))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
