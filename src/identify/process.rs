//! Process inspection seam used by identification strategies.
//!
//! The real implementation reads `/proc`; the fake one is table-driven so
//! strategies can be tested without live processes.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

/// Per-process facts the chain consults.
pub trait ProcessInfo: Send + Sync {
    /// Environment of the process, `None` when it is gone or unreadable.
    fn environ(&self, pid: u32) -> Option<HashMap<String, String>>;
    /// Command line, argv0 first.
    fn cmdline(&self, pid: u32) -> Option<Vec<String>>;
    fn ppid(&self, pid: u32) -> Option<u32>;
    /// Resolved executable path.
    fn exe(&self, pid: u32) -> Option<String>;
}

/// `/proc`-backed implementation.
#[derive(Debug, Default)]
pub struct ProcProcessInfo;

impl ProcProcessInfo {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessInfo for ProcProcessInfo {
    fn environ(&self, pid: u32) -> Option<HashMap<String, String>> {
        let raw = fs::read(format!("/proc/{pid}/environ")).ok()?;
        let mut env = HashMap::new();
        for chunk in raw.split(|b| *b == 0) {
            let text = String::from_utf8_lossy(chunk);
            if let Some((key, value)) = text.split_once('=') {
                env.insert(key.to_string(), value.to_string());
            }
        }
        Some(env)
    }

    fn cmdline(&self, pid: u32) -> Option<Vec<String>> {
        let raw = fs::read(format!("/proc/{pid}/cmdline")).ok()?;
        let args: Vec<String> = raw
            .split(|b| *b == 0)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        if args.is_empty() { None } else { Some(args) }
    }

    fn ppid(&self, pid: u32) -> Option<u32> {
        let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        // Field 4, counting from after the parenthesized comm which may
        // itself contain spaces.
        let after_comm = stat.rsplit_once(')')?.1;
        after_comm.split_whitespace().nth(1)?.parse().ok()
    }

    fn exe(&self, pid: u32) -> Option<String> {
        fs::read_link(format!("/proc/{pid}/exe"))
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

/// Table-driven fake for tests.
#[derive(Debug, Default)]
pub struct FakeProcessInfo {
    inner: Mutex<FakeTables>,
}

#[derive(Debug, Default)]
struct FakeTables {
    environ: HashMap<u32, HashMap<String, String>>,
    cmdline: HashMap<u32, Vec<String>>,
    ppid: HashMap<u32, u32>,
    exe: HashMap<u32, String>,
}

impl FakeProcessInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_environ(&self, pid: u32, env: &[(&str, &str)]) {
        let map = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Ok(mut inner) = self.inner.lock() {
            inner.environ.insert(pid, map);
        }
    }

    pub fn set_cmdline(&self, pid: u32, args: &[&str]) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .cmdline
                .insert(pid, args.iter().map(|a| a.to_string()).collect());
        }
    }

    pub fn set_ppid(&self, pid: u32, ppid: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.ppid.insert(pid, ppid);
        }
    }

    pub fn set_exe(&self, pid: u32, exe: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.exe.insert(pid, exe.to_string());
        }
    }
}

impl ProcessInfo for FakeProcessInfo {
    fn environ(&self, pid: u32) -> Option<HashMap<String, String>> {
        self.inner.lock().ok()?.environ.get(&pid).cloned()
    }

    fn cmdline(&self, pid: u32) -> Option<Vec<String>> {
        self.inner.lock().ok()?.cmdline.get(&pid).cloned()
    }

    fn ppid(&self, pid: u32) -> Option<u32> {
        self.inner.lock().ok()?.ppid.get(&pid).copied()
    }

    fn exe(&self, pid: u32) -> Option<String> {
        self.inner.lock().ok()?.exe.get(&pid).cloned()
    }
}

/// Whether `pid`'s executable looks like a shell; used to decide if an
/// inherited launch-marker variable can be trusted one level up.
pub fn is_shell(exe: &str) -> bool {
    matches!(
        exe.rsplit('/').next().unwrap_or(exe),
        "sh" | "bash" | "zsh" | "fish" | "dash" | "ksh"
    )
}
