//! Starting one external target.
//!
//! The launcher knows nothing about sequencing: it classifies a path, builds the platform
//! command that opens it with the requested window mode, and returns once the OS has
//! accepted the spawn request. It never waits for the target to finish starting.

use super::normalize::is_url;
use super::running;
use crate::model::WindowMode;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("interpreter '{interpreter}' not found for {path}")]
    InterpreterMissing { interpreter: String, path: String },
    #[error("failed to start {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("launcher fault: {0}")]
    Panicked(String),
}

/// `Ok` means the OS accepted the request to start the target.
pub type LaunchOutcome = Result<(), LaunchError>;

pub trait ProcessLauncher: Send + Sync {
    /// Start `path` (already normalized) with the requested window mode. Exactly one
    /// process-creation or shell-open request per call.
    fn launch(&self, path: &str, window_mode: WindowMode) -> LaunchOutcome;

    /// Whether a program matching `path` is already running. Only consulted when the
    /// runner's skip-if-running policy is enabled.
    fn is_running(&self, _path: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Run through a command interpreter.
    Script { interpreter: &'static str },
    /// Started directly (or via the shell on Windows so `.lnk` resolves).
    Executable,
    /// Opened with the platform's default handler, as if double-clicked.
    Document,
}

impl TargetKind {
    pub fn classify(path: &str) -> Self {
        if is_url(path) {
            return TargetKind::Document;
        }
        let p = Path::new(path);
        let ext = p
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "bat" | "cmd" => TargetKind::Script {
                interpreter: "cmd.exe",
            },
            "sh" | "command" => TargetKind::Script { interpreter: "sh" },
            "exe" | "lnk" | "com" => TargetKind::Executable,
            "" if !has_separator(path) => TargetKind::Executable,
            _ if is_executable_file(p) => TargetKind::Executable,
            _ => TargetKind::Document,
        }
    }
}

fn has_separator(path: &str) -> bool {
    path.contains('/') || path.contains('\\')
}

#[cfg(unix)]
fn is_executable_file(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(p)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(_p: &Path) -> bool {
    false
}

/// Launcher backed by the host OS.
#[derive(Debug, Default, Clone)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, path: &str, window_mode: WindowMode) -> LaunchOutcome {
        // Shell-open facilities happily "succeed" on missing files, so check local paths up front.
        if !is_url(path) && (has_separator(path) || Path::new(path).is_absolute()) {
            if let Err(e) = std::fs::metadata(path) {
                return Err(map_io_error(path, None, e));
            }
        }

        let kind = TargetKind::classify(path);
        let mut cmd = build_command(path, kind, window_mode);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        tracing::debug!(path, ?kind, mode = %window_mode, command = ?cmd, "spawning");
        let interpreter = match kind {
            TargetKind::Script { interpreter } => Some(interpreter),
            _ => None,
        };
        let child = cmd.spawn().map_err(|e| map_io_error(path, interpreter, e))?;
        reap_in_background(child);
        Ok(())
    }

    fn is_running(&self, path: &str) -> bool {
        running::is_process_running(path)
    }
}

fn map_io_error(path: &str, interpreter: Option<&str>, e: io::Error) -> LaunchError {
    match (e.kind(), interpreter) {
        (io::ErrorKind::NotFound, Some(interp)) => LaunchError::InterpreterMissing {
            interpreter: interp.to_string(),
            path: path.to_string(),
        },
        (io::ErrorKind::NotFound, None) => LaunchError::NotFound(path.to_string()),
        (io::ErrorKind::PermissionDenied, _) => LaunchError::PermissionDenied(path.to_string()),
        _ => LaunchError::Spawn {
            path: path.to_string(),
            source: e,
        },
    }
}

// Wait on the child from a detached thread so it does not linger as a zombie. The exit
// status is not inspected.
#[cfg(unix)]
fn reap_in_background(mut child: std::process::Child) {
    let _ = std::thread::Builder::new()
        .name("reaper".into())
        .spawn(move || {
            let _ = child.wait();
        });
}

#[cfg(not(unix))]
fn reap_in_background(_child: std::process::Child) {}

/// `start` switch for the requested window mode.
#[cfg(any(windows, test))]
fn start_flag(mode: WindowMode) -> Option<&'static str> {
    match mode {
        WindowMode::Maximized => Some("/MAX"),
        WindowMode::Minimized => Some("/MIN"),
        WindowMode::Normal => None,
    }
}

/// Quote `arg` for a `cmd.exe /c` line. The quotes and every metacharacter are
/// caret-escaped, so `&`, `|` and `%NAME%` reach the target literally.
#[cfg(any(windows, test))]
fn cmd_escape(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() * 2 + 4);
    out.push_str("^\"");
    for c in arg.chars() {
        if matches!(
            c,
            '(' | ')' | '[' | ']' | '%' | '!' | '^' | '"' | '`' | '<' | '>' | '&' | '|' | ';'
                | ',' | ' ' | '*' | '?'
        ) {
            out.push('^');
        }
        out.push(c);
    }
    out.push_str("^\"");
    out
}

#[cfg(windows)]
fn build_command(path: &str, kind: TargetKind, mode: WindowMode) -> Command {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

    let mut cmd = match kind {
        TargetKind::Script { interpreter } if interpreter != "cmd.exe" => {
            let mut c = Command::new(interpreter);
            c.arg(path);
            c
        }
        TargetKind::Script { .. } => {
            // Raw args: std's quoting does not protect against cmd's own metacharacters.
            let mut c = Command::new("cmd.exe");
            c.raw_arg("/d").raw_arg("/c").raw_arg(cmd_escape(path));
            c
        }
        TargetKind::Executable | TargetKind::Document => {
            // `start` goes through the shell association, which also resolves .lnk files.
            let mut c = Command::new("cmd.exe");
            c.raw_arg("/d")
                .raw_arg("/c")
                .raw_arg("start")
                .raw_arg(cmd_escape(""));
            if let Some(flag) = start_flag(mode) {
                c.raw_arg(flag);
            }
            c.raw_arg(cmd_escape(path));
            c
        }
    };
    let flags = match mode {
        WindowMode::Minimized => DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP,
        _ => CREATE_NO_WINDOW,
    };
    cmd.creation_flags(flags);
    cmd
}

#[cfg(target_os = "macos")]
fn build_command(path: &str, kind: TargetKind, mode: WindowMode) -> Command {
    match kind {
        TargetKind::Script { interpreter } => {
            let mut c = Command::new(interpreter);
            c.arg(path);
            c
        }
        TargetKind::Executable => Command::new(path),
        TargetKind::Document => {
            let mut c = Command::new("open");
            if mode == WindowMode::Minimized {
                // Background, hidden.
                c.args(["-g", "-j"]);
            }
            c.arg(path);
            c
        }
    }
}

/// Minimized targets get their own process group so closing the launcher's terminal does
/// not take them down.
#[cfg(all(unix, not(target_os = "macos")))]
fn own_process_group(mode: WindowMode) -> bool {
    mode == WindowMode::Minimized
}

#[cfg(all(unix, not(target_os = "macos")))]
fn build_command(path: &str, kind: TargetKind, mode: WindowMode) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = match kind {
        TargetKind::Script { interpreter } => {
            let mut c = Command::new(interpreter);
            c.arg(path);
            c
        }
        TargetKind::Executable => Command::new(path),
        TargetKind::Document => {
            let mut c = Command::new("xdg-open");
            c.arg(path);
            c
        }
    };
    if own_process_group(mode) {
        cmd.process_group(0);
    }
    if mode == WindowMode::Maximized {
        tracing::debug!(path, "window state requests are not portable on this platform");
    }
    cmd
}
