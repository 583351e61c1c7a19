//! Best-effort check for an already-running instance of a target.

use std::path::Path;
#[cfg(not(target_os = "linux"))]
use std::process::Command;

/// Process name a target is expected to run as: the lowercase file stem. A batch file is
/// assumed to start an executable with the same stem.
pub(crate) fn expected_process_name(path: &str) -> Option<String> {
    // Split on both separators so Windows paths resolve the same on every host.
    let last = path.trim_end_matches(['/', '\\']).rsplit(['/', '\\']).next()?;
    let stem = Path::new(last)
        .file_stem()?
        .to_string_lossy()
        .to_ascii_lowercase();
    (!stem.is_empty()).then_some(stem)
}

pub(crate) fn is_process_running(path: &str) -> bool {
    let Some(target) = expected_process_name(path) else {
        return false;
    };
    let names = match running_process_names() {
        Ok(names) => names,
        Err(e) => {
            tracing::debug!(error = %e, "process listing failed");
            return false;
        }
    };
    names.iter().any(|n| matches_name(n, &target))
}

fn matches_name(process: &str, target: &str) -> bool {
    let process = process.trim().to_ascii_lowercase();
    let process = process.strip_suffix(".exe").unwrap_or(&process);
    process == target
}

#[cfg(target_os = "linux")]
fn running_process_names() -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let Ok(entry) = entry else { continue };
        let file_name = entry.file_name();
        if !file_name.to_string_lossy().bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        // comm is truncated to 15 bytes, so also look at the exe link when readable.
        if let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) {
            names.push(comm.trim().to_string());
        }
        if let Ok(exe) = std::fs::read_link(entry.path().join("exe")) {
            if let Some(stem) = exe.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
    }
    Ok(names)
}

#[cfg(windows)]
fn running_process_names() -> std::io::Result<Vec<String>> {
    let out = Command::new("tasklist").args(["/FO", "CSV", "/NH"]).output()?;
    let text = String::from_utf8_lossy(&out.stdout);
    Ok(text
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(|first| first.trim_matches('"').to_string())
        .collect())
}

#[cfg(all(not(windows), not(target_os = "linux")))]
fn running_process_names() -> std::io::Result<Vec<String>> {
    let out = Command::new("ps").args(["-axco", "comm"]).output()?;
    let text = String::from_utf8_lossy(&out.stdout);
    Ok(text.lines().skip(1).map(|l| l.trim().to_string()).collect())
}
