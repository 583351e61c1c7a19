//! Turn a step path as authored into something the launcher can hand to the OS.

use super::launcher::LaunchError;
use std::path::{Component, Path, PathBuf};

/// Trim, strip one level of quotes, expand `~` and environment variables, and clean up
/// the path components. URLs are only trimmed and unquoted.
pub fn normalize_path(raw: &str) -> Result<String, LaunchError> {
    let unquoted = strip_quotes(raw.trim()).trim();
    if unquoted.is_empty() {
        return Err(LaunchError::InvalidPath {
            path: raw.to_string(),
            reason: "empty path".into(),
        });
    }
    if is_url(unquoted) {
        return Ok(unquoted.to_string());
    }

    let expanded = expand_env(&expand_home(unquoted));
    let cleaned = clean_components(&expanded);
    if cleaned.is_empty() {
        return Err(LaunchError::InvalidPath {
            path: raw.to_string(),
            reason: "empty after expansion".into(),
        });
    }
    Ok(cleaned)
}

/// `scheme://...` or `mailto:` style targets. Windows drive letters (`C:\`) are not URLs.
pub fn is_url(s: &str) -> bool {
    match s.split_once(':') {
        Some((scheme, rest)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && (rest.starts_with("//") || scheme.eq_ignore_ascii_case("mailto"))
        }
        None => false,
    }
}

fn strip_quotes(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    // Half-quoted input ("C:\Program Files\x.exe) is common when pasting.
    s.trim_matches(|c| c == '"' || c == '\'')
}

fn expand_home(s: &str) -> String {
    let rest = if s == "~" {
        Some("")
    } else {
        s.strip_prefix("~/").or_else(|| s.strip_prefix("~\\"))
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home.to_string_lossy().into_owned(),
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ => s.to_string(),
    }
}

/// Expand `$VAR`, `${VAR}` and `%VAR%`. Undefined variables are left as written.
pub(crate) fn expand_env(s: &str) -> String {
    expand_env_with(s, |name| std::env::var(name).ok())
}

fn expand_env_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '%' => {
                if let Some(end) = chars[i + 1..].iter().position(|&c| c == '%') {
                    let name: String = chars[i + 1..i + 1 + end].iter().collect();
                    if is_var_name(&name) {
                        if let Some(v) = lookup(&name) {
                            out.push_str(&v);
                            i += end + 2;
                            continue;
                        }
                    }
                }
                out.push('%');
                i += 1;
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    if let Some(v) = is_var_name(&name).then(|| lookup(&name)).flatten() {
                        out.push_str(&v);
                        i += end + 3;
                        continue;
                    }
                }
                out.push('$');
                i += 1;
            }
            '$' => {
                let len = chars[i + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
                    .count();
                let name: String = chars[i + 1..i + 1 + len].iter().collect();
                match (len > 0).then(|| lookup(&name)).flatten() {
                    Some(v) => {
                        out.push_str(&v);
                        i += len + 1;
                    }
                    None => {
                        out.push('$');
                        i += 1;
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '(' | ')'))
}

fn clean_components(s: &str) -> String {
    let path = Path::new(s);
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() && !s.is_empty() {
        // A path made only of `.` components still means the current directory.
        return ".".into();
    }
    out.to_string_lossy().into_owned()
}
