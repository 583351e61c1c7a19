use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Requested initial visibility of a launched window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WindowMode {
    #[default]
    Normal,
    Maximized,
    Minimized,
}

impl WindowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowMode::Normal => "Normal",
            WindowMode::Maximized => "Maximized",
            WindowMode::Minimized => "Minimized",
        }
    }

    /// Lenient parse used for stored bundles: spellings have drifted over time
    /// ("Not Maximized" is the old name for Normal). Unknown values are Normal.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "maximized" | "max" => WindowMode::Maximized,
            "minimized" | "min" => WindowMode::Minimized,
            _ => WindowMode::Normal,
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for WindowMode {
    fn from(raw: String) -> Self {
        WindowMode::parse_lenient(&raw)
    }
}

impl From<WindowMode> for String {
    fn from(mode: WindowMode) -> Self {
        mode.as_str().to_string()
    }
}

/// One target of a bundle: what to open, how to show it, and how long to wait afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchStep {
    pub path: String,
    /// Seconds to wait after this step before starting the next one.
    #[serde(deserialize_with = "de_delay")]
    pub delay: f64,
    #[serde(rename = "start_option")]
    pub window_mode: WindowMode,
}

impl LaunchStep {
    pub fn new(path: impl Into<String>, delay: f64, window_mode: WindowMode) -> Self {
        Self {
            path: path.into(),
            delay: clamp_delay(delay),
            window_mode,
        }
    }
}

/// A named, ordered list of launch steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchBundle {
    pub name: String,
    #[serde(rename = "paths", alias = "steps", default)]
    pub steps: Vec<LaunchStep>,
}

impl LaunchBundle {
    pub fn new(name: impl Into<String>, steps: Vec<LaunchStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Check the invariants a stored bundle must satisfy. Running does not require this;
    /// an empty bundle runs trivially.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("bundle name is empty".into());
        }
        if !self.steps.iter().any(|s| !s.path.trim().is_empty()) {
            return Err(format!("bundle '{}' has no non-empty path", self.name));
        }
        Ok(())
    }
}

pub(crate) fn clamp_delay(delay: f64) -> f64 {
    if delay.is_finite() && delay > 0.0 {
        delay
    } else {
        0.0
    }
}

/// Delays were historically written both as numbers and as numeric strings.
fn de_delay<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(v) => Ok(clamp_delay(v)),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(clamp_delay)
            .map_err(|_| serde::de::Error::custom(format!("invalid delay: {s:?}"))),
    }
}

/// How a progress line relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressMode {
    /// Add a new line.
    Append,
    /// Replace the most recently emitted line.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub text: String,
    pub mode: ProgressMode,
}

/// Events the controller emits for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LauncherEvent {
    RunStarted {
        bundle: String,
    },
    Progress(ProgressEvent),
    /// UI/CLI messages generated outside the runner.
    Info(String),
    /// The runner refused to start `bundle`; nothing was launched.
    RunRejected {
        bundle: String,
        reason: String,
    },
    RunCompleted {
        // Boxed to keep the enum small; results carry one report per step.
        result: Box<SequenceResult>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Launched,
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// 1-based position in the bundle.
    pub index: usize,
    pub path: String,
    pub window_mode: WindowMode,
    pub outcome: StepOutcome,
}

/// Final account of one bundle run. Every step appears exactly once in `steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceResult {
    pub bundle: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    #[serde(default)]
    pub started_at: String,
    pub elapsed_ms: u64,
    pub steps: Vec<StepReport>,
}

impl SequenceResult {
    pub fn all_launched(&self) -> bool {
        self.succeeded == self.total
    }
}
