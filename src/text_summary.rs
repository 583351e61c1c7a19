//! Text summary builder for CLI and TUI output.

use crate::model::{SequenceResult, StepOutcome};
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// One-line verdict, e.g. `Morning: 3/4 launched, 1 failed`.
pub(crate) fn headline(result: &SequenceResult) -> String {
    let mut line = format!(
        "{}: {}/{} launched",
        result.bundle, result.succeeded, result.total
    );
    if result.failed > 0 {
        line.push_str(&format!(", {} failed", result.failed));
    }
    if result.skipped > 0 {
        line.push_str(&format!(", {} skipped", result.skipped));
    }
    if result.cancelled {
        line.push_str(" (cancelled)");
    }
    line
}

/// Headline, one line per step that did not launch, and the elapsed time.
pub(crate) fn build_text_summary(result: &SequenceResult) -> TextSummary {
    let mut lines = vec![headline(result)];

    for step in &result.steps {
        match &step.outcome {
            StepOutcome::Launched => {}
            StepOutcome::Failed { reason } => {
                lines.push(format!("  #{} {} failed: {reason}", step.index, step.path));
            }
            StepOutcome::Skipped { reason } => {
                lines.push(format!("  #{} {} skipped: {reason}", step.index, step.path));
            }
        }
    }

    // Whole seconds are enough for a run that is mostly countdowns.
    let elapsed = Duration::from_secs(result.elapsed_ms / 1000);
    lines.push(format!(
        "Started {} and took {}",
        result.started_at,
        humantime::format_duration(elapsed)
    ));

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StepReport, WindowMode};

    fn result(outcomes: Vec<StepOutcome>, cancelled: bool) -> SequenceResult {
        let count = |f: fn(&StepOutcome) -> bool| outcomes.iter().filter(|o| f(o)).count();
        SequenceResult {
            bundle: "Morning".into(),
            total: outcomes.len(),
            succeeded: count(|o| matches!(o, StepOutcome::Launched)),
            failed: count(|o| matches!(o, StepOutcome::Failed { .. })),
            skipped: count(|o| matches!(o, StepOutcome::Skipped { .. })),
            cancelled,
            started_at: "2024-01-01T08:00:00Z".into(),
            elapsed_ms: 65_400,
            steps: outcomes
                .iter()
                .enumerate()
                .map(|(i, o)| StepReport {
                    index: i + 1,
                    path: format!("app{}", i + 1),
                    window_mode: WindowMode::Normal,
                    outcome: o.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn headline_mentions_only_nonzero_extras() {
        let r = result(vec![StepOutcome::Launched, StepOutcome::Launched], false);
        assert_eq!(headline(&r), "Morning: 2/2 launched");

        let r = result(
            vec![
                StepOutcome::Launched,
                StepOutcome::Failed {
                    reason: "not found: app2".into(),
                },
                StepOutcome::Launched,
                StepOutcome::Launched,
            ],
            false,
        );
        assert_eq!(headline(&r), "Morning: 3/4 launched, 1 failed");

        let r = result(
            vec![
                StepOutcome::Launched,
                StepOutcome::Skipped {
                    reason: "cancelled".into(),
                },
            ],
            true,
        );
        assert_eq!(headline(&r), "Morning: 1/2 launched, 1 skipped (cancelled)");
    }

    #[test]
    fn summary_lists_problem_steps() {
        let r = result(
            vec![
                StepOutcome::Launched,
                StepOutcome::Failed {
                    reason: "permission denied: app2".into(),
                },
            ],
            false,
        );
        let s = build_text_summary(&r);
        assert_eq!(s.lines.len(), 3);
        assert_eq!(s.lines[1], "  #2 app2 failed: permission denied: app2");
        assert_eq!(s.lines[2], "Started 2024-01-01T08:00:00Z and took 1m 5s");
    }
}
