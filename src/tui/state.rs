use crate::engine::ProgressLog;
use crate::model::{LaunchBundle, LauncherEvent, SequenceResult};
use crate::text_summary;

pub struct UiState {
    pub tab: usize,
    pub info: String,

    pub bundles: Vec<LaunchBundle>,
    pub selected: usize, // Index into `bundles`
    pub scroll_offset: usize,

    /// Name of the bundle currently being launched.
    pub running: Option<String>,
    pub log: ProgressLog,
    pub last_result: Option<SequenceResult>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            info: String::new(),
            bundles: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            running: None,
            log: ProgressLog::default(),
            last_result: None,
        }
    }
}

impl UiState {
    pub fn with_bundles(bundles: Vec<LaunchBundle>) -> Self {
        let mut state = Self::default();
        state.set_bundles(bundles);
        state
    }

    /// Replace the list, keeping the selection on the same name when it still exists.
    pub fn set_bundles(&mut self, bundles: Vec<LaunchBundle>) {
        let keep = self.selected_name().map(str::to_string);
        self.bundles = bundles;
        self.selected = keep
            .and_then(|name| self.bundles.iter().position(|b| b.name == name))
            .unwrap_or(0);
        if self.scroll_offset > self.selected {
            self.scroll_offset = self.selected;
        }
    }

    pub fn selected_bundle(&self) -> Option<&LaunchBundle> {
        self.bundles.get(self.selected)
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected_bundle().map(|b| b.name.as_str())
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        }
    }

    pub fn select_next(&mut self, visible_rows: usize) {
        if self.selected + 1 < self.bundles.len() {
            self.selected += 1;
        }
        let visible_rows = visible_rows.max(1);
        if self.selected >= self.scroll_offset + visible_rows {
            self.scroll_offset = self.selected + 1 - visible_rows;
        }
    }

    pub fn apply_event(&mut self, ev: LauncherEvent) {
        match ev {
            LauncherEvent::RunStarted { bundle } => {
                self.log.clear();
                self.last_result = None;
                self.info = format!("Running {bundle}…");
                self.running = Some(bundle);
            }
            LauncherEvent::Progress(p) => self.log.apply(&p),
            LauncherEvent::Info(msg) => self.info = msg,
            LauncherEvent::RunRejected { bundle, reason } => {
                if self.running.as_deref() == Some(bundle.as_str()) {
                    self.running = None;
                }
                self.info = format!("Cannot start {bundle}: {reason}");
            }
            LauncherEvent::RunCompleted { result } => {
                self.running = None;
                self.info = text_summary::headline(&result);
                self.last_result = Some(*result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LaunchStep, ProgressEvent, ProgressMode, WindowMode};

    fn bundle(name: &str) -> LaunchBundle {
        LaunchBundle::new(name, vec![LaunchStep::new("a", 0.0, WindowMode::Normal)])
    }

    fn progress(text: &str, mode: ProgressMode) -> LauncherEvent {
        LauncherEvent::Progress(ProgressEvent {
            text: text.into(),
            mode,
        })
    }

    #[test]
    fn selection_survives_reload() {
        let mut s = UiState::with_bundles(vec![bundle("a"), bundle("b"), bundle("c")]);
        s.select_next(10);
        s.select_next(10);
        assert_eq!(s.selected_name(), Some("c"));
        s.set_bundles(vec![bundle("c"), bundle("d")]);
        assert_eq!(s.selected_name(), Some("c"));
        s.set_bundles(vec![bundle("x")]);
        assert_eq!(s.selected, 0);
    }

    #[test]
    fn selection_scrolls_with_visible_window() {
        let mut s = UiState::with_bundles((0..5).map(|i| bundle(&i.to_string())).collect());
        for _ in 0..4 {
            s.select_next(2);
        }
        assert_eq!(s.selected, 4);
        assert_eq!(s.scroll_offset, 3);
        s.select_next(2);
        assert_eq!(s.selected, 4);
        for _ in 0..4 {
            s.select_prev();
        }
        assert_eq!((s.selected, s.scroll_offset), (0, 0));
    }

    #[test]
    fn run_events_drive_log_and_status() {
        let mut s = UiState::default();
        s.apply_event(LauncherEvent::RunStarted {
            bundle: "Morning".into(),
        });
        assert_eq!(s.running.as_deref(), Some("Morning"));
        s.apply_event(progress("Launching 1/1: a (Normal)...", ProgressMode::Append));
        s.apply_event(progress("Waiting 2s before next...", ProgressMode::Overwrite));
        s.apply_event(progress("Waiting 1s before next...", ProgressMode::Overwrite));
        s.apply_event(progress("", ProgressMode::Overwrite));
        s.apply_event(progress("Done.", ProgressMode::Append));
        assert_eq!(s.log.lines(), ["Launching 1/1: a (Normal)...", "Done."]);

        s.apply_event(LauncherEvent::RunCompleted {
            result: Box::new(SequenceResult {
                bundle: "Morning".into(),
                total: 1,
                succeeded: 1,
                failed: 0,
                skipped: 0,
                cancelled: false,
                started_at: String::new(),
                elapsed_ms: 2000,
                steps: Vec::new(),
            }),
        });
        assert!(s.running.is_none());
        assert_eq!(s.info, "Morning: 1/1 launched");
        assert!(s.last_result.is_some());
    }

    #[test]
    fn rejected_run_clears_running_state() {
        let mut s = UiState::default();
        s.apply_event(LauncherEvent::RunStarted {
            bundle: "Morning".into(),
        });
        s.apply_event(LauncherEvent::RunRejected {
            bundle: "Morning".into(),
            reason: "a launch sequence is already running".into(),
        });
        assert!(s.running.is_none());
        assert_eq!(
            s.info,
            "Cannot start Morning: a launch sequence is already running"
        );
    }
}
