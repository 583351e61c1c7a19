//! Progress reporting from the runner to whoever is watching.
//!
//! Sinks are called from the runner's task, which is never the UI thread. Implementations
//! that feed a UI should hand events off through a channel (see [`ChannelSink`]).

use crate::model::{ProgressEvent, ProgressMode};
use tokio::sync::mpsc;

pub trait ProgressSink: Send + Sync {
    fn notify(&self, text: &str, mode: ProgressMode);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, ProgressMode) + Send + Sync,
{
    fn notify(&self, text: &str, mode: ProgressMode) {
        self(text, mode)
    }
}

/// Forwards progress onto an unbounded channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn notify(&self, text: &str, mode: ProgressMode) {
        let _ = self.tx.send(ProgressEvent {
            text: text.to_string(),
            mode,
        });
    }
}

/// Line buffer that applies overwrite-in-place, capped to the last `cap` lines.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    lines: Vec<String>,
    cap: usize,
    // Whether the last line came from an Overwrite and may be replaced by the next one.
    last_ephemeral: bool,
}

impl ProgressLog {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            lines: Vec::new(),
            cap: cap.max(1),
            last_ephemeral: false,
        }
    }

    pub fn apply(&mut self, ev: &ProgressEvent) {
        match ev.mode {
            ProgressMode::Append => {
                // An empty overwrite is a cleared countdown; drop it rather than leaving a gap.
                if self.last_ephemeral && self.lines.last().is_some_and(|l| l.is_empty()) {
                    self.lines.pop();
                }
                self.lines.push(ev.text.clone());
                self.last_ephemeral = false;
            }
            ProgressMode::Overwrite => {
                if self.last_ephemeral {
                    if let Some(last) = self.lines.last_mut() {
                        *last = ev.text.clone();
                    }
                } else {
                    self.lines.push(ev.text.clone());
                }
                self.last_ephemeral = true;
            }
        }
        if self.lines.len() > self.cap {
            let excess = self.lines.len() - self.cap;
            self.lines.drain(..excess);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.last_ephemeral = false;
    }
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self::with_capacity(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(text: &str, mode: ProgressMode) -> ProgressEvent {
        ProgressEvent {
            text: text.into(),
            mode,
        }
    }

    #[test]
    fn overwrite_replaces_only_ephemeral_lines() {
        let mut log = ProgressLog::default();
        log.apply(&ev("Launching 1/2: a (Normal)...", ProgressMode::Append));
        log.apply(&ev("✓ Launched a", ProgressMode::Append));
        log.apply(&ev("Waiting 2s before next...", ProgressMode::Overwrite));
        log.apply(&ev("Waiting 1s before next...", ProgressMode::Overwrite));
        assert_eq!(
            log.lines(),
            &[
                "Launching 1/2: a (Normal)...".to_string(),
                "✓ Launched a".to_string(),
                "Waiting 1s before next...".to_string(),
            ]
        );
        log.apply(&ev("", ProgressMode::Overwrite));
        log.apply(&ev("Launching 2/2: b (Normal)...", ProgressMode::Append));
        assert_eq!(log.lines().len(), 3);
        assert_eq!(log.lines()[2], "Launching 2/2: b (Normal)...");
    }

    #[test]
    fn caps_history() {
        let mut log = ProgressLog::with_capacity(2);
        for i in 0..5 {
            log.apply(&ev(&i.to_string(), ProgressMode::Append));
        }
        assert_eq!(log.lines(), &["3".to_string(), "4".to_string()]);
    }

    #[test]
    fn closure_and_channel_sinks() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |t: &str, m: ProgressMode| seen.lock().unwrap().push((t.to_string(), m));
        sink.notify("hi", ProgressMode::Append);
        assert_eq!(seen.lock().unwrap().len(), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.notify("tick", ProgressMode::Overwrite);
        let got = rx.try_recv().unwrap();
        assert_eq!(got.mode, ProgressMode::Overwrite);
        drop(rx);
        sink.notify("ignored", ProgressMode::Append);
    }
}
