//! Run lifecycle controller.
//!
//! Owns start/cancel orchestration and emits events for presentation layers.

use crate::engine::{RunError, SequenceRunner};
use crate::model::{LaunchBundle, LauncherEvent, ProgressEvent, ProgressMode, SequenceResult};
use crate::storage::BundleStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Run the stored bundle with this name.
    Run(String),
    Cancel,
    Quit,
}

/// Internal handle for a running sequence.
struct RunCtx {
    bundle: String,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<Result<SequenceResult, RunError>>,
}

/// Spawn a run of `bundle` and forward its progress as events.
fn start_run(
    runner: &Arc<SequenceRunner>,
    bundle: LaunchBundle,
    event_tx: &UnboundedSender<LauncherEvent>,
) -> RunCtx {
    let cancel = CancellationToken::new();
    let name = bundle.name.clone();
    let _ = event_tx.send(LauncherEvent::RunStarted {
        bundle: name.clone(),
    });

    // Progress shares the event channel so it stays ordered before RunCompleted/RunRejected.
    let progress_tx = event_tx.clone();
    let runner = runner.clone();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let sink = move |text: &str, mode: ProgressMode| {
            let _ = progress_tx.send(LauncherEvent::Progress(ProgressEvent {
                text: text.to_string(),
                mode,
            }));
        };
        runner.run_with_cancel(&bundle, &sink, token).await
    });
    RunCtx {
        bundle: name,
        cancel,
        handle,
    }
}

/// Drive bundle runs from UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller(
    runner: Arc<SequenceRunner>,
    store: BundleStore,
    event_tx: UnboundedSender<LauncherEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx: Option<RunCtx> = None;
    let mut quit_pending = false;
    // Cancellation only interrupts countdowns; keep the user informed if a launch is slow.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Run(name)) => {
                        let Some(bundle) = store.find(&name) else {
                            let _ = event_tx.send(LauncherEvent::Info(format!(
                                "No launch bundle named {name:?}"
                            )));
                            continue;
                        };
                        if run_ctx.is_some() {
                            let _ = event_tx.send(LauncherEvent::Info(format!(
                                "Cannot start {}: {}", bundle.name, RunError::AlreadyRunning
                            )));
                            continue;
                        }
                        run_ctx = Some(start_run(&runner, bundle, &event_tx));
                    }
                    Some(UiCommand::Cancel) => {
                        if let Some(ctx) = &run_ctx {
                            ctx.cancel.cancel();
                            let _ = event_tx.send(LauncherEvent::Info("Cancelling…".into()));
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(3));
                        } else {
                            let _ = event_tx.send(LauncherEvent::Info("Nothing to cancel".into()));
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit cancels the countdown and waits for the run to wind down.
                        quit_pending = true;
                        if let Some(ctx) = &run_ctx {
                            ctx.cancel.cancel();
                        } else {
                            break Ok(());
                        }
                    }
                }
            }
            // Poll the JoinHandle by reference; the context is only taken once this branch
            // wins, so another branch being chosen never loses the completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    return Some((&mut ctx.handle).await);
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let bundle = run_ctx.take().map(|ctx| ctx.bundle).unwrap_or_default();
                    match join_res {
                        Ok(Ok(r)) => {
                            let _ = event_tx.send(LauncherEvent::RunCompleted { result: Box::new(r) });
                        }
                        Ok(Err(e)) => {
                            let _ = event_tx.send(LauncherEvent::RunRejected {
                                bundle,
                                reason: e.to_string(),
                            });
                        }
                        Err(e) => {
                            let _ = event_tx.send(LauncherEvent::RunRejected {
                                bundle,
                                reason: format!("run task failed: {e}"),
                            });
                        }
                    }
                    cancel_deadline = None;
                    if quit_pending {
                        break Ok(());
                    }
                }
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline && run_ctx.is_some() {
                        let _ = event_tx.send(LauncherEvent::Info(
                            "Still cancelling…".into(),
                        ));
                        cancel_deadline = None;
                    }
                }
            }
        }
    };

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LaunchOutcome, ProcessLauncher};
    use crate::model::{LaunchStep, WindowMode};
    use crate::settings::Settings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct NoopLauncher {
        launches: AtomicUsize,
    }

    impl ProcessLauncher for NoopLauncher {
        fn launch(&self, _path: &str, _mode: WindowMode) -> LaunchOutcome {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup(bundles: &[LaunchBundle]) -> (tempfile::TempDir, BundleStore, Arc<SequenceRunner>) {
        let (dir, store, runner, _) = setup_counting(bundles);
        (dir, store, runner)
    }

    fn setup_counting(
        bundles: &[LaunchBundle],
    ) -> (tempfile::TempDir, BundleStore, Arc<SequenceRunner>, Arc<NoopLauncher>) {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::new(dir.path(), Settings::default());
        store.save(bundles).unwrap();
        let launcher = Arc::new(NoopLauncher::default());
        let runner = Arc::new(SequenceRunner::new(launcher.clone()));
        (dir, store, runner, launcher)
    }

    async fn next_matching(
        rx: &mut UnboundedReceiver<LauncherEvent>,
        pred: impl Fn(&LauncherEvent) -> bool,
    ) -> LauncherEvent {
        loop {
            let ev = rx.recv().await.expect("event stream ended");
            if pred(&ev) {
                return ev;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_bundle_and_reports_completion() {
        let bundle = LaunchBundle::new(
            "dev",
            vec![
                LaunchStep::new("editor", 1.0, WindowMode::Normal),
                LaunchStep::new("term", 0.0, WindowMode::Normal),
            ],
        );
        let (_dir, store, runner) = setup(&[bundle]);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(runner.clone(), store, event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Run("dev".into())).unwrap();
        let done = next_matching(&mut event_rx, |e| {
            matches!(e, LauncherEvent::RunCompleted { .. })
        })
        .await;
        match done {
            LauncherEvent::RunCompleted { result } => assert_eq!(result.succeeded, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!runner.is_running());

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_request_is_rejected_and_cancel_stops_first() {
        let slow = LaunchBundle::new(
            "slow",
            vec![
                LaunchStep::new("a", 60.0, WindowMode::Normal),
                LaunchStep::new("b", 0.0, WindowMode::Normal),
            ],
        );
        let (_dir, store, runner) = setup(&[slow]);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(runner.clone(), store, event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Run("slow".into())).unwrap();
        next_matching(&mut event_rx, |e| {
            matches!(e, LauncherEvent::Progress(p) if p.text.starts_with("Waiting"))
        })
        .await;

        cmd_tx.send(UiCommand::Run("slow".into())).unwrap();
        let info = next_matching(&mut event_rx, |e| matches!(e, LauncherEvent::Info(_))).await;
        match info {
            LauncherEvent::Info(msg) => assert!(msg.contains("already running"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }

        cmd_tx.send(UiCommand::Cancel).unwrap();
        let done = next_matching(&mut event_rx, |e| {
            matches!(e, LauncherEvent::RunCompleted { .. })
        })
        .await;
        match done {
            LauncherEvent::RunCompleted { result } => {
                assert!(result.cancelled);
                assert_eq!(result.skipped, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn unknown_bundle_is_reported() {
        let (_dir, store, runner) = setup(&[]);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(runner, store, event_tx, cmd_rx));
        cmd_tx.send(UiCommand::Run("ghost".into())).unwrap();
        match event_rx.recv().await.unwrap() {
            LauncherEvent::Info(msg) => assert!(msg.contains("ghost")),
            other => panic!("unexpected {other:?}"),
        }
        drop(cmd_tx);
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_run_requests_start_exactly_one_run() {
        let bundle = LaunchBundle::new(
            "pair",
            vec![
                LaunchStep::new("a", 1.0, WindowMode::Normal),
                LaunchStep::new("b", 0.0, WindowMode::Normal),
            ],
        );
        let (_dir, store, runner, launcher) = setup_counting(&[bundle]);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        // Both requests are queued before the controller sees either.
        cmd_tx.send(UiCommand::Run("pair".into())).unwrap();
        cmd_tx.send(UiCommand::Run("pair".into())).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();

        run_controller(runner.clone(), store, event_tx, cmd_rx)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = event_rx.try_recv() {
            events.push(ev);
        }
        let started = events
            .iter()
            .filter(|e| matches!(e, LauncherEvent::RunStarted { .. }))
            .count();
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                LauncherEvent::RunCompleted { result } => Some(result),
                _ => None,
            })
            .collect();
        assert_eq!(started, 1);
        assert_eq!(completed.len(), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, LauncherEvent::RunRejected { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            LauncherEvent::Info(msg) if msg == "Cannot start pair: a launch sequence is already running"
        )));
        // Quit cancelled the countdown after the first step.
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert!(completed[0].cancelled);
        assert!(!runner.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn run_refused_by_busy_runner_is_reported_as_rejected() {
        let bundle = LaunchBundle::new(
            "busy",
            vec![
                LaunchStep::new("a", 30.0, WindowMode::Normal),
                LaunchStep::new("b", 0.0, WindowMode::Normal),
            ],
        );
        let (_dir, store, runner, _) = setup_counting(&[bundle.clone()]);

        // Someone else holds the runner before the controller asks for it.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outside = {
            let runner = runner.clone();
            tokio::spawn(async move {
                runner
                    .run(&bundle, &crate::engine::ChannelSink::new(tx))
                    .await
            })
        };
        while !rx.recv().await.unwrap().text.starts_with("Waiting") {}

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(runner.clone(), store, event_tx, cmd_rx));
        cmd_tx.send(UiCommand::Run("busy".into())).unwrap();

        let rejected = next_matching(&mut event_rx, |e| {
            matches!(e, LauncherEvent::RunRejected { .. })
        })
        .await;
        match rejected {
            LauncherEvent::RunRejected { bundle, reason } => {
                assert_eq!(bundle, "busy");
                assert!(reason.contains("already running"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }

        // The controller is free again: Cancel reports there is nothing to cancel.
        cmd_tx.send(UiCommand::Cancel).unwrap();
        match next_matching(&mut event_rx, |e| matches!(e, LauncherEvent::Info(_))).await {
            LauncherEvent::Info(msg) => assert_eq!(msg, "Nothing to cancel"),
            other => panic!("unexpected {other:?}"),
        }
        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
        assert_eq!(outside.await.unwrap().unwrap().succeeded, 2);
    }
}
