use crate::engine::{ChannelSink, RunnerOptions, SequenceRunner, SystemLauncher};
use crate::logging::{self, LogOptions};
use crate::model::{LaunchBundle, LaunchStep, ProgressEvent, ProgressMode, WindowMode};
use crate::settings::{self, Settings};
use crate::storage::{BundleStore, ImportMode};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
    /// Replace the current stderr line (countdowns).
    StderrOverwrite(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let err_is_tty = stderr.is_terminal();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());
        // An overwrite line is on screen without a trailing newline.
        let mut open_line = false;

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    if open_line {
                        let _ = writeln!(err);
                        open_line = false;
                    }
                    let _ = writeln!(err, "{}", msg);
                }
                OutputLine::StderrOverwrite(msg) if err_is_tty => {
                    let _ = write!(err, "\r{}\x1b[K", msg);
                    let _ = err.flush();
                    open_line = !msg.is_empty();
                }
                OutputLine::StderrOverwrite(msg) => {
                    // Piped output keeps each tick as its own line; the clear carries no text.
                    if !msg.is_empty() {
                        let _ = writeln!(err, "{}", msg);
                    }
                }
            }
        }

        if open_line {
            let _ = writeln!(err);
        }
        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "app-launcher",
    version,
    about = "Run named launch bundles with delays and window modes, with an optional TUI"
)]
pub struct Cli {
    /// Run the named bundle once without the TUI, then exit
    #[arg(long, value_name = "NAME")]
    pub launch: Option<String>,

    /// Print JSON output and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run silently: suppress all output except errors (for scripted usage)
    #[arg(long)]
    pub silent: bool,

    /// List stored bundles and exit
    #[arg(long)]
    pub list: bool,

    /// Append a step to a bundle, creating the bundle if needed
    #[arg(long, num_args = 2, value_names = ["NAME", "PATH"])]
    pub add: Option<Vec<String>>,

    /// Seconds to wait after the added step (defaults to the settings value)
    #[arg(long, requires = "add")]
    pub delay: Option<f64>,

    /// Window mode for the added step: normal, maximized or minimized
    #[arg(long, requires = "add")]
    pub mode: Option<String>,

    /// Delete the named bundle
    #[arg(long, value_name = "NAME")]
    pub delete: Option<String>,

    /// Import bundles from a JSON file (merges by name unless --replace)
    #[arg(long, value_name = "FILE")]
    pub import: Option<PathBuf>,

    /// With --import, replace all stored bundles
    #[arg(long, requires = "import")]
    pub replace: bool,

    /// Export all bundles to a JSON file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Skip steps whose program is already running (overrides the settings file)
    #[arg(long, action = clap::ArgAction::Set)]
    pub skip_running: Option<bool>,

    /// Directory holding bundles, settings and the log file
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Do not write log.txt even if debug logging is enabled
    #[arg(long)]
    pub no_log_file: bool,
}

impl Cli {
    fn has_action(&self) -> bool {
        self.launch.is_some()
            || self.list
            || self.add.is_some()
            || self.delete.is_some()
            || self.import.is_some()
            || self.export.is_some()
    }

    /// No action and no output format requested.
    fn is_interactive(&self) -> bool {
        !self.has_action() && !self.json && !self.text
    }
}

/// Everything a front end needs after startup.
pub struct AppContext {
    pub dir: PathBuf,
    pub settings: Settings,
    pub store: BundleStore,
}

impl AppContext {
    /// Resolve the app directory and make sure it holds settings and a bundle list.
    fn open(args: &Cli) -> Result<Self> {
        let dir = settings::app_dir(args.config_dir.as_deref())?;
        let mut settings = Settings::load(&dir)?;
        if !dir.join(settings::SETTINGS_FILE_NAME).exists() {
            settings.save(&dir).context("write default settings")?;
        }
        if let Some(skip) = args.skip_running {
            settings.skip_if_running = skip;
        }
        let store = BundleStore::new(&dir, settings.clone());
        store.ensure_initialized()?;
        Ok(Self {
            dir,
            settings,
            store,
        })
    }

    pub fn runner(&self) -> SequenceRunner {
        SequenceRunner::new(Arc::new(SystemLauncher::new())).with_options(RunnerOptions {
            skip_if_running: self.settings.skip_if_running,
            ..Default::default()
        })
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    let ctx = AppContext::open(&args)?;
    let interactive = args.is_interactive() && cfg!(feature = "tui");
    let file_dir = (ctx.settings.debug_logging && !args.no_log_file).then_some(ctx.dir.as_path());
    let _log_guard = logging::init(LogOptions {
        stderr: !interactive,
        file_dir,
        max_file_bytes: ctx.settings.log_max_bytes,
    })?;
    tracing::debug!(dir = %ctx.dir.display(), "app directory");

    if let Some(file) = args.import.as_deref() {
        let mode = if args.replace {
            ImportMode::Replace
        } else {
            ImportMode::Merge
        };
        let report = ctx.store.import(file, mode)?;
        println!(
            "Imported {} bundle(s) from {} ({} ignored, {} total)",
            report.added,
            file.display(),
            report.ignored,
            report.total
        );
    }
    if let Some(add) = args.add.as_deref() {
        add_step(&args, &ctx, add)?;
    }
    if let Some(name) = args.delete.as_deref() {
        if ctx.store.delete(name)? {
            println!("Deleted {name}");
        } else {
            return Err(anyhow::anyhow!("No launch bundle named {name:?}"));
        }
    }
    if let Some(file) = args.export.as_deref() {
        let n = ctx.store.export(file)?;
        println!("Exported {n} bundle(s) to {}", file.display());
    }
    // --json/--text on their own print the bundle list.
    if args.list || (!args.has_action() && (args.json || args.text)) {
        list_bundles(&args, &ctx)?;
    }
    if let Some(name) = args.launch.as_deref() {
        return run_launch(&args, &ctx, name).await;
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(ctx).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return list_bundles(&args, &ctx);
        }
    }
    Ok(())
}

fn add_step(args: &Cli, ctx: &AppContext, add: &[String]) -> Result<()> {
    let [name, path] = add else {
        return Err(anyhow::anyhow!("--add expects NAME and PATH"));
    };
    let step = LaunchStep::new(
        path.clone(),
        args.delay.unwrap_or(ctx.settings.default_delay),
        args.mode
            .as_deref()
            .map(WindowMode::parse_lenient)
            .unwrap_or(ctx.settings.default_window_state),
    );
    let mut bundle = ctx
        .store
        .find(name)
        .unwrap_or_else(|| LaunchBundle::new(name.clone(), Vec::new()));
    bundle.steps.push(step);
    let n = bundle.steps.len();
    bundle
        .validate()
        .map_err(|reason| anyhow::anyhow!("refusing to save bundle: {reason}"))?;
    ctx.store.upsert(bundle)?;
    println!("Added step {n} to {name}");
    Ok(())
}

fn list_bundles(args: &Cli, ctx: &AppContext) -> Result<()> {
    let bundles = ctx.store.load();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundles)?);
        return Ok(());
    }
    if bundles.is_empty() {
        println!("No launch bundles in {}", ctx.store.path().display());
        return Ok(());
    }
    for b in &bundles {
        println!("{} ({} step{})", b.name, b.steps.len(), if b.steps.len() == 1 { "" } else { "s" });
        for (i, s) in b.steps.iter().enumerate() {
            println!("  {}. {} [{}] then wait {}s", i + 1, s.path, s.window_mode, s.delay);
        }
    }
    Ok(())
}

/// Headless run of one stored bundle. Progress goes to stderr, the result to stdout.
async fn run_launch(args: &Cli, ctx: &AppContext, name: &str) -> Result<()> {
    let bundle = ctx
        .store
        .find(name)
        .with_context(|| format!("No launch bundle named {name:?}"))?;
    let runner = Arc::new(ctx.runner());

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let cancel = CancellationToken::new();

    let handle = {
        let runner = runner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            runner
                .run_with_cancel(&bundle, &ChannelSink::new(evt_tx), cancel)
                .await
        })
    };

    let mut interrupted = false;
    loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else { break };
                if args.silent {
                    continue;
                }
                let line = match ev.mode {
                    ProgressMode::Append => OutputLine::Stderr(ev.text),
                    ProgressMode::Overwrite => OutputLine::StderrOverwrite(ev.text),
                };
                let _ = out_tx.send(line);
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                cancel.cancel();
                if !args.silent {
                    let _ = out_tx.send(OutputLine::Stderr("Interrupted, cancelling…".into()));
                }
            }
        }
    }

    let result = handle
        .await
        .context("launch task failed")?
        .context("launch rejected")?;
    tracing::debug!(
        bundle = %result.bundle,
        all_launched = result.all_launched(),
        elapsed_ms = result.elapsed_ms,
        "headless run finished"
    );

    if args.json {
        let out = serde_json::to_string_pretty(&result)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else if !args.silent {
        for line in crate::text_summary::build_text_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    if result.failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} step(s) failed to launch",
            result.failed,
            result.total
        ));
    }
    Ok(())
}
