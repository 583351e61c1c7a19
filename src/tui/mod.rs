mod help;
mod state;

use crate::cli::AppContext;
use crate::model::{LauncherEvent, StepOutcome};
use crate::orchestrator::{self, UiCommand};
use crate::storage::BundleStore;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use state::UiState;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

// Tabs header and status bar, three rows each, plus the list's own border.
const CHROME_ROWS: u16 = 3 + 3 + 2;

pub async fn run(ctx: AppContext) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<LauncherEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let runner = Arc::new(ctx.runner());
    let ui_store = ctx.store.clone();
    let app_dir = ctx.dir.display().to_string();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_store, app_dir, event_rx, cmd_tx));

    let res = orchestrator::run_controller(runner, ctx.store, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    store: BundleStore,
    app_dir: String,
    mut event_rx: UnboundedReceiver<LauncherEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::with_bundles(store.load());
    if state.bundles.is_empty() {
        state.info = format!("No bundles yet in {}", store.path().display());
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            state.apply_event(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state, &app_dir)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % 2;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = 1;
                    }
                    (_, KeyCode::Enter) | (_, KeyCode::Char('r')) => {
                        if let Some(name) = state.selected_name() {
                            let _ = cmd_tx.send(UiCommand::Run(name.to_string()));
                        } else {
                            state.info = "Nothing to launch".into();
                        }
                    }
                    (_, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Cancel);
                    }
                    (_, KeyCode::Char('l')) => {
                        state.set_bundles(store.load());
                        state.info = format!("Reloaded {} bundle(s)", state.bundles.len());
                    }
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                        state.select_prev();
                    }
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                        let rows = terminal
                            .size()
                            .map(|s| s.height.saturating_sub(CHROME_ROWS) as usize)
                            .unwrap_or(10);
                        state.select_next(rows);
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, app_dir: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Bundles"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("app-launcher"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_bundles(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f, app_dir),
    }
    draw_status(chunks[2], f, state);
}

fn draw_bundles(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    let visible = (cols[0].height as usize).saturating_sub(2);
    let list: Vec<Line> = state
        .bundles
        .iter()
        .enumerate()
        .skip(state.scroll_offset)
        .take(visible)
        .map(|(i, b)| {
            let marker = if state.running.as_deref() == Some(b.name.as_str()) {
                "▶ "
            } else {
                "  "
            };
            let text = format!("{marker}{} ({})", b.name, b.steps.len());
            if i == state.selected {
                Line::from(Span::styled(text, Style::default().fg(Color::Yellow)))
            } else {
                Line::from(text)
            }
        })
        .collect();
    let title = format!("Bundles ({})", state.bundles.len());
    f.render_widget(
        Paragraph::new(list).block(Block::default().borders(Borders::ALL).title(title)),
        cols[0],
    );

    let step_rows = state
        .selected_bundle()
        .map(|b| b.steps.len() as u16)
        .unwrap_or(0)
        .min(cols[1].height / 2)
        .max(1)
        + 2;
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(step_rows), Constraint::Min(0)])
        .split(cols[1]);

    draw_steps(right[0], f, state);
    draw_log(right[1], f, state);
}

fn draw_steps(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(b) = state.selected_bundle() {
        // Outcomes from the last run of this bundle, if any.
        let outcomes = state
            .last_result
            .as_ref()
            .filter(|r| r.bundle == b.name)
            .map(|r| &r.steps);
        for (i, s) in b.steps.iter().enumerate() {
            let badge = match outcomes.and_then(|o| o.get(i)).map(|r| &r.outcome) {
                Some(StepOutcome::Launched) => Span::styled("✓ ", Style::default().fg(Color::Green)),
                Some(StepOutcome::Failed { .. }) => {
                    Span::styled("✗ ", Style::default().fg(Color::Red))
                }
                Some(StepOutcome::Skipped { .. }) => {
                    Span::styled("- ", Style::default().fg(Color::Yellow))
                }
                None => Span::raw("  "),
            };
            lines.push(Line::from(vec![
                badge,
                Span::raw(format!("{}. {}", i + 1, s.path)),
                Span::styled(
                    format!("  [{}] +{}s", s.window_mode, s.delay),
                    Style::default().fg(Color::Gray),
                ),
            ]));
        }
    } else {
        lines.push(Line::from(Span::styled(
            "Add one with: app-launcher --add NAME PATH",
            Style::default().fg(Color::Gray),
        )));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Steps")),
        area,
    );
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = (area.height as usize).saturating_sub(2);
    let all = state.log.lines();
    let lines: Vec<Line> = all[all.len().saturating_sub(rows)..]
        .iter()
        .map(|l| {
            let color = if l.starts_with('✓') {
                Color::Green
            } else if l.starts_with('✗') {
                Color::Red
            } else if l.starts_with("Skipped") || l == "Cancelled." {
                Color::Yellow
            } else if l.starts_with("Waiting") {
                Color::Gray
            } else {
                Color::Reset
            };
            Line::from(Span::styled(l.clone(), Style::default().fg(color)))
        })
        .collect();
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Progress")),
        area,
    );
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let (label, color) = if state.running.is_some() {
        ("Running", Color::Cyan)
    } else {
        match &state.last_result {
            Some(r) if r.failed > 0 => ("Failed", Color::Red),
            Some(r) if r.cancelled => ("Cancelled", Color::Yellow),
            Some(r) if r.all_launched() => ("Done", Color::Green),
            Some(_) => ("Partial", Color::Yellow),
            None => ("Idle", Color::Gray),
        }
    };
    let p = Paragraph::new(Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(color)),
        Span::raw(state.info.clone()),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}
