mod export;
mod help;
mod jobs;
mod state;

use crate::cli::{self, Cli};
use crate::engine::canvas::{UNITS_PER_COL, UNITS_PER_ROW};
use crate::engine::{Canvas, EngineModule, Glyph};
use crate::model::{
    BatchEvent, BatchJobConfig, Direction as Heading, PanSource, SessionPhase, Viewport,
};
use crate::orchestrator::{self, BatchCommand, BatchOrchestrator};
use crate::session::{self, SessionCommand, SessionController, SessionEvent, SessionSettings};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use export::{copy_to_clipboard, save_delivery, save_snapshot};
use help::draw_help;
use jobs::draw_jobs;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use state::{push_wrapped_status_kv, UiState, SLIDER_STEP};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::info;

/// Rows scrolled per wheel notch.
const WHEEL_ROWS: f64 = 3.0;

/// Everything the UI thread needs to turn input into commands.
struct Channels {
    session_tx: UnboundedSender<SessionCommand>,
    batch_tx: UnboundedSender<BatchCommand>,
    session_rx: UnboundedReceiver<SessionEvent>,
    batch_rx: UnboundedReceiver<BatchEvent>,
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = cli::build_config(&args);
    let batch_configs = cli::load_batch_configs(&args)?;
    let module: Arc<dyn EngineModule> = Arc::new(cli::build_module(&cfg));

    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (session_evt_tx, session_evt_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (session_cmd_tx, session_cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();
    let (batch_evt_tx, batch_evt_rx) = mpsc::unbounded_channel::<BatchEvent>();
    let (batch_cmd_tx, batch_cmd_rx) = mpsc::unbounded_channel::<BatchCommand>();

    let (cols, rows) = crossterm::terminal::size().context("read terminal size")?;
    let settings = SessionSettings {
        viewport: canvas_viewport(Rect::new(0, 0, cols, rows)),
        camera: cli::initial_camera(&args)?,
        step_slider: cfg.step_slider,
        frame_interval: cfg.frame_interval,
    };
    let controller = SessionController::new(module.as_ref(), settings, session_evt_tx)
        .context("failed to start simulation")?;
    // The terminal we were launched from is assumed to have focus.
    let orch = BatchOrchestrator::new(module, true, cfg.settle_delay, batch_evt_tx);

    let state = UiState {
        step_slider: cfg.step_slider,
        food_density: cfg.food_density,
        reproduction: cfg.reproduction,
        out_dir: cfg.out_dir.clone(),
        ..Default::default()
    };
    let channels = Channels {
        session_tx: session_cmd_tx,
        batch_tx: batch_cmd_tx,
        session_rx: session_evt_rx,
        batch_rx: batch_evt_rx,
    };

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(state, batch_configs, channels));

    let (session_res, jobs) = tokio::join!(
        session::run_session(controller, session_cmd_rx),
        orchestrator::run_orchestrator(orch, batch_cmd_rx),
    );
    info!(jobs = jobs.len(), "interactive run finished");

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    session_res.context("simulation stopped")?;
    Ok(())
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut state: UiState,
    batch_configs: Vec<BatchJobConfig>,
    mut ch: Channels,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange
    )
    .ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let tick_rate = Duration::from_millis(33);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive; unbounded channel avoids backpressure.
        while let Ok(ev) = ch.session_rx.try_recv() {
            match ev {
                SessionEvent::Snapshot { step_count, csv } => {
                    save_snapshot(&mut state, step_count, &csv);
                }
                other => state.apply_session_event(other),
            }
        }
        while let Ok(ev) = ch.batch_rx.try_recv() {
            if let BatchEvent::Delivered { delivery, .. } = &ev {
                save_delivery(&mut state, delivery);
            }
            state.apply_batch_event(&ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) => {
                    if k.kind != KeyEventKind::Press {
                        continue;
                    }
                    if handle_key(&mut state, k, &batch_configs, &ch) {
                        break Ok(());
                    }
                }
                Ok(Event::Mouse(m)) => handle_mouse(&mut state, m, &ch.session_tx),
                Ok(Event::FocusGained) => {
                    state.focused = true;
                    let _ = ch.batch_tx.send(BatchCommand::Focus(true));
                }
                Ok(Event::FocusLost) => {
                    state.focused = false;
                    let _ = ch.batch_tx.send(BatchCommand::Focus(false));
                }
                Ok(Event::Resize(w, h)) => {
                    let viewport = canvas_viewport(Rect::new(0, 0, w, h));
                    // A zero-area target would fail the next render; keep the old one.
                    if viewport.width > 0 && viewport.height > 0 {
                        let _ = ch.session_tx.send(SessionCommand::Resize(viewport));
                    }
                }
                _ => {}
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(
        stdout,
        DisableFocusChange,
        DisableMouseCapture,
        LeaveAlternateScreen
    )
    .ok();
    res
}

/// Translate one key press into commands. Returns true when the UI should exit.
fn handle_key(
    state: &mut UiState,
    k: KeyEvent,
    batch_configs: &[BatchJobConfig],
    ch: &Channels,
) -> bool {
    let session = |cmd: SessionCommand| {
        let _ = ch.session_tx.send(cmd);
    };
    match (k.modifiers, k.code) {
        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            let _ = ch.session_tx.send(SessionCommand::Quit);
            let _ = ch.batch_tx.send(BatchCommand::Quit);
            return true;
        }
        (_, KeyCode::Char(' ')) | (_, KeyCode::Char('p')) => session(SessionCommand::TogglePlay),
        (_, KeyCode::Char('n')) | (_, KeyCode::Char('.')) => session(SessionCommand::Step),
        (_, KeyCode::Up) | (_, KeyCode::Char('w')) => session(SessionCommand::Nudge(Heading::Up)),
        (_, KeyCode::Down) | (_, KeyCode::Char('s')) => {
            session(SessionCommand::Nudge(Heading::Down))
        }
        (_, KeyCode::Left) | (_, KeyCode::Char('a')) => {
            session(SessionCommand::Nudge(Heading::Left))
        }
        (_, KeyCode::Right) | (_, KeyCode::Char('d')) => {
            session(SessionCommand::Nudge(Heading::Right))
        }
        (_, KeyCode::Char('+')) | (_, KeyCode::Char('=')) => {
            let raw = state.nudge_slider(SLIDER_STEP);
            session(SessionCommand::SetStepMultiplier(raw));
        }
        (_, KeyCode::Char('-')) => {
            let raw = state.nudge_slider(-SLIDER_STEP);
            session(SessionCommand::SetStepMultiplier(raw));
        }
        (_, KeyCode::Char('[')) | (_, KeyCode::Char(']')) => {
            let density = state.nudge_density(k.code == KeyCode::Char(']'));
            session(SessionCommand::SetFoodDensity(density));
            state.info = format!("Food density: {density}");
        }
        (_, KeyCode::Char('m')) => {
            state.reproduction = state.reproduction.toggled();
            session(SessionCommand::SetReproductionMethod(state.reproduction));
            state.info = format!("Reproduction: {}", state.reproduction);
        }
        (_, KeyCode::Char('b')) => {
            let configs = if batch_configs.is_empty() {
                vec![BatchJobConfig::new(
                    state.reproduction,
                    state.food_density,
                    state.food_density,
                )]
            } else {
                batch_configs.to_vec()
            };
            state.info = format!("Launching {} batch job(s)…", configs.len());
            let _ = ch.batch_tx.send(BatchCommand::Launch(configs));
        }
        (_, KeyCode::Char('e')) => {
            state.info = "Exporting snapshot…".into();
            session(SessionCommand::ExportSnapshot);
        }
        (_, KeyCode::Char('y')) => {
            if let Some(ref path) = state.last_exported_path {
                match copy_to_clipboard(path) {
                    Ok(_) => {
                        let display_path = if path.chars().count() > 60 {
                            let head: String = path.chars().take(57).collect();
                            format!("{head}...")
                        } else {
                            path.clone()
                        };
                        state.info = format!("✓ Copied to clipboard: {}", display_path);
                    }
                    Err(e) => {
                        state.info = format!("Clipboard copy failed: {e:#}");
                    }
                }
            } else {
                state.info = "No exported file path to copy. Export a file first (e)".into();
            }
        }
        (_, KeyCode::Tab) => state.tab = (state.tab + 1) % 3,
        (_, KeyCode::Char('?')) => state.tab = 2,
        _ => {}
    }
    false
}

/// Mouse drag pans with the pointer; the wheel scrolls the view.
fn handle_mouse(state: &mut UiState, m: MouseEvent, session_tx: &UnboundedSender<SessionCommand>) {
    if state.tab != 0 {
        return;
    }
    let zoom = state.zoom();
    let pan = |dx: f64, dy: f64, source: PanSource| {
        let _ = session_tx.send(SessionCommand::Pan { dx, dy, source });
    };
    match m.kind {
        MouseEventKind::Down(MouseButton::Left) => state.drag_anchor = Some((m.column, m.row)),
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some((c, r)) = state.drag_anchor {
                let dx = (f64::from(m.column) - f64::from(c)) * UNITS_PER_COL / zoom;
                let dy = (f64::from(m.row) - f64::from(r)) * UNITS_PER_ROW / zoom;
                if dx != 0.0 || dy != 0.0 {
                    pan(dx, dy, PanSource::Drag);
                }
            }
            state.drag_anchor = Some((m.column, m.row));
        }
        MouseEventKind::Up(MouseButton::Left) => state.drag_anchor = None,
        MouseEventKind::ScrollDown => pan(0.0, WHEEL_ROWS * UNITS_PER_ROW / zoom, PanSource::Wheel),
        MouseEventKind::ScrollUp => pan(0.0, -WHEEL_ROWS * UNITS_PER_ROW / zoom, PanSource::Wheel),
        MouseEventKind::ScrollRight => {
            pan(WHEEL_ROWS * UNITS_PER_COL / zoom, 0.0, PanSource::Wheel)
        }
        MouseEventKind::ScrollLeft => pan(-WHEEL_ROWS * UNITS_PER_COL / zoom, 0.0, PanSource::Wheel),
        _ => {}
    }
}

fn split(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(4)].as_ref())
        .split(area)
}

/// Render target size for a terminal of `area`: the bordered body between tabs and status.
fn canvas_viewport(area: Rect) -> Viewport {
    let body = split(area)[1];
    Viewport {
        width: body.width.saturating_sub(2),
        height: body.height.saturating_sub(2),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = split(area);

    let tabs = Tabs::new(vec![
        Line::from("Simulation"),
        Line::from("Batch"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("choanosim"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_world(chunks[1], f, state),
        1 => draw_jobs(chunks[1], f, state),
        _ => draw_help(chunks[1], f),
    }
    draw_status(chunks[2], f, state);
}

fn glyph_style(glyph: Glyph) -> Style {
    match glyph {
        Glyph::Empty => Style::default(),
        Glyph::Food => Style::default().fg(Color::Green),
        Glyph::Cell => Style::default().fg(Color::Cyan),
        Glyph::Gravid => Style::default().fg(Color::Magenta),
        Glyph::Border => Style::default().fg(Color::DarkGray),
    }
}

/// One styled line per canvas row, merging runs of the same glyph into a single span.
fn canvas_lines(canvas: &Canvas) -> Vec<Line<'static>> {
    canvas
        .rows()
        .map(|row| {
            let mut spans = Vec::new();
            let mut run = String::new();
            let mut current: Option<Glyph> = None;
            for &g in row {
                if current != Some(g) {
                    if let Some(prev) = current {
                        spans.push(Span::styled(std::mem::take(&mut run), glyph_style(prev)));
                    }
                    current = Some(g);
                }
                run.push(g.as_char());
            }
            if let Some(prev) = current {
                spans.push(Span::styled(run, glyph_style(prev)));
            }
            Line::from(spans)
        })
        .collect()
}

fn draw_world(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let title = match state.snapshot {
        Some(s) => format!(
            "World  x={:.0} y={:.0} zoom={:.1}",
            s.camera.x, s.camera.y, s.camera.zoom
        ),
        None => "World".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let lines = state.canvas.as_ref().map(canvas_lines).unwrap_or_default();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let (phase, color) = match (state.session_error.is_some(), state.phase()) {
        (true, _) => ("FAILED", Color::Red),
        (false, SessionPhase::Playing) => ("PLAYING", Color::Green),
        (false, SessionPhase::Stepping) => ("STEPPING", Color::Yellow),
        (false, SessionPhase::Stopped) => ("PAUSED", Color::Gray),
    };
    let (steps, multiplier) = state
        .snapshot
        .map(|s| (s.step_count, s.step_multiplier))
        .unwrap_or((0, 1));

    let mut lines = vec![Line::from(vec![
        Span::styled(phase, Style::default().fg(color)),
        Span::raw(format!("  step {steps}  x{multiplier}/step")),
        Span::raw(format!(
            "  food density {}  {}",
            state.food_density, state.reproduction
        )),
        Span::raw(format!("  jobs {}/{}", state.running_jobs(), state.jobs.len())),
    ])];
    push_wrapped_status_kv(&mut lines, "Info", &state.info, area.width);
    lines.truncate(area.height.saturating_sub(2).max(1) as usize);

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReproductionMethod;

    struct Wire {
        ch: Channels,
        session_rx: UnboundedReceiver<SessionCommand>,
        batch_rx: UnboundedReceiver<BatchCommand>,
    }

    fn wire() -> Wire {
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let (_, session_evt_rx) = mpsc::unbounded_channel();
        let (_, batch_evt_rx) = mpsc::unbounded_channel();
        Wire {
            ch: Channels {
                session_tx,
                batch_tx,
                session_rx: session_evt_rx,
                batch_rx: batch_evt_rx,
            },
            session_rx,
            batch_rx,
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn viewport_excludes_chrome() {
        let vp = canvas_viewport(Rect::new(0, 0, 100, 40));
        assert_eq!(
            vp,
            Viewport {
                width: 98,
                height: 31
            }
        );
        let tiny = canvas_viewport(Rect::new(0, 0, 1, 5));
        assert_eq!(tiny.width, 0);
    }

    #[test]
    fn keys_map_to_session_intents() {
        let mut w = wire();
        let mut state = UiState::default();
        for code in [
            KeyCode::Char(' '),
            KeyCode::Char('.'),
            KeyCode::Left,
            KeyCode::Char('+'),
            KeyCode::Char(']'),
            KeyCode::Char('m'),
            KeyCode::Char('e'),
        ] {
            assert!(!handle_key(&mut state, press(code), &[], &w.ch));
        }
        let sent: Vec<SessionCommand> = std::iter::from_fn(|| w.session_rx.try_recv().ok()).collect();
        assert!(matches!(sent[0], SessionCommand::TogglePlay));
        assert!(matches!(sent[1], SessionCommand::Step));
        assert!(matches!(sent[2], SessionCommand::Nudge(Heading::Left)));
        assert!(matches!(sent[3], SessionCommand::SetStepMultiplier(r) if r == 1.5));
        assert!(matches!(sent[4], SessionCommand::SetFoodDensity(250)));
        assert!(matches!(
            sent[5],
            SessionCommand::SetReproductionMethod(ReproductionMethod::Sexual)
        ));
        assert!(matches!(sent[6], SessionCommand::ExportSnapshot));
        assert_eq!(sent.len(), 7);
    }

    #[test]
    fn batch_key_launches_configured_or_current_settings() {
        let mut w = wire();
        let mut state = UiState::default();
        handle_key(&mut state, press(KeyCode::Char('b')), &[], &w.ch);
        match w.batch_rx.try_recv().unwrap() {
            BatchCommand::Launch(cfgs) => {
                assert_eq!(cfgs.len(), 1);
                assert_eq!(cfgs[0].label(), "asexual-240-240");
            }
            other => panic!("unexpected command {other:?}"),
        }

        let configured = vec![
            BatchJobConfig::new(ReproductionMethod::Sexual, 1, 2),
            BatchJobConfig::new(ReproductionMethod::Asexual, 3, 4),
        ];
        handle_key(&mut state, press(KeyCode::Char('b')), &configured, &w.ch);
        assert!(matches!(w.batch_rx.try_recv().unwrap(), BatchCommand::Launch(c) if c == configured));
    }

    #[test]
    fn quit_stops_both_loops() {
        let mut w = wire();
        let mut state = UiState::default();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(handle_key(&mut state, ctrl_c, &[], &w.ch));
        assert!(matches!(w.session_rx.try_recv().unwrap(), SessionCommand::Quit));
        assert!(matches!(w.batch_rx.try_recv().unwrap(), BatchCommand::Quit));
    }

    #[test]
    fn drag_adds_and_wheel_subtracts_in_world_units() {
        let mut w = wire();
        let mut state = UiState::default();
        handle_mouse(&mut state, mouse(MouseEventKind::Down(MouseButton::Left), 10, 10), &w.ch.session_tx);
        handle_mouse(&mut state, mouse(MouseEventKind::Drag(MouseButton::Left), 12, 9), &w.ch.session_tx);
        handle_mouse(&mut state, mouse(MouseEventKind::Up(MouseButton::Left), 12, 9), &w.ch.session_tx);
        handle_mouse(&mut state, mouse(MouseEventKind::ScrollDown, 0, 0), &w.ch.session_tx);

        match w.session_rx.try_recv().unwrap() {
            SessionCommand::Pan { dx, dy, source } => {
                assert_eq!((dx, dy, source), (40.0, -40.0, PanSource::Drag));
            }
            other => panic!("unexpected command {other:?}"),
        }
        match w.session_rx.try_recv().unwrap() {
            SessionCommand::Pan { dx, dy, source } => {
                assert_eq!((dx, dy, source), (0.0, 120.0, PanSource::Wheel));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(state.drag_anchor.is_none());
    }

    #[test]
    fn canvas_rows_merge_runs() {
        let mut canvas = Canvas::new(Viewport {
            width: 4,
            height: 1,
        });
        canvas.put(1, 0, Glyph::Cell);
        canvas.put(2, 0, Glyph::Cell);
        let lines = canvas_lines(&canvas);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].spans.len(), 3);
        assert_eq!(lines[0].spans[1].content, "oo");
    }
}
