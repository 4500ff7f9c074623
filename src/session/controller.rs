//! Interactive session loop.
//!
//! Owns the engine, camera and play/step state. UI layers send `SessionCommand`s and
//! receive `SessionEvent`s; engine work for each frame runs on a blocking worker so
//! the loop keeps accepting input between frames.

use super::state::SessionState;
use crate::camera;
use crate::engine::{Canvas, Engine, EngineModule};
use crate::error::EngineError;
use crate::model::{
    Camera, Direction, PanSource, ReproductionMethod, SessionPhase, SessionSnapshot, Viewport,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Intents produced by UI layers.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    TogglePlay,
    Step,
    Pan { dx: f64, dy: f64, source: PanSource },
    Nudge(Direction),
    /// Raw slider value; the multiplier is derived from it.
    SetStepMultiplier(f64),
    SetFoodDensity(u32),
    SetReproductionMethod(ReproductionMethod),
    ExportSnapshot,
    Resize(Viewport),
    Quit,
}

/// Events emitted back to presentation layers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Frame {
        canvas: Canvas,
        snapshot: SessionSnapshot,
    },
    /// State changed without a new frame (play toggled, multiplier changed).
    State(SessionSnapshot),
    Snapshot {
        step_count: u64,
        csv: String,
    },
    Fatal(EngineError),
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub viewport: Viewport,
    pub camera: Camera,
    pub step_slider: f64,
    pub frame_interval: Duration,
}

/// Engine and render target; absent from the controller while a frame holds them.
struct Stage {
    engine: Box<dyn Engine>,
    canvas: Canvas,
}

struct FrameOutcome {
    stage: Stage,
    ticks: u32,
    result: Result<(), EngineError>,
}

#[derive(Debug, Clone, Copy)]
enum ConfigChange {
    FoodDensity(u32),
    Reproduction(ReproductionMethod),
}

pub struct SessionController {
    state: SessionState,
    camera: Camera,
    viewport: Viewport,
    stage: Option<Stage>,
    frame: Option<JoinHandle<FrameOutcome>>,
    /// Whether the in-flight frame advances time or only redraws.
    frame_steps: bool,
    next_frame_at: Option<Instant>,
    frame_interval: Duration,
    // Work deferred until the in-flight frame hands the stage back.
    redraw_pending: bool,
    step_pending: bool,
    export_pending: bool,
    config_pending: Vec<ConfigChange>,
    event_tx: UnboundedSender<SessionEvent>,
}

impl SessionController {
    /// Load an engine instance and draw the initial frame.
    pub fn new(
        module: &dyn EngineModule,
        settings: SessionSettings,
        event_tx: UnboundedSender<SessionEvent>,
    ) -> Result<Self, EngineError> {
        let engine = module.initialize(Some(settings.viewport))?;
        let mut state = SessionState::default();
        state.set_step_multiplier(settings.step_slider);
        let mut controller = Self {
            state,
            camera: settings.camera,
            viewport: settings.viewport,
            stage: Some(Stage {
                engine,
                canvas: Canvas::new(settings.viewport),
            }),
            frame: None,
            frame_steps: false,
            next_frame_at: None,
            frame_interval: settings.frame_interval,
            redraw_pending: false,
            step_pending: false,
            export_pending: false,
            config_pending: Vec::new(),
            event_tx,
        };
        controller.render_initial()?;
        info!(
            width = settings.viewport.width,
            height = settings.viewport.height,
            multiplier = controller.state.step_multiplier(),
            "session started"
        );
        Ok(controller)
    }

    pub fn phase(&self) -> SessionPhase {
        if self.state.is_playing {
            SessionPhase::Playing
        } else if self.frame.is_some() && self.frame_steps {
            SessionPhase::Stepping
        } else {
            SessionPhase::Stopped
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            is_playing: self.state.is_playing,
            step_count: self.state.step_count,
            step_multiplier: self.state.step_multiplier(),
            camera: self.camera,
        }
    }

    fn publish_state(&self) {
        let _ = self.event_tx.send(SessionEvent::State(self.snapshot()));
    }

    /// Apply one UI intent. Engine work it triggers reports back through `finish_frame`.
    pub fn apply(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::TogglePlay => self.toggle_play(),
            SessionCommand::Step => self.step(),
            SessionCommand::Pan { dx, dy, source } => {
                self.camera = camera::pan(self.camera, dx, dy, source);
                self.redraw();
            }
            SessionCommand::Nudge(direction) => {
                self.camera = camera::discrete_step(self.camera, direction);
                self.redraw();
            }
            SessionCommand::SetStepMultiplier(raw) => {
                let m = self.state.set_step_multiplier(raw);
                debug!(raw, multiplier = m, "step multiplier changed");
                self.publish_state();
            }
            SessionCommand::SetFoodDensity(density) => {
                self.configure(ConfigChange::FoodDensity(density));
            }
            SessionCommand::SetReproductionMethod(method) => {
                self.configure(ConfigChange::Reproduction(method));
            }
            SessionCommand::ExportSnapshot => self.export_snapshot(),
            SessionCommand::Resize(viewport) => {
                self.viewport = viewport;
                self.redraw();
            }
            SessionCommand::Quit => {}
        }
    }

    /// Advance by one multiplied step. Ignored while a frame is in flight.
    pub fn step(&mut self) {
        if self.frame.is_some() {
            if self.frame_steps {
                debug!("frame in flight; step ignored");
            } else {
                // A redraw is not a frame; the step runs once it lands.
                self.step_pending = true;
            }
            return;
        }
        self.start_frame();
    }

    pub fn toggle_play(&mut self) {
        self.state.is_playing = !self.state.is_playing;
        debug!(playing = self.state.is_playing, "play toggled");
        if self.state.is_playing {
            if self.frame.is_none() {
                self.start_frame();
            }
        } else {
            self.next_frame_at = None;
        }
        self.publish_state();
    }

    fn configure(&mut self, change: ConfigChange) {
        match self.stage.as_mut() {
            Some(stage) => apply_config(stage.engine.as_mut(), change),
            None => self.config_pending.push(change),
        }
    }

    fn export_snapshot(&mut self) {
        match self.stage.as_ref() {
            Some(stage) => {
                let csv = stage.engine.export_snapshot();
                let _ = self.event_tx.send(SessionEvent::Snapshot {
                    step_count: self.state.step_count,
                    csv,
                });
            }
            None => self.export_pending = true,
        }
    }

    /// Draw the first frame before the session loop starts.
    fn render_initial(&mut self) -> Result<(), EngineError> {
        let Some(stage) = self.stage.as_mut() else {
            return Ok(());
        };
        stage.engine.render(&mut stage.canvas, &self.camera)?;
        let _ = self.event_tx.send(SessionEvent::Frame {
            canvas: stage.canvas.clone(),
            snapshot: self.snapshot(),
        });
        Ok(())
    }

    /// Render the current state without advancing time.
    fn redraw(&mut self) {
        if self.frame.is_some() {
            self.redraw_pending = true;
            return;
        }
        self.spawn_frame(0);
    }

    fn start_frame(&mut self) {
        let ticks = self.state.step_multiplier();
        self.spawn_frame(ticks);
    }

    /// Run `ticks` steps and a render on the blocking pool. Zero ticks only redraws.
    fn spawn_frame(&mut self, ticks: u32) {
        let Some(mut stage) = self.stage.take() else {
            return;
        };
        self.next_frame_at = None;
        self.frame_steps = ticks > 0;
        let camera = self.camera;
        if stage.canvas.viewport() != self.viewport {
            stage.canvas.resize(self.viewport);
        }
        self.frame = Some(tokio::task::spawn_blocking(move || {
            let mut result = Ok(());
            for _ in 0..ticks {
                if let Err(e) = stage.engine.step() {
                    result = Err(e);
                    break;
                }
            }
            if result.is_ok() {
                result = stage.engine.render(&mut stage.canvas, &camera);
            }
            FrameOutcome {
                stage,
                ticks,
                result,
            }
        }));
    }

    fn finish_frame(&mut self, joined: Result<FrameOutcome, JoinError>) -> Result<(), EngineError> {
        self.frame = None;
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(EngineError::Runtime(format!("engine panicked: {e}")))),
        };
        self.stage = Some(outcome.stage);
        if let Err(e) = outcome.result {
            return Err(self.fail(e));
        }

        self.state.record_ticks(outcome.ticks);
        if let Some(stage) = self.stage.as_ref() {
            let _ = self.event_tx.send(SessionEvent::Frame {
                canvas: stage.canvas.clone(),
                snapshot: self.snapshot(),
            });
        }

        for change in std::mem::take(&mut self.config_pending) {
            self.configure(change);
        }
        if std::mem::take(&mut self.export_pending) {
            self.export_snapshot();
        }
        let redraw = std::mem::take(&mut self.redraw_pending);
        if std::mem::take(&mut self.step_pending) && !self.state.is_playing {
            self.start_frame();
        } else if redraw {
            self.spawn_frame(0);
        } else if self.state.is_playing {
            self.next_frame_at = Some(Instant::now() + self.frame_interval);
        }
        Ok(())
    }

    fn fail(&mut self, e: EngineError) -> EngineError {
        error!(error = %e, step_count = self.state.step_count, "session stopped by engine failure");
        self.state.is_playing = false;
        self.next_frame_at = None;
        let _ = self.event_tx.send(SessionEvent::Fatal(e.clone()));
        e
    }
}

fn apply_config(engine: &mut dyn Engine, change: ConfigChange) {
    debug!(?change, "engine configuration changed");
    match change {
        ConfigChange::FoodDensity(d) => engine.set_food_density(d),
        ConfigChange::Reproduction(m) => engine.set_reproduction_method(m),
    }
}

/// Drive a session until `Quit`, the command channel closes, or the engine fails.
pub async fn run_session(
    mut controller: SessionController,
    mut cmd_rx: UnboundedReceiver<SessionCommand>,
) -> Result<SessionState, EngineError> {
    let res = loop {
        let next_frame_at = controller.next_frame_at;
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Quit) | None => break Ok(controller.state),
                    Some(cmd) => controller.apply(cmd),
                }
            }
            // The JoinHandle stays in place until this branch wins so it is never dropped mid-frame.
            joined = async {
                match controller.frame.as_mut() {
                    Some(h) => h.await,
                    None => futures::future::pending().await,
                }
            } => {
                if let Err(e) = controller.finish_frame(joined) {
                    break Err(e);
                }
            }
            _ = async {
                match next_frame_at {
                    Some(t) => tokio::time::sleep_until(t).await,
                    None => futures::future::pending().await,
                }
            } => {
                controller.next_frame_at = None;
                if controller.state.is_playing && controller.frame.is_none() {
                    controller.start_frame();
                }
            }
        }
    };

    if let Some(h) = controller.frame.take() {
        // Let an in-flight frame finish on its own; the engine is dropped with it.
        drop(h);
    }
    info!(step_count = controller.state.step_count, "session ended");
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Calls, FakeEngine, OneShotModule};
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};
    use tokio::sync::mpsc;

    struct Harness {
        cmd_tx: mpsc::UnboundedSender<SessionCommand>,
        event_rx: mpsc::UnboundedReceiver<SessionEvent>,
        calls: Arc<Calls>,
        handle: JoinHandle<Result<SessionState, EngineError>>,
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            viewport: Viewport {
                width: 8,
                height: 4,
            },
            camera: Camera::default(),
            step_slider: 1.0,
            frame_interval: Duration::from_millis(1),
        }
    }

    fn start(configure: impl FnOnce(&mut FakeEngine)) -> Harness {
        let calls = Arc::new(Calls::default());
        let mut engine = FakeEngine::new(calls.clone());
        configure(&mut engine);
        let module = OneShotModule(Mutex::new(Some(engine)));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(&module, settings(), event_tx).unwrap();
        let handle = tokio::spawn(run_session(controller, cmd_rx));
        Harness {
            cmd_tx,
            event_rx,
            calls,
            handle,
        }
    }

    impl Harness {
        fn send(&self, cmd: SessionCommand) {
            self.cmd_tx.send(cmd).unwrap();
        }

        async fn next(&mut self) -> SessionEvent {
            tokio::time::timeout(Duration::from_secs(5), self.event_rx.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("session event channel closed")
        }

        async fn next_frame(&mut self) -> SessionSnapshot {
            loop {
                if let SessionEvent::Frame { snapshot, .. } = self.next().await {
                    return snapshot;
                }
            }
        }

        /// Round-trip a state query so every earlier command has been applied.
        async fn sync(&mut self, raw: f64) -> (SessionSnapshot, usize) {
            self.send(SessionCommand::SetStepMultiplier(raw));
            let mut frames = 0;
            loop {
                match self.next().await {
                    SessionEvent::State(s) => return (s, frames),
                    SessionEvent::Frame { .. } => frames += 1,
                    _ => {}
                }
            }
        }
    }

    #[tokio::test]
    async fn initial_frame_is_rendered_before_any_step() {
        let mut h = start(|_| {});
        let snap = h.next_frame().await;
        assert_eq!(snap.step_count, 0);
        assert_eq!(h.calls.renders(), 1);
        assert_eq!(h.calls.steps(), 0);
    }

    #[tokio::test]
    async fn step_advances_by_the_multiplier() {
        let mut h = start(|_| {});
        h.next_frame().await;
        h.sync(3.0).await;
        h.send(SessionCommand::Step);
        let snap = h.next_frame().await;
        assert_eq!(snap.step_count, 9);
        assert!(!snap.is_playing);
        assert_eq!(h.calls.steps(), 9);
        assert_eq!(h.calls.renders(), 2);

        h.send(SessionCommand::Step);
        assert_eq!(h.next_frame().await.step_count, 18);
    }

    #[tokio::test]
    async fn step_during_a_frame_is_ignored() {
        let (gate_tx, gate_rx) = std_mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate_rx));
        let mut h = start(|e| e.gate = Some(gate));
        h.next_frame().await;

        h.send(SessionCommand::Step);
        h.send(SessionCommand::Step);
        h.send(SessionCommand::Step);
        let (_, frames) = h.sync(1.0).await;
        assert_eq!(frames, 0);

        for _ in 0..5 {
            gate_tx.send(()).unwrap();
        }
        let snap = h.next_frame().await;
        assert_eq!(snap.step_count, 1);

        let (snap, frames) = h.sync(1.0).await;
        assert_eq!(frames, 0);
        assert_eq!(snap.step_count, 1);
        assert_eq!(h.calls.steps(), 1);
        assert_eq!(h.calls.renders(), 2);
    }

    #[tokio::test]
    async fn double_toggle_stops_the_loop() {
        let mut h = start(|_| {});
        h.next_frame().await;

        h.send(SessionCommand::TogglePlay);
        let mut seen = 0;
        while seen < 3 {
            if let SessionEvent::Frame { snapshot, .. } = h.next().await {
                assert!(snapshot.is_playing);
                seen += 1;
            }
        }

        h.send(SessionCommand::TogglePlay);
        loop {
            if let SessionEvent::State(s) = h.next().await {
                if !s.is_playing {
                    break;
                }
            }
        }
        // A frame started before the toggle may still land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = h.calls.steps();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.calls.steps(), settled);

        let (snap, _) = h.sync(1.0).await;
        assert!(!snap.is_playing);
        assert_eq!(snap.step_count, settled as u64);
    }

    #[tokio::test]
    async fn wheel_pan_redraws_without_stepping() {
        let mut h = start(|_| {});
        h.next_frame().await;
        h.send(SessionCommand::Pan {
            dx: 10.0,
            dy: -5.0,
            source: PanSource::Wheel,
        });
        let snap = h.next_frame().await;
        assert_eq!(
            snap.camera,
            Camera {
                x: -10.0,
                y: 5.0,
                zoom: 1.0
            }
        );
        assert_eq!(snap.step_count, 0);
        assert_eq!(h.calls.steps(), 0);
        assert_eq!(h.calls.renders(), 2);

        h.send(SessionCommand::Nudge(Direction::Down));
        assert_eq!(h.next_frame().await.camera.y, 105.0);
    }

    #[tokio::test]
    async fn configuration_is_forwarded_without_redraw() {
        let density = Arc::new(Mutex::new(Vec::new()));
        let seen = density.clone();
        let mut h = start(move |e| e.density = seen);
        h.next_frame().await;
        h.send(SessionCommand::SetFoodDensity(120));
        let (_, frames) = h.sync(1.0).await;
        assert_eq!(frames, 0);
        assert_eq!(*density.lock().unwrap(), vec![120]);
        assert_eq!(h.calls.renders(), 1);
    }

    #[tokio::test]
    async fn export_returns_engine_snapshot() {
        let mut h = start(|_| {});
        h.next_frame().await;
        h.send(SessionCommand::Step);
        h.next_frame().await;
        h.send(SessionCommand::ExportSnapshot);
        loop {
            if let SessionEvent::Snapshot { step_count, csv } = h.next().await {
                assert_eq!(step_count, 1);
                assert_eq!(csv, "steps,1");
                break;
            }
        }
    }

    #[tokio::test]
    async fn engine_failure_stops_the_session() {
        let mut h = start(|e| e.fail_step_at = Some(2));
        h.next_frame().await;
        h.send(SessionCommand::TogglePlay);
        loop {
            if let SessionEvent::Fatal(e) = h.next().await {
                assert!(matches!(e, EngineError::Runtime(_)));
                break;
            }
        }
        let res = h.handle.await.unwrap();
        assert!(matches!(res, Err(EngineError::Runtime(_))));
        assert_eq!(h.calls.steps(), 2);
    }

    #[tokio::test]
    async fn render_failure_inside_a_frame_stops_the_session() {
        let mut h = start(|e| e.fail_render_at = Some(2));
        h.next_frame().await;
        h.send(SessionCommand::TogglePlay);
        loop {
            if let SessionEvent::Fatal(e) = h.next().await {
                assert!(matches!(e, EngineError::Runtime(_)));
                break;
            }
        }
        let res = h.handle.await.unwrap();
        assert!(matches!(res, Err(EngineError::Runtime(_))));
        assert_eq!(h.calls.steps(), 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.calls.steps(), 1);
    }

    #[tokio::test]
    async fn render_failure_on_pan_stops_the_session() {
        let mut h = start(|e| e.fail_render_at = Some(2));
        h.next_frame().await;
        h.send(SessionCommand::Pan {
            dx: 3.0,
            dy: 4.0,
            source: PanSource::Drag,
        });
        loop {
            match h.next().await {
                SessionEvent::Fatal(e) => {
                    assert!(matches!(e, EngineError::Runtime(_)));
                    break;
                }
                SessionEvent::Frame { .. } => panic!("failed redraw must not publish a frame"),
                _ => {}
            }
        }
        let res = h.handle.await.unwrap();
        assert!(matches!(res, Err(EngineError::Runtime(_))));
        assert_eq!(h.calls.steps(), 0);
        assert_eq!(h.calls.renders(), 2);
    }

    #[tokio::test]
    async fn step_sent_during_a_redraw_still_runs() {
        let mut h = start(|_| {});
        h.next_frame().await;
        h.send(SessionCommand::Nudge(Direction::Right));
        h.send(SessionCommand::Step);
        let redrawn = h.next_frame().await;
        assert_eq!(redrawn.camera.x, 100.0);
        let stepped = h.next_frame().await;
        assert_eq!(stepped.step_count, 1);
        assert_eq!(h.calls.steps(), 1);
    }

    #[tokio::test]
    async fn quit_returns_final_state() {
        let mut h = start(|_| {});
        h.next_frame().await;
        h.send(SessionCommand::Step);
        h.next_frame().await;
        h.send(SessionCommand::Quit);
        let state = h.handle.await.unwrap().unwrap();
        assert_eq!(state.step_count, 1);
        assert!(!state.is_playing);
    }

    #[test]
    fn missing_engine_is_a_load_error() {
        let module = OneShotModule(Mutex::new(None));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = SessionController::new(&module, settings(), tx).err().unwrap();
        assert!(matches!(err, EngineError::Load(_)));
    }
}
