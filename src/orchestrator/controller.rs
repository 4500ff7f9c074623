//! Batch lifecycle controller.
//!
//! Spawns one worker per job, folds worker messages into job state, and emits events for
//! presentation layers. Deliveries pass through the focus gate.

use super::focus::FocusGate;
use super::worker::{spawn_worker, WorkerMessage};
use crate::engine::EngineModule;
use crate::model::{BatchEvent, BatchJob, BatchJobConfig, Delivery, JobStatus};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Commands emitted by UI layers to the orchestrator.
#[derive(Debug, Clone)]
pub(crate) enum BatchCommand {
    Launch(Vec<BatchJobConfig>),
    Focus(bool),
    Quit,
}

pub(crate) struct BatchOrchestrator {
    module: Arc<dyn EngineModule>,
    jobs: Vec<BatchJob>,
    gate: FocusGate,
    worker_tx: UnboundedSender<WorkerMessage>,
    worker_rx: UnboundedReceiver<WorkerMessage>,
    event_tx: UnboundedSender<BatchEvent>,
}

impl BatchOrchestrator {
    pub fn new(
        module: Arc<dyn EngineModule>,
        focused: bool,
        settle_delay: Duration,
        event_tx: UnboundedSender<BatchEvent>,
    ) -> Self {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        Self {
            module,
            jobs: Vec::new(),
            gate: FocusGate::new(focused, settle_delay),
            worker_tx,
            worker_rx,
            event_tx,
        }
    }

    pub fn jobs(&self) -> &[BatchJob] {
        &self.jobs
    }

    /// Create and start one job per config. Returns the new jobs as launched.
    pub fn launch(&mut self, configs: Vec<BatchJobConfig>) -> Vec<BatchJob> {
        if configs.is_empty() {
            let _ = self
                .event_tx
                .send(BatchEvent::Info("no batch configurations to launch".into()));
            return Vec::new();
        }
        let first = self.jobs.len();
        for config in configs {
            let id = self.jobs.len();
            self.jobs.push(BatchJob::pending(id, config));
            spawn_worker(id, config, self.module.clone(), self.worker_tx.clone());
            self.jobs[id].status = JobStatus::Running;
            info!(job = id, label = %config.label(), "batch job started");
        }
        let launched = self.jobs[first..].to_vec();
        let _ = self.event_tx.send(BatchEvent::Launched {
            jobs: launched.clone(),
        });
        launched
    }

    pub fn set_focus(&mut self, focused: bool, now: Instant) {
        if focused != self.gate.is_focused() {
            debug!(
                focused,
                pending = self.gate.pending_len(),
                "focus changed"
            );
        }
        self.gate.set_focus(focused, now);
    }

    pub fn handle_worker(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Progress { job, percent } => self.on_progress(job, percent),
            WorkerMessage::Finished { job, result } => {
                let Some(entry) = self.jobs.get_mut(job) else {
                    return;
                };
                let label = entry.label();
                match result {
                    Ok(payload) => {
                        entry.status = JobStatus::Completed;
                        entry.progress_percent = 100;
                        entry.result = Some(payload.clone());
                        info!(job, %label, bytes = payload.len(), "batch job completed");
                        let delivery = Delivery { label, payload };
                        match self.gate.offer(job, delivery) {
                            Some((job, delivery)) => self.deliver(job, delivery),
                            None => {
                                debug!(job, "unfocused; delivery queued");
                                let _ = self.event_tx.send(BatchEvent::Queued {
                                    job,
                                    label: self.jobs[job].label(),
                                });
                            }
                        }
                    }
                    Err(e) => {
                        entry.status = JobStatus::Failed;
                        entry.error = Some(e.to_string());
                        warn!(job, %label, error = %e, "batch job failed");
                        let _ = self.event_tx.send(BatchEvent::Failed {
                            job,
                            label,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn on_progress(&mut self, job: usize, percent: u8) {
        let Some(entry) = self.jobs.get_mut(job) else {
            return;
        };
        let percent = percent.min(100);
        if entry.is_finished() || percent < entry.progress_percent {
            return;
        }
        entry.progress_percent = percent;
        // 100 is not surfaced: completion is reported by the finished message alone.
        if percent < 100 {
            debug!(job, percent, "batch progress");
            let _ = self.event_tx.send(BatchEvent::Progress {
                job,
                label: entry.label(),
                percent,
            });
        }
    }

    /// Hand out everything whose settle window has elapsed.
    pub fn flush_due(&mut self, now: Instant) {
        for (job, delivery) in self.gate.take_due(now) {
            self.deliver(job, delivery);
        }
    }

    fn deliver(&mut self, job: usize, delivery: Delivery) {
        info!(job, file = %delivery.filename(), "delivering batch result");
        // The payload now belongs to the consumer.
        if let Some(entry) = self.jobs.get_mut(job) {
            entry.result = None;
        }
        let _ = self.event_tx.send(BatchEvent::Delivered { job, delivery });
    }
}

/// Drive the orchestrator until `Quit` or the command channel closes. Returns final job state.
pub(crate) async fn run_orchestrator(
    mut orch: BatchOrchestrator,
    mut cmd_rx: UnboundedReceiver<BatchCommand>,
) -> Vec<BatchJob> {
    loop {
        let flush_at = orch.gate.flush_at();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BatchCommand::Launch(configs)) => {
                        orch.launch(configs);
                    }
                    Some(BatchCommand::Focus(focused)) => orch.set_focus(focused, Instant::now()),
                    Some(BatchCommand::Quit) | None => break,
                }
            }
            Some(msg) = orch.worker_rx.recv() => orch.handle_worker(msg),
            _ = async {
                match flush_at {
                    Some(t) => tokio::time::sleep_until(t).await,
                    None => futures::future::pending().await,
                }
            } => orch.flush_due(Instant::now()),
        }
    }

    let unfinished = orch.jobs.iter().filter(|j| !j.is_finished()).count();
    if unfinished > 0 {
        // No cancellation: running workers finish on their own and their results are dropped.
        warn!(unfinished, "orchestrator stopped with jobs still running");
    }
    if orch.gate.pending_len() > 0 {
        warn!(
            pending = orch.gate.pending_len(),
            "orchestrator stopped with undelivered results"
        );
    }
    orch.jobs
}
