use crate::engine::EngineModule;
use crate::error::JobFailure;
use crate::model::BatchJobConfig;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Messages from batch workers back to the orchestrator.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Progress {
        job: usize,
        percent: u8,
    },
    /// Always the last message a worker sends.
    Finished {
        job: usize,
        result: Result<String, JobFailure>,
    },
}

/// Run one batch job on its own blocking thread with a freshly loaded engine.
///
/// The worker is detached; its only output is the message stream on `tx`.
pub(crate) fn spawn_worker(
    job: usize,
    config: BatchJobConfig,
    module: Arc<dyn EngineModule>,
    tx: UnboundedSender<WorkerMessage>,
) {
    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let run = tokio::task::spawn_blocking(move || -> Result<String, JobFailure> {
            let mut engine = module.initialize(None)?;
            debug!(job, label = %config.label(), "batch worker loaded engine");
            let mut on_progress = |percent: u8| {
                let _ = progress_tx.send(WorkerMessage::Progress { job, percent });
            };
            Ok(engine.run_batch(&config, &mut on_progress)?)
        });

        let result = match run.await {
            Ok(r) => r,
            Err(e) if e.is_panic() => Err(JobFailure::Panicked(panic_message(e.into_panic()))),
            Err(_) => Err(JobFailure::Lost),
        };
        let _ = tx.send(WorkerMessage::Finished { job, result });
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Script, ScriptedModule};
    use crate::model::ReproductionMethod;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn progress_precedes_the_finished_message() {
        let module = ScriptedModule::default().with(
            "sexual-1-2",
            Script::Finish {
                progress: vec![30, 60],
                payload: "csv".into(),
            },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = BatchJobConfig::new(ReproductionMethod::Sexual, 1, 2);
        spawn_worker(4, config, Arc::new(module), tx);

        let mut percents = Vec::new();
        loop {
            match rx.recv().await.expect("worker channel closed") {
                WorkerMessage::Progress { job, percent } => {
                    assert_eq!(job, 4);
                    percents.push(percent);
                }
                WorkerMessage::Finished { job, result } => {
                    assert_eq!(job, 4);
                    assert_eq!(result, Ok("csv".to_string()));
                    break;
                }
            }
        }
        assert_eq!(percents, vec![30, 60]);
    }

    #[tokio::test]
    async fn panics_become_job_failures() {
        let module = ScriptedModule::default().with("asexual-1-1", Script::Panic);
        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_worker(
            0,
            BatchJobConfig::new(ReproductionMethod::Asexual, 1, 1),
            Arc::new(module),
            tx,
        );
        match rx.recv().await.expect("worker channel closed") {
            WorkerMessage::Finished { result, .. } => assert_eq!(
                result,
                Err(JobFailure::Panicked("scripted worker panic".into()))
            ),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}
