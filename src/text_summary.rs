//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for the end of a headless batch or session run.

use crate::model::{BatchJob, JobStatus};
use crate::session::SessionState;
use std::collections::HashMap;
use std::path::PathBuf;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// One line per job, plus a totals line. `written` maps job ids to delivered files.
pub(crate) fn build_batch_summary(
    jobs: &[BatchJob],
    written: &HashMap<usize, PathBuf>,
) -> TextSummary {
    let mut lines = Vec::with_capacity(jobs.len() + 1);
    let width = jobs.iter().map(|j| j.label().len()).max().unwrap_or(0);

    for job in jobs {
        let label = job.label();
        let detail = match job.status {
            JobStatus::Completed => match written.get(&job.id) {
                Some(p) => format!("saved {}", p.display()),
                None => match job.result.as_deref() {
                    Some(r) => format!(
                        "completed ({} rows, not written)",
                        r.lines().count().saturating_sub(1)
                    ),
                    None => "completed (delivered, not written)".to_string(),
                },
            },
            JobStatus::Failed => format!(
                "FAILED: {}",
                job.error.as_deref().unwrap_or("unknown error")
            ),
            JobStatus::Pending | JobStatus::Running => {
                format!("unfinished at {}%", job.progress_percent)
            }
        };
        lines.push(format!("#{:<3} {label:<width$}  {detail}", job.id));
    }

    let completed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();
    let failed = jobs.iter().filter(|j| j.status == JobStatus::Failed).count();
    lines.push(format!(
        "Jobs: {} total, {completed} completed, {failed} failed",
        jobs.len()
    ));

    TextSummary { lines }
}

pub(crate) fn build_session_summary(state: &SessionState, exported: Option<&PathBuf>) -> TextSummary {
    let mut lines = vec![format!(
        "Session: {} steps (x{} per step)",
        state.step_count,
        state.step_multiplier()
    )];
    if let Some(p) = exported {
        lines.push(format!("Snapshot: {}", p.display()));
    }
    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchJobConfig, ReproductionMethod};

    fn job(id: usize, status: JobStatus) -> BatchJob {
        let mut j = BatchJob::pending(
            id,
            BatchJobConfig::new(ReproductionMethod::Asexual, 240, 600 + id as u32),
        );
        j.status = status;
        j
    }

    #[test]
    fn batch_summary_lists_every_job_and_totals() {
        let mut done = job(0, JobStatus::Completed);
        done.result = Some("h\n1\n2".into());
        let mut failed = job(1, JobStatus::Failed);
        failed.error = Some("worker panicked: boom".into());
        let mut running = job(2, JobStatus::Running);
        running.progress_percent = 40;

        let mut written = HashMap::new();
        written.insert(0, PathBuf::from("/tmp/ChoanoSimData-asexual-240-600.csv"));
        let summary = build_batch_summary(&[done, failed, running], &written);

        assert_eq!(summary.lines.len(), 4);
        assert!(summary.lines[0].contains("asexual-240-600"));
        assert!(summary.lines[0].contains("saved /tmp/ChoanoSimData-asexual-240-600.csv"));
        assert!(summary.lines[1].contains("FAILED: worker panicked: boom"));
        assert!(summary.lines[2].contains("unfinished at 40%"));
        assert_eq!(summary.lines[3], "Jobs: 3 total, 1 completed, 1 failed");
    }

    #[test]
    fn unwritten_results_report_row_count() {
        let mut done = job(0, JobStatus::Completed);
        done.result = Some("h\n1\n2".into());
        let summary = build_batch_summary(&[done], &HashMap::new());
        assert!(summary.lines[0].contains("completed (2 rows, not written)"));
    }

    #[test]
    fn delivered_results_without_a_file_say_so() {
        let done = job(0, JobStatus::Completed);
        let summary = build_batch_summary(&[done], &HashMap::new());
        assert!(summary.lines[0].contains("completed (delivered, not written)"));
    }
}
