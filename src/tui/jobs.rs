//! Batch tab: one progress row per job plus the delivered files.

use super::state::UiState;
use crate::model::JobStatus;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Pending => Color::DarkGray,
        JobStatus::Running => Color::Cyan,
        JobStatus::Completed => Color::Green,
        JobStatus::Failed => Color::Red,
    }
}

fn status_text(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "done",
        JobStatus::Failed => "failed",
    }
}

pub fn draw_jobs(area: Rect, f: &mut Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(8)].as_ref())
        .split(area);

    let focus = if state.focused {
        Span::styled("focused", Style::default().fg(Color::Green))
    } else {
        Span::styled("unfocused (results held)", Style::default().fg(Color::Yellow))
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(vec![
            Span::raw(format!("Batch jobs ({} running) ", state.running_jobs())),
            focus,
        ]));
    let inner = block.inner(rows[0]);
    f.render_widget(block, rows[0]);

    if state.jobs.is_empty() {
        let p = Paragraph::new(Line::from(vec![
            Span::raw("No batch runs yet. Press "),
            Span::styled("b", Style::default().fg(Color::Magenta)),
            Span::raw(" to launch."),
        ]));
        f.render_widget(p, inner);
    } else {
        // Newest jobs are dropped first when the list does not fit.
        let visible = state.jobs.iter().take(inner.height as usize);
        for (i, job) in visible.enumerate() {
            let row = Rect::new(inner.x, inner.y + i as u16, inner.width, 1);
            let mut label = format!(
                "#{} {} {} {}%",
                job.id,
                job.label(),
                status_text(job.status),
                job.progress_percent
            );
            if let Some(err) = job.error.as_deref() {
                label.push_str(&format!(" ({err})"));
            }
            let gauge = Gauge::default()
                .gauge_style(Style::default().fg(status_color(job.status)).bg(Color::Black))
                .ratio(f64::from(job.progress_percent.min(100)) / 100.0)
                .label(label);
            f.render_widget(gauge, row);
        }
    }

    let mut lines: Vec<Line> = state
        .delivered
        .iter()
        .rev()
        .take(6)
        .map(|p| Line::from(Span::raw(p.display().to_string())))
        .collect();
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Files are written to {}", state.out_dir.display()),
            Style::default().fg(Color::Gray),
        )));
    }
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Delivered"));
    f.render_widget(p, rows[1]);
}
