//! Focus-gated delivery queue.
//!
//! Completed payloads are only handed out while the consuming side has focus. Anything
//! finished while unfocused waits in `pending`; regaining focus moves the whole queue
//! into a settle window that is flushed once after `settle_delay`. Losing focus before
//! then puts the window back into `pending`.

use crate::model::Delivery;
use tokio::time::{Duration, Instant};

pub(crate) type Ready = (usize, Delivery);

#[derive(Debug)]
pub(crate) struct FocusGate {
    focused: bool,
    settle_delay: Duration,
    pending: Vec<Ready>,
    settling: Vec<Ready>,
    flush_at: Option<Instant>,
}

impl FocusGate {
    pub fn new(focused: bool, settle_delay: Duration) -> Self {
        Self {
            focused,
            settle_delay,
            pending: Vec::new(),
            settling: Vec::new(),
            flush_at: None,
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Items waiting for focus to return.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flush_at(&self) -> Option<Instant> {
        self.flush_at
    }

    /// Returns the item back when it may be delivered right away, otherwise holds it.
    pub fn offer(&mut self, job: usize, delivery: Delivery) -> Option<Ready> {
        if self.focused {
            Some((job, delivery))
        } else {
            self.pending.push((job, delivery));
            None
        }
    }

    pub fn set_focus(&mut self, focused: bool, now: Instant) {
        let regained = focused && !self.focused;
        let lost = !focused && self.focused;
        self.focused = focused;
        if lost && !self.settling.is_empty() {
            // The window is abandoned; its items wait for the next regain.
            self.settling.append(&mut self.pending);
            self.pending = std::mem::take(&mut self.settling);
            self.flush_at = None;
        }
        if regained && !self.pending.is_empty() {
            self.settling.append(&mut self.pending);
            self.flush_at = Some(now + self.settle_delay);
        }
    }

    /// Drain the settle window once its deadline has passed. Nothing is released unfocused.
    pub fn take_due(&mut self, now: Instant) -> Vec<Ready> {
        match self.flush_at {
            Some(t) if self.focused && t <= now => {
                self.flush_at = None;
                std::mem::take(&mut self.settling)
            }
            _ => Vec::new(),
        }
    }
}
