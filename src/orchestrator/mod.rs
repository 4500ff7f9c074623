//! Background batch orchestration.
//!
//! This module owns the batch lifecycle (launch, progress, completion) and focus-gated
//! delivery, plus writing delivered results to disk. UI/CLI layers talk to it through
//! `BatchCommand` and `BatchEvent` channels.

mod controller;
mod focus;
mod post_process;
mod worker;

pub(crate) use controller::{run_orchestrator, BatchCommand, BatchOrchestrator};
pub(crate) use post_process::{process_delivery, process_snapshot};
