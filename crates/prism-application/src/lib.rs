//! Application layer for Prism.
//!
//! [`GenerationOrchestrator`] drives one prompt from validation through the
//! optimistic placeholder, the remote call, and persistence, and schedules
//! the best-effort follow-ups (summary, title, usage data, balance) on a
//! [`BackgroundTasks`] registry.

pub mod background;
mod context;
mod enrichment;
pub mod orchestrator;

pub use background::{BackgroundTasks, TaskKey, TaskKind};
pub use orchestrator::{
    GenerationOrchestrator, GenerationOutcome, GenerationSettings, RegenerateMode,
};
