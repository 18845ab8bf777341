//! Watch services.

pub mod reconciler;
pub mod scheduler;

pub use reconciler::{reconcile, Reconciliation};
pub use scheduler::{CycleOutcome, CyclePhase, Scheduler, SchedulerConfig};
