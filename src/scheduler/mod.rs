//! In-process scheduling
//!
//! Periodic schedules for the pipeline entry points, reconciled explicitly
//! from the persisted configuration rather than as a side effect of saving
//! records.

mod cron;
mod reconcile;

pub use cron::*;
pub use reconcile::*;
