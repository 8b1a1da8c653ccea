//! Individual periodic tasks run by the scheduler

pub mod day_finalize;
pub mod stale_sweep;
