//! Monotonic time helpers and per-stage latency accumulation, used for the
//! loop's periodic stats line and the shutdown summary.

mod stats;
mod time;

pub use stats::StageStats;
pub use time::{now_ns, since_ms};
