//! Steady-state appliance pipeline: one capture thread cycling camera
//! buffers through the panel and the recorder, one background detection
//! worker, and a single-slot job handoff between them.

pub mod capture_loop;
pub mod compositor;
pub mod error;
pub mod job;
pub mod pacing;
pub mod worker;

pub use capture_loop::{CaptureLoop, LoopSummary};
pub use compositor::{BoxLayer, OverlayCompositor};
pub use error::PipelineError;
pub use job::{JobSlot, JobState};
pub use pacing::{Clock, MonotonicClock, PacingController};
pub use worker::DetectionWorker;
