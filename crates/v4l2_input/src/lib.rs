pub mod capture;
pub mod sys;

pub use capture::{CaptureError, CaptureSession};
