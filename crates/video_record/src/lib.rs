pub mod recorder;

pub use recorder::{FfmpegRecorder, RecorderError};
