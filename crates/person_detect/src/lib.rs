pub mod decode;
pub mod detector;
pub mod error;
pub mod nms;
pub mod npu;
pub mod snapshot;

pub use detector::{DetectorConfig, NpuDetector, SCALE_STRIDES};
pub use error::DetectError;
pub use nms::non_max_suppress;
pub use npu::NpuRuntime;
pub use snapshot::SnapshotArchive;
