use std::fmt;

use common_io::DeviceError;

/// Fatal failure of one steady-state stage. Carries the stage name so the
/// exit message and the shutdown log can say which device gave out.
#[derive(Debug)]
pub enum PipelineError {
    Capture(DeviceError),
    Display(DeviceError),
    Record(DeviceError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Capture(_) => "capture",
            PipelineError::Display(_) => "display",
            PipelineError::Record(_) => "record",
        }
    }

    fn cause(&self) -> &DeviceError {
        match self {
            PipelineError::Capture(e)
            | PipelineError::Display(e)
            | PipelineError::Record(e) => e,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage(), self.cause())
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause().as_ref())
    }
}
