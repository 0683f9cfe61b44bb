use std::fmt;

#[derive(Debug)]
pub enum DetectError {
    LibraryLoad(String),
    SymbolMissing(&'static str),
    ModelLoad(String),
    SessionClosed,
    InferFailed(i32),
    BadOutputLayout { index: usize, len: usize, expected: usize },
    FrameSizeMismatch { expected: usize, actual: usize },
    ArchiveWrite(String),
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::LibraryLoad(msg) => {
                write!(f, "failed to load NPU runtime library: {}", msg)
            }
            DetectError::SymbolMissing(name) => {
                write!(f, "NPU runtime is missing symbol {}", name)
            }
            DetectError::ModelLoad(msg) => write!(f, "failed to load model: {}", msg),
            DetectError::SessionClosed => write!(f, "detector session is closed"),
            DetectError::InferFailed(rc) => write!(f, "inference run failed (rc={})", rc),
            DetectError::BadOutputLayout { index, len, expected } => write!(
                f,
                "output tensor {} has {} values, expected {}",
                index, len, expected
            ),
            DetectError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "frame is {} bytes but the detector takes {}",
                actual, expected
            ),
            DetectError::ArchiveWrite(msg) => write!(f, "snapshot archive failed: {}", msg),
        }
    }
}

impl std::error::Error for DetectError {}
