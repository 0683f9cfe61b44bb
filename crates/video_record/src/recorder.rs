use common_io::{nv12_frame_len, DeviceError, Recorder};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

#[derive(Debug)]
pub enum RecorderError {
    SpawnFailed(String),
    StdinUnavailable,
    FrameSizeMismatch { expected: usize, actual: usize },
    EncoderExited { code: Option<i32> },
    WriteFailed(String),
    CloseFailed(String),
    SessionClosed,
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::SpawnFailed(msg) => write!(f, "failed to start ffmpeg: {}", msg),
            RecorderError::StdinUnavailable => write!(f, "ffmpeg child has no stdin pipe"),
            RecorderError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "frame is {} bytes but the encoder takes {}",
                actual, expected
            ),
            RecorderError::EncoderExited { code } => match code {
                Some(code) => write!(f, "ffmpeg exited early with status {}", code),
                None => write!(f, "ffmpeg was killed by a signal"),
            },
            RecorderError::WriteFailed(msg) => write!(f, "failed to feed frame to ffmpeg: {}", msg),
            RecorderError::CloseFailed(msg) => write!(f, "failed to finalize recording: {}", msg),
            RecorderError::SessionClosed => write!(f, "recorder is closed"),
        }
    }
}

impl std::error::Error for RecorderError {}

/// Locate the ffmpeg binary: the sidecar-managed copy when present,
/// otherwise whatever `ffmpeg` resolves to on PATH.
fn find_ffmpeg() -> PathBuf {
    let sidecar = ffmpeg_sidecar::paths::ffmpeg_path();
    if sidecar.exists() {
        sidecar
    } else {
        PathBuf::from("ffmpeg")
    }
}

fn build_args(
    width: u32,
    height: u32,
    fps: u32,
    bit_rate: u32,
    max_rate: u32,
    output_path: &str,
) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        // Raw NV12 input from stdin
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "nv12".to_string(),
        "-s".to_string(),
        format!("{}x{}", width, height),
        "-r".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        // Low-latency H.264, tuned like the appliance encoder: tight VBV
        // window, constrained QP band
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-tune".to_string(),
        "zerolatency".to_string(),
        "-profile:v".to_string(),
        "baseline".to_string(),
        "-b:v".to_string(),
        bit_rate.to_string(),
        "-maxrate".to_string(),
        max_rate.to_string(),
        "-bufsize".to_string(),
        max_rate.to_string(),
        "-qmin".to_string(),
        "5".to_string(),
        "-qmax".to_string(),
        "25".to_string(),
        "-pix_fmt".to_string(),
        "nv12".to_string(),
        output_path.to_string(),
    ]
}

/// H.264 MP4 recorder backed by an ffmpeg child process fed over stdin.
/// The file is not playable until `close` runs and the container trailer
/// is written.
pub struct FfmpegRecorder {
    child: Child,
    stdin: Option<ChildStdin>,
    open: bool,
    frame_len: usize,
    frames_submitted: u64,
}

impl FfmpegRecorder {
    pub fn open(
        width: u32,
        height: u32,
        fps: u32,
        bit_rate: u32,
        max_rate: u32,
        output_path: &str,
    ) -> Result<Self, RecorderError> {
        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RecorderError::SpawnFailed(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let args = build_args(width, height, fps, bit_rate, max_rate, output_path);
        let mut child = Command::new(find_ffmpeg())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| RecorderError::SpawnFailed(e.to_string()))?;
        let stdin = child.stdin.take().ok_or(RecorderError::StdinUnavailable)?;

        Ok(FfmpegRecorder {
            child,
            stdin: Some(stdin),
            open: true,
            frame_len: nv12_frame_len(width, height),
            frames_submitted: 0,
        })
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn submit_frame(&mut self, nv12: &[u8]) -> Result<(), RecorderError> {
        if !self.open {
            return Err(RecorderError::SessionClosed);
        }
        if nv12.len() != self.frame_len {
            return Err(RecorderError::FrameSizeMismatch {
                expected: self.frame_len,
                actual: nv12.len(),
            });
        }
        let stdin = self.stdin.as_mut().ok_or(RecorderError::StdinUnavailable)?;
        if let Err(e) = stdin.write_all(nv12) {
            // A broken pipe usually means the encoder died; report its exit
            // status when we can get one.
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(RecorderError::EncoderExited { code: status.code() });
            }
            return Err(RecorderError::WriteFailed(e.to_string()));
        }
        self.frames_submitted += 1;
        Ok(())
    }

    /// Closes stdin and waits for ffmpeg to write the MP4 trailer.
    pub fn finalize(&mut self) -> Result<(), RecorderError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| RecorderError::CloseFailed(e.to_string()))?;
        if !status.success() {
            return Err(RecorderError::CloseFailed(format!(
                "ffmpeg exited with status {}",
                status.code().map_or_else(|| "signal".to_string(), |c| c.to_string())
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.finalize() {
                eprintln!("video_record: {}", e);
            }
        }
    }
}

impl Recorder for FfmpegRecorder {
    fn submit(&mut self, nv12: &[u8]) -> Result<(), DeviceError> {
        self.submit_frame(nv12).map_err(Into::into)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.finalize().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_describe_nv12_stdin_and_x264() {
        let args = build_args(800, 480, 10, 200_000, 4_000_000, "video/output.mp4");
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt nv12 -s 800x480 -r 10 -i -"));
        assert!(joined.contains("-c:v libx264 -preset ultrafast -tune zerolatency"));
        assert!(joined.contains("-b:v 200000 -maxrate 4000000 -bufsize 4000000"));
        assert!(joined.contains("-qmin 5 -qmax 25"));
        assert_eq!(args.last().map(String::as_str), Some("video/output.mp4"));
    }

    #[test]
    fn errors_display() {
        let display = format!("{}", RecorderError::EncoderExited { code: Some(1) });
        assert!(display.contains("status 1"));
        let display = format!("{}", RecorderError::FrameSizeMismatch { expected: 576000, actual: 10 });
        assert!(display.contains("576000"));
    }
}
