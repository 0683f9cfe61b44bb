use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use common_io::Detector;

use crate::compositor::BoxLayer;
use crate::job::JobSlot;

/// Background thread running detection passes handed over through a
/// [`JobSlot`].
///
/// One worker exists per pipeline. It owns the detector and the box layer:
/// each pass runs on a private scratch copy of the frame, and the results go
/// straight to the overlay plane without involving the capture thread.
pub struct DetectionWorker {
    handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    pub fn spawn(
        job: Arc<JobSlot>,
        mut detector: Box<dyn Detector>,
        mut boxes: BoxLayer,
    ) -> io::Result<DetectionWorker> {
        let handle = thread::Builder::new()
            .name("detect-worker".into())
            .spawn(move || {
                let mut scratch: Vec<u8> = Vec::new();
                while let Some((width, height)) = job.wait_for_job(&mut scratch) {
                    match detector.detect(&scratch, width, height) {
                        Ok(found) => boxes.present(&found),
                        Err(e) => {
                            // A failed pass is not fatal to the pipeline;
                            // drop the stale boxes and move on.
                            eprintln!("detect: pass failed: {}", e);
                            boxes.present(&[]);
                        }
                    }
                    job.finish();
                }
            })?;
        Ok(DetectionWorker {
            handle: Some(handle),
        })
    }

    /// Blocks until the thread exits. Call [`JobSlot::begin_shutdown`] first
    /// or this waits forever.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                eprintln!("detect: worker thread panicked");
            }
        }
    }
}
