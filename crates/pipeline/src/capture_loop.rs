use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common_io::{nv12_frame_len, CapturedFrame, DisplaySink, FrameSource, Recorder};
use frame_transform::pack_nv12_rows;
use telemetry::{now_ns, since_ms, StageStats};

use crate::compositor::OverlayCompositor;
use crate::error::PipelineError;
use crate::job::JobSlot;
use crate::pacing::{MonotonicClock, PacingController};
use crate::worker::DetectionWorker;

/// Wait before polling again when the camera has no frame ready.
const EMPTY_RETRY: Duration = Duration::from_millis(5);

#[derive(Default)]
struct LoopTiming {
    dequeue: StageStats,
    handoff: StageStats,
    display: StageStats,
    record: StageStats,
    cycle: StageStats,
}

#[derive(Default)]
struct LoopCounters {
    frames: u64,
    inspected: u64,
    skipped: u64,
    empty_polls: u64,
}

/// Totals for one run, reported after teardown.
#[derive(Clone, Copy, Debug)]
pub struct LoopSummary {
    pub frames: u64,
    pub inspected: u64,
    pub skipped: u64,
    pub empty_polls: u64,
}

/// The per-frame fan-out targets, grouped so a borrowed frame can flow into
/// them while the camera keeps ownership of its buffer.
struct Stages<S: DisplaySink, R: Recorder> {
    compositor: OverlayCompositor<S>,
    recorder: R,
    job: Arc<JobSlot>,
    packed: Vec<u8>,
}

impl<S: DisplaySink, R: Recorder> Stages<S, R> {
    fn run_frame(
        &mut self,
        frame: &CapturedFrame<'_>,
        timing: &mut LoopTiming,
        counters: &mut LoopCounters,
    ) -> Result<(), PipelineError> {
        let width = frame.meta.width;
        let height = frame.meta.height;
        let nominal = nv12_frame_len(width, height);
        let bytes: &[u8] = if frame.meta.stride_bytes == width {
            &frame.data[..nominal]
        } else {
            // Driver pads rows; repack once and fan the tight copy out.
            self.packed.resize(nominal, 0);
            pack_nv12_rows(
                frame.data,
                frame.meta.stride_bytes,
                width,
                height,
                &mut self.packed,
            );
            &self.packed
        };

        // Worker handoff first. When the worker is still busy this frame
        // simply goes uninspected; latest wins, nothing queues up.
        let t = now_ns();
        if self.job.try_submit(bytes, width, height) {
            counters.inspected += 1;
        } else {
            counters.skipped += 1;
        }
        timing.handoff.record(since_ms(t));

        let t = now_ns();
        self.compositor
            .present(bytes, width, height)
            .map_err(PipelineError::Display)?;
        timing.display.record(since_ms(t));

        let t = now_ns();
        self.recorder
            .submit(bytes)
            .map_err(PipelineError::Record)?;
        timing.record.record(since_ms(t));
        Ok(())
    }
}

/// The appliance's steady-state loop: one thread cycling camera buffers
/// through display and recorder at a fixed target rate, with detection
/// running beside it on the worker.
///
/// Each cycle: poll for exit, dequeue a frame, offer it to the worker, show
/// it, record it, hand the buffer back, then sleep off the rest of the frame
/// interval. A display or record failure is fatal, but the camera buffer is
/// returned to the driver before the loop unwinds.
pub struct CaptureLoop<F: FrameSource, S: DisplaySink, R: Recorder> {
    source: F,
    stages: Stages<S, R>,
    worker: Option<DetectionWorker>,
    pacing: PacingController<MonotonicClock>,
    timing: LoopTiming,
    counters: LoopCounters,
    stats_interval: Duration,
}

impl<F: FrameSource, S: DisplaySink, R: Recorder> CaptureLoop<F, S, R> {
    /// `target_fps` of zero disables pacing; `stats_interval` of zero
    /// silences the periodic stats line.
    pub fn new(
        source: F,
        compositor: OverlayCompositor<S>,
        recorder: R,
        job: Arc<JobSlot>,
        worker: DetectionWorker,
        target_fps: u32,
        stats_interval: Duration,
    ) -> CaptureLoop<F, S, R> {
        CaptureLoop {
            source,
            stages: Stages {
                compositor,
                recorder,
                job,
                packed: Vec::new(),
            },
            worker: Some(worker),
            pacing: PacingController::from_fps(target_fps, MonotonicClock),
            timing: LoopTiming::default(),
            counters: LoopCounters::default(),
            stats_interval,
        }
    }

    /// Drive capture cycles until `exit_poll` returns true or a stage fails,
    /// then tear everything down in reverse bring-up order. Teardown runs on
    /// both exits.
    pub fn run(&mut self, mut exit_poll: impl FnMut() -> bool) -> Result<LoopSummary, PipelineError> {
        let outcome = self.drive(&mut exit_poll);
        let teardown = self.teardown();
        outcome?;
        teardown?;
        Ok(self.summary())
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            frames: self.counters.frames,
            inspected: self.counters.inspected,
            skipped: self.counters.skipped,
            empty_polls: self.counters.empty_polls,
        }
    }

    fn drive(&mut self, exit_poll: &mut dyn FnMut() -> bool) -> Result<(), PipelineError> {
        let mut last_stats = Instant::now();
        loop {
            self.pacing.begin_cycle();
            if exit_poll() {
                println!("pipeline: exit requested, shutting down");
                return Ok(());
            }

            let t_cycle = now_ns();
            let t = now_ns();
            let dequeued = self.source.dequeue();
            self.timing.dequeue.record(since_ms(t));
            let frame = match dequeued.map_err(PipelineError::Capture)? {
                Some(frame) => frame,
                None => {
                    self.counters.empty_polls += 1;
                    thread::sleep(EMPTY_RETRY);
                    continue;
                }
            };

            let index = frame.index;
            let outcome = self
                .stages
                .run_frame(&frame, &mut self.timing, &mut self.counters);
            // The buffer goes back to the driver on every path, including
            // after a display or record failure.
            let gave_back = self.source.enqueue(index).map_err(PipelineError::Capture);
            outcome?;
            gave_back?;

            self.counters.frames += 1;
            self.timing.cycle.record(since_ms(t_cycle));

            if !self.stats_interval.is_zero() && last_stats.elapsed() >= self.stats_interval {
                println!(
                    "pipeline: {} frames shown, {} inspected, {} skipped while busy, cycle avg {:.2}ms",
                    self.counters.frames,
                    self.counters.inspected,
                    self.counters.skipped,
                    self.timing.cycle.average_ms()
                );
                last_stats = Instant::now();
            }

            self.pacing.end_cycle();
        }
    }

    /// Reverse bring-up order: stop the worker first, then close the
    /// recorder (the file needs its trailer), the display, and finally the
    /// camera. Later failures are logged but do not mask an earlier one.
    fn teardown(&mut self) -> Result<(), PipelineError> {
        self.stages.job.begin_shutdown();
        if let Some(worker) = self.worker.take() {
            worker.join();
        }

        let mut first_err: Option<PipelineError> = None;
        if let Err(e) = self.stages.recorder.close() {
            eprintln!("record: close failed: {}", e);
            if first_err.is_none() {
                first_err = Some(PipelineError::Record(e));
            }
        }
        if let Err(e) = self.stages.compositor.close() {
            eprintln!("display: close failed: {}", e);
            if first_err.is_none() {
                first_err = Some(PipelineError::Display(e));
            }
        }
        if let Err(e) = self.source.close() {
            eprintln!("capture: close failed: {}", e);
            if first_err.is_none() {
                first_err = Some(PipelineError::Capture(e));
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn print_performance_report(&self) {
        println!("\nPipeline Performance Report");
        println!("================================");
        println!("Frames shown: {}", self.counters.frames);
        println!(
            "Frames inspected: {} (skipped while busy: {})",
            self.counters.inspected, self.counters.skipped
        );
        println!("Empty camera polls: {}", self.counters.empty_polls);
        println!("\nStage latency:");
        println!("  {}", self.timing.dequeue.summary("dequeue"));
        println!("  {}", self.timing.handoff.summary("handoff"));
        println!("  {}", self.timing.display.summary("display"));
        println!("  {}", self.timing.record.summary("record"));
        println!("  {}", self.timing.cycle.summary("cycle"));
    }
}
