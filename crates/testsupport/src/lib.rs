//! Shared test doubles for the device traits, plus NV12 fixtures.
//!
//! Every mock logs what happened to it into a [`Trace`] handed in at
//! construction, so a test can move the mocks into the pipeline and still
//! inspect the combined event order afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common_io::{
    nv12_frame_len, nv12_strided_len, BoundingBox, CapturedFrame, DeviceError, Detector,
    DisplaySink, FrameMeta, FrameSource, OverlayPlane, Recorder, SharedOverlay,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Dequeue(u32),
    DequeueEmpty,
    Enqueue(u32),
    SourceClosed,
    SlotWrite(usize),
    SlotCommit(usize),
    Vsync,
    SinkClosed,
    RecordSubmit,
    RecorderClosed,
    Detect { width: u32, height: u32 },
}

/// Shared, ordered log of everything the mocks saw.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<Event>>>);

impl Trace {
    pub fn new() -> Trace {
        Trace::default()
    }

    pub fn push(&self, e: Event) {
        self.0.lock().unwrap().push(e);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Just the close events, in the order they happened.
    pub fn close_order(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::SourceClosed | Event::SinkClosed | Event::RecorderClosed
                )
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

/// What the next `dequeue` call should do.
#[derive(Clone, Copy, Debug)]
pub enum SourceStep {
    Frame,
    Empty,
    FailDequeue,
}

/// Scriptable camera double with a real buffer pool: indices cycle through
/// dequeue/enqueue exactly like driver-owned memory, so leak and
/// double-enqueue bugs show up in the trace.
pub struct MockSource {
    frames: Vec<Vec<u8>>,
    width: u32,
    height: u32,
    stride: u32,
    queued: VecDeque<u32>,
    script: VecDeque<SourceStep>,
    fail_enqueue_on: Option<usize>,
    enqueue_calls: usize,
    frame_idx: u64,
    trace: Trace,
    closed: bool,
}

impl MockSource {
    pub fn new(width: u32, height: u32, buffers: usize, trace: Trace) -> MockSource {
        let frames = (0..buffers)
            .map(|i| nv12_gray(width, height, 0x40 + (i as u8) * 8))
            .collect();
        MockSource {
            frames,
            width,
            height,
            stride: width,
            queued: (0..buffers as u32).collect(),
            script: VecDeque::new(),
            fail_enqueue_on: None,
            enqueue_calls: 0,
            frame_idx: 0,
            trace,
            closed: false,
        }
    }

    /// Pad luma rows out to `stride` bytes, like a driver that rounds row
    /// pitch up.
    pub fn with_stride(mut self, stride: u32) -> MockSource {
        self.stride = stride;
        for (i, frame) in self.frames.iter_mut().enumerate() {
            *frame = nv12_gray_strided(self.width, self.height, stride, 0x40 + (i as u8) * 8);
        }
        self
    }

    pub fn script(mut self, steps: Vec<SourceStep>) -> MockSource {
        self.script = steps.into();
        self
    }

    /// Fail the `call`-th enqueue (zero-based).
    pub fn with_enqueue_failure(mut self, call: usize) -> MockSource {
        self.fail_enqueue_on = Some(call);
        self
    }

    /// Buffers currently out with the caller.
    pub fn outstanding(&self) -> usize {
        self.frames.len() - self.queued.len()
    }
}

impl FrameSource for MockSource {
    fn dequeue(&mut self) -> Result<Option<CapturedFrame<'_>>, DeviceError> {
        match self.script.pop_front().unwrap_or(SourceStep::Frame) {
            SourceStep::Empty => {
                self.trace.push(Event::DequeueEmpty);
                Ok(None)
            }
            SourceStep::FailDequeue => Err("injected dequeue failure".into()),
            SourceStep::Frame => {
                let index = match self.queued.pop_front() {
                    Some(i) => i,
                    None => {
                        self.trace.push(Event::DequeueEmpty);
                        return Ok(None);
                    }
                };
                self.trace.push(Event::Dequeue(index));
                self.frame_idx += 1;
                let meta = FrameMeta {
                    width: self.width,
                    height: self.height,
                    stride_bytes: self.stride,
                    frame_idx: self.frame_idx,
                    t_capture_ns: 0,
                };
                Ok(Some(CapturedFrame {
                    meta,
                    index,
                    data: &self.frames[index as usize],
                }))
            }
        }
    }

    fn enqueue(&mut self, index: u32) -> Result<(), DeviceError> {
        let call = self.enqueue_calls;
        self.enqueue_calls += 1;
        self.trace.push(Event::Enqueue(index));
        if self.fail_enqueue_on == Some(call) {
            return Err("injected enqueue failure".into());
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.closed {
            self.closed = true;
            self.trace.push(Event::SourceClosed);
        }
        Ok(())
    }
}

pub type SurfaceLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// Overlay double that keeps every surface pushed to it.
pub struct MockOverlay {
    width: u32,
    height: u32,
    surfaces: SurfaceLog,
}

impl MockOverlay {
    pub fn shared(width: u32, height: u32) -> (SharedOverlay, SurfaceLog) {
        let surfaces: SurfaceLog = Arc::new(Mutex::new(Vec::new()));
        let plane: SharedOverlay = Arc::new(Mutex::new(MockOverlay {
            width,
            height,
            surfaces: surfaces.clone(),
        }));
        (plane, surfaces)
    }
}

impl OverlayPlane for MockOverlay {
    fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn update(&mut self, argb: &[u8]) -> Result<(), DeviceError> {
        self.surfaces.lock().unwrap().push(argb.to_vec());
        Ok(())
    }
}

/// Panel double with a fixed slot count and scriptable commit failures.
pub struct MockSink {
    slots: usize,
    expected_len: Option<usize>,
    commit_calls: usize,
    fail_commit_on: Option<usize>,
    overlay: Option<SharedOverlay>,
    overlay_surfaces: Option<SurfaceLog>,
    trace: Trace,
    closed: bool,
}

impl MockSink {
    pub fn new(slots: usize, trace: Trace) -> MockSink {
        MockSink {
            slots,
            expected_len: None,
            commit_calls: 0,
            fail_commit_on: None,
            overlay: None,
            overlay_surfaces: None,
            trace,
            closed: false,
        }
    }

    /// Fail the `call`-th commit (zero-based).
    pub fn with_commit_failure(mut self, call: usize) -> MockSink {
        self.fail_commit_on = Some(call);
        self
    }

    /// Reject writes whose length differs from `len`.
    pub fn with_expected_len(mut self, len: usize) -> MockSink {
        self.expected_len = Some(len);
        self
    }

    pub fn with_overlay(mut self, width: u32, height: u32) -> MockSink {
        let (plane, surfaces) = MockOverlay::shared(width, height);
        self.overlay = Some(plane);
        self.overlay_surfaces = Some(surfaces);
        self
    }

    /// Grab the surface log before the sink moves into the pipeline.
    pub fn overlay_surfaces(&self) -> Option<SurfaceLog> {
        self.overlay_surfaces.clone()
    }
}

impl DisplaySink for MockSink {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn write_slot(&mut self, slot: usize, nv12: &[u8]) -> Result<(), DeviceError> {
        if slot >= self.slots {
            return Err(format!("write to slot {} of {}", slot, self.slots).into());
        }
        if let Some(expected) = self.expected_len {
            if nv12.len() != expected {
                return Err(format!(
                    "slot write of {} bytes, panel takes {}",
                    nv12.len(),
                    expected
                )
                .into());
            }
        }
        self.trace.push(Event::SlotWrite(slot));
        Ok(())
    }

    fn commit(&mut self, slot: usize) -> Result<(), DeviceError> {
        let call = self.commit_calls;
        self.commit_calls += 1;
        if self.fail_commit_on == Some(call) {
            return Err("injected commit failure".into());
        }
        self.trace.push(Event::SlotCommit(slot));
        Ok(())
    }

    fn wait_vsync(&mut self) {
        self.trace.push(Event::Vsync);
    }

    fn take_overlay(&mut self) -> Option<SharedOverlay> {
        self.overlay.take()
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.closed {
            self.closed = true;
            self.trace.push(Event::SinkClosed);
        }
        Ok(())
    }
}

/// Recorder double counting submits, with scriptable submit failures.
pub struct MockRecorder {
    expected_len: Option<usize>,
    submit_calls: usize,
    fail_submit_on: Option<usize>,
    trace: Trace,
    closed: bool,
}

impl MockRecorder {
    pub fn new(trace: Trace) -> MockRecorder {
        MockRecorder {
            expected_len: None,
            submit_calls: 0,
            fail_submit_on: None,
            trace,
            closed: false,
        }
    }

    /// Fail the `call`-th submit (zero-based).
    pub fn with_submit_failure(mut self, call: usize) -> MockRecorder {
        self.fail_submit_on = Some(call);
        self
    }

    pub fn with_expected_len(mut self, len: usize) -> MockRecorder {
        self.expected_len = Some(len);
        self
    }
}

impl Recorder for MockRecorder {
    fn submit(&mut self, nv12: &[u8]) -> Result<(), DeviceError> {
        let call = self.submit_calls;
        self.submit_calls += 1;
        if self.fail_submit_on == Some(call) {
            return Err("injected encoder failure".into());
        }
        if let Some(expected) = self.expected_len {
            if nv12.len() != expected {
                return Err(format!(
                    "submit of {} bytes, encoder takes {}",
                    nv12.len(),
                    expected
                )
                .into());
            }
        }
        self.trace.push(Event::RecordSubmit);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.closed {
            self.closed = true;
            self.trace.push(Event::RecorderClosed);
        }
        Ok(())
    }
}

/// Detector double replaying canned results, optionally holding each pass
/// for a while so busy-worker paths can be exercised.
pub struct MockDetector {
    results: VecDeque<Vec<BoundingBox>>,
    hold: Duration,
    trace: Trace,
}

impl MockDetector {
    pub fn new(trace: Trace) -> MockDetector {
        MockDetector {
            results: VecDeque::new(),
            hold: Duration::ZERO,
            trace,
        }
    }

    /// Results for successive passes; later passes report nothing found.
    pub fn with_results(mut self, results: Vec<Vec<BoundingBox>>) -> MockDetector {
        self.results = results.into();
        self
    }

    pub fn with_hold(mut self, hold: Duration) -> MockDetector {
        self.hold = hold;
        self
    }
}

impl Detector for MockDetector {
    fn detect(
        &mut self,
        _nv12: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DeviceError> {
        self.trace.push(Event::Detect { width, height });
        if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
        Ok(self.results.pop_front().unwrap_or_default())
    }
}

/// Packed NV12 frame with uniform luma and neutral chroma.
pub fn nv12_gray(width: u32, height: u32, luma: u8) -> Vec<u8> {
    let mut buf = vec![128u8; nv12_frame_len(width, height)];
    buf[..(width * height) as usize].fill(luma);
    buf
}

/// Strided NV12 frame: luma rows padded to `stride` bytes with zeros.
pub fn nv12_gray_strided(width: u32, height: u32, stride: u32, luma: u8) -> Vec<u8> {
    let mut buf = vec![0u8; nv12_strided_len(stride, height)];
    for y in 0..height as usize {
        let row = y * stride as usize;
        buf[row..row + width as usize].fill(luma);
    }
    let chroma_base = stride as usize * height as usize;
    for y in 0..(height / 2) as usize {
        let row = chroma_base + y * stride as usize;
        buf[row..row + width as usize].fill(128);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_pool_cycles_indices() {
        let trace = Trace::new();
        let mut src = MockSource::new(4, 2, 2, trace.clone());
        let first = {
            let f = src.dequeue().unwrap().unwrap();
            f.index
        };
        src.enqueue(first).unwrap();
        let second = {
            let f = src.dequeue().unwrap().unwrap();
            f.index
        };
        assert_ne!(first, second);
        assert_eq!(src.outstanding(), 1);
        assert_eq!(
            trace.events(),
            vec![
                Event::Dequeue(first),
                Event::Enqueue(first),
                Event::Dequeue(second)
            ]
        );
    }

    #[test]
    fn strided_fixture_pads_rows() {
        let buf = nv12_gray_strided(4, 2, 8, 0x50);
        assert_eq!(buf.len(), nv12_strided_len(8, 2));
        assert_eq!(&buf[0..4], &[0x50; 4]);
        assert_eq!(&buf[4..8], &[0; 4]);
    }
}
