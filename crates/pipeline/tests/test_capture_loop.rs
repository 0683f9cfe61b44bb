use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common_io::{nv12_frame_len, BoundingBox, DisplaySink};
use frame_transform::Rotation;
use overlay_render::BoxMapper;
use pipeline::{BoxLayer, CaptureLoop, DetectionWorker, JobSlot, OverlayCompositor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use testsupport::{Event, MockDetector, MockRecorder, MockSink, MockSource, SourceStep, Trace};

fn build(
    source: MockSource,
    mut sink: MockSink,
    recorder: MockRecorder,
    detector: MockDetector,
    width: u32,
    height: u32,
) -> CaptureLoop<MockSource, MockSink, MockRecorder> {
    let overlay = sink.take_overlay();
    let compositor = OverlayCompositor::new(sink, width, height, width, height, Rotation::R0);
    let boxes = BoxLayer::new(overlay, BoxMapper::Passthrough);
    let job = Arc::new(JobSlot::new(nv12_frame_len(width, height)));
    let worker = DetectionWorker::spawn(job.clone(), Box::new(detector), boxes).unwrap();
    CaptureLoop::new(source, compositor, recorder, job, worker, 0, Duration::ZERO)
}

fn after(cycles: usize) -> impl FnMut() -> bool {
    let mut polls = 0;
    move || {
        polls += 1;
        polls > cycles
    }
}

fn boxed(x1: i32, y1: i32, x2: i32, y2: i32) -> BoundingBox {
    BoundingBox {
        x1,
        y1,
        x2,
        y2,
        score: 0.9,
        class_id: 0,
    }
}

fn dequeues_and_enqueues(trace: &Trace) -> (Vec<u32>, Vec<u32>) {
    let events = trace.events();
    let dequeued = events
        .iter()
        .filter_map(|e| match e {
            Event::Dequeue(i) => Some(*i),
            _ => None,
        })
        .collect();
    let enqueued = events
        .iter()
        .filter_map(|e| match e {
            Event::Enqueue(i) => Some(*i),
            _ => None,
        })
        .collect();
    (dequeued, enqueued)
}

#[test]
fn frames_flow_to_panel_and_recorder() {
    let trace = Trace::new();
    let len = nv12_frame_len(16, 8);
    let source = MockSource::new(16, 8, 4, trace.clone());
    let sink = MockSink::new(3, trace.clone()).with_expected_len(len);
    let recorder = MockRecorder::new(trace.clone()).with_expected_len(len);
    let detector = MockDetector::new(trace.clone());

    let mut lp = build(source, sink, recorder, detector, 16, 8);
    let summary = lp.run(after(5)).unwrap();

    assert_eq!(summary.frames, 5);
    let writes: Vec<usize> = trace
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::SlotWrite(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![1, 2, 0, 1, 2]);
    assert_eq!(trace.count(|e| matches!(e, Event::RecordSubmit)), 5);
    let (dequeued, enqueued) = dequeues_and_enqueues(&trace);
    assert_eq!(dequeued, enqueued);
}

#[test]
fn strided_frames_are_packed_before_fanout() {
    let trace = Trace::new();
    let len = nv12_frame_len(16, 8);
    let source = MockSource::new(16, 8, 4, trace.clone()).with_stride(24);
    let sink = MockSink::new(3, trace.clone()).with_expected_len(len);
    let recorder = MockRecorder::new(trace.clone()).with_expected_len(len);
    let detector = MockDetector::new(trace.clone());

    let mut lp = build(source, sink, recorder, detector, 16, 8);
    let summary = lp.run(after(3)).unwrap();
    assert_eq!(summary.frames, 3);
}

#[test]
fn display_failure_is_fatal_and_still_returns_the_buffer() {
    let trace = Trace::new();
    let source = MockSource::new(8, 4, 3, trace.clone());
    let sink = MockSink::new(3, trace.clone()).with_commit_failure(2);
    let recorder = MockRecorder::new(trace.clone());
    let detector = MockDetector::new(trace.clone());

    let mut lp = build(source, sink, recorder, detector, 8, 4);
    let err = lp.run(after(100)).unwrap_err();
    assert_eq!(err.stage(), "display");

    let (dequeued, enqueued) = dequeues_and_enqueues(&trace);
    assert_eq!(dequeued.len(), 3);
    assert_eq!(dequeued, enqueued);
    assert_eq!(
        trace.close_order(),
        vec![Event::RecorderClosed, Event::SinkClosed, Event::SourceClosed]
    );
}

#[test]
fn encoder_failure_is_fatal_and_still_returns_the_buffer() {
    let trace = Trace::new();
    let source = MockSource::new(8, 4, 3, trace.clone());
    let sink = MockSink::new(3, trace.clone());
    let recorder = MockRecorder::new(trace.clone()).with_submit_failure(1);
    let detector = MockDetector::new(trace.clone());

    let mut lp = build(source, sink, recorder, detector, 8, 4);
    let err = lp.run(after(100)).unwrap_err();
    assert_eq!(err.stage(), "record");

    let (dequeued, enqueued) = dequeues_and_enqueues(&trace);
    assert_eq!(dequeued.len(), 2);
    assert_eq!(dequeued, enqueued);
}

#[test]
fn empty_polls_sleep_and_retry() {
    let trace = Trace::new();
    let source = MockSource::new(8, 4, 3, trace.clone())
        .script(vec![SourceStep::Empty, SourceStep::Empty]);
    let sink = MockSink::new(3, trace.clone());
    let recorder = MockRecorder::new(trace.clone());
    let detector = MockDetector::new(trace.clone());

    let mut lp = build(source, sink, recorder, detector, 8, 4);
    let summary = lp.run(after(4)).unwrap();
    assert_eq!(summary.empty_polls, 2);
    assert_eq!(summary.frames, 2);
}

#[test]
fn busy_worker_skips_detection_but_frames_still_flow() {
    let trace = Trace::new();
    let source = MockSource::new(8, 4, 3, trace.clone());
    let sink = MockSink::new(3, trace.clone());
    let recorder = MockRecorder::new(trace.clone());
    let detector = MockDetector::new(trace.clone())
        .with_results(vec![vec![boxed(1, 1, 4, 4)]])
        .with_hold(Duration::from_millis(300));

    let mut lp = build(source, sink, recorder, detector, 8, 4);
    let summary = lp.run(after(3)).unwrap();

    // The worker held the slot Busy across all three cycles, so only the
    // first frame was inspected; display and recorder saw every frame.
    assert_eq!(summary.inspected, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(trace.count(|e| matches!(e, Event::Detect { .. })), 1);
    assert_eq!(trace.count(|e| matches!(e, Event::SlotWrite(_))), 3);
    assert_eq!(trace.count(|e| matches!(e, Event::RecordSubmit)), 3);
}

#[test]
fn detection_results_reach_the_overlay() {
    let trace = Trace::new();
    let source = MockSource::new(32, 32, 4, trace.clone());
    let sink = MockSink::new(3, trace.clone()).with_overlay(32, 32);
    let surfaces = sink.overlay_surfaces().unwrap();
    let recorder = MockRecorder::new(trace.clone());
    let detector =
        MockDetector::new(trace.clone()).with_results(vec![vec![boxed(4, 4, 12, 12)], vec![]]);

    let mut lp = build(source, sink, recorder, detector, 32, 32);
    // Space the cycles out so each pass finishes before the next frame.
    let mut polls = 0;
    let summary = lp
        .run(move || {
            thread::sleep(Duration::from_millis(15));
            polls += 1;
            polls > 2
        })
        .unwrap();

    assert_eq!(summary.inspected, 2);
    let log = surfaces.lock().unwrap();
    assert_eq!(log.len(), 2);
    // First pass drew a border pixel at the box corner; second pass found
    // nothing and cleared the plane.
    let corner = (4 * 32 + 4) * 4;
    assert_eq!(&log[0][corner..corner + 4], &[0xFF, 0xFF, 0x00, 0x00]);
    assert!(log[0].iter().any(|&b| b != 0));
    assert!(log[1].iter().all(|&b| b == 0));
}

#[test]
fn clean_exit_closes_devices_in_reverse_bringup_order() {
    let trace = Trace::new();
    let source = MockSource::new(8, 4, 3, trace.clone());
    let sink = MockSink::new(3, trace.clone());
    let recorder = MockRecorder::new(trace.clone());
    let detector = MockDetector::new(trace.clone());

    let mut lp = build(source, sink, recorder, detector, 8, 4);
    lp.run(after(1)).unwrap();
    assert_eq!(
        trace.close_order(),
        vec![Event::RecorderClosed, Event::SinkClosed, Event::SourceClosed]
    );
}

#[test]
fn buffer_conservation_under_randomized_failures() {
    let mut rng = StdRng::seed_from_u64(0x5EED_CA11);
    let mut total_cycles = 0u64;

    while total_cycles < 1000 {
        let trace = Trace::new();
        let budget = rng.gen_range(10..40usize);
        let mut steps = Vec::with_capacity(budget);
        for _ in 0..budget {
            let roll: f32 = rng.gen();
            steps.push(if roll < 0.12 {
                SourceStep::Empty
            } else if roll < 0.16 {
                SourceStep::FailDequeue
            } else {
                SourceStep::Frame
            });
        }
        let mut source = MockSource::new(8, 4, 3, trace.clone()).script(steps);
        if rng.gen_bool(0.2) {
            source = source.with_enqueue_failure(rng.gen_range(0..budget));
        }
        let mut sink = MockSink::new(3, trace.clone());
        if rng.gen_bool(0.35) {
            sink = sink.with_commit_failure(rng.gen_range(0..budget));
        }
        let mut recorder = MockRecorder::new(trace.clone());
        if rng.gen_bool(0.35) {
            recorder = recorder.with_submit_failure(rng.gen_range(0..budget));
        }
        let detector = MockDetector::new(trace.clone());

        let mut lp = build(source, sink, recorder, detector, 8, 4);
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let _ = lp.run(move || counter.fetch_add(1, Ordering::Relaxed) + 1 > budget);

        let (dequeued, enqueued) = dequeues_and_enqueues(&trace);
        assert_eq!(
            dequeued, enqueued,
            "every dequeued buffer comes back exactly once, in order"
        );
        total_cycles += polls.load(Ordering::Relaxed) as u64;
    }
}
