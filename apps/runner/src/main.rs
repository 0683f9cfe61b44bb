//! Appliance runner: load the config, bring the four devices up in order,
//! drive the capture loop until a keypress / Ctrl-C / device failure, then
//! print the run summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common_io::{nv12_frame_len, DisplaySink};
use frame_transform::Rotation;
use overlay_render::BoxMapper;
use panel_output::PanelSession;
use person_detect::NpuDetector;
use pipeline::{BoxLayer, CaptureLoop, DetectionWorker, JobSlot, OverlayCompositor};
use v4l2_input::CaptureSession;
use video_record::FfmpegRecorder;

mod config_loader;

const DEFAULT_CONFIG: &str = "config/default.toml";

/// Raw console mode for the exit-on-any-key check. Switches stdin to
/// non-canonical, no-echo mode and restores the saved termios state on drop,
/// so every exit path puts the console back.
struct RawConsole {
    saved: Option<libc::termios>,
}

impl RawConsole {
    /// A non-tty stdin (service mode) stays untouched; Ctrl-C is then the
    /// only exit request.
    fn new() -> RawConsole {
        let fd = libc::STDIN_FILENO;
        if unsafe { libc::isatty(fd) } != 1 {
            return RawConsole { saved: None };
        }
        let mut term: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut term) } != 0 {
            return RawConsole { saved: None };
        }
        let saved = term;
        term.c_lflag &= !(libc::ICANON | libc::ECHO);
        term.c_cc[libc::VMIN] = 0;
        term.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &term) } != 0 {
            return RawConsole { saved: None };
        }
        RawConsole { saved: Some(saved) }
    }

    /// Zero-timeout readiness check; any byte waiting on stdin means exit.
    fn key_pressed(&self) -> bool {
        if self.saved.is_none() {
            return false;
        }
        let mut fds = libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut fds, 1, 0) };
        if ready <= 0 || fds.revents & libc::POLLIN == 0 {
            return false;
        }
        let mut byte = 0u8;
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
            )
        };
        n > 0
    }
}

impl Drop for RawConsole {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved) };
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG);
    println!("runner: loading {}", config_path);
    let config = config_loader::load_config(config_path)?;

    // Both were validated by the loader; re-derive the typed values here.
    let rotation = Rotation::from_degrees(config.display.rotation)
        .context("panel rotation")?;
    let mapper = BoxMapper::for_rotation(rotation, config.display.width)
        .context("panel box remap")?;

    println!("[1/4] detector: {}", config.detect.model);
    let detector = NpuDetector::open(&config.detect.to_detector_config())
        .context("detector bring-up failed")?;

    println!(
        "[2/4] camera: {} {}x{} ({} buffers)",
        config.camera.device, config.camera.width, config.camera.height, config.camera.buffers
    );
    let camera = CaptureSession::open(
        &config.camera.device,
        config.camera.width,
        config.camera.height,
        config.camera.buffers,
    )
    .context("camera bring-up failed")?;
    let (cam_w, cam_h) = (camera.width(), camera.height());
    if (cam_w, cam_h) != (config.camera.width, config.camera.height) {
        println!("runner: driver adjusted capture to {}x{}", cam_w, cam_h);
    }

    println!(
        "[3/4] display: {}x{} rotated {} deg",
        config.display.width, config.display.height, config.display.rotation
    );
    let mut panel = PanelSession::open(
        &config.display.lib_path,
        config.display.width,
        config.display.height,
    )
    .context("display bring-up failed")?;
    let overlay = if config.display.overlay {
        panel.take_overlay()
    } else {
        None
    };
    if config.display.overlay && overlay.is_none() {
        println!("runner: panel has no overlay plane, detection boxes will not be drawn");
    }

    println!("[4/4] recorder: {}", config.record.output);
    let recorder = FfmpegRecorder::open(
        cam_w,
        cam_h,
        config.record.fps,
        config.record.bit_rate,
        config.record.max_rate,
        &config.record.output,
    )
    .context("recorder bring-up failed")?;

    let compositor = OverlayCompositor::new(
        panel,
        cam_w,
        cam_h,
        config.display.width,
        config.display.height,
        rotation,
    );
    let boxes = BoxLayer::new(overlay, mapper);
    let job = Arc::new(JobSlot::new(nv12_frame_len(cam_w, cam_h)));
    let worker = DetectionWorker::spawn(job.clone(), Box::new(detector), boxes)
        .context("failed to start the detection worker")?;

    let mut driver = CaptureLoop::new(
        camera,
        compositor,
        recorder,
        job,
        worker,
        config.pipeline.target_fps,
        Duration::from_secs(config.pipeline.stats_interval_secs),
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install the SIGINT handler")?;
    }
    let console = RawConsole::new();

    println!(
        "runner: pipeline up, {} fps target; press any key or Ctrl-C to stop",
        config.pipeline.target_fps
    );
    let outcome = driver.run(|| stop.load(Ordering::SeqCst) || console.key_pressed());
    driver.print_performance_report();
    let summary = outcome?;
    println!(
        "runner: clean shutdown after {} frames ({} inspected)",
        summary.frames, summary.inspected
    );
    Ok(())
}
