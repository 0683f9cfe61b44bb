use common_io::{argb_frame_len, nv12_frame_len, BoundingBox, DeviceError, DisplaySink, SharedOverlay};
use frame_transform::{rotate_scale_letterbox, Rotation};
use overlay_render::{clear, draw_rect_border, rect_outside, BoxMapper, BOX_BORDER_PX, BOX_COLOR};

enum WritePath {
    /// Camera geometry equals panel geometry; bytes go straight into the slot.
    Direct,
    /// Rotate, scale and letterbox into a staging frame first.
    Transform { rotation: Rotation, staged: Vec<u8> },
}

/// Owns the display's video plane and the swap-chain cursor.
///
/// Writes always target the slot after the one last presented, and the
/// cursor advances only after the commit for the new slot has returned
/// success, so a failed commit never abandons the image currently on screen.
pub struct OverlayCompositor<S: DisplaySink> {
    sink: S,
    slot_count: usize,
    current: usize,
    panel_w: u32,
    panel_h: u32,
    path: WritePath,
}

impl<S: DisplaySink> OverlayCompositor<S> {
    /// The write path is fixed here, once: frames copy straight through when
    /// the camera already matches the panel, and go through the resampler
    /// otherwise.
    pub fn new(
        sink: S,
        camera_w: u32,
        camera_h: u32,
        panel_w: u32,
        panel_h: u32,
        rotation: Rotation,
    ) -> OverlayCompositor<S> {
        let path = if rotation == Rotation::R0 && (camera_w, camera_h) == (panel_w, panel_h) {
            WritePath::Direct
        } else {
            WritePath::Transform {
                rotation,
                staged: vec![0u8; nv12_frame_len(panel_w, panel_h)],
            }
        };
        let slot_count = sink.slot_count();
        OverlayCompositor {
            sink,
            slot_count,
            current: 0,
            panel_w,
            panel_h,
            path,
        }
    }

    /// Push one packed NV12 camera frame through the swap chain: write the
    /// next slot, commit it, wait for vsync, then advance the cursor.
    pub fn present(&mut self, nv12: &[u8], width: u32, height: u32) -> Result<(), DeviceError> {
        let next = (self.current + 1) % self.slot_count;
        match &mut self.path {
            WritePath::Direct => self.sink.write_slot(next, nv12)?,
            WritePath::Transform { rotation, staged } => {
                rotate_scale_letterbox(nv12, width, height, staged, self.panel_w, self.panel_h, *rotation);
                self.sink.write_slot(next, staged)?;
            }
        }
        self.sink.commit(next)?;
        self.sink.wait_vsync();
        self.current = next;
        Ok(())
    }

    /// Hand out the panel's box plane, once. `None` when the panel has only
    /// the video plane.
    pub fn take_overlay(&mut self) -> Option<SharedOverlay> {
        self.sink.take_overlay()
    }

    pub fn close(&mut self) -> Result<(), DeviceError> {
        self.sink.close()
    }
}

/// Owns the optional ARGB box plane, drawn from the detection worker.
///
/// When the panel has no second plane every call is a no-op and detection
/// results are simply not shown.
pub struct BoxLayer {
    overlay: Option<SharedOverlay>,
    mapper: BoxMapper,
    surface: Vec<u8>,
    width: u32,
    height: u32,
}

impl BoxLayer {
    pub fn new(overlay: Option<SharedOverlay>, mapper: BoxMapper) -> BoxLayer {
        let (width, height) = match &overlay {
            Some(plane) => plane.lock().unwrap().dims(),
            None => (0, 0),
        };
        BoxLayer {
            overlay,
            mapper,
            surface: vec![0u8; argb_frame_len(width, height)],
            width,
            height,
        }
    }

    /// Redraw the plane from scratch with the given boxes; an empty slice
    /// clears it. A box that remaps entirely off the panel is logged and
    /// skipped; a partially visible box draws its visible edges.
    pub fn present(&mut self, boxes: &[BoundingBox]) {
        let overlay = match &self.overlay {
            Some(o) => o,
            None => return,
        };
        clear(&mut self.surface);
        for b in boxes {
            let rect = self.mapper.remap(b);
            if rect_outside(rect, self.width, self.height) {
                eprintln!(
                    "overlay: box ({},{})-({},{}) maps off panel, skipped",
                    b.x1, b.y1, b.x2, b.y2
                );
                continue;
            }
            draw_rect_border(
                &mut self.surface,
                self.width,
                self.height,
                rect,
                BOX_BORDER_PX,
                BOX_COLOR,
            );
        }
        let mut plane = overlay.lock().unwrap();
        if let Err(e) = plane.update(&self.surface) {
            eprintln!("overlay: update failed: {}", e);
        }
    }
}
