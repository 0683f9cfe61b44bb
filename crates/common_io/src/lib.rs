use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    NV12,
    ARGB8,
}

#[derive(Clone, Copy, Debug)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    /// Bytes per luma row as reported by the driver; >= width when rows are padded.
    pub stride_bytes: u32,
    pub frame_idx: u64,
    pub t_capture_ns: u64,
}

/// One camera frame on loan from a FrameSource. The backing buffer belongs to
/// the device; it must be handed back with `enqueue(index)` in the same cycle.
pub struct CapturedFrame<'a> {
    pub meta: FrameMeta,
    pub index: u32,
    pub data: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub score: f32,
    pub class_id: u32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            x1: self.x1.clamp(0, width as i32 - 1),
            y1: self.y1.clamp(0, height as i32 - 1),
            x2: self.x2.clamp(0, width as i32 - 1),
            y2: self.y2.clamp(0, height as i32 - 1),
            ..*self
        }
    }
}

/// Total byte length of a packed NV12 frame: full-res luma plane followed by
/// a half-res interleaved UV plane.
pub fn nv12_frame_len(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}

/// Byte length of an NV12 frame whose rows are padded to `stride` bytes.
pub fn nv12_strided_len(stride: u32, height: u32) -> usize {
    let luma = stride as usize * height as usize;
    luma + luma / 2
}

/// Offset of the interleaved UV plane inside a packed NV12 buffer.
pub fn nv12_chroma_offset(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

pub fn argb_frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

pub type DeviceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Camera-side contract: a pool of >= 2 NV12 buffers cycling through
/// dequeue/enqueue. `Ok(None)` means no frame is ready yet (would block).
pub trait FrameSource {
    fn dequeue(&mut self) -> Result<Option<CapturedFrame<'_>>, DeviceError>;
    fn enqueue(&mut self, index: u32) -> Result<(), DeviceError>;
    fn close(&mut self) -> Result<(), DeviceError>;
}

/// Panel-side contract: a fixed set of NV12 video slots plus, when the
/// hardware has a second plane, one ARGB overlay surface.
pub trait DisplaySink {
    fn slot_count(&self) -> usize;
    fn write_slot(&mut self, slot: usize, nv12: &[u8]) -> Result<(), DeviceError>;
    fn commit(&mut self, slot: usize) -> Result<(), DeviceError>;
    fn wait_vsync(&mut self);
    /// Hand out the overlay capability, once. `None` when the panel has no
    /// second plane; callers degrade to video-only.
    fn take_overlay(&mut self) -> Option<SharedOverlay>;
    fn close(&mut self) -> Result<(), DeviceError>;
}

pub trait OverlayPlane: Send {
    fn dims(&self) -> (u32, u32);
    /// Push a full ARGB surface to the plane and present it.
    fn update(&mut self, argb: &[u8]) -> Result<(), DeviceError>;
}

pub type SharedOverlay = Arc<Mutex<dyn OverlayPlane>>;

pub trait Recorder {
    fn submit(&mut self, nv12: &[u8]) -> Result<(), DeviceError>;
    /// Flushes trailing container metadata. Required for a playable file.
    fn close(&mut self) -> Result<(), DeviceError>;
}

pub trait Detector: Send {
    fn detect(
        &mut self,
        nv12: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DeviceError>;
}
