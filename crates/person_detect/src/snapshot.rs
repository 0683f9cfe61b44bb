use crate::error::DetectError;
use chrono::Local;
use common_io::{nv12_chroma_offset, nv12_frame_len, BoundingBox};
use image::{Rgb, RgbImage};
use std::path::PathBuf;

const BORDER_PX: i32 = 2;
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 limited-range NV12 to RGB, integer math.
pub fn nv12_to_rgb(nv12: &[u8], width: u32, height: u32) -> Result<RgbImage, DetectError> {
    let expected = nv12_frame_len(width, height);
    if nv12.len() < expected {
        return Err(DetectError::FrameSizeMismatch { expected, actual: nv12.len() });
    }
    let luma = &nv12[..nv12_chroma_offset(width, height)];
    let chroma = &nv12[nv12_chroma_offset(width, height)..];

    let mut img = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let y_val = luma[(y * width + x) as usize] as i32;
            let uv_idx = ((y / 2) * width + (x & !1)) as usize;
            let u = chroma[uv_idx] as i32;
            let v = chroma[uv_idx + 1] as i32;

            let c = y_val - 16;
            let d = u - 128;
            let e = v - 128;
            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;
            img.put_pixel(x, y, Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)]));
        }
    }
    Ok(img)
}

fn put_clipped(img: &mut RgbImage, x: i32, y: i32) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, BOX_COLOR);
    }
}

/// Draw red 2 px rectangle borders into an RGB image, clipping each edge.
pub fn draw_boxes(img: &mut RgbImage, boxes: &[BoundingBox]) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    for b in boxes {
        for t in 0..BORDER_PX {
            for x in b.x1.max(0)..=b.x2.min(w - 1) {
                put_clipped(img, x, b.y1 + t);
                put_clipped(img, x, b.y2 - t);
            }
            for y in b.y1.max(0)..=b.y2.min(h - 1) {
                put_clipped(img, b.x1 + t, y);
                put_clipped(img, b.x2 - t, y);
            }
        }
    }
}

/// JPEG archive of detection hits. Filenames carry one-second resolution;
/// repeated hits within the same second are skipped instead of re-encoded.
pub struct SnapshotArchive {
    dir: PathBuf,
    last_name: Option<String>,
}

impl SnapshotArchive {
    pub fn create(dir: &str) -> Result<Self, DetectError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| DetectError::ArchiveWrite(format!("{}: {}", dir, e)))?;
        Ok(SnapshotArchive { dir: PathBuf::from(dir), last_name: None })
    }

    pub fn archive(
        &mut self,
        nv12: &[u8],
        width: u32,
        height: u32,
        boxes: &[BoundingBox],
    ) -> Result<Option<PathBuf>, DetectError> {
        let name = format!("det_{}.jpg", Local::now().format("%Y%m%d_%H%M%S"));
        self.archive_named(&name, nv12, width, height, boxes)
    }

    fn archive_named(
        &mut self,
        name: &str,
        nv12: &[u8],
        width: u32,
        height: u32,
        boxes: &[BoundingBox],
    ) -> Result<Option<PathBuf>, DetectError> {
        if self.last_name.as_deref() == Some(name) {
            return Ok(None);
        }
        let mut img = nv12_to_rgb(nv12, width, height)?;
        draw_boxes(&mut img, boxes);
        let path = self.dir.join(name);
        img.save(&path)
            .map_err(|e| DetectError::ArchiveWrite(format!("{}: {}", path.display(), e)))?;
        self.last_name = Some(name.to_string());
        Ok(Some(path))
    }
}
