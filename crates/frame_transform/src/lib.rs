//! Geometric NV12 resampler for the panel write path: rotate by a right
//! angle, scale preserving aspect ratio, and letterbox into a fixed-size
//! destination. Integer fixed-point throughout; no allocation.

const SHIFT: u32 = 20;
const HALF: i64 = 1 << (SHIFT - 1);
const SCALE_ONE: i64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn from_degrees(deg: u32) -> Option<Rotation> {
        match deg {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Source extent as seen after rotation (width/height swap for 90/270).
    pub fn logical_extent(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::R0 | Rotation::R180 => (width, height),
            Rotation::R90 | Rotation::R270 => (height, width),
        }
    }
}

/// Scaled extent and centering offsets for fitting a rotated `src_w`×`src_h`
/// frame inside `dst_w`×`dst_h`. All values forced even for 4:2:0 alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitGeometry {
    pub scaled_w: i32,
    pub scaled_h: i32,
    pub start_x: i32,
    pub start_y: i32,
}

pub fn fit_geometry(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, rotation: Rotation) -> FitGeometry {
    let (lw, lh) = rotation.logical_extent(src_w & !1, src_h & !1);
    let (lw, lh) = (lw as i64, lh as i64);
    let dw = (dst_w & !1) as i64;
    let dh = (dst_h & !1) as i64;

    let scale_x = dw * SCALE_ONE / lw;
    let scale_y = dh * SCALE_ONE / lh;
    let scale = scale_x.min(scale_y);
    let scaled_w = ((scale * lw / SCALE_ONE) as i32) & !1;
    let scaled_h = ((scale * lh / SCALE_ONE) as i32) & !1;

    FitGeometry {
        scaled_w,
        scaled_h,
        start_x: ((dw as i32 - scaled_w) / 2) & !1,
        start_y: ((dh as i32 - scaled_h) / 2) & !1,
    }
}

/// Resample a packed NV12 frame into `dst`: rotate, scale to fit, letterbox.
///
/// The destination is fully initialized first (luma 0, chroma 128), so the
/// letterbox border is black. Coordinate math is 20-bit fixed point with
/// rounding at the final shift, which makes an unscaled, unrotated pass
/// reproduce the source bytes exactly. Chroma is sampled only at even
/// destination coordinates, keeping 4:2:0 pair alignment.
pub fn rotate_scale_letterbox(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    rotation: Rotation,
) {
    let width = (src_w & !1) as i64;
    let height = (src_h & !1) as i64;
    let screen_w = (dst_w & !1) as usize;
    let screen_h = (dst_h & !1) as usize;
    if width <= 0 || height <= 0 || screen_w == 0 || screen_h == 0 {
        return;
    }
    let src_luma_len = (width * height) as usize;
    if src.len() < src_luma_len + src_luma_len / 2
        || dst.len() < screen_w * screen_h * 3 / 2
    {
        return;
    }

    let (dst_luma, dst_chroma) = dst.split_at_mut(screen_w * screen_h);
    dst_luma[..screen_w * screen_h].fill(0);
    dst_chroma[..screen_w * screen_h / 2].fill(128);

    let geo = fit_geometry(src_w, src_h, dst_w, dst_h, rotation);
    let (src_luma, src_chroma) = src.split_at(src_luma_len);

    for dy in 0..geo.scaled_h as i64 {
        let v = dy * (1 << SHIFT) / geo.scaled_h as i64;
        let out_row = (geo.start_y as i64 + dy) as usize;
        for dx in 0..geo.scaled_w as i64 {
            let u = dx * (1 << SHIFT) / geo.scaled_w as i64;

            let (x_orig, y_orig) = match rotation {
                Rotation::R0 => ((u * width + HALF) >> SHIFT, (v * height + HALF) >> SHIFT),
                Rotation::R90 => (
                    (v * width + HALF) >> SHIFT,
                    height - 1 - ((u * height + HALF) >> SHIFT),
                ),
                Rotation::R180 => (
                    width - 1 - ((u * width + HALF) >> SHIFT),
                    height - 1 - ((v * height + HALF) >> SHIFT),
                ),
                Rotation::R270 => (
                    width - 1 - ((v * width + HALF) >> SHIFT),
                    (u * height + HALF) >> SHIFT,
                ),
            };
            let x_orig = x_orig.clamp(0, width - 1) as usize;
            let y_orig = y_orig.clamp(0, height - 1) as usize;

            let out_col = (geo.start_x as i64 + dx) as usize;
            dst_luma[out_row * screen_w + out_col] =
                src_luma[y_orig * width as usize + x_orig];

            if dx % 2 == 0 && dy % 2 == 0 {
                let uv_src = (y_orig / 2) * width as usize + (x_orig & !1);
                let uv_dst = (out_row / 2) * screen_w + (out_col & !1);
                dst_chroma[uv_dst] = src_chroma[uv_src];
                dst_chroma[uv_dst + 1] = src_chroma[uv_src + 1];
            }
        }
    }
}

/// Repack a row-padded NV12 frame (luma rows `stride` bytes apart, chroma
/// rows likewise) into the packed layout the resampler and encoder expect.
pub fn pack_nv12_rows(src: &[u8], stride: u32, width: u32, height: u32, dst: &mut [u8]) {
    let stride = stride as usize;
    let width = width as usize;
    let height = height as usize;
    if stride < width
        || src.len() < stride * height * 3 / 2
        || dst.len() < width * height * 3 / 2
    {
        return;
    }
    for row in 0..height {
        dst[row * width..(row + 1) * width]
            .copy_from_slice(&src[row * stride..row * stride + width]);
    }
    let (src_chroma, dst_chroma) = (&src[stride * height..], &mut dst[width * height..]);
    for row in 0..height / 2 {
        dst_chroma[row * width..(row + 1) * width]
            .copy_from_slice(&src_chroma[row * stride..row * stride + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_parse_round_trip() {
        for deg in [0u32, 90, 180, 270] {
            assert_eq!(Rotation::from_degrees(deg).unwrap().degrees(), deg);
        }
        assert!(Rotation::from_degrees(45).is_none());
        assert!(Rotation::from_degrees(360).is_none());
    }

    #[test]
    fn logical_extent_swaps_for_quarter_turns() {
        assert_eq!(Rotation::R0.logical_extent(800, 480), (800, 480));
        assert_eq!(Rotation::R90.logical_extent(800, 480), (480, 800));
        assert_eq!(Rotation::R270.logical_extent(800, 480), (480, 800));
        assert_eq!(Rotation::R180.logical_extent(800, 480), (800, 480));
    }
}
