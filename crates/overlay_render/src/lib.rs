//! CPU drawing for the detection box plane: an ARGB8888 surface cleared to
//! transparent, with 2-px rectangle borders at panel coordinates. Also owns
//! the source-frame -> panel coordinate remap for the rotated-panel mount.

use common_io::BoundingBox;
use frame_transform::Rotation;

/// Byte order within one ARGB pixel: alpha, red, green, blue.
pub type Argb = [u8; 4];

pub const BOX_BORDER_PX: i32 = 2;
pub const BOX_COLOR: Argb = [0xFF, 0xFF, 0x00, 0x00];

/// Maps detector boxes (camera-frame coordinates) onto the panel.
///
/// Only the two mounts this hardware ships with are defined: an unrotated
/// panel (coordinates pass through) and the 90-degree portrait mount, where
/// the axes swap: new_x = panel_width - source_y2, new_y = source_x1, and
/// symmetric for the opposite corner. Other angles have no verified formula
/// and are refused at construction.
#[derive(Clone, Copy, Debug)]
pub enum BoxMapper {
    Passthrough,
    QuarterTurn { panel_w: i32 },
}

impl BoxMapper {
    pub fn for_rotation(rotation: Rotation, panel_w: u32) -> Option<BoxMapper> {
        match rotation {
            Rotation::R0 => Some(BoxMapper::Passthrough),
            Rotation::R90 => Some(BoxMapper::QuarterTurn {
                panel_w: panel_w as i32,
            }),
            Rotation::R180 | Rotation::R270 => None,
        }
    }

    /// Panel-space rectangle [x1, y1, x2, y2] for one detector box.
    pub fn remap(&self, b: &BoundingBox) -> [i32; 4] {
        match *self {
            BoxMapper::Passthrough => [b.x1, b.y1, b.x2, b.y2],
            BoxMapper::QuarterTurn { panel_w } => {
                [panel_w - b.y2, b.x1, panel_w - b.y1, b.x2]
            }
        }
    }
}

/// True when the rectangle has no pixel inside [0,w) x [0,h).
pub fn rect_outside(rect: [i32; 4], width: u32, height: u32) -> bool {
    let [x1, y1, x2, y2] = rect;
    x2 < 0 || y2 < 0 || x1 >= width as i32 || y1 >= height as i32 || x1 > x2 || y1 > y2
}

/// Reset the whole surface to fully transparent.
pub fn clear(buf: &mut [u8]) {
    buf.fill(0);
}

fn fill_rect(buf: &mut [u8], width: u32, height: u32, x1: i32, y1: i32, x2: i32, y2: i32, color: Argb) {
    let x_lo = x1.max(0) as usize;
    let x_hi = (x2.min(width as i32 - 1)) as i64;
    let y_lo = y1.max(0) as usize;
    let y_hi = (y2.min(height as i32 - 1)) as i64;
    if x_hi < x_lo as i64 || y_hi < y_lo as i64 {
        return;
    }
    let stride = width as usize * 4;
    for y in y_lo..=y_hi as usize {
        let row = y * stride;
        for x in x_lo..=x_hi as usize {
            let idx = row + x * 4;
            buf[idx..idx + 4].copy_from_slice(&color);
        }
    }
}

/// Draw a rectangle border of `thickness` pixels, corners inclusive.
/// Each edge clips to the surface independently, so a partially off-panel
/// box renders its visible edges.
pub fn draw_rect_border(
    buf: &mut [u8],
    width: u32,
    height: u32,
    rect: [i32; 4],
    thickness: i32,
    color: Argb,
) {
    let [x1, y1, x2, y2] = rect;
    if x2 < x1 || y2 < y1 {
        return;
    }
    let t = thickness.max(1);
    fill_rect(buf, width, height, x1, y1, x2, y1 + t - 1, color); // top
    fill_rect(buf, width, height, x1, y2 - t + 1, x2, y2, color); // bottom
    fill_rect(buf, width, height, x1, y1, x1 + t - 1, y2, color); // left
    fill_rect(buf, width, height, x2 - t + 1, y1, x2, y2, color); // right
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(buf: &[u8], width: u32, x: i32, y: i32) -> Argb {
        let idx = (y as usize * width as usize + x as usize) * 4;
        [buf[idx], buf[idx + 1], buf[idx + 2], buf[idx + 3]]
    }

    #[test]
    fn quarter_turn_remap_swaps_axes() {
        let mapper = BoxMapper::for_rotation(Rotation::R90, 480).unwrap();
        let b = BoundingBox {
            x1: 100,
            y1: 50,
            x2: 200,
            y2: 150,
            score: 0.8,
            class_id: 0,
        };
        assert_eq!(mapper.remap(&b), [330, 100, 430, 200]);
    }

    #[test]
    fn passthrough_remap_is_identity() {
        let mapper = BoxMapper::for_rotation(Rotation::R0, 480).unwrap();
        let b = BoundingBox {
            x1: 10,
            y1: 20,
            x2: 30,
            y2: 40,
            score: 0.5,
            class_id: 0,
        };
        assert_eq!(mapper.remap(&b), [10, 20, 30, 40]);
    }

    #[test]
    fn half_turn_mounts_are_refused() {
        assert!(BoxMapper::for_rotation(Rotation::R180, 480).is_none());
        assert!(BoxMapper::for_rotation(Rotation::R270, 480).is_none());
    }

    #[test]
    fn outside_rects_are_detected() {
        assert!(rect_outside([-50, -50, -10, -10], 480, 800));
        assert!(rect_outside([480, 0, 500, 10], 480, 800));
        assert!(rect_outside([0, 800, 10, 820], 480, 800));
        assert!(!rect_outside([-5, -5, 5, 5], 480, 800));
        assert!(!rect_outside([0, 0, 479, 799], 480, 800));
    }

    #[test]
    fn border_is_two_pixels_thick() {
        let (w, h) = (32u32, 32u32);
        let mut buf = vec![0u8; (w * h * 4) as usize];
        draw_rect_border(&mut buf, w, h, [4, 4, 20, 20], BOX_BORDER_PX, BOX_COLOR);

        // Horizontal walk across the middle row: left border spans x=4..=5,
        // interior is untouched, right border spans x=19..=20.
        assert_eq!(pixel(&buf, w, 3, 12), [0, 0, 0, 0]);
        assert_eq!(pixel(&buf, w, 4, 12), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 5, 12), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 6, 12), [0, 0, 0, 0]);
        assert_eq!(pixel(&buf, w, 19, 12), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 20, 12), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 21, 12), [0, 0, 0, 0]);
        // Top border covers y=4..=5 across the full box width.
        assert_eq!(pixel(&buf, w, 12, 4), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 12, 5), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 12, 6), [0, 0, 0, 0]);
    }

    #[test]
    fn partial_box_draws_only_visible_edges() {
        let (w, h) = (16u32, 16u32);
        let mut buf = vec![0u8; (w * h * 4) as usize];
        // Box extends past the left edge; its left border is off-panel.
        draw_rect_border(&mut buf, w, h, [-6, 4, 8, 12], BOX_BORDER_PX, BOX_COLOR);
        // Top edge clipped to x=0.. still drawn.
        assert_eq!(pixel(&buf, w, 0, 4), BOX_COLOR);
        assert_eq!(pixel(&buf, w, 7, 4), BOX_COLOR);
        // Right border visible.
        assert_eq!(pixel(&buf, w, 8, 8), BOX_COLOR);
        // Interior stays transparent.
        assert_eq!(pixel(&buf, w, 3, 8), [0, 0, 0, 0]);
    }

    #[test]
    fn clear_resets_every_byte() {
        let mut buf = vec![0xEEu8; 64];
        clear(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
