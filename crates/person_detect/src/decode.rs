use common_io::BoundingBox;

/// Uniform letterbox scale used by the runtime's preprocessor: the source
/// frame is scaled by this factor and centered in the square network input.
pub fn letterbox_gain(net_size: u32, frame_w: u32, frame_h: u32) -> f32 {
    let ratio_w = net_size as f32 / frame_w as f32;
    let ratio_h = net_size as f32 / frame_h as f32;
    ratio_w.min(ratio_h)
}

/// Number of values one output scale carries: grid x grid cells, three
/// anchors per cell, (classes + 5) values per anchor.
pub fn scale_output_len(net_size: u32, stride: u32, num_classes: u32) -> usize {
    let grid = (net_size / stride) as usize;
    grid * grid * 3 * (num_classes as usize + 5)
}

/// Decode one YOLOv5 output scale into frame-space boxes.
///
/// The tensor layout is row-major over cells, then anchors: the record for
/// (cell, anchor) starts at (cell_index * 3 + anchor) * (classes + 5) and
/// holds [tx, ty, tw, th, objectness, class scores...]. The runtime emits
/// already-activated values, so no sigmoid is applied here. Candidates are
/// thresholded on class_score * objectness before any box math, then
/// un-letterboxed into source-frame coordinates and clamped.
#[allow(clippy::too_many_arguments)]
pub fn decode_scale(
    data: &[f32],
    net_size: u32,
    stride: u32,
    anchors: &[[f32; 2]; 3],
    num_classes: u32,
    frame_w: u32,
    frame_h: u32,
    score_threshold: f32,
    out: &mut Vec<BoundingBox>,
) {
    let gain = letterbox_gain(net_size, frame_w, frame_h);
    let pad_x = (net_size as f32 - frame_w as f32 * gain) / 2.0;
    let pad_y = (net_size as f32 - frame_h as f32 * gain) / 2.0;

    let grid = (net_size / stride) as usize;
    let record_len = num_classes as usize + 5;

    for cell_y in 0..grid {
        for cell_x in 0..grid {
            let cell = cell_x + cell_y * grid;
            for (anchor_idx, anchor) in anchors.iter().enumerate() {
                let record = &data[(cell * 3 + anchor_idx) * record_len..][..record_len];
                let objectness = record[4];
                for cls in 0..num_classes as usize {
                    let score = record[5 + cls] * objectness;
                    if score <= score_threshold {
                        continue;
                    }

                    let mut cx = (record[0] * 2.0 - 0.5 + cell_x as f32) * stride as f32;
                    let mut cy = (record[1] * 2.0 - 0.5 + cell_y as f32) * stride as f32;
                    let mut w = (record[2] * 2.0).powi(2) * anchor[0];
                    let mut h = (record[3] * 2.0).powi(2) * anchor[1];

                    cx = (cx - pad_x) / gain;
                    cy = (cy - pad_y) / gain;
                    w /= gain;
                    h /= gain;

                    let clamp_x = |v: f32| ((v as i32).max(0)).min(frame_w as i32);
                    let clamp_y = |v: f32| ((v as i32).max(0)).min(frame_h as i32);
                    out.push(BoundingBox {
                        x1: clamp_x(cx - w / 2.0),
                        y1: clamp_y(cy - h / 2.0),
                        x2: clamp_x(cx + w / 2.0),
                        y2: clamp_y(cy + h / 2.0),
                        score,
                        class_id: cls as u32,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // net 64, stride 32 -> 2x2 grid, one class, 6 values per record.
    fn blank_scale() -> Vec<f32> {
        vec![0.0; scale_output_len(64, 32, 1)]
    }

    fn put_record(data: &mut [f32], cell: usize, anchor: usize, record: [f32; 6]) {
        let start = (cell * 3 + anchor) * 6;
        data[start..start + 6].copy_from_slice(&record);
    }

    const ANCHORS: [[f32; 2]; 3] = [[16.0, 16.0], [32.0, 32.0], [64.0, 64.0]];

    #[test]
    fn square_frame_decodes_centered_box() {
        let mut data = blank_scale();
        // cell (1, 0), anchor 0: center lands at (32, 0) of the 64x64 net.
        put_record(&mut data, 1, 0, [0.25, 0.25, 0.5, 0.5, 0.8, 0.9]);

        let mut boxes = Vec::new();
        decode_scale(&data, 64, 32, &ANCHORS, 1, 64, 64, 0.5, &mut boxes);

        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        // cx = (0.25*2 - 0.5 + 1) * 32 = 32; w = (0.5*2)^2 * 16 = 16,
        // so y1 = -8 clamps to 0.
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (24, 0, 40, 8));
        assert!((b.score - 0.72).abs() < 1e-6);
        assert_eq!(b.class_id, 0);
    }

    #[test]
    fn wide_frame_undoes_letterbox_pads() {
        let mut data = blank_scale();
        put_record(&mut data, 3, 0, [0.25, 0.25, 0.5, 0.5, 0.8, 0.9]);

        let mut boxes = Vec::new();
        // 128x64 source: gain = 0.5, pad_y = 16, pad_x = 0.
        decode_scale(&data, 64, 32, &ANCHORS, 1, 128, 64, 0.5, &mut boxes);

        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        // net-space center (32, 32) -> frame-space (64, 32); w = h = 32.
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (48, 16, 80, 48));
    }

    #[test]
    fn below_threshold_candidates_are_dropped() {
        let mut data = blank_scale();
        // 0.6 * 0.6 = 0.36 < 0.5
        put_record(&mut data, 0, 0, [0.5, 0.5, 0.5, 0.5, 0.6, 0.6]);

        let mut boxes = Vec::new();
        decode_scale(&data, 64, 32, &ANCHORS, 1, 64, 64, 0.5, &mut boxes);
        assert!(boxes.is_empty());
    }

    #[test]
    fn corners_clamp_to_frame() {
        let mut data = blank_scale();
        // Oversized box (anchor 2 at full width) spills past every edge.
        put_record(&mut data, 0, 2, [0.5, 0.5, 1.0, 1.0, 1.0, 1.0]);

        let mut boxes = Vec::new();
        decode_scale(&data, 64, 32, &ANCHORS, 1, 64, 64, 0.5, &mut boxes);

        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!(b.x1 >= 0 && b.y1 >= 0);
        assert!(b.x2 <= 64 && b.y2 <= 64);
    }

    #[test]
    fn gain_prefers_tighter_axis() {
        assert_eq!(letterbox_gain(640, 800, 480), 0.8);
        assert_eq!(letterbox_gain(640, 640, 640), 1.0);
        assert_eq!(letterbox_gain(640, 480, 800), 0.8);
    }
}
