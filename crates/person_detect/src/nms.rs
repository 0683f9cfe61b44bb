use common_io::BoundingBox;
use std::cmp::Ordering;

// Inclusive pixel convention: a box from x1 to x2 covers x2 - x1 + 1 columns.
fn area(b: &BoundingBox) -> f32 {
    ((b.x2 - b.x1 + 1) as f32) * ((b.y2 - b.y1 + 1) as f32)
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1) + 1).max(0) as f32;
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1) + 1).max(0) as f32;
    let inter = w * h;
    inter / (area(a) + area(b) - inter)
}

/// Greedy per-class non-maximum suppression. Boxes are reordered by
/// descending score; a box is dropped when its IoU with an already-kept box
/// of the same class meets or exceeds the threshold.
pub fn non_max_suppress(boxes: &mut Vec<BoundingBox>, threshold: f32) {
    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep = vec![true; boxes.len()];
    for i in 0..boxes.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..boxes.len() {
            if !keep[j] || boxes[j].class_id != boxes[i].class_id {
                continue;
            }
            if iou(&boxes[i], &boxes[j]) >= threshold {
                keep[j] = false;
            }
        }
    }

    let mut idx = 0;
    boxes.retain(|_| {
        let kept = keep[idx];
        idx += 1;
        kept
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x1: i32, y1: i32, x2: i32, y2: i32, score: f32, class_id: u32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2, score, class_id }
    }

    #[test]
    fn overlapping_boxes_keep_the_best() {
        let mut boxes = vec![
            bx(10, 10, 60, 60, 0.7, 0),
            bx(12, 12, 62, 62, 0.9, 0),
            bx(11, 11, 61, 61, 0.8, 0),
        ];
        non_max_suppress(&mut boxes, 0.3);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].score, 0.9);
    }

    #[test]
    fn disjoint_boxes_all_survive_sorted() {
        let mut boxes = vec![
            bx(0, 0, 10, 10, 0.6, 0),
            bx(100, 100, 110, 110, 0.9, 0),
        ];
        non_max_suppress(&mut boxes, 0.3);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].score, 0.9);
        assert_eq!(boxes[1].score, 0.6);
    }

    #[test]
    fn threshold_is_inclusive_with_plus_one_areas() {
        // 10x10 boxes sharing a 5x10 band: inter = 50, union = 150,
        // IoU = 1/3 exactly under the +1 convention.
        let a = bx(0, 0, 9, 9, 0.9, 0);
        let b = bx(5, 0, 14, 9, 0.8, 0);
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);

        let mut boxes = vec![a, b];
        non_max_suppress(&mut boxes, 1.0 / 3.0);
        assert_eq!(boxes.len(), 1);

        let mut boxes = vec![a, b];
        non_max_suppress(&mut boxes, 0.34);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn classes_never_suppress_each_other() {
        let mut boxes = vec![
            bx(10, 10, 60, 60, 0.9, 0),
            bx(10, 10, 60, 60, 0.8, 1),
        ];
        non_max_suppress(&mut boxes, 0.3);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn empty_input_is_fine() {
        let mut boxes: Vec<BoundingBox> = Vec::new();
        non_max_suppress(&mut boxes, 0.3);
        assert!(boxes.is_empty());
    }
}
