use tracing::debug;

use super::{BoundingBox, Detection};

/// Intersection over union of two boxes.
///
/// Disjoint, touching and degenerate boxes all yield `0.0`.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = a.right.min(b.right) - a.left.max(b.left);
    let inter_h = a.bottom.min(b.bottom) - a.top.max(b.top);

    if inter_w <= 0.0 || inter_h <= 0.0 {
        return 0.0;
    }

    let inter_area = inter_w * inter_h;
    let union = a.area() + b.area() - inter_area;

    if union > 0.0 {
        inter_area / union
    } else {
        0.0
    }
}

/// Greedy non-maximum suppression across all classes.
///
/// Detections are visited in descending confidence (stable, so equal scores
/// keep their input order). A detection is dropped as soon as it overlaps
/// any already kept one by more than `iou_threshold`. Class is ignored: a
/// confident box of one class suppresses a weaker overlapping box of another.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }

    let before = detections.len();
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(before.min(32));
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| iou(&k.bbox, &candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    debug!(before, after = kept.len(), "nms complete");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn det(label: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
        Detection {
            label: label.into(),
            class_id: 0,
            confidence,
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
        }
    }

    #[test]
    fn identical_boxes_have_unit_iou() {
        let a = BoundingBox::new(10.0, 10.0, 50.0, 30.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_and_touching_boxes_have_zero_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        let touching = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
        assert_eq!(iou(&a, &touching), 0.0);
    }

    #[test]
    fn degenerate_boxes_have_zero_iou() {
        let point = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        let line = BoundingBox::new(0.0, 5.0, 10.0, 5.0);
        assert_eq!(iou(&point, &point), 0.0);
        assert_eq!(iou(&line, &line), 0.0);
    }

    #[test]
    fn tiny_boxes_keep_unit_iou() {
        let a = BoundingBox::new(10.0, 10.0, 10.0002, 10.0002);
        assert!(a.area() > 0.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn partial_overlap_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_empty() {
        assert!(non_max_suppression(vec![], 0.5).is_empty());
    }

    #[test]
    fn nms_keeps_higher_of_overlapping_pair() {
        // IoU = 60 / 100 = 0.6
        let weak = det("mangrove", 0.7, [0.0, 0.0, 10.0, 8.0]);
        let strong = det("mangrove", 0.9, [0.0, 2.0, 10.0, 10.0]);
        assert!((iou(&weak.bbox, &strong.bbox) - 0.6).abs() < 1e-6);

        let result = non_max_suppression(vec![weak, strong], 0.5);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_non_overlapping_sorted() {
        let a = det("a", 0.6, [0.0, 0.0, 10.0, 10.0]);
        let b = det("b", 0.8, [50.0, 50.0, 60.0, 60.0]);
        let result = non_max_suppression(vec![a, b], 0.5);
        let confidences: Vec<f32> = result.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.8, 0.6]);
    }

    #[test]
    fn overlap_at_threshold_is_kept() {
        // IoU = 50 / 100 exactly
        let a = det("a", 0.9, [0.0, 0.0, 10.0, 10.0]);
        let b = det("b", 0.8, [0.0, 0.0, 10.0, 5.0]);
        assert_eq!(non_max_suppression(vec![a, b], 0.5).len(), 2);
    }

    #[test]
    fn suppression_crosses_classes() {
        let mut tree = det("tree", 0.9, [0.0, 0.0, 10.0, 10.0]);
        tree.class_id = 3;
        let mut shrub = det("shrub", 0.6, [1.0, 1.0, 10.0, 10.0]);
        shrub.class_id = 5;

        let result = non_max_suppression(vec![shrub, tree], 0.5);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label, "tree");
    }

    #[test]
    fn equal_confidence_keeps_input_order() {
        let first = det("first", 0.8, [0.0, 0.0, 10.0, 10.0]);
        let second = det("second", 0.8, [0.0, 0.0, 10.0, 10.0]);
        let result = non_max_suppression(vec![first, second], 0.5);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].label, "first");
    }

    #[test]
    fn suppressed_box_does_not_suppress_others() {
        // b overlaps a and c; a suppresses b, so c survives
        let a = det("a", 0.9, [0.0, 0.0, 10.0, 10.0]);
        let b = det("b", 0.8, [3.0, 0.0, 13.0, 10.0]);
        let c = det("c", 0.7, [7.0, 0.0, 17.0, 10.0]);
        let result = non_max_suppression(vec![a, b, c], 0.5);
        let labels: Vec<&str> = result.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c"]);
    }

    fn arb_box() -> impl Strategy<Value = BoundingBox> {
        (0.0f32..100.0, 0.0f32..100.0, 0.0f32..50.0, 0.0f32..50.0)
            .prop_map(|(x, y, w, h)| BoundingBox::new(x, y, x + w, y + h))
    }

    fn arb_detections() -> impl Strategy<Value = Vec<Detection>> {
        prop::collection::vec((arb_box(), 0.0f32..1.0), 0..30).prop_map(|items| {
            items
                .into_iter()
                .map(|(bbox, confidence)| Detection {
                    label: "x".into(),
                    class_id: 0,
                    confidence,
                    bbox,
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn iou_is_symmetric(a in arb_box(), b in arb_box()) {
            prop_assert_eq!(iou(&a, &b), iou(&b, &a));
        }

        #[test]
        fn iou_of_box_with_itself_is_one(
            x in 0.0f32..100.0,
            y in 0.0f32..100.0,
            w in 1e-3f32..50.0,
            h in 1e-3f32..50.0,
        ) {
            let a = BoundingBox::new(x, y, x + w, y + h);
            prop_assume!(a.area() > 0.0);
            prop_assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        }

        #[test]
        fn iou_is_bounded(a in arb_box(), b in arb_box()) {
            let v = iou(&a, &b);
            prop_assert!((0.0..=1.0 + 1e-6).contains(&v));
        }

        #[test]
        fn nms_is_idempotent(dets in arb_detections(), threshold in 0.1f32..0.9) {
            let once = non_max_suppression(dets, threshold);
            let twice = non_max_suppression(once.clone(), threshold);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn nms_output_is_pairwise_below_threshold(dets in arb_detections(), threshold in 0.1f32..0.9) {
            let kept = non_max_suppression(dets, threshold);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(iou(&a.bbox, &b.bbox) <= threshold);
                    prop_assert!(a.confidence >= b.confidence);
                }
            }
        }
    }
}
