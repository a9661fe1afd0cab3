//! End-to-end runs of the post-processing chain at deployment dimensions.

use mangrove_scan::vision::{postprocess, OutputLayout, Postprocessed};
use mangrove_scan::{
    BoundingBox, ConfidenceTier, Decision, DecisionPolicy, Detection, DetectionConfig, LabelSet,
};

const IMAGE: (u32, u32) = (640, 640);

fn labels() -> LabelSet {
    let mut names = vec!["mangrove".to_string(), "nipa".to_string()];
    names.extend((2..15).map(|i| format!("species_{i}")));
    LabelSet::new(names)
}

/// One output column: box in model pixels plus a single hot class.
struct Column {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    class_id: usize,
    score: f32,
}

fn raw_output(layout: OutputLayout, columns: &[Column]) -> Vec<f32> {
    let n = layout.num_candidates;
    let mut raw = vec![0.0; layout.expected_len()];
    for (i, c) in columns.iter().enumerate() {
        raw[i] = c.cx;
        raw[n + i] = c.cy;
        raw[2 * n + i] = c.w;
        raw[3 * n + i] = c.h;
        raw[(4 + c.class_id) * n + i] = c.score;
    }
    raw
}

fn run(columns: &[Column]) -> (Postprocessed, Decision) {
    let config = DetectionConfig::default();
    let raw = raw_output(config.layout(), columns);
    let out = postprocess(&raw, config.layout(), IMAGE, &config, &labels()).unwrap();
    let decision = DecisionPolicy::new(config.tiers).decide(&out.detections);
    (out, decision)
}

fn single(score: f32) -> Column {
    Column {
        cx: 320.0,
        cy: 320.0,
        w: 200.0,
        h: 100.0,
        class_id: 0,
        score,
    }
}

#[test]
fn overlapping_mangroves_keep_only_the_stronger() {
    // [0,0,100,100] vs [25,0,125,100]: IoU = 75 / 125 = 0.6
    let (out, decision) = run(&[
        Column {
            cx: 50.0,
            cy: 50.0,
            w: 100.0,
            h: 100.0,
            class_id: 0,
            score: 0.9,
        },
        Column {
            cx: 75.0,
            cy: 50.0,
            w: 100.0,
            h: 100.0,
            class_id: 0,
            score: 0.7,
        },
    ]);

    assert_eq!(out.candidates_before_nms, 2);
    assert_eq!(out.detections.len(), 1);
    assert_eq!(out.detections[0].confidence, 0.9);
    assert_eq!(out.detections[0].label, "mangrove");
    assert_eq!(
        out.detections[0].bbox,
        BoundingBox::new(0.0, 0.0, 100.0, 100.0)
    );
    assert_eq!(decision.tier, ConfidenceTier::High);
}

#[test]
fn high_confidence_is_persisted() {
    let (_, decision) = run(&[single(0.82)]);
    assert_eq!(decision.tier, ConfidenceTier::High);
    assert!(decision.persistable().is_some());
    assert!(decision.warning().is_none());
}

#[test]
fn medium_confidence_is_persisted_with_warning() {
    let (_, decision) = run(&[single(0.70)]);
    assert_eq!(decision.tier, ConfidenceTier::Medium);
    assert!(decision.surfaced().is_some());
    assert!(decision.persistable().is_some());
    assert!(decision.warning().is_some());
}

#[test]
fn low_confidence_is_shown_but_not_persisted() {
    let (_, decision) = run(&[single(0.55)]);
    assert_eq!(decision.tier, ConfidenceTier::Low);
    assert_eq!(decision.surfaced().map(|d| d.confidence), Some(0.55));
    assert!(decision.persistable().is_none());
}

#[test]
fn nothing_above_threshold_is_rejected() {
    let (out, decision) = run(&[single(0.40)]);
    assert!(out.detections.is_empty());
    assert_eq!(decision, Decision::rejected());

    let (out, decision) = run(&[]);
    assert_eq!(out.candidates_before_nms, 0);
    assert_eq!(decision, Decision::rejected());
}

#[test]
fn below_lowest_tier_is_rejected_even_if_detected() {
    let weak = Detection {
        label: "mangrove".into(),
        class_id: 0,
        confidence: 0.40,
        bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
    };
    let decision = DecisionPolicy::default().decide(&[weak]);
    assert_eq!(decision.tier, ConfidenceTier::Rejected);
    assert!(decision.surfaced().is_none());
}

#[test]
fn suppression_ignores_class() {
    let (out, _) = run(&[
        Column {
            class_id: 0,
            ..single(0.9)
        },
        Column {
            class_id: 1,
            ..single(0.85)
        },
    ]);
    assert_eq!(out.detections.len(), 1);
    assert_eq!(out.detections[0].label, "mangrove");
}

#[test]
fn threshold_is_exclusive() {
    let (out, _) = run(&[single(0.5)]);
    assert!(out.detections.is_empty());
}

#[test]
fn normalized_and_pixel_boxes_land_in_the_same_place() {
    // centers under the cutoff are fractions of the photo
    let (normalized, _) = run(&[Column {
        cx: 0.5,
        cy: 0.5,
        w: 0.25,
        h: 0.25,
        class_id: 0,
        score: 0.9,
    }]);
    let (pixels, _) = run(&[Column {
        cx: 320.0,
        cy: 320.0,
        w: 160.0,
        h: 160.0,
        class_id: 0,
        score: 0.9,
    }]);
    assert_eq!(normalized.detections[0].bbox, pixels.detections[0].bbox);
    assert_eq!(
        pixels.detections[0].bbox,
        BoundingBox::new(240.0, 240.0, 400.0, 400.0)
    );
}

#[test]
fn boxes_spilling_off_the_image_are_clamped() {
    let (out, _) = run(&[Column {
        cx: 630.0,
        cy: 10.0,
        w: 100.0,
        h: 100.0,
        class_id: 3,
        score: 0.75,
    }]);
    let det = &out.detections[0];
    assert_eq!(det.bbox, BoundingBox::new(580.0, 0.0, 640.0, 60.0));
    assert_eq!(det.label, "species_3");
}

#[test]
fn unlabelled_class_resolves_to_unknown() {
    let config = DetectionConfig::default();
    let raw = raw_output(config.layout(), &[Column {
        class_id: 14,
        ..single(0.9)
    }]);
    let short = LabelSet::new(vec!["mangrove".into()]);
    let out = postprocess(&raw, config.layout(), IMAGE, &config, &short).unwrap();
    assert_eq!(out.detections[0].label, "Unknown");
    assert_eq!(out.detections[0].class_id, 14);
}
