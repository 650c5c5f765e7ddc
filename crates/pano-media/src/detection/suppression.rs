//! Suppression rules applied to each frame's raw detections.
//!
//! All rules contribute to one retained-index set; detections are then
//! filtered in a single pass, so no rule ever shifts another rule's indices.

use image::GrayImage;
use std::collections::{BTreeSet, HashMap};

use super::RawDetection;
use crate::config::SuppressionConfig;

/// How many detections each rule removed.
///
/// A detection caught by several rules is counted under the first that
/// applies, in the order duplicate, static, non-salient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressionReport {
    pub total: usize,
    pub kept: usize,
    pub duplicate: usize,
    pub static_label: usize,
    pub non_salient: usize,
}

/// Indices of the highest-confidence detection per label.
///
/// On equal confidence the first one seen wins.
fn best_per_label(detections: &[RawDetection]) -> BTreeSet<usize> {
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (idx, det) in detections.iter().enumerate() {
        match best.get(det.label.as_str()) {
            Some(&current) if detections[current].confidence >= det.confidence => {}
            _ => {
                best.insert(det.label.as_str(), idx);
            }
        }
    }
    best.into_values().collect()
}

/// Number of mask pixels whose saliency exceeds `threshold`.
///
/// Only the area covered by both images is compared.
fn salient_overlap(mask: &GrayImage, saliency: &GrayImage, threshold: u8) -> usize {
    let width = mask.width().min(saliency.width());
    let height = mask.height().min(saliency.height());
    let mut count = 0;
    for y in 0..height {
        for x in 0..width {
            if mask.get_pixel(x, y)[0] > 0 && saliency.get_pixel(x, y)[0] > threshold {
                count += 1;
            }
        }
    }
    count
}

/// Compute the retained-index set for one frame.
pub fn retained_indices(
    detections: &[RawDetection],
    saliency: Option<&GrayImage>,
    config: &SuppressionConfig,
) -> (BTreeSet<usize>, SuppressionReport) {
    let best = best_per_label(detections);
    let mut report = SuppressionReport {
        total: detections.len(),
        ..Default::default()
    };
    let mut retained = BTreeSet::new();

    for (idx, det) in detections.iter().enumerate() {
        if !best.contains(&idx) {
            report.duplicate += 1;
        } else if config.is_static(&det.label) {
            report.static_label += 1;
        } else if saliency.is_some_and(|map| {
            salient_overlap(&det.mask, map, config.saliency_threshold) <= config.min_salient_overlap
        }) {
            report.non_salient += 1;
        } else {
            retained.insert(idx);
        }
    }
    report.kept = retained.len();
    (retained, report)
}

fn filter_retained(detections: Vec<RawDetection>, retained: &BTreeSet<usize>) -> Vec<RawDetection> {
    detections
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| retained.contains(idx))
        .map(|(_, det)| det)
        .collect()
}

/// Apply every rule. Without a saliency map the saliency rule is skipped.
pub fn suppress(
    detections: Vec<RawDetection>,
    saliency: Option<&GrayImage>,
    config: &SuppressionConfig,
) -> (Vec<RawDetection>, SuppressionReport) {
    let (retained, report) = retained_indices(&detections, saliency, config);
    (filter_retained(detections, &retained), report)
}

/// Keep only the best detection per label.
pub fn suppress_duplicates(detections: Vec<RawDetection>) -> Vec<RawDetection> {
    let retained = best_per_label(&detections);
    filter_retained(detections, &retained)
}
