//! Pipeline metrics.
//!
//! Only the `metrics` facade is used here; installing a recorder is up to
//! the embedding application.

use metrics::{counter, gauge, histogram};

use crate::detection::SuppressionReport;

/// Metric names as constants for consistency.
pub mod names {
    // Viewport ingest
    pub const FRAMES_INGESTED_TOTAL: &str = "pano_frames_ingested_total";
    pub const FRAMES_DROPPED_TOTAL: &str = "pano_frames_dropped_total";
    pub const STABILIZATION_REUSED_TOTAL: &str = "pano_stabilization_reused_total";

    // Detection
    pub const DETECTION_QUEUE_DEPTH: &str = "pano_detection_queue_depth";
    pub const DETECTION_DURATION_SECONDS: &str = "pano_detection_duration_seconds";
    pub const DETECTIONS_KEPT_TOTAL: &str = "pano_detections_kept_total";
    pub const DETECTIONS_SUPPRESSED_TOTAL: &str = "pano_detections_suppressed_total";

    // Saliency
    pub const SALIENCY_RUNS_TOTAL: &str = "pano_saliency_runs_total";
    pub const SALIENCY_DURATION_SECONDS: &str = "pano_saliency_duration_seconds";

    // Motion
    pub const MOTION_FRAMES_TOTAL: &str = "pano_motion_frames_total";
    pub const MOTION_FRAMES_SKIPPED_TOTAL: &str = "pano_motion_frames_skipped_total";

    // Replay
    pub const REPLAY_FRAMES_COMPOSED_TOTAL: &str = "pano_replay_frames_composed_total";
}

/// Record an accepted viewport frame.
pub fn record_frame_ingested() {
    counter!(names::FRAMES_INGESTED_TOTAL).increment(1);
}

/// Record a dropped viewport frame.
pub fn record_frame_dropped(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::FRAMES_DROPPED_TOTAL, &labels).increment(1);
}

/// Record a frame warped with the previous transform.
pub fn record_stabilization_reused() {
    counter!(names::STABILIZATION_REUSED_TOTAL).increment(1);
}

pub fn set_detection_queue_depth(depth: usize) {
    gauge!(names::DETECTION_QUEUE_DEPTH).set(depth as f64);
}

/// Record one detector call and its suppression outcome.
pub fn record_detection(duration_secs: f64, report: &SuppressionReport) {
    histogram!(names::DETECTION_DURATION_SECONDS).record(duration_secs);
    counter!(names::DETECTIONS_KEPT_TOTAL).increment(report.kept as u64);
    for (rule, count) in [
        ("duplicate", report.duplicate),
        ("static", report.static_label),
        ("non_salient", report.non_salient),
    ] {
        if count > 0 {
            let labels = [("rule", rule.to_string())];
            counter!(names::DETECTIONS_SUPPRESSED_TOTAL, &labels).increment(count as u64);
        }
    }
}

pub fn record_saliency_run(duration_secs: f64) {
    counter!(names::SALIENCY_RUNS_TOTAL).increment(1);
    histogram!(names::SALIENCY_DURATION_SECONDS).record(duration_secs);
}

pub fn record_motion_frame(skipped: bool) {
    if skipped {
        counter!(names::MOTION_FRAMES_SKIPPED_TOTAL).increment(1);
    } else {
        counter!(names::MOTION_FRAMES_TOTAL).increment(1);
    }
}

pub fn record_replay_frames(count: usize) {
    counter!(names::REPLAY_FRAMES_COMPOSED_TOTAL).increment(count as u64);
}
