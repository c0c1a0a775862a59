//! Per-frame landmark flattening.
//!
//! Layout is fixed by the extraction mode so that every frame of a run has the
//! same width no matter what was detected:
//!
//! - `hands`: left hand (21 × xyz) then right hand (21 × xyz), 126 floats.
//! - `pose_hands`: pose (33 × xyzv) then left hand then right hand, 258 floats.
//!
//! Absent groups become zeros of their sub-width. Point order follows the
//! detector's indexing, which the classifier was trained on.

use crate::types::{
    ExtractionMode, FeatureVector, FrameLandmarks, HAND_LANDMARKS, HAND_POINT_WIDTH,
    LandmarkGroup, POSE_LANDMARKS, POSE_POINT_WIDTH,
};

pub fn flatten_frame(landmarks: &FrameLandmarks, mode: ExtractionMode) -> FeatureVector {
    let mut out = Vec::with_capacity(mode.feature_width());
    if mode == ExtractionMode::PoseHands {
        push_group(&mut out, landmarks.pose.as_ref(), POSE_LANDMARKS, true);
    }
    push_group(&mut out, landmarks.left_hand.as_ref(), HAND_LANDMARKS, false);
    push_group(&mut out, landmarks.right_hand.as_ref(), HAND_LANDMARKS, false);
    debug_assert_eq!(out.len(), mode.feature_width());
    out
}

/// Appends exactly `count` points. Extra points from the detector are dropped
/// and missing ones are zero-filled, so the width never drifts.
fn push_group(
    out: &mut Vec<f32>,
    group: Option<&LandmarkGroup>,
    count: usize,
    with_visibility: bool,
) {
    let stride = if with_visibility {
        POSE_POINT_WIDTH
    } else {
        HAND_POINT_WIDTH
    };
    let start = out.len();

    if let Some(group) = group {
        for point in group.points.iter().take(count) {
            out.extend_from_slice(&[point.x, point.y, point.z]);
            if with_visibility {
                out.push(point.visibility.unwrap_or(0.0));
            }
        }
    }

    out.resize(start + count * stride, 0.0);
}
