//! Palm detection: finds up to a few hand regions per frame so the hand
//! landmark model can be run once per hand.

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, prepare_frame_with_size, sigmoid};
use crate::types::Frame;

/// Keypoints per palm: wrist, four finger bases and two thumb points.
const PALM_KEYPOINTS: usize = 7;
const BOX_VALUES: usize = 4;
/// SSD layer strides for the 192px palm model, two anchors each.
const ANCHOR_STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;

const WRIST: usize = 0;
const MIDDLE_FINGER_BASE: usize = 2;
const CROP_SCALE: f32 = 2.6;
const CROP_SHIFT: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct PalmSettings {
    pub min_score: f32,
    pub nms_threshold: f32,
    pub max_regions: usize,
}

impl Default for PalmSettings {
    fn default() -> Self {
        Self {
            min_score: 0.5,
            nms_threshold: 0.3,
            max_regions: 2,
        }
    }
}

/// A detected palm in source frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

/// Square window around a palm, rotated so the fingers point up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandCrop {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    settings: PalmSettings,
}

impl PalmDetector {
    pub fn new(model_path: &Path, settings: PalmSettings) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load palm detector from {}", model_path.display()))?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
            settings,
        })
    }

    /// Palms in the frame, best first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_frame_with_size(frame, PALM_INPUT_SIZE)?;
        let outputs = self
            .session
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected boxes and scores",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let values_per_anchor = boxes
            .shape()
            .last()
            .copied()
            .ok_or_else(|| anyhow!("palm boxes have no shape"))?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        decode_palms(
            &boxes,
            values_per_anchor,
            &scores,
            &self.anchors,
            &letterbox,
            &self.settings,
        )
    }
}

/// Anchor centers in `[0, 1]` of the model input, in output order. Layers
/// sharing a stride are laid out together.
pub fn generate_anchors(input_size: u32) -> Vec<[f32; 2]> {
    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut per_cell = 0;
        while layer < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[layer] == stride {
            per_cell += ANCHORS_PER_LAYER;
            layer += 1;
        }

        let cells = input_size.div_ceil(stride);
        for y in 0..cells {
            for x in 0..cells {
                let center = [
                    (x as f32 + 0.5) / cells as f32,
                    (y as f32 + 0.5) / cells as f32,
                ];
                anchors.extend((0..per_cell).map(|_| center));
            }
        }
    }
    anchors
}

/// Turns raw SSD regressions into palm regions. Offsets are in model input
/// pixels relative to each anchor center.
pub fn decode_palms(
    boxes: &[f32],
    values_per_anchor: usize,
    scores: &[f32],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    settings: &PalmSettings,
) -> Result<Vec<PalmRegion>> {
    if values_per_anchor < BOX_VALUES + PALM_KEYPOINTS * 2 {
        return Err(anyhow!(
            "palm boxes carry {values_per_anchor} values per anchor, need {}",
            BOX_VALUES + PALM_KEYPOINTS * 2
        ));
    }
    let count = anchors
        .len()
        .min(scores.len())
        .min(boxes.len() / values_per_anchor);
    if count == 0 {
        return Err(anyhow!("palm detector produced no anchors"));
    }

    let input = PALM_INPUT_SIZE as f32;
    let to_frame = |anchor: [f32; 2], dx: f32, dy: f32| {
        letterbox.unpad(anchor[0] * input + dx, anchor[1] * input + dy)
    };

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().take(count).enumerate() {
        let score = sigmoid(scores[idx]);
        if score < settings.min_score {
            continue;
        }

        let raw = &boxes[idx * values_per_anchor..(idx + 1) * values_per_anchor];
        let (cx, cy) = to_frame(*anchor, raw[0], raw[1]);
        let half_w = raw[2] / 2.0 / letterbox.scale;
        let half_h = raw[3] / 2.0 / letterbox.scale;
        if half_w <= 0.0 || half_h <= 0.0 {
            continue;
        }

        let keypoints = raw[BOX_VALUES..BOX_VALUES + PALM_KEYPOINTS * 2]
            .chunks_exact(2)
            .map(|kp| to_frame(*anchor, kp[0], kp[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox: [cx - half_w, cy - half_h, cx + half_w, cy + half_h],
            keypoints,
            score,
        });
    }

    Ok(non_max_suppression(
        candidates,
        settings.nms_threshold,
        settings.max_regions,
    ))
}

fn non_max_suppression(
    mut candidates: Vec<PalmRegion>,
    threshold: f32,
    limit: usize,
) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= limit {
            break;
        }
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) < threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Crop for the hand landmark model: the palm box squared, enlarged and
/// shifted toward the fingers, rotated along wrist -> middle finger base.
pub fn crop_from_palm(region: &PalmRegion) -> HandCrop {
    let [x1, y1, x2, y2] = region.bbox;
    let base = (x2 - x1).max(y2 - y1);
    let center = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);

    let (Some(wrist), Some(finger)) = (
        region.keypoints.get(WRIST),
        region.keypoints.get(MIDDLE_FINGER_BASE),
    ) else {
        return HandCrop {
            center,
            side: base * CROP_SCALE,
            angle: 0.0,
        };
    };

    let (vx, vy) = (finger.0 - wrist.0, finger.1 - wrist.1);
    let angle = if vx == 0.0 && vy == 0.0 {
        0.0
    } else {
        normalize_angle(vx.atan2(-vy))
    };
    // Crop "up" in frame coordinates.
    let (sin, cos) = angle.sin_cos();
    let up = (sin, -cos);

    HandCrop {
        center: (
            center.0 + up.0 * base * CROP_SHIFT,
            center.1 + up.1 * base * CROP_SHIFT,
        ),
        side: base * CROP_SCALE,
        angle,
    }
}

fn normalize_angle(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}
