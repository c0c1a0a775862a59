use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, SessionOutputs, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkExtractor,
    common::{self, HAND_INPUT_SIZE, HandDetection, POSE_INPUT_SIZE},
    palm::{PalmDetector, PalmRegion, PalmSettings, crop_from_palm},
};
use crate::types::{
    ExtractionMode, Frame, FrameLandmarks, HAND_LANDMARKS, HAND_POINT_WIDTH, LandmarkGroup,
    POSE_LANDMARKS,
};

// Pose landmark output rows are x, y, z, visibility, presence.
const POSE_OUTPUT_STRIDE: usize = 5;
const POSE_VISIBILITY_SLOT: usize = 3;
const MAX_HANDS: usize = 2;

#[derive(Clone, Debug)]
pub struct ExtractorSettings {
    /// Hand detections under this confidence count as absent.
    pub min_hand_confidence: f32,
    pub min_pose_confidence: f32,
    pub min_palm_score: f32,
    /// IoU above which overlapping palm boxes are merged.
    pub palm_nms_threshold: f32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        let palm = PalmSettings::default();
        Self {
            min_hand_confidence: 0.5,
            min_pose_confidence: 0.5,
            min_palm_score: palm.min_score,
            palm_nms_threshold: palm.nms_threshold,
        }
    }
}

/// Landmark extractor built on MediaPipe-style ONNX models: a palm detector
/// that finds up to two hands, a 21-point hand landmark model run once per
/// palm, and an optional 33-point pose landmark model.
pub struct OrtLandmarkExtractor {
    palm: PalmDetector,
    hand: Session,
    pose: Option<Session>,
    settings: ExtractorSettings,
}

impl OrtLandmarkExtractor {
    pub fn new(
        palm_model_path: &Path,
        hand_model_path: &Path,
        pose_model_path: Option<&Path>,
        settings: ExtractorSettings,
    ) -> Result<Self> {
        let palm = PalmDetector::new(
            palm_model_path,
            PalmSettings {
                min_score: settings.min_palm_score,
                nms_threshold: settings.palm_nms_threshold,
                max_regions: MAX_HANDS,
            },
        )?;
        let hand = load_session(hand_model_path)?;
        let pose = pose_model_path.map(load_session).transpose()?;
        if pose.is_none() {
            log::warn!("no pose landmark model configured, pose_hands requests will be refused");
        }

        Ok(Self {
            palm,
            hand,
            pose,
            settings,
        })
    }

    fn detect_hands(&mut self, frame: &Frame) -> Result<Vec<HandDetection>> {
        let palms = self.palm.detect(frame)?;
        let mut hands = Vec::with_capacity(palms.len());
        for palm in palms.iter().take(MAX_HANDS) {
            if let Some(hand) = self.detect_hand_in(frame, palm)? {
                hands.push(hand);
            }
        }
        Ok(hands)
    }

    fn detect_hand_in(&mut self, frame: &Frame, palm: &PalmRegion) -> Result<Option<HandDetection>> {
        let crop = crop_from_palm(palm);
        let (input, transform) =
            common::prepare_rotated_crop(frame, crop.center, crop.side, crop.angle, HAND_INPUT_SIZE)?;
        let outputs = self
            .hand
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("failed to run hand landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("hand landmark model returned no outputs"));
        }

        let confidence = scalar_output(&outputs, 1).unwrap_or(0.0) * palm.score;
        if confidence < self.settings.min_hand_confidence {
            return Ok(None);
        }
        let handedness = scalar_output(&outputs, 2).unwrap_or(0.0);

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let points = common::decode_points(
            &flattened,
            HAND_LANDMARKS,
            HAND_POINT_WIDTH,
            None,
            &transform,
        )?;

        Ok(Some(HandDetection {
            landmarks: LandmarkGroup::new(points),
            handedness,
            confidence,
        }))
    }

    fn detect_pose(&mut self, frame: &Frame) -> Result<Option<LandmarkGroup>> {
        let min_confidence = self.settings.min_pose_confidence;
        let Some(session) = self.pose.as_mut() else {
            return Ok(None);
        };

        let (input, letterbox) = common::prepare_frame_with_size(frame, POSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = session
            .run(ort::inputs![tensor])
            .context("failed to run pose landmark session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("pose landmark model returned no outputs"));
        }

        let confidence = scalar_output(&outputs, 1).unwrap_or(0.0);
        if confidence < min_confidence {
            return Ok(None);
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let points = common::decode_points(
            &flattened,
            POSE_LANDMARKS,
            POSE_OUTPUT_STRIDE,
            Some(POSE_VISIBILITY_SLOT),
            &letterbox,
        )?;

        Ok(Some(LandmarkGroup::new(points)))
    }
}

impl LandmarkExtractor for OrtLandmarkExtractor {
    fn supports(&self, mode: ExtractionMode) -> bool {
        mode != ExtractionMode::PoseHands || self.pose.is_some()
    }

    fn extract(&mut self, frame: &Frame) -> Result<FrameLandmarks> {
        let pose = self.detect_pose(frame)?;
        let (left_hand, right_hand) = common::assign_hands(self.detect_hands(frame)?);

        Ok(FrameLandmarks {
            pose,
            left_hand,
            right_hand,
        })
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

fn scalar_output(outputs: &SessionOutputs, idx: usize) -> Option<f32> {
    if outputs.len() <= idx {
        return None;
    }
    outputs[idx]
        .try_extract_array::<f32>()
        .ok()
        .and_then(|arr| arr.iter().next().copied())
}
