use std::{fmt, str::FromStr};

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::Shape;

pub const POSE_LANDMARKS: usize = 33;
pub const HAND_LANDMARKS: usize = 21;
pub const POSE_POINT_WIDTH: usize = 4;
pub const HAND_POINT_WIDTH: usize = 3;
pub const POSE_WIDTH: usize = POSE_LANDMARKS * POSE_POINT_WIDTH;
pub const HAND_WIDTH: usize = HAND_LANDMARKS * HAND_POINT_WIDTH;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// Points in the detector's canonical landmark order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkGroup {
    pub points: Vec<LandmarkPoint>,
}

impl LandmarkGroup {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }
}

/// One frame's worth of detections. `None` means the detector found nothing
/// for that group, which is different from a present but degenerate group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameLandmarks {
    pub pose: Option<LandmarkGroup>,
    pub left_hand: Option<LandmarkGroup>,
    pub right_hand: Option<LandmarkGroup>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Hands,
    PoseHands,
}

impl ExtractionMode {
    pub const ALL: [ExtractionMode; 2] = [ExtractionMode::Hands, ExtractionMode::PoseHands];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Hands => "hands",
            ExtractionMode::PoseHands => "pose_hands",
        }
    }

    /// Width of one flattened frame; depends on nothing but the mode.
    pub fn feature_width(&self) -> usize {
        match self {
            ExtractionMode::Hands => 2 * HAND_WIDTH,
            ExtractionMode::PoseHands => POSE_WIDTH + 2 * HAND_WIDTH,
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown extraction mode '{}', expected 'hands' or 'pose_hands'",
            self.0
        )
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for ExtractionMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExtractionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

pub type FeatureVector = Vec<f32>;

/// A sequence of per-frame feature vectors ready to be handed to a classifier
/// once. Frames are not required to share a width until the shape check.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceTensor {
    frames: Vec<FeatureVector>,
}

impl SequenceTensor {
    pub fn from_frames(frames: Vec<FeatureVector>) -> Self {
        Self { frames }
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[FeatureVector] {
        &self.frames
    }

    /// Reported shape: frame count and the width of the first frame.
    pub fn shape(&self) -> Shape {
        let width = self.frames.first().map(Vec::len).unwrap_or(0);
        (self.frames.len(), width)
    }

    /// Adds the leading batch axis, giving `(1, L, D)`.
    pub fn into_batch(self) -> anyhow::Result<Array3<f32>> {
        let (len, width) = self.shape();
        let flat: Vec<f32> = self.frames.into_iter().flatten().collect();
        Array3::from_shape_vec((1, len, width), flat)
            .map_err(|err| anyhow::anyhow!("failed to build input tensor: {err}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "prediction")]
    pub predicted_label: String,
    pub probabilities: Vec<f32>,
}
