#![allow(dead_code)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use image::{Rgba, RgbaImage};
use ndarray::Array3;
use sign_recognizer::{
    classifier::{ClassifierTarget, SequenceClassifier},
    extractor::LandmarkExtractor,
    types::{ExtractionMode, Frame, FrameLandmarks, HAND_LANDMARKS, LandmarkGroup, LandmarkPoint},
};

/// Returns fixed scores and keeps every tensor it was given.
#[derive(Clone)]
pub struct RecordingClassifier {
    scores: Vec<f32>,
    pub inputs: Arc<Mutex<Vec<Array3<f32>>>>,
}

impl RecordingClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            inputs: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn last_input(&self) -> Array3<f32> {
        self.inputs.lock().unwrap().last().cloned().expect("no inference ran")
    }
}

impl SequenceClassifier for RecordingClassifier {
    fn infer(&mut self, input: Array3<f32>) -> anyhow::Result<Vec<f32>> {
        self.inputs.lock().unwrap().push(input);
        Ok(self.scores.clone())
    }
}

pub struct FailingClassifier;

impl SequenceClassifier for FailingClassifier {
    fn infer(&mut self, _input: Array3<f32>) -> anyhow::Result<Vec<f32>> {
        Err(anyhow!("session exploded"))
    }
}

/// Reports a right hand whose x coordinates equal the red value of the
/// frame's first pixel, so each frame's origin is visible in the features.
#[derive(Clone, Default)]
pub struct PixelHandExtractor {
    pub calls: Arc<Mutex<usize>>,
}

impl PixelHandExtractor {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl LandmarkExtractor for PixelHandExtractor {
    fn extract(&mut self, frame: &Frame) -> anyhow::Result<FrameLandmarks> {
        *self.calls.lock().unwrap() += 1;
        let x = frame.rgba[0] as f32;
        Ok(FrameLandmarks {
            right_hand: Some(LandmarkGroup::new(vec![
                LandmarkPoint::new(x, 0.5, 0.0);
                HAND_LANDMARKS
            ])),
            ..FrameLandmarks::default()
        })
    }
}

/// Has a hand model but no pose model.
#[derive(Clone, Default)]
pub struct HandsOnlyExtractor {
    pub inner: PixelHandExtractor,
}

impl LandmarkExtractor for HandsOnlyExtractor {
    fn supports(&self, mode: ExtractionMode) -> bool {
        mode == ExtractionMode::Hands
    }

    fn extract(&mut self, frame: &Frame) -> anyhow::Result<FrameLandmarks> {
        self.inner.extract(frame)
    }
}

pub struct BrokenExtractor;

impl LandmarkExtractor for BrokenExtractor {
    fn extract(&mut self, _frame: &Frame) -> anyhow::Result<FrameLandmarks> {
        Err(anyhow!("detector crashed"))
    }
}

/// Offset of the right hand's first x in a `hands` feature vector.
pub const RIGHT_HAND_X: usize = HAND_LANDMARKS * 3;

pub fn alphabet_target() -> ClassifierTarget {
    ClassifierTarget::new(
        "alphabet",
        ExtractionMode::Hands,
        30,
        ExtractionMode::Hands.feature_width(),
        vec!["A".into(), "B".into(), "C".into()],
    )
}

pub fn words_target() -> ClassifierTarget {
    ClassifierTarget::new(
        "words_v2",
        ExtractionMode::PoseHands,
        30,
        ExtractionMode::PoseHands.feature_width(),
        vec!["hola".into(), "adios".into()],
    )
}

/// Writes `count` 2x2 frames whose red channel is the frame index.
pub fn write_frames(dir: &Path, count: u8) {
    for idx in 0..count {
        RgbaImage::from_pixel(2, 2, Rgba([idx, 0, 0, 255]))
            .save(dir.join(format!("frame_{idx:03}.png")))
            .unwrap();
    }
}
