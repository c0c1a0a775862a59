mod common;
mod ort;
mod palm;

use crate::{
    error::{Result, ServiceError},
    features::flatten_frame,
    types::{ExtractionMode, FeatureVector, Frame, FrameLandmarks},
};

pub use self::ort::{ExtractorSettings, OrtLandmarkExtractor};

/// Detects landmark groups in a single frame.
pub trait LandmarkExtractor: Send + 'static {
    /// Whether this extractor has the models `mode` needs.
    fn supports(&self, _mode: ExtractionMode) -> bool {
        true
    }

    fn extract(&mut self, frame: &Frame) -> anyhow::Result<FrameLandmarks>;
}

/// Runs the extractor over every frame the source yields and flattens each
/// result for `mode`. A failing extractor call fails the whole sequence.
pub fn extract_sequence<E, I>(extractor: &mut E, frames: I, mode: ExtractionMode) -> Result<Vec<FeatureVector>>
where
    E: LandmarkExtractor + ?Sized,
    I: IntoIterator<Item = Frame>,
{
    let mut sequence = Vec::new();
    for (idx, frame) in frames.into_iter().enumerate() {
        let landmarks = extractor.extract(&frame).map_err(|err| {
            log::warn!("landmark extraction failed on frame {idx}: {err:?}");
            ServiceError::Inference(format!("landmark extraction failed on frame {idx}: {err:#}"))
        })?;
        sequence.push(flatten_frame(&landmarks, mode));
    }

    log::debug!("extracted {} frames in {mode} mode", sequence.len());
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LandmarkGroup, LandmarkPoint};

    struct Scripted {
        calls: usize,
        fail_on: Option<usize>,
    }

    impl LandmarkExtractor for Scripted {
        fn extract(&mut self, _frame: &Frame) -> anyhow::Result<FrameLandmarks> {
            let call = self.calls;
            self.calls += 1;
            if Some(call) == self.fail_on {
                anyhow::bail!("detector crashed");
            }
            let hand = LandmarkGroup::new(vec![LandmarkPoint::new(call as f32, 0.0, 0.0); 21]);
            Ok(FrameLandmarks {
                left_hand: (call % 2 == 0).then_some(hand),
                ..Default::default()
            })
        }
    }

    fn blank_frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|_| Frame {
                rgba: vec![0; 4],
                width: 1,
                height: 1,
            })
            .collect()
    }

    #[test]
    fn one_vector_per_frame_in_order() {
        let mut extractor = Scripted {
            calls: 0,
            fail_on: None,
        };
        let seq = extract_sequence(&mut extractor, blank_frames(4), ExtractionMode::PoseHands).unwrap();
        assert_eq!(seq.len(), 4);
        assert!(seq.iter().all(|v| v.len() == 258));
        assert_eq!(seq[2][132], 2.0);
        assert!(seq[1].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_source_gives_empty_sequence() {
        let mut extractor = Scripted {
            calls: 0,
            fail_on: None,
        };
        let seq = extract_sequence(&mut extractor, Vec::new(), ExtractionMode::Hands).unwrap();
        assert!(seq.is_empty());
    }

    #[test]
    fn extractor_failure_aborts() {
        let mut extractor = Scripted {
            calls: 0,
            fail_on: Some(1),
        };
        let err = extract_sequence(&mut extractor, blank_frames(3), ExtractionMode::Hands).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));
        assert_eq!(extractor.calls, 2);
    }
}
