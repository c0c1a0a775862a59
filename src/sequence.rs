use crate::{
    error::{Result, ServiceError},
    types::{FeatureVector, SequenceTensor},
};

/// Brings an observed sequence of `N` frames to exactly `target_len` frames.
///
/// Short sequences keep every frame and are right-padded with all-zero frames
/// of the observed width. Long sequences are resampled uniformly over the whole
/// clip so both the first and the last frame survive. Frame widths are not
/// checked here.
pub fn normalize_sequence(frames: Vec<FeatureVector>, target_len: usize) -> Result<SequenceTensor> {
    if frames.is_empty() {
        return Err(ServiceError::Extraction(
            "no frames were extracted from the source".to_string(),
        ));
    }
    if target_len == 0 {
        return Err(ServiceError::Configuration(
            "target sequence length must be positive".to_string(),
        ));
    }

    let observed = frames.len();
    if observed <= target_len {
        let width = frames[0].len();
        let mut padded = frames;
        padded.resize_with(target_len, || vec![0.0; width]);
        return Ok(SequenceTensor::from_frames(padded));
    }

    let sampled = uniform_indices(observed, target_len)
        .into_iter()
        .map(|idx| frames[idx].clone())
        .collect();
    Ok(SequenceTensor::from_frames(sampled))
}

/// `target_len` indices spread evenly over `[0, observed - 1]`:
/// `round(i * (observed - 1) / (target_len - 1))`, half rounded up.
/// A single-frame target takes index 0. Indices never decrease and may repeat.
pub fn uniform_indices(observed: usize, target_len: usize) -> Vec<usize> {
    if observed == 0 || target_len == 0 {
        return Vec::new();
    }
    if target_len == 1 {
        return vec![0];
    }

    let span = observed - 1;
    let steps = target_len - 1;
    (0..target_len)
        .map(|i| (2 * i * span + steps) / (2 * steps))
        .collect()
}
