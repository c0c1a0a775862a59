mod ort;

use ndarray::Array3;

use crate::{
    error::{Result, Shape, ServiceError},
    types::{ExtractionMode, PredictionResult, SequenceTensor},
};

pub use self::ort::{ModelInputShape, OrtSequenceClassifier, describe_model};

/// A trained sequence classifier: `(1, L, D)` in, one score per class out.
pub trait SequenceClassifier: Send + 'static {
    fn infer(&mut self, input: Array3<f32>) -> anyhow::Result<Vec<f32>>;
}

/// What a classifier expects and how to name its classes. Built once at
/// startup and shared read-only.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierTarget {
    pub name: String,
    pub mode: ExtractionMode,
    pub expected_sequence_length: usize,
    pub expected_feature_dim: usize,
    pub label_table: Vec<String>,
}

impl ClassifierTarget {
    pub fn new(
        name: impl Into<String>,
        mode: ExtractionMode,
        expected_sequence_length: usize,
        expected_feature_dim: usize,
        label_table: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            expected_sequence_length,
            expected_feature_dim,
            label_table,
        }
    }

    pub fn expected_shape(&self) -> Shape {
        (self.expected_sequence_length, self.expected_feature_dim)
    }

    /// Label for a class id. Ids past the end of the table get a placeholder
    /// so a short table degrades instead of failing the request.
    pub fn resolve_label(&self, class_id: usize) -> String {
        match self.label_table.get(class_id) {
            Some(label) => label.clone(),
            None => {
                log::warn!(
                    "class {class_id} has no label in '{}' ({} labels)",
                    self.name,
                    self.label_table.len()
                );
                format!("unknown_class_{class_id}")
            }
        }
    }
}

/// Index of the highest score, lowest index on ties. NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

pub fn resolve_prediction(probabilities: Vec<f32>, target: &ClassifierTarget) -> Result<PredictionResult> {
    let class_id = argmax(&probabilities).ok_or_else(|| {
        ServiceError::Inference("classifier returned no usable probabilities".to_string())
    })?;

    Ok(PredictionResult {
        predicted_label: target.resolve_label(class_id),
        probabilities,
    })
}

/// Runs one inference on an already validated tensor.
pub fn classify(
    classifier: &mut dyn SequenceClassifier,
    tensor: SequenceTensor,
    target: &ClassifierTarget,
) -> Result<PredictionResult> {
    let probabilities = run_inference(classifier, tensor)?;
    resolve_prediction(probabilities, target)
}

pub(crate) fn run_inference(
    classifier: &mut dyn SequenceClassifier,
    tensor: SequenceTensor,
) -> Result<Vec<f32>> {
    let input = tensor
        .into_batch()
        .map_err(|err| ServiceError::Inference(format!("{err:#}")))?;
    classifier.infer(input).map_err(|err| {
        log::warn!("sequence classifier failed: {err:?}");
        ServiceError::Inference(format!("{err:#}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(labels: &[&str]) -> ClassifierTarget {
        ClassifierTarget::new(
            "test",
            ExtractionMode::Hands,
            2,
            3,
            labels.iter().map(|l| l.to_string()).collect(),
        )
    }

    struct Fixed(Vec<f32>, Option<Vec<usize>>);

    impl SequenceClassifier for Fixed {
        fn infer(&mut self, input: Array3<f32>) -> anyhow::Result<Vec<f32>> {
            self.1 = Some(input.shape().to_vec());
            Ok(self.0.clone())
        }
    }

    #[test]
    fn argmax_breaks_ties_towards_lowest_index() {
        assert_eq!(argmax(&[0.5, 0.5, 0.0]), Some(0));
        assert_eq!(argmax(&[0.1, 0.2, 0.7]), Some(2));
        assert_eq!(argmax(&[0.3, 0.6, 0.6]), Some(1));
    }

    #[test]
    fn argmax_skips_nan_and_handles_empty() {
        assert_eq!(argmax(&[f32::NAN, 0.1, 0.05]), Some(1));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn label_within_table() {
        assert_eq!(target(&["hola", "bien"]).resolve_label(1), "bien");
    }

    #[test]
    fn label_past_table_is_placeholder() {
        let label = target(&["hola"]).resolve_label(7);
        assert!(label.contains('7'));
    }

    #[test]
    fn classify_adds_batch_axis_and_resolves() {
        let mut classifier = Fixed(vec![0.2, 0.8], None);
        let tensor = SequenceTensor::from_frames(vec![vec![0.0; 3]; 2]);
        let result = classify(&mut classifier, tensor, &target(&["A", "B"])).unwrap();
        assert_eq!(classifier.1, Some(vec![1, 2, 3]));
        assert_eq!(result.predicted_label, "B");
        assert_eq!(result.probabilities, vec![0.2, 0.8]);
    }

    #[test]
    fn empty_output_is_an_inference_error() {
        let mut classifier = Fixed(Vec::new(), None);
        let tensor = SequenceTensor::from_frames(vec![vec![0.0; 3]; 2]);
        let err = classify(&mut classifier, tensor, &target(&["A"])).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));
    }
}
