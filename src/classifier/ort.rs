use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::Array3;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::{Tensor, ValueType};

use super::SequenceClassifier;

/// Input dimensions a model declares for `(batch, sequence, feature)`.
/// Dynamic axes come back as `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModelInputShape {
    pub sequence_length: Option<usize>,
    pub feature_dim: Option<usize>,
}

pub struct OrtSequenceClassifier {
    session: Session,
    input_shape: ModelInputShape,
}

impl OrtSequenceClassifier {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load sign classifier from {}", model_path.display())
            })?;

        let input_shape = declared_input_shape(&session);
        log::debug!(
            "sign classifier {} declares input {:?}",
            model_path.display(),
            input_shape
        );

        Ok(Self {
            session,
            input_shape,
        })
    }

    pub fn input_shape(&self) -> ModelInputShape {
        self.input_shape
    }
}

impl SequenceClassifier for OrtSequenceClassifier {
    fn infer(&mut self, input: Array3<f32>) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run sign classifier session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("sign classifier returned no outputs"));
        }

        let scores = outputs[0].try_extract_array::<f32>()?;
        Ok(scores.iter().copied().collect())
    }
}

fn declared_input_shape(session: &Session) -> ModelInputShape {
    let Some(input) = session.inputs.first() else {
        return ModelInputShape::default();
    };
    let ValueType::Tensor { shape, .. } = &input.input_type else {
        return ModelInputShape::default();
    };

    let dims: Vec<i64> = shape.iter().copied().collect();
    let axis = |idx: usize| {
        dims.get(idx)
            .copied()
            .filter(|d| *d > 0)
            .map(|d| d as usize)
    };

    ModelInputShape {
        sequence_length: axis(1),
        feature_dim: axis(2),
    }
}

/// Prints a model's inputs and outputs.
pub fn describe_model(model_path: &Path) -> Result<String> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load model from {}", model_path.display()))?;

    let mut out = String::new();
    out.push_str("Inputs:\n");
    for (idx, input) in session.inputs.iter().enumerate() {
        out.push_str(&format!(
            "  {}: name=\"{}\" type={:?}\n",
            idx, input.name, input.input_type
        ));
    }
    out.push_str("Outputs:\n");
    for (idx, output) in session.outputs.iter().enumerate() {
        out.push_str(&format!(
            "  {}: name=\"{}\" type={:?}\n",
            idx, output.name, output.output_type
        ));
    }
    Ok(out)
}
