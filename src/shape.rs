use crate::{
    classifier::ClassifierTarget,
    error::{Result, ServiceError},
    types::SequenceTensor,
};

/// Where a candidate tensor came from. Decides whether a mismatch is the
/// caller's fault or a pipeline defect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeOrigin {
    Caller,
    Pipeline,
}

pub fn validate_shape(
    tensor: &SequenceTensor,
    target: &ClassifierTarget,
    origin: ShapeOrigin,
) -> Result<()> {
    let expected = target.expected_shape();
    let Some(received) = observed_mismatch(tensor, expected) else {
        return Ok(());
    };

    match origin {
        ShapeOrigin::Caller => Err(ServiceError::shape_mismatch(expected, received)),
        ShapeOrigin::Pipeline => {
            log::error!(
                "normalized sequence for '{}' has shape {received:?}, expected {expected:?}",
                target.name
            );
            Err(ServiceError::InternalShape { expected, received })
        }
    }
}

/// Returns the shape to report when the tensor does not fit. A ragged tensor
/// reports the width of its first offending frame.
fn observed_mismatch(tensor: &SequenceTensor, expected: (usize, usize)) -> Option<(usize, usize)> {
    let len = tensor.len();
    let (expected_len, expected_dim) = expected;

    if let Some(bad) = tensor
        .frames()
        .iter()
        .find(|frame| frame.len() != expected_dim)
    {
        return Some((len, bad.len()));
    }
    if len != expected_len {
        return Some(tensor.shape());
    }
    None
}
