use thiserror::Error;

/// (sequence_length, feature_dim)
pub type Shape = (usize, usize);

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required model or target is not available; the request never started.
    #[error("{0}")]
    Configuration(String),

    /// The caller sent something unusable.
    #[error("{message}")]
    InputValidation {
        message: String,
        expected_shape: Option<Shape>,
        received_shape: Option<Shape>,
    },

    /// The landmark extractor produced no frames for the source.
    #[error("could not extract keypoints: {0}")]
    Extraction(String),

    /// Normalization produced a tensor that does not fit the target.
    #[error("internal shape error: expected {expected:?}, got {received:?}")]
    InternalShape { expected: Shape, received: Shape },

    /// A call into an external model failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InputValidation {
            message: message.into(),
            expected_shape: None,
            received_shape: None,
        }
    }

    pub fn shape_mismatch(expected: Shape, received: Shape) -> Self {
        ServiceError::InputValidation {
            message: "keypoint sequence has the wrong shape".to_string(),
            expected_shape: Some(expected),
            received_shape: Some(received),
        }
    }

    pub fn not_loaded(target: &str) -> Self {
        ServiceError::Configuration(format!("recognition model for '{target}' is not loaded"))
    }

    /// Bad input rather than a server-side fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InputValidation { .. } | ServiceError::Extraction(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }

    pub fn shapes(&self) -> (Option<Shape>, Option<Shape>) {
        match self {
            ServiceError::InputValidation {
                expected_shape,
                received_shape,
                ..
            } => (*expected_shape, *received_shape),
            ServiceError::InternalShape { expected, received } => {
                (Some(*expected), Some(*received))
            }
            _ => (None, None),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_map_to_distinct_status_codes() {
        assert_eq!(ServiceError::shape_mismatch((30, 126), (30, 100)).status_code(), 400);
        assert_eq!(ServiceError::Extraction("empty".into()).status_code(), 400);
        assert_eq!(ServiceError::not_loaded("alphabet").status_code(), 500);
        assert_eq!(
            ServiceError::InternalShape {
                expected: (30, 126),
                received: (29, 126)
            }
            .status_code(),
            500
        );
        assert_eq!(ServiceError::Inference("boom".into()).status_code(), 500);
    }

    #[test]
    fn shape_mismatch_carries_both_shapes() {
        let err = ServiceError::shape_mismatch((30, 126), (30, 100));
        assert_eq!(err.shapes(), (Some((30, 126)), Some((30, 100))));
    }
}
