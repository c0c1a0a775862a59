//! JSON request and response bodies.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
    error::{Result, ServiceError, Shape},
    service::SignService,
    types::{FeatureVector, PredictionResult},
};

#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

impl From<ServiceError> for ApiResponse {
    fn from(err: ServiceError) -> Self {
        ApiResponse {
            status: err.status_code(),
            body: serde_json::to_value(ErrorBody::from(&err)).unwrap_or_else(|_| json!({ "error": err.to_string() })),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_shape: Option<Shape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    received_shape: Option<Shape>,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        let (expected_shape, received_shape) = err.shapes();
        ErrorBody {
            error: err.to_string(),
            expected_shape,
            received_shape,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoRequest {
    url_video: String,
    type_extract: String,
}

/// Handles `{"keypoints": [[f32; D]; L]}` for `target`.
pub fn predict_keypoints_json(service: &SignService, target: &str, body: &str) -> ApiResponse {
    respond(service.ensure_ready(target).and_then(|()| {
        let keypoints = parse_keypoints(body)?;
        service.predict_keypoints(target, keypoints)
    }))
}

/// Handles `{"url_video": <frame source>, "type_extract": "hands" | "pose_hands"}`.
///
/// The mode lives in the body, so the body is read first; an unknown mode
/// is then rejected before the target is looked up.
pub fn predict_video_json(service: &SignService, target: &str, body: &str) -> ApiResponse {
    respond(parse_video_request(body).and_then(|request| {
        service.predict_video(target, Path::new(&request.url_video), &request.type_extract)
    }))
}

pub fn health_json(service: &SignService) -> ApiResponse {
    match serde_json::to_value(service.health()) {
        Ok(body) => ApiResponse::ok(body),
        Err(err) => ServiceError::Configuration(err.to_string()).into(),
    }
}

fn respond(result: Result<PredictionResult>) -> ApiResponse {
    match result.and_then(|prediction| {
        serde_json::to_value(prediction).map_err(|err| ServiceError::Inference(err.to_string()))
    }) {
        Ok(body) => ApiResponse::ok(body),
        Err(err) => {
            if err.is_client_error() {
                log::info!("rejected request: {err}");
            } else {
                log::error!("request failed: {err}");
            }
            err.into()
        }
    }
}

fn parse_object(body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::invalid("request body must be a JSON object")),
        Err(err) => Err(ServiceError::invalid(format!("request body is not valid JSON: {err}"))),
    }
}

fn parse_video_request(body: &str) -> Result<VideoRequest> {
    serde_json::from_value(Value::Object(parse_object(body)?))
        .map_err(|err| ServiceError::invalid(format!("invalid video request: {err}")))
}

fn parse_keypoints(body: &str) -> Result<Vec<FeatureVector>> {
    let mut request = parse_object(body)?;
    let keypoints = request
        .remove("keypoints")
        .filter(|value| !value.is_null())
        .ok_or_else(|| ServiceError::invalid("missing 'keypoints' field"))?;

    serde_json::from_value(keypoints)
        .map_err(|err| ServiceError::invalid(format!("'keypoints' must be a list of numeric rows: {err}")))
}
