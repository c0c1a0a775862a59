//! Service configuration, read from TOML.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, ServiceError},
    labels,
    model_download::{
        HAND_LANDMARK_MODEL_FILENAME, HAND_LANDMARK_MODEL_URL, PALM_DETECTOR_MODEL_FILENAME,
        PALM_DETECTOR_MODEL_URL,
    },
    types::ExtractionMode,
};

pub const DEFAULT_SEQUENCE_LENGTH: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Relative model paths are resolved against this directory.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default = "default_targets")]
    pub targets: BTreeMap<String, TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_palm_model")]
    pub palm_model: PathBuf,
    #[serde(default = "default_palm_model_url")]
    pub palm_model_url: Option<String>,
    #[serde(default = "default_hand_model")]
    pub hand_model: PathBuf,
    #[serde(default = "default_hand_model_url")]
    pub hand_model_url: Option<String>,
    #[serde(default)]
    pub pose_model: Option<PathBuf>,
    #[serde(default)]
    pub pose_model_url: Option<String>,
    #[serde(default = "default_min_confidence")]
    pub min_hand_confidence: f32,
    #[serde(default = "default_min_confidence")]
    pub min_pose_confidence: f32,
    #[serde(default = "default_min_confidence")]
    pub min_palm_score: f32,
    #[serde(default = "default_palm_nms_threshold")]
    pub palm_nms_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub model: PathBuf,
    #[serde(default)]
    pub model_url: Option<String>,
    pub mode: ExtractionMode,
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    /// Defaults to the width of `mode`.
    #[serde(default)]
    pub feature_dim: Option<usize>,
    /// Explicit labels, indexed by class id.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// Name of a built-in label table, used when `labels` is absent.
    #[serde(default)]
    pub label_set: Option<String>,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_palm_model() -> PathBuf {
    PathBuf::from(PALM_DETECTOR_MODEL_FILENAME)
}
fn default_palm_model_url() -> Option<String> {
    Some(PALM_DETECTOR_MODEL_URL.to_string())
}
fn default_palm_nms_threshold() -> f32 {
    0.3
}
fn default_hand_model() -> PathBuf {
    PathBuf::from(HAND_LANDMARK_MODEL_FILENAME)
}
fn default_hand_model_url() -> Option<String> {
    Some(HAND_LANDMARK_MODEL_URL.to_string())
}
fn default_min_confidence() -> f32 {
    0.5
}
fn default_sequence_length() -> usize {
    DEFAULT_SEQUENCE_LENGTH
}

fn default_targets() -> BTreeMap<String, TargetConfig> {
    let mut targets = BTreeMap::new();
    targets.insert(
        "alphabet".to_string(),
        TargetConfig {
            model: PathBuf::from("actionAbecedario.onnx"),
            model_url: None,
            mode: ExtractionMode::Hands,
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            feature_dim: None,
            labels: None,
            label_set: Some("alphabet".to_string()),
        },
    );
    targets.insert(
        "words_v2".to_string(),
        TargetConfig {
            model: PathBuf::from("actionPalabrasV2.onnx"),
            model_url: None,
            mode: ExtractionMode::PoseHands,
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            feature_dim: None,
            labels: None,
            label_set: Some("words_v2".to_string()),
        },
    );
    targets
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            extractor: ExtractorConfig::default(),
            targets: default_targets(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            palm_model: default_palm_model(),
            palm_model_url: default_palm_model_url(),
            hand_model: default_hand_model(),
            hand_model_url: default_hand_model_url(),
            pose_model: None,
            pose_model_url: None,
            min_hand_confidence: default_min_confidence(),
            min_pose_confidence: default_min_confidence(),
            min_palm_score: default_min_confidence(),
            palm_nms_threshold: default_palm_nms_threshold(),
        }
    }
}

impl TargetConfig {
    pub fn feature_dim(&self) -> usize {
        self.feature_dim.unwrap_or_else(|| self.mode.feature_width())
    }

    pub fn label_table(&self, target_name: &str) -> Result<Vec<String>> {
        if let Some(labels) = &self.labels {
            return Ok(labels.clone());
        }
        let set = self.label_set.as_deref().unwrap_or(target_name);
        match labels::builtin(set) {
            Some(table) => Ok(table),
            None if self.label_set.is_some() => Err(ServiceError::Configuration(format!(
                "target '{target_name}' names unknown label set '{set}'"
            ))),
            None => {
                log::warn!("target '{target_name}' has no labels, predictions will use placeholders");
                Ok(Vec::new())
            }
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(ServiceError::Configuration(
                "at least one target must be configured".to_string(),
            ));
        }
        for (name, target) in &self.targets {
            if target.sequence_length == 0 {
                return Err(ServiceError::Configuration(format!(
                    "target '{name}': sequence_length must be > 0"
                )));
            }
            let width = target.mode.feature_width();
            if target.feature_dim() != width {
                return Err(ServiceError::Configuration(format!(
                    "target '{name}': feature_dim {} does not match mode '{}' width {width}",
                    target.feature_dim(),
                    target.mode
                )));
            }
            target.label_table(name)?;
        }
        for (field, value) in [
            ("min_hand_confidence", self.extractor.min_hand_confidence),
            ("min_pose_confidence", self.extractor.min_pose_confidence),
            ("min_palm_score", self.extractor.min_palm_score),
            ("palm_nms_threshold", self.extractor.palm_nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ServiceError::Configuration(format!(
                    "{field} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            ServiceError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ServiceError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise `sign-recognizer.toml` in the
    /// working directory if present, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let fallback = Path::new("sign-recognizer.toml");
        if fallback.exists() {
            Self::load(fallback)
        } else {
            Ok(Self::default())
        }
    }

    pub fn resolve_model_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.models_dir.join(path)
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ServiceError::Configuration(e.to_string()))
    }
}
