use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::Serialize;

use crate::{
    classifier::{
        ClassifierTarget, OrtSequenceClassifier, SequenceClassifier, resolve_prediction,
        run_inference,
    },
    config::{ServiceConfig, TargetConfig},
    error::{Result, ServiceError},
    extractor::{ExtractorSettings, LandmarkExtractor, OrtLandmarkExtractor, extract_sequence},
    model_download::{ModelKind, ensure_model_ready},
    sequence::normalize_sequence,
    shape::{ShapeOrigin, validate_shape},
    source::ImageSequence,
    types::{ExtractionMode, FeatureVector, PredictionResult, SequenceTensor},
    worker::Worker,
};

type ClassifierWorker = Worker<SequenceTensor, Vec<f32>>;
type ExtractorWorker = Worker<ExtractionJob, Vec<FeatureVector>>;

struct ExtractionJob {
    source: PathBuf,
    mode: ExtractionMode,
}

enum TargetState {
    Ready(ClassifierWorker),
    Unavailable(String),
}

struct ExtractorHandle {
    worker: ExtractorWorker,
    modes: Vec<ExtractionMode>,
}

struct TargetHandle {
    target: Arc<ClassifierTarget>,
    state: TargetState,
}

#[derive(Clone, Debug, Serialize)]
pub struct TargetStatus {
    pub name: String,
    pub loaded: bool,
    pub mode: ExtractionMode,
    pub sequence_length: usize,
    pub feature_dim: usize,
    pub labels: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub targets: Vec<TargetStatus>,
    pub extractor_loaded: bool,
    /// Whether `pose_hands` extraction is available.
    pub pose_landmarks_loaded: bool,
}

/// Serves sign predictions for a fixed set of classifier targets.
///
/// Targets are immutable once the service is built. Each classifier and the
/// landmark extractor run on their own worker thread, so `&SignService` can
/// be shared freely between request threads.
pub struct SignService {
    targets: BTreeMap<String, TargetHandle>,
    extractor: Option<ExtractorHandle>,
}

impl SignService {
    pub fn builder() -> SignServiceBuilder {
        SignServiceBuilder::default()
    }

    /// Loads every configured model. A model that fails to load leaves its
    /// target registered but unavailable instead of aborting startup.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let mut builder = SignService::builder();

        for (name, target_config) in &config.targets {
            let labels = target_config.label_table(name)?;
            match load_classifier(config, name, target_config) {
                Ok((classifier, sequence_length)) => {
                    let target = ClassifierTarget::new(
                        name.clone(),
                        target_config.mode,
                        sequence_length,
                        target_config.feature_dim(),
                        labels,
                    );
                    log::info!(
                        "loaded target '{name}' ({} mode, shape {:?}, {} labels)",
                        target.mode,
                        target.expected_shape(),
                        target.label_table.len()
                    );
                    builder = builder.target(target, classifier);
                }
                Err(err) => {
                    log::error!("failed to load target '{name}': {err:?}");
                    let target = ClassifierTarget::new(
                        name.clone(),
                        target_config.mode,
                        target_config.sequence_length,
                        target_config.feature_dim(),
                        labels,
                    );
                    builder = builder.unavailable_target(target, format!("{err:#}"));
                }
            }
        }

        match load_extractor(config) {
            Ok(extractor) => {
                log::info!("landmark extractor ready");
                builder = builder.extractor(extractor);
            }
            Err(err) => log::error!("failed to load landmark extractor: {err:?}"),
        }

        builder
            .build()
            .map_err(|err| ServiceError::Configuration(format!("{err:#}")))
    }

    pub fn health(&self) -> HealthReport {
        let targets = self
            .targets
            .iter()
            .map(|(name, handle)| TargetStatus {
                name: name.clone(),
                loaded: matches!(handle.state, TargetState::Ready(_)),
                mode: handle.target.mode,
                sequence_length: handle.target.expected_sequence_length,
                feature_dim: handle.target.expected_feature_dim,
                labels: handle.target.label_table.len(),
                error: match &handle.state {
                    TargetState::Unavailable(reason) => Some(reason.clone()),
                    TargetState::Ready(_) => None,
                },
            })
            .collect();

        HealthReport {
            targets,
            extractor_loaded: self.extractor.is_some(),
            pose_landmarks_loaded: self
                .extractor
                .as_ref()
                .is_some_and(|handle| handle.modes.contains(&ExtractionMode::PoseHands)),
        }
    }

    pub fn target(&self, name: &str) -> Result<Arc<ClassifierTarget>> {
        self.handle(name).map(|handle| Arc::clone(&handle.target))
    }

    /// Fails unless `name` is registered and its model is loaded.
    pub fn ensure_ready(&self, name: &str) -> Result<()> {
        self.handle(name)?.ready().map(|_| ())
    }

    /// Classifies a caller-supplied sequence. It must already have the
    /// target's exact shape; nothing is padded or resampled.
    pub fn predict_keypoints(
        &self,
        target_name: &str,
        keypoints: Vec<FeatureVector>,
    ) -> Result<PredictionResult> {
        let handle = self.handle(target_name)?;
        let classifier = handle.ready()?;

        let tensor = SequenceTensor::from_frames(keypoints);
        validate_shape(&tensor, &handle.target, ShapeOrigin::Caller)?;

        predict(classifier, tensor, &handle.target)
    }

    /// Extracts landmarks from every frame of `source`, normalizes the
    /// sequence to the target length and classifies it.
    pub fn predict_video(
        &self,
        target_name: &str,
        source: &Path,
        mode: &str,
    ) -> Result<PredictionResult> {
        let mode = mode
            .parse::<ExtractionMode>()
            .map_err(|err| ServiceError::invalid(err.to_string()))?;

        let handle = self.handle(target_name)?;
        let classifier = handle.ready()?;
        let target = &handle.target;

        if mode.feature_width() != target.expected_feature_dim {
            return Err(ServiceError::InputValidation {
                message: format!(
                    "extraction mode '{mode}' produces {} features per frame, target '{}' expects {}",
                    mode.feature_width(),
                    target.name,
                    target.expected_feature_dim
                ),
                expected_shape: Some(target.expected_shape()),
                received_shape: Some((target.expected_sequence_length, mode.feature_width())),
            });
        }

        let extractor = self.extractor.as_ref().ok_or_else(|| {
            ServiceError::Configuration("landmark extractor is not loaded".to_string())
        })?;
        if !extractor.modes.contains(&mode) {
            return Err(ServiceError::Configuration(format!(
                "landmark extractor cannot serve '{mode}' mode, its landmark model is not loaded"
            )));
        }
        let frames = extractor.worker.call(ExtractionJob {
            source: source.to_path_buf(),
            mode,
        })?;
        log::debug!(
            "extracted {} frames from {} for '{}'",
            frames.len(),
            source.display(),
            target.name
        );

        let tensor = normalize_sequence(frames, target.expected_sequence_length)?;
        validate_shape(&tensor, target, ShapeOrigin::Pipeline)?;

        predict(classifier, tensor, target)
    }

    fn handle(&self, name: &str) -> Result<&TargetHandle> {
        self.targets.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.targets.keys().map(String::as_str).collect();
            ServiceError::invalid(format!(
                "unknown target '{name}', expected one of: {}",
                known.join(", ")
            ))
        })
    }
}

impl TargetHandle {
    fn ready(&self) -> Result<&ClassifierWorker> {
        match &self.state {
            TargetState::Ready(worker) => Ok(worker),
            TargetState::Unavailable(_) => Err(ServiceError::not_loaded(&self.target.name)),
        }
    }
}

fn predict(
    classifier: &ClassifierWorker,
    tensor: SequenceTensor,
    target: &ClassifierTarget,
) -> Result<PredictionResult> {
    let probabilities = classifier.call(tensor)?;
    let result = resolve_prediction(probabilities, target)?;
    log::debug!("'{}' predicted {}", target.name, result.predicted_label);
    Ok(result)
}

fn load_classifier(
    config: &ServiceConfig,
    name: &str,
    target_config: &TargetConfig,
) -> anyhow::Result<(OrtSequenceClassifier, usize)> {
    let model_path = config.resolve_model_path(&target_config.model);
    ensure_model_ready(
        ModelKind::SignClassifier,
        &model_path,
        target_config.model_url.as_deref(),
    )?;

    let classifier = OrtSequenceClassifier::new(&model_path)?;
    let declared = classifier.input_shape();

    if let Some(dim) = declared.feature_dim {
        if dim != target_config.feature_dim() {
            anyhow::bail!(
                "model {} takes {dim} features per frame but target '{name}' uses mode '{}' ({} features)",
                model_path.display(),
                target_config.mode,
                target_config.feature_dim()
            );
        }
    }

    let sequence_length = match declared.sequence_length {
        Some(len) if len != target_config.sequence_length => {
            log::warn!(
                "target '{name}' configured for {} frames but model declares {len}, using the model's",
                target_config.sequence_length
            );
            len
        }
        Some(len) => len,
        None => target_config.sequence_length,
    };

    Ok((classifier, sequence_length))
}

fn load_extractor(config: &ServiceConfig) -> anyhow::Result<OrtLandmarkExtractor> {
    let extractor_config = &config.extractor;

    let palm_path = config.resolve_model_path(&extractor_config.palm_model);
    ensure_model_ready(
        ModelKind::PalmDetector,
        &palm_path,
        extractor_config.palm_model_url.as_deref(),
    )?;

    let hand_path = config.resolve_model_path(&extractor_config.hand_model);
    ensure_model_ready(
        ModelKind::HandLandmarks,
        &hand_path,
        extractor_config.hand_model_url.as_deref(),
    )?;

    let pose_path = match &extractor_config.pose_model {
        Some(path) => {
            let pose_path = config.resolve_model_path(path);
            ensure_model_ready(
                ModelKind::PoseLandmarks,
                &pose_path,
                extractor_config.pose_model_url.as_deref(),
            )?;
            Some(pose_path)
        }
        None => None,
    };

    let settings = ExtractorSettings {
        min_hand_confidence: extractor_config.min_hand_confidence,
        min_pose_confidence: extractor_config.min_pose_confidence,
        min_palm_score: extractor_config.min_palm_score,
        palm_nms_threshold: extractor_config.palm_nms_threshold,
    };
    OrtLandmarkExtractor::new(&palm_path, &hand_path, pose_path.as_deref(), settings)
        .context("failed to build landmark extractor")
}

#[derive(Default)]
pub struct SignServiceBuilder {
    ready: Vec<(ClassifierTarget, Box<dyn SequenceClassifier>)>,
    unavailable: Vec<(ClassifierTarget, String)>,
    extractor: Option<Box<dyn LandmarkExtractor>>,
}

impl SignServiceBuilder {
    pub fn target<C: SequenceClassifier>(mut self, target: ClassifierTarget, classifier: C) -> Self {
        self.ready.push((target, Box::new(classifier)));
        self
    }

    /// Registers a target whose model could not be loaded; its requests fail
    /// with a configuration error.
    pub fn unavailable_target(mut self, target: ClassifierTarget, reason: impl Into<String>) -> Self {
        self.unavailable.push((target, reason.into()));
        self
    }

    pub fn extractor<E: LandmarkExtractor>(mut self, extractor: E) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn build(self) -> anyhow::Result<SignService> {
        let mut targets = BTreeMap::new();

        for (target, mut classifier) in self.ready {
            let worker = Worker::spawn(format!("classifier-{}", target.name), move |tensor: SequenceTensor| {
                run_inference(classifier.as_mut(), tensor)
            })?;
            targets.insert(
                target.name.clone(),
                TargetHandle {
                    target: Arc::new(target),
                    state: TargetState::Ready(worker),
                },
            );
        }
        for (target, reason) in self.unavailable {
            targets.insert(
                target.name.clone(),
                TargetHandle {
                    target: Arc::new(target),
                    state: TargetState::Unavailable(reason),
                },
            );
        }

        let extractor = match self.extractor {
            Some(mut extractor) => {
                let modes: Vec<ExtractionMode> = ExtractionMode::ALL
                    .into_iter()
                    .filter(|mode| extractor.supports(*mode))
                    .collect();
                for handle in targets.values() {
                    if !modes.contains(&handle.target.mode) {
                        log::warn!(
                            "target '{}' uses '{}' mode, which the landmark extractor cannot serve; its video requests will fail",
                            handle.target.name,
                            handle.target.mode
                        );
                    }
                }

                let worker = Worker::spawn("landmark-extractor", move |job: ExtractionJob| {
                    let source = ImageSequence::open(&job.source);
                    if source.is_empty() {
                        log::warn!("no frames found in {}", job.source.display());
                    } else {
                        log::debug!("reading {} frames from {}", source.len(), job.source.display());
                    }
                    extract_sequence(extractor.as_mut(), source.frames(), job.mode)
                })?;
                Some(ExtractorHandle { worker, modes })
            }
            None => None,
        };

        Ok(SignService { targets, extractor })
    }
}
