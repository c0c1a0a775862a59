mod common;

use std::{sync::Arc, thread};

use common::*;
use sign_recognizer::{SignService, ServiceError, types::ExtractionMode};
use tempfile::TempDir;

fn service_with(
    classifier: RecordingClassifier,
    extractor: PixelHandExtractor,
) -> SignService {
    SignService::builder()
        .target(alphabet_target(), classifier)
        .unavailable_target(words_target(), "model file missing")
        .extractor(extractor)
        .build()
        .unwrap()
}

fn keypoints(len: usize, width: usize) -> Vec<Vec<f32>> {
    (0..len).map(|i| vec![i as f32; width]).collect()
}

#[test]
fn short_video_is_zero_padded() {
    let classifier = RecordingClassifier::new(vec![0.1, 0.7, 0.2]);
    let extractor = PixelHandExtractor::default();
    let service = service_with(classifier.clone(), extractor.clone());

    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 10);

    let result = service
        .predict_video("alphabet", frames.path(), "hands")
        .unwrap();
    assert_eq!(result.predicted_label, "B");
    assert_eq!(result.probabilities, vec![0.1, 0.7, 0.2]);
    assert_eq!(extractor.calls(), 10);

    let input = classifier.last_input();
    assert_eq!(input.shape(), &[1, 30, 126]);
    for i in 0..10 {
        assert_eq!(input[[0, i, RIGHT_HAND_X]], i as f32);
        assert_eq!(input[[0, i, 0]], 0.0, "left hand absent");
    }
    for i in 10..30 {
        assert!(input.slice(ndarray::s![0, i, ..]).iter().all(|&v| v == 0.0));
    }
}

#[test]
fn long_video_is_sampled_uniformly() {
    let classifier = RecordingClassifier::new(vec![0.9, 0.05, 0.05]);
    let service = service_with(classifier.clone(), PixelHandExtractor::default());

    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 90);

    service
        .predict_video("alphabet", frames.path(), "hands")
        .unwrap();

    let input = classifier.last_input();
    assert_eq!(input.shape(), &[1, 30, 126]);
    let picked: Vec<f32> = (0..30).map(|i| input[[0, i, RIGHT_HAND_X]]).collect();
    assert_eq!(picked[0], 0.0);
    assert_eq!(picked[29], 89.0);
    assert!(picked.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn wrong_keypoint_width_never_reaches_the_model() {
    let classifier = RecordingClassifier::new(vec![1.0, 0.0, 0.0]);
    let service = service_with(classifier.clone(), PixelHandExtractor::default());

    let err = service
        .predict_keypoints("alphabet", keypoints(30, 100))
        .unwrap_err();
    match err {
        ServiceError::InputValidation {
            expected_shape,
            received_shape,
            ..
        } => {
            assert_eq!(expected_shape, Some((30, 126)));
            assert_eq!(received_shape, Some((30, 100)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn caller_keypoints_are_not_resampled() {
    let classifier = RecordingClassifier::new(vec![1.0, 0.0, 0.0]);
    let service = service_with(classifier.clone(), PixelHandExtractor::default());

    let err = service
        .predict_keypoints("alphabet", keypoints(10, 126))
        .unwrap_err();
    assert_eq!(err.shapes(), (Some((30, 126)), Some((10, 126))));

    let result = service
        .predict_keypoints("alphabet", keypoints(30, 126))
        .unwrap();
    assert_eq!(result.predicted_label, "A");
    assert_eq!(classifier.last_input()[[0, 29, 125]], 29.0);
}

#[test]
fn ragged_rows_are_rejected() {
    let service = service_with(
        RecordingClassifier::new(vec![1.0]),
        PixelHandExtractor::default(),
    );
    let mut rows = keypoints(30, 126);
    rows[7].truncate(120);
    let err = service.predict_keypoints("alphabet", rows).unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(err.shapes().1, Some((30, 120)));
}

#[test]
fn short_label_table_falls_back_to_placeholder() {
    let classifier = RecordingClassifier::new(vec![0.1, 0.1, 0.1, 0.7]);
    let service = service_with(classifier, PixelHandExtractor::default());

    let result = service
        .predict_keypoints("alphabet", keypoints(30, 126))
        .unwrap();
    assert_eq!(result.predicted_label, "unknown_class_3");
}

#[test]
fn unloaded_target_is_a_configuration_error() {
    let extractor = PixelHandExtractor::default();
    let service = service_with(RecordingClassifier::new(vec![1.0]), extractor.clone());

    let err = service
        .predict_keypoints("words_v2", keypoints(30, 258))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));
    assert_eq!(err.status_code(), 500);

    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 3);
    let err = service
        .predict_video("words_v2", frames.path(), "pose_hands")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));
    assert_eq!(extractor.calls(), 0);
}

#[test]
fn unknown_target_is_rejected() {
    let service = service_with(
        RecordingClassifier::new(vec![1.0]),
        PixelHandExtractor::default(),
    );
    let err = service
        .predict_keypoints("numbers", keypoints(30, 126))
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("alphabet"));
}

#[test]
fn mode_is_checked_before_anything_else() {
    let extractor = PixelHandExtractor::default();
    let service = service_with(RecordingClassifier::new(vec![1.0]), extractor.clone());
    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 3);

    for target in ["alphabet", "words_v2", "numbers"] {
        let err = service
            .predict_video(target, frames.path(), "face")
            .unwrap_err();
        assert!(err.is_client_error(), "{target}: {err}");
        assert!(err.to_string().contains("face"));
    }

    let err = service
        .predict_video("alphabet", frames.path(), "pose_hands")
        .unwrap_err();
    assert_eq!(err.shapes(), (Some((30, 126)), Some((30, 258))));
    assert_eq!(extractor.calls(), 0);
}

#[test]
fn empty_or_missing_source_is_an_extraction_failure() {
    let classifier = RecordingClassifier::new(vec![1.0]);
    let service = service_with(classifier.clone(), PixelHandExtractor::default());

    let empty = TempDir::new().unwrap();
    let err = service
        .predict_video("alphabet", empty.path(), "hands")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Extraction(_)));
    assert_eq!(err.status_code(), 400);

    let missing = empty.path().join("nope");
    let err = service
        .predict_video("alphabet", &missing, "hands")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Extraction(_)));
    assert_eq!(classifier.calls(), 0);
}

#[test]
fn collaborator_failures_are_server_errors() {
    let service = SignService::builder()
        .target(alphabet_target(), FailingClassifier)
        .extractor(BrokenExtractor)
        .build()
        .unwrap();

    let err = service
        .predict_keypoints("alphabet", keypoints(30, 126))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Inference(_)));

    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 2);
    let err = service
        .predict_video("alphabet", frames.path(), "hands")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Inference(_)));
    assert_eq!(err.status_code(), 500);
}

#[test]
fn missing_extractor_is_a_configuration_error() {
    let service = SignService::builder()
        .target(alphabet_target(), RecordingClassifier::new(vec![1.0]))
        .build()
        .unwrap();
    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 2);
    let err = service
        .predict_video("alphabet", frames.path(), "hands")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));
}

#[test]
fn pose_hands_without_a_pose_model_fails_fast() {
    let extractor = HandsOnlyExtractor::default();
    let classifier = RecordingClassifier::new(vec![1.0, 0.0]);
    let service = SignService::builder()
        .target(alphabet_target(), RecordingClassifier::new(vec![0.0, 1.0, 0.0]))
        .target(words_target(), classifier.clone())
        .extractor(extractor.clone())
        .build()
        .unwrap();
    let frames = TempDir::new().unwrap();
    write_frames(frames.path(), 4);

    let err = service
        .predict_video("words_v2", frames.path(), "pose_hands")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)), "{err:?}");
    assert!(err.to_string().contains("pose_hands"));
    assert_eq!(extractor.inner.calls(), 0);
    assert_eq!(classifier.calls(), 0);

    let result = service
        .predict_video("alphabet", frames.path(), "hands")
        .unwrap();
    assert_eq!(result.predicted_label, "B");
    assert_eq!(extractor.inner.calls(), 4);

    let health = service.health();
    assert!(health.extractor_loaded);
    assert!(!health.pose_landmarks_loaded);
}

#[test]
fn health_without_an_extractor() {
    let service = SignService::builder()
        .target(alphabet_target(), RecordingClassifier::new(vec![1.0]))
        .build()
        .unwrap();
    let health = service.health();
    assert!(!health.extractor_loaded);
    assert!(!health.pose_landmarks_loaded);
}

#[test]
fn health_lists_every_target() {
    let service = service_with(
        RecordingClassifier::new(vec![1.0]),
        PixelHandExtractor::default(),
    );
    let health = service.health();
    assert!(health.extractor_loaded);
    assert!(health.pose_landmarks_loaded);
    assert_eq!(health.targets.len(), 2);

    let alphabet = &health.targets[0];
    assert_eq!(alphabet.name, "alphabet");
    assert!(alphabet.loaded);
    assert_eq!((alphabet.sequence_length, alphabet.feature_dim), (30, 126));

    let words = &health.targets[1];
    assert!(!words.loaded);
    assert_eq!(words.mode, ExtractionMode::PoseHands);
    assert_eq!(words.error.as_deref(), Some("model file missing"));
}

#[test]
fn concurrent_requests_share_one_service() {
    let classifier = RecordingClassifier::new(vec![0.2, 0.3, 0.5]);
    let service = Arc::new(service_with(classifier.clone(), PixelHandExtractor::default()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service
                    .predict_keypoints("alphabet", keypoints(30, 126))
                    .unwrap()
                    .predicted_label
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "C");
    }
    assert_eq!(classifier.calls(), 8);
}
