//! identify() against a real on-disk store with a scripted extractor.

mod common;

use common::{face, frame, service_at, Scripted, ScriptedExtractor, DIM};
use likeness_core::{
    EuclideanMatcher, FaceService, FaceStore, IdentifyOutcome, Rejection, ServiceError,
    ServiceOptions, StoreError,
};

const ALICE: [f32; DIM] = [0.1, 0.2, 0.3, 0.4];

fn enrolled_alice(dir: &std::path::Path) -> (FaceService<ScriptedExtractor>, ScriptedExtractor) {
    let (mut service, extractor) = service_at(&dir.join("faces.csv"), ServiceOptions::default());
    extractor.push(face(&ALICE, 200.0));
    assert!(service.register("alice", &frame()).unwrap().is_success());
    (service, extractor)
}

#[test]
fn empty_store_is_always_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = service_at(&dir.path().join("faces.csv"), ServiceOptions::default());

    extractor.push(face(&ALICE, 200.0));
    let outcome = service.identify(&frame()).unwrap();
    assert_eq!(outcome, IdentifyOutcome::Unknown);
    assert_eq!(outcome.label(), Some("unknown"));
    assert_eq!(outcome.reason(), "not recognized");
}

#[test]
fn exact_embedding_returns_its_label() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    extractor.push(face(&ALICE, 250.0));
    let outcome = service.identify(&frame()).unwrap();
    assert_eq!(outcome.label(), Some("alice"));
    assert_eq!(outcome.reason(), "success");
}

#[test]
fn close_probe_within_threshold_matches() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    // Distance 0.05 from the stored embedding.
    extractor.push(face(&[0.15, 0.2, 0.3, 0.4], 200.0));
    let outcome = service.identify(&frame()).unwrap();
    assert_eq!((outcome.label(), outcome.reason()), (Some("alice"), "success"));
}

#[test]
fn distant_probe_is_not_recognized() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    // Distance 0.9 from the only stored embedding.
    extractor.push(face(&[1.0, 0.2, 0.3, 0.4], 200.0));
    let outcome = service.identify(&frame()).unwrap();
    assert_eq!((outcome.label(), outcome.reason()), (Some("unknown"), "not recognized"));
}

#[test]
fn nearest_label_wins_among_several() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());
    extractor.push(face(&[0.1, 0.2, 0.3, 0.7], 200.0));
    service.register("bob", &frame()).unwrap();

    extractor.push(face(&[0.1, 0.2, 0.3, 0.62], 200.0));
    let outcome = service.identify(&frame()).unwrap();
    assert_eq!(outcome.label(), Some("bob"));
}

#[test]
fn custom_threshold_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let options = ServiceOptions {
        matcher: EuclideanMatcher::new(0.01),
        ..ServiceOptions::default()
    };
    let (mut service, extractor) = service_at(&dir.path().join("faces.csv"), options);
    extractor.push(face(&ALICE, 200.0));
    service.register("alice", &frame()).unwrap();

    extractor.push(face(&[0.15, 0.2, 0.3, 0.4], 200.0));
    assert_eq!(service.identify(&frame()).unwrap(), IdentifyOutcome::Unknown);
}

#[test]
fn size_gate_applies_to_probes() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    extractor.push(face(&ALICE, 100.0));
    let far = service.identify(&frame()).unwrap();
    assert_eq!(far, IdentifyOutcome::Rejected(Rejection::FaceTooFar));
    assert_eq!(far.label(), None);
    assert_eq!(far.reason(), "face too far away");

    extractor.push(face(&ALICE, 321.0));
    let close = service.identify(&frame()).unwrap();
    assert_eq!(close.reason(), "face too close");
}

#[test]
fn no_face_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    extractor.push(Scripted::NoFace);
    let outcome = service.identify(&frame()).unwrap();
    assert_eq!(outcome, IdentifyOutcome::Rejected(Rejection::NoFaceDetected));
    assert_eq!(outcome.reason(), "no face detected");
}

#[test]
fn model_failure_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    extractor.push(Scripted::ModelFailure);
    assert!(matches!(service.identify(&frame()), Err(ServiceError::Extractor(_))));
}

#[test]
fn unusable_face_vector_is_an_extractor_fault() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, extractor) = enrolled_alice(dir.path());

    extractor.push(face(&[0.1, f32::NAN, 0.3, 0.4], 200.0));
    assert!(matches!(
        service.identify(&frame()),
        Err(ServiceError::InvalidEmbedding(StoreError::NonFinite))
    ));

    extractor.push(face(&[0.1, 0.2, 0.3], 200.0));
    assert!(matches!(
        service.identify(&frame()),
        Err(ServiceError::InvalidEmbedding(StoreError::Dimension { expected: 4, actual: 3 }))
    ));

    // A gate rejection still wins over a bad vector.
    extractor.push(face(&[f32::INFINITY; DIM], 90.0));
    assert_eq!(
        service.identify(&frame()).unwrap(),
        IdentifyOutcome::Rejected(Rejection::FaceTooFar)
    );
}

#[test]
fn enrolled_faces_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faces.csv");
    {
        let (service, _) = enrolled_alice(dir.path());
        service.close();
    }

    let (mut service, extractor) = service_at(&path, ServiceOptions::default());
    assert_eq!(service.store().len(), 1);
    extractor.push(face(&ALICE, 200.0));
    assert_eq!(service.identify(&frame()).unwrap().label(), Some("alice"));
}

#[test]
fn extractor_and_store_dimensions_must_agree() {
    let dir = tempfile::tempdir().unwrap();
    let store = FaceStore::open(dir.path().join("faces.csv"), DIM + 1).unwrap();
    let result = FaceService::new(ScriptedExtractor::default(), store, ServiceOptions::default());
    assert!(matches!(
        result,
        Err(ServiceError::DimensionMismatch { extractor: 4, store: 5 })
    ));
}
