//! likeness-core — Face identity store and matching engine.
//!
//! Turns images into embeddings through an [`EmbeddingExtractor`], gates
//! them on face size, persists them per label in a CSV [`FaceStore`], and
//! answers "who is this?" by Euclidean nearest-neighbour search.

pub mod alignment;
pub mod archive;
pub mod detector;
pub mod embedder;
pub mod enrollment;
pub mod extractor;
pub mod gate;
pub mod recognition;
pub mod service;
pub mod store;
pub mod types;

pub use archive::ImageArchive;
pub use enrollment::{CaptureOutcome, EnrollmentSession, SessionState, DEFAULT_SAMPLE_QUOTA};
pub use extractor::{EmbeddingExtractor, ExtractError, OnnxExtractor};
pub use gate::{GateRejection, SizeGate, DEFAULT_MAX_FACE_SIZE, DEFAULT_MIN_FACE_SIZE};
pub use recognition::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use service::{
    FaceService, IdentifyOutcome, RegisterOutcome, Rejection, SamplePolicy, ServiceError,
    ServiceOptions, Status, UNKNOWN_LABEL,
};
pub use store::{FaceStore, StoreError};
pub use types::{Embedding, FaceBounds, FaceRecord, FaceSample};
