//! `register` / `identify` — the operations shells call.
//!
//! Extraction and gating failures come back as [`Rejection`]s inside the
//! outcome and never change state. Store and model failures come back as
//! [`ServiceError`].

use crate::archive::ImageArchive;
use crate::extractor::{EmbeddingExtractor, ExtractError};
use crate::gate::{GateRejection, SizeGate};
use crate::recognition::{EuclideanMatcher, Matcher};
use crate::store::{FaceStore, StoreError};
use crate::types::FaceSample;
use chrono::{Local, NaiveDateTime, Timelike};
use image::RgbImage;
use std::fmt;
use thiserror::Error;

/// Label reported by `identify` when no stored face is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },
    #[error("sample quota must be at least 1")]
    ZeroQuota,
    #[error("extractor produces {extractor}-dim embeddings but the store holds {store}-dim")]
    DimensionMismatch { extractor: usize, store: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extractor(ExtractError),
    /// The extractor returned a vector the store cannot hold.
    #[error("extractor produced an unusable embedding: {0}")]
    InvalidEmbedding(#[source] StoreError),
}

/// Why a sample was unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoFaceDetected,
    FaceTooFar,
    FaceTooClose,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NoFaceDetected => "no face detected",
            Rejection::FaceTooFar => "face too far away",
            Rejection::FaceTooClose => "face too close",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl From<GateRejection> for Rejection {
    fn from(r: GateRejection) -> Self {
        match r {
            GateRejection::TooFar { .. } => Rejection::FaceTooFar,
            GateRejection::TooClose { .. } => Rejection::FaceTooClose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

/// What happened to one `register` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The sample passed; `persisted` tells whether it became a new record.
    Accepted { persisted: bool },
    Rejected(Rejection),
}

impl RegisterOutcome {
    pub fn status(&self) -> Status {
        match self {
            RegisterOutcome::Accepted { .. } => Status::Success,
            RegisterOutcome::Rejected(_) => Status::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == Status::Success
    }

    pub fn reason(&self) -> &'static str {
        match self {
            RegisterOutcome::Accepted { .. } => "success",
            RegisterOutcome::Rejected(r) => r.reason(),
        }
    }
}

/// What happened to one `identify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifyOutcome {
    Recognized { label: String },
    Unknown,
    Rejected(Rejection),
}

impl IdentifyOutcome {
    /// The matched label, [`UNKNOWN_LABEL`], or `None` if the probe was unusable.
    pub fn label(&self) -> Option<&str> {
        match self {
            IdentifyOutcome::Recognized { label } => Some(label),
            IdentifyOutcome::Unknown => Some(UNKNOWN_LABEL),
            IdentifyOutcome::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            IdentifyOutcome::Recognized { .. } => "success",
            IdentifyOutcome::Unknown => "not recognized",
            IdentifyOutcome::Rejected(r) => r.reason(),
        }
    }
}

/// How accepted samples for a label become records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SamplePolicy {
    /// Every accepted sample is stored and matched independently.
    #[default]
    AllSamples,
    /// Only the first accepted sample of a never-seen label is stored;
    /// later samples are accepted but not persisted.
    FirstSampleOnly,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceOptions {
    pub gate: SizeGate,
    pub matcher: EuclideanMatcher,
    pub policy: SamplePolicy,
}

/// Owns the store and the extractor; all access goes through `&mut self`,
/// which serializes writers to the store.
pub struct FaceService<E> {
    extractor: E,
    store: FaceStore,
    options: ServiceOptions,
    archive: Option<ImageArchive>,
}

impl<E: EmbeddingExtractor> FaceService<E> {
    pub fn new(extractor: E, store: FaceStore, options: ServiceOptions) -> Result<Self, ServiceError> {
        if extractor.dimension() != store.dimension() {
            return Err(ServiceError::DimensionMismatch {
                extractor: extractor.dimension(),
                store: store.dimension(),
            });
        }
        Ok(Self {
            extractor,
            store,
            options,
            archive: None,
        })
    }

    /// Keep a copy of every accepted enrollment image.
    pub fn with_archive(mut self, archive: ImageArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn store(&self) -> &FaceStore {
        &self.store
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Validate and, per the sample policy, persist one enrollment sample.
    ///
    /// The record is durable before this returns `Accepted`; a write error
    /// is returned as-is and nothing is counted.
    pub fn register(&mut self, label: &str, image: &RgbImage) -> Result<RegisterOutcome, ServiceError> {
        let label = validate_label(label)?;

        let sample = match self.gated_sample(image)? {
            Ok(sample) => sample,
            Err(rejection) => {
                tracing::debug!(label, %rejection, "enrollment sample rejected");
                return Ok(RegisterOutcome::Rejected(rejection));
            }
        };

        let persisted = match self.options.policy {
            SamplePolicy::AllSamples => true,
            SamplePolicy::FirstSampleOnly => !self.store.contains_label(label),
        };
        if persisted {
            self.store.append(label, sample.embedding, now())?;
        } else {
            tracing::debug!(label, "label already enrolled, sample not persisted");
        }

        if let Some(archive) = &self.archive {
            if let Err(err) = archive.save(label, image) {
                tracing::warn!(label, error = %err, "failed to archive enrollment image");
            }
        }

        Ok(RegisterOutcome::Accepted { persisted })
    }

    /// Find the closest stored face within the match threshold.
    pub fn identify(&mut self, image: &RgbImage) -> Result<IdentifyOutcome, ServiceError> {
        let sample = match self.gated_sample(image)? {
            Ok(sample) => sample,
            Err(rejection) => return Ok(IdentifyOutcome::Rejected(rejection)),
        };

        let result = self
            .options
            .matcher
            .compare(&sample.embedding, self.store.labels_and_embeddings());
        tracing::debug!(
            matched = result.matched,
            distance = ?result.distance,
            candidates = self.store.len(),
            "identify compared probe"
        );

        Ok(match result.label {
            Some(label) if result.matched => IdentifyOutcome::Recognized { label },
            _ => IdentifyOutcome::Unknown,
        })
    }

    /// End the service's lifecycle, closing the store.
    pub fn close(self) {
        self.store.close();
    }

    /// Extract the primary face, apply the size gate and check the vector fits the store.
    fn gated_sample(&mut self, image: &RgbImage) -> Result<Result<FaceSample, Rejection>, ServiceError> {
        let sample = match self.extractor.detect_and_embed(image) {
            Ok(sample) => sample,
            Err(ExtractError::NoFaceDetected) => return Ok(Err(Rejection::NoFaceDetected)),
            Err(err) => return Err(ServiceError::Extractor(err)),
        };

        if let Err(rejection) = self.options.gate.check(&sample.bounds) {
            tracing::debug!(width = sample.bounds.width_px(), %rejection, "face outside size band");
            return Ok(Err(rejection.into()));
        }
        self.store
            .check_embedding(&sample.embedding)
            .map_err(ServiceError::InvalidEmbedding)?;
        Ok(Ok(sample))
    }
}

/// A label must be non-empty and usable as a single directory name.
pub fn validate_label(label: &str) -> Result<&str, ServiceError> {
    let trimmed = label.trim();
    let reason = if trimmed.is_empty() {
        Some("label must not be empty")
    } else if trimmed == "." || trimmed == ".." {
        Some("label must not be a relative path")
    } else if trimmed.contains(['/', '\\']) || trimmed.chars().any(char::is_control) {
        Some("label must not contain path separators or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ServiceError::InvalidLabel {
            label: label.to_string(),
            reason,
        }),
        None => Ok(trimmed),
    }
}

fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    // The timestamp column has whole-second resolution.
    now.with_nanosecond(0).unwrap_or(now)
}
