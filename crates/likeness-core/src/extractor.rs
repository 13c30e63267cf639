//! The embedding extraction capability consumed by the service.

use crate::detector::{DetectorError, FaceDetector};
use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::FaceSample;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Recoverable: the image simply has no usable face.
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder error: {0}")]
    Embedder(#[from] EmbedderError),
}

/// Turns an RGB image into the primary face's embedding and bounds.
///
/// Implementations must be deterministic for a fixed model and input and
/// consider only the primary (highest-confidence) face.
pub trait EmbeddingExtractor {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<FaceSample, ExtractError>;

    /// Dimension of the embeddings this extractor produces.
    fn dimension(&self) -> usize;
}

impl<E: EmbeddingExtractor + ?Sized> EmbeddingExtractor for Box<E> {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<FaceSample, ExtractError> {
        (**self).detect_and_embed(image)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// SCRFD detection followed by ArcFace embedding, both on ONNX Runtime.
pub struct OnnxExtractor {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxExtractor {
    pub fn new(detector: FaceDetector, embedder: FaceEmbedder) -> Self {
        Self { detector, embedder }
    }

    /// Load both models from `model_dir` using their conventional file names.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(crate::detector::SCRFD_MODEL_FILE))?;
        tracing::info!("SCRFD detector loaded");
        let embedder = FaceEmbedder::load(&model_dir.join(crate::embedder::ARCFACE_MODEL_FILE))?;
        tracing::info!("ArcFace embedder loaded");
        Ok(Self::new(detector, embedder))
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn detect_and_embed(&mut self, image: &RgbImage) -> Result<FaceSample, ExtractError> {
        let faces = self.detector.detect(image)?;
        // Detections come back sorted by confidence; only the primary face counts.
        let Some(bounds) = faces.first().copied() else {
            return Err(ExtractError::NoFaceDetected);
        };
        if faces.len() > 1 {
            tracing::debug!(faces = faces.len(), "multiple faces detected, using the primary one");
        }

        let embedding = self.embedder.embed(image, &bounds)?;
        Ok(FaceSample { embedding, bounds })
    }

    fn dimension(&self) -> usize {
        crate::embedder::ARCFACE_EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_empty_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxExtractor::load(dir.path());
        assert!(matches!(
            result,
            Err(ExtractError::Detector(DetectorError::ModelNotFound(ref p)))
                if p.ends_with(crate::detector::SCRFD_MODEL_FILE)
        ));
    }
}
