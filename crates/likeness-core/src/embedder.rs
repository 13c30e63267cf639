//! ArcFace face embedder via ONNX Runtime.
//!
//! Aligns the detected face onto the five-point template (or, without
//! landmarks, crops a square around its box), and returns the L2-normalized
//! 512-dimensional embedding.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{Embedding, FaceBounds};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";
pub const ARCFACE_EMBEDDING_DIM: usize = 512;

/// Euclidean match threshold for unit-length ArcFace embeddings.
///
/// For unit vectors `d² = 2 − 2·cos`; 1.095 corresponds to cosine similarity 0.40.
pub const ARCFACE_MATCH_THRESHOLD: f32 = 1.095;

const ARCFACE_INPUT_SIZE: u32 = ALIGNED_SIZE;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
/// Crop side relative to the larger side of the detected box.
const CROP_MARGIN: f32 = 1.2;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region lies outside the image")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    pub fn embed(&mut self, image: &RgbImage, face: &FaceBounds) -> Result<Embedding, EmbedderError> {
        let crop = face_input(image, face).ok_or(EmbedderError::EmptyCrop)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

/// The 112×112 model input: aligned on landmarks when the detector found them.
fn face_input(image: &RgbImage, face: &FaceBounds) -> Option<RgbImage> {
    if let Some(aligned) = face.landmarks.and_then(|lm| alignment::align_face(image, &lm)) {
        return Some(aligned);
    }
    tracing::debug!("no usable landmarks, falling back to box crop");
    crop_face(image, face)
}

/// Square crop centred on the face, clipped to the image, resized to the model input.
fn crop_face(image: &RgbImage, face: &FaceBounds) -> Option<RgbImage> {
    let side = face.width.max(face.height) * CROP_MARGIN;
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0) as u32;
    let y0 = (cy - side / 2.0).max(0.0) as u32;
    let x1 = ((cx + side / 2.0).max(0.0) as u32).min(image.width());
    let y1 = ((cy + side / 2.0).max(0.0) as u32).min(image.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let region = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(imageops::resize(
        &region,
        ARCFACE_INPUT_SIZE,
        ARCFACE_INPUT_SIZE,
        FilterType::Triangle,
    ))
}

fn preprocess(face: &RgbImage) -> Array4<f32> {
    let n = ARCFACE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, n, n));
    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}
