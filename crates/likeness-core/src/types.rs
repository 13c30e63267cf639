use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for ArcFace, 128 for dlib ResNet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of components in the vector.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Both embeddings must have the same dimension; callers check this
    /// before comparing (the store rejects mismatched vectors on write).
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Pixel-space box around the primary detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point landmarks: left eye, right eye, nose, left and right mouth corner.
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceBounds {
    /// Box width in whole pixels, as seen by the size gate.
    pub fn width_px(&self) -> u32 {
        self.width.max(0.0).round() as u32
    }
}

/// One detected face: its identity vector and where it was found.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub embedding: Embedding,
    pub bounds: FaceBounds,
}

/// A persisted `(label, embedding, timestamp)` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRecord {
    pub label: String,
    pub embedding: Embedding,
    pub enrolled_at: NaiveDateTime,
}
