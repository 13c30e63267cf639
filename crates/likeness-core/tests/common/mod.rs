//! Shared fixtures: a scripted extractor and helpers for building services.

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use likeness_core::detector::DetectorError;
use likeness_core::{
    EmbeddingExtractor, Embedding, ExtractError, FaceBounds, FaceSample, FaceService, FaceStore,
    ServiceOptions,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

pub const DIM: usize = 4;

/// What the fake extractor returns for the next image.
#[derive(Debug, Clone)]
pub enum Scripted {
    Face { values: Vec<f32>, width: f32 },
    NoFace,
    ModelFailure,
}

pub fn face(values: &[f32], width: f32) -> Scripted {
    Scripted::Face {
        values: values.to_vec(),
        width,
    }
}

/// Replays a queue of scripted results, one per call.
///
/// The queue is shared so a test can keep pushing after the extractor has
/// moved into a service.
#[derive(Clone, Default)]
pub struct ScriptedExtractor {
    queue: Rc<RefCell<VecDeque<Scripted>>>,
}

impl ScriptedExtractor {
    pub fn push(&self, item: Scripted) {
        self.queue.borrow_mut().push_back(item);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl EmbeddingExtractor for ScriptedExtractor {
    fn detect_and_embed(&mut self, _image: &RgbImage) -> Result<FaceSample, ExtractError> {
        let next = self
            .queue
            .borrow_mut()
            .pop_front()
            .expect("extractor called more often than scripted");
        match next {
            Scripted::Face { values, width } => Ok(FaceSample {
                embedding: Embedding::new(values),
                bounds: FaceBounds {
                    x: 10.0,
                    y: 10.0,
                    width,
                    height: width * 1.2,
                    confidence: 0.99,
                    landmarks: None,
                },
            }),
            Scripted::NoFace => Err(ExtractError::NoFaceDetected),
            Scripted::ModelFailure => Err(ExtractError::Detector(DetectorError::InferenceFailed(
                "scripted failure".into(),
            ))),
        }
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

pub fn frame() -> RgbImage {
    RgbImage::from_pixel(64, 48, Rgb([90, 120, 150]))
}

pub fn service_at(
    path: &Path,
    options: ServiceOptions,
) -> (FaceService<ScriptedExtractor>, ScriptedExtractor) {
    let extractor = ScriptedExtractor::default();
    let store = FaceStore::open(path, DIM).expect("open store");
    let service = FaceService::new(extractor.clone(), store, options).expect("build service");
    (service, extractor)
}
