//! Multi-sample enrollment session for one label.

use crate::extractor::EmbeddingExtractor;
use crate::service::{validate_label, FaceService, RegisterOutcome, Rejection, ServiceError};
use image::RgbImage;

pub const DEFAULT_SAMPLE_QUOTA: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no sample submitted yet.
    Idle,
    AwaitingSample,
    /// Last sample counted against the quota; more are needed.
    SampleAccepted,
    /// Last sample was unusable; quota unchanged.
    SampleRejected(Rejection),
    /// Quota met. Further submissions are ignored.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Accepted { remaining: usize, persisted: bool },
    Rejected(Rejection),
    /// The session had already met its quota; nothing was done.
    AlreadyComplete,
}

#[derive(Debug, Clone)]
pub struct EnrollmentSession {
    label: String,
    quota: usize,
    remaining: usize,
    state: SessionState,
}

impl EnrollmentSession {
    pub fn new(label: &str, quota: usize) -> Result<Self, ServiceError> {
        let label = validate_label(label)?.to_string();
        if quota == 0 {
            return Err(ServiceError::ZeroQuota);
        }
        Ok(Self {
            label,
            quota,
            remaining: quota,
            state: SessionState::Idle,
        })
    }

    pub fn with_default_quota(label: &str) -> Result<Self, ServiceError> {
        Self::new(label, DEFAULT_SAMPLE_QUOTA)
    }

    pub fn begin(&mut self) {
        if self.state == SessionState::Idle {
            tracing::info!(label = %self.label, quota = self.quota, "enrollment session started");
            self.state = SessionState::AwaitingSample;
        }
    }

    /// Submit one captured image.
    ///
    /// The quota only moves after the service reports a durable accept; a
    /// store error propagates and leaves the session as it was.
    pub fn submit<E: EmbeddingExtractor>(
        &mut self,
        service: &mut FaceService<E>,
        image: &RgbImage,
    ) -> Result<CaptureOutcome, ServiceError> {
        match self.state {
            SessionState::Complete => {
                tracing::debug!(label = %self.label, "session complete, sample ignored");
                return Ok(CaptureOutcome::AlreadyComplete);
            }
            SessionState::Idle => self.begin(),
            _ => {}
        }

        match service.register(&self.label, image)? {
            RegisterOutcome::Rejected(rejection) => {
                self.state = SessionState::SampleRejected(rejection);
                Ok(CaptureOutcome::Rejected(rejection))
            }
            RegisterOutcome::Accepted { persisted } => {
                self.remaining -= 1;
                self.state = if self.remaining == 0 {
                    tracing::info!(label = %self.label, samples = self.quota, "enrollment complete");
                    SessionState::Complete
                } else {
                    SessionState::SampleAccepted
                };
                Ok(CaptureOutcome::Accepted {
                    remaining: self.remaining,
                    persisted,
                })
            }
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn accepted(&self) -> usize {
        self.quota - self.remaining
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }
}
