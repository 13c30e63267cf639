//! Size gating — keeps faces outside the usable pixel-width band out of
//! both the enrollment and the recognition path.

use crate::types::FaceBounds;
use thiserror::Error;

pub const DEFAULT_MIN_FACE_SIZE: u32 = 160;
pub const DEFAULT_MAX_FACE_SIZE: u32 = 320;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    #[error("face too far away")]
    TooFar { width: u32, min: u32 },
    #[error("face too close")]
    TooClose { width: u32, max: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("min_face_size ({min}) must not exceed max_face_size ({max})")]
pub struct InvalidGate {
    pub min: u32,
    pub max: u32,
}

/// Inclusive `[min_face_size, max_face_size]` band on detected face width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGate {
    min_face_size: u32,
    max_face_size: u32,
}

impl SizeGate {
    pub fn new(min_face_size: u32, max_face_size: u32) -> Result<Self, InvalidGate> {
        if min_face_size > max_face_size {
            return Err(InvalidGate {
                min: min_face_size,
                max: max_face_size,
            });
        }
        Ok(Self {
            min_face_size,
            max_face_size,
        })
    }

    pub fn min_face_size(&self) -> u32 {
        self.min_face_size
    }

    pub fn max_face_size(&self) -> u32 {
        self.max_face_size
    }

    /// Check a raw pixel width against the band.
    pub fn check_width(&self, width: u32) -> Result<(), GateRejection> {
        if width < self.min_face_size {
            Err(GateRejection::TooFar {
                width,
                min: self.min_face_size,
            })
        } else if width > self.max_face_size {
            Err(GateRejection::TooClose {
                width,
                max: self.max_face_size,
            })
        } else {
            Ok(())
        }
    }

    pub fn check(&self, bounds: &FaceBounds) -> Result<(), GateRejection> {
        self.check_width(bounds.width_px())
    }
}

impl Default for SizeGate {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            max_face_size: DEFAULT_MAX_FACE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_band() {
        let gate = SizeGate::default();
        assert_eq!(gate.min_face_size(), 160);
        assert_eq!(gate.max_face_size(), 320);
    }

    #[test]
    fn test_below_min_is_too_far() {
        let gate = SizeGate::default();
        for width in [0, 1, 100, 159] {
            assert_eq!(
                gate.check_width(width),
                Err(GateRejection::TooFar { width, min: 160 })
            );
        }
    }

    #[test]
    fn test_above_max_is_too_close() {
        let gate = SizeGate::default();
        for width in [321, 400, u32::MAX] {
            assert_eq!(
                gate.check_width(width),
                Err(GateRejection::TooClose { width, max: 320 })
            );
        }
    }

    #[test]
    fn test_band_is_inclusive() {
        let gate = SizeGate::default();
        for width in 160..=320 {
            assert!(gate.check_width(width).is_ok(), "width {width} should pass");
        }
    }

    #[test]
    fn test_single_width_band() {
        let gate = SizeGate::new(200, 200).unwrap();
        assert!(gate.check_width(200).is_ok());
        assert!(gate.check_width(199).is_err());
        assert!(gate.check_width(201).is_err());
    }

    #[test]
    fn test_inverted_band_rejected() {
        assert_eq!(SizeGate::new(300, 200), Err(InvalidGate { min: 300, max: 200 }));
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(GateRejection::TooFar { width: 100, min: 160 }.to_string(), "face too far away");
        assert_eq!(GateRejection::TooClose { width: 400, max: 320 }.to_string(), "face too close");
    }

    #[test]
    fn test_check_uses_rounded_width() {
        let gate = SizeGate::default();
        let bounds = FaceBounds { x: 0.0, y: 0.0, width: 159.5, height: 180.0, confidence: 0.9, landmarks: None };
        assert!(gate.check(&bounds).is_ok());
    }
}
