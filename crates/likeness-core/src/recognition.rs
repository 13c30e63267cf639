//! Nearest-neighbour matching of a probe embedding against stored samples.

use crate::types::Embedding;

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// True when the closest candidate lies strictly within the threshold.
    pub matched: bool,
    /// Distance to the closest candidate, `None` for an empty gallery.
    pub distance: Option<f32>,
    /// Label of the closest candidate, set only when `matched`.
    pub label: Option<String>,
}

/// Strategy for comparing a probe against `(label, embedding)` candidates.
pub trait Matcher {
    fn compare<'a, I>(&self, probe: &Embedding, candidates: I) -> MatchResult
    where
        I: IntoIterator<Item = (&'a str, &'a Embedding)>;
}

/// Euclidean nearest-neighbour matcher with a strict distance threshold.
///
/// Every candidate is visited; the first candidate reaching the minimum
/// distance in iteration order wins ties.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn compare<'a, I>(&self, probe: &Embedding, candidates: I) -> MatchResult
    where
        I: IntoIterator<Item = (&'a str, &'a Embedding)>,
    {
        let mut best: Option<(&str, f32)> = None;

        for (label, embedding) in candidates {
            let distance = probe.euclidean_distance(embedding);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((label, distance));
            }
        }

        match best {
            Some((label, distance)) if distance < self.threshold => MatchResult {
                matched: true,
                distance: Some(distance),
                label: Some(label.to_string()),
            },
            _ => MatchResult {
                matched: false,
                distance: best.map(|(_, d)| d),
                label: None,
            },
        }
    }
}
