//! Admission control over retrieval scores, decided before any model call.

use serde::Serialize;

use crate::config::ConfidenceConfig;

/// Verdict for one retrieval result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confidence {
    Proceed { best: f32 },
    /// Usable, but weak enough to flag to the reader.
    Warn { best: f32 },
    /// `best` is `None` when no finite score was supplied.
    Refuse { best: Option<f32> },
}

impl Confidence {
    #[must_use]
    pub fn best(self) -> Option<f32> {
        match self {
            Self::Proceed { best } | Self::Warn { best } => Some(best),
            Self::Refuse { best } => best,
        }
    }

    #[must_use]
    pub fn allows_generation(self) -> bool {
        !matches!(self, Self::Refuse { .. })
    }

    #[must_use]
    pub fn level(self) -> ConfidenceLevel {
        match self {
            Self::Proceed { .. } => ConfidenceLevel::High,
            Self::Warn { .. } => ConfidenceLevel::Low,
            Self::Refuse { .. } => ConfidenceLevel::Insufficient,
        }
    }
}

/// Label recorded with every answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Low,
    Insufficient,
    /// Nothing was retrieved, so no score exists.
    Unscored,
}

impl ConfidenceLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Insufficient => "insufficient",
            Self::Unscored => "unscored",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidencePolicy {
    min_score: f32,
    warn_score: f32,
}

impl ConfidencePolicy {
    /// `warn_score` is raised to `min_score` if configured below it.
    #[must_use]
    pub fn new(min_score: f32, warn_score: f32) -> Self {
        Self {
            min_score,
            warn_score: warn_score.max(min_score),
        }
    }

    #[must_use]
    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self::new(config.min_score, config.warn_score)
    }

    #[must_use]
    pub fn min_score(&self) -> f32 {
        self.min_score
    }

    #[must_use]
    pub fn warn_score(&self) -> f32 {
        self.warn_score
    }

    /// Judge a set of similarity scores by their best finite member.
    #[must_use]
    pub fn assess(&self, scores: &[f32]) -> Confidence {
        let best = scores
            .iter()
            .copied()
            .filter(|s| s.is_finite())
            .reduce(f32::max);

        match best {
            None => Confidence::Refuse { best: None },
            Some(best) if best < self.min_score => Confidence::Refuse { best: Some(best) },
            Some(best) if best < self.warn_score => Confidence::Warn { best },
            Some(best) => Confidence::Proceed { best },
        }
    }
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self::from_config(&ConfidenceConfig::default())
    }
}
