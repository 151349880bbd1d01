//! Factor math for relevance scoring.
//!
//! base  = Σ wᵢ·factorᵢ / Σ wᵢ            (topic, source, type, importance, author)
//! final = clamp01(base · time · engagement)
//!
//! Preference factors live in `[-1, 1]`, the rest in `[0, 1]`; engagement in
//! `[1, 2]`. Every factor enters with a non-negative weight or multiplier, so
//! raising any one of them never lowers the final score.

use serde::Serialize;

use super::RankingWeights;

/// Hours over which `time_factor` decays linearly to zero.
pub const DECAY_HOURS: f32 = 168.0;
pub const MAX_ENGAGEMENT_FACTOR: f32 = 2.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ScoreFactors {
    pub topic: f32,
    pub source: f32,
    pub author: f32,
    pub content_type: f32,
    pub importance: f32,
    pub time: f32,
    pub engagement: f32,
}

impl ScoreFactors {
    /// First factor that is NaN or infinite, by name.
    pub fn non_finite(&self) -> Option<&'static str> {
        [
            ("topic", self.topic),
            ("source", self.source),
            ("author", self.author),
            ("content_type", self.content_type),
            ("importance", self.importance),
            ("time", self.time),
            ("engagement", self.engagement),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
    }
}

pub fn base_score(f: &ScoreFactors, w: &RankingWeights) -> f32 {
    let raw = f.topic * w.topic
        + f.source * w.source
        + f.content_type * w.content_type
        + f.importance * w.importance
        + f.author * w.author;
    let denom = w.sum().max(1e-6);
    raw / denom
}

pub fn final_score(f: &ScoreFactors, w: &RankingWeights) -> f32 {
    (base_score(f, w) * f.time * f.engagement).clamp(0.0, 1.0)
}

/// Linear one-week decay; items dated in the future count as brand new.
pub fn time_factor(hours_old: f32) -> f32 {
    if hours_old <= 0.0 {
        return 1.0;
    }
    (1.0 - hours_old / DECAY_HOURS).max(0.0)
}

pub fn engagement_factor(engagement: f32) -> f32 {
    (1.0 + engagement.max(0.0) / 10.0).min(MAX_ENGAGEMENT_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factors() -> ScoreFactors {
        ScoreFactors {
            topic: 0.5,
            source: 0.2,
            author: 0.0,
            content_type: 1.0,
            importance: 0.5,
            time: 1.0,
            engagement: 1.0,
        }
    }

    #[test]
    fn default_weights_give_plain_weighted_sum() {
        let w = RankingWeights::default();
        let expected = 0.5 * 0.4 + 0.2 * 0.2 + 1.0 * 0.15 + 0.5 * 0.15;
        assert!((base_score(&factors(), &w) - expected).abs() < 1e-6);
    }

    #[test]
    fn decay_and_engagement_bounds() {
        assert_eq!(time_factor(-5.0), 1.0);
        assert!((time_factor(84.0) - 0.5).abs() < 1e-6);
        assert_eq!(time_factor(500.0), 0.0);
        assert_eq!(engagement_factor(0.0), 1.0);
        assert!((engagement_factor(5.0) - 1.5).abs() < 1e-6);
        assert_eq!(engagement_factor(1e6), 2.0);
        assert_eq!(engagement_factor(-3.0), 1.0);
    }

    #[test]
    fn final_is_clamped() {
        let w = RankingWeights::default();
        let mut f = factors();
        f.topic = 1.0;
        f.source = 1.0;
        f.importance = 1.0;
        f.author = 1.0;
        f.engagement = 2.0;
        assert_eq!(final_score(&f, &w), 1.0);
        f.topic = -1.0;
        f.source = -1.0;
        f.author = -1.0;
        f.content_type = 0.0;
        f.importance = 0.0;
        assert_eq!(final_score(&f, &w), 0.0);
    }

    #[test]
    fn reports_first_non_finite_factor() {
        let mut f = factors();
        assert_eq!(f.non_finite(), None);
        f.importance = f32::NAN;
        assert_eq!(f.non_finite(), Some("importance"));
    }
}
