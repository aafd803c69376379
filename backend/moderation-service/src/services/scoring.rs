//! Score aggregation and the block decision

use crate::models::{
    CategoryScores, ImageScores, ScoreCategory, SignalSet, TextCategory, TextScores,
};
use serde::{Deserialize, Serialize};

/// Per-category block thresholds. Each is checked on its own and the results
/// are OR-combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreThresholds {
    pub toxicity: i32,
    pub spam: i32,
    pub sexual_content: i32,
    pub nsfw: i32,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            toxicity: 70,
            spam: 65,
            sexual_content: 80,
            nsfw: 75,
        }
    }
}

impl ScoreThresholds {
    fn threshold(&self, category: ScoreCategory) -> Option<i32> {
        match category {
            ScoreCategory::Toxicity => Some(self.toxicity),
            ScoreCategory::Spam => Some(self.spam),
            ScoreCategory::SexualContent => Some(self.sexual_content),
            ScoreCategory::Nsfw => Some(self.nsfw),
            ScoreCategory::Profanity
            | ScoreCategory::Violence
            | ScoreCategory::Drug
            | ScoreCategory::Weapon => None,
        }
    }
}

/// Decision for one analysis pass
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    /// Clamped to 0..=100 for storage
    pub scores: CategoryScores,
    pub should_block: bool,
    pub hard_override: Option<TextCategory>,
    /// Category charged to the trust ledger when blocked, with its raw score
    pub trigger: Option<(ScoreCategory, i32)>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    thresholds: ScoreThresholds,
}

impl ScoreAggregator {
    pub fn new(thresholds: ScoreThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ScoreThresholds {
        &self.thresholds
    }

    /// Sum signal deltas into text category scores (uncapped)
    pub fn text_scores(signals: &SignalSet) -> TextScores {
        let mut scores = TextScores::default();
        for (category, delta) in signals.signals.iter().filter_map(|s| s.contribution()) {
            match category {
                ScoreCategory::Toxicity => scores.toxicity += delta,
                ScoreCategory::Profanity => scores.profanity += delta,
                ScoreCategory::Spam => scores.spam += delta,
                ScoreCategory::SexualContent => scores.sexual_content += delta,
                ScoreCategory::Nsfw
                | ScoreCategory::Violence
                | ScoreCategory::Drug
                | ScoreCategory::Weapon => {}
            }
        }
        scores
    }

    /// Sum signal deltas into image category scores (uncapped)
    pub fn image_scores(signals: &SignalSet) -> ImageScores {
        let mut scores = ImageScores::default();
        for (category, delta) in signals.signals.iter().filter_map(|s| s.contribution()) {
            match category {
                ScoreCategory::Nsfw => scores.nsfw += delta,
                ScoreCategory::Violence => scores.violence += delta,
                ScoreCategory::Drug => scores.drug += delta,
                ScoreCategory::Weapon => scores.weapon += delta,
                ScoreCategory::Spam => scores.spam += delta,
                ScoreCategory::Toxicity
                | ScoreCategory::Profanity
                | ScoreCategory::SexualContent => {}
            }
        }
        scores
    }

    pub fn evaluate_text(&self, signals: &SignalSet) -> ScoreOutcome {
        self.decide(
            CategoryScores::Text(Self::text_scores(signals)),
            signals.hard_override(),
        )
    }

    pub fn evaluate_image(&self, signals: &SignalSet) -> ScoreOutcome {
        self.decide(CategoryScores::Image(Self::image_scores(signals)), None)
    }

    /// Threshold check over raw scores, plus the hard-override path
    pub fn decide(
        &self,
        raw: CategoryScores,
        hard_override: Option<TextCategory>,
    ) -> ScoreOutcome {
        let categories: &[ScoreCategory] = match raw {
            CategoryScores::Text(_) => &[
                ScoreCategory::Toxicity,
                ScoreCategory::Spam,
                ScoreCategory::SexualContent,
            ],
            CategoryScores::Image(_) => &[ScoreCategory::Nsfw, ScoreCategory::Spam],
        };

        let exceeded = categories
            .iter()
            .filter_map(|c| {
                let score = raw.get(*c);
                let threshold = self.thresholds.threshold(*c)?;
                (score >= threshold).then_some((*c, score))
            })
            .max_by_key(|(_, score)| *score);

        let trigger = match hard_override {
            Some(category) => {
                let scored = category.score_category();
                Some((scored, raw.get(scored)))
            }
            None => exceeded,
        };

        ScoreOutcome {
            scores: raw.clamped(),
            should_block: hard_override.is_some() || exceeded.is_some(),
            hard_override,
            trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OracleCategory, Signal};

    fn text(toxicity: i32, spam: i32, sexual_content: i32) -> CategoryScores {
        CategoryScores::Text(TextScores {
            toxicity,
            profanity: 0,
            spam,
            sexual_content,
        })
    }

    #[test]
    fn test_thresholds_are_independent() {
        let aggregator = ScoreAggregator::default();

        assert!(aggregator.decide(text(70, 0, 0), None).should_block);
        assert!(aggregator.decide(text(0, 65, 0), None).should_block);
        assert!(aggregator.decide(text(0, 0, 80), None).should_block);
        assert!(!aggregator.decide(text(69, 64, 79), None).should_block);

        // High toxicity with low spam still blocks
        let outcome = aggregator.decide(text(90, 5, 0), None);
        assert!(outcome.should_block);
        assert_eq!(outcome.trigger, Some((ScoreCategory::Toxicity, 90)));
    }

    #[test]
    fn test_profanity_has_no_threshold() {
        let aggregator = ScoreAggregator::default();
        let scores = CategoryScores::Text(TextScores {
            profanity: 100,
            ..Default::default()
        });
        assert!(!aggregator.decide(scores, None).should_block);
    }

    #[test]
    fn test_hard_override_ignores_scores() {
        let aggregator = ScoreAggregator::default();
        let outcome = aggregator.decide(text(0, 0, 25), Some(TextCategory::AdultServices));

        assert!(outcome.should_block);
        assert_eq!(outcome.trigger, Some((ScoreCategory::SexualContent, 25)));
    }

    #[test]
    fn test_nsfw_threshold() {
        let aggregator = ScoreAggregator::default();
        let mut signals = SignalSet::default();
        signals.push(Signal::Classifier {
            category: OracleCategory::Adult,
            score: 75,
        });

        let outcome = aggregator.evaluate_image(&signals);
        assert!(outcome.should_block);
        assert_eq!(outcome.scores.get(ScoreCategory::Nsfw), 75);
    }

    #[test]
    fn test_scores_accumulate_before_clamping() {
        let aggregator = ScoreAggregator::default();
        let mut signals = SignalSet::default();
        for term in ["cocaine", "meth", "mdma", "molly", "kill you"] {
            signals.push(Signal::ProhibitedTerm {
                category: if term == "kill you" {
                    TextCategory::Violence
                } else {
                    TextCategory::DrugSale
                },
                term: term.to_string(),
            });
        }

        assert_eq!(ScoreAggregator::text_scores(&signals).toxicity, 120);

        let outcome = aggregator.evaluate_text(&signals);
        assert_eq!(outcome.scores.get(ScoreCategory::Toxicity), 100);
        assert_eq!(outcome.hard_override, Some(TextCategory::DrugSale));
    }

    #[test]
    fn test_custom_thresholds() {
        let aggregator = ScoreAggregator::new(ScoreThresholds {
            spam: 30,
            ..Default::default()
        });
        assert!(aggregator.decide(text(0, 30, 0), None).should_block);
    }
}
