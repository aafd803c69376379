use crate::models::{BehaviorFlag, PostingStats, Signal, SignalSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Posting-history context for behavioural spam signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorContext {
    pub has_repeated_content: bool,
    pub seconds_since_last_post: u64,
    pub recent_post_count: u32,
    pub account_age_days: u64,
    pub is_verified: bool,
}

impl Default for BehaviorContext {
    fn default() -> Self {
        Self {
            has_repeated_content: false,
            seconds_since_last_post: 3600,
            recent_post_count: 0,
            account_age_days: 365,
            is_verified: false,
        }
    }
}

impl BehaviorContext {
    /// Fill the posting-frequency fields from stored history
    pub fn with_posting_stats(mut self, stats: PostingStats) -> Self {
        self.recent_post_count = stats.posts_last_hour.clamp(0, u32::MAX as i64) as u32;
        if let Some(seconds) = stats.seconds_since_last_post {
            self.seconds_since_last_post = seconds.max(0) as u64;
        }
        self
    }

    /// Behavioural spam signals. Verified accounts carry half the weight.
    pub fn signals(&self) -> SignalSet {
        let mut flags = Vec::new();

        if self.has_repeated_content {
            flags.push((BehaviorFlag::RepeatedContent, 40));
        }

        if self.seconds_since_last_post < 10 {
            flags.push((BehaviorFlag::RapidPosting, 40));
        } else if self.seconds_since_last_post < 60 {
            flags.push((BehaviorFlag::FastPosting, 20));
        }

        if self.recent_post_count > 20 {
            flags.push((BehaviorFlag::HighFrequency, 30));
        } else if self.recent_post_count > 10 {
            flags.push((BehaviorFlag::ElevatedFrequency, 15));
        }

        if !self.is_verified {
            if self.account_age_days < 1 {
                flags.push((BehaviorFlag::BrandNewAccount, 30));
            } else if self.account_age_days < 7 {
                flags.push((BehaviorFlag::NewAccount, 15));
            }
        }

        let mut set = SignalSet::default();
        for (flag, weight) in flags {
            let weight = if self.is_verified { weight / 2 } else { weight };
            tracing::debug!(flag = flag.as_str(), weight, "Behavior signal");
            set.push(Signal::Behavior { flag, weight });
        }
        set
    }
}

/// True if `content` matches one of `recent` exactly or by more than 90%
/// word overlap (case-insensitive)
pub fn is_duplicate(content: &str, recent: &[String]) -> bool {
    let normalized = content.trim().to_lowercase();

    recent.iter().any(|previous| {
        let previous = previous.trim().to_lowercase();
        normalized == previous || jaccard_similarity(&normalized, &previous) > 0.9
    })
}

/// Jaccard similarity of the whitespace-separated word sets
fn jaccard_similarity(s1: &str, s2: &str) -> f32 {
    let words1: HashSet<&str> = s1.split_whitespace().collect();
    let words2: HashSet<&str> = s2.split_whitespace().collect();

    let union = words1.union(&words2).count();
    if union == 0 {
        return 0.0;
    }

    words1.intersection(&words2).count() as f32 / union as f32
}
