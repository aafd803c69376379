use crate::db::postgres::PoolSettings;
use crate::error::{ModerationError, Result};
use crate::services::{EnforcementPolicy, ImagePolicy, ScoreThresholds};
use serde::Deserialize;
use std::time::Duration;

/// Service configuration, read from the environment (and `.env` if present).
/// Every field has a default except the optional collaborators.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server configuration
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,

    // Database configuration; the in-memory store is used when unset
    pub database_url: Option<String>,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    // Signal sources
    pub lexicon_path: Option<String>,
    pub oracle_url: Option<String>,
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    // Score thresholds
    #[serde(default = "default_toxicity_threshold")]
    pub toxicity_threshold: i32,
    #[serde(default = "default_spam_threshold")]
    pub spam_threshold: i32,
    #[serde(default = "default_sexual_content_threshold")]
    pub sexual_content_threshold: i32,
    #[serde(default = "default_nsfw_threshold")]
    pub nsfw_threshold: i32,

    // Enforcement policy
    #[serde(default = "default_auto_suspend_warning_limit")]
    pub auto_suspend_warning_limit: i32,
    #[serde(default = "default_auto_suspend_violation_limit")]
    pub auto_suspend_violation_limit: i32,
    #[serde(default = "default_trust_decay_per_violation")]
    pub trust_decay_per_violation: i32,

    // Image policy
    #[serde(default = "default_min_image_dimension")]
    pub min_image_width: u32,
    #[serde(default = "default_min_image_dimension")]
    pub min_image_height: u32,
    #[serde(default = "default_duplicate_window_days")]
    pub duplicate_window_days: i64,
    #[serde(default)]
    pub duplicate_hash_tolerance: u32,
}

fn default_http_port() -> u16 {
    8086
}

fn default_service_name() -> String {
    "moderation-service".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_db_max_connections() -> u32 {
    20
}

fn default_oracle_timeout_ms() -> u64 {
    3000
}

fn default_toxicity_threshold() -> i32 {
    ScoreThresholds::default().toxicity
}

fn default_spam_threshold() -> i32 {
    ScoreThresholds::default().spam
}

fn default_sexual_content_threshold() -> i32 {
    ScoreThresholds::default().sexual_content
}

fn default_nsfw_threshold() -> i32 {
    ScoreThresholds::default().nsfw
}

fn default_auto_suspend_warning_limit() -> i32 {
    EnforcementPolicy::default().auto_suspend_warning_limit
}

fn default_auto_suspend_violation_limit() -> i32 {
    EnforcementPolicy::default().auto_suspend_violation_limit
}

fn default_trust_decay_per_violation() -> i32 {
    EnforcementPolicy::default().trust_decay_per_violation
}

fn default_min_image_dimension() -> u32 {
    ImagePolicy::default().min_width
}

fn default_duplicate_window_days() -> i64 {
    ImagePolicy::default().duplicate_window_days
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()
            .map_err(|e| ModerationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let thresholds = [
            ("TOXICITY_THRESHOLD", self.toxicity_threshold),
            ("SPAM_THRESHOLD", self.spam_threshold),
            ("SEXUAL_CONTENT_THRESHOLD", self.sexual_content_threshold),
            ("NSFW_THRESHOLD", self.nsfw_threshold),
        ];
        for (name, value) in thresholds {
            if !(1..=100).contains(&value) {
                return Err(ModerationError::Config(format!(
                    "{} must be between 1 and 100, got {}",
                    name, value
                )));
            }
        }

        if self.auto_suspend_warning_limit < 1 || self.auto_suspend_violation_limit < 1 {
            return Err(ModerationError::Config(
                "auto-suspend limits must be at least 1".to_string(),
            ));
        }
        if self.trust_decay_per_violation < 0 {
            return Err(ModerationError::Config(
                "TRUST_DECAY_PER_VIOLATION must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        ScoreThresholds {
            toxicity: self.toxicity_threshold,
            spam: self.spam_threshold,
            sexual_content: self.sexual_content_threshold,
            nsfw: self.nsfw_threshold,
        }
    }

    pub fn enforcement_policy(&self) -> EnforcementPolicy {
        EnforcementPolicy {
            auto_suspend_warning_limit: self.auto_suspend_warning_limit,
            auto_suspend_violation_limit: self.auto_suspend_violation_limit,
            trust_decay_per_violation: self.trust_decay_per_violation,
        }
    }

    pub fn image_policy(&self) -> ImagePolicy {
        ImagePolicy {
            min_width: self.min_image_width,
            min_height: self.min_image_height,
            duplicate_window_days: self.duplicate_window_days,
            duplicate_hash_tolerance: self.duplicate_hash_tolerance,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections,
            ..PoolSettings::default()
        }
    }
}
