use super::content::ContentKind;
use super::enforcement::EnforcementSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Prohibited-word categories of the text lexicon
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCategory {
    AdultServices,
    DrugSale,
    Violence,
    Profanity,
    SpamKeyword,
}

impl TextCategory {
    pub const ALL: [TextCategory; 5] = [
        TextCategory::AdultServices,
        TextCategory::DrugSale,
        TextCategory::Violence,
        TextCategory::Profanity,
        TextCategory::SpamKeyword,
    ];

    /// Score delta added for every distinct matched term
    pub fn delta(&self) -> i32 {
        match self {
            TextCategory::AdultServices => 25,
            TextCategory::DrugSale => 25,
            TextCategory::Violence => 20,
            TextCategory::Profanity => 10,
            TextCategory::SpamKeyword => 15,
        }
    }

    pub fn score_category(&self) -> ScoreCategory {
        match self {
            TextCategory::AdultServices => ScoreCategory::SexualContent,
            TextCategory::DrugSale => ScoreCategory::Toxicity,
            TextCategory::Violence => ScoreCategory::Toxicity,
            TextCategory::Profanity => ScoreCategory::Profanity,
            TextCategory::SpamKeyword => ScoreCategory::Spam,
        }
    }

    /// Presence alone forces a block, independent of numeric thresholds.
    pub fn is_hard_override(&self) -> bool {
        matches!(self, TextCategory::AdultServices | TextCategory::DrugSale)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextCategory::AdultServices => "adult_services",
            TextCategory::DrugSale => "drug_sale",
            TextCategory::Violence => "violence",
            TextCategory::Profanity => "profanity",
            TextCategory::SpamKeyword => "spam_keyword",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s.trim())
    }
}

impl fmt::Display for TextCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated score dimensions (text and image)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Toxicity,
    Profanity,
    Spam,
    SexualContent,
    Nsfw,
    Violence,
    Drug,
    Weapon,
}

impl ScoreCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreCategory::Toxicity => "toxicity",
            ScoreCategory::Profanity => "profanity",
            ScoreCategory::Spam => "spam",
            ScoreCategory::SexualContent => "sexual_content",
            ScoreCategory::Nsfw => "nsfw",
            ScoreCategory::Violence => "violence",
            ScoreCategory::Drug => "drug",
            ScoreCategory::Weapon => "weapon",
        }
    }
}

/// Categories reported by the external image classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleCategory {
    Adult,
    Violence,
    Drug,
    Weapon,
}

impl OracleCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "adult" | "nsfw" | "porn" | "sexy" => Some(OracleCategory::Adult),
            "violence" | "gore" => Some(OracleCategory::Violence),
            "drug" | "drugs" => Some(OracleCategory::Drug),
            "weapon" | "weapons" => Some(OracleCategory::Weapon),
            _ => None,
        }
    }

    pub fn score_category(&self) -> ScoreCategory {
        match self {
            OracleCategory::Adult => ScoreCategory::Nsfw,
            OracleCategory::Violence => ScoreCategory::Violence,
            OracleCategory::Drug => ScoreCategory::Drug,
            OracleCategory::Weapon => ScoreCategory::Weapon,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OracleCategory::Adult => "adult",
            OracleCategory::Violence => "violence",
            OracleCategory::Drug => "drug",
            OracleCategory::Weapon => "weapon",
        }
    }
}

/// Behavioral spam indicators derived from posting history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorFlag {
    RapidPosting,
    FastPosting,
    HighFrequency,
    ElevatedFrequency,
    BrandNewAccount,
    NewAccount,
    RepeatedContent,
}

impl BehaviorFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorFlag::RapidPosting => "rapid_posting",
            BehaviorFlag::FastPosting => "fast_posting",
            BehaviorFlag::HighFrequency => "high_frequency",
            BehaviorFlag::ElevatedFrequency => "elevated_frequency",
            BehaviorFlag::BrandNewAccount => "brand_new_account",
            BehaviorFlag::NewAccount => "new_account",
            BehaviorFlag::RepeatedContent => "repeated_content",
        }
    }
}

/// One rule-based observation about a piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    ProhibitedTerm { category: TextCategory, term: String },
    ExcessiveUppercase { ratio_pct: u32 },
    RepeatedCharacters { run: usize },
    RepeatedWord { word: String, count: usize },
    ContactSolicitation { phrase: String },
    LinkFlooding { count: usize },
    PhoneFlooding { count: usize },
    EmojiFlooding { count: usize },
    Behavior { flag: BehaviorFlag, weight: i32 },
    LowQualityImage { width: u32, height: u32 },
    DuplicateImage { previous_content_id: i64 },
    Classifier { category: OracleCategory, score: i32 },
    ClassifierNotEvaluated { reason: String },
}

impl Signal {
    /// Score delta this signal adds, if any
    pub fn contribution(&self) -> Option<(ScoreCategory, i32)> {
        match self {
            Signal::ProhibitedTerm { category, .. } => {
                Some((category.score_category(), category.delta()))
            }
            Signal::ExcessiveUppercase { .. } => Some((ScoreCategory::Spam, 10)),
            Signal::RepeatedCharacters { .. } => Some((ScoreCategory::Spam, 15)),
            Signal::RepeatedWord { .. } => Some((ScoreCategory::Spam, 15)),
            Signal::ContactSolicitation { .. } => Some((ScoreCategory::Spam, 20)),
            Signal::LinkFlooding { .. } => Some((ScoreCategory::Spam, 25)),
            Signal::PhoneFlooding { .. } => Some((ScoreCategory::Spam, 25)),
            Signal::EmojiFlooding { .. } => Some((ScoreCategory::Spam, 10)),
            Signal::Behavior { weight, .. } => Some((ScoreCategory::Spam, *weight)),
            Signal::LowQualityImage { .. } => Some((ScoreCategory::Spam, 30)),
            Signal::DuplicateImage { .. } => Some((ScoreCategory::Spam, 40)),
            Signal::Classifier { category, score } => Some((category.score_category(), *score)),
            Signal::ClassifierNotEvaluated { .. } => None,
        }
    }

    pub fn hard_override(&self) -> Option<TextCategory> {
        match self {
            Signal::ProhibitedTerm { category, .. } if category.is_hard_override() => {
                Some(*category)
            }
            _ => None,
        }
    }

    /// Flat label persisted in the moderation record
    pub fn label(&self) -> String {
        match self {
            Signal::ProhibitedTerm { category, term } => {
                format!("prohibited_term:{}:{}", category, term)
            }
            Signal::ExcessiveUppercase { ratio_pct } => {
                format!("excessive_uppercase:{}%", ratio_pct)
            }
            Signal::RepeatedCharacters { run } => format!("repeated_characters:{}", run),
            Signal::RepeatedWord { word, count } => format!("repeated_word:{}x{}", word, count),
            Signal::ContactSolicitation { phrase } => format!("contact_solicitation:{}", phrase),
            Signal::LinkFlooding { count } => format!("link_flooding:{}", count),
            Signal::PhoneFlooding { count } => format!("phone_flooding:{}", count),
            Signal::EmojiFlooding { count } => format!("emoji_flooding:{}", count),
            Signal::Behavior { flag, .. } => format!("behavior:{}", flag.as_str()),
            Signal::LowQualityImage { width, height } => {
                format!("low_quality_image:{}x{}", width, height)
            }
            Signal::DuplicateImage { previous_content_id } => {
                format!("duplicate_image:{}", previous_content_id)
            }
            Signal::Classifier { category, score } => {
                format!("classifier:{}:{}", category.as_str(), score)
            }
            Signal::ClassifierNotEvaluated { .. } => "classifier:not_evaluated".to_string(),
        }
    }
}

/// Output of the signal extractor for one analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub signals: Vec<Signal>,
    /// False when an external signal (classifier) could not be obtained
    pub evaluation_complete: bool,
}

impl Default for SignalSet {
    fn default() -> Self {
        Self {
            signals: Vec::new(),
            evaluation_complete: true,
        }
    }
}

impl SignalSet {
    pub fn push(&mut self, signal: Signal) {
        if matches!(signal, Signal::ClassifierNotEvaluated { .. }) {
            self.evaluation_complete = false;
        }
        self.signals.push(signal);
    }

    pub fn extend(&mut self, other: SignalSet) {
        for signal in other.signals {
            self.push(signal);
        }
        self.evaluation_complete &= other.evaluation_complete;
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.signals.iter().map(Signal::label).collect()
    }

    pub fn hard_override(&self) -> Option<TextCategory> {
        self.signals.iter().find_map(Signal::hard_override)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextScores {
    pub toxicity: i32,
    pub profanity: i32,
    pub spam: i32,
    pub sexual_content: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageScores {
    pub nsfw: i32,
    pub violence: i32,
    pub drug: i32,
    pub weapon: i32,
    pub spam: i32,
}

/// Category scores of one moderation record (0-100 once clamped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CategoryScores {
    Text(TextScores),
    Image(ImageScores),
}

impl CategoryScores {
    pub fn get(&self, category: ScoreCategory) -> i32 {
        match (self, category) {
            (CategoryScores::Text(s), ScoreCategory::Toxicity) => s.toxicity,
            (CategoryScores::Text(s), ScoreCategory::Profanity) => s.profanity,
            (CategoryScores::Text(s), ScoreCategory::Spam) => s.spam,
            (CategoryScores::Text(s), ScoreCategory::SexualContent) => s.sexual_content,
            (CategoryScores::Image(s), ScoreCategory::Nsfw) => s.nsfw,
            (CategoryScores::Image(s), ScoreCategory::Violence) => s.violence,
            (CategoryScores::Image(s), ScoreCategory::Drug) => s.drug,
            (CategoryScores::Image(s), ScoreCategory::Weapon) => s.weapon,
            (CategoryScores::Image(s), ScoreCategory::Spam) => s.spam,
            _ => 0,
        }
    }

    pub fn clamped(&self) -> Self {
        let c = |v: i32| v.clamp(0, 100);
        match self {
            CategoryScores::Text(s) => CategoryScores::Text(TextScores {
                toxicity: c(s.toxicity),
                profanity: c(s.profanity),
                spam: c(s.spam),
                sexual_content: c(s.sexual_content),
            }),
            CategoryScores::Image(s) => CategoryScores::Image(ImageScores {
                nsfw: c(s.nsfw),
                violence: c(s.violence),
                drug: c(s.drug),
                weapon: c(s.weapon),
                spam: c(s.spam),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "moderation_record_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Flagged,
    Approved,
}

/// Immutable result of one analysis pass over one content item
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModerationRecord {
    pub id: Uuid,
    pub content_kind: ContentKind,
    pub content_id: i64,
    pub user_id: i64,
    pub scores: Json<CategoryScores>,
    pub signals: Vec<String>,
    pub should_block: bool,
    pub hard_override: bool,
    pub evaluation_complete: bool,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

/// Perceptual hash of an analysed image, kept for duplicate detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ImageFingerprint {
    pub user_id: i64,
    pub content_id: i64,
    pub hash: i64,
    pub created_at: DateTime<Utc>,
}

/// Recent posting activity of one user, derived from moderation records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PostingStats {
    pub posts_last_hour: i64,
    pub seconds_since_last_post: Option<i64>,
}

/// Result returned to callers of the analysis operations
#[derive(Debug, Clone, Serialize)]
pub struct ModerationResult {
    pub record_id: Uuid,
    pub content_kind: ContentKind,
    pub content_id: i64,
    pub user_id: i64,
    pub should_block: bool,
    pub status: RecordStatus,
    pub scores: CategoryScores,
    pub signals: Vec<String>,
    pub hard_override: Option<TextCategory>,
    pub evaluation_complete: bool,
    pub enforcement: Option<EnforcementSummary>,
}

impl ModerationResult {
    pub fn from_record(
        record: &ModerationRecord,
        hard_override: Option<TextCategory>,
        enforcement: Option<EnforcementSummary>,
    ) -> Self {
        Self {
            record_id: record.id,
            content_kind: record.content_kind,
            content_id: record.content_id,
            user_id: record.user_id,
            should_block: record.should_block,
            status: record.status,
            scores: record.scores.0,
            signals: record.signals.clone(),
            hard_override,
            evaluation_complete: record.evaluation_complete,
            enforcement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_override_categories() {
        assert!(TextCategory::AdultServices.is_hard_override());
        assert!(TextCategory::DrugSale.is_hard_override());
        assert!(!TextCategory::Violence.is_hard_override());
        assert!(!TextCategory::SpamKeyword.is_hard_override());
    }

    #[test]
    fn test_not_evaluated_marks_set_incomplete() {
        let mut set = SignalSet::default();
        set.push(Signal::LowQualityImage {
            width: 10,
            height: 10,
        });
        assert!(set.evaluation_complete);
        set.push(Signal::ClassifierNotEvaluated {
            reason: "timeout".into(),
        });
        assert!(!set.evaluation_complete);
        assert_eq!(set.signals.len(), 2);
    }

    #[test]
    fn test_scores_clamp() {
        let scores = CategoryScores::Text(TextScores {
            toxicity: 140,
            profanity: 10,
            spam: -5,
            sexual_content: 100,
        });
        let clamped = scores.clamped();
        assert_eq!(clamped.get(ScoreCategory::Toxicity), 100);
        assert_eq!(clamped.get(ScoreCategory::Spam), 0);
        assert_eq!(clamped.get(ScoreCategory::Nsfw), 0);
    }

    #[test]
    fn test_signal_labels() {
        let signal = Signal::ProhibitedTerm {
            category: TextCategory::Violence,
            term: "stab".into(),
        };
        assert_eq!(signal.label(), "prohibited_term:violence:stab");
        assert_eq!(signal.contribution(), Some((ScoreCategory::Toxicity, 20)));
    }
}
