use crate::error::{ModerationError, Result};
use crate::models::{Signal, SignalSet, TextCategory};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

const UPPERCASE_RATIO: f64 = 0.6;
const CHAR_RUN_LIMIT: usize = 11;
const WORD_REPEAT_LIMIT: usize = 5;
const WORD_REPEAT_MIN_LEN: usize = 4;
const MAX_LINKS: usize = 3;
const MAX_PHONES: usize = 2;
const MAX_EMOJI: usize = 10;

/// Built-in prohibited terms, `category:term` per line
const BUILTIN_LEXICON: &str = "\
adult_services:escort
adult_services:escort service
adult_services:happy ending
adult_services:full service massage
adult_services:erotic massage
adult_services:pay for sex
drug_sale:cocaine
drug_sale:meth
drug_sale:mdma
drug_sale:molly
drug_sale:weed for sale
drug_sale:xanax for sale
violence:kill you
violence:shoot you
violence:stab
violence:beat you up
profanity:fuck
profanity:shit
profanity:bitch
profanity:asshole
spam_keyword:click here
spam_keyword:buy now
spam_keyword:limited time
spam_keyword:act now
spam_keyword:free money
spam_keyword:make money fast
spam_keyword:work from home
spam_keyword:casino
spam_keyword:lottery
";

/// Prohibited-term dictionary grouped by category
#[derive(Debug, Clone)]
pub struct Lexicon {
    terms: Vec<(TextCategory, String)>,
}

impl Lexicon {
    pub fn builtin() -> Self {
        // The embedded list is known to parse
        Self::parse(BUILTIN_LEXICON).unwrap_or(Self { terms: Vec::new() })
    }

    /// Load a lexicon file. Blank lines and `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ModerationError::Config(format!(
                "Failed to load lexicon from {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut terms = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (category, term) = line.split_once(':').ok_or_else(|| {
                ModerationError::Config(format!("lexicon line {}: expected category:term", idx + 1))
            })?;
            let category = TextCategory::parse(category).ok_or_else(|| {
                ModerationError::Config(format!(
                    "lexicon line {}: unknown category {}",
                    idx + 1,
                    category.trim()
                ))
            })?;

            let term = normalize(term);
            if !term.is_empty() {
                terms.push((category, term));
            }
        }

        Ok(Self { terms })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Text signal extractor: lexicon matches plus spam pattern detection
pub struct TextSignalExtractor {
    lexicon: Lexicon,
    url_pattern: Regex,
    phone_pattern: Regex,
    contact_patterns: Vec<Regex>,
}

impl TextSignalExtractor {
    pub fn new(lexicon: Lexicon) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ModerationError::Config(format!("invalid pattern {}: {}", pattern, e)))
        };

        if lexicon.is_empty() {
            tracing::warn!("Lexicon is empty, prohibited-term signals are disabled");
        }

        Ok(Self {
            lexicon,
            url_pattern: compile(r"(?i)\b(?:https?://|www\.)[^\s]+")?,
            phone_pattern: compile(
                r"(?:\+\d{1,3}[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s]?)\d{3}[-.\s]?\d{4}\b",
            )?,
            contact_patterns: vec![
                compile(r"(?i)\b(?:text|call|dm|message|whatsapp|snap|telegram)\s+me\b")?,
                compile(r"(?i)\b(?:add|find|hit)\s+me\s+(?:up\s+)?on\b")?,
                compile(r"(?i)\bmy\s+(?:number|cell|phone|snap|insta|ig|handle|whatsapp)\s+is\b")?,
                compile(r"(?i)\b(?:reach|contact)\s+me\s+(?:at|on|via)\b")?,
            ],
        })
    }

    /// Scan text and return every signal it triggers
    pub fn extract(&self, text: &str) -> SignalSet {
        let mut signals = SignalSet::default();
        if text.trim().is_empty() {
            return signals;
        }

        let words: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();

        for signal in self.prohibited_terms(&words) {
            tracing::debug!(signal = %signal.label(), "Prohibited term matched");
            signals.push(signal);
        }

        let pattern_signals = [
            excessive_uppercase(text),
            repetition(text, &words),
            self.contact_solicitation(text),
            self.link_flooding(text),
            self.phone_flooding(text),
            emoji_flooding(text),
        ];
        for signal in pattern_signals.into_iter().flatten() {
            tracing::debug!(signal = %signal.label(), "Spam pattern matched");
            signals.push(signal);
        }

        signals
    }

    /// One signal per distinct matched term
    fn prohibited_terms(&self, words: &[String]) -> Vec<Signal> {
        let word_set: BTreeSet<&str> = words.iter().map(String::as_str).collect();
        let padded = format!(" {} ", words.join(" "));

        let mut seen = BTreeSet::new();
        self.lexicon
            .terms
            .iter()
            .filter(|(_, term)| {
                if term.contains(' ') {
                    padded.contains(&format!(" {} ", term))
                } else {
                    word_set.contains(term.as_str())
                }
            })
            .filter(|(category, term)| seen.insert((*category, term.clone())))
            .map(|(category, term)| Signal::ProhibitedTerm {
                category: *category,
                term: term.clone(),
            })
            .collect()
    }

    fn contact_solicitation(&self, text: &str) -> Option<Signal> {
        self.contact_patterns
            .iter()
            .find_map(|pattern| pattern.find(text))
            .map(|m| Signal::ContactSolicitation {
                phrase: m.as_str().to_lowercase(),
            })
    }

    fn link_flooding(&self, text: &str) -> Option<Signal> {
        let count = self.url_pattern.find_iter(text).count();
        (count > MAX_LINKS).then_some(Signal::LinkFlooding { count })
    }

    fn phone_flooding(&self, text: &str) -> Option<Signal> {
        let count = self.phone_pattern.find_iter(text).count();
        (count > MAX_PHONES).then_some(Signal::PhoneFlooding { count })
    }
}

/// Lowercased words joined by single spaces
fn normalize(text: &str) -> String {
    text.unicode_words()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// More than 60% of letters uppercase; text without letters never qualifies
fn excessive_uppercase(text: &str) -> Option<Signal> {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }

    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    let ratio = upper as f64 / letters.len() as f64;
    (ratio > UPPERCASE_RATIO).then(|| Signal::ExcessiveUppercase {
        ratio_pct: (ratio * 100.0).round() as u32,
    })
}

/// A run of at least 11 identical characters, otherwise a word of more than
/// three letters used more than five times
fn repetition(text: &str, words: &[String]) -> Option<Signal> {
    let run = longest_char_run(text);
    if run >= CHAR_RUN_LIMIT {
        return Some(Signal::RepeatedCharacters { run });
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in words {
        if word.chars().count() >= WORD_REPEAT_MIN_LEN {
            *counts.entry(word.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count > WORD_REPEAT_LIMIT)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(word, count)| Signal::RepeatedWord {
            word: word.to_string(),
            count,
        })
}

fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for c in text.chars() {
        if c.is_whitespace() {
            current = 0;
            previous = None;
            continue;
        }
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }

    longest
}

fn emoji_flooding(text: &str) -> Option<Signal> {
    let count = text
        .graphemes(true)
        .filter(|g| g.chars().next().map_or(false, is_emoji))
        .count();
    (count > MAX_EMOJI).then_some(Signal::EmojiFlooding { count })
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F5FF
            | 0x1F600..=0x1F64F
            | 0x1F680..=0x1F6FF
            | 0x1F900..=0x1F9FF
            | 0x1FA70..=0x1FAFF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn extractor() -> TextSignalExtractor {
        TextSignalExtractor::new(Lexicon::builtin()).unwrap()
    }

    fn has<F: Fn(&Signal) -> bool>(set: &SignalSet, f: F) -> bool {
        set.signals.iter().any(f)
    }

    #[test]
    fn test_builtin_lexicon_loads() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.len() > 20);
    }

    #[test]
    fn test_lexicon_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# Comment line").unwrap();
        writeln!(file, "profanity:badword").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "drug_sale:Party Powder").unwrap();

        let lexicon = Lexicon::from_file(file.path()).unwrap();
        assert_eq!(lexicon.len(), 2);

        let extractor = TextSignalExtractor::new(lexicon).unwrap();
        let set = extractor.extract("selling PARTY powder tonight");
        assert_eq!(set.hard_override(), Some(TextCategory::DrugSale));
    }

    #[test]
    fn test_lexicon_rejects_unknown_category() {
        let result = Lexicon::parse("gambling:poker");
        assert!(matches!(result, Err(ModerationError::Config(_))));
    }

    #[test]
    fn test_safe_text_has_no_signals() {
        let set = extractor().extract("Selling a lightly used bicycle, pickup only");
        assert!(set.is_empty());
        assert!(set.evaluation_complete);
    }

    #[test]
    fn test_term_matching_respects_word_boundaries() {
        // "stab" must not match inside "stable"
        let set = extractor().extract("Very stable table for sale");
        assert!(set.is_empty());
    }

    #[test]
    fn test_comment_only_lexicon_matches_nothing() {
        let lexicon = Lexicon::parse("# no terms yet\n\n").unwrap();
        assert!(lexicon.is_empty());

        let extractor = TextSignalExtractor::new(lexicon).unwrap();
        let set = extractor.extract("Discreet escort available tonight");
        assert!(set.hard_override().is_none());
        assert!(!has(&set, |s| matches!(s, Signal::ProhibitedTerm { .. })));
        assert!(!Lexicon::builtin().is_empty());
    }

    #[test]
    fn test_distinct_terms_counted_once() {
        let set = extractor().extract("casino casino CASINO lottery");
        let terms: Vec<_> = set
            .signals
            .iter()
            .filter(|s| matches!(s, Signal::ProhibitedTerm { .. }))
            .collect();
        assert_eq!(terms.len(), 2);
    }

    #[test]
    fn test_hard_override_term() {
        let set = extractor().extract("Discreet escort available tonight");
        assert_eq!(set.hard_override(), Some(TextCategory::AdultServices));
    }

    #[test]
    fn test_excessive_uppercase() {
        let set = extractor().extract("HELLO THIS IS ALL CAPS");
        assert!(has(&set, |s| matches!(s, Signal::ExcessiveUppercase { .. })));

        let short = extractor().extract("SELL NOW");
        assert!(has(&short, |s| matches!(
            s,
            Signal::ExcessiveUppercase { ratio_pct: 100 }
        )));

        let mixed = extractor().extract("Sell now");
        assert!(!has(&mixed, |s| matches!(s, Signal::ExcessiveUppercase { .. })));

        let no_letters = extractor().extract("123 !!!");
        assert!(!has(&no_letters, |s| matches!(s, Signal::ExcessiveUppercase { .. })));
    }

    #[test]
    fn test_repeated_characters_threshold() {
        let ten = extractor().extract(&format!("w{}", "o".repeat(10)));
        assert!(!has(&ten, |s| matches!(s, Signal::RepeatedCharacters { .. })));

        let eleven = extractor().extract(&format!("w{}", "o".repeat(11)));
        assert!(has(&eleven, |s| matches!(
            s,
            Signal::RepeatedCharacters { run: 11 }
        )));
    }

    #[test]
    fn test_repeated_word() {
        let set = extractor().extract("deal deal deal deal deal deal today");
        assert!(has(&set, |s| matches!(
            s,
            Signal::RepeatedWord { count: 6, .. }
        )));

        let five = extractor().extract("deal deal deal deal deal today");
        assert!(!has(&five, |s| matches!(s, Signal::RepeatedWord { .. })));

        let short_words = extractor().extract("car car car car car car car");
        assert!(!has(&short_words, |s| matches!(s, Signal::RepeatedWord { .. })));
    }

    #[test]
    fn test_contact_solicitation() {
        let set = extractor().extract("Nice profile, text me later");
        assert!(has(&set, |s| matches!(s, Signal::ContactSolicitation { .. })));
    }

    #[test]
    fn test_link_flooding() {
        let three = "https://a.com https://b.com https://c.com";
        assert!(!has(&extractor().extract(three), |s| matches!(
            s,
            Signal::LinkFlooding { .. }
        )));

        let four = "https://a.com https://b.com https://c.com www.d.com";
        assert!(has(&extractor().extract(four), |s| matches!(
            s,
            Signal::LinkFlooding { count: 4 }
        )));
    }

    #[test]
    fn test_phone_flooding() {
        let text = "555-123-4567 or 555.123.4568 or 5551234569";
        assert!(has(&extractor().extract(text), |s| matches!(
            s,
            Signal::PhoneFlooding { count: 3 }
        )));
    }

    #[test]
    fn test_phone_flooding_formatted_numbers() {
        let text = "(555) 123-4567, +1 555 123 4568, 555.123.4569";
        assert!(has(&extractor().extract(text), |s| matches!(
            s,
            Signal::PhoneFlooding { count: 3 }
        )));

        let two = "(555) 123-4567 or +44 555 123 4568";
        assert!(!has(&extractor().extract(two), |s| matches!(
            s,
            Signal::PhoneFlooding { .. }
        )));
    }

    #[test]
    fn test_emoji_flooding() {
        let text = "🔥".repeat(11);
        assert!(has(&extractor().extract(&text), |s| matches!(
            s,
            Signal::EmojiFlooding { count: 11 }
        )));

        let ten = "🔥".repeat(10);
        assert!(!has(&extractor().extract(&ten), |s| matches!(
            s,
            Signal::EmojiFlooding { .. }
        )));
    }
}
