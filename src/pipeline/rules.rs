//! Keyword rules engine deciding whether a message is a lead.
//!
//! Evaluated in strict order, first failing stage wins:
//! 1. Length floor: short chatter ("ok", "thanks!") is never a lead
//! 2. Required keywords: at least one must appear
//! 3. Blacklist: any hit rejects, unless an override keyword also appears
//!
//! All matching is plain, case-sensitive substring containment. Content is
//! neither trimmed nor case-folded.

use tracing::debug;

use crate::config::{DEFAULT_MIN_CONTENT_CHARS, KeywordConfig, MonitorConfig};

/// Why a message was accepted or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Fewer characters than the configured floor.
    TooShort { chars: usize },
    /// None of the required keywords appear.
    MissingRequired,
    /// A blacklist keyword appears and no override does.
    Blacklisted { keyword: String },
    /// Lead. `resurrected_by` names the override that cancelled a blacklist hit.
    Accepted { resurrected_by: Option<String> },
}

impl Verdict {
    pub fn is_lead(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "too_short",
            Self::MissingRequired => "missing_required",
            Self::Blacklisted { .. } => "blacklisted",
            Self::Accepted { .. } => "accepted",
        }
    }
}

/// Keyword classification policy.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    min_chars: usize,
    required: Vec<String>,
    blacklist: Vec<String>,
    overrides: Vec<String>,
}

impl RulesEngine {
    /// Create an engine from keyword lists with the default length floor.
    pub fn new(keywords: &KeywordConfig) -> Self {
        Self {
            min_chars: DEFAULT_MIN_CONTENT_CHARS,
            required: keywords.required.clone(),
            blacklist: keywords.blacklist.clone(),
            overrides: keywords.overrides.clone(),
        }
    }

    /// Create an engine from the full monitor configuration.
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(&config.keywords).with_min_chars(config.min_content_chars)
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    /// True if `content` is a lead.
    pub fn classify(&self, content: &str) -> bool {
        self.explain(content).is_lead()
    }

    /// Evaluate `content` and report which stage decided.
    pub fn explain(&self, content: &str) -> Verdict {
        let chars = content.chars().count();
        if chars < self.min_chars {
            return Verdict::TooShort { chars };
        }

        if first_match(content, &self.required).is_none() {
            return Verdict::MissingRequired;
        }

        match first_match(content, &self.blacklist) {
            None => Verdict::Accepted {
                resurrected_by: None,
            },
            Some(black) => match first_match(content, &self.overrides) {
                Some(over) => {
                    debug!(blacklisted = %black, override_keyword = %over, "Override keyword cancelled blacklist hit");
                    Verdict::Accepted {
                        resurrected_by: Some(over.to_string()),
                    }
                }
                None => Verdict::Blacklisted {
                    keyword: black.to_string(),
                },
            },
        }
    }
}

/// Classify `content` against a configuration without building an engine.
pub fn classify(content: &str, config: &MonitorConfig) -> bool {
    RulesEngine::from_config(config).classify(content)
}

fn first_match<'a>(content: &str, keywords: &'a [String]) -> Option<&'a str> {
    keywords
        .iter()
        .map(String::as_str)
        .find(|k| content.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(required: &[&str], blacklist: &[&str], overrides: &[&str]) -> KeywordConfig {
        let owned = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        KeywordConfig {
            required: owned(required),
            blacklist: owned(blacklist),
            overrides: owned(overrides),
        }
    }

    fn scenario_engine() -> RulesEngine {
        RulesEngine::new(&keywords(&["CityA"], &["male"], &["flexible"]))
    }

    #[test]
    fn override_cancels_blacklist() {
        let engine = scenario_engine();
        let verdict =
            engine.explain("Looking for CityA apartment, male tenant preferred, flexible on move-in");
        assert_eq!(
            verdict,
            Verdict::Accepted {
                resurrected_by: Some("flexible".into())
            }
        );
    }

    #[test]
    fn blacklist_without_override_rejects() {
        let engine = scenario_engine();
        assert_eq!(
            engine.explain("Looking for CityA apartment, male only"),
            Verdict::Blacklisted {
                keyword: "male".into()
            }
        );
    }

    #[test]
    fn greeting_is_rejected() {
        let engine = scenario_engine();
        assert!(!engine.classify("Hello there"));
        assert!(!engine.classify("Hi"));
    }

    #[test]
    fn short_content_rejected_regardless_of_keywords() {
        let engine = RulesEngine::new(&keywords(&["A"], &[], &["A"]));
        assert_eq!(engine.explain("AAAAAAAAA"), Verdict::TooShort { chars: 9 });
        assert!(engine.classify("AAAAAAAAAA"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let engine = RulesEngine::new(&keywords(&["城东"], &[], &[]));
        // 9 characters, 27 bytes
        assert!(!engine.classify("城东单间出租拎包入"));
        assert!(engine.classify("城东单间出租，拎包入住"));
    }

    #[test]
    fn missing_required_keyword_rejects() {
        let engine = scenario_engine();
        assert_eq!(
            engine.explain("Looking for a cityA apartment downtown"),
            Verdict::MissingRequired
        );
    }

    #[test]
    fn empty_required_list_rejects_everything() {
        let engine = RulesEngine::new(&keywords(&[], &[], &[]));
        assert!(!engine.classify("a perfectly long message about nothing"));
    }

    #[test]
    fn override_without_blacklist_is_plain_accept() {
        let engine = scenario_engine();
        assert_eq!(
            engine.explain("CityA flat, flexible dates"),
            Verdict::Accepted {
                resurrected_by: None
            }
        );
    }

    #[test]
    fn override_does_not_rescue_missing_required() {
        let engine = scenario_engine();
        assert!(!engine.classify("male tenant, flexible on everything"));
    }

    #[test]
    fn override_does_not_rescue_short_content() {
        let engine = RulesEngine::new(&keywords(&["A"], &["m"], &["f"]));
        assert!(!engine.classify("A m f"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let engine = scenario_engine();
        assert!(engine.classify("CityA room, MALE tenants welcome"));
    }

    #[test]
    fn custom_min_chars() {
        let engine = scenario_engine().with_min_chars(0);
        assert!(engine.classify("CityA"));
    }

    #[test]
    fn free_function_uses_config() {
        let config = MonitorConfig {
            keywords: keywords(&["CityA"], &["male"], &["flexible"]),
            ..MonitorConfig::default()
        };
        assert!(classify("CityA studio available now, contact agent", &config));
        assert!(!classify("CityA studio, male only", &config));
    }

    #[test]
    fn verdict_labels() {
        assert_eq!(Verdict::MissingRequired.label(), "missing_required");
        assert_eq!(Verdict::TooShort { chars: 1 }.label(), "too_short");
        assert!(!Verdict::Blacklisted { keyword: "x".into() }.is_lead());
    }
}
