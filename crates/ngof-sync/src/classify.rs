//! Two-tier keyword matching and deadline flags.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use ngof_core::{fold_diacritics, Opportunity, OpportunityDraft};
use regex::Regex;
use serde::Deserialize;

pub const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "educatie",
    "educatia",
    "educational",
    "educationale",
    "educativ",
    "steam",
    "stiinta",
    "stiinte",
    "science",
    "tineret",
    "tineri",
    "youth",
    "copii",
    "elevi",
    "studenti",
    "scoala",
    "scoli",
    "scolar",
    "ong",
    "ngo",
    "societate civila",
    "civil society",
    "non-formal",
    "nonformal",
    "nerambursabil",
    "nerambursabila",
    "grant",
    "granturi",
];

pub const MEDIUM_PRIORITY_KEYWORDS: &[&str] = &[
    "cultura",
    "cultural",
    "culturale",
    "inovare",
    "inovatie",
    "innovation",
    "digital",
    "digitalizare",
    "tehnologie",
    "technology",
    "capacitare",
    "formare profesionala",
    "comunitate",
    "comunitar",
    "community",
    "incluziune",
    "incluziv",
    "voluntariat",
    "civic",
    "civica",
    "sponsorizare",
    "mecenatul",
    "sustenabil",
    "dezvoltare durabila",
];

/// Window, in whole days from today, in which a deadline counts as closing soon.
pub const CLOSING_SOON_DAYS: i64 = 14;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub high_priority: Vec<String>,
    #[serde(default)]
    pub medium_priority: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            high_priority: HIGH_PRIORITY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            medium_priority: MEDIUM_PRIORITY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl KeywordConfig {
    /// `rules/keywords.yaml` under `root`, or the built-in tiers when that file does not exist.
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("rules").join("keywords.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        if config.high_priority.is_empty() && config.medium_priority.is_empty() {
            anyhow::bail!("keyword rules define no keywords");
        }
        Ok(config)
    }
}

#[derive(Debug)]
struct KeywordRule {
    keyword: String,
    pattern: Regex,
    high_priority: bool,
}

/// Matches whole words against lowercased, diacritic-folded text.
#[derive(Debug)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    pub fn new(config: &KeywordConfig) -> Result<Self> {
        let tiers = config
            .high_priority
            .iter()
            .map(|k| (k, true))
            .chain(config.medium_priority.iter().map(|k| (k, false)));

        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        for (keyword, high_priority) in tiers {
            let normalized = normalize(keyword);
            if normalized.is_empty() || !seen.insert(normalized.clone()) {
                continue;
            }
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&normalized)))
                .with_context(|| format!("compiling keyword {keyword:?}"))?;
            rules.push(KeywordRule {
                keyword: keyword.trim().to_string(),
                pattern,
                high_priority,
            });
        }
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Keywords found in `title + " " + description`, high tier first, in configured order.
    pub fn match_keywords(&self, title: &str, description: &str) -> Vec<String> {
        let haystack = normalize(&format!("{title} {description}"));
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(&haystack))
            .map(|rule| rule.keyword.clone())
            .collect()
    }

    pub fn is_high_priority(&self, keywords: &[String]) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.high_priority && keywords.contains(&rule.keyword))
    }

    /// Annotate a draft, or drop it when nothing matches.
    pub fn classify(&self, draft: OpportunityDraft, today: NaiveDate) -> Option<Opportunity> {
        let matched_keywords = self.match_keywords(&draft.title, &draft.description);
        if matched_keywords.is_empty() {
            return None;
        }
        let is_high_priority = self.is_high_priority(&matched_keywords);
        let closing_soon = closing_soon(draft.deadline_date, today);
        Some(Opportunity {
            draft,
            matched_keywords,
            is_high_priority,
            closing_soon,
        })
    }
}

fn normalize(text: &str) -> String {
    fold_diacritics(&text.trim().to_lowercase())
}

/// True when the deadline falls between today and `CLOSING_SOON_DAYS` days ahead, both ends included.
pub fn closing_soon(deadline: Option<NaiveDate>, today: NaiveDate) -> bool {
    deadline
        .map(|date| (0..=CLOSING_SOON_DAYS).contains(&(date - today).num_days()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use ngof_core::Source;
    use tempfile::tempdir;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(&KeywordConfig::default()).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn draft(title: &str, description: &str) -> OpportunityDraft {
        OpportunityDraft::new("ngohub_000000000000", Source::Ngohub, title, "https://x.ro/a")
            .with_description(description)
    }

    #[test]
    fn matching_is_whole_word_and_case_insensitive() {
        let c = classifier();
        assert!(c.match_keywords("Cerere de prelungire", "").is_empty());
        assert_eq!(c.match_keywords("Sprijin pentru ONG", ""), vec!["ong".to_string()]);
        assert_eq!(c.match_keywords("Finantare", "pentru ong-uri locale"), vec!["ong".to_string()]);
    }

    #[test]
    fn matching_is_idempotent_and_ordered_by_tier() {
        let c = classifier();
        let text = "Program digital de educatie non-formal pentru tineri";
        let first = c.match_keywords(text, "");
        assert_eq!(first, c.match_keywords(text, ""));
        assert_eq!(first, vec!["educatie", "tineri", "non-formal", "digital"]);
    }

    #[test]
    fn diacritics_fold_before_matching() {
        let c = classifier();
        assert_eq!(
            c.match_keywords("Educație și știință", "Societate civilă"),
            vec!["educatie", "stiinta", "societate civila"]
        );
    }

    #[test]
    fn closing_soon_window_is_inclusive_in_whole_days() {
        let t = today();
        assert!(closing_soon(Some(t), t));
        assert!(closing_soon(t.checked_add_days(Days::new(14)), t));
        assert!(!closing_soon(t.checked_add_days(Days::new(15)), t));
        assert!(!closing_soon(t.pred_opt(), t));
        assert!(!closing_soon(None, t));
    }

    #[test]
    fn end_to_end_classification() {
        let c = classifier();

        let steam = c
            .classify(draft("Apel de proiecte STEAM pentru elevi", ""), today())
            .unwrap();
        assert_eq!(steam.matched_keywords, vec!["steam", "elevi"]);
        assert!(steam.is_high_priority);

        let festival = c
            .classify(draft("Festival local", "eveniment cultural"), today())
            .unwrap();
        assert_eq!(festival.matched_keywords, vec!["cultural"]);
        assert!(!festival.is_high_priority);

        assert!(c.classify(draft("Anunt general", ""), today()).is_none());
    }

    #[test]
    fn classify_flags_near_deadlines() {
        let c = classifier();
        let item = c
            .classify(
                draft("Granturi pentru scoli", "").with_deadline("10.03.2026", NaiveDate::from_ymd_opt(2026, 3, 10)),
                today(),
            )
            .unwrap();
        assert!(item.closing_soon);
    }

    #[test]
    fn missing_rules_file_uses_builtin_tiers() {
        let dir = tempdir().unwrap();
        let config = KeywordConfig::from_workspace_root(dir.path()).unwrap();
        assert_eq!(config, KeywordConfig::default());
        assert_eq!(
            classifier().len(),
            HIGH_PRIORITY_KEYWORDS.len() + MEDIUM_PRIORITY_KEYWORDS.len()
        );
    }

    #[test]
    fn rules_file_replaces_builtin_tiers() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(
            dir.path().join("rules/keywords.yaml"),
            "version: 2\nhigh_priority: [robotica]\nmedium_priority: [muzeu, Robotica]\n",
        )
        .unwrap();
        let config = KeywordConfig::from_workspace_root(dir.path()).unwrap();
        assert_eq!(config.version, 2);

        let c = KeywordClassifier::new(&config).unwrap();
        assert_eq!(c.len(), 2);
        let matched = c.match_keywords("Concurs de robotică la muzeu", "");
        assert_eq!(matched, vec!["robotica", "muzeu"]);
        assert!(c.is_high_priority(&matched));
        assert!(!c.is_high_priority(&["muzeu".to_string()]));
    }

    #[test]
    fn invalid_rules_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(dir.path().join("rules/keywords.yaml"), "high_priority: 12\n").unwrap();
        assert!(KeywordConfig::from_workspace_root(dir.path()).is_err());
        assert!(KeywordConfig::from_yaml_str("high_priority: []\n").is_err());
    }
}
