//! Core domain model for NGOF: funding opportunities, source tags and the seen-state database.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "ngof-core";

/// Cap applied to free-text descriptions gathered for keyword matching.
pub const DESCRIPTION_LIMIT: usize = 3000;

/// Tag identifying which extractor produced an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    FinantareRo,
    FonduriStructurale,
    Afcn,
    Fdsc,
    ActiveCitizens,
    Ngohub,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::FinantareRo,
        Source::FonduriStructurale,
        Source::Afcn,
        Source::Fdsc,
        Source::ActiveCitizens,
        Source::Ngohub,
    ];

    /// Stable tag used as id prefix and in persisted records.
    pub fn as_str(self) -> &'static str {
        match self {
            Source::FinantareRo => "finantare_ro",
            Source::FonduriStructurale => "fonduri_structurale",
            Source::Afcn => "afcn",
            Source::Fdsc => "fdsc",
            Source::ActiveCitizens => "active_citizens",
            Source::Ngohub => "ngohub",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Source::FinantareRo => "Finantare.ro",
            Source::FonduriStructurale => "Fonduri Structurale EU",
            Source::Afcn => "AFCN - Fondul Cultural National",
            Source::Fdsc => "FDSC",
            Source::ActiveCitizens => "Active Citizens Fund",
            Source::Ngohub => "NGO Hub / Eurodesk",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields recovered from a detail page. Empty values leave the draft untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailExtract {
    pub description: String,
    pub deadline_raw: Option<String>,
    pub deadline_date: Option<NaiveDate>,
}

/// Extractor output: one listing entry before keyword classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub id: String,
    pub source: Source,
    pub title: String,
    pub url: String,
    #[serde(rename = "deadline")]
    pub deadline_raw: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
}

impl OpportunityDraft {
    pub fn new(
        id: impl Into<String>,
        source: Source,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            title: title.into(),
            url: url.into(),
            deadline_raw: None,
            deadline_date: None,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = truncate_chars(description, DESCRIPTION_LIMIT);
        self
    }

    pub fn with_deadline(mut self, raw: impl Into<String>, date: Option<NaiveDate>) -> Self {
        self.deadline_raw = Some(raw.into());
        self.deadline_date = date;
        self
    }

    pub fn apply_detail(&mut self, detail: DetailExtract) {
        if let Some(raw) = detail.deadline_raw {
            self.deadline_raw = Some(raw);
            self.deadline_date = detail.deadline_date;
        }
        if !detail.description.is_empty() {
            self.description = truncate_chars(&detail.description, DESCRIPTION_LIMIT);
        }
    }
}

/// A draft that matched at least one tracked keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    #[serde(flatten)]
    pub draft: OpportunityDraft,
    pub matched_keywords: Vec<String>,
    pub is_high_priority: bool,
    pub closing_soon: bool,
}

impl Opportunity {
    pub fn id(&self) -> &str {
        &self.draft.id
    }

    pub fn title(&self) -> &str {
        &self.draft.title
    }
}

/// Snapshot taken the first time an id was classified as matching. Never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub first_seen: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub source: Source,
    pub deadline: Option<String>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
}

impl SeenRecord {
    pub fn snapshot(item: &Opportunity, first_seen: DateTime<Utc>) -> Self {
        Self {
            first_seen,
            title: item.draft.title.clone(),
            url: item.draft.url.clone(),
            source: item.draft.source,
            deadline: item.draft.deadline_raw.clone(),
            matched_keywords: item.matched_keywords.clone(),
        }
    }
}

/// Persisted map of opportunity id to first-seen snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenDatabase {
    #[serde(default)]
    pub funding: BTreeMap<String, SeenRecord>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SeenDatabase {
    pub fn contains(&self, id: &str) -> bool {
        self.funding.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.funding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funding.is_empty()
    }
}

/// Accepts RFC 3339 timestamps and the offset-less ISO form older databases were written with.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw:?}")))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw:?}"))),
            None => Ok(None),
        }
    }
}

/// Map Romanian diacritics (comma and cedilla forms) and common Latin accents to ASCII letters.
/// Characters without a mapping are kept as-is.
pub fn fold_diacritics(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'ă' | 'â' | 'á' | 'à' | 'ä' | 'ã' | 'å' => 'a',
        'Ă' | 'Â' | 'Á' | 'À' | 'Ä' | 'Ã' | 'Å' => 'A',
        'î' | 'í' | 'ì' | 'ï' => 'i',
        'Î' | 'Í' | 'Ì' | 'Ï' => 'I',
        'ș' | 'ş' | 'š' | 'ś' => 's',
        'Ș' | 'Ş' | 'Š' | 'Ś' => 'S',
        'ț' | 'ţ' => 't',
        'Ț' | 'Ţ' => 'T',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `limit` characters without splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
