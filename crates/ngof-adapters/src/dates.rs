//! Romanian date normalization and ordered deadline pattern lists.

use chrono::NaiveDate;
use ngof_core::fold_diacritics;
use once_cell::sync::Lazy;
use regex::Regex;

const RO_MONTHS: [(&str, u32); 12] = [
    ("ianuarie", 1),
    ("februarie", 2),
    ("martie", 3),
    ("aprilie", 4),
    ("mai", 5),
    ("iunie", 6),
    ("iulie", 7),
    ("august", 8),
    ("septembrie", 9),
    ("octombrie", 10),
    ("noiembrie", 11),
    ("decembrie", 12),
];

const NUMERIC_FORMATS: [&str; 4] = ["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// chrono's `%Y` takes any digit count; the numeric formats need exactly four.
static NUMERIC_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,2}[./-]\d{1,2}[./-]\d{4}|\d{4}-\d{1,2}-\d{1,2})$").expect("numeric date regex")
});

static NAMED_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\s+(\w+)\s+(\d{4})").expect("named month regex"));

fn month_number(name: &str) -> Option<u32> {
    let name = fold_diacritics(&name.to_lowercase());
    RO_MONTHS
        .iter()
        .find(|(month, _)| *month == name)
        .map(|(_, number)| *number)
}

/// Normalize a Romanian or numeric date. Unknown shapes and impossible dates yield `None`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    if let Some(caps) = NAMED_MONTH.captures(text) {
        let day = caps[1].parse::<u32>().ok();
        let month = month_number(&caps[2]);
        let year = caps[3].parse::<i32>().ok();
        if let (Some(day), Some(month), Some(year)) = (day, month, year) {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }

    if !NUMERIC_SHAPE.is_match(text) {
        return None;
    }
    NUMERIC_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

const NUMERIC_DATE: &str = r"\d{1,2}[./-]\d{1,2}[./-]\d{4}";
const NAMED_DATE: &str = r"\d{1,2}\s+\w+\s+\d{4}";

fn termen_limita() -> String {
    format!(r"(?:termen|data)\s*(?:limita|limită)\s*[:\s]*({NUMERIC_DATE})")
}

fn pana_la(date: &str) -> String {
    format!(r"(?:până|pana)\s*(?:la|pe|in|în)\s*(?:data\s+de\s+)?({date})")
}

fn inscrieri_pana(date: &str) -> String {
    format!(r"(?:inscrieri|înscrieri)\s*(?:până|pana)\s*(?:la|pe)\s*({date})")
}

fn deadline_label(date: &str) -> String {
    format!(r"deadline[:\s]+({date})")
}

/// Ordered regular expressions; the first one that matches decides the deadline.
#[derive(Debug)]
pub struct DeadlinePatterns {
    patterns: Vec<Regex>,
}

impl DeadlinePatterns {
    /// Compile case-insensitive patterns, each with the date in capture group 1.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Raw matched text plus its normalized date, if any pattern matches.
    pub fn find(&self, text: &str) -> Option<(String, Option<NaiveDate>)> {
        self.patterns.iter().find_map(|re| {
            re.captures(text).and_then(|caps| caps.get(1)).map(|m| {
                let raw = m.as_str().to_string();
                let date = parse_date(&raw);
                (raw, date)
            })
        })
    }
}

fn compiled(patterns: Vec<String>) -> DeadlinePatterns {
    DeadlinePatterns::compile(&patterns).expect("deadline patterns are valid regexes")
}

/// Aggregator articles. The bare date catch-all stays last.
pub static FINANTARE_DEADLINES: Lazy<DeadlinePatterns> = Lazy::new(|| {
    compiled(vec![
        termen_limita(),
        pana_la(NUMERIC_DATE),
        pana_la(NAMED_DATE),
        inscrieri_pana(NUMERIC_DATE),
        inscrieri_pana(NAMED_DATE),
        deadline_label(NUMERIC_DATE),
        format!("({NUMERIC_DATE})"),
    ])
});

pub static AFCN_DEADLINES: Lazy<DeadlinePatterns> = Lazy::new(|| {
    compiled(vec![
        termen_limita(),
        pana_la(NUMERIC_DATE),
        pana_la(NAMED_DATE),
        format!(r"sesiune.*?({NUMERIC_DATE})"),
    ])
});

pub static FDSC_DEADLINES: Lazy<DeadlinePatterns> = Lazy::new(|| {
    compiled(vec![
        termen_limita(),
        pana_la(NUMERIC_DATE),
        pana_la(NAMED_DATE),
        deadline_label(NUMERIC_DATE),
    ])
});

pub static NGOHUB_DEADLINES: Lazy<DeadlinePatterns> = Lazy::new(|| {
    compiled(vec![
        termen_limita(),
        pana_la(NUMERIC_DATE),
        deadline_label(NUMERIC_DATE),
        deadline_label(r"\d{4}-\d{2}-\d{2}"),
    ])
});

/// Applied to the text of a single listing card.
pub static CARD_DEADLINES: Lazy<DeadlinePatterns> = Lazy::new(|| {
    compiled(vec![
        format!(r"(?:termen|data)\s*(?:limita|limită)[:\s]*({NUMERIC_DATE})"),
        format!(r"(?:până|pana)\s*(?:la|pe)\s*({NUMERIC_DATE})"),
        deadline_label(NUMERIC_DATE),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn numeric_separators_agree() {
        for text in ["05.03.2025", "05/03/2025", "05-03-2025", "2025-03-05", "5.3.2025"] {
            assert_eq!(parse_date(text), Some(ymd(2025, 3, 5)), "{text}");
        }
    }

    #[test]
    fn named_months_are_case_insensitive() {
        assert_eq!(parse_date("15 aprilie 2026"), Some(ymd(2026, 4, 15)));
        assert_eq!(parse_date("1 DECEMBRIE 2025"), Some(ymd(2025, 12, 1)));
        assert_eq!(parse_date("  30 Mai 2026 "), Some(ymd(2026, 5, 30)));
    }

    #[test]
    fn impossible_or_unknown_dates_are_absent() {
        assert_eq!(parse_date("31.02.2025"), None);
        assert_eq!(parse_date("31 iunie 2026"), None);
        assert_eq!(parse_date("31/04/2026"), None);
        assert_eq!(parse_date("15 april 2026"), None);
        assert_eq!(parse_date("mâine"), None);
        assert_eq!(parse_date("05.03.25"), None);
        assert_eq!(parse_date("5.3.025"), None);
        assert_eq!(parse_date("205-03-05"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn first_pattern_in_priority_order_wins() {
        let text = "Publicat la 05.01.2026. Înscrieri până la 20 aprilie 2026, rezultate 01.06.2026.";
        let (raw, date) = FINANTARE_DEADLINES.find(text).unwrap();
        assert_eq!(raw, "20 aprilie 2026");
        assert_eq!(date, Some(ymd(2026, 4, 20)));
    }

    #[test]
    fn catch_all_only_applies_when_nothing_else_matches() {
        let (raw, date) = FINANTARE_DEADLINES
            .find("Anunt publicat 05.01.2026 pentru toate organizatiile")
            .unwrap();
        assert_eq!(raw, "05.01.2026");
        assert_eq!(date, Some(ymd(2026, 1, 5)));
        assert!(FDSC_DEADLINES.find("Anunt publicat 05.01.2026").is_none());
    }

    #[test]
    fn termen_limita_accepts_both_spellings() {
        let (raw, _) = FDSC_DEADLINES.find("TERMEN LIMITĂ: 10/02/2026").unwrap();
        assert_eq!(raw, "10/02/2026");
        let (raw, _) = AFCN_DEADLINES.find("data limita 11.02.2026").unwrap();
        assert_eq!(raw, "11.02.2026");
    }

    #[test]
    fn iso_deadline_is_recognised_for_ngohub() {
        let (raw, date) = NGOHUB_DEADLINES.find("Deadline: 2026-06-30 (ora 23:59)").unwrap();
        assert_eq!(raw, "2026-06-30");
        assert_eq!(date, Some(ymd(2026, 6, 30)));
    }

    #[test]
    fn matched_but_invalid_date_keeps_raw_text() {
        let (raw, date) = AFCN_DEADLINES.find("Termen limita: 31.02.2026").unwrap();
        assert_eq!(raw, "31.02.2026");
        assert_eq!(date, None);
    }
}
