//! EU structural funds portal. The listing is card-based and, being a Next.js
//! site, may also inline its page data as JSON.

use std::collections::HashSet;

use async_trait::async_trait;
use ngof_core::{truncate_chars, OpportunityDraft, Source};
use ngof_storage::content_id;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::dates::{parse_date, CARD_DEADLINES};
use crate::html::{element_text, resolve_link, same_site, selector, site_host};
use crate::{AdapterError, FetchedPage, ListingTarget, SourceAdapter};

const BASE_URL: &str = "https://www.fonduri-structurale.ro";

const CARD_SELECTOR: &str =
    r#"article, .card, [class*="card"], [class*="apel"], [class*="call"], a[href*="/apel"]"#;

const CARD_DESCRIPTION_LIMIT: usize = 200;
const MIN_CARD_TITLE_CHARS: usize = 5;
const MIN_LINK_TITLE_CHARS: usize = 10;
const FALLBACK_HREF_TOKENS: [&str; 4] = ["apel", "finantare", "grant", "program"];

#[derive(Debug, Clone, Default)]
pub struct FonduriStructuraleAdapter;

struct Selectors {
    cards: Selector,
    anchors: Selector,
    headings: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Result<Self, AdapterError> {
        Ok(Self {
            cards: selector(CARD_SELECTOR)?,
            anchors: selector("a[href]")?,
            headings: selector("h2, h3, h4")?,
            paragraph: selector("p")?,
        })
    }
}

impl FonduriStructuraleAdapter {
    fn parse_card(
        &self,
        card: ElementRef<'_>,
        sel: &Selectors,
        base: &Url,
        site: &str,
    ) -> Option<OpportunityDraft> {
        let link = card.select(&sel.anchors).next().or_else(|| {
            (card.value().name() == "a" && card.value().attr("href").is_some()).then_some(card)
        })?;
        let url = resolve_link(base, link.value().attr("href")?)?;
        if !same_site(&url, site) {
            return None;
        }

        let title = card
            .select(&sel.headings)
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(link));
        if title.chars().count() < MIN_CARD_TITLE_CHARS {
            return None;
        }

        let url = url.to_string();
        let mut draft = OpportunityDraft::new(
            content_id(Source::FonduriStructurale, &url),
            Source::FonduriStructurale,
            title,
            url,
        );
        if let Some((raw, date)) = CARD_DEADLINES.find(&element_text(card)) {
            draft = draft.with_deadline(raw, date);
        }
        if let Some(paragraph) = card.select(&sel.paragraph).next() {
            draft.description = truncate_chars(&element_text(paragraph), CARD_DESCRIPTION_LIMIT);
        }
        Some(draft)
    }

    fn parse_links(
        &self,
        document: &Html,
        sel: &Selectors,
        base: &Url,
        site: &str,
        seen: &mut HashSet<String>,
    ) -> Vec<OpportunityDraft> {
        let mut drafts = Vec::new();
        for link in document.select(&sel.anchors) {
            let Some(url) = link
                .value()
                .attr("href")
                .and_then(|href| resolve_link(base, href))
            else {
                continue;
            };
            if !same_site(&url, site) {
                continue;
            }
            let url = url.to_string();
            let lower = url.to_lowercase();
            if !FALLBACK_HREF_TOKENS.iter().any(|t| lower.contains(t)) || seen.contains(&url) {
                continue;
            }
            let title = element_text(link);
            if title.chars().count() < MIN_LINK_TITLE_CHARS {
                continue;
            }
            seen.insert(url.clone());
            drafts.push(OpportunityDraft::new(
                content_id(Source::FonduriStructurale, &url),
                Source::FonduriStructurale,
                title,
                url,
            ));
        }
        drafts
    }
}

/// Items listed in the inlined `__NEXT_DATA__` document under `props.pageProps`.
pub(crate) fn next_data_items(document: &Html) -> Result<Vec<OpportunityDraft>, AdapterError> {
    let script = selector("script#__NEXT_DATA__")?;
    let Some(script) = document.select(&script).next() else {
        return Ok(Vec::new());
    };
    let raw: String = script.text().collect();
    let data: Value = serde_json::from_str(&raw)?;
    let Some(props) = data.pointer("/props/pageProps").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let root = Url::parse(BASE_URL)?;
    let mut items = Vec::new();
    for entry in props.values().filter_map(Value::as_array).flatten() {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        if let Some(draft) = next_data_item(obj, &root) {
            items.push(draft);
        }
    }
    Ok(items)
}

fn next_data_item(obj: &Map<String, Value>, root: &Url) -> Option<OpportunityDraft> {
    let title = first_str(obj, &["title", "name", "titlu"])?;
    let link = first_str(obj, &["url", "link", "slug"])?;
    let url = if link.starts_with("http") {
        Url::parse(link).ok()?
    } else {
        root.join(link.trim_start_matches('/')).ok()?
    };
    let url = url.to_string();

    let mut draft = OpportunityDraft::new(
        content_id(Source::FonduriStructurale, &url),
        Source::FonduriStructurale,
        title.trim(),
        url,
    );
    if let Some(deadline) = first_str(obj, &["deadline", "termen", "data_limita"]) {
        draft = draft.with_deadline(deadline, parse_date(deadline));
    }
    if let Some(description) = first_str(obj, &["description", "descriere"]) {
        draft = draft.with_description(description);
    }
    Some(draft)
}

/// First non-blank string among `keys`.
fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

#[async_trait]
impl SourceAdapter for FonduriStructuraleAdapter {
    fn adapter_id(&self) -> &'static str {
        "fonduri_structurale"
    }

    fn display_name(&self) -> &'static str {
        Source::FonduriStructurale.display_name()
    }

    fn listing_targets(&self) -> Vec<ListingTarget> {
        ["/apeluri-deschise", "/apeluri", ""]
            .iter()
            .map(|path| ListingTarget {
                url: format!("{BASE_URL}{path}"),
                source: Source::FonduriStructurale,
            })
            .collect()
    }

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<OpportunityDraft>, AdapterError> {
        let base = Url::parse(&page.url)?;
        let site = site_host(&base)
            .ok_or_else(|| AdapterError::Message(format!("listing url has no host: {}", page.url)))?;
        let document = Html::parse_document(&page.body);
        let sel = Selectors::new()?;

        let mut seen = HashSet::new();
        let cards: Vec<ElementRef<'_>> = document.select(&sel.cards).collect();
        let mut drafts = if cards.is_empty() {
            self.parse_links(&document, &sel, &base, &site, &mut seen)
        } else {
            let mut drafts = Vec::new();
            for card in cards {
                if let Some(draft) = self.parse_card(card, &sel, &base, &site) {
                    if seen.insert(draft.url.clone()) {
                        drafts.push(draft);
                    }
                }
            }
            drafts
        };

        match next_data_items(&document) {
            Ok(items) => {
                for item in items {
                    if seen.insert(item.url.clone()) {
                        drafts.push(item);
                    }
                }
            }
            Err(err) => debug!(url = %page.url, error = %err, "ignoring unreadable page data"),
        }

        debug!(adapter = "fonduri_structurale", url = %page.url, found = drafts.len(), "parsed listing");
        Ok(drafts)
    }
}

pub fn fonduri_structurale_adapter() -> FonduriStructuraleAdapter {
    FonduriStructuraleAdapter
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;

    #[derive(Debug, Deserialize, PartialEq)]
    struct GoldenDraft {
        id: String,
        source: Source,
        title: String,
        url: String,
    }

    fn fixture_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/fonduri_structurale/sample")
    }

    fn listing_page() -> FetchedPage {
        let body = fs::read_to_string(fixture_dir().join("listing.html")).expect("read listing");
        FetchedPage::new(
            Source::FonduriStructurale,
            "https://www.fonduri-structurale.ro/apeluri-deschise",
            body,
        )
    }

    #[test]
    fn cards_and_page_data_match_snapshot() {
        let drafts = fonduri_structurale_adapter().parse_listing(&listing_page()).unwrap();
        let actual: Vec<GoldenDraft> = drafts
            .iter()
            .map(|d| GoldenDraft {
                id: d.id.clone(),
                source: d.source,
                title: d.title.clone(),
                url: d.url.clone(),
            })
            .collect();
        let text = fs::read_to_string(fixture_dir().join("snapshot.json")).expect("read snapshot");
        let expected: Vec<GoldenDraft> = serde_json::from_str(&text).expect("parse snapshot");
        assert_eq!(actual, expected);
    }

    #[test]
    fn cards_carry_deadline_and_short_description() {
        let drafts = fonduri_structurale_adapter().parse_listing(&listing_page()).unwrap();

        assert_eq!(drafts[0].deadline_raw.as_deref(), Some("30.06.2026"));
        assert_eq!(drafts[0].deadline_date, NaiveDate::from_ymd_opt(2026, 6, 30));
        assert!(drafts[0].description.starts_with("Finantare nerambursabila"));

        assert_eq!(drafts[1].deadline_raw.as_deref(), Some("15/09/2026"));
        assert_eq!(drafts[1].description, "Sprijin pentru transformarea digitala.");

        assert_eq!(drafts[2].deadline_date, NaiveDate::from_ymd_opt(2026, 5, 15));
        assert_eq!(drafts[2].description, "Apel pentru eficienta energetica in scoli.");
    }

    #[test]
    fn card_description_is_capped() {
        let long = "a".repeat(300);
        let html = format!(
            r#"<div class="card"><h3>Apel regional</h3><p>{long}</p><a href="/apel/regional">x</a></div>"#
        );
        let page = FetchedPage::new(Source::FonduriStructurale, BASE_URL, html);
        let drafts = fonduri_structurale_adapter().parse_listing(&page).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].description.len(), CARD_DESCRIPTION_LIMIT);
    }

    #[test]
    fn anchors_are_used_when_no_cards_exist() {
        let html = r#"<html><body>
            <a href="/programe/pocu-2026">Programul Educatie si Ocupare 2026</a>
            <a href="/despre">Despre platforma noastra</a>
            <a href="/granturi">Granturi</a>
        </body></html>"#;
        let page = FetchedPage::new(Source::FonduriStructurale, BASE_URL, html);
        let drafts = fonduri_structurale_adapter().parse_listing(&page).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].url, "https://www.fonduri-structurale.ro/programe/pocu-2026");
    }

    #[test]
    fn broken_page_data_keeps_card_results() {
        let html = r#"<html><body>
            <article><h2>Apel pentru ONG-uri 2026</h2><a href="/apel/ong-2026">detalii</a></article>
            <script id="__NEXT_DATA__" type="application/json">{ not json</script>
        </body></html>"#;
        let page = FetchedPage::new(Source::FonduriStructurale, BASE_URL, html);
        let drafts = fonduri_structurale_adapter().parse_listing(&page).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Apel pentru ONG-uri 2026");
    }

    #[test]
    fn page_data_resolves_relative_urls_and_skips_untitled_entries() {
        let html = r#"<html><body><script id="__NEXT_DATA__" type="application/json">
            {"props":{"pageProps":{"items":[
                {"name":"Program Regional Centru","link":"programe/centru","deadline":"1 iulie 2026"},
                {"title":"   ","url":"/apel/fara-titlu"},
                {"title":"Fara adresa"}
            ]}}}
        </script></body></html>"#;
        let document = Html::parse_document(html);
        let items = next_data_items(&document).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://www.fonduri-structurale.ro/programe/centru");
        assert_eq!(items[0].deadline_raw.as_deref(), Some("1 iulie 2026"));
        assert_eq!(items[0].deadline_date, NaiveDate::from_ymd_opt(2026, 7, 1));
    }
}
