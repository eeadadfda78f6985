//! Anchor-scraping extractors: walk every link on a listing page and keep the
//! ones that look like funding announcements.

use std::collections::HashSet;

use async_trait::async_trait;
use ngof_core::{truncate_chars, DetailExtract, OpportunityDraft, Source, DESCRIPTION_LIMIT};
use ngof_storage::content_id;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::dates::{
    DeadlinePatterns, AFCN_DEADLINES, FDSC_DEADLINES, FINANTARE_DEADLINES, NGOHUB_DEADLINES,
};
use crate::html::{element_text, first_match, resolve_link, same_site, selector, site_host, visible_text};
use crate::{AdapterError, FetchedPage, ListingTarget, SourceAdapter};

static POST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Previous|Next)(Previous|Next)?\s*post:").expect("post prefix regex"));

const GENERIC_LINK_TEXT: [&str; 5] = [
    "află mai multe",
    "afla mai multe",
    "citeste",
    "read more",
    "mai mult",
];

/// Anchor text shorter than this is replaced by a nearby heading when the profile allows it.
const SHORT_LINK_TEXT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlShape {
    Any,
    /// `*.html`, or a single lowercase slug segment with a trailing slash.
    Article,
}

impl UrlShape {
    fn accepts(self, url: &Url) -> bool {
        match self {
            UrlShape::Any => true,
            UrlShape::Article => {
                if url.query().is_some() {
                    return false;
                }
                let path = url.path();
                path.ends_with(".html") || is_single_slug(path)
            }
        }
    }
}

fn is_single_slug(path: &str) -> bool {
    let Some(slug) = path.strip_prefix('/').and_then(|p| p.strip_suffix('/')) else {
        return false;
    };
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleFallback {
    None,
    /// Look for an `h1`..`h4` inside the link's three closest ancestors.
    AncestorHeading,
}

/// Everything that distinguishes one anchor-scraped site from another.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub adapter_id: &'static str,
    pub display_name: &'static str,
    pub targets: &'static [(&'static str, Source)],
    /// Substrings that disqualify an absolute URL.
    pub skip: &'static [&'static str],
    /// At least one must occur in the lowercased `url + " " + title`.
    pub allow: &'static [&'static str],
    pub min_title_chars: usize,
    pub url_shape: UrlShape,
    pub title_fallback: TitleFallback,
    pub strip_post_prefix: bool,
    pub nav_titles: &'static [&'static str],
    pub detail_limit: usize,
    /// Containers tried in order for the detail description; the whole page otherwise.
    pub body_selectors: &'static [&'static str],
    pub deadlines: &'static DeadlinePatterns,
}

#[derive(Debug, Clone)]
pub struct AnchorAdapter {
    profile: SiteProfile,
}

impl AnchorAdapter {
    pub fn new(profile: SiteProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn link_title(&self, link: ElementRef<'_>, headings: &Selector) -> String {
        let mut title = element_text(link);

        if self.profile.title_fallback == TitleFallback::AncestorHeading && is_weak_title(&title) {
            for ancestor in link.ancestors().take(3) {
                let Some(container) = ElementRef::wrap(ancestor) else {
                    break;
                };
                if let Some(heading) = container.select(headings).next() {
                    title = element_text(heading);
                    break;
                }
            }
        }

        if self.profile.strip_post_prefix {
            title = POST_PREFIX.replace(&title, "").trim().to_string();
        }
        title
    }

    fn is_allowed(&self, url: &str, title: &str) -> bool {
        if self.profile.allow.is_empty() {
            return true;
        }
        let combined = format!("{url} {title}").to_lowercase();
        self.profile.allow.iter().any(|kw| combined.contains(kw))
    }
}

fn is_weak_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    title.chars().count() < SHORT_LINK_TEXT || GENERIC_LINK_TEXT.contains(&lower.as_str())
}

#[async_trait]
impl SourceAdapter for AnchorAdapter {
    fn adapter_id(&self) -> &'static str {
        self.profile.adapter_id
    }

    fn display_name(&self) -> &'static str {
        self.profile.display_name
    }

    fn listing_targets(&self) -> Vec<ListingTarget> {
        self.profile
            .targets
            .iter()
            .map(|(url, source)| ListingTarget {
                url: (*url).to_string(),
                source: *source,
            })
            .collect()
    }

    fn detail_limit(&self) -> usize {
        self.profile.detail_limit
    }

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<OpportunityDraft>, AdapterError> {
        let base = Url::parse(&page.url)?;
        let site = site_host(&base)
            .ok_or_else(|| AdapterError::Message(format!("listing url has no host: {}", page.url)))?;
        let document = Html::parse_document(&page.body);
        let anchors = selector("a[href]")?;
        let headings = selector("h1, h2, h3, h4")?;

        let mut seen = HashSet::new();
        let mut drafts = Vec::new();
        for link in document.select(&anchors) {
            let Some(url) = link
                .value()
                .attr("href")
                .and_then(|href| resolve_link(&base, href))
            else {
                continue;
            };
            if !same_site(&url, &site) || !self.profile.url_shape.accepts(&url) {
                continue;
            }
            let url = url.to_string();
            if self.profile.skip.iter().any(|s| url.contains(s)) || seen.contains(&url) {
                continue;
            }

            let title = self.link_title(link, &headings);
            if title.chars().count() < self.profile.min_title_chars {
                continue;
            }
            if self.profile.nav_titles.contains(&title.to_lowercase().as_str()) {
                continue;
            }
            if !self.is_allowed(&url, &title) {
                continue;
            }

            seen.insert(url.clone());
            drafts.push(OpportunityDraft::new(
                content_id(page.source, &url),
                page.source,
                title,
                url,
            ));
        }

        debug!(adapter = self.profile.adapter_id, url = %page.url, found = drafts.len(), "parsed listing");
        Ok(drafts)
    }

    fn parse_detail(&self, page: &FetchedPage) -> Result<DetailExtract, AdapterError> {
        let document = Html::parse_document(&page.body);
        let body = first_match(&document, self.profile.body_selectors)?
            .unwrap_or_else(|| document.root_element());
        let text = visible_text(body);

        let (deadline_raw, deadline_date) = match self.profile.deadlines.find(&text) {
            Some((raw, date)) => (Some(raw), date),
            None => (None, None),
        };
        Ok(DetailExtract {
            description: truncate_chars(&text, DESCRIPTION_LIMIT),
            deadline_raw,
            deadline_date,
        })
    }
}

pub fn finantare_ro_adapter() -> AnchorAdapter {
    AnchorAdapter::new(SiteProfile {
        adapter_id: "finantare_ro",
        display_name: "Finantare.ro",
        targets: &[
            ("https://www.finantare.ro/fonduri-nerambursabile.html", Source::FinantareRo),
            ("https://www.finantare.ro/", Source::FinantareRo),
        ],
        skip: &[
            "/category/",
            "/tag/",
            "/page/",
            "/author/",
            "#",
            "/wp-content/",
            "/feed/",
            "/contact",
            "facebook.com",
            "twitter.com",
            "/despre-noi",
            "/wp-login",
            "/wp-admin",
        ],
        allow: &["finantare"],
        min_title_chars: 10,
        url_shape: UrlShape::Article,
        title_fallback: TitleFallback::None,
        strip_post_prefix: true,
        nav_titles: &["acasa", "home", "contact", "despre noi", "mai multe"],
        detail_limit: 30,
        body_selectors: &["div.articlebody", "article", "div.entry-content"],
        deadlines: &FINANTARE_DEADLINES,
    })
}

pub fn afcn_adapter() -> AnchorAdapter {
    AnchorAdapter::new(SiteProfile {
        adapter_id: "afcn",
        display_name: "AFCN - Fondul Cultural National",
        targets: &[
            ("https://www.afcn.ro/programe/proiecte-culturale", Source::Afcn),
            ("https://www.afcn.ro/programe/proiecte-editoriale", Source::Afcn),
            ("https://www.afcn.ro", Source::Afcn),
        ],
        skip: &[
            "#",
            "/wp-content/",
            "/feed/",
            "javascript:",
            "facebook.com",
            "twitter.com",
            "/login",
        ],
        allow: &[
            "program",
            "proiect",
            "sesiune",
            "finantare",
            "fonduri",
            "apel",
            "concurs",
            "grant",
            "cultural",
            "editorial",
        ],
        min_title_chars: 10,
        url_shape: UrlShape::Any,
        title_fallback: TitleFallback::None,
        strip_post_prefix: false,
        nav_titles: &[],
        detail_limit: 20,
        body_selectors: &[],
        deadlines: &AFCN_DEADLINES,
    })
}

pub fn fdsc_adapter() -> AnchorAdapter {
    AnchorAdapter::new(SiteProfile {
        adapter_id: "fdsc",
        display_name: "FDSC / Active Citizens Fund",
        targets: &[
            ("https://www.fdsc.ro", Source::Fdsc),
            ("https://www.activecitizensfund.ro", Source::ActiveCitizens),
        ],
        skip: &[
            "#",
            "/wp-content/",
            "/feed/",
            "javascript:",
            ".pdf",
            ".doc",
            ".png",
            ".jpg",
            ".css",
            ".js",
        ],
        allow: &[
            "grant",
            "finantare",
            "finantar",
            "apel",
            "fond",
            "program",
            "proiect",
            "concurs",
            "sesiune",
            "call",
            "funding",
            "ngo",
            "ong",
            "civic",
            "democratie",
            "drept",
            "egal",
            "incluziune",
        ],
        min_title_chars: 10,
        url_shape: UrlShape::Any,
        title_fallback: TitleFallback::AncestorHeading,
        strip_post_prefix: false,
        nav_titles: &[],
        detail_limit: 20,
        body_selectors: &[],
        deadlines: &FDSC_DEADLINES,
    })
}

pub fn ngohub_adapter() -> AnchorAdapter {
    AnchorAdapter::new(SiteProfile {
        adapter_id: "ngohub",
        display_name: "NGO Hub / Eurodesk",
        targets: &[
            ("https://ngohub.ro", Source::Ngohub),
            ("https://www.eurodesk.ro", Source::Ngohub),
        ],
        skip: &[
            "#",
            "javascript:",
            ".pdf",
            ".doc",
            "facebook.com",
            "twitter.com",
            "linkedin.com",
        ],
        allow: &[
            "grant",
            "finantare",
            "finantar",
            "fond",
            "funding",
            "apel",
            "program",
            "concurs",
            "burs",
            "sponsoriz",
        ],
        min_title_chars: 10,
        url_shape: UrlShape::Any,
        title_fallback: TitleFallback::None,
        strip_post_prefix: false,
        nav_titles: &[],
        detail_limit: 20,
        body_selectors: &[],
        deadlines: &NGOHUB_DEADLINES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde::Deserialize;
    use std::fs;
    use std::path::{Path, PathBuf};

    #[derive(Debug, Deserialize, PartialEq)]
    struct GoldenDraft {
        id: String,
        source: Source,
        title: String,
        url: String,
    }

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn fixture(source_id: &str, name: &str) -> String {
        let path = workspace_root()
            .join("fixtures")
            .join(source_id)
            .join("sample")
            .join(name);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
    }

    fn golden(drafts: &[OpportunityDraft]) -> Vec<GoldenDraft> {
        drafts
            .iter()
            .map(|d| GoldenDraft {
                id: d.id.clone(),
                source: d.source,
                title: d.title.clone(),
                url: d.url.clone(),
            })
            .collect()
    }

    fn snapshot(source_id: &str) -> Vec<GoldenDraft> {
        serde_json::from_str(&fixture(source_id, "snapshot.json")).expect("parse snapshot")
    }

    #[test]
    fn finantare_listing_matches_snapshot() {
        let page = FetchedPage::new(
            Source::FinantareRo,
            "https://www.finantare.ro/fonduri-nerambursabile.html",
            fixture("finantare_ro", "listing.html"),
        );
        let drafts = finantare_ro_adapter().parse_listing(&page).unwrap();
        assert_eq!(golden(&drafts), snapshot("finantare_ro"));
        assert!(drafts.iter().all(|d| d.deadline_raw.is_none() && d.description.is_empty()));
    }

    #[test]
    fn finantare_detail_prefers_article_body() {
        let page = FetchedPage::new(
            Source::FinantareRo,
            "https://www.finantare.ro/apel-proiecte-steam-pentru-elevi-2026.html",
            fixture("finantare_ro", "detail.html"),
        );
        let detail = finantare_ro_adapter().parse_detail(&page).unwrap();
        assert!(detail.description.starts_with("Apel de proiecte STEAM pentru elevi 2026"));
        assert!(!detail.description.contains("Copyright"));
        assert!(!detail.description.contains("var termen"));
        assert_eq!(detail.deadline_raw.as_deref(), Some("20 aprilie 2026"));
        assert_eq!(detail.deadline_date, NaiveDate::from_ymd_opt(2026, 4, 20));
    }

    #[test]
    fn fdsc_listing_matches_snapshot() {
        let page = FetchedPage::new(
            Source::Fdsc,
            "https://www.fdsc.ro/",
            fixture("fdsc", "listing.html"),
        );
        let drafts = fdsc_adapter().parse_listing(&page).unwrap();
        assert_eq!(golden(&drafts), snapshot("fdsc"));
    }

    #[test]
    fn fdsc_tags_follow_the_listing_page() {
        let page = FetchedPage::new(
            Source::ActiveCitizens,
            "https://www.activecitizensfund.ro/",
            fixture("fdsc", "listing.html"),
        );
        let drafts = fdsc_adapter().parse_listing(&page).unwrap();
        assert_eq!(drafts.len(), 2);
        for draft in &drafts {
            assert_eq!(draft.source, Source::ActiveCitizens);
            assert!(draft.id.starts_with("active_citizens_"));
            assert!(draft.url.starts_with("https://www.activecitizensfund.ro/"));
        }
    }

    #[test]
    fn fdsc_detail_falls_back_to_whole_page() {
        let page = FetchedPage::new(
            Source::Fdsc,
            "https://www.fdsc.ro/apel",
            "<html><body><h1>Apel civic</h1><p>TERMEN LIMITĂ: 10.03.2026</p><script>x()</script></body></html>",
        );
        let detail = fdsc_adapter().parse_detail(&page).unwrap();
        assert_eq!(detail.description, "Apel civic TERMEN LIMITĂ: 10.03.2026");
        assert_eq!(detail.deadline_date, NaiveDate::from_ymd_opt(2026, 3, 10));
    }

    #[test]
    fn afcn_requires_funding_tokens_and_own_domain() {
        let html = r#"<html><body>
            <a href="/programe/proiecte-culturale/sesiunea-1-2026">Sesiunea I 2026 de finantare</a>
            <a href="/despre/echipa-administratiei">Echipa administratiei fondului</a>
            <a href="https://www.facebook.com/afcn.ro/program">Program pe Facebook azi</a>
            <a href="/login">Autentificare in platforma</a>
            <a href="/apel">Apel</a>
        </body></html>"#;
        let page = FetchedPage::new(Source::Afcn, "https://www.afcn.ro", html);
        let drafts = afcn_adapter().parse_listing(&page).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(
            drafts[0].url,
            "https://www.afcn.ro/programe/proiecte-culturale/sesiunea-1-2026"
        );
        assert_eq!(drafts[0].title, "Sesiunea I 2026 de finantare");
    }

    #[test]
    fn ngohub_detail_reads_iso_deadline() {
        let page = FetchedPage::new(
            Source::Ngohub,
            "https://ngohub.ro/granturi",
            "<html><body><p>Program de granturi. Deadline: 2026-06-30</p></body></html>",
        );
        let detail = ngohub_adapter().parse_detail(&page).unwrap();
        assert_eq!(detail.deadline_raw.as_deref(), Some("2026-06-30"));
        assert_eq!(detail.deadline_date, NaiveDate::from_ymd_opt(2026, 6, 30));
    }

    #[test]
    fn article_shape_accepts_html_and_single_slug_only() {
        let ok = |u: &str| UrlShape::Article.accepts(&Url::parse(u).unwrap());
        assert!(ok("https://www.finantare.ro/apel-2026.html"));
        assert!(ok("https://www.finantare.ro/granturi-2026/"));
        assert!(!ok("https://www.finantare.ro/fonduri/regionale/"));
        assert!(!ok("https://www.finantare.ro/Granturi/"));
        assert!(!ok("https://www.finantare.ro/"));
        assert!(!ok("https://www.finantare.ro/granturi-2026/?p=2"));
    }

    #[test]
    fn post_prefix_is_stripped() {
        assert_eq!(POST_PREFIX.replace("Next post: Apel nou", "").trim(), "Apel nou");
        assert_eq!(POST_PREFIX.replace("PreviousNextpost:Apel", "").trim(), "Apel");
        assert_eq!(POST_PREFIX.replace("Apel Next post:", ""), "Apel Next post:");
    }
}
