//! Small HTML helpers shared by the site extractors.

use ngof_core::collapse_whitespace;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::AdapterError;

pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Message(format!("bad selector {css:?}: {e}")))
}

/// Text of an element with whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Like [`element_text`] but skips `script`, `style` and `noscript` content.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                .unwrap_or(false)
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

/// First element matching any of `selectors`, in selector order.
pub(crate) fn first_match<'a>(
    document: &'a Html,
    selectors: &[&str],
) -> Result<Option<ElementRef<'a>>, AdapterError> {
    for css in selectors {
        let sel = selector(css)?;
        if let Some(found) = document.select(&sel).next() {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Resolve an anchor `href` against the page it was found on.
/// Fragment-only, script, mail and phone links resolve to nothing, as do non-HTTP schemes.
pub fn resolve_link(page: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }
    let url = page.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Host without a leading `www.`.
pub fn site_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

/// True when `url` lives on `site` or one of its subdomains.
pub fn same_site(url: &Url, site: &str) -> bool {
    match site_host(url) {
        Some(host) => host == site || host.ends_with(&format!(".{site}")),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://www.afcn.ro/programe/proiecte-culturale").unwrap()
    }

    #[test]
    fn resolves_relative_paths_against_page_origin() {
        let url = resolve_link(&page(), "/programe/sesiune-2026").unwrap();
        assert_eq!(url.as_str(), "https://www.afcn.ro/programe/sesiune-2026");
        let url = resolve_link(&page(), "sesiune-2026").unwrap();
        assert_eq!(url.as_str(), "https://www.afcn.ro/programe/sesiune-2026");
    }

    #[test]
    fn rejects_fragments_and_non_http_links() {
        assert!(resolve_link(&page(), "#continut").is_none());
        assert!(resolve_link(&page(), "javascript:void(0)").is_none());
        assert!(resolve_link(&page(), "mailto:office@afcn.ro").is_none());
        assert!(resolve_link(&page(), "ftp://afcn.ro/file").is_none());
    }

    #[test]
    fn same_site_ignores_www_but_not_other_domains() {
        let site = site_host(&page()).unwrap();
        assert_eq!(site, "afcn.ro");
        assert!(same_site(&Url::parse("https://afcn.ro/a").unwrap(), &site));
        assert!(same_site(&Url::parse("https://granturi.afcn.ro/a").unwrap(), &site));
        assert!(!same_site(&Url::parse("https://www.facebook.com/afcn.ro").unwrap(), &site));
        assert!(!same_site(&Url::parse("https://notafcn.ro/a").unwrap(), &site));
    }

    #[test]
    fn visible_text_skips_scripts() {
        let doc = Html::parse_document(
            "<html><body><p>Apel  deschis</p><script>var x = 1;</script><style>p{}</style><p>granturi</p></body></html>",
        );
        assert_eq!(visible_text(doc.root_element()), "Apel deschis granturi");
    }
}
