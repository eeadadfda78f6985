//! Source adapter contract and the per-site funding extractors.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ngof_core::{DetailExtract, OpportunityDraft, Source};
use ngof_storage::{FetchError, HttpFetcher};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

mod anchor;
pub mod dates;
mod fonduri;
pub mod html;

pub use anchor::{
    afcn_adapter, fdsc_adapter, finantare_ro_adapter, ngohub_adapter, AnchorAdapter, SiteProfile,
    TitleFallback, UrlShape,
};
pub use dates::{parse_date, DeadlinePatterns};
pub use fonduri::{fonduri_structurale_adapter, FonduriStructuraleAdapter};

pub const CRATE_NAME: &str = "ngof-adapters";

/// Identifiers accepted by [`adapter_for_source`], in default run order.
pub const ADAPTER_IDS: [&str; 5] = [
    "finantare_ro",
    "fonduri_structurale",
    "afcn",
    "fdsc",
    "ngohub",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub source: Source,
    pub url: String,
    pub body: String,
}

impl FetchedPage {
    pub fn new(source: Source, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source,
            url: url.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub listing_timeout: Duration,
    pub detail_timeout: Duration,
}

impl Default for AdapterContext {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            listing_timeout: Duration::from_secs(30),
            detail_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTarget {
    pub url: String,
    pub source: Source,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid page data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// One funding source. Implementations supply listing pages and parsers; the
/// provided [`SourceAdapter::fetch_opportunities`] drives fetching with
/// per-page and per-item failure isolation.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn adapter_id(&self) -> &'static str;
    fn display_name(&self) -> &'static str;
    fn listing_targets(&self) -> Vec<ListingTarget>;

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<OpportunityDraft>, AdapterError>;

    /// How many discovered candidates get their detail page fetched.
    fn detail_limit(&self) -> usize {
        0
    }

    fn parse_detail(&self, _page: &FetchedPage) -> Result<DetailExtract, AdapterError> {
        Ok(DetailExtract::default())
    }

    async fn fetch_opportunities(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
    ) -> Vec<OpportunityDraft> {
        let adapter = self.adapter_id();
        let span = info_span!("adapter", adapter, run_id = %ctx.run_id);
        async {
            let mut drafts: Vec<OpportunityDraft> = Vec::new();
            let mut seen_urls = HashSet::new();

            for target in self.listing_targets() {
                info!(adapter, url = %target.url, "fetching listing");
                let page = match fetch_page(http, target.source, &target.url, ctx.listing_timeout).await {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(adapter, url = %target.url, error = %err, "listing fetch failed");
                        continue;
                    }
                };
                match self.parse_listing(&page) {
                    Ok(found) => {
                        for draft in found {
                            if seen_urls.insert(draft.url.clone()) {
                                drafts.push(draft);
                            }
                        }
                    }
                    Err(err) => warn!(adapter, url = %target.url, error = %err, "listing parse failed"),
                }
            }

            let limit = self.detail_limit().min(drafts.len());
            if limit > 0 {
                info!(adapter, candidates = drafts.len(), limit, "fetching detail pages");
            }
            for draft in drafts.iter_mut().take(limit) {
                let page = match fetch_page(http, draft.source, &draft.url, ctx.detail_timeout).await {
                    Ok(page) => page,
                    Err(err) => {
                        debug!(adapter, url = %draft.url, error = %err, "detail fetch failed");
                        continue;
                    }
                };
                match self.parse_detail(&page) {
                    Ok(detail) => draft.apply_detail(detail),
                    Err(err) => debug!(adapter, url = %draft.url, error = %err, "detail parse failed"),
                }
            }

            drafts
        }
        .instrument(span)
        .await
    }
}

pub async fn fetch_page(
    http: &HttpFetcher,
    source: Source,
    url: &str,
    timeout: Duration,
) -> Result<FetchedPage, AdapterError> {
    let resp = http.fetch_text(source.as_str(), url, Some(timeout)).await?;
    Ok(FetchedPage {
        source,
        url: resp.final_url,
        body: resp.body,
    })
}

pub fn adapter_for_source(adapter_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match adapter_id {
        "finantare_ro" => Some(Box::new(finantare_ro_adapter())),
        "fonduri_structurale" => Some(Box::new(fonduri_structurale_adapter())),
        "afcn" => Some(Box::new(afcn_adapter())),
        "fdsc" => Some(Box::new(fdsc_adapter())),
        "ngohub" => Some(Box::new(ngohub_adapter())),
        _ => None,
    }
}

pub fn default_adapters() -> Vec<Box<dyn SourceAdapter>> {
    ADAPTER_IDS
        .iter()
        .filter_map(|id| adapter_for_source(id))
        .collect()
}
