//! Sync pipeline: scrape every enabled source, classify, diff against the seen
//! database, notify, persist and hand the matching set to the renderer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ngof_adapters::{adapter_for_source, default_adapters, AdapterContext, SourceAdapter};
use ngof_core::{Opportunity, OpportunityDraft};
use ngof_storage::{HttpClientConfig, HttpFetcher, SeenStore};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod classify;
pub mod notify;
pub mod tracker;

pub use classify::{closing_soon, KeywordClassifier, KeywordConfig};
pub use notify::{sanitize_header, LogNotifier, Notifier, NtfyMessage, NtfyNotifier};
pub use tracker::DiffOutcome;

pub const CRATE_NAME: &str = "ngof-sync";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; NGO-Funding-Scraper/1.0)";
pub const DEFAULT_NTFY_URL: &str = "https://ntfy.sh/qub-ngo-funding";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    /// Configured display name, falling back to the adapter's own.
    pub fn label<'a>(&'a self, adapter: &'a dyn SourceAdapter) -> &'a str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| adapter.display_name())
    }
}

impl SourceRegistry {
    /// `sources.yaml` under `root`; `None` when the file does not exist.
    pub fn from_workspace_root(root: &Path) -> Result<Option<Self>> {
        let path = root.join("sources.yaml");
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let registry = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(registry))
    }

    /// Adapters for enabled entries, in file order. Unknown ids are skipped.
    pub fn adapters(&self) -> Vec<Box<dyn SourceAdapter>> {
        let mut adapters = Vec::new();
        for source in self.sources.iter().filter(|s| s.enabled) {
            match adapter_for_source(&source.source_id) {
                Some(adapter) => {
                    info!(source_id = %source.source_id, name = source.label(adapter.as_ref()), "source enabled");
                    adapters.push(adapter);
                }
                None => warn!(source_id = %source.source_id, "no adapter registered; skipping"),
            }
        }
        adapters
    }
}

/// Adapters selected by `sources.yaml`, or every built-in one when it is absent.
pub fn configured_adapters(root: &Path) -> Result<Vec<Box<dyn SourceAdapter>>> {
    Ok(match SourceRegistry::from_workspace_root(root)? {
        Some(registry) => registry.adapters(),
        None => default_adapters(),
    })
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub data_file: PathBuf,
    pub dashboard_file: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub detail_timeout_secs: u64,
    pub ntfy_url: String,
    pub notifications_enabled: bool,
    pub summary_notification: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            data_file: PathBuf::from("data/seen_funding.json"),
            dashboard_file: PathBuf::from("docs/index.html"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 30,
            detail_timeout_secs: 15,
            ntfy_url: DEFAULT_NTFY_URL.to_string(),
            notifications_enabled: true,
            summary_notification: false,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workspace_root: std::env::var("NGOF_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            data_file: std::env::var("NGOF_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_file),
            dashboard_file: std::env::var("NGOF_DASHBOARD_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.dashboard_file),
            user_agent: std::env::var("NGOF_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("NGOF_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            detail_timeout_secs: std::env::var("NGOF_DETAIL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.detail_timeout_secs),
            ntfy_url: std::env::var("NGOF_NTFY_URL").unwrap_or(defaults.ntfy_url),
            notifications_enabled: std::env::var("NGOF_NOTIFICATIONS")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"))
                .unwrap_or(defaults.notifications_enabled),
            summary_notification: std::env::var("NGOF_SUMMARY_NOTIFICATION")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on"))
                .unwrap_or(defaults.summary_notification),
        }
    }

    /// Seen database location; relative paths hang off the workspace root.
    pub fn data_path(&self) -> PathBuf {
        self.workspace_root.join(&self.data_file)
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.workspace_root.join(&self.dashboard_file)
    }
}

/// Receives the full matching set once per run.
pub trait RenderHook: Send + Sync {
    fn render(&self, items: &[Opportunity], updated_at: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
pub struct NoopRenderHook;

impl RenderHook for NoopRenderHook {
    fn render(&self, _items: &[Opportunity], _updated_at: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources_run: usize,
    pub scraped: usize,
    pub matching: usize,
    pub new_items: usize,
    pub notified: usize,
    pub notification_failures: usize,
    pub pruned: usize,
}

pub struct SyncPipeline {
    config: SyncConfig,
    http: HttpFetcher,
    store: SeenStore,
    classifier: KeywordClassifier,
    adapters: Vec<Box<dyn SourceAdapter>>,
    notifier: Box<dyn Notifier>,
    render: Box<dyn RenderHook>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        let keywords = KeywordConfig::from_workspace_root(&config.workspace_root)
            .unwrap_or_else(|err| {
                warn!(error = %format!("{err:#}"), "keyword rules unusable; using built-in tiers");
                KeywordConfig::default()
            });
        let classifier = KeywordClassifier::new(&keywords)?;
        let adapters = configured_adapters(&config.workspace_root).unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "source registry unusable; running every built-in source");
            default_adapters()
        });
        let notifier: Box<dyn Notifier> = if config.notifications_enabled {
            Box::new(NtfyNotifier::new(config.ntfy_url.clone())?)
        } else {
            Box::<LogNotifier>::default()
        };
        Ok(Self {
            store: SeenStore::new(config.data_path()),
            config,
            http,
            classifier,
            adapters,
            notifier,
            render: Box::<NoopRenderHook>::default(),
        })
    }

    pub fn with_adapters(mut self, adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_render_hook(mut self, render: Box<dyn RenderHook>) -> Self {
        self.render = render;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// One full pass. Source, item, persistence and notification failures are
    /// logged and counted; the returned summary is always produced.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        self.run_at(run_id, Utc::now())
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run_at(&self, run_id: Uuid, started_at: DateTime<Utc>) -> Result<SyncRunSummary> {
        let today = started_at.date_naive();
        let mut db = self.store.load().await;
        info!(seen = db.len(), "loaded seen database");

        let ctx = AdapterContext {
            run_id,
            listing_timeout: Duration::from_secs(self.config.http_timeout_secs),
            detail_timeout: Duration::from_secs(self.config.detail_timeout_secs),
        };
        let scraped = self.scrape_all(&ctx).await;
        info!(scraped = scraped.len(), "scraped all sources");

        let current_ids: HashSet<String> = scraped.iter().map(|d| d.id.clone()).collect();
        let scraped_count = scraped.len();
        let matching: Vec<Opportunity> = scraped
            .into_iter()
            .filter_map(|draft| self.classifier.classify(draft, today))
            .collect();

        let new_items = tracker::record_new(&mut db, &matching, started_at);
        info!(matching = matching.len(), new = new_items.len(), "classified opportunities");

        let mut notified = 0usize;
        let mut notification_failures = 0usize;
        for item in &new_items {
            let preview: Vec<&str> = item.matched_keywords.iter().take(5).map(String::as_str).collect();
            info!(id = item.id(), title = item.title(), keywords = %preview.join(", "), "new opportunity");
            if self.notifier.notify(item, &item.matched_keywords).await {
                notified += 1;
            } else {
                notification_failures += 1;
            }
        }

        let pruned = tracker::prune(&mut db, &current_ids);
        if pruned > 0 {
            info!(pruned, "removed listings that disappeared");
        }

        db.last_updated = Some(started_at);
        if let Err(err) = self.store.save(&db).await {
            error!(error = %format!("{err:#}"), "failed to save seen database");
        }

        if self.config.summary_notification
            && !self
                .notifier
                .notify_summary(new_items.len(), matching.len())
                .await
        {
            notification_failures += 1;
        }

        if let Err(err) = self.render.render(&matching, started_at) {
            error!(error = %format!("{err:#}"), "failed to render dashboard");
        }

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources_run: self.adapters.len(),
            scraped: scraped_count,
            matching: matching.len(),
            new_items: new_items.len(),
            notified,
            notification_failures,
            pruned,
        };
        info!(
            scraped = summary.scraped,
            matching = summary.matching,
            new = summary.new_items,
            notified = summary.notified,
            failures = summary.notification_failures,
            pruned = summary.pruned,
            "sync run complete"
        );
        Ok(summary)
    }

    async fn scrape_all(&self, ctx: &AdapterContext) -> Vec<OpportunityDraft> {
        let mut all = Vec::new();
        for adapter in &self.adapters {
            info!(adapter = adapter.adapter_id(), name = adapter.display_name(), "scraping source");
            let drafts = adapter.fetch_opportunities(&self.http, ctx).await;
            info!(adapter = adapter.adapter_id(), found = drafts.len(), "source finished");
            all.extend(drafts);
        }
        all
    }
}
