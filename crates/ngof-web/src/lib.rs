//! Static HTML dashboard for the current set of matching opportunities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use askama::Template;
use chrono::{DateTime, NaiveDate, Utc};
use ngof_core::{Opportunity, Source};
use ngof_sync::RenderHook;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "ngof-web";

const UPDATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub deadline: Option<String>,
    pub deadline_date: Option<NaiveDate>,
    pub source: Source,
    pub matched_keywords: Vec<String>,
    pub is_high_priority: bool,
    pub closing_soon: bool,
}

impl From<&Opportunity> for DashboardItem {
    fn from(item: &Opportunity) -> Self {
        Self {
            id: item.draft.id.clone(),
            title: item.draft.title.clone(),
            url: item.draft.url.clone(),
            deadline: item.draft.deadline_raw.clone(),
            deadline_date: item.draft.deadline_date,
            source: item.draft.source,
            matched_keywords: item.matched_keywords.clone(),
            is_high_priority: item.is_high_priority,
            closing_soon: item.closing_soon,
        }
    }
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    items: &'a [DashboardItem],
    sources: BTreeMap<&'static str, &'static str>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    total: usize,
    closing_soon: usize,
    high_priority: usize,
    updated_at: String,
    ntfy_url: String,
    ntfy_label: String,
    payload: String,
}

/// Closing-soon items first, then high priority, then title (case-insensitive).
pub fn sort_for_display(items: &mut [DashboardItem]) {
    items.sort_by(|a, b| {
        b.closing_soon
            .cmp(&a.closing_soon)
            .then(b.is_high_priority.cmp(&a.is_high_priority))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
}

/// JSON for an inline `<script>`: markup-significant characters become `\u` escapes
/// so scraped titles cannot close the script element.
pub fn script_payload(items: &[DashboardItem]) -> Result<String> {
    let sources = Source::ALL
        .iter()
        .map(|source| (source.as_str(), source.display_name()))
        .collect();
    let json = serde_json::to_string(&Payload { items, sources })
        .context("serializing dashboard payload")?;
    Ok(json
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

pub fn render_dashboard(
    items: &[Opportunity],
    updated_at: DateTime<Utc>,
    ntfy_url: &str,
) -> Result<String> {
    let mut rows: Vec<DashboardItem> = items.iter().map(DashboardItem::from).collect();
    sort_for_display(&mut rows);

    let template = DashboardTemplate {
        total: rows.len(),
        closing_soon: rows.iter().filter(|i| i.closing_soon).count(),
        high_priority: rows.iter().filter(|i| i.is_high_priority).count(),
        updated_at: updated_at.format(UPDATED_AT_FORMAT).to_string(),
        ntfy_label: ntfy_label(ntfy_url),
        ntfy_url: ntfy_url.to_string(),
        payload: script_payload(&rows)?,
    };
    template.render().context("rendering dashboard template")
}

fn ntfy_label(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .to_string()
}

/// Writes the rendered dashboard to a fixed path after every run.
#[derive(Debug, Clone)]
pub struct StaticDashboard {
    output_path: PathBuf,
    ntfy_url: String,
}

impl StaticDashboard {
    pub fn new(output_path: impl Into<PathBuf>, ntfy_url: impl Into<String>) -> Self {
        Self {
            output_path: output_path.into(),
            ntfy_url: ntfy_url.into(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn write(&self, items: &[Opportunity], updated_at: DateTime<Utc>) -> Result<()> {
        let html = render_dashboard(items, updated_at, &self.ntfy_url)?;
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self
            .output_path
            .with_extension(format!("{}.tmp", Uuid::new_v4()));
        std::fs::write(&tmp, html).with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(err) = std::fs::rename(&tmp, &self.output_path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err).with_context(|| format!("replacing {}", self.output_path.display()));
        }
        info!(path = %self.output_path.display(), items = items.len(), "dashboard written");
        Ok(())
    }
}

impl RenderHook for StaticDashboard {
    fn render(&self, items: &[Opportunity], updated_at: DateTime<Utc>) -> Result<()> {
        self.write(items, updated_at)
    }
}
