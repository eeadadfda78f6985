//! Push notifications through an ntfy.sh topic.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ngof_core::{fold_diacritics, Opportunity};
use tracing::{error, info};

pub const NTFY_TIMEOUT: Duration = Duration::from_secs(10);

const TITLE_CHARS: usize = 60;

/// Keywords listed under "Prioritate ridicata" in the message body.
const HIGHLIGHT_KEYWORDS: [&str; 16] = [
    "educatie",
    "educatia",
    "educational",
    "steam",
    "stiinta",
    "tineret",
    "tineri",
    "copii",
    "elevi",
    "scoala",
    "scoli",
    "ngo",
    "ong",
    "societate civila",
    "cultura",
    "cultural",
];

/// Any of these raises the push priority to `high`.
const URGENT_KEYWORDS: [&str; 6] = ["educatie", "educatia", "steam", "tineret", "copii", "ong"];

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce one new opportunity. Failures are reported as `false`, never raised.
    async fn notify(&self, item: &Opportunity, keywords: &[String]) -> bool;

    async fn notify_summary(&self, _new_count: usize, _total_matching: usize) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtfyMessage {
    pub title: String,
    pub body: String,
    pub click: Option<String>,
    pub tags: &'static str,
    pub priority: &'static str,
}

impl NtfyMessage {
    pub fn for_item(item: &Opportunity, keywords: &[String]) -> Self {
        let title = &item.draft.title;
        let mut header = format!(
            "Finantare: {}",
            sanitize_header(&ngof_core::truncate_chars(title, TITLE_CHARS))
        );
        if title.chars().count() > TITLE_CHARS {
            header.push_str("...");
        }

        let mut lines = Vec::new();
        if let Some(deadline) = &item.draft.deadline_raw {
            lines.push(format!("Termen limita: {deadline}"));
        }
        lines.push(format!("Sursa: {}", item.draft.source.display_name()));

        let (high, other): (Vec<&String>, Vec<&String>) = keywords
            .iter()
            .partition(|k| HIGHLIGHT_KEYWORDS.contains(&k.to_lowercase().as_str()));
        if !high.is_empty() {
            lines.push(format!("Prioritate ridicata: {}", join(&high)));
        }
        if !other.is_empty() {
            lines.push(format!("Relevante: {}", join(&other)));
        }

        let urgent = keywords
            .iter()
            .any(|k| URGENT_KEYWORDS.contains(&k.to_lowercase().as_str()));

        Self {
            title: header,
            body: lines.join("\n"),
            click: Some(item.draft.url.clone()),
            tags: "money_with_wings,romania",
            priority: if urgent { "high" } else { "default" },
        }
    }

    pub fn test() -> Self {
        Self {
            title: "QUB Funding Scraper - Test".to_string(),
            body: "Aceasta este o notificare de test de la QUB NGO Funding Scraper.\n\nDaca vezi asta, notificarile functioneaza!".to_string(),
            click: None,
            tags: "white_check_mark,test_tube",
            priority: "low",
        }
    }

    pub fn summary(new_count: usize, total_matching: usize) -> Self {
        let (title, body, priority) = if new_count == 0 {
            (
                "QUB Funding - Verificare zilnica".to_string(),
                format!("Nicio oportunitate noua de finantare astazi.\n\nTotal oportunitati deschise: {total_matching}"),
                "low",
            )
        } else {
            (
                format!("QUB Funding - {new_count} oportunitati noi!"),
                format!("Am gasit {new_count} oportunitati noi de finantare!\n\nTotal oportunitati deschise: {total_matching}"),
                "default",
            )
        };
        Self {
            title,
            body,
            click: None,
            tags: "clipboard",
            priority,
        }
    }
}

fn join(keywords: &[&String]) -> String {
    keywords
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Make text safe for an HTTP header: typographic punctuation to ASCII, diacritics
/// transliterated, anything else outside printable ASCII dropped.
pub fn sanitize_header(text: &str) -> String {
    let punctuated: String = text
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            c if c.is_whitespace() => ' ',
            c => c,
        })
        .collect();
    fold_diacritics(&punctuated)
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

#[derive(Debug, Clone)]
pub struct NtfyNotifier {
    client: reqwest::Client,
    topic_url: String,
}

impl NtfyNotifier {
    pub fn new(topic_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NTFY_TIMEOUT)
            .build()
            .context("building ntfy client")?;
        Ok(Self {
            client,
            topic_url: topic_url.into(),
        })
    }

    pub fn topic_url(&self) -> &str {
        &self.topic_url
    }

    pub async fn send(&self, message: &NtfyMessage) -> Result<()> {
        let mut request = self
            .client
            .post(&self.topic_url)
            .header("Title", &message.title)
            .header("Tags", message.tags)
            .header("Priority", message.priority);
        if let Some(click) = &message.click {
            request = request.header("Click", click);
        }
        request
            .body(message.body.clone())
            .send()
            .await
            .with_context(|| format!("posting to {}", self.topic_url))?
            .error_for_status()
            .with_context(|| format!("ntfy rejected message for {}", self.topic_url))?;
        Ok(())
    }

    pub async fn send_test(&self) -> Result<()> {
        self.send(&NtfyMessage::test()).await?;
        info!("test notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    async fn notify(&self, item: &Opportunity, keywords: &[String]) -> bool {
        match self.send(&NtfyMessage::for_item(item, keywords)).await {
            Ok(()) => {
                info!(id = item.id(), "notification sent");
                true
            }
            Err(err) => {
                error!(id = item.id(), error = %format!("{err:#}"), "notification failed");
                false
            }
        }
    }

    async fn notify_summary(&self, new_count: usize, total_matching: usize) -> bool {
        match self.send(&NtfyMessage::summary(new_count, total_matching)).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %format!("{err:#}"), "summary notification failed");
                false
            }
        }
    }
}

/// Stand-in used when pushes are switched off: logs what would have been sent.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, item: &Opportunity, keywords: &[String]) -> bool {
        let message = NtfyMessage::for_item(item, keywords);
        info!(id = item.id(), title = %message.title, priority = message.priority, "notification (disabled)");
        true
    }

    async fn notify_summary(&self, new_count: usize, total_matching: usize) -> bool {
        info!(new_count, total_matching, "summary notification (disabled)");
        true
    }
}
