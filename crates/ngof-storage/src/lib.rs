//! HTTP fetch utilities, content-addressed ids and seen-database persistence for NGOF.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use ngof_core::{SeenDatabase, Source};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use md5::{Digest, Md5};
use thiserror::Error;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ngof-storage";

/// Hex digits of the URL digest kept in an opportunity id.
pub const ID_DIGEST_LEN: usize = 12;

pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content-addressed opportunity id: `<source tag>_<first 12 hex chars of md5(url)>`.
/// Matches the ids already stored in existing seen databases.
pub fn content_id(source: Source, url: &str) -> String {
    let digest = md5_hex(url.as_bytes());
    format!("{}_{}", source.as_str(), &digest[..ID_DIGEST_LEN])
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            accept_language: Some("ro-RO,ro;q=0.9,en;q=0.8".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single-attempt page fetcher. A timeout surfaces as an ordinary [`FetchError::Request`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        if let Some(lang) = &config.accept_language {
            headers.insert(
                ACCEPT_LANGUAGE,
                HeaderValue::from_str(lang).context("invalid accept-language header")?,
            );
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .default_headers(headers);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch a page body as text. `timeout` overrides the client default for this request.
    pub async fn fetch_text(
        &self,
        source: &str,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", source, url);
        async move {
            let resp = self
                .client
                .get(url)
                .timeout(timeout.unwrap_or(self.timeout))
                .send()
                .await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let body = resp.text().await?;
            Ok(FetchedResponse {
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

/// JSON file holding the [`SeenDatabase`], loaded once per run and flushed once at the end.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the database. A missing or unreadable file yields an empty database.
    pub async fn load(&self) -> SeenDatabase {
        match self.try_load().await {
            Ok(Some(db)) => db,
            Ok(None) => {
                info!(path = %self.path.display(), "no seen database yet; starting empty");
                SeenDatabase::default()
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %format!("{err:#}"), "could not load seen database; starting empty");
                SeenDatabase::default()
            }
        }
    }

    async fn try_load(&self) -> anyhow::Result<Option<SeenDatabase>> {
        if !fs::try_exists(&self.path)
            .await
            .with_context(|| format!("checking {}", self.path.display()))?
        {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let db = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(db))
    }

    /// Write the database through a temp file and rename so a crash never leaves half a document.
    pub async fn save(&self, db: &SeenDatabase) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }

        let bytes = serde_json::to_vec_pretty(db).context("serializing seen database")?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "seen".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        fs::write(&temp_path, &bytes)
            .await
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "renaming {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            });
        }

        info!(path = %self.path.display(), items = db.len(), "saved seen database");
        Ok(())
    }
}
