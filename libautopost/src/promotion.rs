//! The author's note.com articles, used by promotional posts
//!
//! Articles come from note.com's creator contents endpoint. The endpoint is
//! unofficial, so any failure degrades to an empty list rather than an error.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::generator::prompt::truncate_chars;
use crate::history::save_json;
use crate::types::NoteArticle;

pub const NOTE_API_BASE: &str = "https://note.com";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "Autopost/1.0";
const PAGE_SIZE: u32 = 50;
const SUMMARY_CHARS: usize = 100;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentsResponse {
    data: ContentsData,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentsData {
    contents: Vec<NoteItem>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct NoteItem {
    note_url: String,
    name: String,
    body: Option<String>,
}

impl NoteItem {
    fn into_article(self) -> Option<NoteArticle> {
        if self.note_url.is_empty() || self.name.is_empty() {
            return None;
        }
        let summary = self
            .body
            .map(|body| truncate_chars(&body, SUMMARY_CHARS).replace('\n', " ").trim().to_string())
            .unwrap_or_default();
        Some(NoteArticle {
            url: self.note_url,
            title: self.name,
            summary,
        })
    }
}

/// Creator name from a profile URL (`https://note.com/name/...`) or a bare name
pub fn extract_username(url_or_name: &str) -> String {
    let trimmed = url_or_name.trim().trim_end_matches('/');
    match trimmed.rsplit_once("note.com/") {
        Some((_, rest)) => rest
            .split(['/', '?'])
            .next()
            .unwrap_or_default()
            .to_string(),
        None => trimmed.to_string(),
    }
}

pub struct NoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl NoteClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, NOTE_API_BASE)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Published articles of a creator, newest first as note.com lists them
    pub async fn fetch_articles(&self, url_or_name: &str) -> Vec<NoteArticle> {
        let username = extract_username(url_or_name);
        if username.is_empty() {
            return Vec::new();
        }

        match self.fetch_contents(&username).await {
            Ok(items) => {
                let articles: Vec<NoteArticle> =
                    items.into_iter().filter_map(NoteItem::into_article).collect();
                info!("Fetched {} note articles for {}", articles.len(), username);
                articles
            }
            Err(e) => {
                warn!("Failed to fetch note articles for {}: {}", username, e.without_url());
                Vec::new()
            }
        }
    }

    async fn fetch_contents(&self, username: &str) -> reqwest::Result<Vec<NoteItem>> {
        let url = format!(
            "{}/api/v2/creators/{}/contents",
            self.base_url,
            urlencoding::encode(username)
        );
        let response: ContentsResponse = self
            .client
            .get(url)
            .query(&[("kind", "note"), ("page", "1")])
            .query(&[("per_page", PAGE_SIZE)])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.data.contents)
    }
}

/// Last article fetch, as shown in the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NoteCacheDoc {
    pub articles: Vec<NoteArticle>,
    /// Unix time of the fetch
    pub fetched_at: i64,
    pub note_url: String,
}

#[derive(Debug, Clone)]
pub struct NoteCache {
    path: PathBuf,
}

impl NoteCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached fetch, or an empty document when nothing usable is stored
    pub fn load(&self) -> NoteCacheDoc {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, note_url: &str, articles: Vec<NoteArticle>) -> Result<NoteCacheDoc> {
        let doc = NoteCacheDoc {
            articles,
            fetched_at: Utc::now().timestamp(),
            note_url: note_url.to_string(),
        };
        save_json(&self.path, &doc)?;
        Ok(doc)
    }
}
