//! Core types for Autopost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A ranked headline harvested from the configured feeds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendItem {
    pub title: String,
    pub source_url: String,
    pub source_name: String,
}

/// A trend scored by smart analysis, with the suggested angle for the persona
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendAngle {
    pub trend: String,
    #[serde(default)]
    pub angle: String,
    #[serde(default)]
    pub score: f64,
}

/// Which flavour of post a generation run produces
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    /// Commentary on a current trend
    TrendLinked,
    /// Persona-driven post with no trend input
    Independent,
    /// Mention of one of the author's articles
    Promotional,
}

impl PostKind {
    /// Parse the wire form used by the control surface
    ///
    /// Accepts the snake_case names as well as the single-letter tags `A`, `B`, `C`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "a" | "trend_linked" | "trend" => Some(Self::TrendLinked),
            "b" | "independent" => Some(Self::Independent),
            "c" | "promotional" | "promotion" => Some(Self::Promotional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrendLinked => "trend_linked",
            Self::Independent => "independent",
            Self::Promotional => "promotional",
        }
    }

    /// Human-readable label used in scheduler log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::TrendLinked => "trend-linked",
            Self::Independent => "independent",
            Self::Promotional => "promotional",
        }
    }
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the author's own articles eligible for promotion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct NoteArticle {
    pub url: String,
    pub title: String,
    pub summary: String,
}

/// Where a history entry came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Published by this application
    #[default]
    App,
    /// Backfilled from an analytics export
    CsvImport,
}

/// Engagement counters reported by the platform's analytics export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Engagement {
    pub impressions: u64,
    pub likes: u64,
    pub engagement: u64,
    pub bookmarks: u64,
    pub shares: u64,
    pub follows: u64,
    pub replies: u64,
    pub retweets: u64,
    pub profile_clicks: u64,
    pub detail_clicks: u64,
    pub url_clicks: u64,
}

/// A single row of the post history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
    /// Unix time, 0 for imported rows
    #[serde(default)]
    pub epoch: i64,
    /// Comma-joined platform names
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub char_count: usize,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub trend: String,
    #[serde(default)]
    pub smart_analysis: bool,
    #[serde(default)]
    pub source: EntrySource,
    #[serde(default)]
    pub engagement: Option<Engagement>,
    /// Unix time of the last engagement import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_updated: Option<i64>,
}

impl HistoryEntry {
    pub fn impressions(&self) -> u64 {
        self.engagement.as_ref().map(|e| e.impressions).unwrap_or(0)
    }

    pub fn likes(&self) -> u64 {
        self.engagement.as_ref().map(|e| e.likes).unwrap_or(0)
    }
}

/// Account-level counters for one day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DailyOverview {
    pub date: String,
    pub impressions: u64,
    pub likes: u64,
    pub engagement: u64,
    pub bookmarks: u64,
    pub shares: u64,
    pub new_follows: u64,
    pub unfollows: u64,
    pub replies: u64,
    pub retweets: u64,
    pub profile_visits: u64,
    pub posts_created: u64,
    pub video_views: u64,
    pub media_views: u64,
    /// Unix time of the import that wrote this row
    pub imported_at: i64,
}

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An image to publish alongside the text
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAttachment {
    /// Local file, uploaded directly where the platform accepts uploads
    pub path: PathBuf,
    pub alt_text: Option<String>,
    /// Publicly reachable copy, required by platforms that fetch media by URL
    pub public_url: Option<String>,
}

impl MediaAttachment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            alt_text: None,
            public_url: None,
        }
    }

    pub fn with_alt_text(mut self, alt_text: impl Into<String>) -> Self {
        let alt_text = alt_text.into();
        self.alt_text = if alt_text.trim().is_empty() {
            None
        } else {
            Some(alt_text)
        };
        self
    }

    pub fn mime_type(&self) -> ImageMimeType {
        ImageMimeType::from_path(&self.path).unwrap_or(ImageMimeType::Jpeg)
    }
}

/// Content handed to a platform adapter
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub text: String,
    pub image: Option<MediaAttachment>,
}

impl PublishRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: MediaAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

/// Outcome of a single connection check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionCheck {
    pub service: String,
    pub ok: bool,
    pub message: String,
}

impl ConnectionCheck {
    pub fn ok(service: &str, message: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(service: &str, message: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            ok: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_kind_parse() {
        assert_eq!(PostKind::parse("A"), Some(PostKind::TrendLinked));
        assert_eq!(PostKind::parse("independent"), Some(PostKind::Independent));
        assert_eq!(PostKind::parse(" C "), Some(PostKind::Promotional));
        assert_eq!(PostKind::parse("D"), None);
    }

    #[test]
    fn test_post_kind_serde() {
        let json = serde_json::to_string(&PostKind::TrendLinked).unwrap();
        assert_eq!(json, "\"trend_linked\"");
        let kind: PostKind = serde_json::from_str("\"promotional\"").unwrap();
        assert_eq!(kind, PostKind::Promotional);
    }

    #[test]
    fn test_history_entry_tolerates_missing_fields() {
        let entry: HistoryEntry =
            serde_json::from_str(r#"{"timestamp": "2024-01-01 09:00:00", "text": "hi"}"#)
                .unwrap();
        assert_eq!(entry.source, EntrySource::App);
        assert!(entry.engagement.is_none());
        assert_eq!(entry.likes(), 0);
    }

    #[test]
    fn test_history_entry_engagement_null_serialized() {
        let entry = HistoryEntry {
            timestamp: "2024-01-01 09:00:00".to_string(),
            epoch: 1,
            platform: "x".to_string(),
            post_id: None,
            text: "hello".to_string(),
            char_count: 5,
            style: String::new(),
            trend: String::new(),
            smart_analysis: false,
            source: EntrySource::CsvImport,
            engagement: None,
            engagement_updated: None,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value["engagement"].is_null());
        assert!(value["post_id"].is_null());
        assert_eq!(value["source"], "csv_import");
        assert!(value.get("engagement_updated").is_none());
    }

    #[test]
    fn test_image_mime_type_from_path() {
        let path = std::path::Path::new("/tmp/photo.PNG");
        assert_eq!(ImageMimeType::from_path(path), Some(ImageMimeType::Png));
        assert_eq!(
            ImageMimeType::from_mime_str("image/jpg"),
            Some(ImageMimeType::Jpeg)
        );
        assert_eq!(ImageMimeType::from_extension("bmp"), None);
    }

    #[test]
    fn test_media_attachment_blank_alt_text() {
        let media = MediaAttachment::new("/tmp/a.webp").with_alt_text("  ");
        assert!(media.alt_text.is_none());
        assert_eq!(media.mime_type(), ImageMimeType::WebP);
    }
}
