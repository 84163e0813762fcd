//! Analytics CSV import
//!
//! X analytics exports come in two layouts: a post-level "content" export
//! keyed by post id, and an account-level "overview" export with one row per
//! day. Both exist in English and Japanese, and older Japanese exports are
//! Shift_JIS encoded. The layout is recognised from the header row; a file
//! matching neither is rejected.

use chrono::{Local, NaiveDate, Utc};
use encoding_rs::{Encoding, SHIFT_JIS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::history::{load_json_array, save_json, ContentRow, HistoryStore, ImportCounts};
use crate::types::{DailyOverview, Engagement};

/// Maximum number of days kept in the overview store
pub const OVERVIEW_CAP: usize = 365;

const POST_ID: &[&str] = &["ポストID", "Post id", "Tweet id"];
const DATE: &[&str] = &["日付", "Date", "time"];
const POST_TEXT: &[&str] = &["ポスト本文", "Post text", "Tweet text"];
const IMPRESSIONS: &[&str] = &["インプレッション数", "Impressions"];
const LIKES: &[&str] = &["いいね", "Likes"];
const ENGAGEMENTS: &[&str] = &["エンゲージメント", "Engagements"];
const BOOKMARKS: &[&str] = &["ブックマーク", "Bookmarks"];
const SHARES: &[&str] = &["共有された回数", "Shares"];
const NEW_FOLLOWS: &[&str] = &["新しいフォロー", "New follows"];
const UNFOLLOWS: &[&str] = &["フォロー解除", "Unfollows"];
const REPLIES: &[&str] = &["返信", "Replies"];
const REPOSTS: &[&str] = &["リポスト", "Reposts", "Retweets"];
const PROFILE_VISITS: &[&str] = &["プロフィールへのアクセス数", "Profile visits"];
const DETAIL_EXPANDS: &[&str] = &["詳細のクリック数", "Detail expands"];
const URL_CLICKS: &[&str] = &["URLのクリック数", "URL clicks"];
const POSTS_CREATED: &[&str] = &["ポストを作成", "Create Post"];
const VIDEO_VIEWS: &[&str] = &["動画再生数", "Video views"];
const MEDIA_VIEWS: &[&str] = &["メディアの再生数", "Media views"];

const OVERVIEW_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y年%m月%d日",
    "%a, %b %d, %Y",
    "%b %d, %Y",
    "%m/%d/%Y",
];

/// Layout of an analytics export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvKind {
    /// One row per post
    Content,
    /// One row per day
    Overview,
}

impl CsvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Overview => "overview",
        }
    }
}

impl std::fmt::Display for CsvKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of importing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    #[serde(rename = "type")]
    pub kind: CsvKind,
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ImportSummary {
    fn new(kind: CsvKind, counts: ImportCounts) -> Self {
        Self {
            kind,
            imported: counts.imported,
            updated: counts.updated,
            skipped: counts.skipped,
        }
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').to_lowercase()
}

fn has_column(headers: &[String], aliases: &[&str]) -> bool {
    aliases
        .iter()
        .any(|alias| headers.iter().any(|h| *h == normalize_header(alias)))
}

/// Recognise the export layout from its (normalized) header row
pub fn detect_kind(headers: &[String]) -> Option<CsvKind> {
    if has_column(headers, POST_ID) {
        Some(CsvKind::Content)
    } else if has_column(headers, DATE) && has_column(headers, IMPRESSIONS) {
        Some(CsvKind::Overview)
    } else {
        None
    }
}

/// Decode raw export bytes
///
/// A byte-order mark decides the encoding; otherwise valid UTF-8 is taken
/// as is and anything else is read as Shift_JIS.
pub fn decode(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("CSV is not UTF-8, decoding as Shift_JIS");
            let (text, _, _) = SHIFT_JIS.decode(bytes);
            text.into_owned()
        }
    }
}

/// Lenient integer: thousands separators and whitespace are ignored, junk is 0
pub fn parse_count(value: &str) -> u64 {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse().unwrap_or(0)
}

struct CsvRow(HashMap<String, String>);

impl CsvRow {
    fn text(&self, aliases: &[&str]) -> &str {
        aliases
            .iter()
            .find_map(|alias| self.0.get(&normalize_header(alias)))
            .map(|v| v.trim())
            .unwrap_or("")
    }

    fn count(&self, aliases: &[&str]) -> u64 {
        parse_count(self.text(aliases))
    }

    /// Post text keeps its inner whitespace
    fn raw(&self, aliases: &[&str]) -> String {
        aliases
            .iter()
            .find_map(|alias| self.0.get(&normalize_header(alias)))
            .cloned()
            .unwrap_or_default()
    }

    fn engagement(&self) -> Engagement {
        Engagement {
            impressions: self.count(IMPRESSIONS),
            likes: self.count(LIKES),
            engagement: self.count(ENGAGEMENTS),
            bookmarks: self.count(BOOKMARKS),
            shares: self.count(SHARES),
            follows: self.count(NEW_FOLLOWS),
            replies: self.count(REPLIES),
            retweets: self.count(REPOSTS),
            profile_clicks: self.count(PROFILE_VISITS),
            detail_clicks: self.count(DETAIL_EXPANDS),
            url_clicks: self.count(URL_CLICKS),
        }
    }

    fn content(&self) -> ContentRow {
        ContentRow {
            post_id: self.text(POST_ID).to_string(),
            date: self.text(DATE).to_string(),
            text: self.raw(POST_TEXT),
            engagement: self.engagement(),
        }
    }

    fn overview(&self, imported_at: i64) -> DailyOverview {
        DailyOverview {
            date: normalize_date(self.text(DATE)),
            impressions: self.count(IMPRESSIONS),
            likes: self.count(LIKES),
            engagement: self.count(ENGAGEMENTS),
            bookmarks: self.count(BOOKMARKS),
            shares: self.count(SHARES),
            new_follows: self.count(NEW_FOLLOWS),
            unfollows: self.count(UNFOLLOWS),
            replies: self.count(REPLIES),
            retweets: self.count(REPOSTS),
            profile_visits: self.count(PROFILE_VISITS),
            posts_created: self.count(POSTS_CREATED),
            video_views: self.count(VIDEO_VIEWS),
            media_views: self.count(MEDIA_VIEWS),
            imported_at,
        }
    }
}

/// Overview dates are stored as `%Y-%m-%d` so they sort; unknown formats are kept
fn normalize_date(value: &str) -> String {
    OVERVIEW_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| value.to_string())
}

fn read_rows(text: &str) -> std::result::Result<(Vec<String>, Vec<CsvRow>), ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(CsvRow(row));
    }
    Ok((headers, rows))
}

/// Daily account counters, newest first, one row per date
#[derive(Debug, Clone)]
pub struct OverviewStore {
    path: PathBuf,
}

impl OverviewStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored days, newest first
    pub fn load(&self) -> Vec<DailyOverview> {
        load_json_array(&self.path)
    }

    /// Merge days into the store; a date already present is overwritten
    pub fn merge(&self, rows: Vec<DailyOverview>) -> Result<ImportCounts> {
        let mut days = self.load();
        let mut counts = ImportCounts::default();

        for row in rows {
            if row.date.is_empty() {
                counts.skipped += 1;
                continue;
            }
            match days.iter_mut().find(|d| d.date == row.date) {
                Some(existing) => {
                    *existing = row;
                    counts.updated += 1;
                }
                None => {
                    days.push(row);
                    counts.imported += 1;
                }
            }
        }

        days.sort_by(|a, b| b.date.cmp(&a.date));
        days.truncate(OVERVIEW_CAP);
        save_json(&self.path, &days)?;
        Ok(counts)
    }
}

/// Imports analytics exports into the history and overview stores
#[derive(Debug, Clone)]
pub struct EngagementImporter {
    history: HistoryStore,
    overview: OverviewStore,
}

impl EngagementImporter {
    pub fn new(history: HistoryStore, overview: OverviewStore) -> Self {
        Self { history, overview }
    }

    pub fn import_file(&self, path: &Path) -> Result<ImportSummary> {
        let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.import_bytes(&path.display().to_string(), &bytes)
    }

    /// Import the newest CSV in `inbox`
    pub fn import_latest(&self, inbox: &Path) -> Result<ImportSummary> {
        let path = find_latest_csv(inbox)?;
        info!("Importing newest CSV: {}", path.display());
        self.import_file(&path)
    }

    /// Import an export already in memory; `name` is only used in messages
    pub fn import_bytes(&self, name: &str, bytes: &[u8]) -> Result<ImportSummary> {
        let text = decode(bytes);
        let (headers, rows) = read_rows(&text)?;
        let kind = detect_kind(&headers)
            .ok_or_else(|| ImportError::UnrecognizedHeaders(headers.join(", ")))?;
        if rows.is_empty() {
            return Err(ImportError::Empty(name.to_string()).into());
        }

        let counts = match kind {
            CsvKind::Content => self
                .history
                .merge_engagement(rows.iter().map(CsvRow::content).collect())?,
            CsvKind::Overview => {
                let now = Utc::now().timestamp();
                self.overview
                    .merge(rows.iter().map(|r| r.overview(now)).collect())?
            }
        };

        let summary = ImportSummary::new(kind, counts);
        info!(
            "Imported {} CSV {}: {} new, {} updated, {} skipped",
            kind, name, summary.imported, summary.updated, summary.skipped
        );
        Ok(summary)
    }
}

/// Newest `*.csv` in `dir` by modification time
///
/// Post-level exports win over overview exports when both are present.
pub fn find_latest_csv(dir: &Path) -> Result<PathBuf> {
    let no_file = || ImportError::NoFile(dir.display().to_string());
    let entries = std::fs::read_dir(dir).map_err(|_| no_file())?;

    let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));

    let is_overview = |path: &Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_lowercase().contains("overview"))
    };
    files
        .iter()
        .find(|(_, path)| !is_overview(path))
        .or_else(|| files.first())
        .map(|(_, path)| path.clone())
        .ok_or_else(|| no_file().into())
}

/// Last engagement analysis produced by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub analysis: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisCache {
    path: PathBuf,
}

impl AnalysisCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Option<CachedAnalysis> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, analysis: &str) -> Result<CachedAnalysis> {
        let cached = CachedAnalysis {
            analysis: analysis.to_string(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        save_json(&self.path, &cached)?;
        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutopostError;
    use crate::history::PostRecord;
    use crate::types::EntrySource;
    use tempfile::TempDir;

    const CONTENT_EN: &str = "Post id,Date,Post text,Impressions,Likes,Engagements,Bookmarks,Shares,New follows,Replies,Reposts,Profile visits,Detail expands,URL clicks\n\
        111,\"Sat, Mar 01, 2025\",First post,\"1,234\",12,30,1,0,2,3,4,5,6,7\n\
        222,\"Sun, Mar 02, 2025\",Second post,50,0,1,0,0,0,0,0,0,0,0\n\
        ,\"Sun, Mar 02, 2025\",No id,1,1,1,0,0,0,0,0,0,0,0\n";

    const OVERVIEW_JA: &str = "Date,インプレッション数,いいね,エンゲージメント,ブックマーク,共有された回数,新しいフォロー,フォロー解除,返信,リポスト,プロフィールへのアクセス数,ポストを作成,動画再生数,メディアの再生数\n\
        2025-03-01,1000,10,20,1,0,3,1,2,0,4,2,0,0\n\
        2025-03-02,2000,20,40,2,0,1,0,2,0,4,1,0,0\n";

    fn importer(dir: &TempDir) -> (EngagementImporter, HistoryStore, OverviewStore) {
        let history = HistoryStore::new(dir.path().join("post_history.json"));
        let overview = OverviewStore::new(dir.path().join("daily_overview.json"));
        (
            EngagementImporter::new(history.clone(), overview.clone()),
            history,
            overview,
        )
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| normalize_header(h)).collect()
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(
            detect_kind(&headers(&["ポストID", "日付", "インプレッション数"])),
            Some(CsvKind::Content)
        );
        assert_eq!(
            detect_kind(&headers(&["Post id", "Date"])),
            Some(CsvKind::Content)
        );
        assert_eq!(
            detect_kind(&headers(&["Date", "インプレッション数"])),
            Some(CsvKind::Overview)
        );
        assert_eq!(
            detect_kind(&headers(&["Date", "Impressions", "Likes"])),
            Some(CsvKind::Overview)
        );
        assert_eq!(detect_kind(&headers(&["name", "email"])), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234"), 1234);
        assert_eq!(parse_count(" 42 "), 42);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("n/a"), 0);
    }

    #[test]
    fn test_decode_variants() {
        let text = "ポストID,日付\n";
        assert_eq!(decode(text.as_bytes()), text);

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice(text.as_bytes());
        assert_eq!(decode(&with_bom), text);

        let (sjis, _, _) = SHIFT_JIS.encode(text);
        assert_eq!(decode(&sjis), text);
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2025-03-01"), "2025-03-01");
        assert_eq!(normalize_date("2025/03/01"), "2025-03-01");
        assert_eq!(normalize_date("Sat, Mar 01, 2025"), "2025-03-01");
        assert_eq!(normalize_date("someday"), "someday");
    }

    #[test]
    fn test_import_content_csv() {
        let dir = TempDir::new().unwrap();
        let (importer, history, _) = importer(&dir);
        history
            .record_post(PostRecord {
                platform: "x".to_string(),
                post_id: Some("111".to_string()),
                text: "First post".to_string(),
                ..Default::default()
            })
            .unwrap();

        let summary = importer
            .import_bytes("content.csv", CONTENT_EN.as_bytes())
            .unwrap();
        assert_eq!(summary.kind, CsvKind::Content);
        assert_eq!((summary.imported, summary.updated, summary.skipped), (1, 1, 1));

        let entries = history.load();
        assert_eq!(entries.len(), 2);
        let first = entries[0].engagement.as_ref().unwrap();
        assert_eq!(first.impressions, 1234);
        assert_eq!(first.likes, 12);
        assert_eq!(first.url_clicks, 7);
        assert_eq!(entries[0].source, EntrySource::App);
        assert_eq!(entries[1].source, EntrySource::CsvImport);
        assert_eq!(entries[1].text, "Second post");
    }

    #[test]
    fn test_import_overview_shift_jis() {
        let dir = TempDir::new().unwrap();
        let (importer, _, overview) = importer(&dir);
        let (bytes, _, _) = SHIFT_JIS.encode(OVERVIEW_JA);

        let summary = importer.import_bytes("overview.csv", &bytes).unwrap();
        assert_eq!(summary.kind, CsvKind::Overview);
        assert_eq!(summary.imported, 2);

        let days = overview.load();
        assert_eq!(days[0].date, "2025-03-02");
        assert_eq!(days[0].impressions, 2000);
        assert_eq!(days[1].unfollows, 1);
        assert_eq!(days[1].posts_created, 2);
        assert!(days[0].imported_at > 0);
    }

    #[test]
    fn test_overview_reimport_overwrites_date() {
        let dir = TempDir::new().unwrap();
        let (importer, _, overview) = importer(&dir);
        importer
            .import_bytes("overview.csv", OVERVIEW_JA.as_bytes())
            .unwrap();

        let csv = "Date,Impressions\n2025-03-02,9999\n";
        let summary = importer.import_bytes("again.csv", csv.as_bytes()).unwrap();
        assert_eq!((summary.imported, summary.updated), (0, 1));

        let days = overview.load();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].impressions, 9999);
        assert_eq!(days[0].likes, 0);
    }

    #[test]
    fn test_overview_cap_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = OverviewStore::new(dir.path().join("daily_overview.json"));
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows: Vec<DailyOverview> = (0..(OVERVIEW_CAP as i64 + 5))
            .map(|i| DailyOverview {
                date: (start + chrono::Duration::days(i))
                    .format("%Y-%m-%d")
                    .to_string(),
                ..Default::default()
            })
            .collect();
        store.merge(rows).unwrap();

        let days = store.load();
        assert_eq!(days.len(), OVERVIEW_CAP);
        assert_eq!(days.last().unwrap().date, "2024-01-06");
    }

    #[test]
    fn test_unrecognized_headers_rejected() {
        let dir = TempDir::new().unwrap();
        let (importer, history, _) = importer(&dir);
        let err = importer
            .import_bytes("x.csv", b"name,email\nbob,b@example.com\n")
            .unwrap_err();
        assert!(matches!(
            err,
            AutopostError::Import(ImportError::UnrecognizedHeaders(_))
        ));
        assert_eq!(err.exit_code(), 3);
        assert!(history.load().is_empty());
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let (importer, _, _) = importer(&dir);
        let err = importer
            .import_bytes("empty.csv", b"Post id,Date\n")
            .unwrap_err();
        assert!(matches!(err, AutopostError::Import(ImportError::Empty(_))));
    }

    #[test]
    fn test_find_latest_csv_prefers_content() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("account_content.csv");
        let overview = dir.path().join("account_overview.csv");
        std::fs::write(&content, "a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "b").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&overview, "c").unwrap();

        assert_eq!(find_latest_csv(dir.path()).unwrap(), content);

        std::fs::remove_file(&content).unwrap();
        assert_eq!(find_latest_csv(dir.path()).unwrap(), overview);
    }

    #[test]
    fn test_find_latest_csv_empty_inbox() {
        let dir = TempDir::new().unwrap();
        assert!(find_latest_csv(dir.path()).is_err());
        assert!(find_latest_csv(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_analysis_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = AnalysisCache::new(dir.path().join("analysis_cache.json"));
        assert!(cache.load().is_none());
        let saved = cache.save("1. Post in the morning").unwrap();
        assert_eq!(cache.load(), Some(saved));
    }
}
