//! Post history store
//!
//! An append-only JSON array of published posts, capped at
//! [`HISTORY_CAP`] entries with the oldest dropped first. Engagement numbers
//! are merged in later from analytics exports (see [`crate::engagement`]),
//! matched on the platform post id.
//!
//! The file is read and rewritten whole on every change without locking. A
//! scheduled post and an interactive post landing at the same instant can
//! race and lose one entry; at a few writes per hour this is accepted.

use chrono::{Local, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::generator::prompt::truncate_chars;
use crate::types::{DailyOverview, Engagement, EntrySource, HistoryEntry};

/// Maximum number of entries kept
pub const HISTORY_CAP: usize = 500;

/// Entries with impressions needed before a feedback digest is produced
pub const FEEDBACK_MIN_ENTRIES: usize = 5;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECONDS_PER_DAY: i64 = 86_400;

/// A post published by the application, before it is stamped and stored
#[derive(Debug, Clone, Default)]
pub struct PostRecord {
    /// Comma-joined names of the platforms that accepted the post
    pub platform: String,
    pub post_id: Option<String>,
    pub text: String,
    pub style: String,
    pub trend: String,
    pub smart_analysis: bool,
}

/// One row of a post-level analytics export
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRow {
    pub post_id: String,
    pub date: String,
    pub text: String,
    pub engagement: Engagement,
}

/// Counts reported by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first
    ///
    /// A missing or unreadable file yields an empty history.
    pub fn load(&self) -> Vec<HistoryEntry> {
        load_json_array(&self.path)
    }

    /// Entries newest first, as shown to the user
    pub fn newest_first(&self) -> Vec<HistoryEntry> {
        let mut entries = self.load();
        entries.reverse();
        entries
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        save_json(&self.path, &entries)
    }

    /// Append an entry, dropping the oldest ones beyond [`HISTORY_CAP`]
    pub fn append(&self, entry: HistoryEntry) -> Result<HistoryEntry> {
        let mut entries = self.load();
        entries.push(entry.clone());
        cap_oldest(&mut entries);
        self.save(&entries)?;
        Ok(entry)
    }

    /// Stamp and append a post published by the application
    pub fn record_post(&self, record: PostRecord) -> Result<HistoryEntry> {
        let now = Local::now();
        let entry = HistoryEntry {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            epoch: now.timestamp(),
            platform: record.platform,
            post_id: record.post_id,
            char_count: record.text.chars().count(),
            text: record.text,
            style: record.style,
            trend: record.trend,
            smart_analysis: record.smart_analysis,
            source: EntrySource::App,
            engagement: None,
            engagement_updated: None,
        };
        self.append(entry)
    }

    /// URLs mentioned in posts from the last `days` days
    pub fn recent_urls_mentioned(&self, days: i64) -> HashSet<String> {
        urls_mentioned_since(&self.load(), Utc::now().timestamp() - days * SECONDS_PER_DAY)
    }

    /// Prompt section summarising what performed, or empty without enough data
    pub fn feedback_digest(&self) -> String {
        feedback_digest(&self.load())
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        DashboardStats::build(&self.load(), &Local::now().format("%Y-%m-%d").to_string())
    }

    /// Merge post-level analytics rows
    ///
    /// Known post ids get their engagement replaced; unknown ids are appended
    /// as imported entries; rows without an id are skipped.
    pub fn merge_engagement(&self, rows: Vec<ContentRow>) -> Result<ImportCounts> {
        let mut entries = self.load();
        let now = Utc::now().timestamp();
        let mut counts = ImportCounts::default();

        for row in rows {
            if row.post_id.trim().is_empty() {
                counts.skipped += 1;
                continue;
            }

            let existing = entries
                .iter_mut()
                .find(|e| e.post_id.as_deref() == Some(row.post_id.as_str()));
            match existing {
                Some(entry) => {
                    entry.engagement = Some(row.engagement);
                    entry.engagement_updated = Some(now);
                    counts.updated += 1;
                }
                None => {
                    entries.push(HistoryEntry {
                        timestamp: row.date,
                        epoch: 0,
                        platform: "x".to_string(),
                        post_id: Some(row.post_id),
                        char_count: row.text.chars().count(),
                        text: row.text,
                        style: String::new(),
                        trend: String::new(),
                        smart_analysis: false,
                        source: EntrySource::CsvImport,
                        engagement: Some(row.engagement),
                        engagement_updated: Some(now),
                    });
                    counts.imported += 1;
                }
            }
        }

        cap_oldest(&mut entries);
        self.save(&entries)?;
        Ok(counts)
    }
}

fn cap_oldest(entries: &mut Vec<HistoryEntry>) {
    if entries.len() > HISTORY_CAP {
        let excess = entries.len() - HISTORY_CAP;
        entries.drain(..excess);
    }
}

/// URLs found in entries published at or after `cutoff`
pub fn urls_mentioned_since(entries: &[HistoryEntry], cutoff: i64) -> HashSet<String> {
    const WRAPPERS: &[char] = &['(', ')', '[', ']', '\u{300c}', '\u{300d}', '<', '>', '"'];
    entries
        .iter()
        .filter(|e| e.epoch >= cutoff)
        .flat_map(|e| e.text.split_whitespace())
        .filter(|word| word.contains("://") || word.contains("note.com/"))
        .map(|word| word.trim_matches(WRAPPERS).to_string())
        .collect()
}

fn digest_line(entry: &HistoryEntry) -> String {
    format!(
        "  - likes {} imp {} ({} chars): {}",
        entry.likes(),
        entry.impressions(),
        entry.char_count,
        truncate_chars(&entry.text, 50)
    )
}

/// Feedback text for the post prompt
///
/// Needs [`FEEDBACK_MIN_ENTRIES`] entries with impressions. Lists the top
/// three by likes, up to two of the bottom three that got no likes, and the
/// average length of the top posts.
pub fn feedback_digest(entries: &[HistoryEntry]) -> String {
    let mut measured: Vec<&HistoryEntry> =
        entries.iter().filter(|e| e.impressions() > 0).collect();
    if measured.len() < FEEDBACK_MIN_ENTRIES {
        return String::new();
    }

    // stable sort keeps history order among ties
    measured.sort_by(|a, b| b.likes().cmp(&a.likes()));
    let top = &measured[..3];
    let low: Vec<&HistoryEntry> = measured[measured.len() - 3..]
        .iter()
        .copied()
        .filter(|e| e.likes() == 0)
        .take(2)
        .collect();

    let lengths: Vec<usize> = top
        .iter()
        .map(|e| e.char_count)
        .filter(|&c| c > 0)
        .collect();
    let avg_len = if lengths.is_empty() {
        0
    } else {
        lengths.iter().sum::<usize>() / lengths.len()
    };

    let mut parts = vec![
        "## What past posts tell us (use as reference)".to_string(),
        "### Posts that performed:".to_string(),
    ];
    parts.extend(top.iter().map(|e| digest_line(e)));
    if !low.is_empty() {
        parts.push("### Posts that fell flat:".to_string());
        parts.extend(low.iter().map(|e| digest_line(e)));
    }
    if avg_len > 0 {
        parts.push(format!(
            "### Numbers: the best posts averaged {} characters",
            avg_len
        ));
    }
    parts.join("\n")
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Totals and averages over the history and daily overview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub total_posts: usize,
    pub with_engagement: usize,
    pub avg_likes: f64,
    pub avg_retweets: f64,
    pub avg_impressions: f64,
    pub best_likes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_overview: Option<OverviewSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewSummary {
    pub days: usize,
    pub total_impressions: u64,
    pub avg_daily_impressions: u64,
    pub total_new_follows: u64,
    pub total_unfollows: u64,
    pub net_follow_change: i64,
    pub best_day: String,
    pub best_day_impressions: u64,
}

impl HistorySummary {
    pub fn build(entries: &[HistoryEntry], overview: &[DailyOverview]) -> Self {
        let engaged: Vec<&Engagement> = entries.iter().filter_map(|e| e.engagement.as_ref()).collect();
        let count = engaged.len();
        let average = |total: u64| {
            if count == 0 {
                0.0
            } else {
                round1(total as f64 / count as f64)
            }
        };

        Self {
            total_posts: entries.len(),
            with_engagement: count,
            avg_likes: average(engaged.iter().map(|e| e.likes).sum()),
            avg_retweets: average(engaged.iter().map(|e| e.retweets).sum()),
            avg_impressions: average(engaged.iter().map(|e| e.impressions).sum()),
            best_likes: engaged.iter().map(|e| e.likes).max().unwrap_or(0),
            daily_overview: OverviewSummary::build(overview),
        }
    }
}

impl OverviewSummary {
    pub fn build(overview: &[DailyOverview]) -> Option<Self> {
        // first maximum wins, matching the newest-first file order
        let best = overview
            .iter()
            .fold(None::<&DailyOverview>, |best, day| match best {
                Some(b) if b.impressions >= day.impressions => Some(b),
                _ => Some(day),
            })?;
        let days = overview.len();
        let total_impressions: u64 = overview.iter().map(|d| d.impressions).sum();
        let total_new_follows: u64 = overview.iter().map(|d| d.new_follows).sum();
        let total_unfollows: u64 = overview.iter().map(|d| d.unfollows).sum();

        Some(Self {
            days,
            total_impressions,
            avg_daily_impressions: (total_impressions as f64 / days as f64).round() as u64,
            total_new_follows,
            total_unfollows,
            net_follow_change: total_new_follows as i64 - total_unfollows as i64,
            best_day: best.date.clone(),
            best_day_impressions: best.impressions,
        })
    }
}

/// Today's activity for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub today_count: usize,
    pub recent_posts: Vec<RecentPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPost {
    pub text: String,
    pub timestamp: String,
    pub platform: String,
    pub style: String,
}

impl DashboardStats {
    /// Stats over the application's own posts; `today` is `%Y-%m-%d`
    pub fn build(entries: &[HistoryEntry], today: &str) -> Self {
        let app_posts: Vec<&HistoryEntry> = entries
            .iter()
            .filter(|e| e.source == EntrySource::App)
            .collect();
        let today_count = app_posts
            .iter()
            .filter(|e| e.timestamp.starts_with(today))
            .count();
        let recent_posts = app_posts
            .iter()
            .rev()
            .take(10)
            .map(|e| RecentPost {
                text: truncate_chars(&e.text, 80),
                timestamp: e.timestamp.clone(),
                platform: e.platform.clone(),
                style: e.style.clone(),
            })
            .collect();
        Self {
            today_count,
            recent_posts,
        }
    }
}

/// Read a JSON array document, treating a missing or corrupt file as empty
pub(crate) fn load_json_array<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Ignoring unreadable {}: {}", path.display(), e);
        Vec::new()
    })
}

/// Write a value as pretty JSON, creating the parent directory
pub(crate) fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(StoreError::Encode)?;
    std::fs::write(path, json).map_err(StoreError::Io)?;
    Ok(())
}
