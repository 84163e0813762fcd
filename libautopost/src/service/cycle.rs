//! The scheduled posting cycle
//!
//! One cycle picks a post kind by the configured ratios, builds the request
//! for it, generates the text and publishes it to every platform enabled in
//! the schedule. Progress goes to the activity log.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::generator::prompt::truncate_chars;
use crate::generator::{selection, PostRequest};
use crate::history::HistoryStore;
use crate::scheduler::{ActivityLog, CycleRunner};
use crate::service::{AutopostService, PublishOptions};
use crate::types::{NoteArticle, PostKind};

/// Days an article stays ineligible after being promoted
pub const PROMOTION_COOLDOWN_DAYS: i64 = 3;

/// Platforms the schedule publishes to, in publish order
pub fn scheduled_targets(config: &Config) -> Vec<String> {
    let mut targets = Vec::new();
    if config.schedule.post_to_x {
        targets.push("x".to_string());
    }
    if config.schedule.post_to_threads {
        targets.push("threads".to_string());
    }
    targets
}

/// Articles not linked from any post in the cooldown window
pub fn promotion_candidates(articles: &[NoteArticle], history: &HistoryStore) -> Vec<NoteArticle> {
    let recent = history.recent_urls_mentioned(PROMOTION_COOLDOWN_DAYS);
    articles
        .iter()
        .filter(|a| !recent.contains(&a.url))
        .cloned()
        .collect()
}

pub struct ScheduledCycle {
    service: Arc<AutopostService>,
}

impl ScheduledCycle {
    pub fn new(service: Arc<AutopostService>) -> Self {
        Self { service }
    }

    /// Request for this cycle, or `None` when the cycle should be skipped
    async fn build_request(
        &self,
        config: &Config,
        kind: PostKind,
        log: &ActivityLog,
    ) -> Result<Option<PostRequest>> {
        let styles = &config.prompt_settings.writing_styles;
        let feedback = self.service.history().feedback_digest();

        let request = match kind {
            PostKind::Promotional => {
                let articles = &config.note_promotion.articles;
                if articles.is_empty() {
                    log.skip("No note articles registered, skipping");
                    return Ok(None);
                }
                let candidates = promotion_candidates(articles, self.service.history());
                let mut rng = rand::thread_rng();
                let Some(article) = candidates.choose(&mut rng).cloned() else {
                    log.skip(format!(
                        "Every article was promoted in the last {} days, skipping",
                        PROMOTION_COOLDOWN_DAYS
                    ));
                    return Ok(None);
                };
                let style = selection::select_promotion_style(
                    &config.note_promotion.promotion_styles,
                    &mut rng,
                );
                PostRequest::Promotional { article, style }
            }
            PostKind::TrendLinked => {
                let style = selection::select_style_for_kind(
                    kind,
                    styles,
                    &config.post_type,
                    &mut rand::thread_rng(),
                );
                let trends = self.service.trends().await?;
                if trends.is_empty() {
                    log.warning("No trends available, writing without one");
                }
                PostRequest::TrendLinked {
                    trends,
                    style,
                    smart_analysis: false,
                    feedback,
                }
            }
            PostKind::Independent => PostRequest::Independent {
                style: selection::select_style_for_kind(
                    kind,
                    styles,
                    &config.post_type,
                    &mut rand::thread_rng(),
                ),
                smart_analysis: false,
                feedback,
            },
        };
        Ok(Some(request))
    }
}

#[async_trait]
impl CycleRunner for ScheduledCycle {
    async fn run_cycle(&self, log: &ActivityLog) -> Result<()> {
        let config = self.service.config()?;
        let kind = selection::select_post_kind(&config.post_type, &mut rand::thread_rng());
        log.info(format!("Post type: {}", kind.label()));

        let Some(request) = self.build_request(&config, kind, log).await? else {
            return Ok(());
        };

        let post = self.service.generate_post(&config, request).await?;
        log.success(format!("Generated: {}...", truncate_chars(&post.text, 40)));

        let targets = scheduled_targets(&config);
        if targets.is_empty() {
            log.skip("No platform enabled in the schedule, nothing published");
            return Ok(());
        }

        // per-platform outcomes are logged by the service
        self.service
            .publish(PublishOptions::from_generated(&post, targets))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataPaths, ScheduleConfig};
    use crate::history::PostRecord;

    fn article(url: &str) -> NoteArticle {
        NoteArticle {
            url: url.to_string(),
            title: "Title".to_string(),
            summary: String::new(),
        }
    }

    #[test]
    fn test_scheduled_targets() {
        let mut config = Config::default();
        config.schedule = ScheduleConfig {
            post_to_x: true,
            post_to_threads: true,
            ..Default::default()
        };
        assert_eq!(scheduled_targets(&config), vec!["x", "threads"]);
        config.schedule.post_to_x = false;
        assert_eq!(scheduled_targets(&config), vec!["threads"]);
    }

    #[test]
    fn test_recently_promoted_articles_excluded() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        let history = HistoryStore::new(paths.history_file());
        history
            .record_post(PostRecord {
                platform: "x".to_string(),
                text: "New article: https://note.com/me/n/aaa".to_string(),
                ..Default::default()
            })
            .unwrap();

        let articles = vec![
            article("https://note.com/me/n/aaa"),
            article("https://note.com/me/n/bbb"),
        ];
        let candidates = promotion_candidates(&articles, &history);
        assert_eq!(candidates, vec![article("https://note.com/me/n/bbb")]);
    }

    #[test]
    fn test_article_is_eligible_again_after_cooldown() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        let history = HistoryStore::new(paths.history_file());
        for url in ["https://note.com/me/n/aaa", "https://note.com/me/n/bbb"] {
            history
                .record_post(PostRecord {
                    platform: "x".to_string(),
                    text: format!("Wrote this up: {}", url),
                    ..Default::default()
                })
                .unwrap();
        }

        let day = 86_400;
        let mut entries = history.load();
        // aaa just past the window, bbb just inside it
        entries[0].epoch -= PROMOTION_COOLDOWN_DAYS * day + 3_600;
        entries[1].epoch -= PROMOTION_COOLDOWN_DAYS * day - 3_600;
        crate::history::save_json(history.path(), &entries).unwrap();

        let articles = vec![
            article("https://note.com/me/n/aaa"),
            article("https://note.com/me/n/bbb"),
        ];
        let candidates = promotion_candidates(&articles, &history);
        assert_eq!(candidates, vec![article("https://note.com/me/n/aaa")]);
    }
}
