//! Integration tests for AutopostService
//!
//! Drives the service the way the control surface and the scheduler do:
//! configuration in a temporary data directory, mock platforms and a scripted
//! text model.

use libautopost::config::DataPaths;
use libautopost::error::Result;
use libautopost::llm::mock::MockTextModel;
use libautopost::platforms::mock::MockPlatform;
use libautopost::platforms::Platform;
use libautopost::publisher::PlatformFactory;
use libautopost::retry::RetryPolicy;
use libautopost::scheduler::{ActivityLog, CycleRunner, LogLevel};
use libautopost::service::cycle::ScheduledCycle;
use libautopost::service::{AutopostService, FixedModelFactory, PublishOptions};
use libautopost::types::EntrySource;
use libautopost::{AutopostError, Config, CsvKind};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

struct Platforms(Vec<MockPlatform>);

impl PlatformFactory for Platforms {
    fn create(&self, name: &str, _config: &Config) -> Result<Box<dyn Platform>> {
        self.0
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .map(|p| Box::new(p) as Box<dyn Platform>)
            .ok_or_else(|| AutopostError::InvalidInput(format!("Unknown platform: {}", name)))
    }
}

fn setup(model: MockTextModel, platforms: Vec<MockPlatform>) -> (Arc<AutopostService>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let service = AutopostService::new(DataPaths::new(temp_dir.path()))
        .unwrap()
        .with_model_factory(Arc::new(FixedModelFactory(Arc::new(model))))
        .with_platform_factory(Arc::new(Platforms(platforms)))
        .with_retry_policy(RetryPolicy::none());
    (Arc::new(service), temp_dir)
}

fn promotion_only(service: &AutopostService) {
    service
        .update_section(
            "post_type",
            json!({"type_a_ratio": 0, "type_b_ratio": 0, "type_c_ratio": 1}),
        )
        .unwrap();
    service
        .update_section(
            "note_promotion",
            json!({"articles": [{
                "url": "https://note.com/me/n/n123",
                "title": "Slow mornings",
                "summary": "Notes on routines"
            }]}),
        )
        .unwrap();
    service
        .update_section(
            "schedule",
            json!({"post_to_x": true, "post_to_threads": true}),
        )
        .unwrap();
}

#[tokio::test]
async fn test_scheduled_promotion_publishes_and_records() {
    let x = MockPlatform::with_post_id("x", "1001");
    let threads = MockPlatform::success("threads");
    let (service, _temp_dir) = setup(
        MockTextModel::replying("A quiet piece about mornings."),
        vec![x.clone(), threads.clone()],
    );
    promotion_only(&service);

    let log = ActivityLog::default();
    ScheduledCycle::new(service.clone())
        .run_cycle(&log)
        .await
        .unwrap();

    let posted = x.posted_content();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].ends_with("https://note.com/me/n/n123"));
    assert_eq!(threads.post_call_count(), 1);

    let history = service.history().load();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].platform, "x,threads");
    assert_eq!(history[0].post_id.as_deref(), Some("1001"));
    assert_eq!(history[0].source, EntrySource::App);

    let lines = log.recent(10);
    assert!(lines[0].message.starts_with("Post type:"));
    assert!(lines.iter().any(|l| l.level == LogLevel::Success));
}

#[tokio::test]
async fn test_recently_promoted_article_is_skipped() {
    let x = MockPlatform::success("x");
    let (service, _temp_dir) = setup(
        MockTextModel::replying("Worth a read."),
        vec![x.clone(), MockPlatform::success("threads")],
    );
    promotion_only(&service);

    let log = ActivityLog::default();
    let cycle = ScheduledCycle::new(service.clone());
    cycle.run_cycle(&log).await.unwrap();
    cycle.run_cycle(&log).await.unwrap();

    assert_eq!(x.post_call_count(), 1);
    let last = log.recent(1).pop().unwrap();
    assert_eq!(last.level, LogLevel::Skip);
    assert!(last.message.contains("3 days"));
}

#[tokio::test]
async fn test_cycle_without_enabled_platforms_publishes_nothing() {
    let x = MockPlatform::success("x");
    let (service, _temp_dir) = setup(MockTextModel::replying("Hello."), vec![x.clone()]);
    promotion_only(&service);
    service
        .update_section(
            "schedule",
            json!({"post_to_x": false, "post_to_threads": false}),
        )
        .unwrap();

    let log = ActivityLog::default();
    ScheduledCycle::new(service.clone())
        .run_cycle(&log)
        .await
        .unwrap();

    assert_eq!(x.post_call_count(), 0);
    assert!(service.history().load().is_empty());
}

#[tokio::test]
async fn test_imported_engagement_joins_published_post() {
    let (service, temp_dir) = setup(
        MockTextModel::replying("unused"),
        vec![MockPlatform::with_post_id("x", "1800000000000000001")],
    );
    service
        .publish(PublishOptions::text("Morning light", vec!["x".to_string()]))
        .await
        .unwrap();

    let csv = "Post id,Date,Post text,Impressions,Likes,Replies,Reposts\n\
               1800000000000000001,2026-10-01,Morning light,1200,34,2,5\n\
               1800000000000000002,2026-09-30,Older post,300,4,0,1\n";
    let inbox = temp_dir.path().join("inbox");
    std::fs::write(inbox.join("account_analytics_content.csv"), csv).unwrap();

    let summary = service.importer().import_latest(&inbox).unwrap();
    assert_eq!(summary.kind, CsvKind::Content);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.imported, 1);

    let history = service.history().newest_first();
    let published = history
        .iter()
        .find(|e| e.post_id.as_deref() == Some("1800000000000000001"))
        .unwrap();
    assert_eq!(published.likes(), 34);
    assert_eq!(published.source, EntrySource::App);

    let summary = service.summary();
    assert_eq!(summary.total_posts, 2);
}
