use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use ember_app::clock::{Clock, ManualClock};
use ember_app::context::EngineContext;
use ember_core::incident::IncidentStatus;
use ember_core::rule::RuleDraft;
use ember_core::severity::Severity;
use ember_ports::types::{IncidentFilter, RuleFilter};
use ember_server::bootstrap::{build_context_with_clock, load_rules};
use ember_server::config::ServerConfig;
use ember_server::feed::{self, FeedStats};

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .unwrap()
        .with_timezone(&Utc)
}

fn config(toml: &str) -> ServerConfig {
    ServerConfig::parse(toml).unwrap()
}

fn failed_job_rule() -> RuleDraft {
    serde_json::from_value(json!({
        "name": "Failed jobs",
        "source": "jobs",
        "event_type": "job.finished",
        "severity": "warning",
        "message_template": "{{job}} exited with {{exit_code}}",
        "conditions": [{"field": "exit_code", "operator": "ne", "value": 0}],
        "escalation": {"enabled": true, "after_minutes": 15, "to_severity": "critical"}
    }))
    .unwrap()
}

async fn memory_context(clock: Arc<ManualClock>) -> EngineContext {
    let config = config(
        r#"
        database_url = "memory"

        [batching]
        min_alerts_for_incident = 2
        "#,
    );
    build_context_with_clock(&config, clock).await.unwrap()
}

async fn feed_lines(ctx: &EngineContext, lines: &[String]) -> FeedStats {
    let input = lines.join("\n");
    feed::run(ctx, input.as_bytes(), std::future::pending())
        .await
        .unwrap()
}

fn job_line(exit_code: i64, at: &str) -> String {
    json!({
        "kind": "event",
        "source": "jobs",
        "type": "job.finished",
        "payload": {"job": "backup", "exit_code": exit_code},
        "timestamp": at,
    })
    .to_string()
}

#[tokio::test]
async fn failing_jobs_batch_escalate_and_resolve() {
    let clock = Arc::new(ManualClock::new(ts("2025-01-15T10:00:00Z")));
    let ctx = memory_context(Arc::clone(&clock)).await;
    assert_eq!(ctx.seed_rules(vec![failed_job_rule()]).await.unwrap(), 1);

    let stats = feed_lines(
        &ctx,
        &[
            job_line(1, "2025-01-15T10:00:00Z"),
            job_line(0, "2025-01-15T10:00:01Z"),
            "{not json".to_string(),
            job_line(3, "2025-01-15T10:00:02Z"),
            json!({"kind": "alert", "source": "api", "message": "5xx spike"}).to_string(),
        ],
    )
    .await;
    assert_eq!(
        stats,
        FeedStats {
            records: 4,
            rejected: 1,
            incidents_opened: 1,
        }
    );

    let open = ctx
        .incidents
        .list_incidents(IncidentFilter::open())
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    let incident = &open[0];
    assert_eq!(incident.title(), "[jobs] backup exited with 1");
    assert_eq!(incident.alert_count(), 2);
    assert_eq!(incident.severity(), Severity::Warning);
    let id = incident.id().to_string();

    clock.advance(Duration::minutes(15));
    assert!(ctx.escalator.run_once().await);
    let escalated = ctx.incidents.get_incident(&id).await.unwrap();
    assert_eq!(escalated.severity(), Severity::Critical);
    assert_eq!(escalated.status(), IncidentStatus::Active);

    let resolved = ctx.incidents.resolve(&id).await.unwrap();
    assert_eq!(resolved.status(), IncidentStatus::Resolved);
    assert_eq!(resolved.resolved_at(), Some(clock.now()));
    assert!(ctx
        .incidents
        .list_incidents(IncidentFilter::open())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn invalid_alert_record_does_not_stop_the_feed() {
    let clock = Arc::new(ManualClock::new(ts("2025-01-15T10:00:00Z")));
    let ctx = memory_context(clock).await;

    let stats = feed_lines(
        &ctx,
        &[
            json!({"kind": "alert", "source": "", "message": "x"}).to_string(),
            json!({"kind": "alert", "source": "api", "message": "x", "severity": "fatal"})
                .to_string(),
            json!({"kind": "alert", "source": "api", "message": "x"}).to_string(),
            json!({"kind": "alert", "source": "api", "message": "x"}).to_string(),
        ],
    )
    .await;
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.records, 2);
    assert_eq!(stats.incidents_opened, 1);
}

#[tokio::test]
async fn sqlite_store_round_trip() {
    let clock = Arc::new(ManualClock::new(ts("2025-01-15T10:00:00Z")));
    let ctx = build_context_with_clock(&ServerConfig::default(), clock)
        .await
        .unwrap();

    let stats = feed_lines(
        &ctx,
        &[json!({"kind": "alert", "source": "db", "message": "replica lag", "severity": "critical"})
            .to_string()],
    )
    .await;
    assert_eq!(stats.incidents_opened, 1);

    let open = ctx
        .incidents
        .list_incidents(IncidentFilter::open())
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title(), "[db] replica lag");
    assert_eq!(open[0].impact(), "1 alert from db");
}

#[tokio::test]
async fn rules_file_is_seeded_at_boot() {
    let path = std::env::temp_dir().join(format!("ember-rules-{}.json", std::process::id()));
    let drafts = json!([
        {"name": "Failed jobs", "source": "jobs"},
        {"name": "", "source": "jobs"}
    ]);
    std::fs::write(&path, drafts.to_string()).unwrap();
    assert_eq!(load_rules(&path).unwrap().len(), 2);

    let mut config = config(r#"database_url = "memory""#);
    config.rules_file = Some(path.clone());
    let clock = Arc::new(ManualClock::new(ts("2025-01-15T10:00:00Z")));
    let ctx = build_context_with_clock(&config, clock).await.unwrap();
    std::fs::remove_file(&path).unwrap();

    let rules = ctx.rules.list_rules(RuleFilter::default()).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name(), "Failed jobs");
}

#[tokio::test]
async fn shutdown_stops_the_feed() {
    let clock = Arc::new(ManualClock::new(ts("2025-01-15T10:00:00Z")));
    let ctx = memory_context(clock).await;
    let (_tx, rx) = tokio::io::duplex(64);
    let reader = tokio::io::BufReader::new(rx);

    let stats = feed::run(&ctx, reader, async {}).await.unwrap();
    assert_eq!(stats, FeedStats::default());

    ctx.start();
    ctx.stop().await;
}
