//! Store-level behavior checked through the rendered exposition.

use std::time::Duration;

use pushgrid_core::{parse_text, GroupingKey};
use pushgrid_metrics::{merge, render_prometheus, ConflictKind};
use pushgrid_store::{MetricStore, StoreOptions};

const BATCH_JOB: &str = "\
# HELP batch_last_success_seconds Last successful run.
# TYPE batch_last_success_seconds gauge
batch_last_success_seconds 1.7e9
# HELP batch_duration_seconds Run duration.
# TYPE batch_duration_seconds histogram
batch_duration_seconds_bucket{le=\"1\"} 2
batch_duration_seconds_bucket{le=\"+Inf\"} 3
batch_duration_seconds_sum 4.5
batch_duration_seconds_count 3
";

const WORKER: &str = "\
# TYPE batch_last_success_seconds gauge
batch_last_success_seconds{shard=\"2\"} NaN
# TYPE rows_processed_total counter
rows_processed_total 12345
";

async fn scrape(store: &MetricStore) -> String {
    let snapshot = store.snapshot().await.unwrap();
    render_prometheus(&merge(snapshot.groups()).families)
}

#[tokio::test]
async fn merged_samples_carry_group_labels() {
    let store = MetricStore::open(StoreOptions::default()).await;
    let a = GroupingKey::job("a").unwrap();
    let b = GroupingKey::job_instance("b", "host-1").unwrap();
    store.push(a, parse_text(BATCH_JOB).unwrap()).await.unwrap();
    store.push(b, parse_text(WORKER).unwrap()).await.unwrap();

    let body = scrape(&store).await;
    assert!(body.contains("batch_last_success_seconds{job=\"a\"} 1700000000\n"));
    assert!(body.contains("batch_last_success_seconds{instance=\"host-1\",job=\"b\",shard=\"2\"} NaN\n"));
    assert!(body.contains("rows_processed_total{instance=\"host-1\",job=\"b\"} 12345\n"));
    assert!(body.contains("batch_duration_seconds_bucket{job=\"a\",le=\"+Inf\"} 3\n"));
    // One definition per family even though two groups pushed it.
    assert_eq!(body.matches("# TYPE batch_last_success_seconds gauge").count(), 1);
}

#[tokio::test]
async fn type_conflict_keeps_first_definition() {
    let store = MetricStore::open(StoreOptions::default()).await;
    let gauge = "# TYPE foo gauge\nfoo 1\n";
    let counter = "# TYPE foo counter\nfoo 2\n";
    store
        .push(GroupingKey::job("a").unwrap(), parse_text(gauge).unwrap())
        .await
        .unwrap();
    store
        .push(GroupingKey::job("b").unwrap(), parse_text(counter).unwrap())
        .await
        .unwrap();

    let snapshot = store.snapshot().await.unwrap();
    let exposition = merge(snapshot.groups());
    assert_eq!(exposition.conflicts.len(), 1);
    assert!(matches!(exposition.conflicts[0].kind, ConflictKind::Type { .. }));

    let body = render_prometheus(&exposition.families);
    assert!(body.contains("# TYPE foo gauge\n"));
    assert!(body.contains("foo{job=\"a\"} 1\n"));
    assert!(body.contains("foo{job=\"b\"} 2\n"));
}

#[tokio::test]
async fn repeated_scrapes_are_identical() {
    let store = MetricStore::open(StoreOptions::default()).await;
    store
        .push(GroupingKey::job("a").unwrap(), parse_text(BATCH_JOB).unwrap())
        .await
        .unwrap();
    assert_eq!(scrape(&store).await, scrape(&store).await);
}

#[tokio::test]
async fn exposition_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions::default()
        .with_persistence(dir.path().join("metrics.redb"), Duration::from_secs(3600));

    let store = MetricStore::open(options.clone()).await;
    store
        .push(GroupingKey::job("a").unwrap(), parse_text(BATCH_JOB).unwrap())
        .await
        .unwrap();
    store
        .push(
            GroupingKey::job_instance("b", "host-1").unwrap(),
            parse_text(WORKER).unwrap(),
        )
        .await
        .unwrap();
    store.flush().await.unwrap();
    let before = scrape(&store).await;
    store.shutdown().await.unwrap();

    let reopened = MetricStore::open(options).await;
    assert_eq!(scrape(&reopened).await, before);
}
