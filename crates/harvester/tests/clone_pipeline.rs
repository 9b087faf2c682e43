//! Clone pipeline behaviour across concurrency levels and repeated runs.

mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use common::{FakeCloner, descriptor, dir_entries};
use harvester::LogSink;
use harvester::clone::{
    CloneJob, CloneOptions, CloneOutcome, ClonePipeline, CloneRecord, CloneRun,
};
use harvester::read_records;

const REPOS: [&str; 12] = [
    "octo/alpha", "octo/bravo", "octo/charlie", "octo/delta", "acme/echo", "acme/foxtrot",
    "acme/golf", "acme/hotel", "zed/india", "zed/juliet", "zed/kilo", "zed/lima",
];

fn jobs(output_dir: &Path, overwrite: bool) -> Vec<CloneJob> {
    let options = CloneOptions {
        output_dir: output_dir.to_path_buf(),
        overwrite,
        ..Default::default()
    };
    REPOS
        .iter()
        .map(|name| CloneJob::new(descriptor(name, 1), &options))
        .collect()
}

fn outcome_counts(run: &CloneRun) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for result in &run.results {
        let key = match &result.outcome {
            CloneOutcome::Failed(_) => "failed".to_string(),
            other => other.to_string(),
        };
        *counts.entry(key).or_default() += 1;
    }
    counts
}

async fn run_once(output_dir: &Path, log: &Path, concurrency: usize, cloner: Arc<FakeCloner>) -> CloneRun {
    let sink = Arc::new(LogSink::open(log).await.unwrap());
    let run = ClonePipeline::new(cloner, concurrency)
        .with_sink(Arc::clone(&sink))
        .run(jobs(output_dir, false))
        .await;
    sink.close().await.unwrap();
    run
}

#[tokio::test]
async fn test_outcome_multiset_is_independent_of_concurrency() {
    let mut baseline: Option<BTreeMap<String, usize>> = None;

    for concurrency in [1, 4, 16] {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("repos");
        let log = dir.path().join("clones.csv");
        let cloner = Arc::new(FakeCloner::failing(&["acme/golf", "zed/kilo"]));

        let run = run_once(&out, &log, concurrency, Arc::clone(&cloner)).await;

        assert_eq!(run.results.len(), REPOS.len(), "concurrency {concurrency}");
        assert_eq!(cloner.calls(), REPOS.len());
        let counts = outcome_counts(&run);
        assert_eq!(counts.get("cloned"), Some(&10));
        assert_eq!(counts.get("failed"), Some(&2));
        if let Some(expected) = &baseline {
            assert_eq!(&counts, expected, "concurrency {concurrency}");
        }
        baseline = Some(counts);

        // Failed clones leave nothing behind.
        let entries = dir_entries(&out);
        assert_eq!(entries.len(), 10);
        assert!(!entries.contains("golf"));
        assert!(!entries.contains("kilo"));

        // One durable row per job.
        let rows: Vec<CloneRecord> = read_records(&log).await.unwrap();
        assert_eq!(rows.len(), REPOS.len());
        assert_eq!(
            rows.iter().filter(|r| r.outcome.starts_with("failed: ")).count(),
            2
        );
    }
}

#[tokio::test]
async fn test_second_run_without_overwrite_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("repos");
    let log = dir.path().join("clones.csv");

    let first = run_once(&out, &log, 4, Arc::new(FakeCloner::default())).await;
    assert_eq!(first.summary.cloned, REPOS.len());

    let cloner = Arc::new(FakeCloner::default());
    let second = run_once(&out, &log, 4, Arc::clone(&cloner)).await;
    assert_eq!(second.summary.skipped, REPOS.len());
    assert_eq!(second.summary.cloned, 0);
    assert_eq!(cloner.calls(), 0);

    // The log keeps one header and one row per attempt across both runs.
    let text = std::fs::read_to_string(&log).unwrap();
    assert_eq!(text.matches("repo_name,repo_url,utc_timestamp,outcome").count(), 1);
    let rows: Vec<CloneRecord> = read_records(&log).await.unwrap();
    assert_eq!(rows.len(), 2 * REPOS.len());
    assert_eq!(
        rows.iter().filter(|r| r.outcome == "skipped_exists").count(),
        REPOS.len()
    );
}

#[tokio::test]
async fn test_overwrite_replaces_existing_checkouts() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("repos");
    std::fs::create_dir_all(out.join("alpha")).unwrap();
    std::fs::write(out.join("alpha").join("leftover"), b"x").unwrap();

    let run = ClonePipeline::new(Arc::new(FakeCloner::default()), 4)
        .run(jobs(&out, true))
        .await;

    assert_eq!(run.summary.cloned, REPOS.len());
    assert!(!out.join("alpha").join("leftover").exists());
    assert!(out.join("alpha").join("HEAD").exists());
}
