//! Bounded-concurrency clone worker pool.
//!
//! A fixed number of workers pull jobs from one shared queue. Every job
//! produces exactly one [`CloneResult`]; it is appended to the log sink
//! before it is reported. Failures never stop the pool.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::github::short_error_message;
use crate::log_sink::LogSink;
use crate::progress::{HarvestProgress, ProgressCallback, emit};
use crate::resource::ResourceDescriptor;

use super::cloner::RepoCloner;
use super::job::{
    CloneError, CloneJob, CloneOptions, CloneOutcome, CloneResult, destination_exists,
};

/// Default number of clone workers.
pub const DEFAULT_CLONE_CONCURRENCY: usize = 5;

/// Channel buffer between discovery and the pool.
pub const JOB_CHANNEL_BUFFER_SIZE: usize = 256;

/// Aggregate of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "CloneSummary carries the failure count that should be reported"]
pub struct CloneSummary {
    pub cloned: usize,
    pub skipped: usize,
    pub failed: usize,
    /// `(repo, reason)` per failed job.
    pub failures: Vec<(String, String)>,
}

impl CloneSummary {
    pub fn from_results(results: &[CloneResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.outcome {
                CloneOutcome::Cloned => summary.cloned += 1,
                CloneOutcome::SkippedExists => summary.skipped += 1,
                CloneOutcome::Failed(reason) => {
                    summary.failed += 1;
                    summary
                        .failures
                        .push((result.job.repo().to_string(), reason.clone()));
                }
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.cloned + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Results of a run in completion order, plus their summary.
#[derive(Debug)]
pub struct CloneRun {
    pub results: Vec<CloneResult>,
    pub summary: CloneSummary,
}

/// Create the output directory and check it is writable before any job is
/// dispatched.
pub async fn prepare_output_dir(path: &Path) -> Result<(), ConfigError> {
    let wrap = |source| ConfigError::OutputDir {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::create_dir_all(path).await.map_err(wrap)?;
    // Mode bits miss foreign owners and read-only mounts.
    tempfile::tempfile_in(path).map_err(wrap)?;
    Ok(())
}

/// Turn a descriptor stream into a job stream.
pub fn jobs_from_descriptors(
    mut descriptors: mpsc::Receiver<ResourceDescriptor>,
    options: CloneOptions,
) -> mpsc::Receiver<CloneJob> {
    let (tx, rx) = mpsc::channel(JOB_CHANNEL_BUFFER_SIZE);
    tokio::spawn(async move {
        while let Some(descriptor) = descriptors.recv().await {
            if tx.send(CloneJob::new(descriptor, &options)).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Destinations currently being written, shared by all workers.
#[derive(Default, Clone)]
struct InFlight(Arc<Mutex<HashSet<PathBuf>>>);

impl InFlight {
    /// Claim `path`; `None` when another worker holds it.
    fn claim(&self, path: &Path) -> Option<InFlightGuard> {
        let mut set = self.0.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(path.to_path_buf()).then(|| InFlightGuard {
            set: self.clone(),
            path: path.to_path_buf(),
        })
    }
}

struct InFlightGuard {
    set: InFlight,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.0.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.path);
    }
}

/// The clone worker pool.
#[derive(Clone)]
pub struct ClonePipeline {
    cloner: Arc<dyn RepoCloner>,
    sink: Option<Arc<LogSink>>,
    concurrency: usize,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl ClonePipeline {
    pub fn new(cloner: Arc<dyn RepoCloner>, concurrency: usize) -> Self {
        Self {
            cloner,
            sink: None,
            concurrency: concurrency.max(1),
            on_progress: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, on_progress: Arc<ProgressCallback>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Clone a known batch of jobs.
    pub async fn run(&self, jobs: Vec<CloneJob>) -> CloneRun {
        let (tx, rx) = mpsc::channel(jobs.len().max(1));
        let count = jobs.len();
        for job in jobs {
            // Capacity equals the job count, so this never waits.
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);
        self.drain(rx, Some(count)).await
    }

    /// Clone jobs as they arrive until the sender side closes.
    pub async fn run_streaming(&self, job_rx: mpsc::Receiver<CloneJob>) -> CloneRun {
        self.drain(job_rx, None).await
    }

    #[tracing::instrument(
        name = "clone_batch",
        skip_all,
        fields(batch = %Uuid::new_v4(), concurrency = self.concurrency)
    )]
    async fn drain(&self, job_rx: mpsc::Receiver<CloneJob>, known: Option<usize>) -> CloneRun {
        emit(
            self.on_progress.as_deref(),
            HarvestProgress::CloningStarted {
                jobs: known,
                concurrency: self.concurrency,
            },
        );

        let queue = Arc::new(tokio::sync::Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<CloneResult>();
        let in_flight = InFlight::default();
        let mut workers = JoinSet::new();

        for worker_id in 0..self.concurrency {
            let queue = Arc::clone(&queue);
            let result_tx = result_tx.clone();
            let in_flight = in_flight.clone();
            let pipeline = self.clone();

            workers.spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(job) = next else { break };
                    let result = pipeline.process_isolated(job, &in_flight).await;
                    pipeline.record(&result).await;
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                tracing::trace!(worker_id, "Clone worker finished");
            });
        }
        drop(result_tx);

        let mut results = Vec::new();
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Clone worker panicked");
            }
        }

        let summary = CloneSummary::from_results(&results);
        tracing::info!(
            cloned = summary.cloned,
            skipped = summary.skipped,
            failed = summary.failed,
            "Clone batch complete"
        );
        emit(
            self.on_progress.as_deref(),
            HarvestProgress::CloningComplete {
                cloned: summary.cloned,
                skipped: summary.skipped,
                failed: summary.failed,
            },
        );

        CloneRun { results, summary }
    }

    /// Run one job in its own task so a panicking cloner still yields a result.
    async fn process_isolated(&self, job: CloneJob, in_flight: &InFlight) -> CloneResult {
        let fallback = job.clone();
        let pipeline = self.clone();
        let in_flight = in_flight.clone();
        let handle = tokio::spawn(async move { pipeline.process(job, &in_flight).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let reason = format!("clone panicked: {}", join_failure(e));
                tracing::error!(repo = %fallback.repo(), error = %reason, "Clone task failed");
                remove_partial(&fallback.destination).await;
                CloneResult::new(fallback, CloneOutcome::Failed(reason))
            }
        }
    }

    async fn process(&self, job: CloneJob, in_flight: &InFlight) -> CloneResult {
        let Some(_guard) = in_flight.claim(&job.destination) else {
            tracing::info!(repo = %job.repo(), dest = %job.destination.display(), "Destination busy, skipping");
            return CloneResult::new(job, CloneOutcome::SkippedExists);
        };

        match self.clone_one(&job).await {
            Ok(outcome) => CloneResult::new(job, outcome),
            Err(e) => {
                tracing::warn!(
                    repo = %job.repo(),
                    kind = e.kind(),
                    error = %e,
                    "Clone failed"
                );
                remove_partial(&job.destination).await;
                CloneResult::new(job, CloneOutcome::Failed(short_error_message(&e)))
            }
        }
    }

    async fn clone_one(&self, job: &CloneJob) -> Result<CloneOutcome, CloneError> {
        if destination_exists(&job.destination).await? {
            if !job.overwrite {
                tracing::debug!(repo = %job.repo(), "Destination exists, skipping");
                return Ok(CloneOutcome::SkippedExists);
            }
            remove_path(&job.destination)
                .await
                .map_err(|e| CloneError::local_io(&job.destination, e))?;
        }

        self.cloner.clone_repo(job).await?;
        tracing::debug!(repo = %job.repo(), dest = %job.destination.display(), "Cloned");
        Ok(CloneOutcome::Cloned)
    }

    async fn record(&self, result: &CloneResult) {
        if let Some(sink) = &self.sink
            && let Err(e) = sink.append(&result.to_record()).await
        {
            tracing::error!(repo = %result.job.repo(), error = %e, "Failed to append clone record");
        }

        let repo = result.job.repo().to_string();
        let event = match &result.outcome {
            CloneOutcome::Cloned => HarvestProgress::Cloned { repo },
            CloneOutcome::SkippedExists => HarvestProgress::CloneSkipped { repo },
            CloneOutcome::Failed(error) => HarvestProgress::CloneFailed {
                repo,
                error: error.clone(),
            },
        };
        emit(self.on_progress.as_deref(), event);
    }
}

/// Panic payload (or cancellation) of a failed clone task as text.
fn join_failure(e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = tokio::fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

/// Best-effort cleanup of a failed clone's destination.
async fn remove_partial(path: &Path) {
    match remove_path(path).await {
        Ok(()) => tracing::debug!(dest = %path.display(), "Removed partial clone"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(dest = %path.display(), error = %e, "Failed to remove partial clone")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::job::CloneRecord;
    use crate::log_sink::read_records;
    use crate::resource::test_support::descriptor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Creates the destination with a marker file.
    #[derive(Default)]
    struct TouchCloner {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl RepoCloner for TouchCloner {
        async fn clone_repo(&self, job: &CloneJob) -> Result<(), CloneError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            tokio::fs::create_dir_all(&job.destination)
                .await
                .map_err(|e| CloneError::local_io(&job.destination, e))?;
            tokio::fs::write(job.destination.join("README"), job.repo())
                .await
                .map_err(|e| CloneError::local_io(&job.destination, e))
        }
    }

    /// Creates a partial destination, then fails.
    struct PartialFailCloner;

    #[async_trait]
    impl RepoCloner for PartialFailCloner {
        async fn clone_repo(&self, job: &CloneJob) -> Result<(), CloneError> {
            tokio::fs::create_dir_all(job.destination.join(".git"))
                .await
                .map_err(|e| CloneError::local_io(&job.destination, e))?;
            Err(CloneError::Git {
                status: "exit status: 128".to_string(),
                stderr: "fatal: early EOF\nmore detail".to_string(),
            })
        }
    }

    /// Leaves a partial destination behind and panics for one repository.
    struct PanickingCloner {
        panic_on: &'static str,
    }

    #[async_trait]
    impl RepoCloner for PanickingCloner {
        async fn clone_repo(&self, job: &CloneJob) -> Result<(), CloneError> {
            tokio::fs::create_dir_all(job.destination.join(".git"))
                .await
                .map_err(|e| CloneError::local_io(&job.destination, e))?;
            if job.repo() == self.panic_on {
                panic!("index out of range");
            }
            Ok(())
        }
    }

    fn jobs(dir: &Path, names: &[&str], overwrite: bool) -> Vec<CloneJob> {
        let options = CloneOptions {
            output_dir: dir.to_path_buf(),
            overwrite,
            ..Default::default()
        };
        names
            .iter()
            .map(|n| CloneJob::new(descriptor(n, 1), &options))
            .collect()
    }

    #[tokio::test]
    async fn test_every_job_gets_one_result_and_one_log_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("clones.csv");
        let sink = Arc::new(LogSink::open(&log).await.unwrap());
        let pipeline = ClonePipeline::new(Arc::new(TouchCloner::default()), 3).with_sink(Arc::clone(&sink));

        let run = pipeline
            .run(jobs(dir.path(), &["a/one", "a/two", "a/three", "a/four"], false))
            .await;
        sink.close().await.unwrap();

        assert_eq!(run.results.len(), 4);
        assert_eq!(run.summary.cloned, 4);
        assert!(dir.path().join("three").join("README").exists());

        let rows: Vec<CloneRecord> = read_records(&log).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.outcome == "cloned"));
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped_unless_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("one")).unwrap();
        std::fs::write(dir.path().join("one").join("stale"), b"old").unwrap();
        let cloner = Arc::new(TouchCloner::default());
        let pipeline = ClonePipeline::new(cloner.clone(), 2);

        let run = pipeline.run(jobs(dir.path(), &["a/one"], false)).await;
        assert_eq!(run.results[0].outcome, CloneOutcome::SkippedExists);
        assert_eq!(cloner.calls.load(Ordering::SeqCst), 0);

        let run = pipeline.run(jobs(dir.path(), &["a/one"], true)).await;
        assert_eq!(run.results[0].outcome, CloneOutcome::Cloned);
        assert!(!dir.path().join("one").join("stale").exists());
        assert!(dir.path().join("one").join("README").exists());
    }

    #[tokio::test]
    async fn test_failure_removes_partial_destination_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ClonePipeline::new(Arc::new(PartialFailCloner), 2);

        let run = pipeline.run(jobs(dir.path(), &["a/one", "a/two"], false)).await;
        assert_eq!(run.results.len(), 2);
        assert_eq!(run.summary.failed, 2);
        assert!(!dir.path().join("one").exists());
        assert!(!dir.path().join("two").exists());
        match &run.results[0].outcome {
            CloneOutcome::Failed(reason) => {
                assert!(reason.contains("early EOF"));
                assert!(!reason.contains("more detail"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_clone_still_yields_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("clones.csv");
        let sink = Arc::new(LogSink::open(&log).await.unwrap());
        let pipeline = ClonePipeline::new(Arc::new(PanickingCloner { panic_on: "a/two" }), 2)
            .with_sink(Arc::clone(&sink));

        let run = pipeline
            .run(jobs(dir.path(), &["a/one", "a/two", "a/three"], false))
            .await;
        sink.close().await.unwrap();

        assert_eq!(run.results.len(), 3);
        assert_eq!((run.summary.cloned, run.summary.failed), (2, 1));
        let (repo, reason) = &run.summary.failures[0];
        assert_eq!(repo, "a/two");
        assert!(reason.starts_with("clone panicked: index out of range"), "{reason}");
        assert!(!dir.path().join("two").exists());
        assert!(dir.path().join("three").exists());

        let rows: Vec<CloneRecord> = read_records(&log).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_destination_in_flight_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = Arc::new(TouchCloner {
            calls: AtomicUsize::new(0),
            delay: Some(Duration::from_secs(5)),
        });
        let pipeline = ClonePipeline::new(cloner.clone(), 4);

        // Different owners, same repository name: same destination.
        let run = pipeline.run(jobs(dir.path(), &["a/demo", "b/demo"], false)).await;
        let mut outcomes: Vec<_> = run.results.iter().map(|r| r.outcome.clone()).collect();
        outcomes.sort_by_key(|o| o.to_string());
        assert_eq!(outcomes, vec![CloneOutcome::Cloned, CloneOutcome::SkippedExists]);
        assert_eq!(cloner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_streaming_run_drains_until_sender_closes() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ClonePipeline::new(Arc::new(TouchCloner::default()), 2);
        let (tx, rx) = mpsc::channel(1);
        let to_send = jobs(dir.path(), &["a/one", "a/two", "a/three"], false);
        let producer = tokio::spawn(async move {
            for job in to_send {
                tx.send(job).await.unwrap();
            }
        });

        let run = pipeline.run_streaming(rx).await;
        producer.await.unwrap();
        assert_eq!(run.summary.total(), 3);
        assert_eq!(run.summary.cloned, 3);
    }

    #[tokio::test]
    async fn test_jobs_from_descriptors_maps_each_descriptor() {
        let (tx, rx) = mpsc::channel(4);
        let options = CloneOptions {
            output_dir: PathBuf::from("/out"),
            depth: Some(1),
            ..Default::default()
        };
        let mut job_rx = jobs_from_descriptors(rx, options);
        tx.send(descriptor("a/one", 1)).await.unwrap();
        drop(tx);

        let job = job_rx.recv().await.expect("job");
        assert_eq!(job.destination, PathBuf::from("/out/one"));
        assert_eq!(job.depth, Some(1));
        assert!(job_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_prepare_output_dir_rejects_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(prepare_output_dir(&dir.path().join("new")).await.is_ok());
        assert!(matches!(
            prepare_output_dir(&file.join("sub")).await,
            Err(ConfigError::OutputDir { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_prepare_output_dir_rejects_unwritable_directory() {
        // procfs refuses new files even for root, whatever its mode bits say.
        let proc = Path::new("/proc");
        if !proc.is_dir() {
            return;
        }
        assert!(matches!(
            prepare_output_dir(proc).await,
            Err(ConfigError::OutputDir { .. })
        ));
    }

    #[test]
    fn test_summary_counts() {
        let options = CloneOptions::default();
        let job = CloneJob::new(descriptor("a/x", 1), &options);
        let results = vec![
            CloneResult::new(job.clone(), CloneOutcome::Cloned),
            CloneResult::new(job.clone(), CloneOutcome::SkippedExists),
            CloneResult::new(job, CloneOutcome::Failed("boom".to_string())),
        ];
        let summary = CloneSummary::from_results(&results);
        assert_eq!((summary.cloned, summary.skipped, summary.failed), (1, 1, 1));
        assert_eq!(summary.failures, vec![("a/x".to_string(), "boom".to_string())]);
        assert!(summary.has_failures());
        assert_eq!(summary.total(), 3);
    }
}
