//! The watch scheduler.
//!
//! One scheduler loop owns a min-heap of next-due instants. Due resources are
//! polled as tasks in a [`JoinSet`], at most `max_in_flight` at a time. A
//! resource goes back on the heap only after its own poll finished, so polls
//! of one resource never overlap.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::Instrument;
use uuid::Uuid;

use crate::discovery::{FilterCriteria, SearchPager, SearchQuery};
use crate::github::{ApiError, RateLimitedClient, convert, short_error_message};
use crate::log_sink::LogSink;
use crate::progress::{HarvestProgress, ProgressCallback, emit};
use crate::resource::ResourceDescriptor;

use super::poll::{PollOutcome, poll_resource};
use super::state::{PollState, ResourceReport, WatchReport};

/// Default cap on concurrent polls.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

type PollTaskOutput = (usize, ResourceDescriptor, Result<PollOutcome, ApiError>);

/// A bounded observation window over a set of repositories.
pub struct WatchSession {
    client: RateLimitedClient,
    criteria: FilterCriteria,
    duration: Duration,
    sink: Arc<LogSink>,
    display: bool,
    max_in_flight: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl WatchSession {
    pub fn new(
        client: RateLimitedClient,
        criteria: FilterCriteria,
        duration: Duration,
        sink: Arc<LogSink>,
    ) -> Self {
        Self {
            client,
            criteria,
            duration,
            sink,
            display: false,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            shutdown_flag: None,
            on_progress: None,
        }
    }

    /// Emit [`HarvestProgress::ResourceChanged`] for every change.
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    pub fn with_progress(mut self, on_progress: Arc<ProgressCallback>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Build the watched set: direct fetches for named targets, search for
    /// everything else, then the local predicates applied once.
    pub async fn resolve_resources(&self) -> Result<Vec<ResourceDescriptor>, ApiError> {
        let targets = self.criteria.direct_targets();
        let mut candidates = Vec::new();

        for full_name in &targets {
            match self.client.get_repo(full_name).await {
                Ok(payload) => match convert::to_descriptor(payload) {
                    Some(descriptor) => candidates.push(descriptor),
                    None => tracing::warn!(repo = %full_name, "Repository has no clone URL, not watching"),
                },
                Err(e) => {
                    tracing::warn!(repo = %full_name, kind = e.kind(), error = %e, "Cannot fetch watch target");
                    emit(
                        self.on_progress.as_deref(),
                        HarvestProgress::Warning {
                            message: format!("{full_name}: {}", short_error_message(&e)),
                        },
                    );
                }
            }
        }

        let needs_search =
            targets.is_empty() || self.criteria.names.iter().any(|n| !n.contains('/'));
        if needs_search {
            let mut pager = SearchPager::new(
                self.client.clone(),
                SearchQuery::for_today(&self.criteria),
            );
            if let Some(flag) = &self.shutdown_flag {
                pager = pager.with_shutdown_flag(Arc::clone(flag));
            }
            candidates.extend(pager.discover_all(self.on_progress.as_deref()).await?);
        }

        let mut seen = HashSet::new();
        let watched: Vec<_> = candidates
            .into_iter()
            .filter(|d| seen.insert(d.full_name.to_ascii_lowercase()))
            .filter(|d| self.criteria.matches_watch(d))
            .collect();
        tracing::info!(count = watched.len(), "Resolved watch set");
        Ok(watched)
    }

    /// Resolve the watched set and run the session.
    pub async fn run(self) -> Result<WatchReport, ApiError> {
        let resources = self.resolve_resources().await?;
        Ok(self.run_with(resources).await)
    }

    /// Run the scheduler over an already-resolved set.
    ///
    /// Every resource is polled once immediately, then again one polling
    /// interval after its previous poll finished. When the duration elapses
    /// or the shutdown flag is seen, no new polls start; in-flight polls are
    /// joined and the sink is closed before the report is returned.
    pub async fn run_with(self, resources: Vec<ResourceDescriptor>) -> WatchReport {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "watch_session",
            session = %session_id,
            resources = resources.len()
        );
        self.drive(session_id, resources).instrument(span).await
    }

    async fn drive(self, session_id: Uuid, resources: Vec<ResourceDescriptor>) -> WatchReport {
        let start = Instant::now();
        let deadline = start + self.duration;
        let interval = self.client.config().poll_interval;

        emit(
            self.on_progress.as_deref(),
            HarvestProgress::WatchStarted {
                resources: resources.len(),
                duration_secs: self.duration.as_secs(),
            },
        );

        let mut reports: Vec<ResourceReport> = resources
            .iter()
            .map(|r| ResourceReport::new(&r.full_name))
            .collect();
        let mut slots: Vec<Option<ResourceDescriptor>> = resources.into_iter().map(Some).collect();
        let mut heap: BinaryHeap<Reverse<(Instant, usize)>> =
            (0..slots.len()).map(|idx| Reverse((start, idx))).collect();
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut polls: JoinSet<PollTaskOutput> = JoinSet::new();
        // Descriptor per running poll, kept to re-queue a resource whose task panicked.
        let mut in_poll: HashMap<Id, (usize, ResourceDescriptor)> = HashMap::new();

        loop {
            if self.is_shutdown() {
                tracing::info!("Shutdown requested, stopping watch");
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            while let Some(&Reverse((due, idx))) = heap.peek() {
                if due > now {
                    break;
                }
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    break;
                };
                heap.pop();
                if let Some(repo) = slots[idx].take() {
                    reports[idx].state = PollState::Polling;
                    reports[idx].polls += 1;
                    let task = polls.spawn(self.poll_task(idx, repo.clone(), permit));
                    in_poll.insert(task.id(), (idx, repo));
                }
            }

            let saturated = permits.available_permits() == 0;
            let wake = match heap.peek() {
                Some(&Reverse((due, _))) if !saturated => due.min(deadline),
                _ => deadline,
            };

            tokio::select! {
                Some(joined) = polls.join_next_with_id(), if !polls.is_empty() => {
                    if let Some(idx) = self.settle(joined, &mut in_poll, &mut slots, &mut reports) {
                        heap.push(Reverse((Instant::now() + interval, idx)));
                    }
                }
                _ = sleep_until(wake) => {}
            }
        }

        while let Some(joined) = polls.join_next_with_id().await {
            self.settle(joined, &mut in_poll, &mut slots, &mut reports);
        }
        for report in &mut reports {
            report.state = PollState::Stopped;
        }
        if let Err(e) = self.sink.close().await {
            tracing::error!(error = %e, "Failed to close change log");
        }

        let report = WatchReport {
            session_id,
            resources: reports,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            polls = report.polls(),
            changes = report.changes(),
            failures = report.failures(),
            "Watch session stopped"
        );
        emit(
            self.on_progress.as_deref(),
            HarvestProgress::WatchStopped {
                polls: report.polls(),
                changes: report.changes(),
            },
        );
        report
    }

    fn poll_task(
        &self,
        idx: usize,
        mut repo: ResourceDescriptor,
        permit: OwnedSemaphorePermit,
    ) -> impl Future<Output = PollTaskOutput> + Send + 'static {
        let client = self.client.clone();
        let sink = Arc::clone(&self.sink);
        let on_progress = self.display.then(|| self.on_progress.clone()).flatten();

        async move {
            let _permit = permit;
            let result = poll_resource(&client, &mut repo).await;
            if let Ok(PollOutcome::Changed(record)) = &result {
                tracing::info!(
                    repo = %record.full_name,
                    stars = record.stars,
                    watchers = record.watchers,
                    forks = record.forks,
                    size = record.size,
                    "Change detected"
                );
                if let Err(e) = sink.append(record).await {
                    tracing::error!(repo = %record.full_name, error = %e, "Failed to append change record");
                }
                emit(
                    on_progress.as_deref(),
                    HarvestProgress::ResourceChanged {
                        full_name: record.full_name.clone(),
                        size_kb: record.size,
                        stars: record.stars,
                        watchers: record.watchers,
                        forks: record.forks,
                    },
                );
            }
            (idx, repo, result)
        }
    }

    /// Record a finished poll. Returns the slot to re-queue.
    fn settle(
        &self,
        joined: Result<(Id, PollTaskOutput), JoinError>,
        in_poll: &mut HashMap<Id, (usize, ResourceDescriptor)>,
        slots: &mut [Option<ResourceDescriptor>],
        reports: &mut [ResourceReport],
    ) -> Option<usize> {
        let (idx, repo, result) = match joined {
            Ok((id, output)) => {
                in_poll.remove(&id);
                output
            }
            Err(e) => {
                let Some((idx, repo)) = in_poll.remove(&e.id()) else {
                    tracing::error!(error = %e, "Unknown poll task failed");
                    return None;
                };
                tracing::error!(repo = %repo.full_name, error = %e, "Poll task panicked");
                reports[idx].failures += 1;
                reports[idx].state = PollState::Idle;
                emit(
                    self.on_progress.as_deref(),
                    HarvestProgress::PollFailed {
                        full_name: repo.full_name.clone(),
                        error: "poll task panicked".to_string(),
                    },
                );
                slots[idx] = Some(repo);
                return Some(idx);
            }
        };

        let report = &mut reports[idx];
        match result {
            Ok(PollOutcome::Changed(_)) => {
                report.changes += 1;
                report.state = PollState::Changed;
            }
            Ok(PollOutcome::Unchanged) => report.state = PollState::Unchanged,
            Err(e) => {
                report.failures += 1;
                report.state = PollState::Idle;
                tracing::warn!(repo = %repo.full_name, kind = e.kind(), error = %e, "Poll failed");
                emit(
                    self.on_progress.as_deref(),
                    HarvestProgress::PollFailed {
                        full_name: repo.full_name.clone(),
                        error: short_error_message(&e),
                    },
                );
            }
        }
        slots[idx] = Some(repo);
        Some(idx)
    }
}
