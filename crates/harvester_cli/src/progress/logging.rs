use harvester::HarvestProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: HarvestProgress) {
        match event {
            HarvestProgress::DiscoveryStarted { query } => {
                tracing::info!(query = %query, "Searching repositories");
            }

            HarvestProgress::PageFetched {
                page,
                count,
                total_count,
                total_so_far,
            } => {
                tracing::debug!(page, count, total_count, total_so_far, "Fetched page");
            }

            HarvestProgress::DiscoveryComplete { total } => {
                tracing::info!(total, "Discovery complete");
            }

            HarvestProgress::CloningStarted { jobs, concurrency } => {
                tracing::info!(jobs = ?jobs, concurrency, "Cloning repositories");
            }

            HarvestProgress::Cloned { repo } => {
                tracing::info!(repo = %repo, "Cloned");
            }

            HarvestProgress::CloneSkipped { repo } => {
                tracing::debug!(repo = %repo, "Destination exists, skipped");
            }

            HarvestProgress::CloneFailed { repo, error } => {
                tracing::warn!(repo = %repo, error = %error, "Clone failed");
            }

            HarvestProgress::CloningComplete {
                cloned,
                skipped,
                failed,
            } => {
                tracing::info!(cloned, skipped, failed, "Cloning complete");
            }

            HarvestProgress::Throttled { wait_secs } => {
                tracing::warn!(wait_secs, "Rate limited, waiting for reset");
            }

            HarvestProgress::WatchStarted {
                resources,
                duration_secs,
            } => {
                tracing::info!(resources, duration_secs, "Watching repositories");
            }

            HarvestProgress::ResourceChanged {
                full_name,
                size_kb,
                stars,
                watchers,
                forks,
            } => {
                tracing::info!(
                    repo = %full_name,
                    size_kb,
                    stars,
                    watchers,
                    forks,
                    "Repository changed"
                );
            }

            HarvestProgress::PollFailed { full_name, error } => {
                tracing::warn!(repo = %full_name, error = %error, "Poll failed");
            }

            HarvestProgress::WatchStopped { polls, changes } => {
                tracing::info!(polls, changes, "Watch stopped");
            }

            HarvestProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
