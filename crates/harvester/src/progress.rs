//! Progress events shared by discovery, cloning and watching.
//!
//! Library code never prints. Front-ends subscribe with a [`ProgressCallback`]
//! and decide how to render each event.

/// Progress events emitted during a harvest run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum HarvestProgress {
    /// A search query is about to be paged.
    DiscoveryStarted {
        /// Human-readable form of the query.
        query: String,
    },

    /// Fetched one page of search results.
    PageFetched {
        /// Page number (1-indexed).
        page: u32,
        /// Descriptors produced from this page.
        count: usize,
        /// `total_count` reported by the upstream.
        total_count: u64,
        /// Running total of descriptors produced.
        total_so_far: usize,
    },

    /// Discovery finished (exhausted or stopped).
    DiscoveryComplete { total: usize },

    /// Clone dispatch began.
    CloningStarted {
        /// Number of jobs, if known up front.
        jobs: Option<usize>,
        concurrency: usize,
    },

    /// A repository was cloned.
    Cloned { repo: String },

    /// A clone was skipped because the destination exists.
    CloneSkipped { repo: String },

    /// A clone failed.
    CloneFailed { repo: String, error: String },

    /// All clone jobs finished.
    CloningComplete {
        cloned: usize,
        skipped: usize,
        failed: usize,
    },

    /// The upstream reported exhausted quota; the caller is waiting.
    Throttled {
        /// Seconds until the single retry.
        wait_secs: u64,
    },

    /// A watch session started.
    WatchStarted {
        resources: usize,
        duration_secs: u64,
    },

    /// A watched resource changed (only emitted when display is enabled).
    ResourceChanged {
        full_name: String,
        size_kb: u64,
        stars: u64,
        watchers: u64,
        forks: u64,
    },

    /// A poll failed; the resource stays scheduled.
    PollFailed { full_name: String, error: String },

    /// The watch session stopped and drained.
    WatchStopped { polls: usize, changes: usize },

    /// Warning message (non-fatal).
    Warning { message: String },
}

/// Callback for progress updates.
pub type ProgressCallback = Box<dyn Fn(HarvestProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: HarvestProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
