//! Bulk cloning of discovered repositories.

mod cloner;
mod job;
mod pipeline;

pub use cloner::{GitCloner, RepoCloner};
pub use job::{
    CloneError, CloneJob, CloneOptions, CloneOutcome, CloneRecord, CloneResult, fallback_name,
    sanitize_name,
};
pub use pipeline::{
    ClonePipeline, CloneRun, CloneSummary, DEFAULT_CLONE_CONCURRENCY, JOB_CHANNEL_BUFFER_SIZE,
    jobs_from_descriptors, prepare_output_dir,
};
