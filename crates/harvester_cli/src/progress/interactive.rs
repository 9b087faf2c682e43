use std::sync::Mutex;
use std::time::Duration;

use harvester::HarvestProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(100);

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Pages fetched and repositories found.
    discover_bar: Option<ProgressBar>,
    /// Completed clone jobs.
    clone_bar: Option<ProgressBar>,
    /// Polls and changes during a watch.
    watch_bar: Option<ProgressBar>,
    /// Repositories found so far; the clone bar length follows it.
    discovered: usize,
    cloned: usize,
    skipped: usize,
    failed: usize,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    /// Reporter that draws nowhere.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self::with_multi(MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()))
    }

    fn with_multi(multi: MultiProgress) -> Self {
        Self {
            multi,
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// Clone tallies seen so far: (cloned, skipped, failed).
    #[cfg(test)]
    pub fn clone_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.cloned, state.skipped, state.failed)
    }

    fn spinner(&self, prefix: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(format!("{:10}", prefix));
        pb.enable_steady_tick(TICK);
        pb
    }

    pub fn handle(&self, event: HarvestProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            HarvestProgress::DiscoveryStarted { query } => {
                let pb = self.spinner("Searching");
                pb.set_message(query);
                state.discover_bar = Some(pb);
            }

            HarvestProgress::PageFetched {
                page,
                total_count,
                total_so_far,
                ..
            } => {
                state.discovered = total_so_far;
                if let Some(ref pb) = state.discover_bar {
                    pb.set_message(format!(
                        "Page {} ({} found, {} reported)",
                        page, total_so_far, total_count
                    ));
                }
                if let Some(ref pb) = state.clone_bar {
                    pb.set_length(total_so_far as u64);
                }
            }

            HarvestProgress::DiscoveryComplete { total } => {
                state.discovered = total;
                if let Some(ref pb) = state.discover_bar {
                    pb.finish_with_message(format!("✓ {} repositories found", total));
                }
                if let Some(ref pb) = state.clone_bar {
                    pb.set_length(total as u64);
                }
            }

            HarvestProgress::CloningStarted { jobs, concurrency } => {
                let len = jobs.unwrap_or(state.discovered) as u64;
                let pb = self.multi.add(ProgressBar::new(len));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:10}", "Cloning"));
                pb.set_message(format!("{} workers", concurrency));
                state.clone_bar = Some(pb);
            }

            HarvestProgress::Cloned { repo } => {
                state.cloned += 1;
                if let Some(ref pb) = state.clone_bar {
                    pb.inc(1);
                    pb.set_message(format!("✓ {}", repo));
                }
            }

            HarvestProgress::CloneSkipped { repo } => {
                state.skipped += 1;
                if let Some(ref pb) = state.clone_bar {
                    pb.inc(1);
                    pb.set_message(format!("· {} exists", repo));
                }
            }

            HarvestProgress::CloneFailed { repo, error } => {
                state.failed += 1;
                if let Some(ref pb) = state.clone_bar {
                    pb.inc(1);
                    pb.set_message(format!("✗ {}: {}", repo, error));
                }
            }

            HarvestProgress::CloningComplete {
                cloned,
                skipped,
                failed,
            } => {
                if let Some(ref pb) = state.clone_bar {
                    let msg = if failed > 0 {
                        format!("✓ {} cloned, {} skipped, {} failed", cloned, skipped, failed)
                    } else {
                        format!("✓ {} cloned, {} skipped", cloned, skipped)
                    };
                    pb.finish_with_message(msg);
                }
            }

            HarvestProgress::Throttled { wait_secs } => {
                let msg = format!("⏳ rate limited, retrying in {}s", wait_secs);
                let target = state
                    .watch_bar
                    .as_ref()
                    .or(state.discover_bar.as_ref())
                    .filter(|pb| !pb.is_finished())
                    .cloned();
                match target {
                    Some(pb) => pb.set_message(msg),
                    None => {
                        drop(state);
                        self.multi.println(msg).ok();
                    }
                }
            }

            HarvestProgress::WatchStarted {
                resources,
                duration_secs,
            } => {
                let pb = self.spinner("Watching");
                pb.set_message(format!(
                    "{} repositories for {}m",
                    resources,
                    duration_secs.div_ceil(60)
                ));
                state.watch_bar = Some(pb);
            }

            HarvestProgress::ResourceChanged {
                full_name,
                size_kb,
                stars,
                watchers,
                forks,
            } => {
                drop(state);
                self.multi
                    .println(format!(
                        "● {} size={}KB stars={} watchers={} forks={}",
                        full_name, size_kb, stars, watchers, forks
                    ))
                    .ok();
            }

            HarvestProgress::PollFailed { full_name, error } => {
                if let Some(ref pb) = state.watch_bar {
                    pb.set_message(format!("✗ {}: {}", full_name, error));
                }
            }

            HarvestProgress::WatchStopped { polls, changes } => {
                if let Some(ref pb) = state.watch_bar {
                    pb.finish_with_message(format!("✓ {} polls, {} changes", polls, changes));
                }
            }

            HarvestProgress::Warning { message } => {
                drop(state);
                self.multi.println(format!("⚠ {}", message)).ok();
            }

            _ => {}
        }
    }

    pub fn println(&self, message: &str) {
        self.multi.println(message).ok();
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Interrupted runs never see CloningComplete.
        if let Some(ref pb) = state.clone_bar
            && !pb.is_finished()
        {
            pb.finish_with_message(format!(
                "stopped: {} cloned, {} skipped, {} failed",
                state.cloned, state.skipped, state.failed
            ));
        }
        for pb in [&state.discover_bar, &state.clone_bar, &state.watch_bar]
            .into_iter()
            .flatten()
        {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
