//! Per-resource polling state and the session report.

use std::time::Duration;

use uuid::Uuid;

/// Lifecycle of one watched resource.
///
/// `Idle -> Polling -> (Changed | Unchanged) -> Polling -> ... -> Stopped`.
/// A failed poll returns the resource to `Idle` until it is due again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    Changed,
    Unchanged,
    Stopped,
}

/// Final tally for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    pub full_name: String,
    pub state: PollState,
    pub polls: usize,
    pub changes: usize,
    pub failures: usize,
}

impl ResourceReport {
    pub(crate) fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            state: PollState::Idle,
            polls: 0,
            changes: 0,
            failures: 0,
        }
    }
}

/// Outcome of a whole watch session.
#[derive(Debug, Clone)]
pub struct WatchReport {
    pub session_id: Uuid,
    pub resources: Vec<ResourceReport>,
    pub elapsed: Duration,
}

impl WatchReport {
    pub fn polls(&self) -> usize {
        self.resources.iter().map(|r| r.polls).sum()
    }

    pub fn changes(&self) -> usize {
        self.resources.iter().map(|r| r.changes).sum()
    }

    pub fn failures(&self) -> usize {
        self.resources.iter().map(|r| r.failures).sum()
    }

    pub fn all_stopped(&self) -> bool {
        self.resources.iter().all(|r| r.state == PollState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_totals() {
        let mut a = ResourceReport::new("a/a");
        a.polls = 3;
        a.changes = 1;
        a.state = PollState::Stopped;
        let mut b = ResourceReport::new("b/b");
        b.polls = 2;
        b.failures = 2;
        b.state = PollState::Stopped;

        let report = WatchReport {
            session_id: Uuid::new_v4(),
            resources: vec![a, b],
            elapsed: Duration::from_secs(60),
        };
        assert_eq!(report.polls(), 5);
        assert_eq!(report.changes(), 1);
        assert_eq!(report.failures(), 2);
        assert!(report.all_stopped());
    }

    #[test]
    fn test_new_resource_starts_idle() {
        assert_eq!(ResourceReport::new("a/a").state, PollState::Idle);
        assert_eq!(PollState::default(), PollState::Idle);
    }
}
