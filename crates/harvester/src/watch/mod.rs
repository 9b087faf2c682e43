//! Continuous change watching.
//!
//! A [`WatchSession`] polls each watched repository every polling interval
//! for a bounded duration and appends a [`ChangeRecord`] whenever its
//! counters or `updated_at` move.

mod poll;
mod session;
mod state;

pub use poll::{ChangeRecord, PollOutcome, poll_resource};
pub use session::{DEFAULT_MAX_IN_FLIGHT, WatchSession};
pub use state::{PollState, ResourceReport, WatchReport};
