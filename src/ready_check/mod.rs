//! Ready-check state machine
//!
//! pending -> confirming -> confirmed, or pending -> cancelled on decline,
//! timeout or disconnect.

pub mod check;
pub mod coordinator;

pub use check::{CancelReason, ReadyCheck, ReadyCheckState, ReadyMember};
pub use coordinator::{Cancellation, ReadyCheckCoordinator, ReadyCheckStats, ReadyOutcome};
