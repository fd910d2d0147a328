//! Adaptive request pacing.
//!
//! [`ThrottleController`] owns the delay between items. Time comes from a
//! [`Clock`] so the control loop can be driven deterministically in tests.

mod clock;
mod throttle;

pub use clock::{Clock, TokioClock};
pub use throttle::{PacingOutcome, ThrottleController, ThrottleState, ThrottleStats};
