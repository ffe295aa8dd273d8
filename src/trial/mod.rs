//! Trial recording
//!
//! A [`TrialSession`] timestamps behaviors against a monotonic clock while a
//! background [`ElapsedTicker`] refreshes the display value. The [`Laboratory`]
//! wires a session to a subject registry and an experiment store.

pub mod clock;
pub mod laboratory;
pub mod session;
pub mod ticker;

pub use crate::types::TrialStatus;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use laboratory::Laboratory;
pub use session::TrialSession;
pub use ticker::ElapsedTicker;
