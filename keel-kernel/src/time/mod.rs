//! Time-triggered wakeups.
//!
//! # Sections
//!
//! - [`bell`]: a bell is a waiting room with an expiry; sleepers park in
//!   it until it rings.
//! - [`bellringer`]: the delta queue of pending bells, advanced once per
//!   timer tick.
//! - [`tick`]: the periodic timer gate whose epilogue preempts through
//!   `resume` and, on the tick owner, advances the bellringer.

pub mod bell;
pub mod bellringer;
pub(crate) mod tick;

/// Milliseconds per timer tick. The platform timer must be programmed to
/// this period.
pub const TICK_MS: usize = 1;
