//! Pure functions with no backend dependency: refund arithmetic and closing-deadline math.
//!
//! Everything in this module is deterministic and side-effect free, so the same code answers "what does this
//! return pay out" and "is this package closed" on the read path, in the sweep worker and in unit tests.

mod expiry;
mod refund;

pub use expiry::{countdown, is_closed, Countdown};
pub use refund::{calculate_refund, RefundBreakdown, RefundInputs};
