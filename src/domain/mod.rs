pub mod indicator;
pub mod question;
pub mod scoring;
pub mod stats;
pub mod weights;

pub use indicator::Indicator;
pub use question::{QuestionType, Tier};

/// Sentinel for "no countable answer". It flows from option values through
/// per-question scores up to per-indicator scores and is always compared
/// exactly, never treated as a numeric score.
pub const NOT_APPLICABLE: f64 = -1.0;

/// Rounds to four decimal places, the precision every stored score uses.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
