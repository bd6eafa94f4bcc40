//! Quantity domain: rounding and the commit rule.

pub mod quantity;
pub mod rules;

pub use quantity::{quantity_at, raw_quantity, rounded_quantity};
pub use rules::{apply_sample, commit_pending, SampleOutcome};
