//! Segment planning and assignment.
//!
//! Splits a task's byte range into piece-aligned segments, tracks which ones
//! are assigned to in-flight commands, and keeps a completion bitfield that
//! is persisted in the control file.

mod bitmap;
mod range;
mod tracker;

pub use bitmap::Bitfield;
pub use range::{plan_pieces, plan_segments, Segment};
pub use tracker::SegmentTracker;
