//! Job handler -- a bounded pool of runner slots fed from a FIFO queue.
//!
//! Split into focused submodules:
//! - `core`: JobHandler struct, constructor, submission, and accessor methods
//! - `scheduling`: moving queued jobs into free slots
//! - `collection`: harvesting finished runners, failure bookkeeping, and termination

mod collection;
mod core;
mod scheduling;

pub use self::core::JobHandler;
