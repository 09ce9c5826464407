//! Resequencing: release stored messages strictly by sequence number.

pub mod job;
pub mod processor;
pub mod state;

pub use job::{CycleOutcome, JobSettings, ResequencingJob};
pub use processor::ResequencingProcessor;
pub use state::{Lifecycle, ResequencerState, UNINITIALIZED};
