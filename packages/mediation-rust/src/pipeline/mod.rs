//! Sequence pipeline and fault handling.
//!
//! - [`mediate_steps`]: the generic "run steps until one says stop" rule
//! - [`Sequence`]: a named/anonymous definition or a reference to one
//! - [`dispatch_fault`] / [`mediate_with_fault_handling`]: hand a failed
//!   message to the handler on top of its fault stack

pub mod fault;
pub mod list;
pub mod sequence;

pub use fault::{dispatch_fault, mediate_with_fault_handling, ERROR_CODE, ERROR_DETAIL, ERROR_MESSAGE};
pub use list::mediate_steps;
pub use sequence::{Sequence, SequenceDefinition};
