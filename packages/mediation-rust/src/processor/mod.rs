//! Lifecycle-managed message processors.
//!
//! A processor drains a message store in the background. Processors are
//! registered with a [`ProcessorRegistry`], initialized in registration
//! order when the environment starts, and destroyed in reverse order when
//! it shuts down.

pub mod registry;
pub mod resequence;

use std::any::Any;

use async_trait::async_trait;

use crate::environment::MediationEnvironment;

pub use registry::ProcessorRegistry;
pub use resequence::ResequencingProcessor;

/// A background consumer of a message store.
///
/// The `Any` bound enables typed lookup via [`ProcessorRegistry::get`].
#[async_trait]
pub trait MessageProcessor: Send + Sync + Any {
    /// Unique processor name.
    fn name(&self) -> &str;

    /// Resolve collaborators and start background work.
    async fn init(&self, env: &MediationEnvironment) -> anyhow::Result<()>;

    /// Stop background work and release collaborators.
    async fn destroy(&self) -> anyhow::Result<()>;

    /// Allow scheduled runs to process messages.
    fn activate(&self);

    /// Make scheduled runs return without touching the store.
    fn deactivate(&self);

    fn is_active(&self) -> bool;
}
