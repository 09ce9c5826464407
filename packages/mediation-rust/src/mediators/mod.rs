//! Built-in mediation steps and the registry that builds them from configuration.

pub mod drop;
pub mod log;
pub mod property;
pub mod registry;
pub mod store;

pub use self::drop::DropMediator;
pub use self::log::{LogLevel, LogMediator};
pub use self::property::{PropertyAction, PropertyMediator};
pub use self::registry::{BuildContext, SequenceConfig, StepConfig, StepFactory, StepRegistry};
pub use self::store::StoreMediator;
