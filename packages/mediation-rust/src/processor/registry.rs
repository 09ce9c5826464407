use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::info;

use super::MessageProcessor;
use crate::environment::MediationEnvironment;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// ProcessorRegistry
// ---------------------------------------------------------------------------

struct Registered {
    processor: Arc<dyn MessageProcessor>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Registry for lifecycle-managed message processors.
///
/// Provides two lookup mechanisms:
/// - **By name** (`get_by_name`): the processor as `dyn MessageProcessor`
/// - **By name and type** (`get::<T>`): the concrete processor, for admin calls
///
/// Processors are initialized in registration order and destroyed in reverse order.
pub struct ProcessorRegistry {
    by_name: DashMap<String, Registered>,
    /// Registration order for deterministic init/destroy sequencing.
    init_order: RwLock<Vec<String>>,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Register a processor under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateProcessor`] if the name is taken.
    pub fn register<T: MessageProcessor>(&self, processor: T) -> Result<Arc<T>, ConfigError> {
        let name = processor.name().to_string();
        let arc = Arc::new(processor);
        match self.by_name.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ConfigError::DuplicateProcessor { name })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Registered {
                    processor: arc.clone(),
                    typed: arc.clone(),
                });
                self.init_order.write().push(name);
                Ok(arc)
            }
        }
    }

    /// Retrieve a processor by name, downcast to its concrete type.
    #[must_use]
    pub fn get<T: MessageProcessor>(&self, name: &str) -> Option<Arc<T>> {
        self.by_name
            .get(name)
            .and_then(|entry| entry.typed.clone().downcast::<T>().ok())
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn MessageProcessor>> {
        self.by_name.get(name).map(|entry| entry.processor.clone())
    }

    /// Processor names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.init_order.read().clone()
    }

    /// Initialize all registered processors in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `init()` failure; later processors are not initialized.
    pub async fn init_all(&self, env: &MediationEnvironment) -> anyhow::Result<()> {
        for name in &self.names() {
            if let Some(processor) = self.get_by_name(name) {
                processor.init(env).await?;
                info!(processor = %name, "message processor initialized");
            }
        }
        Ok(())
    }

    /// Destroy all registered processors in reverse registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if any processor's `destroy()` call fails.
    pub async fn destroy_all(&self) -> anyhow::Result<()> {
        for name in self.names().iter().rev() {
            if let Some(processor) = self.get_by_name(name) {
                processor.destroy().await?;
                info!(processor = %name, "message processor destroyed");
            }
        }
        Ok(())
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
