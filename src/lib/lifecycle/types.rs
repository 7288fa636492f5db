use std::sync::Arc;

use crate::lib::engine::types::{ContainerHandle, Engine};

/// Creates and starts the stack's containers and remembers what it made.
pub struct Lifecycle {
    pub engine: Arc<dyn Engine>,
    /// Containers whose create call succeeded, in creation order.
    pub handles: Vec<ContainerHandle>,
}
