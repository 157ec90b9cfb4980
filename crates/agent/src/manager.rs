//! Registry of live contexts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::context::AgentContext;
use crate::services::AgentServices;

#[derive(Default)]
struct Registry {
    by_id: HashMap<String, Arc<AgentContext>>,
    order: Vec<String>,
}

/// Contexts by id, in creation order.
#[derive(Default)]
pub struct ContextManager {
    registry: RwLock<Registry>,
    counter: AtomicU64,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a context. An existing context with the same id
    /// is replaced and its task killed.
    pub async fn create(
        &self,
        services: Arc<AgentServices>,
        id: Option<String>,
        name: Option<String>,
    ) -> Arc<AgentContext> {
        let no = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let context = Arc::new(AgentContext::new(services, id, name, no));

        let replaced = {
            let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
            let id = context.id().to_string();
            let replaced = registry.by_id.insert(id.clone(), context.clone());
            if replaced.is_none() {
                registry.order.push(id);
            }
            replaced
        };

        if let Some(old) = replaced {
            info!(context = %old.id(), "Replacing existing context");
            old.kill_process().await;
        }
        info!(context = %context.id(), no, "Created context");
        context
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentContext>> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry.by_id.get(id).cloned()
    }

    /// The oldest live context.
    pub fn first(&self) -> Option<Arc<AgentContext>> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry.order.first().and_then(|id| registry.by_id.get(id)).cloned()
    }

    pub fn list(&self) -> Vec<Arc<AgentContext>> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry
            .order
            .iter()
            .filter_map(|id| registry.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.read().unwrap_or_else(|e| e.into_inner()).by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregister a context and kill its task.
    pub async fn remove(&self, id: &str) -> Option<Arc<AgentContext>> {
        let removed = {
            let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
            registry.order.retain(|existing| existing != id);
            registry.by_id.remove(id)
        };

        if let Some(context) = &removed {
            context.kill_process().await;
            info!(context = %id, "Removed context");
        }
        removed
    }
}
