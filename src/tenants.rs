//! Tenant-scoped state.
//!
//! The registry maps a tenant id to its [`TenantSlot`]. The map lock is
//! held only to look up or insert a slot; everything else synchronises on
//! the slot's own locks:
//!
//! - `index`: readers clone the current `Arc<TenantIndex>`; publishing a
//!   rebuilt index is one write-lock swap.
//! - `build_lock`: serialises rebuilds of the same tenant.
//! - `conversation`: held only to snapshot the state at the start of a turn
//!   and to swap in the successor after it, never across a collaborator
//!   call. Turns of one tenant overlap freely; each replacement is whole.
//! - `log`: the tenant's interaction history.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use docchat_core::conversation::{ConversationState, ConversationTracker};
use docchat_core::index::TenantIndex;
use docchat_core::interactions::InteractionLog;

#[derive(Default)]
pub struct TenantSlot {
    index: RwLock<Option<Arc<TenantIndex>>>,
    pub build_lock: tokio::sync::Mutex<()>,
    conversation: Mutex<ConversationTracker>,
    pub log: InteractionLog,
}

impl TenantSlot {
    /// The currently published index, if any.
    pub fn index(&self) -> Option<Arc<TenantIndex>> {
        match self.index.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the published index. Returns the previous one.
    pub fn publish(&self, index: Arc<TenantIndex>) -> Option<Arc<TenantIndex>> {
        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.replace(index)
    }

    /// Copy of the tenant's conversation state.
    pub fn conversation(&self) -> ConversationState {
        self.tracker().snapshot()
    }

    /// Swap in the state that follows a successful turn.
    pub fn replace_conversation(&self, next: ConversationState) {
        self.tracker().replace(next);
    }

    fn tracker(&self) -> MutexGuard<'_, ConversationTracker> {
        match self.conversation.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Default)]
pub struct TenantRegistry {
    slots: RwLock<HashMap<String, Arc<TenantSlot>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing slot for `tenant`, if it has ever been set up.
    pub fn get(&self, tenant: &str) -> Option<Arc<TenantSlot>> {
        let slots = match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.get(tenant).cloned()
    }

    /// Slot for `tenant`, created empty on first use.
    pub fn get_or_create(&self, tenant: &str) -> Arc<TenantSlot> {
        if let Some(slot) = self.get(tenant) {
            return slot;
        }
        let mut slots = match self.slots.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(TenantSlot::default()))
            .clone()
    }

    /// Ids of tenants with a slot, sorted.
    pub fn tenant_ids(&self) -> Vec<String> {
        let slots = match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ids: Vec<String> = slots.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = TenantRegistry::new();
        assert!(registry.get("acme").is_none());
        let a = registry.get_or_create("acme");
        let b = registry.get_or_create("acme");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.index().is_none());
        assert_eq!(registry.tenant_ids(), vec!["acme".to_string()]);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let registry = TenantRegistry::new();
        let acme = registry.get_or_create("acme");
        let globex = registry.get_or_create("globex");
        acme.log.record("q", "a", 0.5, "t", docchat_core::models::TurnOutcome::Answered);
        assert_eq!(acme.log.len(), 1);
        assert!(globex.log.is_empty());

        acme.replace_conversation(ConversationState {
            last_query: Some("refunds?".into()),
            ..ConversationState::default()
        });
        assert!(acme.conversation().is_active());
        assert!(!globex.conversation().is_active());
    }
}
