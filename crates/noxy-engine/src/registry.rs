use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use noxy_core::{
    ActionDefinition, BridgeError, ClientMessage, ContextDefinition, SessionHost, SessionId,
};

/// Context key under which the action set is mirrored into the session.
pub const ACTIONS_CONTEXT_KEY: &str = "Actions";
/// Context key under which the context set is mirrored into the session.
pub const CONTEXTS_CONTEXT_KEY: &str = "Contexts";

/// Something a [`Registry`] can hold and mirror into the session.
pub trait RegistryEntry: Clone + Send + Sync + 'static {
    /// Label used in logs.
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// The declarative message replacing the session's copy of the set.
    fn snapshot_message(session_id: SessionId, entries: Vec<Self>) -> ClientMessage;
}

impl RegistryEntry for ActionDefinition {
    const KIND: &'static str = "action";

    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot_message(session_id: SessionId, actions: Vec<Self>) -> ClientMessage {
        ClientMessage::UpdateActions {
            session_id,
            context_key: ACTIONS_CONTEXT_KEY.into(),
            actions,
        }
    }
}

impl RegistryEntry for ContextDefinition {
    const KIND: &'static str = "context";

    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot_message(session_id: SessionId, contexts: Vec<Self>) -> ClientMessage {
        ClientMessage::UpdateContexts {
            session_id,
            context_key: CONTEXTS_CONTEXT_KEY.into(),
            contexts,
        }
    }
}

/// Name-keyed set whose every successful mutation pushes a full snapshot
/// to the session.
///
/// Adding an existing name is rejected rather than overwritten, and a
/// rejected mutation emits nothing.
pub struct Registry<T: RegistryEntry> {
    entries: DashMap<String, T>,
    session: Arc<dyn SessionHost>,
}

impl<T: RegistryEntry> Registry<T> {
    pub fn new(session: Arc<dyn SessionHost>) -> Self {
        Self {
            entries: DashMap::new(),
            session,
        }
    }

    pub fn add(&self, entry: T) -> Result<(), BridgeError> {
        let name = entry.name().to_string();
        if name.trim().is_empty() {
            return Err(BridgeError::invalid(format!("{} name is required", T::KIND)));
        }

        match self.entries.entry(name.clone()) {
            Entry::Occupied(_) => return Err(BridgeError::DuplicateName(name)),
            Entry::Vacant(slot) => {
                let _ = slot.insert(entry);
            }
        }

        info!(kind = T::KIND, name = %name, total = self.entries.len(), "registered");
        self.emit_snapshot();
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<T, BridgeError> {
        if name.trim().is_empty() {
            return Err(BridgeError::invalid(format!("{} name is required", T::KIND)));
        }

        let (_, removed) = self
            .entries
            .remove(name)
            .ok_or_else(|| BridgeError::NotFound(name.to_string()))?;

        info!(kind = T::KIND, name, total = self.entries.len(), "removed");
        self.emit_snapshot();
        Ok(removed)
    }

    /// Current entries, sorted by name.
    pub fn snapshot(&self) -> Vec<T> {
        let mut entries: Vec<T> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    pub fn get(&self, name: &str) -> Option<T> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry without notifying the session.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn emit_snapshot(&self) {
        let message = T::snapshot_message(self.session.session_id().clone(), self.snapshot());
        self.session.send(message);
    }
}

pub type ActionRegistry = Registry<ActionDefinition>;
pub type ContextRegistry = Registry<ContextDefinition>;
