//! EntityModel trait — the leaf contract aggregators consume
//!
//! An entity model is a mutable, subscribable key→entity store. Aggregators
//! read its snapshot once, then follow its change batches. Writes go through
//! [`Operation`]s whose meaning belongs to the model, not to the aggregator.

use super::observe::{ChangeSet, Listener, Subscription};
use crate::entity::{Entity, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A write request applied to an entity model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    /// Insert a new entity; fails if the id is taken
    CreateEntity { entity: Entity },
    /// Replace an existing entity
    ModifyEntity { entity: Entity },
    DeleteEntity { id: EntityId },
}

impl Operation {
    pub fn create(entity: impl Into<Entity>) -> Self {
        Operation::CreateEntity {
            entity: entity.into(),
        }
    }

    pub fn modify(entity: impl Into<Entity>) -> Self {
        Operation::ModifyEntity {
            entity: entity.into(),
        }
    }

    pub fn delete(id: impl Into<EntityId>) -> Self {
        Operation::DeleteEntity { id: id.into() }
    }
}

/// Outcome of an applied operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationResult {
    /// Id of the entity created, if the operation created one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<EntityId>,
    /// Ids touched by the operation
    #[serde(default)]
    pub affected: Vec<EntityId>,
}

/// Errors raised by entity models
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model {0} is read-only")]
    ReadOnly(String),

    #[error("entity already exists: {0}")]
    DuplicateEntity(EntityId),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
}

/// Listener type for raw model changes
pub type ModelListener = Listener<Entity>;

/// The contract every entity model exposes to aggregators.
pub trait EntityModel: Send + Sync {
    /// Stable model identifier (typically an IRI-like path)
    fn id(&self) -> &str;

    /// Human label, used as the provenance tag name when present
    fn alias(&self) -> Option<&str> {
        None
    }

    /// Base IRI that relative entity IRIs are resolved against
    fn base_iri(&self) -> Option<&str> {
        None
    }

    /// Cache metadata: present when the model caches entities of an
    /// external lookup provider. The value is the provider configuration.
    fn cache_configuration(&self) -> Option<&serde_json::Value> {
        None
    }

    /// Whether [`EntityModel::execute_operation`] accepts writes
    fn is_writable(&self) -> bool {
        true
    }

    /// Current snapshot of all entities
    fn entities(&self) -> HashMap<EntityId, Entity>;

    /// Follow incremental `(updated, removed)` changes.
    fn subscribe_to_changes(&self, listener: ModelListener) -> Subscription;

    /// Apply a write. Listeners are notified before this returns.
    fn execute_operation(&self, operation: Operation) -> Result<OperationResult, ModelError>;
}

/// Convenience for notifying about a single batch
pub(crate) fn single_change(entity: Entity) -> ChangeSet<Entity> {
    let id = entity.id().to_string();
    ChangeSet::new(HashMap::from([(id, entity)]), Vec::new())
}
