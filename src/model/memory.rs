//! InMemoryEntityModel: a DashMap-backed entity model
//!
//! Used by the CLI workspace loader and throughout the tests. Every applied
//! operation is announced to subscribers before `execute_operation` returns.

use super::observe::{ChangeSet, Observers, Subscription};
use super::traits::{single_change, EntityModel, ModelError, ModelListener, Operation, OperationResult};
use crate::entity::{Entity, EntityId};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::trace;

/// Mutable, subscribable in-memory entity store
pub struct InMemoryEntityModel {
    id: String,
    alias: Option<String>,
    base_iri: Option<String>,
    cache_configuration: Option<serde_json::Value>,
    writable: bool,
    entities: DashMap<EntityId, Entity>,
    observers: Observers<Entity>,
}

impl InMemoryEntityModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            base_iri: None,
            cache_configuration: None,
            writable: true,
            entities: DashMap::new(),
            observers: Observers::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Self {
        self.base_iri = Some(base_iri.into());
        self
    }

    /// Mark this model as a cache of an external lookup provider.
    pub fn with_cache_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.cache_configuration = Some(configuration);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Seed an entity without notifying (construction time only).
    pub fn with_entity(self, entity: impl Into<Entity>) -> Self {
        let entity = entity.into();
        self.entities.insert(entity.id().to_string(), entity);
        self
    }

    pub fn with_entities<I, E>(self, entities: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Entity>,
    {
        for entity in entities {
            let entity = entity.into();
            self.entities.insert(entity.id().to_string(), entity);
        }
        self
    }

    /// Upsert an entity and notify, bypassing the writability check.
    pub fn put(&self, entity: impl Into<Entity>) {
        let entity = entity.into();
        self.entities.insert(entity.id().to_string(), entity.clone());
        self.observers.notify(&single_change(entity));
    }

    /// Remove an entity and notify, bypassing the writability check.
    pub fn remove(&self, id: &str) -> Option<Entity> {
        let removed = self.entities.remove(id).map(|(_, entity)| entity);
        if removed.is_some() {
            self.observers
                .notify(&ChangeSet::new(HashMap::new(), vec![id.to_string()]));
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Entity> {
        self.entities.get(id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityModel for InMemoryEntityModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    fn base_iri(&self) -> Option<&str> {
        self.base_iri.as_deref()
    }

    fn cache_configuration(&self) -> Option<&serde_json::Value> {
        self.cache_configuration.as_ref()
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn entities(&self) -> HashMap<EntityId, Entity> {
        self.entities
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    fn subscribe_to_changes(&self, listener: ModelListener) -> Subscription {
        self.observers.subscribe(listener)
    }

    fn execute_operation(&self, operation: Operation) -> Result<OperationResult, ModelError> {
        if !self.writable {
            return Err(ModelError::ReadOnly(self.id.clone()));
        }
        trace!(model = %self.id, ?operation, "executing operation");
        match operation {
            Operation::CreateEntity { entity } => {
                let id = entity.id().to_string();
                if self.entities.contains_key(&id) {
                    return Err(ModelError::DuplicateEntity(id));
                }
                self.put(entity);
                Ok(OperationResult {
                    created: Some(id.clone()),
                    affected: vec![id],
                })
            }
            Operation::ModifyEntity { entity } => {
                let id = entity.id().to_string();
                if !self.entities.contains_key(&id) {
                    return Err(ModelError::EntityNotFound(id));
                }
                self.put(entity);
                Ok(OperationResult {
                    created: None,
                    affected: vec![id],
                })
            }
            Operation::DeleteEntity { id } => match self.remove(&id) {
                Some(_) => Ok(OperationResult {
                    created: None,
                    affected: vec![id],
                }),
                None => Err(ModelError::EntityNotFound(id)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Class;
    use std::sync::{Arc, Mutex};

    #[test]
    fn create_notifies_subscribers() {
        let model = InMemoryEntityModel::new("m");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = model.subscribe_to_changes(Arc::new(move |changes: &ChangeSet<Entity>| {
            sink.lock()
                .unwrap()
                .extend(changes.updated.keys().cloned());
        }));

        let result = model
            .execute_operation(Operation::create(Class::new("c1")))
            .unwrap();

        assert_eq!(result.created.as_deref(), Some("c1"));
        assert_eq!(*seen.lock().unwrap(), vec!["c1".to_string()]);
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let model = InMemoryEntityModel::new("m").with_entity(Class::new("c1"));
        let err = model
            .execute_operation(Operation::create(Class::new("c1")))
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateEntity(id) if id == "c1"));
    }

    #[test]
    fn delete_reports_removal() {
        let model = InMemoryEntityModel::new("m").with_entity(Class::new("c1"));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let sink = removed.clone();
        let _sub = model.subscribe_to_changes(Arc::new(move |changes: &ChangeSet<Entity>| {
            sink.lock().unwrap().extend(changes.removed.iter().cloned());
        }));

        model.execute_operation(Operation::delete("c1")).unwrap();

        assert!(model.is_empty());
        assert_eq!(*removed.lock().unwrap(), vec!["c1".to_string()]);
        assert!(model.execute_operation(Operation::delete("c1")).is_err());
    }

    #[test]
    fn read_only_model_rejects_writes() {
        let model = InMemoryEntityModel::new("m").read_only();
        assert!(!model.is_writable());
        let err = model
            .execute_operation(Operation::create(Class::new("c1")))
            .unwrap_err();
        assert!(matches!(err, ModelError::ReadOnly(_)));
    }
}
