//! Shared fixtures for aggregator integration tests
//!
//! Vocabulary builders, a change recorder, and a small FOAF-like lookup
//! provider configuration.

#![allow(dead_code)]

use semantic_aggregator::aggregator::{AggregatedChanges, AggregatorListener};
use semantic_aggregator::{Class, Entity, EntityModel, Generalization, InMemoryEntityModel};
use std::sync::{Arc, Mutex};

pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";

pub fn foaf(local: &str) -> String {
    format!("{}{}", FOAF, local)
}

pub fn class(id: &str, name: &str) -> Entity {
    Class::new(id).with_name("en", name).into()
}

/// A provider class: its id is its IRI
pub fn foaf_class(local: &str) -> Entity {
    Class::new(foaf(local)).with_iri(foaf(local)).with_name("en", local).into()
}

/// Provider configuration with Agent > Person
pub fn foaf_configuration() -> serde_json::Value {
    serde_json::json!({
        "entities": [
            foaf_class("Agent"),
            foaf_class("Person"),
            Entity::from(Generalization::new("person-agent", foaf("Person"), foaf("Agent"))),
        ]
    })
}

pub fn shared(model: InMemoryEntityModel) -> (Arc<InMemoryEntityModel>, Arc<dyn EntityModel>) {
    let model = Arc::new(model);
    let dyn_model: Arc<dyn EntityModel> = model.clone();
    (model, dyn_model)
}

/// Collects every change batch an aggregator publishes.
#[derive(Clone, Default)]
pub struct Recorder {
    batches: Arc<Mutex<Vec<AggregatedChanges>>>,
}

impl Recorder {
    pub fn listener(&self) -> AggregatorListener {
        let batches = self.batches.clone();
        Arc::new(move |changes: &AggregatedChanges| batches.lock().unwrap().push(changes.clone()))
    }

    pub fn take(&self) -> Vec<AggregatedChanges> {
        std::mem::take(&mut *self.batches.lock().unwrap())
    }
}

pub fn sorted_ids<V>(entities: std::collections::HashMap<String, V>) -> Vec<String> {
    let mut ids: Vec<String> = entities.into_keys().collect();
    ids.sort();
    ids
}
