//! Shared view for aggregators wrapping exactly one entity model
//!
//! Rewrites every entity of the model with absolute IRIs, wraps it with the
//! aggregator's provenance tag and forwards the same update/removal set.

use super::lock;
use super::traits::{
    AggregatedChanges, AggregatorId, AggregatorListener, ExternalEntityWrapped, FrameDetail,
    LocalEntityWrapped, ProvenanceFrame, ProvenanceTag,
};
use crate::entity::{absolutize_entity, Entity, EntityId};
use crate::model::{ChangeSet, EntityModel, Observers, Subscription};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub(crate) struct LeafView {
    aggregator: AggregatorId,
    tag: ProvenanceTag,
    base_iri: Option<String>,
    read_only: bool,
    entities: Mutex<HashMap<EntityId, LocalEntityWrapped>>,
    observers: Observers<LocalEntityWrapped>,
}

impl LeafView {
    /// Load the model snapshot and follow its changes. The view lives as
    /// long as the returned subscription keeps it registered.
    pub(crate) fn attach(
        aggregator: AggregatorId,
        model: &Arc<dyn EntityModel>,
        default_name: &str,
    ) -> (Arc<Self>, Subscription) {
        let view = Arc::new(Self {
            aggregator,
            tag: ProvenanceTag::new(model.alias().unwrap_or(default_name)),
            base_iri: model.base_iri().map(str::to_string),
            read_only: !model.is_writable(),
            entities: Mutex::new(HashMap::new()),
            observers: Observers::new(),
        });
        view.apply(&ChangeSet::new(model.entities(), Vec::new()));

        let weak = Arc::downgrade(&view);
        let subscription = model.subscribe_to_changes(Arc::new(move |changes: &ChangeSet<Entity>| {
            if let Some(view) = weak.upgrade() {
                view.apply(changes);
            }
        }));
        (view, subscription)
    }

    fn wrap(&self, entity: &Entity) -> LocalEntityWrapped {
        LocalEntityWrapped::new(
            absolutize_entity(entity.clone(), self.base_iri.as_deref()),
            self.read_only,
            vec![self.tag.clone()],
        )
    }

    fn apply(&self, changes: &ChangeSet<Entity>) {
        let updated: HashMap<EntityId, LocalEntityWrapped> = changes
            .updated
            .iter()
            .map(|(id, entity)| (id.clone(), self.wrap(entity)))
            .collect();
        {
            let mut entities = lock(&self.entities);
            for id in &changes.removed {
                entities.remove(id);
            }
            for (id, wrapped) in &updated {
                entities.insert(id.clone(), wrapped.clone());
            }
        }
        debug!(
            aggregator = %self.aggregator,
            updated = updated.len(),
            removed = changes.removed.len(),
            "model changes applied"
        );
        self.observers
            .notify(&AggregatedChanges::new(updated, changes.removed.clone()));
    }

    pub(crate) fn get(&self, id: &str) -> Option<LocalEntityWrapped> {
        lock(&self.entities).get(id).cloned()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        lock(&self.entities).contains_key(id)
    }

    pub(crate) fn snapshot(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        lock(&self.entities).clone()
    }

    /// Find a local class-like entity by IRI
    pub(crate) fn class_by_iri(&self, iri: &str) -> Option<LocalEntityWrapped> {
        lock(&self.entities)
            .values()
            .find(|w| w.aggregated_entity.is_class_like() && w.aggregated_entity.iri() == Some(iri))
            .cloned()
    }

    pub(crate) fn subscribe(&self, listener: AggregatorListener) -> Subscription {
        self.observers.subscribe(listener)
    }

    /// Every local entity wrapped as an external result, sorted by id.
    pub(crate) fn all_as_external(&self) -> Vec<ExternalEntityWrapped> {
        let mut all: Vec<ExternalEntityWrapped> = lock(&self.entities)
            .values()
            .map(|local| ExternalEntityWrapped::from_local(local, self.source_frame()))
            .collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Wrap an entity that does not (yet) live in the model.
    pub(crate) fn external(&self, entity: Entity) -> ExternalEntityWrapped {
        ExternalEntityWrapped::new(
            absolutize_entity(entity, self.base_iri.as_deref()),
            vec![self.tag.clone()],
        )
        .with_frame(self.source_frame())
    }

    pub(crate) fn source_frame(&self) -> ProvenanceFrame {
        ProvenanceFrame::new(self.aggregator.clone(), FrameDetail::Source)
    }
}
