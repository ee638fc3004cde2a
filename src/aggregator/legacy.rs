//! LegacyLookupAggregator: an entity model acting as a cache of an external
//! lookup provider
//!
//! Queries go to the provider. Materializing a provider entity copies it into
//! the cache model together with the minimal generalization path that links
//! it to the local entity it was reached from, so the model never holds a
//! relationship referencing an absent class.

use super::leaf::LeafView;
use super::traits::{
    AggregatorError, AggregatorId, AggregatorListener, AggregatorResult, ExternalEntityWrapped,
    FrameDetail, LocalEntityWrapped, SemanticModelAggregator,
};
use crate::entity::{Entity, EntityId, Generalization, Relationship};
use crate::lookup::LookupProvider;
use crate::model::{EntityModel, Operation, OperationResult, Subscription};
use crate::query::{GeneralizationIndex, PathQuery, PathResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TAG: &str = "Legacy";

/// Aggregator over a cache model plus the provider it caches
pub struct LegacyLookupAggregator {
    id: AggregatorId,
    model: Arc<dyn EntityModel>,
    provider: Arc<dyn LookupProvider>,
    view: Arc<LeafView>,
    _subscription: Subscription,
}

impl LegacyLookupAggregator {
    pub fn new(model: Arc<dyn EntityModel>, provider: Arc<dyn LookupProvider>) -> Self {
        let id = AggregatorId::new();
        let (view, subscription) = LeafView::attach(id.clone(), &model, DEFAULT_TAG);
        Self {
            id,
            model,
            provider,
            view,
            _subscription: subscription,
        }
    }

    fn wrap_all(&self, entities: Vec<Entity>) -> Vec<ExternalEntityWrapped> {
        entities.into_iter().map(|e| self.view.external(e)).collect()
    }

    fn expect_source(&self, entity: &mut ExternalEntityWrapped) -> AggregatorResult<()> {
        match entity.take_frame(&self.id)? {
            FrameDetail::Source => Ok(()),
            other => Err(AggregatorError::UnexpectedFrame(other)),
        }
    }

    fn local_iri(&self, id: &str) -> AggregatorResult<String> {
        let local = self
            .view
            .get(id)
            .ok_or_else(|| AggregatorError::NotLocal(id.to_string()))?;
        local
            .aggregated_entity
            .iri()
            .map(str::to_string)
            .ok_or_else(|| AggregatorError::MissingIri(id.to_string()))
    }

    async fn provider_hierarchy(&self, id: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let iri = self.local_iri(id)?;
        let hierarchy = self.provider.full_hierarchy(&iri).await?;
        Ok(self.wrap_all(hierarchy))
    }

    /// Find or create the local copy of a provider class, matched by IRI.
    fn ensure_class(&self, class: &Entity) -> AggregatorResult<LocalEntityWrapped> {
        if !matches!(class, Entity::Class(_)) {
            return Err(AggregatorError::UnsupportedEntity {
                operation: "materialize class",
                kind: class.kind(),
            });
        }
        let iri = class
            .iri()
            .ok_or_else(|| AggregatorError::MissingIri(class.id().to_string()))?;
        if let Some(local) = self.view.class_by_iri(iri) {
            return Ok(local);
        }
        let result = self.model.execute_operation(Operation::create(class.clone()))?;
        let id = result.created.unwrap_or_else(|| class.id().to_string());
        debug!(aggregator = %self.id, id = %id, iri, "class materialized");
        self.view
            .get(&id)
            .ok_or(AggregatorError::EntityNotFound(id))
    }

    fn ensure_generalization(&self, edge: &Generalization, child: &str, parent: &str) -> AggregatorResult<()> {
        let exists = self.view.snapshot().values().any(|w| {
            matches!(&w.aggregated_entity, Entity::Generalization(g) if g.child == child && g.parent == parent)
        });
        if exists {
            return Ok(());
        }
        let mut generalization = Generalization::new(edge.id.clone(), child, parent);
        generalization.iri = edge.iri.clone();
        self.model.execute_operation(Operation::create(generalization))?;
        Ok(())
    }

    /// Copy every class and generalization of `path`. Returns the mapping
    /// from provider ids to local ids.
    fn copy_path(&self, path: &PathResult) -> AggregatorResult<HashMap<EntityId, EntityId>> {
        let mut local_ids = HashMap::new();
        for class in &path.path {
            let local = self.ensure_class(class)?;
            local_ids.insert(class.id().to_string(), local.id().to_string());
        }
        for edge in &path.edges {
            let (Some(child), Some(parent)) = (local_ids.get(&edge.child), local_ids.get(&edge.parent)) else {
                return Err(AggregatorError::EntityNotFound(edge.id.clone()));
            };
            self.ensure_generalization(edge, child, parent)?;
        }
        Ok(local_ids)
    }

    /// Shortest generalization path between `from` and `target`, in
    /// whichever direction one exists.
    fn find_path(
        index: &GeneralizationIndex<'_>,
        from: &str,
        target: &str,
        upward_first: bool,
    ) -> Option<PathResult> {
        let mut candidates = [(from, target), (target, from)];
        if !upward_first {
            candidates.swap(0, 1);
        }
        candidates
            .into_iter()
            .map(|(lower, upper)| PathQuery::between(lower, upper).execute(index))
            .find(|path| path.found)
    }

    async fn materialize_relationship(
        &self,
        from_entity_id: &str,
        relationship: &Relationship,
    ) -> AggregatorResult<LocalEntityWrapped> {
        if let Some(iri) = relationship.iri.as_deref() {
            let existing = self
                .view
                .snapshot()
                .into_values()
                .find(|w| w.aggregated_entity.is_relationship_like() && w.aggregated_entity.iri() == Some(iri));
            if let Some(existing) = existing {
                return Ok(existing);
            }
        }

        let from_iri = self.local_iri(from_entity_id)?;
        let hierarchy = self.provider.full_hierarchy(&from_iri).await?;
        let index = GeneralizationIndex::build(&hierarchy);
        let from = index
            .by_iri(&from_iri)
            .ok_or_else(|| AggregatorError::EntityNotFound(from_iri.clone()))?;

        // The anchored end is the one whose concept is the origin or one of its ancestors.
        let anchored = relationship.ends.iter().enumerate().find_map(|(i, end)| {
            let concept = end.concept.as_deref()?;
            let path = PathQuery::between(from.id(), concept).execute(&index);
            path.found.then_some((i, path))
        });
        let Some((anchor, path)) = anchored else {
            return Err(AggregatorError::EntityNotFound(relationship.id.clone()));
        };
        let mut local_ids = self.copy_path(&path)?;

        let other = &relationship.ends[1 - anchor];
        if let Some(concept) = other.concept.as_deref() {
            if !local_ids.contains_key(concept) {
                let anchor_iri = path
                    .path
                    .last()
                    .and_then(|e| e.iri())
                    .ok_or_else(|| AggregatorError::MissingIri(relationship.id.clone()))?;
                let neighbours = self.provider.surroundings(anchor_iri).await?;
                let class = neighbours
                    .iter()
                    .chain(hierarchy.iter())
                    .find(|e| e.id() == concept)
                    .ok_or_else(|| AggregatorError::EntityNotFound(concept.to_string()))?;
                let local = self.ensure_class(class)?;
                local_ids.insert(concept.to_string(), local.id().to_string());
            }
        }

        let mut local = relationship.clone();
        for end in local.ends.iter_mut() {
            if let Some(concept) = end.concept.take() {
                end.concept = Some(local_ids.get(&concept).cloned().unwrap_or(concept));
            }
        }
        let result = self.model.execute_operation(Operation::create(local))?;
        let id = result.created.unwrap_or_else(|| relationship.id.clone());
        debug!(aggregator = %self.id, id = %id, from = from_entity_id, "relationship materialized");
        self.view.get(&id).ok_or(AggregatorError::EntityNotFound(id))
    }
}

#[async_trait]
impl SemanticModelAggregator for LegacyLookupAggregator {
    fn id(&self) -> &AggregatorId {
        &self.id
    }

    async fn search(&self, query: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let found = self.provider.search(query).await?;
        Ok(self.wrap_all(found))
    }

    async fn get_surroundings(&self, id: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let iri = match self.view.get(id) {
            Some(local) => local.aggregated_entity.iri().unwrap_or(id).to_string(),
            None => id.to_string(),
        };
        let surroundings = self.provider.surroundings(&iri).await?;
        Ok(self.wrap_all(surroundings))
    }

    async fn get_hierarchy(&self, id: &str) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        self.provider_hierarchy(id).await.map(Some)
    }

    async fn get_hierarchy_for_lookup(
        &self,
        id: &str,
    ) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        if !self.view.contains(id) {
            return Ok(None);
        }
        self.provider_hierarchy(id).await.map(Some)
    }

    async fn external_entity_to_local_for_search(
        &self,
        mut entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.expect_source(&mut entity)?;
        self.ensure_class(&entity.aggregated_entity)
    }

    async fn external_entity_to_local_for_surroundings(
        &self,
        from_entity_id: &str,
        mut entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.expect_source(&mut entity)?;
        match &entity.aggregated_entity {
            Entity::Relationship(relationship) => {
                self.materialize_relationship(from_entity_id, relationship).await
            }
            Entity::Class(_) => {
                self.materialize_in_hierarchy(from_entity_id, &entity.aggregated_entity, true)
                    .await
            }
            other => Err(AggregatorError::UnsupportedEntity {
                operation: "materialize surroundings",
                kind: other.kind(),
            }),
        }
    }

    async fn external_entity_to_local_for_hierarchy_extension(
        &self,
        from_entity_id: &str,
        mut entity: ExternalEntityWrapped,
        is_entity_more_general: bool,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.expect_source(&mut entity)?;
        self.materialize_in_hierarchy(
            from_entity_id,
            &entity.aggregated_entity,
            is_entity_more_general,
        )
        .await
    }

    fn exec_operation(&self, operation: Operation) -> AggregatorResult<OperationResult> {
        Ok(self.model.execute_operation(operation)?)
    }

    fn get_local_entity(&self, id: &str) -> Option<LocalEntityWrapped> {
        self.view.get(id)
    }

    fn subscribe_to_changes(&self, listener: AggregatorListener) -> Subscription {
        self.view.subscribe(listener)
    }

    fn get_aggregated_entities(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        self.view.snapshot()
    }
}

impl LegacyLookupAggregator {
    /// Copy `target` plus the generalization chain linking it to the local
    /// entity `from_entity_id`. Without a chain only the class is copied.
    async fn materialize_in_hierarchy(
        &self,
        from_entity_id: &str,
        target: &Entity,
        is_entity_more_general: bool,
    ) -> AggregatorResult<LocalEntityWrapped> {
        let from_iri = self.local_iri(from_entity_id)?;
        let hierarchy = self.provider.full_hierarchy(&from_iri).await?;
        let index = GeneralizationIndex::build(&hierarchy);

        let path = match (index.by_iri(&from_iri), target.iri().and_then(|iri| index.by_iri(iri))) {
            (Some(from), Some(found)) => Self::find_path(&index, from.id(), found.id(), is_entity_more_general),
            _ => None,
        };
        let Some(path) = path else {
            debug!(aggregator = %self.id, target = target.id(), "no generalization path, copying class only");
            return self.ensure_class(target);
        };
        self.copy_path(&path)?;
        self.ensure_class(target)
    }
}
