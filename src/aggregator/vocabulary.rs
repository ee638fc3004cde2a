//! VocabularyAggregator: one entity model, re-exposed as is
//!
//! A vocabulary is ground truth: it has no hierarchy resolution of its own,
//! so surroundings and hierarchy queries return the whole aggregated set.

use super::leaf::LeafView;
use super::traits::{
    AggregatorId, AggregatorListener, AggregatorResult, AggregatorError, ExternalEntityWrapped,
    LocalEntityWrapped, SemanticModelAggregator,
};
use crate::entity::EntityId;
use crate::model::{EntityModel, Operation, OperationResult, Subscription};
use crate::query::NameQuery;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_TAG: &str = "Vocabulary";

/// Aggregator wrapping exactly one entity model
pub struct VocabularyAggregator {
    id: AggregatorId,
    model: Arc<dyn EntityModel>,
    view: Arc<LeafView>,
    _subscription: Subscription,
}

impl VocabularyAggregator {
    pub fn new(model: Arc<dyn EntityModel>) -> Self {
        let id = AggregatorId::new();
        let (view, subscription) = LeafView::attach(id.clone(), &model, DEFAULT_TAG);
        Self {
            id,
            model,
            view,
            _subscription: subscription,
        }
    }

    pub fn model(&self) -> &Arc<dyn EntityModel> {
        &self.model
    }

    fn local(&self, entity: &ExternalEntityWrapped) -> AggregatorResult<LocalEntityWrapped> {
        self.view
            .get(entity.id())
            .ok_or_else(|| AggregatorError::EntityNotFound(entity.id().to_string()))
    }
}

#[async_trait]
impl SemanticModelAggregator for VocabularyAggregator {
    fn id(&self) -> &AggregatorId {
        &self.id
    }

    async fn search(&self, query: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let snapshot = self.view.snapshot();
        Ok(NameQuery::new(query)
            .execute(snapshot.values(), |w| &w.aggregated_entity)
            .into_iter()
            .map(|local| ExternalEntityWrapped::from_local(local, self.view.source_frame()))
            .collect())
    }

    async fn get_surroundings(&self, _id: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        Ok(self.view.all_as_external())
    }

    async fn get_hierarchy(&self, id: &str) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        if !self.view.contains(id) {
            return Err(AggregatorError::NotLocal(id.to_string()));
        }
        Ok(Some(self.view.all_as_external()))
    }

    async fn get_hierarchy_for_lookup(
        &self,
        _id: &str,
    ) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        Ok(Some(self.view.all_as_external()))
    }

    async fn external_entity_to_local_for_search(
        &self,
        entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.local(&entity)
    }

    async fn external_entity_to_local_for_surroundings(
        &self,
        _from_entity_id: &str,
        entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.local(&entity)
    }

    async fn external_entity_to_local_for_hierarchy_extension(
        &self,
        _from_entity_id: &str,
        entity: ExternalEntityWrapped,
        _is_entity_more_general: bool,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.local(&entity)
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
