//! MergeAggregator: sibling aggregators combined into one view

use super::lock;
use super::traits::{
    AggregatedChanges, AggregatorError, AggregatorId, AggregatorListener, AggregatorResult,
    ExternalEntityWrapped, FrameDetail, LocalEntityWrapped, ProvenanceFrame,
    SemanticModelAggregator,
};
use super::tuple_index::TupleIndex;
use crate::entity::{Entity, EntityId, LanguageString};
use crate::model::{Observers, Operation, OperationResult, Subscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

struct MergeLayers {
    /// Last-seen aggregated entities per member
    snapshots: HashMap<AggregatorId, HashMap<EntityId, LocalEntityWrapped>>,
    owners: TupleIndex<EntityId, AggregatorId>,
    entities: HashMap<EntityId, LocalEntityWrapped>,
}

struct MergeState {
    aggregator: AggregatorId,
    /// Member ids in configuration order; later members win on collisions
    order: Vec<AggregatorId>,
    layers: Mutex<MergeLayers>,
    observers: Observers<LocalEntityWrapped>,
}

fn union(into: &mut LanguageString, from: &LanguageString) {
    into.extend(from.iter().map(|(lang, text)| (lang.clone(), text.clone())));
}

/// Merge entities sharing an id. The first owner provides the base: its
/// kind, read-only flag and vocabulary chain are kept.
fn merge_owned(owned: &[&LocalEntityWrapped]) -> Option<LocalEntityWrapped> {
    let (first, rest) = owned.split_first()?;
    let mut merged = (*first).clone();
    for other in rest {
        match (&mut merged.aggregated_entity, &other.aggregated_entity) {
            (Entity::Class(into), Entity::Class(from)) => {
                union(&mut into.name, &from.name);
                union(&mut into.description, &from.description);
            }
            (Entity::Relationship(into), Entity::Relationship(from)) => {
                union(&mut into.name, &from.name);
                union(&mut into.description, &from.description);
                for (end, other_end) in into.ends.iter_mut().zip(from.ends.iter()) {
                    union(&mut end.name, &other_end.name);
                    union(&mut end.description, &other_end.description);
                }
            }
            _ => {}
        }
    }
    Some(merged)
}

impl MergeLayers {
    fn recompute(&self, order: &[AggregatorId], id: &str) -> Option<LocalEntityWrapped> {
        let owners = self.owners.get_by_first(&id.to_string());
        let owned: Vec<&LocalEntityWrapped> = order
            .iter()
            .filter(|member| owners.contains(member))
            .filter_map(|member| self.snapshots.get(member).and_then(|s| s.get(id)))
            .collect();
        merge_owned(&owned)
    }

    fn apply(&mut self, order: &[AggregatorId], member: &AggregatorId, changes: &AggregatedChanges) -> AggregatedChanges {
        let snapshot = self.snapshots.entry(member.clone()).or_default();
        for id in &changes.removed {
            snapshot.remove(id);
        }
        for (id, wrapped) in &changes.updated {
            snapshot.insert(id.clone(), wrapped.clone());
        }
        for id in &changes.removed {
            self.owners.delete(id, member);
        }
        for id in changes.updated.keys() {
            self.owners.add(id.clone(), member.clone());
        }

        let mut touched: Vec<&EntityId> = changes.removed.iter().chain(changes.updated.keys()).collect();
        touched.sort();
        touched.dedup();

        let mut batch = AggregatedChanges::empty();
        for id in touched {
            match self.recompute(order, id) {
                Some(merged) => {
                    if self.entities.get(id) != Some(&merged) {
                        self.entities.insert(id.clone(), merged.clone());
                        batch.updated.insert(id.clone(), merged);
                    }
                }
                None => {
                    if self.entities.remove(id).is_some() {
                        batch.removed.push(id.clone());
                    }
                }
            }
        }
        batch
    }
}

impl MergeState {
    fn on_member_changes(&self, member: &AggregatorId, changes: &AggregatedChanges) {
        let batch = lock(&self.layers).apply(&self.order, member, changes);
        debug!(
            aggregator = %self.aggregator,
            member = %member,
            updated = batch.updated.len(),
            removed = batch.removed.len(),
            "member changes merged"
        );
        self.observers.notify(&batch);
    }

    fn get(&self, id: &str) -> Option<LocalEntityWrapped> {
        lock(&self.layers).entities.get(id).cloned()
    }
}

/// Aggregator composing sibling aggregators.
///
/// Entities from different members that share an id are taken to be the
/// same entity and merged. Members are expected to honour that: two models
/// must not use one id for unrelated entities.
pub struct MergeAggregator {
    id: AggregatorId,
    members: Vec<Arc<dyn SemanticModelAggregator>>,
    state: Arc<MergeState>,
    _subscriptions: Vec<Subscription>,
}

impl MergeAggregator {
    pub fn new(members: Vec<Arc<dyn SemanticModelAggregator>>) -> Self {
        let id = AggregatorId::new();
        let order: Vec<AggregatorId> = members.iter().map(|m| m.id().clone()).collect();

        let mut layers = MergeLayers {
            snapshots: HashMap::new(),
            owners: TupleIndex::new(),
            entities: HashMap::new(),
        };
        for member in &members {
            let initial = AggregatedChanges::new(member.get_aggregated_entities(), Vec::new());
            layers.apply(&order, member.id(), &initial);
        }
        debug!(aggregator = %id, members = members.len(), entities = layers.entities.len(), "merge loaded");

        let state = Arc::new(MergeState {
            aggregator: id.clone(),
            order,
            layers: Mutex::new(layers),
            observers: Observers::new(),
        });

        let subscriptions = members
            .iter()
            .map(|member| {
                let weak = Arc::downgrade(&state);
                let member_id = member.id().clone();
                member.subscribe_to_changes(Arc::new(move |changes: &AggregatedChanges| {
                    if let Some(state) = weak.upgrade() {
                        state.on_member_changes(&member_id, changes);
                    }
                }))
            })
            .collect();

        Self {
            id,
            members,
            state,
            _subscriptions: subscriptions,
        }
    }

    pub fn members(&self) -> &[Arc<dyn SemanticModelAggregator>] {
        &self.members
    }

    /// Members currently holding an entity with `id`, in member order
    pub fn owners_of(&self, id: &str) -> Vec<AggregatorId> {
        let owners = lock(&self.state.layers).owners.get_by_first(&id.to_string());
        self.state
            .order
            .iter()
            .filter(|member| owners.contains(member))
            .cloned()
            .collect()
    }

    fn member(&self, id: &AggregatorId) -> AggregatorResult<&Arc<dyn SemanticModelAggregator>> {
        self.members
            .iter()
            .find(|m| m.id() == id)
            .ok_or_else(|| AggregatorError::UnexpectedFrame(FrameDetail::Member { member: id.clone() }))
    }

    fn tag(&self, member: &AggregatorId, found: Vec<ExternalEntityWrapped>) -> Vec<ExternalEntityWrapped> {
        found
            .into_iter()
            .map(|e| {
                e.with_frame(ProvenanceFrame::new(
                    self.id.clone(),
                    FrameDetail::Member {
                        member: member.clone(),
                    },
                ))
            })
            .collect()
    }

    /// Pop this aggregator's frame and return the member that produced the entity.
    fn origin_of(&self, entity: &mut ExternalEntityWrapped) -> AggregatorResult<&Arc<dyn SemanticModelAggregator>> {
        match entity.take_frame(&self.id)? {
            FrameDetail::Member { member } => self.member(&member),
            other => Err(AggregatorError::UnexpectedFrame(other)),
        }
    }

    /// The merged form of an entity a member just made local
    fn merged(&self, local: LocalEntityWrapped) -> LocalEntityWrapped {
        self.state.get(local.id()).unwrap_or(local)
    }
}

#[async_trait]
impl SemanticModelAggregator for MergeAggregator {
    fn id(&self) -> &AggregatorId {
        &self.id
    }

    async fn search(&self, query: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let mut results = Vec::new();
        for member in &self.members {
            let found = member.search(query).await?;
            results.extend(self.tag(member.id(), found));
        }
        Ok(results)
    }

    async fn get_surroundings(&self, id: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let mut results = Vec::new();
        for member in &self.members {
            let found = member.get_surroundings(id).await?;
            results.extend(self.tag(member.id(), found));
        }
        Ok(results)
    }

    /// Asks only the members that currently hold `id`; any other member
    /// would answer `NotLocal`. Fails with `NotLocal` when no member holds it.
    async fn get_hierarchy(&self, id: &str) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        let owners = self.owners_of(id);
        if owners.is_empty() {
            return Err(AggregatorError::NotLocal(id.to_string()));
        }
        let mut results: Option<Vec<ExternalEntityWrapped>> = None;
        for owner in &owners {
            if let Some(found) = self.member(owner)?.get_hierarchy(id).await? {
                results.get_or_insert_with(Vec::new).extend(self.tag(owner, found));
            }
        }
        Ok(results)
    }

    async fn get_hierarchy_for_lookup(
        &self,
        id: &str,
    ) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        let mut results: Option<Vec<ExternalEntityWrapped>> = None;
        for member in &self.members {
            if let Some(found) = member.get_hierarchy_for_lookup(id).await? {
                results
                    .get_or_insert_with(Vec::new)
                    .extend(self.tag(member.id(), found));
            }
        }
        Ok(results)
    }

    async fn external_entity_to_local_for_search(
        &self,
        mut entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        let member = self.origin_of(&mut entity)?;
        let local = member.external_entity_to_local_for_search(entity).await?;
        Ok(self.merged(local))
    }

    async fn external_entity_to_local_for_surroundings(
        &self,
        from_entity_id: &str,
        mut entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        let member = self.origin_of(&mut entity)?;
        let local = member
            .external_entity_to_local_for_surroundings(from_entity_id, entity)
            .await?;
        Ok(self.merged(local))
    }

    async fn external_entity_to_local_for_hierarchy_extension(
        &self,
        from_entity_id: &str,
        mut entity: ExternalEntityWrapped,
        is_entity_more_general: bool,
    ) -> AggregatorResult<LocalEntityWrapped> {
        let member = self.origin_of(&mut entity)?;
        let local = member
            .external_entity_to_local_for_hierarchy_extension(from_entity_id, entity, is_entity_more_general)
            .await?;
        Ok(self.merged(local))
    }

    fn exec_operation(&self, operation: Operation) -> AggregatorResult<OperationResult> {
        match self.members.as_slice() {
            [only] => only.exec_operation(operation),
            members => Err(AggregatorError::AmbiguousWriteTarget(members.len())),
        }
    }

    fn get_local_entity(&self, id: &str) -> Option<LocalEntityWrapped> {
        self.state.get(id)
    }

    fn subscribe_to_changes(&self, listener: AggregatorListener) -> Subscription {
        self.state.observers.subscribe(listener)
    }

    fn get_aggregated_entities(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        lock(&self.state.layers).entities.clone()
    }
}
