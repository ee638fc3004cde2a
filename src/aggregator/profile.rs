//! ApplicationProfileAggregator: a profile model layered over a source aggregator
//!
//! Profiles are resolved against the layer itself first and the source
//! second. `depends_on` records which raw ids every aggregated entity was
//! derived from, so a change in either layer only recomputes the entities
//! that actually depend on it.
//!
//! The aggregated view is the source's entities, passed through read-only,
//! overlaid with the settled profile layer.

use super::lock;
use super::traits::{
    AggregatedChanges, AggregatorError, AggregatorId, AggregatorListener, AggregatorResult,
    ExternalEntityWrapped, FrameDetail, LocalEntityWrapped, ProfileAction, ProvenanceFrame,
    ProvenanceTag, SemanticModelAggregator,
};
use super::tuple_index::TupleIndex;
use crate::entity::{
    absolutize_entity, aggregate_class_profile, aggregate_relationship_profile, ClassProfile, Entity,
    EntityId, Generalization, RelationshipProfile,
};
use crate::model::{ChangeSet, EntityModel, Observers, Operation, OperationResult, Subscription};
use crate::query::NameQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};
use uuid::Uuid;

const DEFAULT_TAG: &str = "Application profile";

/// Write permissions of an application profile layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOptions {
    /// Whether new profiles may be created (search variants, materialization)
    pub can_add_entities: bool,
    /// Whether `exec_operation` is accepted
    pub can_modify: bool,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            can_add_entities: true,
            can_modify: true,
        }
    }
}

/// Raw layers plus the derived view, guarded by one lock
struct ProfileLayers {
    aggregator: AggregatorId,
    tag: ProvenanceTag,
    profile_entities: HashMap<EntityId, Entity>,
    source_entities: HashMap<EntityId, LocalEntityWrapped>,
    entities: HashMap<EntityId, LocalEntityWrapped>,
    /// (aggregated id, raw id it was derived from)
    depends_on: TupleIndex<EntityId, EntityId>,
    cycles: BTreeSet<EntityId>,
}

impl ProfileLayers {
    fn wrap(&self, entity: Entity) -> LocalEntityWrapped {
        LocalEntityWrapped::new(entity, true, vec![self.tag.clone()])
    }

    /// What the aggregated view holds for `id`: the settled profile layer
    /// first, then the source passed through read-only.
    fn view_of(&self, id: &str) -> Option<LocalEntityWrapped> {
        if let Some(local) = self.entities.get(id) {
            return Some(local.clone());
        }
        self.source_entities.get(id).map(|source| LocalEntityWrapped {
            is_read_only: true,
            ..source.clone()
        })
    }

    fn view(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        let mut view: HashMap<EntityId, LocalEntityWrapped> = self
            .source_entities
            .iter()
            .map(|(id, source)| {
                let passed = LocalEntityWrapped {
                    is_read_only: true,
                    ..source.clone()
                };
                (id.clone(), passed)
            })
            .collect();
        view.extend(self.entities.iter().map(|(id, local)| (id.clone(), local.clone())));
        view
    }

    /// Turn drained profile changes plus the source ids that changed into
    /// one batch over the aggregated view. Source ids shadowed by a profile
    /// layer entity are left out.
    fn expose(&self, drained: AggregatedChanges, source_changed: &[EntityId]) -> AggregatedChanges {
        let mut touched: Vec<EntityId> = drained.updated.into_keys().chain(drained.removed).collect();
        touched.extend(
            source_changed
                .iter()
                .filter(|id| !self.entities.contains_key(*id))
                .cloned(),
        );
        touched.sort();
        touched.dedup();

        let mut batch = AggregatedChanges::empty();
        for id in touched {
            match self.view_of(&id) {
                Some(wrapped) => {
                    batch.updated.insert(id, wrapped);
                }
                None => batch.removed.push(id),
            }
        }
        batch
    }

    fn resolve(&self, id: &str) -> Option<Entity> {
        self.entities
            .get(id)
            .or_else(|| self.source_entities.get(id))
            .map(|w| w.aggregated_entity.clone())
    }

    fn resolve_all(&self, ids: &[EntityId]) -> Option<Vec<Entity>> {
        ids.iter().map(|id| self.resolve(id)).collect()
    }

    /// Whether following `profiling` references through this layer leads
    /// back to `id`.
    fn in_profiling_cycle(&self, id: &str) -> bool {
        let mut stack: Vec<EntityId> = self
            .profile_entities
            .get(id)
            .map(Entity::profiling)
            .unwrap_or_default();
        let mut seen: HashSet<EntityId> = HashSet::new();
        while let Some(next) = stack.pop() {
            if next == id {
                return true;
            }
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(entity) = self.profile_entities.get(&next) {
                stack.extend(entity.profiling());
            }
        }
        false
    }

    /// Compute the aggregated form of `id`, or `None` when it has none.
    fn settle(&mut self, id: &str) -> Option<LocalEntityWrapped> {
        let Some(entity) = self.profile_entities.get(id).cloned() else {
            self.depends_on.delete_first(&id.to_string());
            self.cycles.remove(id);
            return None;
        };
        let profiling = entity.profiling();
        if profiling.is_empty() {
            self.depends_on.delete_first(&id.to_string());
            self.cycles.remove(id);
            return Some(self.wrap(entity));
        }

        // Edges are kept even when the profile cannot settle, so that it is
        // revisited once its profiled entities appear.
        self.depends_on.override_by_first(id.to_string(), profiling);

        if self.in_profiling_cycle(id) {
            if self.cycles.insert(id.to_string()) {
                warn!(aggregator = %self.aggregator, id, "profiling cycle, profile dropped");
            }
            return None;
        }
        self.cycles.remove(id);

        let aggregated = match &entity {
            Entity::ClassProfile(profile) => {
                let profiled = self.resolve_all(&profile.profiling)?;
                let refs: Vec<&Entity> = profiled.iter().collect();
                Entity::ClassProfile(aggregate_class_profile(profile, &refs))
            }
            Entity::RelationshipProfile(profile) => {
                let first = self.resolve_all(&profile.ends[0].profiling)?;
                let second = self.resolve_all(&profile.ends[1].profiling)?;
                let first: Vec<&Entity> = first.iter().collect();
                let second: Vec<&Entity> = second.iter().collect();
                Entity::RelationshipProfile(aggregate_relationship_profile(profile, [&first, &second]))
            }
            other => other.clone(),
        };
        Some(self.wrap(aggregated))
    }

    /// Recompute every queued id and whatever depends on it. Dependents are
    /// only enqueued when the aggregated value actually changed.
    fn drain(&mut self, worklist: Vec<EntityId>) -> AggregatedChanges {
        let mut queue: VecDeque<EntityId> = worklist.into();
        let mut changes = AggregatedChanges::empty();

        while let Some(id) = queue.pop_front() {
            let next = self.settle(&id);
            let changed = match (&next, self.entities.get(&id)) {
                (Some(next), Some(previous)) => next != previous,
                (None, None) => false,
                _ => true,
            };
            if !changed {
                if next.is_none() && self.profile_entities.contains_key(&id) {
                    trace!(aggregator = %self.aggregator, id = %id, "profile not resolvable yet");
                }
                continue;
            }
            match next {
                Some(wrapped) => {
                    self.entities.insert(id.clone(), wrapped.clone());
                    changes.removed.retain(|removed| removed != &id);
                    changes.updated.insert(id.clone(), wrapped);
                }
                None => {
                    self.entities.remove(&id);
                    changes.updated.remove(&id);
                    if !changes.removed.contains(&id) {
                        changes.removed.push(id.clone());
                    }
                }
            }
            let mut dependents = self.depends_on.get_by_second(&id);
            dependents.sort();
            queue.extend(dependents);
        }
        changes
    }
}

struct ProfileState {
    aggregator: AggregatorId,
    base_iri: Option<String>,
    layers: Mutex<ProfileLayers>,
    observers: Observers<LocalEntityWrapped>,
}

impl ProfileState {
    fn on_profile_changes(&self, changes: &ChangeSet<Entity>) {
        let batch = {
            let mut layers = lock(&self.layers);
            for id in &changes.removed {
                layers.profile_entities.remove(id);
            }
            for (id, entity) in &changes.updated {
                let entity = absolutize_entity(entity.clone(), self.base_iri.as_deref());
                layers.profile_entities.insert(id.clone(), entity);
            }
            let mut worklist: Vec<EntityId> = changes
                .removed
                .iter()
                .chain(changes.updated.keys())
                .cloned()
                .collect();
            worklist.sort();
            worklist.dedup();
            let drained = layers.drain(worklist);
            layers.expose(drained, &[])
        };
        self.publish(batch, "profile");
    }

    fn on_source_changes(&self, changes: &AggregatedChanges) {
        let batch = {
            let mut layers = lock(&self.layers);
            for id in &changes.removed {
                layers.source_entities.remove(id);
            }
            for (id, wrapped) in &changes.updated {
                layers.source_entities.insert(id.clone(), wrapped.clone());
            }
            let mut worklist: Vec<EntityId> = changes
                .removed
                .iter()
                .chain(changes.updated.keys())
                .flat_map(|id| layers.depends_on.get_by_second(id))
                .collect();
            worklist.sort();
            worklist.dedup();
            let drained = layers.drain(worklist);
            let source_changed: Vec<EntityId> = changes
                .removed
                .iter()
                .chain(changes.updated.keys())
                .cloned()
                .collect();
            layers.expose(drained, &source_changed)
        };
        self.publish(batch, "source");
    }

    fn publish(&self, batch: AggregatedChanges, layer: &str) {
        debug!(
            aggregator = %self.aggregator,
            layer,
            updated = batch.updated.len(),
            removed = batch.removed.len(),
            "profile layer recomputed"
        );
        self.observers.notify(&batch);
    }

    /// Settled profile layer only
    fn snapshot(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        lock(&self.layers).entities.clone()
    }

    fn view(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        lock(&self.layers).view()
    }

    fn view_of(&self, id: &str) -> Option<LocalEntityWrapped> {
        lock(&self.layers).view_of(id)
    }

    fn get(&self, id: &str) -> Option<LocalEntityWrapped> {
        lock(&self.layers).entities.get(id).cloned()
    }
}

/// Where a foreign entity is being materialized from
#[derive(Debug, Clone, Copy)]
enum Reach {
    Surroundings,
    Hierarchy { more_general: bool },
}

/// Local part of a profile hierarchy walk
#[derive(Debug, Default)]
struct LocalHierarchy {
    classes: Vec<EntityId>,
    generalizations: Vec<Generalization>,
    /// (local profile, profiled id outside this layer)
    foreign: Vec<(EntityId, EntityId)>,
}

/// Id prefix reserved for generalizations synthesized from `profiling`
/// references (a blank node label, so it cannot be an entity IRI).
pub const PROFILING_LINK_PREFIX: &str = "_:profiling:";

fn profiling_link_id(child: &str, parent: &str) -> EntityId {
    format!("{}{} {}", PROFILING_LINK_PREFIX, child, parent)
}

struct HierarchyEdge {
    child: EntityId,
    parent: EntityId,
    authored: Option<Generalization>,
}

impl HierarchyEdge {
    fn into_generalization(self) -> Generalization {
        match self.authored {
            Some(generalization) => generalization,
            None => {
                let id = profiling_link_id(&self.child, &self.parent);
                Generalization::new(id, self.child, self.parent)
            }
        }
    }
}

/// Walk class profiles up and down from `origin` over `profiling` references
/// and authored generalizations, both restricted to this layer.
fn walk_local_hierarchy(entities: &HashMap<EntityId, LocalEntityWrapped>, origin: &str) -> LocalHierarchy {
    let mut edges: Vec<HierarchyEdge> = Vec::new();
    let mut ids: Vec<&EntityId> = entities.keys().collect();
    ids.sort();
    for id in ids {
        match &entities[id].aggregated_entity {
            Entity::ClassProfile(profile) => {
                edges.extend(profile.profiling.iter().map(|parent| HierarchyEdge {
                    child: profile.id.clone(),
                    parent: parent.clone(),
                    authored: None,
                }));
            }
            Entity::Generalization(g) => edges.push(HierarchyEdge {
                child: g.child.clone(),
                parent: g.parent.clone(),
                authored: Some(g.clone()),
            }),
            _ => {}
        }
    }
    let is_local_class = |id: &str| entities.get(id).is_some_and(|w| w.aggregated_entity.is_class_like());

    let mut result = LocalHierarchy {
        classes: vec![origin.to_string()],
        ..Default::default()
    };
    let mut used = vec![false; edges.len()];
    let mut classes: HashSet<EntityId> = HashSet::from([origin.to_string()]);

    for upward in [true, false] {
        let mut visited: HashSet<EntityId> = HashSet::from([origin.to_string()]);
        let mut queue: VecDeque<EntityId> = VecDeque::from([origin.to_string()]);
        while let Some(current) = queue.pop_front() {
            for (i, edge) in edges.iter().enumerate() {
                let (from, next) = if upward {
                    (&edge.child, &edge.parent)
                } else {
                    (&edge.parent, &edge.child)
                };
                if from != &current {
                    continue;
                }
                if !is_local_class(next.as_str()) {
                    if upward && edge.authored.is_none() {
                        result.foreign.push((current.clone(), next.clone()));
                    }
                    continue;
                }
                used[i] = true;
                if visited.insert(next.clone()) {
                    queue.push_back(next.clone());
                    if classes.insert(next.clone()) {
                        result.classes.push(next.clone());
                    }
                }
            }
        }
    }

    result.generalizations = edges
        .into_iter()
        .zip(used)
        .filter_map(|(edge, used)| used.then(|| edge.into_generalization()))
        .collect();
    result
}

/// Aggregator layering a profile model over a source aggregator
pub struct ApplicationProfileAggregator {
    id: AggregatorId,
    tag: ProvenanceTag,
    profile_model: Arc<dyn EntityModel>,
    source: Arc<dyn SemanticModelAggregator>,
    options: ProfileOptions,
    state: Arc<ProfileState>,
    _subscriptions: [Subscription; 2],
}

impl ApplicationProfileAggregator {
    pub fn new(profile_model: Arc<dyn EntityModel>, source: Arc<dyn SemanticModelAggregator>) -> Self {
        let id = AggregatorId::new();
        let tag = ProvenanceTag::new(profile_model.alias().unwrap_or(DEFAULT_TAG));
        let base_iri = profile_model.base_iri().map(str::to_string);

        let mut layers = ProfileLayers {
            aggregator: id.clone(),
            tag: tag.clone(),
            profile_entities: profile_model
                .entities()
                .into_iter()
                .map(|(id, e)| (id, absolutize_entity(e, base_iri.as_deref())))
                .collect(),
            source_entities: source.get_aggregated_entities(),
            entities: HashMap::new(),
            depends_on: TupleIndex::new(),
            cycles: BTreeSet::new(),
        };
        let mut worklist: Vec<EntityId> = layers.profile_entities.keys().cloned().collect();
        worklist.sort();
        let initial = layers.drain(worklist);
        debug!(aggregator = %id, entities = initial.updated.len(), "profile layer loaded");

        let state = Arc::new(ProfileState {
            aggregator: id.clone(),
            base_iri,
            layers: Mutex::new(layers),
            observers: Observers::new(),
        });

        let weak = Arc::downgrade(&state);
        let source_subscription = source.subscribe_to_changes(Arc::new(move |changes: &AggregatedChanges| {
            if let Some(state) = weak.upgrade() {
                state.on_source_changes(changes);
            }
        }));
        let weak = Arc::downgrade(&state);
        let profile_subscription =
            profile_model.subscribe_to_changes(Arc::new(move |changes: &ChangeSet<Entity>| {
                if let Some(state) = weak.upgrade() {
                    state.on_profile_changes(changes);
                }
            }));

        Self {
            id,
            tag,
            profile_model,
            source,
            options: ProfileOptions::default(),
            state,
            _subscriptions: [source_subscription, profile_subscription],
        }
    }

    pub fn with_options(mut self, options: ProfileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ProfileOptions {
        self.options
    }

    pub fn source(&self) -> &Arc<dyn SemanticModelAggregator> {
        &self.source
    }

    /// Profiles currently dropped because their `profiling` references loop
    /// back to themselves.
    pub fn profiling_cycles(&self) -> Vec<AggregatorError> {
        lock(&self.state.layers)
            .cycles
            .iter()
            .map(|id| AggregatorError::ProfilingCycle(id.clone()))
            .collect()
    }

    /// Raw ids the aggregated entity `id` was derived from
    pub fn dependencies_of(&self, id: &str) -> Vec<EntityId> {
        let mut ids = lock(&self.state.layers).depends_on.get_by_first(&id.to_string());
        ids.sort();
        ids
    }

    fn frame(&self, detail: FrameDetail) -> ProvenanceFrame {
        ProvenanceFrame::new(self.id.clone(), detail)
    }

    fn variant(&self, local: &LocalEntityWrapped, action: ProfileAction) -> ExternalEntityWrapped {
        ExternalEntityWrapped::from_local(local, self.frame(FrameDetail::Profile { action }))
            .with_note(action.note())
    }

    fn ensure_can_add(&self) -> AggregatorResult<()> {
        if self.options.can_add_entities {
            Ok(())
        } else {
            Err(AggregatorError::ReadOnly(self.id.clone()))
        }
    }

    fn local_or_not_found(&self, id: &str) -> AggregatorResult<LocalEntityWrapped> {
        self.state
            .get(id)
            .ok_or_else(|| AggregatorError::EntityNotFound(id.to_string()))
    }

    /// Source-side id a local profile stands for: its first profiled id
    /// that lives in the source.
    fn anchor_of(&self, profile: &str) -> AggregatorResult<EntityId> {
        let layers = lock(&self.state.layers);
        let profiling = layers
            .profile_entities
            .get(profile)
            .map(Entity::profiling)
            .unwrap_or_default();
        profiling
            .iter()
            .find(|id| layers.source_entities.contains_key(*id))
            .or_else(|| profiling.first())
            .cloned()
            .ok_or_else(|| AggregatorError::EntityNotFound(profile.to_string()))
    }

    fn existing_profile_of(&self, profiled: &str) -> Option<LocalEntityWrapped> {
        let layers = lock(&self.state.layers);
        let mut candidates: Vec<&LocalEntityWrapped> = layers
            .entities
            .values()
            .filter(|w| matches!(&w.aggregated_entity, Entity::ClassProfile(p) if p.profiling == [profiled]))
            .collect();
        candidates.sort_by(|a, b| a.id().cmp(b.id()));
        candidates.first().map(|w| (*w).clone())
    }

    /// Create a new profile of `profiled` in the profile layer. For
    /// relationships, the end anchored at the profiled entity of `via` is
    /// pointed at `via` itself.
    fn create_profile_of(&self, profiled: &Entity, via: Option<&str>) -> AggregatorResult<LocalEntityWrapped> {
        let id = Uuid::new_v4().to_string();
        let profile: Entity = if profiled.is_class_like() {
            ClassProfile::new(id.clone(), [profiled.id()]).into()
        } else if let Some(concepts) = profiled.end_concepts() {
            let mut profile = RelationshipProfile::of(id.clone(), profiled.id());
            if let Some(via) = via {
                let anchors = lock(&self.state.layers)
                    .profile_entities
                    .get(via)
                    .map(Entity::profiling)
                    .unwrap_or_default();
                let end = concepts
                    .iter()
                    .position(|c| c.is_some_and(|c| anchors.iter().any(|a| a == c)))
                    .unwrap_or(0);
                profile.ends[end].concept = Some(via.to_string());
            }
            profile.into()
        } else {
            return Err(AggregatorError::UnsupportedEntity {
                operation: "create profile",
                kind: profiled.kind(),
            });
        };

        self.profile_model.execute_operation(Operation::create(profile))?;
        debug!(aggregator = %self.id, id = %id, profiled = profiled.id(), "profile created");
        self.local_or_not_found(&id)
    }

    /// Let the source materialize `entity`, then profile the result here.
    async fn materialize_from_source(
        &self,
        anchor: &str,
        via: Option<&str>,
        entity: ExternalEntityWrapped,
        reach: Reach,
    ) -> AggregatorResult<LocalEntityWrapped> {
        self.ensure_can_add()?;
        let source_local = if entity.originating_model.is_empty() {
            self.source
                .get_local_entity(entity.id())
                .ok_or_else(|| AggregatorError::EntityNotFound(entity.id().to_string()))?
        } else {
            match reach {
                Reach::Surroundings => {
                    self.source
                        .external_entity_to_local_for_surroundings(anchor, entity)
                        .await?
                }
                Reach::Hierarchy { more_general } => {
                    self.source
                        .external_entity_to_local_for_hierarchy_extension(anchor, entity, more_general)
                        .await?
                }
            }
        };
        if source_local.aggregated_entity.is_class_like() {
            if let Some(existing) = self.existing_profile_of(source_local.id()) {
                return Ok(existing);
            }
        }
        self.create_profile_of(&source_local.aggregated_entity, via)
    }

    /// Record `child` specializing `parent` in the profile layer.
    fn author_generalization(&self, child: &str, parent: &str) -> AggregatorResult<()> {
        let exists = lock(&self.state.layers).profile_entities.values().any(|e| {
            matches!(e, Entity::Generalization(g) if g.child == child && g.parent == parent)
        });
        if exists {
            return Ok(());
        }
        let generalization = Generalization::new(Uuid::new_v4().to_string(), child, parent);
        self.profile_model
            .execute_operation(Operation::create(generalization))?;
        Ok(())
    }

    fn forward(&self, found: Vec<ExternalEntityWrapped>) -> Vec<ExternalEntityWrapped> {
        found
            .into_iter()
            .map(|e| e.with_frame(self.frame(FrameDetail::Forwarded)))
            .collect()
    }
}

#[async_trait]
impl SemanticModelAggregator for ApplicationProfileAggregator {
    fn id(&self) -> &AggregatorId {
        &self.id
    }

    async fn search(&self, query: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let local = self.state.snapshot();
        let mut results = Vec::new();
        for hit in NameQuery::new(query).execute(local.values(), |w| &w.aggregated_entity) {
            results.push(self.variant(hit, ProfileAction::UseAsIs));
            if self.options.can_add_entities {
                results.push(self.variant(hit, ProfileAction::CreateProfileFromProfile));
            }
        }
        if self.options.can_add_entities {
            let action = ProfileAction::CreateNewProfile;
            for found in self.source.search(query).await? {
                results.push(
                    found
                        .with_frame(self.frame(FrameDetail::Profile { action }))
                        .with_note(action.note()),
                );
            }
        }
        Ok(results)
    }

    async fn get_surroundings(&self, id: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>> {
        let entities = self.state.snapshot();
        if !entities.contains_key(id) {
            let found = self.source.get_surroundings(id).await?;
            return Ok(self.forward(found));
        }

        let mut relationships: Vec<&LocalEntityWrapped> = entities
            .values()
            .filter(|w| {
                w.aggregated_entity
                    .end_concepts()
                    .is_some_and(|concepts| concepts.contains(&Some(id)))
            })
            .collect();
        relationships.sort_by(|a, b| a.id().cmp(b.id()));

        let mut results = Vec::new();
        let mut other_ends: Vec<&str> = Vec::new();
        for relationship in relationships {
            results.push(ExternalEntityWrapped::from_local(relationship, self.frame(FrameDetail::Local)));
            if let Some(concepts) = relationship.aggregated_entity.end_concepts() {
                for concept in concepts.into_iter().flatten() {
                    if concept != id && !other_ends.contains(&concept) {
                        other_ends.push(concept);
                    }
                }
            }
        }
        for end in other_ends {
            if let Some(local) = entities.get(end) {
                results.push(ExternalEntityWrapped::from_local(local, self.frame(FrameDetail::Local)));
            } else if let Some(foreign) = self.source.get_local_entity(end) {
                results.push(ExternalEntityWrapped::from_local(&foreign, self.frame(FrameDetail::Forwarded)));
            }
        }
        Ok(results)
    }

    /// Profile layer ids get the synthesized hierarchy; source entities
    /// passed through the view are answered by the source.
    async fn get_hierarchy(&self, id: &str) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        if self.state.get(id).is_some() {
            return self.get_hierarchy_for_lookup(id).await;
        }
        if self.source.get_local_entity(id).is_none() {
            return Err(AggregatorError::NotLocal(id.to_string()));
        }
        let found = self.source.get_hierarchy(id).await?;
        Ok(found.map(|found| self.forward(found)))
    }

    async fn get_hierarchy_for_lookup(
        &self,
        id: &str,
    ) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>> {
        let entities = self.state.snapshot();
        if !entities.contains_key(id) {
            let found = self.source.get_hierarchy_for_lookup(id).await?;
            return Ok(found.map(|found| self.forward(found)));
        }

        let walk = walk_local_hierarchy(&entities, id);
        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut results = Vec::new();
        for class in &walk.classes {
            if let Some(local) = entities.get(class) {
                seen.insert(class.clone());
                results.push(ExternalEntityWrapped::from_local(local, self.frame(FrameDetail::Local)));
            }
        }
        for generalization in walk.generalizations {
            seen.insert(generalization.id.clone());
            results.push(
                ExternalEntityWrapped::new(generalization.into(), vec![self.tag.clone()])
                    .with_frame(self.frame(FrameDetail::Local)),
            );
        }

        for (profile, profiled) in walk.foreign {
            let Some(found) = self.source.get_hierarchy_for_lookup(&profiled).await? else {
                continue;
            };
            let link = Generalization::new(profiling_link_id(&profile, &profiled), profile.clone(), profiled);
            if seen.insert(link.id.clone()) {
                results.push(
                    ExternalEntityWrapped::new(link.into(), vec![self.tag.clone()])
                        .with_frame(self.frame(FrameDetail::Local)),
                );
            }
            for entity in found {
                if seen.insert(entity.id().to_string()) {
                    let via = FrameDetail::Via {
                        profile: profile.clone(),
                    };
                    results.push(entity.with_frame(self.frame(via)));
                }
            }
        }
        Ok(Some(results))
    }

    async fn external_entity_to_local_for_search(
        &self,
        mut entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        match entity.take_frame(&self.id)? {
            FrameDetail::Profile {
                action: ProfileAction::UseAsIs,
            } => self.local_or_not_found(entity.id()),
            FrameDetail::Profile {
                action: ProfileAction::CreateProfileFromProfile,
            } => {
                self.ensure_can_add()?;
                let local = self.local_or_not_found(entity.id())?;
                self.create_profile_of(&local.aggregated_entity, None)
            }
            FrameDetail::Profile {
                action: ProfileAction::CreateNewProfile,
            } => {
                self.ensure_can_add()?;
                let source_local = self.source.external_entity_to_local_for_search(entity).await?;
                self.create_profile_of(&source_local.aggregated_entity, None)
            }
            other => Err(AggregatorError::UnexpectedFrame(other)),
        }
    }

    async fn external_entity_to_local_for_surroundings(
        &self,
        from_entity_id: &str,
        mut entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped> {
        match entity.take_frame(&self.id)? {
            FrameDetail::Local => self.local_or_not_found(entity.id()),
            FrameDetail::Forwarded => {
                self.materialize_from_source(from_entity_id, None, entity, Reach::Surroundings)
                    .await
            }
            FrameDetail::Via { profile } => {
                let anchor = self.anchor_of(&profile)?;
                self.materialize_from_source(&anchor, Some(&profile), entity, Reach::Surroundings)
                    .await
            }
            other => Err(AggregatorError::UnexpectedFrame(other)),
        }
    }

    async fn external_entity_to_local_for_hierarchy_extension(
        &self,
        from_entity_id: &str,
        mut entity: ExternalEntityWrapped,
        is_entity_more_general: bool,
    ) -> AggregatorResult<LocalEntityWrapped> {
        let reach = Reach::Hierarchy {
            more_general: is_entity_more_general,
        };
        let local = match entity.take_frame(&self.id)? {
            FrameDetail::Local => return self.local_or_not_found(entity.id()),
            FrameDetail::Forwarded => {
                self.materialize_from_source(from_entity_id, None, entity, reach)
                    .await?
            }
            FrameDetail::Via { profile } => {
                let anchor = self.anchor_of(&profile)?;
                self.materialize_from_source(&anchor, Some(&profile), entity, reach)
                    .await?
            }
            other => return Err(AggregatorError::UnexpectedFrame(other)),
        };

        if self.state.get(from_entity_id).is_some() {
            if is_entity_more_general {
                self.author_generalization(from_entity_id, local.id())?;
            } else {
                self.author_generalization(local.id(), from_entity_id)?;
            }
        }
        Ok(local)
    }

    fn exec_operation(&self, operation: Operation) -> AggregatorResult<OperationResult> {
        if !self.options.can_modify {
            return Err(AggregatorError::ReadOnly(self.id.clone()));
        }
        Ok(self.profile_model.execute_operation(operation)?)
    }

    fn get_local_entity(&self, id: &str) -> Option<LocalEntityWrapped> {
        self.state.view_of(id)
    }

    fn subscribe_to_changes(&self, listener: AggregatorListener) -> Subscription {
        self.state.observers.subscribe(listener)
    }

    fn get_aggregated_entities(&self) -> HashMap<EntityId, LocalEntityWrapped> {
        self.state.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::VocabularyAggregator;
    use crate::entity::{Class, Relationship};
    use crate::model::InMemoryEntityModel;

    struct Fixture {
        vocabulary: Arc<InMemoryEntityModel>,
        profiles: Arc<InMemoryEntityModel>,
        aggregator: ApplicationProfileAggregator,
    }

    fn fixture(profiles: InMemoryEntityModel) -> Fixture {
        let vocabulary = Arc::new(InMemoryEntityModel::new("vocabulary").with_entities([
            Entity::from(Class::new("agent").with_name("en", "Agent")),
            Class::new("person")
                .with_name("en", "Person")
                .with_description("en", "A human being")
                .into(),
            Generalization::new("person-agent", "person", "agent").into(),
            Relationship::between("knows", "person", "agent")
                .with_end_name(1, "en", "knows")
                .into(),
        ]));
        let profiles = Arc::new(profiles);
        let source: Arc<dyn SemanticModelAggregator> = Arc::new(VocabularyAggregator::new(vocabulary.clone()));
        let aggregator = ApplicationProfileAggregator::new(profiles.clone(), source);
        Fixture {
            vocabulary,
            profiles,
            aggregator,
        }
    }

    fn record(aggregator: &ApplicationProfileAggregator) -> (Arc<Mutex<Vec<AggregatedChanges>>>, Subscription) {
        let batches: Arc<Mutex<Vec<AggregatedChanges>>> = Arc::default();
        let sink = batches.clone();
        let subscription = aggregator.subscribe_to_changes(Arc::new(move |changes: &AggregatedChanges| {
            sink.lock().unwrap().push(changes.clone());
        }));
        (batches, subscription)
    }

    fn name_of(aggregator: &ApplicationProfileAggregator, id: &str) -> Option<String> {
        let local = aggregator.get_local_entity(id)?;
        local.aggregated_entity.display_name()?.get("en").cloned()
    }

    #[test]
    fn profile_inherits_from_source() {
        let f = fixture(
            InMemoryEntityModel::new("profiles")
                .with_entity(ClassProfile::new("p1", ["person"]).with_usage_note("en", "Use for citizens")),
        );
        let p1 = f.aggregator.get_local_entity("p1").unwrap();
        assert!(p1.is_read_only);
        assert_eq!(p1.vocabulary_chain[0].name, "Application profile");
        let Entity::ClassProfile(profile) = &p1.aggregated_entity else {
            panic!("expected a class profile");
        };
        assert_eq!(profile.name.as_ref().unwrap()["en"], "Person");
        assert_eq!(profile.description.as_ref().unwrap()["en"], "A human being");
        assert_eq!(profile.usage_note.as_ref().unwrap()["en"], "Use for citizens");
        assert_eq!(f.aggregator.dependencies_of("p1"), vec!["person".to_string()]);
    }

    #[test]
    fn profile_of_profile_settles_regardless_of_order() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entities([
            ClassProfile::new("a-profile", ["z-profile"]),
            ClassProfile::new("z-profile", ["person"]).with_name("en", "Citizen"),
        ]));
        assert_eq!(name_of(&f.aggregator, "a-profile").as_deref(), Some("Citizen"));
    }

    #[test]
    fn source_removal_cascades_through_profiles() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entities([
            ClassProfile::new("p1", ["person"]),
            ClassProfile::new("p2", ["p1"]),
        ]));
        let (batches, _sub) = record(&f.aggregator);

        let person = f.vocabulary.remove("person").unwrap();
        {
            let batches = batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            let mut removed = batches[0].removed.clone();
            removed.sort();
            assert_eq!(removed, ["p1", "p2", "person"]);
        }
        let view = f.aggregator.get_aggregated_entities();
        assert!(!view.contains_key("p1") && !view.contains_key("p2"));

        f.vocabulary.put(person);
        assert_eq!(name_of(&f.aggregator, "p2").as_deref(), Some("Person"));
    }

    #[test]
    fn profile_removal_cascades_to_dependents() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entities([
            ClassProfile::new("p1", ["person"]),
            ClassProfile::new("p2", ["p1"]),
        ]));
        f.profiles.remove("p1");
        assert!(f.aggregator.get_local_entity("p2").is_none());
        assert!(f.aggregator.dependencies_of("p1").is_empty());
        assert_eq!(f.aggregator.dependencies_of("p2"), vec!["p1".to_string()]);
    }

    #[test]
    fn dependency_edges_are_replaced_on_change() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entity(ClassProfile::new("p1", ["person"])));
        f.profiles.put(ClassProfile::new("p1", ["agent"]));
        assert_eq!(f.aggregator.dependencies_of("p1"), vec!["agent".to_string()]);
        assert_eq!(name_of(&f.aggregator, "p1").as_deref(), Some("Agent"));

        let (batches, _sub) = record(&f.aggregator);
        f.vocabulary.put(Class::new("person").with_name("en", "Human"));
        f.vocabulary.put(Class::new("agent").with_name("en", "Actor"));
        let batches = batches.lock().unwrap();
        let touched: Vec<Vec<&String>> = batches
            .iter()
            .map(|b| {
                let mut ids: Vec<&String> = b.updated.keys().collect();
                ids.sort();
                ids
            })
            .collect();
        assert_eq!(touched, [vec!["person"], vec!["agent", "p1"]]);
        assert_eq!(name_of(&f.aggregator, "p1").as_deref(), Some("Actor"));
    }

    #[test]
    fn relationship_profile_resolves_per_end() {
        let f = fixture(
            InMemoryEntityModel::new("profiles")
                .with_entity(RelationshipProfile::of("rp", "knows").with_concepts(Some("p1".into()), None))
                .with_entity(ClassProfile::new("p1", ["person"])),
        );
        let rp = f.aggregator.get_local_entity("rp").unwrap();
        let Entity::RelationshipProfile(profile) = &rp.aggregated_entity else {
            panic!("expected a relationship profile");
        };
        assert_eq!(profile.ends[0].concept.as_deref(), Some("p1"));
        assert_eq!(profile.ends[1].concept.as_deref(), Some("agent"));
        assert_eq!(profile.ends[1].name.as_ref().unwrap()["en"], "knows");
    }

    #[test]
    fn profiling_cycles_are_dropped_and_reported() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entities([
            ClassProfile::new("a", ["b"]),
            ClassProfile::new("b", ["a"]),
            ClassProfile::new("c", ["person"]),
        ]));
        assert!(f.aggregator.get_local_entity("a").is_none());
        assert!(f.aggregator.get_local_entity("b").is_none());
        assert!(f.aggregator.get_local_entity("c").is_some());
        let cycles: Vec<String> = f
            .aggregator
            .profiling_cycles()
            .into_iter()
            .map(|e| match e {
                AggregatorError::ProfilingCycle(id) => id,
                other => panic!("unexpected error {other}"),
            })
            .collect();
        assert_eq!(cycles, vec!["a".to_string(), "b".to_string()]);

        f.profiles.put(ClassProfile::new("b", ["person"]));
        assert!(f.aggregator.get_local_entity("a").is_some());
        assert!(f.aggregator.get_local_entity("b").is_some());
        assert!(f.aggregator.profiling_cycles().is_empty());
    }

    #[test]
    fn plain_entities_are_stored_read_only() {
        let f = fixture(
            InMemoryEntityModel::new("profiles")
                .with_alias("DCAT-AP")
                .with_entity(Class::new("extra").with_name("en", "Extra")),
        );
        let extra = f.aggregator.get_local_entity("extra").unwrap();
        assert!(extra.is_read_only);
        assert_eq!(extra.vocabulary_chain[0].name, "DCAT-AP");
        assert!(f.aggregator.dependencies_of("extra").is_empty());
    }

    #[test]
    fn view_passes_source_through_read_only() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entity(ClassProfile::new("p1", ["person"])));
        let view = f.aggregator.get_aggregated_entities();
        let mut ids: Vec<&str> = view.keys().map(String::as_str).collect();
        ids.sort();
        assert_eq!(ids, ["agent", "knows", "p1", "person", "person-agent"]);
        assert!(view.values().all(|w| w.is_read_only));
        assert_eq!(view["person"].vocabulary_chain[0].name, "Vocabulary");

        let (batches, _sub) = record(&f.aggregator);
        f.vocabulary.put(Class::new("extra").with_name("en", "Extra"));
        assert!(f.aggregator.get_local_entity("extra").unwrap().is_read_only);
        f.vocabulary.remove("extra");
        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches[0].updated.contains_key("extra"));
        assert_eq!(batches[1].removed, ["extra"]);
    }

    #[test]
    fn profile_layer_shadows_source_ids() {
        let f = fixture(
            InMemoryEntityModel::new("profiles").with_entity(Class::new("agent").with_name("en", "Local agent")),
        );
        assert_eq!(name_of(&f.aggregator, "agent").as_deref(), Some("Local agent"));

        let (batches, _sub) = record(&f.aggregator);
        f.vocabulary.put(Class::new("agent").with_name("en", "Renamed"));
        assert_eq!(name_of(&f.aggregator, "agent").as_deref(), Some("Local agent"));
        assert!(batches.lock().unwrap().iter().all(|b| b.is_empty()));

        f.profiles.remove("agent");
        assert_eq!(name_of(&f.aggregator, "agent").as_deref(), Some("Renamed"));
        let batches = batches.lock().unwrap();
        assert!(batches.last().unwrap().updated.contains_key("agent"));
    }

    #[tokio::test]
    async fn search_offers_profile_variants() {
        let f = fixture(
            InMemoryEntityModel::new("profiles").with_entity(ClassProfile::new("p1", ["person"])),
        );
        let results = f.aggregator.search("^person$").await.unwrap();
        let notes: Vec<(&str, Option<&str>)> = results.iter().map(|r| (r.id(), r.note.as_deref())).collect();
        assert_eq!(
            notes,
            vec![
                ("p1", Some("use as is")),
                ("p1", Some("create profile from profile")),
                ("person", Some("create new profile")),
            ]
        );

        let created = f
            .aggregator
            .external_entity_to_local_for_search(results[2].clone())
            .await
            .unwrap();
        assert_eq!(created.aggregated_entity.profiling(), vec!["person".to_string()]);
        assert_ne!(created.id(), "p1");
        assert!(f.profiles.get(created.id()).is_some());

        let reused = f
            .aggregator
            .external_entity_to_local_for_search(results[0].clone())
            .await
            .unwrap();
        assert_eq!(reused.id(), "p1");

        let derived = f
            .aggregator
            .external_entity_to_local_for_search(results[1].clone())
            .await
            .unwrap();
        assert_eq!(derived.aggregated_entity.profiling(), vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn read_only_profile_layer() {
        let f = fixture(
            InMemoryEntityModel::new("profiles").with_entity(ClassProfile::new("p1", ["person"])),
        );
        let aggregator = f.aggregator.with_options(ProfileOptions {
            can_add_entities: false,
            can_modify: false,
        });
        let results = aggregator.search("person").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].note.as_deref(), Some("use as is"));

        let err = aggregator
            .exec_operation(Operation::delete("p1"))
            .unwrap_err();
        assert!(matches!(err, AggregatorError::ReadOnly(_)));
    }

    #[tokio::test]
    async fn hierarchy_synthesizes_generalizations() {
        let f = fixture(InMemoryEntityModel::new("profiles").with_entities([
            ClassProfile::new("p1", ["person"]),
            ClassProfile::new("p2", ["p1"]),
        ]));
        let hierarchy = f.aggregator.get_hierarchy_for_lookup("p2").await.unwrap().unwrap();

        let edges: Vec<(String, String)> = hierarchy
            .iter()
            .filter_map(|e| match &e.aggregated_entity {
                Entity::Generalization(g) => Some((g.child.clone(), g.parent.clone())),
                _ => None,
            })
            .collect();
        assert!(edges.contains(&("p2".to_string(), "p1".to_string())));
        assert!(edges.contains(&("p1".to_string(), "person".to_string())));
        assert!(edges.contains(&("person".to_string(), "agent".to_string())));
        let synthesized: Vec<&str> = hierarchy
            .iter()
            .filter(|e| matches!(&e.aggregated_entity, Entity::Generalization(g) if g.child == "p1" || g.child == "p2"))
            .map(|e| e.id())
            .collect();
        assert_eq!(synthesized.len(), 2);
        assert!(synthesized.iter().all(|id| id.starts_with(PROFILING_LINK_PREFIX)));

        let agent = hierarchy.iter().find(|e| e.id() == "agent").unwrap();
        assert_eq!(
            agent.originating_model.last().unwrap().detail,
            FrameDetail::Via {
                profile: "p1".to_string()
            }
        );

        let from_below = f.aggregator.get_hierarchy("p1").await.unwrap().unwrap();
        assert!(from_below.iter().any(|e| e.id() == "p2"));

        let err = f.aggregator.get_hierarchy("nobody").await.unwrap_err();
        assert!(matches!(err, AggregatorError::NotLocal(_)));
        let passed_through = f.aggregator.get_hierarchy("person").await.unwrap().unwrap();
        assert!(passed_through.iter().any(|e| e.id() == "agent"));
        let forwarded = f.aggregator.get_hierarchy_for_lookup("person").await.unwrap().unwrap();
        assert!(forwarded
            .iter()
            .all(|e| e.originating_model.last().unwrap().detail == FrameDetail::Forwarded));
    }

    #[tokio::test]
    async fn hierarchy_extension_profiles_source_class() {
        let f = fixture(
            InMemoryEntityModel::new("profiles").with_entity(ClassProfile::new("p1", ["person"])),
        );
        let hierarchy = f.aggregator.get_hierarchy("p1").await.unwrap().unwrap();
        let agent = hierarchy.into_iter().find(|e| e.id() == "agent").unwrap();

        let local = f
            .aggregator
            .external_entity_to_local_for_hierarchy_extension("p1", agent, true)
            .await
            .unwrap();
        assert_eq!(local.aggregated_entity.profiling(), vec!["agent".to_string()]);
        assert_eq!(name_of(&f.aggregator, local.id()).as_deref(), Some("Agent"));

        let authored = f.profiles.entities().into_values().any(|e| {
            matches!(e, Entity::Generalization(g) if g.child == "p1" && g.parent == local.id())
        });
        assert!(authored);

        let hierarchy = f.aggregator.get_hierarchy("p1").await.unwrap().unwrap();
        assert!(hierarchy.iter().any(|e| e.id() == local.id()));
    }

    #[tokio::test]
    async fn surroundings_of_local_profile() {
        let f = fixture(
            InMemoryEntityModel::new("profiles")
                .with_entity(ClassProfile::new("p1", ["person"]))
                .with_entity(RelationshipProfile::of("rp", "knows").with_concepts(Some("p1".into()), None)),
        );
        let surroundings = f.aggregator.get_surroundings("p1").await.unwrap();
        let ids: Vec<&str> = surroundings.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["rp", "agent"]);

        let agent = surroundings[1].clone();
        let local = f
            .aggregator
            .external_entity_to_local_for_surroundings("p1", agent)
            .await
            .unwrap();
        assert_eq!(local.aggregated_entity.profiling(), vec!["agent".to_string()]);

        // A second request reuses the profile created by the first.
        let again = f
            .aggregator
            .external_entity_to_local_for_surroundings("p1", surroundings[1].clone())
            .await
            .unwrap();
        assert_eq!(again.id(), local.id());
    }

    #[tokio::test]
    async fn foreign_surroundings_are_forwarded() {
        let f = fixture(InMemoryEntityModel::new("profiles"));
        let surroundings = f.aggregator.get_surroundings("person").await.unwrap();
        assert!(!surroundings.is_empty());
        assert!(surroundings
            .iter()
            .all(|e| e.originating_model.len() == 2
                && e.originating_model[1].detail == FrameDetail::Forwarded));
    }
}
