//! SemanticModelAggregator trait and the wrapped-entity types it exchanges
//!
//! An aggregator exposes a read view (`get_aggregated_entities`, change
//! subscription) plus the operations that turn an entity found elsewhere
//! (search, surroundings, hierarchy) into one that is local to it.

use crate::entity::{Entity, EntityId, EntityKind};
use crate::lookup::ProviderError;
use crate::model::{ChangeSet, Listener, ModelError, Operation, OperationResult, Subscription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of an aggregator instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatorId(String);

impl AggregatorId {
    /// Create a new random AggregatorId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AggregatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AggregatorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Marks which vocabulary an entity came through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceTag {
    pub name: String,
}

impl ProvenanceTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// What an application profile aggregator offers for a search hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileAction {
    /// Reuse the local profile as it is
    UseAsIs,
    /// Create a new profile profiling the local profile
    CreateProfileFromProfile,
    /// Materialize the source entity and profile it
    CreateNewProfile,
}

impl ProfileAction {
    pub fn note(&self) -> &'static str {
        match self {
            ProfileAction::UseAsIs => "use as is",
            ProfileAction::CreateProfileFromProfile => "create profile from profile",
            ProfileAction::CreateNewProfile => "create new profile",
        }
    }
}

/// How one aggregator level produced an external entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FrameDetail {
    /// Produced by a leaf aggregator from its own model or provider
    Source,
    /// Produced by the given member of a merge aggregator
    Member { member: AggregatorId },
    /// Search hit of an application profile aggregator
    Profile { action: ProfileAction },
    /// Already local to the aggregator that produced it
    Local,
    /// Forwarded untouched from the wrapped source
    Forwarded,
    /// Reached from the source while resolving the given local profile
    Via { profile: EntityId },
}

/// One level of the `originating_model` stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceFrame {
    pub aggregator: AggregatorId,
    pub detail: FrameDetail,
}

impl ProvenanceFrame {
    pub fn new(aggregator: AggregatorId, detail: FrameDetail) -> Self {
        Self { aggregator, detail }
    }
}

/// An entity as owned by an aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEntityWrapped {
    pub aggregated_entity: Entity,
    pub is_read_only: bool,
    pub vocabulary_chain: Vec<ProvenanceTag>,
}

impl LocalEntityWrapped {
    pub fn new(aggregated_entity: Entity, is_read_only: bool, vocabulary_chain: Vec<ProvenanceTag>) -> Self {
        Self {
            aggregated_entity,
            is_read_only,
            vocabulary_chain,
        }
    }

    pub fn id(&self) -> &str {
        self.aggregated_entity.id()
    }
}

/// An entity discovered through another aggregator's queries.
///
/// `originating_model` is a stack: the outermost aggregator's frame is last.
/// Each aggregator pops its own frame when asked to materialize the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEntityWrapped<T = Entity> {
    pub aggregated_entity: T,
    pub vocabulary_chain: Vec<ProvenanceTag>,
    pub originating_model: Vec<ProvenanceFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ExternalEntityWrapped<Entity> {
    pub fn new(aggregated_entity: Entity, vocabulary_chain: Vec<ProvenanceTag>) -> Self {
        Self {
            aggregated_entity,
            vocabulary_chain,
            originating_model: Vec::new(),
            note: None,
        }
    }

    /// Wrap a local entity for consumers expecting external results.
    pub fn from_local(local: &LocalEntityWrapped, frame: ProvenanceFrame) -> Self {
        Self {
            aggregated_entity: local.aggregated_entity.clone(),
            vocabulary_chain: local.vocabulary_chain.clone(),
            originating_model: vec![frame],
            note: None,
        }
    }

    pub fn id(&self) -> &str {
        self.aggregated_entity.id()
    }
}

impl<T> ExternalEntityWrapped<T> {
    /// Push the frame of the aggregator handing this entity outwards.
    pub fn with_frame(mut self, frame: ProvenanceFrame) -> Self {
        self.originating_model.push(frame);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Pop the outermost frame, which must belong to `owner`.
    pub fn take_frame(&mut self, owner: &AggregatorId) -> AggregatorResult<FrameDetail> {
        match self.originating_model.last() {
            Some(frame) if &frame.aggregator == owner => {}
            other => {
                return Err(AggregatorError::ForeignProvenance {
                    expected: owner.clone(),
                    found: other.map(|f| f.aggregator.clone()),
                })
            }
        }
        self.originating_model
            .pop()
            .map(|frame| frame.detail)
            .ok_or_else(|| AggregatorError::ForeignProvenance {
                expected: owner.clone(),
                found: None,
            })
    }
}

/// Errors raised by aggregators
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("entity {0} is not aggregated locally")]
    NotLocal(EntityId),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("cannot pick a write target among {0} merged models")]
    AmbiguousWriteTarget(usize),

    #[error("aggregator {0} does not allow this change")]
    ReadOnly(AggregatorId),

    #[error("entity was not produced by aggregator {expected} (found {found:?})")]
    ForeignProvenance {
        expected: AggregatorId,
        found: Option<AggregatorId>,
    },

    #[error("unexpected provenance frame {0:?}")]
    UnexpectedFrame(FrameDetail),

    #[error("{operation} does not support {kind:?} entities")]
    UnsupportedEntity {
        operation: &'static str,
        kind: EntityKind,
    },

    #[error("entity {0} has no IRI")]
    MissingIri(EntityId),

    #[error("profiling cycle through {0}")]
    ProfilingCycle(EntityId),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for aggregator operations
pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// Listener type for aggregated changes
pub type AggregatorListener = Listener<LocalEntityWrapped>;

/// Batch of aggregated changes
pub type AggregatedChanges = ChangeSet<LocalEntityWrapped>;

/// The contract every aggregator implements.
#[async_trait]
pub trait SemanticModelAggregator: Send + Sync {
    /// Identity of this aggregator instance, used in provenance frames
    fn id(&self) -> &AggregatorId;

    /// Class-name search; results carry frames for later materialization
    async fn search(&self, query: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>>;

    /// Relationships and neighbouring classes of `id`
    async fn get_surroundings(&self, id: &str) -> AggregatorResult<Vec<ExternalEntityWrapped>>;

    /// Full hierarchy of a locally owned entity; other ids are an error
    async fn get_hierarchy(&self, id: &str) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>>;

    /// Hierarchy used for lookups; may span model boundaries
    async fn get_hierarchy_for_lookup(
        &self,
        id: &str,
    ) -> AggregatorResult<Option<Vec<ExternalEntityWrapped>>>;

    /// Make a search hit local
    async fn external_entity_to_local_for_search(
        &self,
        entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped>;

    /// Make an entity from the surroundings of `from_entity_id` local
    async fn external_entity_to_local_for_surroundings(
        &self,
        from_entity_id: &str,
        entity: ExternalEntityWrapped,
    ) -> AggregatorResult<LocalEntityWrapped>;

    /// Make an entity from the hierarchy of `from_entity_id` local
    async fn external_entity_to_local_for_hierarchy_extension(
        &self,
        from_entity_id: &str,
        entity: ExternalEntityWrapped,
        is_entity_more_general: bool,
    ) -> AggregatorResult<LocalEntityWrapped>;

    /// Apply an operation to the underlying writable model
    fn exec_operation(&self, operation: Operation) -> AggregatorResult<OperationResult>;

    fn get_local_entity(&self, id: &str) -> Option<LocalEntityWrapped>;

    fn subscribe_to_changes(&self, listener: AggregatorListener) -> Subscription;

    fn get_aggregated_entities(&self) -> HashMap<EntityId, LocalEntityWrapped>;
}
