//! Semantic Aggregator: incremental composition of semantic models
//!
//! Entity models (vocabularies, application profiles, caches of external
//! lookup services) are combined into a single, continuously updated view.
//!
//! # Core Concepts
//!
//! - **Entity models**: leaf sources of classes, relationships, generalizations and profiles
//! - **Aggregators**: derived views over models, kept current through change notifications
//! - **Composition**: a declarative tree telling the builder how aggregators nest
//!
//! # Example
//!
//! ```
//! use semantic_aggregator::{AggregatorBuilder, Class, EntityModel, InMemoryEntityModel};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let model = InMemoryEntityModel::new("https://example.org/ns/a")
//!     .with_entity(Class::new("a1").with_name("en", "Alpha"));
//! let aggregator = AggregatorBuilder::new()
//!     .with_model(Arc::new(model) as Arc<dyn EntityModel>)
//!     .build(&"https://example.org/ns/a".into())
//!     .await
//!     .unwrap();
//! assert_eq!(aggregator.get_aggregated_entities().len(), 1);
//! # });
//! ```

pub mod aggregator;
pub mod builder;
pub mod entity;
pub mod lookup;
pub mod model;
pub mod query;
pub mod workspace;

pub use aggregator::{
    AggregatedChanges, AggregatorError, AggregatorId, AggregatorResult, ApplicationProfileAggregator,
    ExternalEntityWrapped, FrameDetail, LegacyLookupAggregator, LocalEntityWrapped, MergeAggregator,
    ProfileAction, ProfileOptions, ProvenanceFrame, ProvenanceTag, SemanticModelAggregator,
    TupleIndex, VocabularyAggregator,
};
pub use builder::{AggregatorBuilder, BuildError, BuildResult, CompositionConfiguration};
pub use entity::{
    Class, ClassProfile, Entity, EntityId, EntityKind, Generalization, LanguageString, Relationship,
    RelationshipProfile,
};
pub use lookup::{LookupProvider, LookupProviderFactory, ProviderError, StaticLookupProviderFactory};
pub use model::{EntityModel, InMemoryEntityModel, ModelError, Operation, OperationResult, Subscription};
pub use workspace::{Workspace, WorkspaceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
