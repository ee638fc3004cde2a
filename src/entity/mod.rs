//! Entity data model: classes, relationships, generalizations and profiles

mod iri;
mod profile;
mod types;

pub use iri::{absolutize, absolutize_entity, is_absolute};
pub use profile::{aggregate_class_profile, aggregate_relationship_profile};
pub use types::{
    Cardinality, Class, ClassProfile, Entity, EntityId, EntityKind, Generalization,
    LanguageString, Relationship, RelationshipEnd, RelationshipEndProfile, RelationshipProfile,
};
