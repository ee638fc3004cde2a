//! Semantic entity representation
//!
//! Every entity an aggregator handles is one variant of [`Entity`]. The
//! variant tag is explicit (`type` in serialized form), so dispatch is an
//! exhaustive `match` rather than a structural guess.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque, stable identifier of an entity
pub type EntityId = String;

/// Language tag → text
pub type LanguageString = BTreeMap<String, String>;

/// Minimum and optional maximum cardinality of a relationship end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    pub min: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Cardinality {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }
}

/// A vocabulary class
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Class {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    #[serde(default)]
    pub name: LanguageString,
    #[serde(default)]
    pub description: LanguageString,
}

impl Class {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_iri(mut self, iri: impl Into<String>) -> Self {
        self.iri = Some(iri.into());
        self
    }

    pub fn with_name(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.name.insert(lang.into(), text.into());
        self
    }

    pub fn with_description(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.description.insert(lang.into(), text.into());
        self
    }
}

/// One of the two ordered ends of a relationship
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipEnd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    /// The class this end points to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<EntityId>,
    #[serde(default)]
    pub name: LanguageString,
    #[serde(default)]
    pub description: LanguageString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
}

impl RelationshipEnd {
    pub fn to_concept(concept: impl Into<EntityId>) -> Self {
        Self {
            concept: Some(concept.into()),
            ..Default::default()
        }
    }

    pub fn with_iri(mut self, iri: impl Into<String>) -> Self {
        self.iri = Some(iri.into());
        self
    }

    pub fn with_name(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.name.insert(lang.into(), text.into());
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }
}

/// A binary relationship between two classes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relationship {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    #[serde(default)]
    pub name: LanguageString,
    #[serde(default)]
    pub description: LanguageString,
    pub ends: [RelationshipEnd; 2],
}

impl Relationship {
    /// Relationship from `domain` to `range`; the range end carries the name.
    pub fn between(
        id: impl Into<EntityId>,
        domain: impl Into<EntityId>,
        range: impl Into<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            ends: [
                RelationshipEnd::to_concept(domain),
                RelationshipEnd::to_concept(range),
            ],
            ..Default::default()
        }
    }

    pub fn with_iri(mut self, iri: impl Into<String>) -> Self {
        self.iri = Some(iri.into());
        self
    }

    pub fn with_end_name(
        mut self,
        end: usize,
        lang: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        if let Some(e) = self.ends.get_mut(end) {
            e.name.insert(lang.into(), text.into());
        }
        self
    }
}

/// "child is a specialization of parent"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generalization {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    pub child: EntityId,
    pub parent: EntityId,
}

impl Generalization {
    pub fn new(
        id: impl Into<EntityId>,
        child: impl Into<EntityId>,
        parent: impl Into<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            iri: None,
            child: child.into(),
            parent: parent.into(),
        }
    }
}

/// A profile narrowing one or more classes (or other class profiles)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassProfile {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    pub profiling: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LanguageString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LanguageString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_note: Option<LanguageString>,
    /// Take the name from this profiled entity instead of the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_from_profiled: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_from_profiled: Option<EntityId>,
}

impl ClassProfile {
    pub fn new<I, S>(id: impl Into<EntityId>, profiling: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        Self {
            id: id.into(),
            profiling: profiling.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.name
            .get_or_insert_with(LanguageString::new)
            .insert(lang.into(), text.into());
        self
    }

    pub fn with_usage_note(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.usage_note
            .get_or_insert_with(LanguageString::new)
            .insert(lang.into(), text.into());
        self
    }
}

/// One end of a relationship profile, profiling ends of other relationships
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipEndProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<EntityId>,
    #[serde(default)]
    pub profiling: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LanguageString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LanguageString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_note: Option<LanguageString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_from_profiled: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_from_profiled: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
}

/// A profile of a relationship; profiling is declared per end
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipProfile {
    pub id: EntityId,
    pub ends: [RelationshipEndProfile; 2],
}

impl RelationshipProfile {
    /// Profile of `relationship` with both ends profiling it.
    pub fn of(id: impl Into<EntityId>, relationship: impl Into<EntityId>) -> Self {
        let relationship = relationship.into();
        let end = RelationshipEndProfile {
            profiling: vec![relationship],
            ..Default::default()
        };
        Self {
            id: id.into(),
            ends: [end.clone(), end],
        }
    }

    pub fn with_concepts(
        mut self,
        domain: Option<EntityId>,
        range: Option<EntityId>,
    ) -> Self {
        self.ends[0].concept = domain;
        self.ends[1].concept = range;
        self
    }

    /// Every id profiled by any end, in end order, without duplicates.
    pub fn profiling(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = Vec::new();
        for id in self.ends.iter().flat_map(|e| e.profiling.iter()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// The closed set of entity kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Entity {
    Class(Class),
    Relationship(Relationship),
    Generalization(Generalization),
    ClassProfile(ClassProfile),
    RelationshipProfile(RelationshipProfile),
}

/// Discriminant of [`Entity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Class,
    Relationship,
    Generalization,
    ClassProfile,
    RelationshipProfile,
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Class(c) => &c.id,
            Entity::Relationship(r) => &r.id,
            Entity::Generalization(g) => &g.id,
            Entity::ClassProfile(p) => &p.id,
            Entity::RelationshipProfile(p) => &p.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Class(_) => EntityKind::Class,
            Entity::Relationship(_) => EntityKind::Relationship,
            Entity::Generalization(_) => EntityKind::Generalization,
            Entity::ClassProfile(_) => EntityKind::ClassProfile,
            Entity::RelationshipProfile(_) => EntityKind::RelationshipProfile,
        }
    }

    /// Entity-level IRI; relationship profiles only carry IRIs on their ends.
    pub fn iri(&self) -> Option<&str> {
        match self {
            Entity::Class(c) => c.iri.as_deref(),
            Entity::Relationship(r) => r.iri.as_deref(),
            Entity::Generalization(g) => g.iri.as_deref(),
            Entity::ClassProfile(p) => p.iri.as_deref(),
            Entity::RelationshipProfile(_) => None,
        }
    }

    /// Whether this entity behaves as a class (plain or profiled)
    pub fn is_class_like(&self) -> bool {
        matches!(self, Entity::Class(_) | Entity::ClassProfile(_))
    }

    /// Whether this entity behaves as a relationship (plain or profiled)
    pub fn is_relationship_like(&self) -> bool {
        matches!(self, Entity::Relationship(_) | Entity::RelationshipProfile(_))
    }

    /// Ids this entity profiles; empty for non-profile entities.
    pub fn profiling(&self) -> Vec<EntityId> {
        match self {
            Entity::ClassProfile(p) => p.profiling.clone(),
            Entity::RelationshipProfile(p) => p.profiling(),
            Entity::Class(_) | Entity::Relationship(_) | Entity::Generalization(_) => Vec::new(),
        }
    }

    /// Display name for classes and class profiles.
    pub fn display_name(&self) -> Option<&LanguageString> {
        match self {
            Entity::Class(c) => Some(&c.name),
            Entity::ClassProfile(p) => p.name.as_ref(),
            _ => None,
        }
    }

    /// Concepts of both ends, for relationship-like entities.
    pub fn end_concepts(&self) -> Option<[Option<&str>; 2]> {
        match self {
            Entity::Relationship(r) => Some([
                r.ends[0].concept.as_deref(),
                r.ends[1].concept.as_deref(),
            ]),
            Entity::RelationshipProfile(p) => Some([
                p.ends[0].concept.as_deref(),
                p.ends[1].concept.as_deref(),
            ]),
            _ => None,
        }
    }
}

impl From<Class> for Entity {
    fn from(value: Class) -> Self {
        Entity::Class(value)
    }
}

impl From<Relationship> for Entity {
    fn from(value: Relationship) -> Self {
        Entity::Relationship(value)
    }
}

impl From<Generalization> for Entity {
    fn from(value: Generalization) -> Self {
        Entity::Generalization(value)
    }
}

impl From<ClassProfile> for Entity {
    fn from(value: ClassProfile) -> Self {
        Entity::ClassProfile(value)
    }
}

impl From<RelationshipProfile> for Entity {
    fn from(value: RelationshipProfile) -> Self {
        Entity::RelationshipProfile(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn class_serializes_with_kind_tag() {
        let entity: Entity = Class::new("c1").with_name("en", "Person").into();
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["type"], "class");
        assert_eq!(value["id"], "c1");
        assert_eq!(value["name"]["en"], "Person");
    }

    #[test]
    fn class_profile_deserializes_from_kebab_tag() {
        let entity: Entity = serde_json::from_value(json!({
            "type": "class-profile",
            "id": "p1",
            "profiling": ["c1", "c2"],
            "usage_note": {"en": "Use for people"}
        }))
        .unwrap();
        assert_eq!(entity.kind(), EntityKind::ClassProfile);
        assert_eq!(entity.profiling(), vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn relationship_profile_profiling_is_deduplicated_across_ends() {
        let mut profile = RelationshipProfile::of("rp", "r1");
        profile.ends[1].profiling.push("r2".to_string());
        assert_eq!(profile.profiling(), vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn end_concepts_only_for_relationship_like() {
        let rel: Entity = Relationship::between("r", "a", "b").into();
        assert_eq!(rel.end_concepts(), Some([Some("a"), Some("b")]));
        let class: Entity = Class::new("a").into();
        assert!(class.end_concepts().is_none());
    }
}
