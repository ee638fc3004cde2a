//! Profile inheritance: how a profile's effective fields are derived from
//! the entities it profiles.
//!
//! For each inheritable field the profile's own value wins. Otherwise the
//! value comes from the profiled entity named by `*_from_profiled`, and
//! failing that from the first profiled entity that carries the field.

use super::types::{
    Cardinality, ClassProfile, Entity, EntityId, LanguageString, RelationshipEndProfile,
    RelationshipProfile,
};

fn non_empty(value: &LanguageString) -> Option<LanguageString> {
    if value.is_empty() {
        None
    } else {
        Some(value.clone())
    }
}

fn inherit<T, F>(own: &Option<T>, from: Option<&EntityId>, profiled: &[&Entity], get: F) -> Option<T>
where
    T: Clone,
    F: Fn(&Entity) -> Option<T>,
{
    if own.is_some() {
        return own.clone();
    }
    if let Some(from) = from {
        if let Some(source) = profiled.iter().find(|e| e.id() == from.as_str()) {
            return get(*source);
        }
    }
    profiled.iter().find_map(|e| get(*e))
}

fn class_name(entity: &Entity) -> Option<LanguageString> {
    match entity {
        Entity::Class(c) => non_empty(&c.name),
        Entity::ClassProfile(p) => p.name.clone(),
        _ => None,
    }
}

fn class_description(entity: &Entity) -> Option<LanguageString> {
    match entity {
        Entity::Class(c) => non_empty(&c.description),
        Entity::ClassProfile(p) => p.description.clone(),
        _ => None,
    }
}

fn class_usage_note(entity: &Entity) -> Option<LanguageString> {
    match entity {
        Entity::ClassProfile(p) => p.usage_note.clone(),
        _ => None,
    }
}

/// Effective form of `profile` given its resolved profiled entities
/// (classes or already aggregated class profiles).
pub fn aggregate_class_profile(profile: &ClassProfile, profiled: &[&Entity]) -> ClassProfile {
    ClassProfile {
        id: profile.id.clone(),
        iri: profile.iri.clone(),
        profiling: profile.profiling.clone(),
        name: inherit(
            &profile.name,
            profile.name_from_profiled.as_ref(),
            profiled,
            class_name,
        ),
        description: inherit(
            &profile.description,
            profile.description_from_profiled.as_ref(),
            profiled,
            class_description,
        ),
        usage_note: inherit(&profile.usage_note, None, profiled, class_usage_note),
        name_from_profiled: profile.name_from_profiled.clone(),
        description_from_profiled: profile.description_from_profiled.clone(),
    }
}

fn end_name(entity: &Entity, end: usize) -> Option<LanguageString> {
    match entity {
        Entity::Relationship(r) => non_empty(&r.ends[end].name),
        Entity::RelationshipProfile(p) => p.ends[end].name.clone(),
        _ => None,
    }
}

fn end_description(entity: &Entity, end: usize) -> Option<LanguageString> {
    match entity {
        Entity::Relationship(r) => non_empty(&r.ends[end].description),
        Entity::RelationshipProfile(p) => p.ends[end].description.clone(),
        _ => None,
    }
}

fn end_usage_note(entity: &Entity, end: usize) -> Option<LanguageString> {
    match entity {
        Entity::RelationshipProfile(p) => p.ends[end].usage_note.clone(),
        _ => None,
    }
}

fn end_concept(entity: &Entity, end: usize) -> Option<EntityId> {
    match entity {
        Entity::Relationship(r) => r.ends[end].concept.clone(),
        Entity::RelationshipProfile(p) => p.ends[end].concept.clone(),
        _ => None,
    }
}

fn end_cardinality(entity: &Entity, end: usize) -> Option<Cardinality> {
    match entity {
        Entity::Relationship(r) => r.ends[end].cardinality,
        Entity::RelationshipProfile(p) => p.ends[end].cardinality,
        _ => None,
    }
}

fn aggregate_end(
    own: &RelationshipEndProfile,
    end: usize,
    profiled: &[&Entity],
) -> RelationshipEndProfile {
    RelationshipEndProfile {
        iri: own.iri.clone(),
        concept: inherit(&own.concept, None, profiled, |e| end_concept(e, end)),
        profiling: own.profiling.clone(),
        name: inherit(&own.name, own.name_from_profiled.as_ref(), profiled, |e| {
            end_name(e, end)
        }),
        description: inherit(
            &own.description,
            own.description_from_profiled.as_ref(),
            profiled,
            |e| end_description(e, end),
        ),
        usage_note: inherit(&own.usage_note, None, profiled, |e| end_usage_note(e, end)),
        name_from_profiled: own.name_from_profiled.clone(),
        description_from_profiled: own.description_from_profiled.clone(),
        cardinality: inherit(&own.cardinality, None, profiled, |e| end_cardinality(e, end)),
    }
}

/// Effective form of a relationship profile; `profiled[i]` holds the
/// resolved entities profiled by end `i`.
pub fn aggregate_relationship_profile(
    profile: &RelationshipProfile,
    profiled: [&[&Entity]; 2],
) -> RelationshipProfile {
    RelationshipProfile {
        id: profile.id.clone(),
        ends: [
            aggregate_end(&profile.ends[0], 0, profiled[0]),
            aggregate_end(&profile.ends[1], 1, profiled[1]),
        ],
    }
}
