//! IRI absolutization against a model's base IRI

use super::types::Entity;

/// True if `iri` starts with a URI scheme (`http:`, `urn:`, ...).
pub fn is_absolute(iri: &str) -> bool {
    let Some((scheme, _)) = iri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve `iri` against `base`. Absolute IRIs, and any IRI when there is no
/// base, are returned unchanged.
pub fn absolutize(iri: &str, base: Option<&str>) -> String {
    match base {
        Some(base) if !is_absolute(iri) => format!("{}{}", base, iri),
        _ => iri.to_string(),
    }
}

fn absolutize_opt(iri: &mut Option<String>, base: Option<&str>) {
    if let Some(value) = iri.as_mut() {
        *value = absolutize(value, base);
    }
}

/// Rewrite every IRI carried by `entity` (including relationship ends)
/// into absolute form.
pub fn absolutize_entity(mut entity: Entity, base: Option<&str>) -> Entity {
    if base.is_none() {
        return entity;
    }
    match &mut entity {
        Entity::Class(c) => absolutize_opt(&mut c.iri, base),
        Entity::Relationship(r) => {
            absolutize_opt(&mut r.iri, base);
            for end in r.ends.iter_mut() {
                absolutize_opt(&mut end.iri, base);
            }
        }
        Entity::Generalization(g) => absolutize_opt(&mut g.iri, base),
        Entity::ClassProfile(p) => absolutize_opt(&mut p.iri, base),
        Entity::RelationshipProfile(p) => {
            for end in p.ends.iter_mut() {
                absolutize_opt(&mut end.iri, base);
            }
        }
    }
    entity
}
