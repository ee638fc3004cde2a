//! Query types and result structures

use crate::entity::{Entity, EntityId, Generalization};

/// Which way to walk generalization edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// child → parent
    Ancestors,
    /// parent → child
    Descendants,
    /// Both ways
    #[default]
    Both,
}

/// Result of a hierarchy walk
#[derive(Debug, Clone, Default)]
pub struct HierarchyResult {
    /// Entity the walk started from
    pub origin: EntityId,
    /// Every class reached, origin first
    pub classes: Vec<Entity>,
    /// Generalizations traversed
    pub generalizations: Vec<Generalization>,
}

impl HierarchyResult {
    pub fn empty(origin: impl Into<EntityId>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Classes and generalizations as one entity list
    pub fn into_entities(self) -> Vec<Entity> {
        let mut entities = self.classes;
        entities.extend(self.generalizations.into_iter().map(Entity::Generalization));
        entities
    }
}

/// Result of an inheritance path query
#[derive(Debug, Clone)]
pub struct PathResult {
    /// Whether a path was found
    pub found: bool,
    /// Classes from source to target (inclusive)
    pub path: Vec<Entity>,
    /// Generalizations linking consecutive classes
    pub edges: Vec<Generalization>,
    /// Number of hops
    pub length: usize,
}

impl PathResult {
    pub fn not_found() -> Self {
        Self {
            found: false,
            path: Vec::new(),
            edges: Vec::new(),
            length: 0,
        }
    }

    pub fn found(path: Vec<Entity>, edges: Vec<Generalization>) -> Self {
        let length = edges.len();
        Self {
            found: true,
            path,
            edges,
            length,
        }
    }
}
