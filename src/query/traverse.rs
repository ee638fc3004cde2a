//! Generalization hierarchy traversal

use super::types::{Direction, HierarchyResult};
use crate::entity::{Entity, EntityId, Generalization};
use std::collections::{HashMap, HashSet, VecDeque};

/// Index of generalization edges and classes over an entity collection
pub struct GeneralizationIndex<'a> {
    entities: HashMap<&'a str, &'a Entity>,
    /// child → generalizations where it is the child
    upward: HashMap<&'a str, Vec<&'a Generalization>>,
    /// parent → generalizations where it is the parent
    downward: HashMap<&'a str, Vec<&'a Generalization>>,
}

impl<'a> GeneralizationIndex<'a> {
    pub fn build<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        let mut index = Self {
            entities: HashMap::new(),
            upward: HashMap::new(),
            downward: HashMap::new(),
        };
        for entity in entities {
            index.entities.insert(entity.id(), entity);
            if let Entity::Generalization(g) = entity {
                index.upward.entry(g.child.as_str()).or_default().push(g);
                index.downward.entry(g.parent.as_str()).or_default().push(g);
            }
        }
        index
    }

    pub fn get(&self, id: &str) -> Option<&'a Entity> {
        self.entities.get(id).copied()
    }

    /// Find a class-like entity by IRI
    pub fn by_iri(&self, iri: &str) -> Option<&'a Entity> {
        self.entities
            .values()
            .copied()
            .filter(|e| e.is_class_like())
            .find(|e| e.iri() == Some(iri))
    }

    pub fn parents_of(&self, id: &str) -> &[&'a Generalization] {
        self.upward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_of(&self, id: &str) -> &[&'a Generalization] {
        self.downward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Query collecting the generalization closure around a class
#[derive(Debug, Clone)]
pub struct HierarchyQuery {
    /// Starting class id
    pub origin: EntityId,
    pub direction: Direction,
    /// Maximum depth (None = unbounded)
    pub max_depth: Option<usize>,
}

impl HierarchyQuery {
    pub fn from(origin: impl Into<EntityId>) -> Self {
        Self {
            origin: origin.into(),
            direction: Direction::Both,
            max_depth: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Execute the walk. Ancestors and descendants are walked separately so
    /// that siblings (descendants of ancestors) are not included.
    pub fn execute(&self, index: &GeneralizationIndex<'_>) -> HierarchyResult {
        let mut result = HierarchyResult::empty(self.origin.clone());
        let Some(origin) = index.get(&self.origin) else {
            return result;
        };
        result.classes.push(origin.clone());

        let mut seen_classes: HashSet<EntityId> = HashSet::from([self.origin.clone()]);
        let mut seen_edges: HashSet<EntityId> = HashSet::new();

        if matches!(self.direction, Direction::Ancestors | Direction::Both) {
            self.walk(index, true, &mut seen_classes, &mut seen_edges, &mut result);
        }
        if matches!(self.direction, Direction::Descendants | Direction::Both) {
            self.walk(index, false, &mut seen_classes, &mut seen_edges, &mut result);
        }
        result
    }

    fn walk(
        &self,
        index: &GeneralizationIndex<'_>,
        upward: bool,
        seen_classes: &mut HashSet<EntityId>,
        seen_edges: &mut HashSet<EntityId>,
        result: &mut HierarchyResult,
    ) {
        let mut visited: HashSet<EntityId> = HashSet::from([self.origin.clone()]);
        let mut queue: VecDeque<(EntityId, usize)> = VecDeque::from([(self.origin.clone(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if self.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            let edges = if upward {
                index.parents_of(&current)
            } else {
                index.children_of(&current)
            };
            for edge in edges {
                let next = if upward { &edge.parent } else { &edge.child };
                if seen_edges.insert(edge.id.clone()) {
                    result.generalizations.push((*edge).clone());
                }
                if !visited.insert(next.clone()) {
                    continue;
                }
                if seen_classes.insert(next.clone()) {
                    if let Some(class) = index.get(next) {
                        result.classes.push(class.clone());
                    }
                }
                queue.push_back((next.clone(), depth + 1));
            }
        }
    }
}
