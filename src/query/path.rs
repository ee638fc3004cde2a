//! Inheritance path finding

use super::traverse::GeneralizationIndex;
use super::types::PathResult;
use crate::entity::{EntityId, Generalization};
use std::collections::{HashMap, HashSet, VecDeque};

/// Query for the shortest chain of generalizations from a class up to
/// one of its ancestors
#[derive(Debug, Clone)]
pub struct PathQuery {
    /// The more specific class
    pub source: EntityId,
    /// The more general class
    pub target: EntityId,
    /// Maximum path length to search
    pub max_length: usize,
}

impl PathQuery {
    pub fn between(source: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            max_length: 32,
        }
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Execute the path query (BFS over child → parent edges)
    pub fn execute(&self, index: &GeneralizationIndex<'_>) -> PathResult {
        if self.source == self.target {
            return match index.get(&self.source) {
                Some(entity) => PathResult::found(vec![entity.clone()], vec![]),
                None => PathResult::not_found(),
            };
        }

        let mut visited: HashSet<EntityId> = HashSet::from([self.source.clone()]);
        let mut queue: VecDeque<(EntityId, usize)> = VecDeque::from([(self.source.clone(), 0)]);
        let mut predecessors: HashMap<EntityId, (EntityId, Generalization)> = HashMap::new();
        let mut found = false;

        'search: while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_length {
                continue;
            }
            for edge in index.parents_of(&current) {
                if !visited.insert(edge.parent.clone()) {
                    continue;
                }
                predecessors.insert(edge.parent.clone(), (current.clone(), (*edge).clone()));
                if edge.parent == self.target {
                    found = true;
                    break 'search;
                }
                queue.push_back((edge.parent.clone(), depth + 1));
            }
        }

        if !found {
            return PathResult::not_found();
        }
        self.reconstruct_path(index, &predecessors)
    }

    /// Walk predecessors back from the target. Classes missing from the
    /// index are skipped; the edges are always complete.
    fn reconstruct_path(
        &self,
        index: &GeneralizationIndex<'_>,
        predecessors: &HashMap<EntityId, (EntityId, Generalization)>,
    ) -> PathResult {
        let mut path = Vec::new();
        let mut edges = Vec::new();
        let mut current = self.target.clone();

        while let Some((pred, edge)) = predecessors.get(&current) {
            if let Some(entity) = index.get(&current) {
                path.push(entity.clone());
            }
            edges.push(edge.clone());
            current = pred.clone();
        }
        if let Some(source) = index.get(&self.source) {
            path.push(source.clone());
        }

        path.reverse();
        edges.reverse();
        PathResult::found(path, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Class, Entity};

    fn entities() -> Vec<Entity> {
        vec![
            Class::new("thing").into(),
            Class::new("agent").into(),
            Class::new("person").into(),
            Generalization::new("g1", "agent", "thing").into(),
            Generalization::new("g2", "person", "agent").into(),
        ]
    }

    #[test]
    fn finds_upward_chain() {
        let entities = entities();
        let index = GeneralizationIndex::build(&entities);
        let result = PathQuery::between("person", "thing").execute(&index);
        assert!(result.found);
        assert_eq!(result.length, 2);
        let ids: Vec<&str> = result.path.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["person", "agent", "thing"]);
        assert_eq!(result.edges[0].id, "g2");
    }

    #[test]
    fn does_not_walk_downward() {
        let entities = entities();
        let index = GeneralizationIndex::build(&entities);
        assert!(!PathQuery::between("thing", "person").execute(&index).found);
    }

    #[test]
    fn same_source_and_target() {
        let entities = entities();
        let index = GeneralizationIndex::build(&entities);
        let result = PathQuery::between("agent", "agent").execute(&index);
        assert!(result.found);
        assert_eq!(result.length, 0);
    }
}
