//! LookupProvider trait and a static, configuration-driven implementation

use crate::entity::{Entity, EntityId};
use crate::query::{GeneralizationIndex, HierarchyQuery, NameQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from an external lookup provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown IRI: {0}")]
    UnknownIri(String),

    #[error("invalid provider configuration: {0}")]
    InvalidConfiguration(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// External hierarchy/search service, keyed by IRI.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Classes whose names match `query`
    async fn search(&self, query: &str) -> Result<Vec<Entity>, ProviderError>;

    /// The class with `iri` plus all ancestors and descendants and the
    /// generalizations linking them
    async fn full_hierarchy(&self, iri: &str) -> Result<Vec<Entity>, ProviderError>;

    /// Relationships touching the class with `iri` and the classes at
    /// their other ends; empty for IRIs the provider does not know
    async fn surroundings(&self, iri: &str) -> Result<Vec<Entity>, ProviderError>;
}

/// Creates providers from the `configuration` of a legacy cache node.
#[async_trait]
pub trait LookupProviderFactory: Send + Sync {
    async fn create(
        &self,
        configuration: &serde_json::Value,
    ) -> Result<Arc<dyn LookupProvider>, ProviderError>;
}

/// Configuration accepted by [`StaticLookupProviderFactory`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticLookupConfiguration {
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// Provider answering from a fixed entity list. Entity ids are expected to
/// equal their IRIs.
#[derive(Debug, Clone, Default)]
pub struct StaticLookupProvider {
    entities: Vec<Entity>,
}

impl StaticLookupProvider {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    fn class_id_for_iri(&self, iri: &str) -> Result<EntityId, ProviderError> {
        self.entities
            .iter()
            .find(|e| e.is_class_like() && (e.iri() == Some(iri) || e.id() == iri))
            .map(|e| e.id().to_string())
            .ok_or_else(|| ProviderError::UnknownIri(iri.to_string()))
    }
}

#[async_trait]
impl LookupProvider for StaticLookupProvider {
    async fn search(&self, query: &str) -> Result<Vec<Entity>, ProviderError> {
        Ok(NameQuery::new(query)
            .execute(self.entities.iter(), |e| *e)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn full_hierarchy(&self, iri: &str) -> Result<Vec<Entity>, ProviderError> {
        let origin = self.class_id_for_iri(iri)?;
        let index = GeneralizationIndex::build(&self.entities);
        Ok(HierarchyQuery::from(origin).execute(&index).into_entities())
    }

    async fn surroundings(&self, iri: &str) -> Result<Vec<Entity>, ProviderError> {
        let Ok(origin) = self.class_id_for_iri(iri) else {
            return Ok(Vec::new());
        };
        let mut result: Vec<Entity> = Vec::new();
        let mut other_ends: Vec<String> = Vec::new();
        for entity in &self.entities {
            let Some(concepts) = entity.end_concepts() else {
                continue;
            };
            if !concepts.iter().any(|c| *c == Some(origin.as_str())) {
                continue;
            }
            result.push(entity.clone());
            for concept in concepts.into_iter().flatten() {
                if concept != origin && !other_ends.iter().any(|c| c == concept) {
                    other_ends.push(concept.to_string());
                }
            }
        }
        for id in other_ends {
            if let Some(class) = self.entities.iter().find(|e| e.id() == id) {
                result.push(class.clone());
            }
        }
        Ok(result)
    }
}

/// Builds [`StaticLookupProvider`]s from `{ "entities": [...] }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticLookupProviderFactory;

#[async_trait]
impl LookupProviderFactory for StaticLookupProviderFactory {
    async fn create(
        &self,
        configuration: &serde_json::Value,
    ) -> Result<Arc<dyn LookupProvider>, ProviderError> {
        let config: StaticLookupConfiguration = serde_json::from_value(configuration.clone())
            .map_err(|e| ProviderError::InvalidConfiguration(e.to_string()))?;
        Ok(Arc::new(StaticLookupProvider::new(config.entities)))
    }
}
