//! Aggregator builder: turns a composition configuration into an aggregator tree
//!
//! Entity models are registered by id; the configuration references them by
//! that id. Models carrying cache metadata become legacy lookup aggregators
//! and need a [`LookupProviderFactory`].

mod config;
mod heuristic;

pub use config::{CacheConfiguration, CompositionConfiguration, CompositionNode};
pub use heuristic::default_composition;

use crate::aggregator::{
    ApplicationProfileAggregator, LegacyLookupAggregator, MergeAggregator, ProfileOptions,
    SemanticModelAggregator, VocabularyAggregator,
};
use crate::lookup::{LookupProviderFactory, ProviderError};
use crate::model::EntityModel;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building an aggregator tree
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid composition configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("model {0} caches a lookup provider but no provider factory is registered")]
    MissingProviderFactory(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type BuildResult<T> = Result<T, BuildError>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Registry of entity models plus the provider factory used for caches.
#[derive(Clone, Default)]
pub struct AggregatorBuilder {
    models: BTreeMap<String, Arc<dyn EntityModel>>,
    provider_factory: Option<Arc<dyn LookupProviderFactory>>,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn EntityModel>) -> Self {
        self.models.insert(model.id().to_string(), model);
        self
    }

    pub fn with_models<I>(self, models: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn EntityModel>>,
    {
        models.into_iter().fold(self, |builder, model| builder.with_model(model))
    }

    pub fn with_provider_factory(mut self, factory: Arc<dyn LookupProviderFactory>) -> Self {
        self.provider_factory = Some(factory);
        self
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Build the aggregator tree described by `config`.
    ///
    /// Models named explicitly anywhere in the tree are never picked up by a
    /// `merge` node with `models: null`.
    pub async fn build(
        &self,
        config: &CompositionConfiguration,
    ) -> BuildResult<Arc<dyn SemanticModelAggregator>> {
        let mut used = config.referenced_models();
        if let Some(unknown) = used.iter().find(|id| !self.models.contains_key(*id)) {
            return Err(BuildError::UnknownModel(unknown.clone()));
        }
        self.build_node(config, &mut used).await
    }

    /// Parse `value` as a composition configuration and build it.
    pub async fn build_from_json(
        &self,
        value: &serde_json::Value,
    ) -> BuildResult<Arc<dyn SemanticModelAggregator>> {
        let config = CompositionConfiguration::from_json(value)?;
        self.build(&config).await
    }

    fn build_node<'a>(
        &'a self,
        config: &'a CompositionConfiguration,
        used: &'a mut BTreeSet<String>,
    ) -> BoxFuture<'a, BuildResult<Arc<dyn SemanticModelAggregator>>> {
        Box::pin(async move {
            match config {
                CompositionConfiguration::Model(id) => self.build_model(id).await,
                CompositionConfiguration::Node(CompositionNode::ApplicationProfile {
                    model,
                    profiles,
                    can_add_entities,
                    can_modify,
                }) => {
                    let source = self.build_node(profiles, &mut *used).await?;
                    let profile_model = self.model(model)?;
                    debug!(model = %model, "building application profile aggregator");
                    let aggregator = ApplicationProfileAggregator::new(profile_model, source).with_options(
                        ProfileOptions {
                            can_add_entities: *can_add_entities,
                            can_modify: *can_modify,
                        },
                    );
                    Ok(Arc::new(aggregator) as Arc<dyn SemanticModelAggregator>)
                }
                CompositionConfiguration::Node(CompositionNode::Merge { models: Some(models) }) => {
                    let mut members = Vec::with_capacity(models.len());
                    for node in models {
                        members.push(self.build_node(node, &mut *used).await?);
                    }
                    debug!(members = members.len(), "building merge aggregator");
                    Ok(Arc::new(MergeAggregator::new(members)) as Arc<dyn SemanticModelAggregator>)
                }
                CompositionConfiguration::Node(CompositionNode::Merge { models: None }) => {
                    let unused: Vec<String> = self
                        .models
                        .keys()
                        .filter(|id| !used.contains(*id))
                        .cloned()
                        .collect();
                    used.extend(unused.iter().cloned());
                    debug!(models = ?unused, "merging unused models");
                    match default_composition(&unused) {
                        Some(composition) => self.build_node(&composition, &mut *used).await,
                        None => Ok(Arc::new(MergeAggregator::new(Vec::new())) as Arc<dyn SemanticModelAggregator>),
                    }
                }
                CompositionConfiguration::Node(CompositionNode::Cache { model, caches }) => {
                    let CacheConfiguration::Legacy { configuration } = caches;
                    self.build_legacy(model, configuration).await
                }
            }
        })
    }

    async fn build_model(&self, id: &str) -> BuildResult<Arc<dyn SemanticModelAggregator>> {
        let model = self.model(id)?;
        match model.cache_configuration() {
            Some(configuration) => self.build_legacy(id, configuration).await,
            None => {
                debug!(model = %id, "building vocabulary aggregator");
                Ok(Arc::new(VocabularyAggregator::new(model)))
            }
        }
    }

    async fn build_legacy(
        &self,
        id: &str,
        configuration: &serde_json::Value,
    ) -> BuildResult<Arc<dyn SemanticModelAggregator>> {
        let model = self.model(id)?;
        let factory = self
            .provider_factory
            .as_ref()
            .ok_or_else(|| BuildError::MissingProviderFactory(id.to_string()))?;
        let provider = factory.create(configuration).await?;
        debug!(model = %id, "building legacy lookup aggregator");
        Ok(Arc::new(LegacyLookupAggregator::new(model, provider)))
    }

    fn model(&self, id: &str) -> BuildResult<Arc<dyn EntityModel>> {
        self.models
            .get(id)
            .cloned()
            .ok_or_else(|| BuildError::UnknownModel(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Class, ClassProfile, Entity};
    use crate::lookup::{StaticLookupConfiguration, StaticLookupProviderFactory};
    use crate::model::InMemoryEntityModel;
    use serde_json::json;

    fn vocabulary(id: &str, classes: &[(&str, &str)]) -> Arc<dyn EntityModel> {
        Arc::new(
            InMemoryEntityModel::new(id)
                .with_entities(classes.iter().map(|(cid, name)| Class::new(*cid).with_name("en", *name))),
        )
    }

    fn legacy_model(id: &str) -> Arc<dyn EntityModel> {
        let agent: Entity = Class::new("http://xmlns.com/foaf/0.1/Agent")
            .with_iri("http://xmlns.com/foaf/0.1/Agent")
            .with_name("en", "Agent")
            .into();
        let configuration = serde_json::to_value(StaticLookupConfiguration { entities: vec![agent] }).unwrap();
        Arc::new(InMemoryEntityModel::new(id).with_cache_configuration(configuration))
    }

    #[tokio::test]
    async fn bare_id_builds_a_vocabulary() {
        let builder = AggregatorBuilder::new().with_model(vocabulary("ns/a", &[("a1", "Alpha")]));
        let aggregator = builder.build(&"ns/a".into()).await.unwrap();
        let entities = aggregator.get_aggregated_entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities["a1"].vocabulary_chain[0].name, "Vocabulary");
    }

    #[tokio::test]
    async fn unknown_model_fails_before_building() {
        let builder = AggregatorBuilder::new().with_model(vocabulary("ns/a", &[]));
        let config = CompositionConfiguration::merge(vec!["ns/a".into(), "ns/missing".into()]);
        let err = builder.build(&config).await.err().unwrap();
        assert!(matches!(err, BuildError::UnknownModel(id) if id == "ns/missing"));
    }

    #[tokio::test]
    async fn cached_model_needs_a_provider_factory() {
        let builder = AggregatorBuilder::new().with_model(legacy_model("ns/cache"));
        let err = builder.build(&"ns/cache".into()).await.err().unwrap();
        assert!(matches!(err, BuildError::MissingProviderFactory(_)));

        let builder = builder.with_provider_factory(Arc::new(StaticLookupProviderFactory));
        let aggregator = builder.build(&"ns/cache".into()).await.unwrap();
        let hits = aggregator.search("agent").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].vocabulary_chain[0].name, "Legacy");
    }

    #[tokio::test]
    async fn cache_node_uses_its_own_configuration() {
        let builder = AggregatorBuilder::new()
            .with_model(vocabulary("ns/cache", &[]))
            .with_provider_factory(Arc::new(StaticLookupProviderFactory));
        let config = CompositionConfiguration::from_json(&json!({
            "modelType": "cache",
            "model": "ns/cache",
            "caches": {"modelType": "legacy", "configuration": {"entities": []}}
        }))
        .unwrap();
        let aggregator = builder.build(&config).await.unwrap();
        assert!(aggregator.search("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn application_profile_node_applies_options() {
        let profile: Arc<dyn EntityModel> = Arc::new(
            InMemoryEntityModel::new("ns/a/profile").with_entity(ClassProfile::new("p1", ["a1"])),
        );
        let builder = AggregatorBuilder::new()
            .with_model(vocabulary("ns/a", &[("a1", "Alpha")]))
            .with_model(profile);
        let aggregator = builder
            .build_from_json(&json!({
                "modelType": "application-profile",
                "model": "ns/a/profile",
                "profiles": "ns/a",
                "canModify": false
            }))
            .await
            .unwrap();

        let entities = aggregator.get_aggregated_entities();
        assert_eq!(entities.len(), 2);
        assert!(entities["p1"].is_read_only);
        assert!(entities["a1"].is_read_only);
        assert!(aggregator
            .exec_operation(crate::model::Operation::delete("p1"))
            .is_err());
    }

    #[tokio::test]
    async fn null_merge_takes_only_unused_models() {
        let builder = AggregatorBuilder::new()
            .with_model(vocabulary("ns/a", &[("a1", "Alpha")]))
            .with_model(vocabulary("ns/b", &[("b1", "Beta")]))
            .with_model(vocabulary("ns/c", &[("c1", "Gamma")]));
        let config = CompositionConfiguration::merge(vec![
            "ns/a".into(),
            CompositionConfiguration::merge_unused(),
        ]);
        let aggregator = builder.build(&config).await.unwrap();

        let mut ids: Vec<String> = aggregator.get_aggregated_entities().into_keys().collect();
        ids.sort();
        assert_eq!(ids, ["a1", "b1", "c1"]);
    }

    #[tokio::test]
    async fn empty_null_merge_is_an_empty_aggregator() {
        let builder = AggregatorBuilder::new();
        let aggregator = builder.build(&CompositionConfiguration::merge_unused()).await.unwrap();
        assert!(aggregator.get_aggregated_entities().is_empty());
    }
}
