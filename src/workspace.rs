//! Workspace files: entity models plus a composition, loaded from JSON or YAML
//!
//! ```yaml
//! models:
//!   - id: https://example.org/ns/a
//!     alias: A
//!     entities:
//!       - type: class
//!         id: a1
//!         name: { en: Alpha }
//! composition:
//!   modelType: merge
//!   models: null
//! ```

use crate::aggregator::SemanticModelAggregator;
use crate::builder::{AggregatorBuilder, BuildError, CompositionConfiguration};
use crate::entity::Entity;
use crate::lookup::StaticLookupProviderFactory;
use crate::model::{EntityModel, InMemoryEntityModel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate model id: {0}")]
    DuplicateModel(String),

    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceFormat {
    Json,
    Yaml,
}

impl WorkspaceFormat {
    /// `.yaml` and `.yml` are YAML, anything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                WorkspaceFormat::Yaml
            }
            _ => WorkspaceFormat::Json,
        }
    }
}

/// One entity model as written in a workspace file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_iri: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Lookup provider configuration when the model is a legacy cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<serde_json::Value>,
}

impl ModelDefinition {
    fn into_model(self) -> InMemoryEntityModel {
        let mut model = InMemoryEntityModel::new(self.id).with_entities(self.entities);
        if let Some(alias) = self.alias {
            model = model.with_alias(alias);
        }
        if let Some(base_iri) = self.base_iri {
            model = model.with_base_iri(base_iri);
        }
        if let Some(cache) = self.cache {
            model = model.with_cache_configuration(cache);
        }
        if self.read_only {
            model = model.read_only();
        }
        model
    }
}

fn merge_everything() -> CompositionConfiguration {
    CompositionConfiguration::merge_unused()
}

/// Parsed workspace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceDefinition {
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
    /// Defaults to merging every model
    #[serde(default = "merge_everything")]
    pub composition: CompositionConfiguration,
}

impl WorkspaceDefinition {
    pub fn parse(text: &str, format: WorkspaceFormat) -> Result<Self, WorkspaceError> {
        Ok(match format {
            WorkspaceFormat::Json => serde_json::from_str(text)?,
            WorkspaceFormat::Yaml => serde_yaml::from_str(text)?,
        })
    }
}

/// Loaded models and the aggregator built over them
pub struct Workspace {
    models: Vec<Arc<InMemoryEntityModel>>,
    aggregator: Arc<dyn SemanticModelAggregator>,
}

impl Workspace {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading workspace");
        let definition = WorkspaceDefinition::parse(&text, WorkspaceFormat::from_path(path))?;
        Self::from_definition(definition).await
    }

    pub async fn from_definition(definition: WorkspaceDefinition) -> Result<Self, WorkspaceError> {
        let mut models: Vec<Arc<InMemoryEntityModel>> = Vec::with_capacity(definition.models.len());
        for model in definition.models {
            if models.iter().any(|m| m.id() == model.id) {
                return Err(WorkspaceError::DuplicateModel(model.id));
            }
            models.push(Arc::new(model.into_model()));
        }

        let builder = AggregatorBuilder::new()
            .with_models(models.iter().map(|m| m.clone() as Arc<dyn EntityModel>))
            .with_provider_factory(Arc::new(StaticLookupProviderFactory));
        let aggregator = builder.build(&definition.composition).await?;
        debug!(models = models.len(), "workspace ready");

        Ok(Self { models, aggregator })
    }

    pub fn aggregator(&self) -> &Arc<dyn SemanticModelAggregator> {
        &self.aggregator
    }

    pub fn models(&self) -> &[Arc<InMemoryEntityModel>] {
        &self.models
    }

    pub fn model(&self, id: &str) -> Option<&Arc<InMemoryEntityModel>> {
        self.models.iter().find(|m| m.id() == id)
    }
}
