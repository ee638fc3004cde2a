//! Composition configuration: the declarative tree describing how models combine

use super::BuildError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn enabled() -> bool {
    true
}

/// One node of the composition tree. A bare string names a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompositionConfiguration {
    Model(String),
    Node(CompositionNode),
}

/// Composite nodes, discriminated by `modelType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modelType", rename_all = "kebab-case")]
pub enum CompositionNode {
    /// `model` holds profiles of whatever `profiles` aggregates
    ApplicationProfile {
        model: String,
        profiles: Box<CompositionConfiguration>,
        #[serde(rename = "canAddEntities", default = "enabled")]
        can_add_entities: bool,
        #[serde(rename = "canModify", default = "enabled")]
        can_modify: bool,
    },
    /// Merge of the listed nodes; `null` merges every model not used elsewhere
    Merge {
        #[serde(default)]
        models: Option<Vec<CompositionConfiguration>>,
    },
    /// `model` is a cache in front of the listed lookup service
    Cache {
        model: String,
        caches: CacheConfiguration,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modelType", rename_all = "kebab-case")]
pub enum CacheConfiguration {
    Legacy {
        #[serde(default)]
        configuration: serde_json::Value,
    },
}

impl CompositionConfiguration {
    pub fn model(id: impl Into<String>) -> Self {
        CompositionConfiguration::Model(id.into())
    }

    pub fn merge(models: Vec<CompositionConfiguration>) -> Self {
        CompositionConfiguration::Node(CompositionNode::Merge {
            models: Some(models),
        })
    }

    /// Merge of every model not referenced elsewhere in the tree
    pub fn merge_unused() -> Self {
        CompositionConfiguration::Node(CompositionNode::Merge { models: None })
    }

    pub fn application_profile(model: impl Into<String>, profiles: CompositionConfiguration) -> Self {
        CompositionConfiguration::Node(CompositionNode::ApplicationProfile {
            model: model.into(),
            profiles: Box::new(profiles),
            can_add_entities: true,
            can_modify: true,
        })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, BuildError> {
        serde_json::from_value(value.clone()).map_err(|e| BuildError::InvalidConfiguration(e.to_string()))
    }

    /// Every model id named explicitly anywhere in the tree
    pub fn referenced_models(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.collect_models(&mut ids);
        ids
    }

    fn collect_models(&self, ids: &mut BTreeSet<String>) {
        match self {
            CompositionConfiguration::Model(id) => {
                ids.insert(id.clone());
            }
            CompositionConfiguration::Node(CompositionNode::ApplicationProfile { model, profiles, .. }) => {
                ids.insert(model.clone());
                profiles.collect_models(ids);
            }
            CompositionConfiguration::Node(CompositionNode::Merge { models }) => {
                for node in models.iter().flatten() {
                    node.collect_models(ids);
                }
            }
            CompositionConfiguration::Node(CompositionNode::Cache { model, .. }) => {
                ids.insert(model.clone());
            }
        }
    }
}

impl From<&str> for CompositionConfiguration {
    fn from(id: &str) -> Self {
        CompositionConfiguration::model(id)
    }
}
