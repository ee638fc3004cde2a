//! An application profile layered over a legacy cache, loaded from a
//! workspace file.

mod common;

use common::{foaf, foaf_class, foaf_configuration};
use semantic_aggregator::workspace::{ModelDefinition, WorkspaceDefinition};
use semantic_aggregator::{
    ClassProfile, CompositionConfiguration, Entity, FrameDetail, Workspace, WorkspaceError,
};
use std::io::Write;

const CACHE: &str = "https://example.org/ns/foaf";
const PROFILE: &str = "https://example.org/ns/foaf/profile";

fn definition() -> WorkspaceDefinition {
    WorkspaceDefinition {
        models: vec![
            ModelDefinition {
                id: CACHE.to_string(),
                alias: Some("FOAF".to_string()),
                base_iri: None,
                read_only: false,
                entities: vec![foaf_class("Person")],
                cache: Some(foaf_configuration()),
            },
            ModelDefinition {
                id: PROFILE.to_string(),
                alias: None,
                base_iri: None,
                read_only: false,
                entities: vec![ClassProfile::new("person-profile", [foaf("Person")]).into()],
                cache: None,
            },
        ],
        composition: CompositionConfiguration::merge_unused(),
    }
}

async fn load() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workspace.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(serde_yaml::to_string(&definition()).unwrap().as_bytes())
        .unwrap();
    let workspace = Workspace::load(&path).await.unwrap();
    (dir, workspace)
}

#[tokio::test]
async fn profile_inherits_from_cached_class() {
    let (_dir, workspace) = load().await;
    let entities = workspace.aggregator().get_aggregated_entities();
    let mut ids: Vec<String> = entities.keys().cloned().collect();
    ids.sort();
    assert_eq!(ids, [foaf("Person"), "person-profile".to_string()]);
    assert!(entities[&foaf("Person")].is_read_only);
    let name = entities["person-profile"].aggregated_entity.display_name().unwrap();
    assert_eq!(name["en"], "Person");
}

#[tokio::test]
async fn hierarchy_reaches_into_the_provider() {
    let (_dir, workspace) = load().await;
    let hierarchy = workspace
        .aggregator()
        .get_hierarchy("person-profile")
        .await
        .unwrap()
        .unwrap();

    let agent = hierarchy.iter().find(|e| e.id() == foaf("Agent")).unwrap();
    assert_eq!(
        agent.originating_model.last().unwrap().detail,
        FrameDetail::Via {
            profile: "person-profile".to_string()
        }
    );
    assert_eq!(agent.vocabulary_chain[0].name, "FOAF");
    assert!(hierarchy.iter().any(|e| matches!(
        &e.aggregated_entity,
        Entity::Generalization(g) if g.child == "person-profile" && g.parent == foaf("Person")
    )));
}

#[tokio::test]
async fn extending_the_hierarchy_copies_the_path_and_profiles_the_ancestor() {
    let (_dir, workspace) = load().await;
    let aggregator = workspace.aggregator();
    let agent = aggregator
        .get_hierarchy("person-profile")
        .await
        .unwrap()
        .unwrap()
        .into_iter()
        .find(|e| e.id() == foaf("Agent"))
        .unwrap();

    let local = aggregator
        .external_entity_to_local_for_hierarchy_extension("person-profile", agent, true)
        .await
        .unwrap();
    let Entity::ClassProfile(agent_profile) = &local.aggregated_entity else {
        panic!("expected a class profile");
    };
    assert_eq!(agent_profile.profiling, [foaf("Agent")]);

    let cache = workspace.model(CACHE).unwrap();
    assert!(cache.get(&foaf("Agent")).is_some());
    assert!(cache
        .get("person-agent")
        .is_some_and(|e| matches!(e, Entity::Generalization(g) if g.parent == foaf("Agent"))));

    let authored = aggregator.get_aggregated_entities().into_values().any(|w| {
        matches!(&w.aggregated_entity, Entity::Generalization(g)
            if g.child == "person-profile" && g.parent == local.id())
    });
    assert!(authored);

    let hierarchy = aggregator.get_hierarchy("person-profile").await.unwrap().unwrap();
    let new_profile = hierarchy.iter().find(|e| e.id() == local.id()).unwrap();
    assert_eq!(new_profile.originating_model.last().unwrap().detail, FrameDetail::Local);
}

#[tokio::test]
async fn search_offers_profiles_and_provider_classes() {
    let (_dir, workspace) = load().await;
    let hits = workspace.aggregator().search("person").await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id()).collect();
    assert_eq!(ids, ["person-profile", "person-profile", foaf("Person").as_str()]);
}

#[test]
fn missing_workspace_file_is_an_io_error() {
    let result = tokio_test::block_on(Workspace::load("/nonexistent/workspace.json"));
    assert!(matches!(result, Err(WorkspaceError::Io(_))));
}
