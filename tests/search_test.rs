//! Keyword search quality through the tool layer.

mod helpers;

use helpers::{parse, test_tools};
use rmcp::handler::server::tool::Parameters;

use engram::tools::create_entities::{CreateEntitiesParams, EntitySpec};
use engram::tools::search_nodes::SearchNodesParams;

async fn seed(tools: &engram::tools::GraphTools, name: &str, observations: &[&str]) {
    parse(
        tools
            .create_entities(Parameters(CreateEntitiesParams {
                entities: vec![EntitySpec {
                    name: name.into(),
                    entity_type: "topic".into(),
                    observations: observations.iter().map(|s| s.to_string()).collect(),
                }],
            }))
            .await,
    );
}

async fn search(tools: &engram::tools::GraphTools, query: &str, k: usize) -> serde_json::Value {
    parse(
        tools
            .search_nodes(Parameters(SearchNodesParams {
                query: query.into(),
                k: Some(k),
            }))
            .await,
    )
}

#[tokio::test]
async fn exact_name_outranks_observation_mention() {
    let tools = test_tools();
    seed(&tools, "alpha", &[]).await;
    seed(&tools, "beta", &["alpha-like behavior in the wild"]).await;

    let result = search(&tools, "alpha", 10).await;
    let entities = result["entities"].as_array().unwrap();
    assert!(entities.len() >= 2);
    assert_eq!(entities[0]["name"], "alpha");
    assert!(
        entities[0]["score"].as_f64().unwrap() > entities[1]["score"].as_f64().unwrap(),
        "name match must strictly outrank observation-only match"
    );
}

#[tokio::test]
async fn multiword_query_recovers_both_entities() {
    let tools = test_tools();
    seed(&tools, "agent-coordination", &["coordination"]).await;
    seed(&tools, "memory-design", &["memory"]).await;

    let result = search(
        &tools,
        "agent coordination memory design architecture",
        10,
    )
    .await;
    let names: Vec<&str> = result["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert!(!names.is_empty(), "OR semantics must match any token");
    assert!(names.contains(&"agent-coordination"));
    assert!(names.contains(&"memory-design"));
}

#[tokio::test]
async fn any_single_token_match_is_nonempty() {
    let tools = test_tools();
    seed(&tools, "standup-notes", &["discussed coordination plans"]).await;

    let result = search(&tools, "quarterly coordination offsite", 10).await;
    assert!(!result["entities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn matching_observations_are_listed_first() {
    let tools = test_tools();

    let mut observations: Vec<String> = Vec::new();
    for i in 0..100 {
        if i == 7 || i == 55 || i == 80 {
            observations.push(format!("entry {i} covers zeppelin maintenance"));
        } else {
            observations.push(format!("entry {i} routine"));
        }
    }
    parse(
        tools
            .create_entities(Parameters(CreateEntitiesParams {
                entities: vec![EntitySpec {
                    name: "logbook".into(),
                    entity_type: "journal".into(),
                    observations,
                }],
            }))
            .await,
    );

    let result = search(&tools, "zeppelin", 10).await;
    let hit = &result["entities"][0];
    assert_eq!(hit["name"], "logbook");
    assert_eq!(hit["observation_matches"], 3);

    let observations = hit["observations"].as_array().unwrap();
    assert_eq!(observations.len(), 100);
    assert_eq!(observations[0], "entry 7 covers zeppelin maintenance");
    assert_eq!(observations[1], "entry 55 covers zeppelin maintenance");
    assert_eq!(observations[2], "entry 80 covers zeppelin maintenance");
    // Remainder stays in creation order
    assert_eq!(observations[3], "entry 0 routine");
    assert_eq!(observations[99], "entry 99 routine");
}

#[tokio::test]
async fn results_deduplicate_by_entity() {
    let tools = test_tools();
    seed(
        &tools,
        "rust-notes",
        &["rust ownership", "rust lifetimes", "rust traits"],
    )
    .await;

    let result = search(&tools, "rust", 10).await;
    let entities = result["entities"].as_array().unwrap();
    assert_eq!(entities.len(), 1, "one result per entity, not per match");
    assert_eq!(entities[0]["observation_matches"], 3);
}

#[tokio::test]
async fn empty_query_returns_empty() {
    let tools = test_tools();
    seed(&tools, "x", &["content"]).await;
    let result = search(&tools, "   ", 10).await;
    assert!(result["entities"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn k_limits_result_count() {
    let tools = test_tools();
    for i in 0..8 {
        seed(&tools, &format!("gadget-{i}"), &[]).await;
    }
    let result = search(&tools, "gadget", 3).await;
    assert_eq!(result["entities"].as_array().unwrap().len(), 3);
}
