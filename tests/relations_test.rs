//! Relation semantics through the tool layer: external_refs validation,
//! atomic failure, and triple identity.

mod helpers;

use helpers::{expect_error, parse, test_tools};
use rmcp::handler::server::tool::Parameters;
use serde_json::json;

use engram::tools::create_entities::{CreateEntitiesParams, EntitySpec};
use engram::tools::create_relations::{CreateRelationsParams, RelationSpec};
use engram::tools::delete_relations::DeleteRelationsParams;

fn relation(from: &str, to: &str, relation_type: &str) -> RelationSpec {
    RelationSpec {
        from: from.into(),
        to: to.into(),
        relation_type: relation_type.into(),
    }
}

async fn seed_people(tools: &engram::tools::GraphTools, names: &[&str]) {
    let entities = names
        .iter()
        .map(|n| EntitySpec {
            name: n.to_string(),
            entity_type: "person".into(),
            observations: vec![],
        })
        .collect();
    parse(
        tools
            .create_entities(Parameters(CreateEntitiesParams { entities }))
            .await,
    );
}

#[tokio::test]
async fn missing_entities_fail_atomically() {
    let tools = test_tools();

    let result = parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("Ada", "Babbage", "inspired")],
                external_refs: vec!["Ada".into(), "Babbage".into()],
            }))
            .await,
    );
    expect_error(&result, "MissingEntities");
    assert_eq!(result["names"], json!(["Ada", "Babbage"]));

    // Nothing was created as a side effect
    let graph = parse(tools.read_graph().await);
    assert_eq!(graph["entities"], json!([]));
    assert_eq!(graph["relations"], json!([]));
}

#[tokio::test]
async fn partial_resolution_still_fails_whole_call() {
    let tools = test_tools();
    seed_people(&tools, &["Ada"]).await;

    let result = parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("Ada", "Babbage", "inspired")],
                external_refs: vec!["Ada".into(), "Babbage".into()],
            }))
            .await,
    );
    expect_error(&result, "MissingEntities");
    assert_eq!(result["names"], json!(["Babbage"]));

    let graph = parse(tools.read_graph().await);
    assert_eq!(graph["relations"], json!([]));
}

#[tokio::test]
async fn undeclared_names_are_invalid() {
    let tools = test_tools();
    seed_people(&tools, &["Ada", "Babbage"]).await;

    let result = parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("Ada", "Babbage", "inspired")],
                external_refs: vec!["Ada".into()],
            }))
            .await,
    );
    expect_error(&result, "Invalid");
    assert_eq!(result["field"], "external_refs");
}

#[tokio::test]
async fn duplicate_relation_is_a_no_op() {
    let tools = test_tools();
    seed_people(&tools, &["Ada", "Babbage"]).await;

    let params = CreateRelationsParams {
        relations: vec![relation("Ada", "Babbage", "collaborated_with")],
        external_refs: vec!["Ada".into(), "Babbage".into()],
    };

    let first = parse(tools.create_relations(Parameters(params.clone())).await);
    assert_eq!(first["created"], 1);
    assert_eq!(first["deduplicated"], 0);

    let second = parse(tools.create_relations(Parameters(params.clone())).await);
    assert_eq!(second["created"], 0);
    assert_eq!(second["deduplicated"], 1);

    let third = parse(tools.create_relations(Parameters(params)).await);
    assert_eq!(third["created"], 0);
    assert_eq!(third["deduplicated"], 1);

    let stats = parse(tools.get_stats().await);
    assert_eq!(stats["relation_count"], 1);
}

#[tokio::test]
async fn same_batch_duplicate_counts_once() {
    let tools = test_tools();
    seed_people(&tools, &["a", "b"]).await;

    let result = parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("a", "b", "knows"), relation("a", "b", "knows")],
                external_refs: vec!["a".into(), "b".into()],
            }))
            .await,
    );
    assert_eq!(result["created"], 1);
    assert_eq!(result["deduplicated"], 1);

    let stats = parse(tools.get_stats().await);
    assert_eq!(stats["relation_count"], 1);
}

#[tokio::test]
async fn self_loops_are_permitted() {
    let tools = test_tools();
    seed_people(&tools, &["a"]).await;

    let result = parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("a", "a", "references")],
                external_refs: vec!["a".into()],
            }))
            .await,
    );
    assert_eq!(result["created"], 1);
}

#[tokio::test]
async fn delete_relations_is_idempotent() {
    let tools = test_tools();
    seed_people(&tools, &["a", "b"]).await;

    parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("a", "b", "knows")],
                external_refs: vec!["a".into(), "b".into()],
            }))
            .await,
    );

    let first = parse(
        tools
            .delete_relations(Parameters(DeleteRelationsParams {
                relations: vec![relation("a", "b", "knows")],
            }))
            .await,
    );
    assert_eq!(first["deleted"], 1);

    let second = parse(
        tools
            .delete_relations(Parameters(DeleteRelationsParams {
                relations: vec![relation("a", "b", "knows"), relation("x", "y", "z")],
            }))
            .await,
    );
    assert_eq!(second["deleted"], 0);
}

#[tokio::test]
async fn deleting_endpoint_removes_relations() {
    let tools = test_tools();
    seed_people(&tools, &["a", "b", "c"]).await;

    parse(
        tools
            .create_relations(Parameters(CreateRelationsParams {
                relations: vec![relation("a", "b", "knows"), relation("c", "a", "knows")],
                external_refs: vec!["a".into(), "b".into(), "c".into()],
            }))
            .await,
    );

    parse(
        tools
            .delete_entities(Parameters(engram::tools::delete_entities::DeleteEntitiesParams {
                names: vec!["a".into()],
            }))
            .await,
    );

    let graph = parse(tools.read_graph().await);
    assert_eq!(graph["relations"], json!([]));
    assert_eq!(graph["entities"].as_array().unwrap().len(), 2);
}
