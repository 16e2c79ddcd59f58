//! Integration tests for ontograph-graph against a live Neo4j instance.
//!
//! Run with: cargo test --package ontograph-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use ontograph_core::{Identifier, Properties};
use ontograph_graph::{EqualityFilter, GraphClient, GraphConfig, GraphStore};
use serde_json::{json, Value};

async fn connect_or_skip() -> Option<GraphClient> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

/// Every node written by a test run carries this marker so cleanup can find it.
fn run_marker() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn cleanup(client: &GraphClient, marker: &str) {
    let q = neo4rs::query("MATCH (n {test_run: $run}) DETACH DELETE n")
        .param("run", marker.to_string());
    let _ = client.run(q).await;
}

fn ident(name: &str) -> Identifier {
    Identifier::parse(name).unwrap()
}

fn props(marker: &str, value: Value) -> Properties {
    let mut map = value.as_object().cloned().unwrap();
    map.insert("test_run".to_string(), json!(marker));
    map
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_create_and_get_node() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let run = run_marker();

    let created = client
        .create_node(&ident("ItPerson"), props(&run, json!({"name": "Ann", "age": 40})))
        .await
        .unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(created.label, "ItPerson");

    let fetched = client.find_node_by_id(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.properties["name"], "Ann");
    assert_eq!(fetched.properties["age"], 40);

    cleanup(&client, &run).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_filtered_label_listing() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let run = run_marker();

    for name in ["Ann", "Bob", "Cid"] {
        client
            .create_node(&ident("ItPerson"), props(&run, json!({"name": name})))
            .await
            .unwrap();
    }

    let filters = [
        EqualityFilter {
            key: ident("test_run"),
            value: json!(run),
        },
        EqualityFilter {
            key: ident("name"),
            value: json!("Bob"),
        },
    ];
    let found = client
        .find_nodes_by_label(&ident("ItPerson"), &filters, 0, 10)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].properties["name"], "Bob");

    cleanup(&client, &run).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_relationship_to_missing_node_writes_nothing() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let run = run_marker();

    let a = client
        .create_node(&ident("ItPerson"), props(&run, json!({"name": "Ann"})))
        .await
        .unwrap();
    let b = client
        .create_node(&ident("ItPerson"), props(&run, json!({"name": "Bob"})))
        .await
        .unwrap();

    let edge = client
        .create_relationship(&ident("IT_KNOWS"), &a.id, &b.id, Properties::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edge.rel_type, "IT_KNOWS");
    assert_eq!(edge.from_id, a.id);
    assert_eq!(edge.to_id, b.id);

    let missing = client
        .create_relationship(&ident("IT_KNOWS"), &a.id, "no-such-node", Properties::new())
        .await
        .unwrap();
    assert!(missing.is_none());

    cleanup(&client, &run).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_uniqueness_constraint_is_idempotent() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    client
        .ensure_uniqueness_constraint(&ident("ItPerson"))
        .await
        .unwrap();
    client
        .ensure_uniqueness_constraint(&ident("ItPerson"))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_health_check() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    assert!(client.health_check().await);
}
