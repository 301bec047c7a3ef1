//! Unified router: recall across both subsystems, store with cross-links,
//! and the add/get round trip through the public API.

mod helpers;

use helpers::*;
use mnema::api::{AddOptions, GetOptions};
use mnema::router::{RecallOptions, RecallType, StoreOptions, StoreType, SOURCE_MEMORY_KEY};
use mnema::temporal::FactPattern;

#[tokio::test]
async fn add_then_get_preserves_content_and_sectors() {
    let engine = test_engine();

    let result = engine
        .add(
            "how to deploy: first run migrations, then restart workers",
            AddOptions {
                user: Some("alice".into()),
                tags: vec!["ops".into(), "deploy".into(), "ops".into()],
                metadata: Some(serde_json::json!({"origin": "runbook"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.sectors.contains(&result.primary_sector));

    let fetched = engine
        .get(
            &result.id,
            GetOptions {
                user: Some("alice".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        fetched.memory.content,
        "how to deploy: first run migrations, then restart workers"
    );
    assert_eq!(fetched.memory.tags, vec!["ops", "deploy"]);
    assert_eq!(fetched.memory.primary_sector, result.primary_sector);
    assert_eq!(fetched.memory.metadata.unwrap()["origin"], "runbook");
    assert!((fetched.memory.salience - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn contextual_recall_returns_only_the_contextual_block() {
    let engine = test_engine();
    add_for(&engine, "alice", "alice admires clean code").await;

    let outcome = engine
        .recall(
            "clean code",
            RecallOptions {
                recall_type: RecallType::Contextual,
                user: Some("alice".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.contextual.is_some());
    assert!(outcome.factual.is_none());
}

#[tokio::test]
async fn factual_recall_returns_only_the_factual_block() {
    let engine = test_engine();
    engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Acme", date_ms(2024, 1, 1)))
        .await
        .unwrap();

    let outcome = engine
        .recall(
            "where does alice work",
            RecallOptions {
                recall_type: RecallType::Factual,
                user: Some("alice".into()),
                fact_pattern: Some(FactPattern {
                    subject: Some("alice".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.contextual.is_none());
    let facts = outcome.factual.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].object, "Acme");
}

#[tokio::test]
async fn unified_recall_returns_both_blocks_without_cross_ranking() {
    let engine = test_engine();
    add_for(&engine, "alice", "alice started at Globex in June").await;
    engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Globex", date_ms(2024, 6, 1)))
        .await
        .unwrap();

    let outcome = engine
        .recall(
            "alice Globex",
            RecallOptions {
                user: Some("alice".into()),
                fact_pattern: Some(FactPattern {
                    subject: Some("alice".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let contextual = outcome.contextual.unwrap();
    let factual = outcome.factual.unwrap();
    assert!(!contextual.results.is_empty());
    assert_eq!(factual.len(), 1);
}

#[tokio::test]
async fn store_both_links_facts_to_the_memory() {
    let engine = test_engine();

    let outcome = engine
        .store(
            Some("met the Globex team, alice starts there in June"),
            StoreOptions {
                store_type: StoreType::Both,
                user: Some("alice".into()),
                facts: vec![
                    fact("alice", "works_at", "Globex", date_ms(2024, 6, 1)),
                    fact("alice", "met_with", "globex-team", date_ms(2024, 5, 20)),
                ],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let memory_id = outcome.hsg.unwrap().id;
    let fact_ids = outcome.temporal.unwrap();
    assert_eq!(fact_ids.len(), 2);

    for subject_pred in [("alice", "works_at"), ("alice", "met_with")] {
        let current = engine
            .get_current_fact(Some("alice"), subject_pred.0, subject_pred.1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.metadata.unwrap()[SOURCE_MEMORY_KEY], memory_id);
    }
}

#[tokio::test]
async fn factual_store_skips_the_semantic_graph() {
    let engine = test_engine();

    let outcome = engine
        .store(
            None,
            StoreOptions {
                store_type: StoreType::Factual,
                user: Some("alice".into()),
                facts: vec![fact("alice", "likes", "rust", date_ms(2024, 1, 1))],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.hsg.is_none());
    assert_eq!(outcome.temporal.unwrap().len(), 1);

    let db = engine.db_handle();
    let conn = db.lock().unwrap();
    let memories: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
        .unwrap();
    assert_eq!(memories, 0);
}

#[tokio::test]
async fn reinserting_identical_content_yields_two_rows() {
    let engine = test_engine();
    let a = add_for(&engine, "alice", "the very same sentence").await;
    let b = add_for(&engine, "alice", "the very same sentence").await;
    assert_ne!(a, b);

    let listing = engine
        .list(mnema::api::ListOptions {
            user: Some("alice".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listing.len(), 2);
}
