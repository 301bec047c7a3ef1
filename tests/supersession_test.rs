//! Temporal fact lifecycle: auto-close on supersession, point-in-time
//! queries, conflicts, and the open-fact uniqueness invariant.

mod helpers;

use helpers::*;
use mnema::temporal::facts::FactDraft;
use mnema::temporal::FactPattern;

fn works_at_pattern() -> FactPattern {
    FactPattern {
        subject: Some("alice".into()),
        predicate: Some("works_at".into()),
        object: None,
    }
}

#[tokio::test]
async fn supersession_closes_the_old_fact_at_the_new_valid_from() {
    let engine = test_engine();
    let acme_start = date_ms(2023, 1, 1);
    let globex_start = date_ms(2024, 6, 1);

    engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Acme", acme_start))
        .await
        .unwrap();
    engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Globex", globex_start))
        .await
        .unwrap();

    // Current employment is Globex.
    let current = engine
        .get_current_fact(Some("alice"), "alice", "works_at")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.object, "Globex");
    assert!(current.valid_to.is_none());

    // Mid-2023 the answer was Acme.
    let mid_2023 = engine
        .query_facts(Some("alice"), works_at_pattern(), Some(date_ms(2023, 7, 1)), 0.0)
        .await
        .unwrap();
    assert_eq!(mid_2023.len(), 1);
    assert_eq!(mid_2023[0].object, "Acme");

    // At the switch instant the new fact owns the timeline.
    let at_switch = engine
        .query_facts(Some("alice"), works_at_pattern(), Some(globex_start), 0.0)
        .await
        .unwrap();
    assert_eq!(at_switch.len(), 1);
    assert_eq!(at_switch[0].object, "Globex");
}

#[tokio::test]
async fn at_most_one_open_fact_per_subject_predicate() {
    let engine = test_engine();

    for (object, month) in [("Acme", 1), ("Initech", 3), ("Globex", 6)] {
        engine
            .add_fact(
                Some("alice"),
                fact("alice", "works_at", object, date_ms(2024, month, 1)),
            )
            .await
            .unwrap();
    }

    let db = engine.db_handle();
    let conn = db.lock().unwrap();
    let open: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM temporal_facts \
             WHERE user_id = 'alice' AND subject = 'alice' AND predicate = 'works_at' \
             AND valid_to IS NULL",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn add_fact_then_get_current_round_trips() {
    let engine = test_engine();

    let id = engine
        .add_fact(
            Some("alice"),
            FactDraft {
                subject: "alice".into(),
                predicate: "lives_in".into(),
                object: "Paris".into(),
                valid_from: None, // now
                confidence: Some(0.8),
                metadata: Some(serde_json::json!({"source": "chat"})),
            },
        )
        .await
        .unwrap();

    let current = engine
        .get_current_fact(Some("alice"), "alice", "lives_in")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.id, id);
    assert_eq!(current.object, "Paris");
    assert!((current.confidence - 0.8).abs() < 1e-9);
    assert_eq!(current.metadata.unwrap()["source"], "chat");
}

#[tokio::test]
async fn same_instant_conflicting_inserts_both_remain() {
    let engine = test_engine();
    let t = date_ms(2024, 6, 1);

    engine
        .add_fact(
            Some("alice"),
            FactDraft {
                confidence: Some(0.6),
                ..fact("alice", "works_at", "Acme", t)
            },
        )
        .await
        .unwrap();
    engine
        .add_fact(
            Some("alice"),
            FactDraft {
                confidence: Some(0.9),
                ..fact("alice", "works_at", "Globex", t)
            },
        )
        .await
        .unwrap();

    let conflicts = engine
        .find_conflicting_facts(Some("alice"), "alice", "works_at", Some(t + 1))
        .await
        .unwrap();
    assert_eq!(conflicts.len(), 2);
    // Ordered by confidence descending.
    assert_eq!(conflicts[0].object, "Globex");
    assert_eq!(conflicts[1].object, "Acme");
}

#[tokio::test]
async fn as_of_results_are_a_subset_of_point_range_results() {
    let engine = test_engine();

    engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Acme", date_ms(2023, 1, 1)))
        .await
        .unwrap();
    engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Globex", date_ms(2024, 6, 1)))
        .await
        .unwrap();
    engine
        .add_fact(Some("alice"), fact("alice", "lives_in", "Paris", date_ms(2023, 9, 1)))
        .await
        .unwrap();

    for t in [
        date_ms(2022, 6, 1),
        date_ms(2023, 1, 1),
        date_ms(2023, 12, 31),
        date_ms(2024, 6, 1),
        date_ms(2025, 1, 1),
    ] {
        let as_of = engine
            .query_facts(Some("alice"), FactPattern::default(), Some(t), 0.0)
            .await
            .unwrap();
        let range = engine
            .query_facts_in_range(Some("alice"), FactPattern::default(), Some(t), Some(t))
            .await
            .unwrap();
        let range_ids: Vec<&str> = range.iter().map(|f| f.id.as_str()).collect();
        for f in &as_of {
            assert!(range_ids.contains(&f.id.as_str()), "t={t}: {} missing", f.object);
        }
    }
}

#[tokio::test]
async fn invalidated_fact_disappears_from_current_but_stays_in_history() {
    let engine = test_engine();
    let start = date_ms(2024, 1, 1);
    let id = engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Acme", start))
        .await
        .unwrap();

    engine
        .invalidate_fact(Some("alice"), &id, Some(date_ms(2024, 6, 1)))
        .await
        .unwrap();

    let current = engine
        .get_current_fact(Some("alice"), "alice", "works_at")
        .await
        .unwrap();
    assert!(current.is_none());

    let history = engine
        .query_facts(Some("alice"), works_at_pattern(), Some(date_ms(2024, 3, 1)), 0.0)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
}

#[tokio::test]
async fn deleted_fact_is_gone_from_every_query() {
    let engine = test_engine();
    let id = engine
        .add_fact(Some("alice"), fact("alice", "works_at", "Acme", date_ms(2024, 1, 1)))
        .await
        .unwrap();

    engine.delete_fact(Some("alice"), &id).await.unwrap();

    let by_subject = engine.get_facts_by_subject(Some("alice"), "alice").await.unwrap();
    assert!(by_subject.is_empty());

    let in_range = engine
        .query_facts_in_range(Some("alice"), FactPattern::default(), None, None)
        .await
        .unwrap();
    assert!(in_range.is_empty());
}
