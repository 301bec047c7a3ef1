#![allow(dead_code)]

use mnema::api::{AddOptions, Mnema, SearchOptions};
use mnema::config::MnemaConfig;
use mnema::temporal::facts::FactDraft;

/// Vector dimension used across the integration tests. Small keeps the
/// synthetic embedder and index fast.
pub const TEST_DIM: usize = 64;

/// Engine backed by an in-memory database and the exact-linear index.
pub fn test_engine() -> Mnema {
    Mnema::open_in_memory(test_config()).unwrap()
}

/// Engine using the approximate HNSW backend.
pub fn approx_engine() -> Mnema {
    let mut config = test_config();
    config.index.use_approx = true;
    Mnema::open_in_memory(config).unwrap()
}

pub fn test_config() -> MnemaConfig {
    let mut config = MnemaConfig::default();
    config.embedding.dim = TEST_DIM;
    config
}

/// Store a memory for a user and return its id.
pub async fn add_for(engine: &Mnema, user: &str, content: &str) -> String {
    engine
        .add(
            content,
            AddOptions {
                user: Some(user.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

/// Search scoped to a user with default options.
pub async fn search_for(
    engine: &Mnema,
    user: &str,
    query: &str,
) -> mnema::hsg::types::QueryResponse {
    engine
        .search(
            query,
            SearchOptions {
                user: Some(user.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

/// A fact draft with explicit validity start (epoch ms).
pub fn fact(s: &str, p: &str, o: &str, valid_from: i64) -> FactDraft {
    FactDraft {
        subject: s.to_string(),
        predicate: p.to_string(),
        object: o.to_string(),
        valid_from: Some(valid_from),
        confidence: None,
        metadata: None,
    }
}

/// Epoch ms for a calendar date, midnight UTC.
pub fn date_ms(year: i32, month: u32, day: u32) -> i64 {
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis()
}
