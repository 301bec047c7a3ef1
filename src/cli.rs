//! CLI command implementations: maintenance sweeps, the standalone
//! coactivation worker, store statistics, and wipe.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

use mnema::api::Mnema;
use mnema::coactivation;
use mnema::config::MnemaConfig;
use mnema::db;

/// `mnema decay` — run one salience decay sweep and report per-sector counts.
pub async fn decay(config: MnemaConfig) -> Result<()> {
    let engine = Mnema::open(config).context("failed to open engine")?;
    let result = engine.run_decay().await.context("decay sweep failed")?;

    if result.affected_by_sector.is_empty() {
        println!("decay: nothing to do");
    } else {
        for (sector, count) in &result.affected_by_sector {
            println!("decay: {sector}: {count} memories");
        }
    }
    Ok(())
}

/// `mnema worker` — run the coactivation queue worker until interrupted.
/// Useful when the MCP server runs elsewhere or coactivation is drained by
/// an external job runner.
pub async fn worker(config: MnemaConfig) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;
    let db = Arc::new(Mutex::new(conn));
    let coactivation_config = config.coactivation.clone();

    tokio::select! {
        _ = coactivation::run_worker(db, coactivation_config) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("worker interrupted, shutting down");
        }
    }
    Ok(())
}

/// `mnema stats` — print a health report.
pub fn stats(config: MnemaConfig) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;
    let report = db::check_database_health(&conn).context("health check failed")?;

    println!("schema version:    {}", report.schema_version);
    println!(
        "embedding:         {}",
        report.embedding_provider.as_deref().unwrap_or("unknown")
    );
    println!(
        "integrity:         {}",
        if report.integrity_ok {
            "ok"
        } else {
            report.integrity_details.as_str()
        }
    );
    println!("memories:          {}", report.memory_count);
    println!("vectors:           {}", report.vector_count);
    println!("waypoints:         {}", report.waypoint_count);
    println!("temporal facts:    {}", report.fact_count);
    println!("pending jobs:      {}", report.pending_jobs);
    println!("failed jobs:       {}", report.failed_jobs);
    Ok(())
}

/// `mnema wipe` — destroy stored data, optionally scoped to one user.
pub async fn wipe(config: MnemaConfig, user: Option<String>, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("refusing to wipe without --yes");
    }
    let engine = Mnema::open(config).context("failed to open engine")?;
    let result = engine.wipe(user.as_deref()).await.context("wipe failed")?;

    match user {
        Some(u) => println!(
            "wiped {} memories and {} facts for user {u}",
            result.memories, result.facts
        ),
        None => println!(
            "wiped {} memories and {} facts",
            result.memories, result.facts
        ),
    }
    Ok(())
}
