//! MCP server initialization for stdio and streamable-HTTP transports.
//!
//! Wires the engine, the coactivation worker, and the MCP tool handler
//! into a running server.

use crate::api::Mnema;
use crate::coactivation::{self, Mode};
use crate::config::MnemaConfig;
use crate::tools::MnemaTools;
use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::Arc;

/// Open the engine and start the background coactivation task for the
/// configured mode.
fn setup_engine(config: MnemaConfig) -> Result<Arc<Mnema>> {
    let engine = Arc::new(Mnema::open(config)?);

    match engine.coactivation_mode() {
        Mode::Cron => {
            let db = engine.db_handle();
            let cfg = engine.config().coactivation.clone();
            tokio::spawn(coactivation::run_worker(db, cfg));
        }
        Mode::Interval => {
            let engine = Arc::clone(&engine);
            let every = std::time::Duration::from_secs(
                engine.config().coactivation.poll_interval_secs.max(1),
            );
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(every).await;
                    if let Err(e) = engine.flush_coactivation_buffer().await {
                        tracing::warn!(error = %e, "interval coactivation flush failed");
                    }
                }
            });
        }
        Mode::Disabled => {
            tracing::info!("coactivation disabled");
        }
    }

    Ok(engine)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MnemaConfig) -> Result<()> {
    tracing::info!("starting mnema MCP server on stdio");

    let engine = setup_engine(config)?;
    let tools = MnemaTools::new(engine);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP.
pub async fn serve_http(config: MnemaConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting mnema MCP server on streamable HTTP");

    let engine = setup_engine(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MnemaTools::new(engine.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
