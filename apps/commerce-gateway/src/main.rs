use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use ccg_gateway::config::GatewayConfig;
use ccg_gateway::http::{AppState, router};
use ccg_gateway::transport::{CloudApiTransport, spawn_probe};
use ccg_gateway::{Dispatcher, Orchestrator, ReasoningClient, TransportMonitor};
use ccg_session::{MemorySessionStore, SeenMessages, SharedSessionStore, spawn_sweeper};
use ccg_telemetry::install as init_telemetry;
use security::{BearerConfig, SignatureVerifier};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry("commerce-gateway")?;

    let config = GatewayConfig::from_env()?;
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build http client")?;

    let sessions: SharedSessionStore = Arc::new(MemorySessionStore::new());
    let seen = Arc::new(SeenMessages::new(config.sessions.dedupe_ttl));
    let (monitor, _monitor_task) = TransportMonitor::spawn();
    let transport = Arc::new(CloudApiTransport::new(http.clone(), &config.channel));
    let dispatcher = Arc::new(Dispatcher::new(
        transport.clone(),
        monitor.clone(),
        config.reply.clone(),
        config.channel.delivery_timeout,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        SignatureVerifier::new(&config.channel.app_secret),
        sessions.clone(),
        seen.clone(),
        ReasoningClient::from_config(http, &config.reasoning),
        dispatcher.clone(),
    ));

    let probe = spawn_probe(transport, monitor.clone(), config.channel.probe_every);
    let sweeper = spawn_sweeper(
        sessions.clone(),
        seen,
        config.sessions.sweep_every,
        config.sessions.max_idle,
    );

    if config.api_token.is_none() {
        warn!("API_TOKEN not set; /messages and /send are unauthenticated");
    }
    let bearer = BearerConfig::new(config.api_token.clone());
    let state = AppState {
        orchestrator,
        sessions,
        dispatcher,
        monitor,
        verify_token: config.channel.verify_token.clone(),
        request_timeout: config.request_timeout,
    };

    let listener = TcpListener::bind(config.addr).await?;
    info!("commerce-gateway listening on {}", config.addr);

    serve(listener, router(state, bearer))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    probe.abort();
    sweeper.abort();
    Ok(())
}
