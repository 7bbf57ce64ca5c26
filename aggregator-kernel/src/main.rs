/**
 * AGGREGATOR KERNEL - Point d'entrée du serveur d'agrégation d'alarmes
 *
 * RÔLE : Bootstrap complet : config env, logging, registre des hosts, client
 * HTTP partagé, polling périodique, surveillance du fichier de hosts, API REST.
 *
 * CYCLE DE VIE : un seul CancellationToken arrête le scheduler et le watcher
 * après l'arrêt gracieux du serveur HTTP (Ctrl-C).
 * ÉCHEC AU DÉMARRAGE : fichier de hosts absent/invalide ou env invalide → exit.
 */

mod config;
mod engine;
mod fetcher;
mod health;
mod http;
mod logging;
mod models;
mod proxy;
mod registry;
mod scheduler;
mod state;
mod watcher;

use crate::config::KernelConfig;
use crate::engine::AggregationEngine;
use crate::fetcher::{build_http_client, AlarmFetcher};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::proxy::ProxyGateway;
use crate::registry::HostRegistry;
use crate::scheduler::PollScheduler;
use crate::watcher::HostsWatcher;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    let cfg = KernelConfig::from_env().context("invalid environment configuration")?;
    logging::init_tracing(cfg.log_format);

    let registry = HostRegistry::load_file(&cfg.hosts_file)
        .with_context(|| format!("failed to load hosts from {}", cfg.hosts_file.display()))?;

    // un seul client pour le polling et le proxy (pool de connexions partagé)
    let client = build_http_client(cfg.request_timeout).context("failed to build HTTP client")?;
    let engine = Arc::new(AggregationEngine::new(registry.clone(), AlarmFetcher::new(client.clone())));
    let gateway = ProxyGateway::new(registry.clone(), client);

    let shutdown = CancellationToken::new();
    let poller = PollScheduler::new(engine.clone(), cfg.poll_interval).spawn(shutdown.clone());
    let watcher = HostsWatcher::new(registry, cfg.hosts_file.clone(), cfg.config_poll_interval)
        .spawn(shutdown.clone());

    let app_state = AppState { engine, gateway, health_tracker: HealthTracker::new() };
    let app = http::build_router(app_state, &cfg);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, environment = %cfg.environment, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    shutdown.cancel();
    for (name, handle) in [("poller", poller), ("watcher", watcher)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
