// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound API Gateway Service
//!
//! Accepts `POST /api/proxy` calls describing a request to a third-party API,
//! checks the target against the allowlist, rate-limits the caller, injects
//! the server-held credential and forwards the call.
//!
//! ## Configuration
//!
//! A `.env` file is read if present. `GATEWAY_CONFIG` may name a JSON config
//! file; these environment variables override it:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `ALLOWED_HOSTS`: Comma-separated destination allowlist
//! - `STRICT_HOSTS`: Accept exact allowlisted names only (default: false)
//! - `RATE_LIMIT_MAX`: Requests per client per window (default: 60)
//! - `RATE_LIMIT_WINDOW_MS`: Window length (default: 60000)
//! - `DEFAULT_TIMEOUT_MS`: Per-attempt timeout (default: 10000)
//! - `DEFAULT_MAX_RETRIES`: Retries for idempotent calls (default: 2)
//!
//! Secrets: `API_KEY`, plus each provider's own variable (`IPINFO`,
//! `IPSTACK`, `GITHUB_TOKEN` by default).

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use outbound_gateway::{
    allowlist::AllowlistGuard,
    client::AuthenticatedClient,
    config::{Config, SecretStore},
    gateway::Gateway,
    handlers::{router, AppState},
    limiter::RateLimiter,
    metrics::Metrics,
    providers::ProviderRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;
    let secrets = SecretStore::from_env(&config.providers);
    info!(
        bind_addr = %config.bind_addr,
        proxy_path = %config.proxy_path,
        allowed_hosts = ?config.allowlist.hosts,
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        providers = config.providers.len(),
        default_secret = secrets.has_default(),
        provider_secrets = secrets.provider_count(),
        "Starting outbound gateway"
    );
    if !secrets.has_default() {
        warn!("API_KEY is not set; authenticated calls without a provider secret will fail");
    }

    let metrics = if config.metrics.enabled {
        Some(Metrics::new()?)
    } else {
        None
    };

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let mut client = AuthenticatedClient::new(&config.client)?;
    if let Some(m) = &metrics {
        client = client.with_metrics(m.clone());
    }

    let mut gateway = Gateway::new(
        AllowlistGuard::new(config.allowlist.clone()),
        limiter.clone(),
        ProviderRegistry::new(config.providers.clone()),
        client,
        secrets,
        config.client.clone(),
    );
    if let Some(m) = &metrics {
        gateway = gateway.with_metrics(m.clone());
    }

    // Spawn cleanup task
    let sweep_interval = config.rate_limit.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState {
        gateway,
        metrics,
        config,
    });
    let app = router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
