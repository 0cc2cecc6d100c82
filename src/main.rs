// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use atelier_server::api::router;
use atelier_server::config::ServerConfig;
use atelier_server::state::AppState;
use atelier_server::storage::repository::{ApiKeyRepository, StoredApiKey};
use atelier_server::storage::MarketDb;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let db = match MarketDb::open(&config.data_dir.join("market.redb")) {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "failed to open the market database");
            std::process::exit(1);
        }
    };

    let state = AppState::new(db, config.jwt_secret.clone());

    // Seed the bootstrap API key so a fresh deployment can be driven
    // without manual key provisioning.
    if let Some(key) = &config.bootstrap_api_key {
        if let Err(err) = ApiKeyRepository::new(&state.db).put(&StoredApiKey::all_enabled(key)) {
            tracing::error!(error = %err, "failed to seed the bootstrap API key");
            std::process::exit(1);
        }
        tracing::info!("bootstrap API key seeded");
    }

    let app = router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, "invalid bind address");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "atelier server listening (docs at /api-doc/openapi.json)");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server failed");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}
