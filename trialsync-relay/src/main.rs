// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TrialSync Relay Server

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use trialsync_core::temporal::SystemClock;

use trialsync_relay::config::RelayConfig;
use trialsync_relay::http::create_router;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trialsync_relay=info".parse().unwrap()),
        )
        .init();

    let config = RelayConfig::from_env();
    info!(
        "Starting TrialSync Relay Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Storage backend: {:?}", config.storage_backend);
    if config.admin_token.is_none() {
        tracing::warn!("TRIALSYNC_ADMIN_TOKEN unset; enrollment endpoints are disabled");
    }

    let state = trialsync_relay::build_state(&config, Arc::new(SystemClock))
        .expect("Failed to open relay storage");
    let router = create_router(state);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind HTTP listener");
    info!("HTTP server listening on {}", config.listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
