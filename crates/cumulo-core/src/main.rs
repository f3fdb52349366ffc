// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cumulo Core - local cloud control plane.
//!
//! Wires the worker QUIC server, the gateway reconciler, the trigger
//! listener, and the service-resource refresher together and runs until
//! ctrl-c.

use anyhow::Result;
use tracing::{error, info};

use cumulo_core::config::Config;
use cumulo_core::gateway::{Gateway, ports::PortMap, triggers};
use cumulo_core::plane::ControlPlane;
use cumulo_core::refresher::ServiceResourceRefresher;
use cumulo_core::server::run_worker_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from the project directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cumulo_core=info".parse()?),
        )
        .init();

    info!("Starting Cumulo Core");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    let ports = match &config.ports_file {
        Some(path) => PortMap::load(path).map_err(|e| {
            error!("Port map error: {}", e);
            e
        })?,
        None => PortMap::default(),
    };

    info!(
        worker_addr = %config.worker_addr,
        trigger_addr = %config.trigger_addr,
        ports_file = ?config.ports_file,
        "Configuration loaded"
    );

    let plane = ControlPlane::new();

    // Refresher: clears a service's declared resources when its last worker
    // goes away.
    let refresher = ServiceResourceRefresher::new(plane.resources.clone());
    let refresher_handle = refresher.spawn(&plane);

    // Worker QUIC server (workers connect here to register and for queue
    // RPCs and declarations).
    let worker_addr = config.worker_addr;
    let worker_plane = plane.clone();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = run_worker_server(worker_addr, worker_plane).await {
            error!("worker server error: {}", e);
        }
    });

    // Gateway reconciler (binds/unbinds per-resource listeners reactively).
    let gateway = Gateway::new(plane.clone(), ports);
    let gateway_handle = tokio::spawn({
        let gateway = gateway.clone();
        async move {
            if let Err(e) = gateway.run().await {
                error!("gateway error: {}", e);
            }
        }
    });

    // Shared trigger listener (topics/schedules/jobs/errors).
    let trigger_addr = config.trigger_addr;
    let trigger_plane = plane.clone();
    let trigger_handle = tokio::spawn(async move {
        if let Err(e) = triggers::serve(trigger_addr, trigger_plane).await {
            error!("trigger listener error: {}", e);
        }
    });

    info!("Cumulo Core initialized successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    gateway.shutdown().await;
    worker_handle.abort();
    gateway_handle.abort();
    trigger_handle.abort();
    refresher_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
