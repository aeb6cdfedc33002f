// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level server runner — shared by `main` and the end-to-end specs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapter::Adapters;
use crate::config::Config;
use crate::state::App;
use crate::transport::build_router;

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / CORRAL_LOG_LEVEL > RUST_LOG > default ("info").
    let filter = if std::env::var("CORRAL_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Build the component graph, run orphan cleanup and the first discovery
/// pass, and start the periodic tickers.
pub async fn prepare(config: Config) -> anyhow::Result<Arc<App>> {
    prepare_with_adapters(config, Adapters::new()).await
}

/// [`prepare`] with injected adapters; the specs crate uses this with mock
/// backends.
pub async fn prepare_with_adapters(
    config: Config,
    adapters: Adapters,
) -> anyhow::Result<Arc<App>> {
    let app = App::with_adapters(config, adapters)?;

    // Lingering driver processes from a previous run; never blocks startup.
    app.supervisor.cleanup_orphans();

    if app.config.seed_demo_devices {
        app.registry.seed_demo_devices().await;
    }

    app.registry.discover().await;
    spawn_tickers(&app);
    Ok(app)
}

fn spawn_tickers(app: &Arc<App>) {
    // Periodic discovery.
    {
        let app = Arc::clone(app);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(app.config.discovery_interval));
            ticker.tick().await; // the initial pass already ran
            loop {
                tokio::select! {
                    _ = app.shutdown.cancelled() => break,
                    _ = ticker.tick() => app.registry.discover().await,
                }
            }
        });
    }

    // Health broadcast + battery sweep.
    {
        let app = Arc::clone(app);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(app.config.health_interval.max(1)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = app.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        for device in app.registry.snapshot().await {
                            if device.status == crate::model::DeviceStatus::Offline {
                                continue;
                            }
                            // Broadcasts only when the reading changed.
                            let _ = app.registry.refresh_battery(&device.id).await;
                        }
                        let health = app.health_snapshot().await;
                        app.bus.system_health(health);
                    }
                }
            }
        });
    }

    // Reservation deadline reaper (optional).
    if app.config.reaper_interval > 0 {
        let app = Arc::clone(app);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(app.config.reaper_interval));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = app.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = app.sessions.reap_expired().await;
                        if reaped > 0 {
                            info!(reaped, "reservation deadlines enforced");
                        }
                    }
                }
            }
        });
    }
}

/// Bind the listener and serve until a termination signal arrives, then run
/// the shutdown sequence: tickers stop, driver servers stop in parallel, log
/// tails close, transport drains.
pub async fn serve(app: Arc<App>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", app.config.host, app.config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    info!(addr = %addr, env = %app.config.env, "device lab controller listening");

    spawn_signal_handler(&app);

    let shutdown = app.shutdown.clone();
    let router = build_router(Arc::clone(&app));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    info!("shutting down: stopping driver servers and log tails");
    app.supervisor.stop_all().await;
    app.registry.stop_all_tails().await;
    Ok(())
}

fn spawn_signal_handler(app: &Arc<App>) {
    let shutdown = app.shutdown.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(s) => s,
            Err(e) => {
                warn!(err = %e, "SIGTERM handler unavailable");
                let _ = ctrl_c.await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
        info!("termination signal received");
        shutdown.cancel();
    });
}

/// Run the controller to completion.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    let app = prepare(config).await?;
    serve(app).await
}
