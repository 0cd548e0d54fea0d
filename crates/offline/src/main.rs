//! `backoffice-sync`: keeps the local catalog fresh and replays queued writes.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;

use backoffice_offline::{OfflineConfig, OfflineContext, RefreshOutcome, SyncEvent};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    backoffice_observability::init();

    let config = OfflineConfig::from_env().context("invalid configuration")?;
    tracing::info!(api_url = %config.api_url, collection = %config.catalog_collection, "starting backoffice-sync");

    let ctx = OfflineContext::connect(config)
        .await
        .context("failed to open offline context")?;

    match ctx.cache().refresh().await? {
        RefreshOutcome::Refreshed { items, .. } => tracing::info!(items, "catalog ready"),
        RefreshOutcome::Stale { reason } => {
            tracing::warn!(%reason, cached = ctx.cache().len(), "starting with cached catalog")
        }
    }

    let mut events = ctx.engine().events();
    let worker = ctx.spawn_worker();
    let status = ctx.status();
    let mut status_tick = tokio::time::interval(STATUS_LOG_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = status_tick.tick() => match status.render().await {
                Ok(line) => tracing::info!(status = %line, "offline status"),
                Err(err) => tracing::error!(error = %err, "could not read status"),
            },
            event = events.recv() => match event {
                Ok(SyncEvent::OperationRejected { operation, error }) => {
                    tracing::error!(id = %operation.id, kind = operation.kind(), %error, "operation needs operator attention");
                }
                Ok(event) => tracing::debug!(?event, "sync event"),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "sync events dropped"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    worker.stop().await.context("sync worker panicked")?;
    tracing::info!("backoffice-sync stopped");
    Ok(())
}
