mod config;
mod routes;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use campaigner_db::Database;
use campaigner_dispatch::{Consumer, DispatchContext, TriggerHandler};
use campaigner_types::events::CAMPAIGNER_TOPIC;
use campaigner_types::models::CampaignStatus;

use crate::config::Config;

const DEFAULT_LOG_FILTER: &str = "campaigner=info,campaigner_dispatch=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let db = Arc::new(Database::open(&config.db_path)?);
    report_stuck_campaigns(&db);

    let handler = Arc::new(TriggerHandler::new(
        DispatchContext::sqlite(db),
        config.dispatch_settings(),
    ));
    let consumer = Consumer::start(handler, config.consumer_config())?;

    let app = routes::router(consumer.handle()).layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!(topic = CAMPAIGNER_TOPIC, "Campaigner listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Joins worker threads; in-flight campaigns run to completion first.
    tokio::task::spawn_blocking(move || consumer.shutdown()).await?;
    info!("Campaigner stopped");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Campaigns left in `sending` by an aborted or interrupted run need an
/// operator; nothing resumes them automatically.
fn report_stuck_campaigns(db: &Database) {
    match db.list_campaigns_by_status(CampaignStatus::Sending.as_str()) {
        Ok(stuck) => {
            for campaign in &stuck {
                warn!(
                    campaign_id = campaign.id,
                    user_id = campaign.user_id,
                    started_at = campaign.started_at.as_deref().unwrap_or("-"),
                    "Campaign stuck in sending"
                );
            }
        }
        Err(e) => warn!(error = %e, "Unable to list campaigns in sending"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!(error = %e, "Unable to install SIGTERM handler; waiting for Ctrl+C");
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
