//! S-Life server.
//!
//! Hosts one monitoring session and exposes it over HTTP. Configuration is
//! read from `SLIFE_*` environment variables (see [`slife::config`]).
//!
//! A background task re-probes connectivity on every flush interval: a
//! transition to online flushes the offline queue, and while online any
//! leftover backlog is retried.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use slife::api::{AppState, router};
use slife::channels::{
    EmailChannel, HttpEmailTransport, LocalAlerts, SmsChannel, TracingNotifier,
    UnsupportedSmsGateway,
};
use slife::config::Config;
use slife::dispatcher::AlertDispatcher;
use slife::network::{ConnectivityProbe, HttpProbe};
use slife::offline::HttpRecordStore;
use slife::session::{Session, SessionOptions};
use slife::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Contact details stay out of the logs at the default level
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("slife=info".parse()?))
        .init();

    let config = Config::from_env();
    info!(
        port = config.port,
        db_url = %config.database_url,
        user_id = %config.user_id,
        platform = ?config.platform.os,
        "Starting S-Life server"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let probe = Arc::new(HttpProbe::with_url(&config.probe_url));
    let email = EmailChannel::new(Arc::new(HttpEmailTransport::with_base_url(
        &config.email_function_url,
        config.api_key.clone(),
    )));
    let sms = SmsChannel::new(
        config.platform,
        Arc::new(UnsupportedSmsGateway),
        Arc::new(storage.clone()),
        config.utc_offset,
    );
    let dispatcher = AlertDispatcher::new(&config.user_id, Arc::new(storage.clone()), probe.clone())
        .with_policy(config.cooldowns)
        .with_channel(Arc::new(email))
        .with_channel(Arc::new(sms));

    let records = Arc::new(HttpRecordStore::with_base_url(
        &config.records_url,
        config.api_key.clone(),
    ));
    let session = Arc::new(
        Session::load(
            &config.user_id,
            storage,
            dispatcher,
            LocalAlerts::new(Arc::new(TracingNotifier)),
            records,
            SessionOptions {
                offline_capacity: config.offline_capacity,
                start_online: probe.is_reachable().await,
                ..Default::default()
            },
        )
        .await?,
    );

    let monitor = session.clone();
    let interval = config.flush_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let online = probe.is_reachable().await;
            let was_online = monitor.is_online();
            match monitor.set_online(online).await {
                Ok(Some(report)) => info!(synced = report.synced, "Flushed after reconnect"),
                Ok(None) if online && was_online => {
                    if let Err(e) = monitor.flush().await {
                        warn!(error = %e, "Periodic flush failed");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Flush after reconnect failed"),
            }
        }
    });

    let app = router(AppState { session });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "S-Life is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
