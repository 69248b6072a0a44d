//! `marginalia serve` — HTTP server + pipeline worker.

use anyhow::Context as _;
use marginalia_api::{build_router, ApiState};
use marginalia_core::Config;
use marginalia_mail::Mailer;
use marginalia_pipeline::{Enqueuer, Worker, DEFAULT_QUEUE_SIZE};
use marginalia_state::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

pub async fn run(config: Arc<Config>, store: Store) -> anyhow::Result<()> {
    // Reconcile configured sites before accepting any traffic.
    store.sync_sites(&config.site_titles())?;
    info!(sites = config.comment_sites.len(), "sites synchronized");

    let worker = Arc::new(Worker::new(store.clone(), config.clone(), DEFAULT_QUEUE_SIZE));
    worker.start();

    let mailer = config.smtp.clone().map(|smtp| Arc::new(Mailer::new(smtp)));
    if mailer.is_none() {
        info!("no [smtp] config, moderation mails disabled");
    }

    let state = ApiState {
        store,
        config: config.clone(),
        enqueuer: Some(worker.clone() as Arc<dyn Enqueuer>),
        mailer,
    };
    let router = build_router(state);

    let listen = normalize_listen(&config.server.listen);
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    info!(%listen, "http server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    // The in-flight run is never cancelled; the deadline bounds only the
    // wait for it to finish.
    if worker.stop(SHUTDOWN_DEADLINE).await.is_err() {
        error!("pipeline worker did not drain before the shutdown deadline");
    }

    info!("server stopped");
    Ok(())
}

/// ":8080" means "bind every interface on port 8080".
fn normalize_listen(listen: &str) -> String {
    let listen = listen.trim();
    if let Some(port) = listen.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        listen.to_string()
    }
}
