use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Action proxy — init / run / ping over HTTP
//
// One artifact slot, one lifecycle, one child at a time.
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "action_proxy=info,action_runtime=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = action_proxy::state::Config::from_env()?;
    tracing::info!(
        action_path = %cfg.runtime.action_path.display(),
        timeout_ms = cfg.runtime.timeout.map(|t| t.as_millis() as u64),
        exit_policy = ?cfg.runtime.exit_policy,
        "config loaded"
    );

    let addr = format!("0.0.0.0:{}", cfg.port);
    let state = action_proxy::state::AppState::new(&cfg.runtime);
    let app = action_proxy::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
