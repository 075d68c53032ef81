use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use livertc_api::{create_router, AppState, AuthPolicy, RateLimiter};
use livertc_core::{build_uploader, Config, SfuMetrics};
use livertc_sfu::Manager;

pub struct LivertcServer {
    config: Arc<Config>,
    manager: Arc<Manager>,
    router: Router,
}

impl LivertcServer {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(SfuMetrics::new());
        let uploader = build_uploader(&config.upload);
        let manager = Manager::new(Arc::clone(&config), Arc::clone(&metrics), uploader);

        let state = AppState {
            manager: Arc::clone(&manager),
            metrics,
            auth: Arc::new(AuthPolicy::from_config(&config.auth)),
            limiter: RateLimiter::from_config(&config.rate_limit),
            record_dir: config.recording.dir.clone(),
        };
        let router = create_router(state, &config.server.allowed_origin);

        Self {
            config,
            manager,
            router,
        }
    }

    /// Serve HTTP until a shutdown signal arrives, then close every room
    /// so no peer connection outlives the process.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            manager,
            router,
        } = self;

        let addr = config.http_address();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "HTTP server listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("HTTP server stopped, closing rooms");
        manager.close_all().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
