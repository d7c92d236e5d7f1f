//! HTTP server setup.
//!
//! # Responsibilities
//! - Bind the assembled router to a listener
//! - Provide the peer address to the access log via `ConnectInfo`
//! - Drain in-flight requests on shutdown

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::assembler::App;
use crate::config::ListenerConfig;
use crate::lifecycle::shutdown_signal;

/// HTTP server for an assembled application.
pub struct HttpServer {
    router: Router,
    config: ListenerConfig,
}

impl HttpServer {
    pub fn new(app: App, config: ListenerConfig) -> Self {
        Self::from_router(app.into_router(), config)
    }

    pub fn from_router(router: Router, config: ListenerConfig) -> Self {
        Self { router, config }
    }

    /// Run until Ctrl+C or SIGTERM.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run until `signal` completes, then drain in-flight requests.
    pub async fn run_until<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            configured = %self.config.bind_address,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
