//! Gateway orchestrator wiring the registry, the rate limiter, the
//! background tasks and the HTTP surface together.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::admission::RateLimiter;
use crate::config::GatewaySettings;
use crate::server::{self, AppState};
use crate::session::{Connector, SessionRegistry};

/// A running gateway: shared state plus the reaper and sweeper tasks.
pub struct Gateway {
    state: AppState,
    shutdown_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Builds the shared state and spawns the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: GatewaySettings, connector: Arc<dyn Connector>) -> Self {
        let shutdown_token = CancellationToken::new();
        let registry = Arc::new(SessionRegistry::new());
        let limiter = Arc::new(RateLimiter::new(settings.rate_limit, settings.rate_window));

        let reaper = registry.start_reaper(
            settings.reap_interval,
            settings.session_grace,
            shutdown_token.child_token(),
        );
        let sweeper = limiter.start_sweeper(settings.sweep_interval, shutdown_token.child_token());

        debug!(
            max_sessions = settings.max_sessions,
            rate_limit = settings.rate_limit,
            grace_secs = settings.session_grace.as_secs(),
            "Gateway started"
        );

        Self {
            state: AppState {
                registry,
                limiter,
                connector,
                settings: Arc::new(settings),
            },
            shutdown_token,
            tasks: Mutex::new(vec![reaper, sweeper]),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.state.limiter
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.state.settings
    }

    /// Token cancelled by [`Gateway::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// The axum router for this gateway.
    pub fn router(&self) -> Router {
        server::build_router(self.state.clone())
    }

    /// Serves HTTP on `listener` until [`Gateway::shutdown`] is called.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "sshgate listening");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(self.shutdown_token.clone().cancelled_owned())
        .await
    }

    /// Stops the background tasks and closes every unclaimed session.
    ///
    /// Attached sessions end with their transports.
    pub async fn shutdown(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        info!("Shutting down gateway");
        self.shutdown_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        let pending = self.state.registry.len();
        self.state.registry.close_all().await;
        info!(closed = pending, "Gateway stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::shell::testing::{loopback_shell, LoopbackConnector};

    #[tokio::test]
    async fn test_shutdown_closes_pending_sessions() {
        let gateway = Gateway::start(
            GatewaySettings::default(),
            Arc::new(LoopbackConnector::default()),
        );
        let (shell, probe) = loopback_shell(1024);
        gateway.registry().create(shell);

        gateway.shutdown().await;
        assert!(gateway.registry().is_empty());
        assert!(gateway.shutdown_token().is_cancelled());
        assert_eq!(probe.disconnects.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Second call is a no-op.
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let gateway = Arc::new(Gateway::start(
            GatewaySettings::default(),
            Arc::new(LoopbackConnector::default()),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let serving = Arc::clone(&gateway);
        let handle = tokio::spawn(async move { serving.serve(listener).await });

        gateway.shutdown().await;
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_uses_settings() {
        let settings = GatewaySettings {
            reap_interval: Duration::from_secs(5),
            session_grace: Duration::from_secs(5),
            ..GatewaySettings::default()
        };
        let gateway = Gateway::start(settings, Arc::new(LoopbackConnector::default()));
        let (shell, _) = loopback_shell(1024);
        gateway.registry().create(shell);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(gateway.registry().is_empty());
        gateway.shutdown().await;
    }
}
