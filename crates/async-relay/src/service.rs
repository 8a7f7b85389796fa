//! Relay service - wires the components together and runs the HTTP server.

use crate::domain::config::RelayConfig;
use crate::domain::correlation::{IdGenerator, UuidV7Generator};
use crate::domain::error::ServiceError;
use crate::domain::pending::{cleanup_task, CorrelationRegistry};
use crate::middleware::RelayMetrics;
use crate::relay::{
    selector_from_config, CallbackIntake, Dispatcher, Forwarder, HttpForwarder, PeerSelector,
    Processor,
};
use crate::router::{build_router, AppState};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Relay service state
pub struct RelayService {
    config: RelayConfig,
    registry: Arc<CorrelationRegistry>,
    dispatcher: Arc<Dispatcher>,
    intake: Arc<CallbackIntake>,
    processor: Arc<Processor>,
    metrics: Arc<RelayMetrics>,
}

impl RelayService {
    /// Create a relay with an HTTP forwarder and the configured peers
    pub fn new(config: RelayConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let forwarder = HttpForwarder::new(config.timeouts.forward)
            .map_err(|e| ServiceError::Client(e.to_string()))?;
        let peers: Arc<dyn PeerSelector> = Arc::from(selector_from_config(&config));

        Self::with_parts(config, Arc::new(forwarder), peers, Arc::new(UuidV7Generator))
    }

    /// Create a relay from injected collaborators
    pub fn with_parts(
        config: RelayConfig,
        forwarder: Arc<dyn Forwarder>,
        peers: Arc<dyn PeerSelector>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;

        let registry = Arc::new(CorrelationRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&forwarder),
            peers,
            ids,
            config.callback_url(),
            config.timeouts.deadline,
            Arc::clone(&metrics),
        ));
        let intake = Arc::new(CallbackIntake::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));
        let processor = Arc::new(Processor::new(
            forwarder,
            config.authority(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            registry,
            dispatcher,
            intake,
            processor,
            metrics,
        })
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            intake: Arc::clone(&self.intake),
            processor: Arc::clone(&self.processor),
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            authority: self.config.authority(),
        };
        build_router(state, self.config.limits.max_body_bytes)
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind((self.config.http.host.as_str(), self.config.http.port))
            .await
            .map_err(|source| ServiceError::Bind {
                addr: self.config.authority(),
                source,
            })?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        info!(
            addr = %local,
            callback = %self.dispatcher.callback_url(),
            deadline_ms = self.dispatcher.default_deadline().as_millis() as u64,
            "Starting relay"
        );

        let sweeper = tokio::spawn(cleanup_task(
            Arc::clone(&self.registry),
            self.config.timeouts.cleanup_interval,
        ));

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();

        let leftover = self.registry.pending_count();
        if leftover > 0 {
            warn!(pending = leftover, "Relay stopped with requests still pending");
        }
        info!("Relay stopped");

        result.map_err(ServiceError::from)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn registry(&self) -> Arc<CorrelationRegistry> {
        Arc::clone(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ConfigError;
    use tokio::sync::oneshot;

    fn config(port: u16) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.http.host = "127.0.0.1".into();
        config.http.port = port;
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config(3001);
        bad.http.port = 0;

        let err = RelayService::new(bad).err().unwrap();
        assert!(matches!(err, ServiceError::Config(ConfigError::InvalidPort(_))));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let service = RelayService::new(config(3001)).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            service
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_start_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut config = config(port);
        config.peers.static_peers = vec!["http://127.0.0.1:1/".into()];
        let service = RelayService::new(config).unwrap();

        let err = service.start(async {}).await.err().unwrap();
        assert!(matches!(err, ServiceError::Bind { .. }));
    }
}
