//! Processing side of a relay: accepts forwarded work and calls the
//! originator back with the result.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{RelayError, RelayResult};
use crate::domain::message::Message;
use crate::middleware::RelayMetrics;
use crate::relay::forwarder::Forwarder;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub struct Processor {
    forwarder: Arc<dyn Forwarder>,
    /// `host:port` of this instance, stamped into processed bodies
    authority: String,
    metrics: Arc<RelayMetrics>,
}

impl Processor {
    pub fn new(
        forwarder: Arc<dyn Forwarder>,
        authority: impl Into<String>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            forwarder,
            authority: authority.into(),
            metrics,
        }
    }

    /// Accept a forwarded message and schedule its callback.
    ///
    /// Returns as soon as the message is validated; the callback is sent from
    /// a background task.
    pub fn accept(&self, raw: &[u8]) -> RelayResult<(CorrelationId, JoinHandle<()>)> {
        let mut message = Message::from_slice(raw)?;
        if message.callback.is_empty() {
            return Err(RelayError::MalformedPayload("missing callback address".into()));
        }

        message.annotate(&format!("async request at {}", self.authority));
        let id = message.id.clone();

        let forwarder = Arc::clone(&self.forwarder);
        let metrics = Arc::clone(&self.metrics);
        let handle = tokio::spawn(async move {
            match forwarder.forward(&message.callback, &message).await {
                Ok(()) => debug!(correlation_id = %message.id, "Callback delivered"),
                Err(e) => {
                    metrics.record_forward_failure();
                    error!(
                        correlation_id = %message.id,
                        callback = %message.callback,
                        error = %e,
                        "Callback failed"
                    );
                }
            }
        });

        Ok((id, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::forwarder::channel::ChannelForwarder;
    use crate::relay::forwarder::ForwardError;

    #[tokio::test]
    async fn test_accept_annotates_and_calls_back() {
        let (forwarder, mut rx) = ChannelForwarder::new();
        let processor = Processor::new(Arc::new(forwarder), "localhost:3000", Arc::new(RelayMetrics::new()));

        let raw = br#"{"callback":"http://localhost:3001/callback","id":"p-1","body":"hello, api request localhost:3001"}"#;
        let (id, handle) = processor.accept(raw).unwrap();
        handle.await.unwrap();

        assert_eq!(id.as_str(), "p-1");
        let callback = rx.recv().await.unwrap();
        assert_eq!(callback.target, "http://localhost:3001/callback");
        assert_eq!(callback.message.id, id);
        assert_eq!(
            callback.message.body,
            "hello, api request localhost:3001, async request at localhost:3000"
        );
    }

    #[test]
    fn test_missing_callback_rejected() {
        let (forwarder, _rx) = ChannelForwarder::new();
        let processor = Processor::new(Arc::new(forwarder), "localhost:3000", Arc::new(RelayMetrics::new()));

        let err = processor.accept(br#"{"id":"p-1","body":"x"}"#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_failed_callback_is_counted() {
        let (forwarder, _rx) =
            ChannelForwarder::failing(ForwardError::Unreachable("refused".into()));
        let metrics = Arc::new(RelayMetrics::new());
        let processor = Processor::new(Arc::new(forwarder), "localhost:3000", Arc::clone(&metrics));

        let (_, handle) = processor
            .accept(br#"{"callback":"http://gone/callback","id":"p-1","body":"x"}"#)
            .unwrap();
        handle.await.unwrap();

        assert_eq!(metrics.to_json()["relay"]["forward_failures"], 1);
    }
}
