//! Outbound transport for forwarded messages and callbacks.

use crate::domain::message::Message;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Sends a message to another relay instance
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// POST `message` to `target`
    async fn forward(&self, target: &str, message: &Message) -> Result<(), ForwardError>;
}

/// Forwarding error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    /// The request never reached the target
    #[error("target unreachable: {0}")]
    Unreachable(String),
    /// The target answered with a non-success status
    #[error("target rejected message with status {status}")]
    Rejected { status: u16 },
    /// The request was sent but the exchange failed afterwards
    #[error("transport error: {0}")]
    Transport(String),
}

impl ForwardError {
    /// Whether the message certainly did not reach the target
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ForwardError::Unreachable(_))
    }
}

/// Forwarder backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, target: &str, message: &Message) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(target)
            .json(message)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        debug!(
            target = target,
            correlation_id = %message.id,
            status = status.as_u16(),
            "Forward acknowledged"
        );

        if status.is_success() {
            Ok(())
        } else {
            Err(ForwardError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

fn classify(e: reqwest::Error) -> ForwardError {
    if e.is_connect() || e.is_builder() {
        ForwardError::Unreachable(e.to_string())
    } else {
        ForwardError::Transport(e.to_string())
    }
}

/// In-memory forwarder for testing
pub mod channel {
    use super::*;
    use tokio::sync::mpsc;

    /// A message captured by [`ChannelForwarder`]
    #[derive(Debug, Clone)]
    pub struct Forwarded {
        pub target: String,
        pub message: Message,
    }

    /// Records forwarded messages on an mpsc channel.
    ///
    /// An optional scripted failure is returned instead of recording.
    pub struct ChannelForwarder {
        sender: mpsc::UnboundedSender<Forwarded>,
        failure: Option<ForwardError>,
    }

    impl ChannelForwarder {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<Forwarded>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Self {
                    sender: tx,
                    failure: None,
                },
                rx,
            )
        }

        /// Forwarder that records the message and then fails with `error`
        pub fn failing(error: ForwardError) -> (Self, mpsc::UnboundedReceiver<Forwarded>) {
            let (mut forwarder, rx) = Self::new();
            forwarder.failure = Some(error);
            (forwarder, rx)
        }
    }

    #[async_trait]
    impl Forwarder for ChannelForwarder {
        async fn forward(&self, target: &str, message: &Message) -> Result<(), ForwardError> {
            if let Some(ForwardError::Unreachable(reason)) = &self.failure {
                return Err(ForwardError::Unreachable(reason.clone()));
            }
            self.sender
                .send(Forwarded {
                    target: target.to_string(),
                    message: message.clone(),
                })
                .map_err(|_| ForwardError::Unreachable("channel closed".into()))?;
            match &self.failure {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::channel::ChannelForwarder;
    use super::*;
    use crate::domain::correlation::CorrelationId;

    fn message() -> Message {
        Message::new(CorrelationId::generate(), "http://localhost:3001/callback", "hi")
    }

    #[tokio::test]
    async fn test_channel_forwarder_records() {
        let (forwarder, mut rx) = ChannelForwarder::new();
        let msg = message();

        forwarder.forward("http://localhost:3000", &msg).await.unwrap();

        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.target, "http://localhost:3000");
        assert_eq!(forwarded.message, msg);
    }

    #[tokio::test]
    async fn test_unreachable_records_nothing() {
        let (forwarder, mut rx) =
            ChannelForwarder::failing(ForwardError::Unreachable("refused".into()));

        let err = forwarder.forward("http://x", &message()).await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_still_records() {
        let (forwarder, mut rx) = ChannelForwarder::failing(ForwardError::Rejected { status: 500 });

        let err = forwarder.forward("http://x", &message()).await.unwrap_err();
        assert_eq!(err, ForwardError::Rejected { status: 500 });
        assert!(!err.is_unreachable());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_http_forwarder_connection_refused() {
        // Bind then drop to get a port with no listener
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = HttpForwarder::new(Duration::from_secs(2)).unwrap();
        let err = forwarder
            .forward(&format!("http://{}", addr), &message())
            .await
            .unwrap_err();
        assert!(err.is_unreachable(), "got {:?}", err);
    }
}
