//! Router over the in-process hub.

use async_trait::async_trait;
use tracing::trace;

use crate::hub::{Delivery, InProcessHub};
use courier_core::{Endpoint, Envelope, RouterError, RouterResult, TransportError};
use courier_framework::{FrameworkResult, MessageRouter, RouterRegistration};

/// Receiver pattern covering every implicit `app://` url.
pub const IN_PROCESS_PATTERN: &str = r"^app://";

/// Delivers envelopes to participants of an [`InProcessHub`].
///
/// Recipients with an explicit non-`app` url are declined, as are
/// recipients no participant matches. An envelope without recipients goes
/// to every participant except its sender.
#[derive(Debug, Clone)]
pub struct InProcessRouter {
    hub: InProcessHub,
}

impl InProcessRouter {
    /// Name reported in logs and errors.
    pub const NAME: &'static str = "in-process";

    /// Creates a router over `hub`.
    pub fn new(hub: InProcessHub) -> Self {
        Self { hub }
    }

    /// Returns a non-fallback registration matching [`IN_PROCESS_PATTERN`].
    pub fn registration(self) -> FrameworkResult<RouterRegistration> {
        RouterRegistration::new(self, IN_PROCESS_PATTERN)
    }
}

#[async_trait]
impl MessageRouter for InProcessRouter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn try_send(&self, envelope: &Envelope) -> RouterResult<()> {
        let targets = if envelope.recipients.is_empty() {
            let sender = envelope
                .sender
                .as_ref()
                .and_then(|s| s.app_instance_id.as_deref());
            self.hub.everyone_but(sender)
        } else {
            let mut targets = Vec::new();
            for recipient in &envelope.recipients {
                if recipient.url.as_deref().is_some_and(|url| !url.starts_with("app://")) {
                    return Err(RouterError::not_supported(Self::NAME));
                }
                match self.hub.resolve(&addressed(recipient)) {
                    Delivery::Peers(peers) => targets.extend(peers),
                    Delivery::Unknown(endpoint) => {
                        return Err(RouterError::addressing(Self::NAME, endpoint.to_string()));
                    }
                }
            }
            targets
        };

        for (instance_id, inbox) in targets {
            trace!(instance = %instance_id, id = %envelope.id, "Delivering envelope");
            inbox
                .send(envelope.clone())
                .await
                .map_err(|_| TransportError::ConnectionClosed {
                    reason: format!("instance '{instance_id}' detached"),
                })?;
        }
        Ok(())
    }
}

/// Fills the ids of a recipient addressed only by an `app://{app}/{instance}` url.
fn addressed(recipient: &Endpoint) -> Endpoint {
    if recipient.app_id.is_some() || recipient.app_instance_id.is_some() {
        return recipient.clone();
    }
    let Some(path) = recipient.url.as_deref().and_then(|url| url.strip_prefix("app://")) else {
        return recipient.clone();
    };

    let mut parts = path.splitn(2, '/');
    let part = |value: Option<&str>| {
        value
            .filter(|v| !v.is_empty() && *v != "*")
            .map(str::to_owned)
    };
    Endpoint {
        app_id: part(parts.next()),
        app_instance_id: part(parts.next()),
        url: recipient.url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Message;

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    #[tokio::test]
    async fn test_delivers_to_instance() {
        let hub = InProcessHub::new();
        let mut worker = hub.attach(&Endpoint::instance("w1")).unwrap();
        let router = InProcessRouter::new(hub.clone());

        let envelope = Envelope::new(Ping).to(Endpoint::instance("w1"));
        router.try_send(&envelope).await.unwrap();

        let delivered = worker.recv().await.unwrap();
        assert_eq!(delivered.id, envelope.id);
    }

    #[tokio::test]
    async fn test_unknown_instance_is_declined() {
        let router = InProcessRouter::new(InProcessHub::new());
        let envelope = Envelope::new(Ping).to(Endpoint::instance("ghost"));

        let err = router.try_send(&envelope).await.unwrap_err();
        assert!(matches!(err, RouterError::Addressing { .. }));
        assert!(err.is_declined());
    }

    #[tokio::test]
    async fn test_foreign_url_is_not_supported() {
        let router = InProcessRouter::new(InProcessHub::new());
        let envelope = Envelope::new(Ping).to(Endpoint::url("redis://queue/w1"));

        let err = router.try_send(&envelope).await.unwrap_err();
        assert!(matches!(err, RouterError::NotSupported { .. }));
    }

    #[tokio::test]
    async fn test_explicit_app_url() {
        let hub = InProcessHub::new();
        let mut worker = hub
            .attach(&Endpoint::app("billing").with_app_instance_id("b1"))
            .unwrap();
        let router = InProcessRouter::new(hub.clone());

        let envelope = Envelope::new(Ping).to(Endpoint::url("app://billing/*"));
        router.try_send(&envelope).await.unwrap();
        assert_eq!(worker.recv().await.unwrap().id, envelope.id);
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = InProcessHub::new();
        let mut sender = hub.attach(&Endpoint::instance("a")).unwrap();
        let mut other = hub.attach(&Endpoint::instance("b")).unwrap();
        let router = InProcessRouter::new(hub.clone());

        let envelope = Envelope::new(Ping).sent_by(Endpoint::instance("a"));
        router.try_send(&envelope).await.unwrap();

        assert_eq!(other.recv().await.unwrap().id, envelope.id);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), sender.recv())
            .await
            .is_err());
    }
}
