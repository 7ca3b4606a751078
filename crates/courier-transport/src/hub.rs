//! In-process message hub.
//!
//! An [`InProcessHub`] connects brokers living in the same process. Each
//! participant attaches under its endpoint and receives the envelopes
//! addressed to it through a bounded channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use courier_core::{Endpoint, Envelope, TransportError, TransportResult};

/// Default capacity of each participant's inbox.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// One attached participant.
#[derive(Clone)]
struct Peer {
    app_id: Option<String>,
    inbox: mpsc::Sender<Envelope>,
}

/// Where an envelope should go.
pub(crate) enum Delivery {
    /// The resolved inboxes.
    Peers(Vec<(String, mpsc::Sender<Envelope>)>),
    /// No participant matches the recipient.
    Unknown(Endpoint),
}

/// A process-local switchboard between brokers.
///
/// Cloning is cheap; clones share the participant table.
#[derive(Clone, Default)]
pub struct InProcessHub {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
}

impl InProcessHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a participant with the default inbox capacity.
    ///
    /// The endpoint must carry an `app_instance_id`, which must be unique on
    /// this hub.
    pub fn attach(&self, endpoint: &Endpoint) -> TransportResult<HubConnection> {
        self.attach_with_capacity(endpoint, DEFAULT_INBOX_CAPACITY)
    }

    /// Attaches a participant with the given inbox capacity.
    pub fn attach_with_capacity(
        &self,
        endpoint: &Endpoint,
        capacity: usize,
    ) -> TransportResult<HubConnection> {
        let Some(instance_id) = endpoint.app_instance_id.clone() else {
            return Err(TransportError::MissingInstanceId {
                endpoint: endpoint.to_string(),
            });
        };

        let (inbox, receiver) = mpsc::channel(capacity.max(1));
        {
            let mut peers = self.peers.write();
            if peers.contains_key(&instance_id) {
                return Err(TransportError::AlreadyAttached {
                    instance: instance_id,
                });
            }
            peers.insert(
                instance_id.clone(),
                Peer {
                    app_id: endpoint.app_id.clone(),
                    inbox,
                },
            );
        }

        info!(instance = %instance_id, "Attached to in-process hub");
        Ok(HubConnection {
            hub: self.clone(),
            endpoint: endpoint.clone(),
            instance_id,
            receiver,
        })
    }

    fn detach(&self, instance_id: &str) {
        if self.peers.write().remove(instance_id).is_some() {
            debug!(instance = %instance_id, "Detached from in-process hub");
        }
    }

    /// Returns `true` if an instance with this id is attached.
    pub fn is_attached(&self, instance_id: &str) -> bool {
        self.peers.read().contains_key(instance_id)
    }

    /// Returns the number of attached participants.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns `true` if nobody is attached.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Resolves one recipient to the inboxes it addresses.
    ///
    /// An instance id selects that instance; an app id alone selects every
    /// instance of the app.
    pub(crate) fn resolve(&self, recipient: &Endpoint) -> Delivery {
        let peers = self.peers.read();

        let found: Vec<(String, mpsc::Sender<Envelope>)> = match &recipient.app_instance_id {
            Some(instance_id) => peers
                .get(instance_id)
                .filter(|peer| match &recipient.app_id {
                    Some(app_id) => peer.app_id.as_ref() == Some(app_id),
                    None => true,
                })
                .map(|peer| (instance_id.clone(), peer.inbox.clone()))
                .into_iter()
                .collect(),
            None => peers
                .iter()
                .filter(|(_, peer)| {
                    recipient.app_id.is_some() && peer.app_id == recipient.app_id
                })
                .map(|(id, peer)| (id.clone(), peer.inbox.clone()))
                .collect(),
        };

        if found.is_empty() {
            Delivery::Unknown(recipient.clone())
        } else {
            Delivery::Peers(found)
        }
    }

    /// Returns every inbox except the one attached as `except`.
    pub(crate) fn everyone_but(
        &self,
        except: Option<&str>,
    ) -> Vec<(String, mpsc::Sender<Envelope>)> {
        self.peers
            .read()
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != except)
            .map(|(id, peer)| (id.clone(), peer.inbox.clone()))
            .collect()
    }
}

impl fmt::Debug for InProcessHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessHub")
            .field("peers", &self.len())
            .finish()
    }
}

// ============================================================================
// HubConnection
// ============================================================================

/// A participant's attachment to the hub.
///
/// Dropping the connection detaches the participant.
pub struct HubConnection {
    hub: InProcessHub,
    endpoint: Endpoint,
    instance_id: String,
    receiver: mpsc::Receiver<Envelope>,
}

impl HubConnection {
    /// Returns the endpoint this connection was attached under.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Receives the next envelope addressed to this participant.
    ///
    /// Returns `None` once the hub can no longer deliver.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.hub.detach(&self.instance_id);
    }
}

impl fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConnection")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_requires_instance_id() {
        let hub = InProcessHub::new();
        assert!(matches!(
            hub.attach(&Endpoint::app("billing")),
            Err(TransportError::MissingInstanceId { .. })
        ));
    }

    #[test]
    fn test_attach_rejects_duplicates_and_detaches_on_drop() {
        let hub = InProcessHub::new();
        let endpoint = Endpoint::instance("w1");

        let connection = hub.attach(&endpoint).unwrap();
        assert!(matches!(
            hub.attach(&endpoint),
            Err(TransportError::AlreadyAttached { ref instance }) if instance == "w1"
        ));
        assert!(hub.is_attached("w1"));

        drop(connection);
        assert!(!hub.is_attached("w1"));
        assert!(hub.is_empty());
    }

    #[test]
    fn test_resolve_by_app_id() {
        let hub = InProcessHub::new();
        let _a = hub
            .attach(&Endpoint::app("billing").with_app_instance_id("b1"))
            .unwrap();
        let _b = hub
            .attach(&Endpoint::app("billing").with_app_instance_id("b2"))
            .unwrap();
        let _c = hub
            .attach(&Endpoint::app("search").with_app_instance_id("s1"))
            .unwrap();

        match hub.resolve(&Endpoint::app("billing")) {
            Delivery::Peers(peers) => {
                let mut ids: Vec<_> = peers.into_iter().map(|(id, _)| id).collect();
                ids.sort();
                assert_eq!(ids, vec!["b1", "b2"]);
            }
            Delivery::Unknown(_) => panic!("billing instances should resolve"),
        }

        assert!(matches!(
            hub.resolve(&Endpoint::app("search").with_app_instance_id("b1")),
            Delivery::Unknown(_)
        ));
        assert_eq!(hub.everyone_but(Some("s1")).len(), 2);
    }
}
