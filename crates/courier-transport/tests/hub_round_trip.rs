//! Two brokers talking through the in-process hub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use courier_core::{DispatchError, Endpoint, Envelope, Message, RouterResult};
use courier_framework::{
    Broker, BrokerConfig, HandlerRegistry, MessageProcessor, MessageRouter, RouterRegistration,
    RouterTable, handler_fn,
};
use courier_transport::{HubConnection, InProcessHub, InProcessRouter};

#[derive(Debug, Message)]
struct Add {
    a: i64,
    b: i64,
}

fn spawn_pump(mut connection: HubConnection, broker: Broker) {
    tokio::spawn(async move {
        while let Some(envelope) = connection.recv().await {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive(envelope).await });
        }
    });
}

fn broker_on(hub: &InProcessHub, instance: &str, processor: Option<MessageProcessor>) -> Broker {
    let endpoint = Endpoint::app("calc").with_app_instance_id(instance);
    let table = RouterTable::new(vec![
        InProcessRouter::new(hub.clone()).registration().unwrap(),
    ]);
    let mut builder = Broker::builder()
        .routers(table)
        .config(BrokerConfig::default().with_endpoint(endpoint.clone()));
    if let Some(processor) = processor {
        builder = builder.processor(Arc::new(processor));
    }
    let broker = builder.build();

    spawn_pump(hub.attach(&endpoint).unwrap(), broker.clone());
    broker
}

fn calculator() -> MessageProcessor {
    let handlers = HandlerRegistry::new().with::<Add, _>(handler_fn(|add: Arc<Add>| async move {
        add.a
            .checked_add(add.b)
            .map(Value::from)
            .ok_or_else(|| DispatchError::handler("overflow"))
    }));
    MessageProcessor::new(Arc::new(handlers))
}

#[tokio::test]
async fn test_request_reply_over_hub() {
    let hub = InProcessHub::new();
    let client = broker_on(&hub, "client", None);
    let _server = broker_on(&hub, "server", Some(calculator()));

    let value = assert_ok!(
        client
            .send_and_receive(
                Envelope::new(Add { a: 40, b: 2 }).to(Endpoint::instance("server")),
                &CancellationToken::new(),
            )
            .await
    );

    assert_eq!(value, Value::from(42));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_remote_fault_over_hub() {
    let hub = InProcessHub::new();
    let client = broker_on(&hub, "client", None);
    let _server = broker_on(&hub, "server", Some(calculator()));

    let err = client
        .send_and_receive(
            Envelope::new(Add { a: i64::MAX, b: 1 }).to(Endpoint::instance("server")),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Handler(reason) if reason == "overflow"));
}

#[tokio::test]
async fn test_unknown_instance_is_a_routing_error() {
    let hub = InProcessHub::new();
    let client = broker_on(&hub, "client", None);

    let err = client
        .send_and_receive(
            Envelope::new(Add { a: 1, b: 1 }).to(Endpoint::instance("ghost")),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(err.is_routing());
    assert_eq!(client.pending_count(), 0);
}

/// Fallback that accepts everything and records the recipients it was offered.
#[derive(Default)]
struct CatchAll {
    offered: Mutex<Vec<Vec<Endpoint>>>,
}

#[async_trait]
impl MessageRouter for CatchAll {
    fn name(&self) -> &str {
        "catch-all"
    }

    async fn try_send(&self, envelope: &Envelope) -> RouterResult<()> {
        self.offered.lock().push(envelope.recipients.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_hub_keeps_reachable_recipients_from_fallback() {
    let hub = InProcessHub::new();
    let mut w1 = hub.attach(&Endpoint::instance("w1")).unwrap();
    let catch_all = Arc::new(CatchAll::default());
    let table = RouterTable::new(vec![
        InProcessRouter::new(hub.clone()).registration().unwrap(),
        RouterRegistration::from_arc(catch_all.clone(), ".*")
            .unwrap()
            .fallback(),
    ]);

    let envelope = Envelope::new(Add { a: 1, b: 2 })
        .to(Endpoint::instance("w1"))
        .to(Endpoint::instance("w9"));
    assert_ok!(table.dispatch(&envelope).await);

    let delivered = tokio::time::timeout(Duration::from_secs(1), w1.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.id, envelope.id);
    assert_eq!(delivered.recipients, vec![Endpoint::instance("w1")]);
    assert_eq!(*catch_all.offered.lock(), vec![vec![Endpoint::instance("w9")]]);
}
