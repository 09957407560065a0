use std::sync::Arc;

use async_trait::async_trait;
use polybus::broker::{BrokerTransportFactory, InMemoryBroker};
use polybus::builder::Builder;
use polybus::error::Result;
use polybus::headers;
use polybus::message_info::{MessageInfo, MessageKind};
use polybus::pipeline::{Handler, Next};
use polybus::transaction::Transaction;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

struct Ping;

fn ping_info() -> MessageInfo {
    MessageInfo::new(MessageKind::Event, "origin", "ping", 1, 0, 0)
}

struct Recorder(mpsc::UnboundedSender<Option<String>>);

#[async_trait]
impl Handler for Recorder {
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()> {
        if let Ok(incoming) = transaction.as_incoming_mut() {
            let type_header = incoming.incoming_message.headers.get(headers::MESSAGE_TYPE).cloned();
            let _ = self.0.send(type_header);
        }
        next.call(transaction).await
    }
}

#[tokio::test]
async fn event_reaches_every_subscribed_endpoint() {
    let broker = InMemoryBroker::new();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let (tx_c, mut rx_c) = mpsc::unbounded_channel();

    let origin = Builder::new()
        .name("origin")
        .register::<Ping>(ping_info())
        .expect("register on origin")
        .transport_factory(Arc::new(BrokerTransportFactory::new(Arc::clone(&broker), "origin")))
        .build()
        .await
        .expect("build origin");

    let subscriber_b = Builder::new()
        .name("subscriber-b")
        .register::<Ping>(ping_info())
        .expect("register on b")
        .incoming_handler(Arc::new(Recorder(tx_b)))
        .transport_factory(Arc::new(BrokerTransportFactory::new(Arc::clone(&broker), "subscriber-b")))
        .build()
        .await
        .expect("build b");

    let subscriber_c = Builder::new()
        .name("subscriber-c")
        .register::<Ping>(ping_info())
        .expect("register on c")
        .incoming_handler(Arc::new(Recorder(tx_c)))
        .transport_factory(Arc::new(BrokerTransportFactory::new(Arc::clone(&broker), "subscriber-c")))
        .build()
        .await
        .expect("build c");

    broker.subscribe("subscriber-b", &ping_info());
    broker.subscribe("subscriber-c", &ping_info());

    origin.start().await.expect("start origin");
    subscriber_b.start().await.expect("start b");
    subscriber_c.start().await.expect("start c");

    let mut transaction = origin.create_outgoing_transaction();
    transaction.base_mut().add(Ping, None).expect("add ping");
    transaction.commit().await.expect("commit");

    let type_header_b = timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .expect("subscriber b should receive within 1s")
        .expect("channel open");
    let type_header_c = timeout(Duration::from_secs(1), rx_c.recv())
        .await
        .expect("subscriber c should receive within 1s")
        .expect("channel open");

    let expected = "endpoint=origin, type=event, name=ping, version=1.0.0";
    assert_eq!(type_header_b.as_deref(), Some(expected));
    assert_eq!(type_header_c.as_deref(), Some(expected));
}
