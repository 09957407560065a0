use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use polybus::broker::{BrokerTransportFactory, InMemoryBroker};
use polybus::builder::Builder;
use polybus::error::Result;
use polybus::message_info::{MessageInfo, MessageKind};
use polybus::pipeline::{Handler, Next};
use polybus::transaction::Transaction;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Reading;

fn producer_info() -> MessageInfo {
    MessageInfo::new(MessageKind::Event, "sensor", "reading", 2, 1, 3)
}

fn consumer_info() -> MessageInfo {
    MessageInfo::new(MessageKind::Event, "sensor", "reading", 2, 5, 9)
}

struct Recorder(mpsc::UnboundedSender<()>);

#[async_trait]
impl Handler for Recorder {
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()> {
        if transaction.as_incoming_mut().is_ok() {
            let _ = self.0.send(());
        }
        next.call(transaction).await
    }
}

#[tokio::test]
async fn consumer_on_a_newer_compatible_minor_still_receives_the_message() {
    let broker = InMemoryBroker::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let producer = Builder::new()
        .name("sensor")
        .register::<Reading>(producer_info())
        .expect("register producer")
        .transport_factory(Arc::new(BrokerTransportFactory::new(Arc::clone(&broker), "sensor")))
        .build()
        .await
        .expect("build producer");

    let consumer = Builder::new()
        .name("dashboard")
        .register::<Reading>(consumer_info())
        .expect("register consumer")
        .incoming_handler(Arc::new(Recorder(tx)))
        .transport_factory(Arc::new(BrokerTransportFactory::new(Arc::clone(&broker), "dashboard")))
        .build()
        .await
        .expect("build consumer");

    broker.subscribe("dashboard", &consumer_info());

    producer.start().await.expect("start producer");
    consumer.start().await.expect("start consumer");

    let mut transaction = producer.create_outgoing_transaction();
    transaction.base_mut().add(Reading, None).expect("add");
    transaction.commit().await.expect("commit");

    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("consumer should receive despite the minor-version mismatch")
        .expect("channel open");
}
