use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use polybus::broker::InMemoryBroker;
use polybus::bus::Bus;
use polybus::error::{PolyBusError, Result};
use polybus::handlers::retry::RetryHandler;
use polybus::message_info::{MessageInfo, MessageKind};
use polybus::pipeline::{Handler, Next};
use polybus::registry::MessageRegistry;
use polybus::transaction::Transaction;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Job;

fn job_info() -> MessageInfo {
    MessageInfo::new(MessageKind::Command, "worker", "job", 1, 0, 0)
}

struct AlwaysFails;

#[async_trait]
impl Handler for AlwaysFails {
    async fn call(&self, _transaction: &mut Transaction, _next: Next<'_>) -> Result<()> {
        Err(PolyBusError::Other(Box::new(std::io::Error::other("processing failed"))))
    }
}

struct Recorder(mpsc::UnboundedSender<Vec<u8>>);

#[async_trait]
impl Handler for Recorder {
    async fn call(&self, transaction: &mut Transaction, next: Next<'_>) -> Result<()> {
        if let Ok(incoming) = transaction.as_incoming_mut() {
            let _ = self.0.send(incoming.incoming_message.body.clone());
        }
        next.call(transaction).await
    }
}

#[tokio::test]
async fn exhausted_retries_route_to_the_transports_dead_letter_endpoint() {
    let broker = InMemoryBroker::new();

    let worker_registry = MessageRegistry::new();
    worker_registry.register::<Job>(job_info()).expect("register on worker");
    let worker = Bus::new(
        "worker".to_owned(),
        worker_registry,
        vec![
            Arc::new(RetryHandler::new(0, Duration::from_millis(1), 0, Duration::from_millis(1))),
            Arc::new(AlwaysFails),
        ],
        Vec::new(),
    );
    let worker_endpoint = broker.add_endpoint(Arc::downgrade(&worker), "worker");
    worker_endpoint.set_dead_letter_endpoint("dlq");
    worker.set_transport(worker_endpoint).expect("attach worker transport");
    worker.start().await.expect("start worker");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let dlq_registry = MessageRegistry::new();
    dlq_registry.register::<Job>(job_info()).expect("register on dlq");
    let dlq = Bus::new("dlq".to_owned(), dlq_registry, vec![Arc::new(Recorder(tx))], Vec::new());
    let dlq_endpoint = broker.add_endpoint(Arc::downgrade(&dlq), "dlq");
    dlq.set_transport(dlq_endpoint).expect("attach dlq transport");
    dlq.start().await.expect("start dlq");

    let mut transaction = worker
        .create_incoming_transaction(b"do the work".to_vec(), job_info())
        .expect("create incoming transaction");
    worker
        .send(&mut transaction)
        .await
        .expect("retry handler swallows the exhausted-budget failure");

    let received = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("dead-letter endpoint should receive the message within 1s")
        .expect("channel open");
    assert_eq!(received, b"do the work");
}
