//! In-memory transport shared by the runtime's unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::transport::{EventSource, Transport, TransportError};

pub enum MockReply {
    Value(Value),
    Reject(String),
    Deferred(oneshot::Receiver<Value>),
    Hang,
}

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<(String, Value)>>,
    listen_calls: AtomicUsize,
    unlisten_calls: Arc<AtomicUsize>,
    fail_listen: AtomicBool,
    listen_yields: usize,
    event_senders: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen suspends this many times before resolving, widening the attach window.
    pub fn with_listen_yields(mut self, yields: usize) -> Self {
        self.listen_yields = yields;
        self
    }

    pub fn reply(&self, operation: &str, reply: MockReply) {
        self.replies
            .lock()
            .expect("replies")
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn reply_value(&self, operation: &str, value: Value) {
        self.reply(operation, MockReply::Value(value));
    }

    pub fn reject(&self, operation: &str, message: &str) {
        self.reply(operation, MockReply::Reject(message.to_string()));
    }

    pub fn set_fail_listen(&self, fail: bool) {
        self.fail_listen.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn listen_calls(&self) -> usize {
        self.listen_calls.load(Ordering::SeqCst)
    }

    pub fn unlisten_calls(&self) -> usize {
        self.unlisten_calls.load(Ordering::SeqCst)
    }

    /// Pushes a raw payload to every live listener; returns how many received it.
    pub fn push_event(&self, value: Value) -> usize {
        let mut senders = self.event_senders.lock().expect("senders");
        senders.retain(|tx| !tx.is_closed());
        senders
            .iter()
            .filter(|tx| tx.send(value.clone()).is_ok())
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, operation: &str, payload: Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .expect("calls")
            .push((operation.to_string(), payload));
        let reply = self
            .replies
            .lock()
            .expect("replies")
            .get_mut(operation)
            .and_then(VecDeque::pop_front);

        match reply {
            None => Ok(Value::Null),
            Some(MockReply::Value(value)) => Ok(value),
            Some(MockReply::Reject(message)) => Err(TransportError::Connect {
                channel: operation.to_string(),
                reason: message,
            }),
            Some(MockReply::Deferred(rx)) => rx.await.map_err(|_| TransportError::Status {
                status: 503,
                body: "deferred reply dropped".to_string(),
            }),
            Some(MockReply::Hang) => std::future::pending().await,
        }
    }

    async fn listen(&self, channel: &str) -> Result<EventSource, TransportError> {
        self.listen_calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.listen_yields {
            tokio::task::yield_now().await;
        }
        if self.fail_listen.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                channel: channel.to_string(),
                reason: "listener refused".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.event_senders.lock().expect("senders").push(tx);
        let unlisten_calls = Arc::clone(&self.unlisten_calls);
        Ok(
            EventSource::new(UnboundedReceiverStream::new(rx).boxed()).with_unlisten(move || {
                unlisten_calls.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }
}
