//! The [`Transport`] seam and an in-process broker.
//!
//! A transport delivers JSON messages between topics with MQTT-style
//! semantics: `+` matches one topic segment, `#` matches the rest, and a
//! retained message is redelivered to every later subscriber until it is
//! cleared.  The real device plugs a broker client in here; its
//! connection/reconnect machinery is out of scope.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use croftos_types::KernelError;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{trace, warn};
use uuid::Uuid;

/// Whether the broker holds the message for future subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Retain,
    NoRetain,
}

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// One published message.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub retain: Retention,
    pub qos: QoS,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Value, retain: Retention, qos: QoS) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            retain,
            qos,
        }
    }
}

/// Publish-subscribe transport with retained-message support.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish one message.  Returning `Ok` means the message was handed to
    /// the broker with the requested QoS; it cannot be retracted afterwards.
    async fn publish(&self, message: Message) -> Result<(), KernelError>;

    /// Subscribe to a topic filter.  Matching retained messages are
    /// delivered immediately, then live traffic follows.
    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<Message>, KernelError>;

    /// Drop the retained message held under `topic`, if any.
    async fn clear_retained(&self, topic: &str) -> Result<(), KernelError>;
}

/// MQTT-style filter match: `+` is one segment, a trailing `#` is the rest.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');
    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// ---------------------------------------------------------------------------
// In-process broker
// ---------------------------------------------------------------------------

const SUBSCRIPTION_BUFFER: usize = 64;

struct Subscription {
    filter: String,
    tx: mpsc::Sender<Message>,
}

struct BrokerState {
    subscriptions: Vec<Subscription>,
    retained: HashMap<String, Message>,
}

/// In-process [`Transport`] used by tests and host simulation.
pub struct MemoryTransport {
    state: Mutex<BrokerState>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState {
                subscriptions: Vec::new(),
                retained: HashMap::new(),
            }),
        }
    }

    /// The retained message currently held under `topic`, if any.
    pub fn retained(&self, topic: &str) -> Option<Message> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retained
            .get(topic)
            .cloned()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, message: Message) -> Result<(), KernelError> {
        trace!(topic = %message.topic, id = %message.id, "publish");
        let recipients: Vec<mpsc::Sender<Message>> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if message.retain == Retention::Retain {
                state
                    .retained
                    .insert(message.topic.clone(), message.clone());
            }
            state.subscriptions.retain(|s| !s.tx.is_closed());
            state
                .subscriptions
                .iter()
                .filter(|s| topic_matches(&s.filter, &message.topic))
                .map(|s| s.tx.clone())
                .collect()
        };
        for tx in recipients {
            // A full subscriber loses the message rather than blocking the
            // whole broker.
            if tx.try_send(message.clone()).is_err() {
                warn!(topic = %message.topic, "dropping message for lagging subscriber");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<Message>, KernelError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let retained: Vec<Message> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.subscriptions.push(Subscription {
                filter: filter.to_string(),
                tx: tx.clone(),
            });
            state
                .retained
                .values()
                .filter(|m| topic_matches(filter, &m.topic))
                .cloned()
                .collect()
        };
        for message in retained {
            if tx.try_send(message).is_err() {
                warn!(filter, "retained backlog exceeds subscriber buffer");
            }
        }
        Ok(rx)
    }

    async fn clear_retained(&self, topic: &str) -> Result<(), KernelError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retained
            .remove(topic);
        Ok(())
    }
}
