//! [`ProtocolRoot`] – the device's topic root and command dispatch.
//!
//! Every device owns one root path, `{location/}devices/<product>/<instance>`,
//! with these subtopics:
//!
//! | Subtopic | Direction | Notes |
//! |---|---|---|
//! | `commands/<name>` | inbound | retained by the publisher until consumed |
//! | `responses/<name>` | outbound | one response per delivered command |
//! | `telemetry` | outbound | periodic / on-demand |
//! | `init` | outbound | once at boot |
//! | `peripheral/<name>/…` | both | sub-root delegated to one peripheral |
//!
//! # Retained-command consumption
//!
//! The dispatch task deletes the retained inbound message *immediately upon
//! delivery*, before running the handler.  That is what lets a command
//! reach a device that was asleep when it was sent — and guarantees
//! exactly-once-per-publication, not at-least-once: once consumed, the
//! message is never redelivered.
//!
//! Handlers are synchronous and run on the protocol task; long-running work
//! must hand off to another task.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use croftos_types::KernelError;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::transport::{Message, QoS, Retention, Transport};

type CommandHandler = Box<dyn Fn(&Value, &mut Map<String, Value>) + Send + Sync>;

/// Build a device's root topic path.
pub fn device_root(location: &str, product: &str, instance: &str) -> String {
    if location.is_empty() {
        format!("devices/{product}/{instance}")
    } else {
        format!("{location}/devices/{product}/{instance}")
    }
}

/// Topic-scoped request/response dispatch and outbound publication.
pub struct ProtocolRoot {
    transport: Arc<dyn Transport>,
    root: String,
    commands: RwLock<HashMap<String, CommandHandler>>,
}

impl ProtocolRoot {
    pub fn new(transport: Arc<dyn Transport>, root: impl Into<String>) -> Self {
        Self {
            transport,
            root: root.into(),
            commands: RwLock::new(HashMap::new()),
        }
    }

    /// The root path this device publishes under.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Absolute topic for a subtopic of this device.
    pub fn topic(&self, subtopic: &str) -> String {
        format!("{}/{subtopic}", self.root)
    }

    /// A root delegated to one peripheral, under `peripheral/<name>`.  The
    /// peripheral owns its own command and response namespace there; it
    /// must start its own dispatch.
    pub fn peripheral_root(&self, name: &str) -> ProtocolRoot {
        ProtocolRoot::new(
            Arc::clone(&self.transport),
            self.topic(&format!("peripheral/{name}")),
        )
    }

    /// Register a handler for `commands/<name>`.  The handler receives the
    /// parsed request document and fills in the response document, which is
    /// published to `responses/<name>` after it returns.
    pub fn register_command<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value, &mut Map<String, Value>) + Send + Sync + 'static,
    {
        self.commands
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), Box::new(handler));
    }

    /// Publish a document under this device's root.
    pub async fn publish(
        &self,
        subtopic: &str,
        payload: Value,
        retain: Retention,
        qos: QoS,
    ) -> Result<(), KernelError> {
        self.transport
            .publish(Message::new(self.topic(subtopic), payload, retain, qos))
            .await
    }

    /// Publish, but wait at most `timeout` for the transport to confirm.
    /// On timeout the publish is *not* retracted; we stop waiting, log, and
    /// carry on — bounded boot latency beats strict confirmation.
    pub async fn publish_with_timeout(
        &self,
        subtopic: &str,
        payload: Value,
        retain: Retention,
        qos: QoS,
        timeout: Duration,
    ) -> Result<(), KernelError> {
        match tokio::time::timeout(timeout, self.publish(subtopic, payload, retain, qos)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(subtopic, ?timeout, "publish confirmation timed out, continuing");
                Ok(())
            }
        }
    }

    /// Start the command dispatch task.  Must be called once; commands may
    /// be registered before or after.  The subscription is established
    /// before this returns, so a command published right afterwards lands
    /// in the receive queue rather than being dropped.
    pub async fn start_dispatch(self: &Arc<Self>) -> Result<JoinHandle<()>, KernelError> {
        let mut rx = self.transport.subscribe(&self.topic("commands/#")).await?;
        let this = Arc::clone(self);
        Ok(croftos_kernel::task::run(
            "protocol-dispatch",
            move |_ctx| async move {
                let prefix = this.topic("commands/");
                while let Some(message) = rx.recv().await {
                    this.dispatch(&prefix, message).await;
                }
            },
        ))
    }

    async fn dispatch(&self, prefix: &str, message: Message) {
        let Some(name) = message.topic.strip_prefix(prefix).map(str::to_string) else {
            return;
        };
        // Consume the retained command before anything else so it is never
        // redelivered, even if the handler fails.
        if let Err(e) = self.transport.clear_retained(&message.topic).await {
            warn!(command = %name, error = %e, "cannot clear retained command");
        }
        debug!(command = %name, id = %message.id, "command received");

        let mut response = Map::new();
        {
            let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
            match commands.get(&name) {
                Some(handler) if message.payload.is_object() || message.payload.is_null() => {
                    handler(&message.payload, &mut response);
                }
                Some(_) => {
                    response.insert(
                        "error".to_string(),
                        Value::String("invalid request payload".to_string()),
                    );
                }
                None => {
                    warn!(command = %name, "no handler registered");
                    return;
                }
            }
        }

        let topic = format!("responses/{name}");
        if let Err(e) = self
            .publish(
                &topic,
                Value::Object(response),
                Retention::NoRetain,
                QoS::AtLeastOnce,
            )
            .await
        {
            warn!(command = %name, error = %e, "cannot publish response");
        }
    }
}
