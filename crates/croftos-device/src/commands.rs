//! The built-in device commands.
//!
//! Registered on the protocol root during boot, next to whatever commands
//! the plugins add.  Handlers fill in the response document; exit commands
//! (`restart`, `sleep`) defer the actual exit so the response gets out
//! first, and run the shutdown listeners on the way down.
//!
//! | Command | Request | Response |
//! |---|---|---|
//! | `restart` | — | `{ restarting: true }` |
//! | `sleep` | `{ duration }` (seconds) | `{ sleeping: true, duration }` |
//! | `update` | `{ url }` | `{ message }` or `{ failure }` |
//! | `nvs/list` | — | `{ entries: [{ key }] }` |
//! | `nvs/read` | `{ key }` | `{ key, value }` or `{ error }` |
//! | `nvs/write` | `{ key, value }` | `{ key, written: true }` or `{ error }` |
//! | `nvs/remove` | `{ key }` | `{ key, removed: true }` or `{ error }` |
//! | `ping` | — | `{ pong: <uptime millis> }`, plus a telemetry publish |

use std::sync::Arc;
use std::time::Duration;

use croftos_config::KvStore;
use croftos_plugins::ShutdownManager;
use croftos_protocol::{ProtocolRoot, TelemetryPublisher};
use croftos_types::KernelError;
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::info;

use crate::platform::Platform;

/// Grace period between answering an exit command and performing the exit.
const EXIT_DELAY: Duration = Duration::from_secs(1);

/// Firmware update hand-off.  Download and apply mechanics live behind
/// this; the command only validates and forwards the URL.
pub trait UpdateRequester: Send + Sync {
    fn request_update(&self, url: &str) -> Result<(), KernelError>;
}

/// Everything the built-in command handlers need.
pub struct CommandServices {
    pub platform: Arc<dyn Platform>,
    pub kv: Arc<dyn KvStore>,
    pub shutdown: Arc<ShutdownManager>,
    pub telemetry: TelemetryPublisher,
    pub updater: Arc<dyn UpdateRequester>,
    pub started_at: Instant,
}

/// Register every built-in command on `root`.
pub fn register_builtin_commands(root: &ProtocolRoot, services: Arc<CommandServices>) {
    {
        let services = Arc::clone(&services);
        root.register_command("restart", move |_request, response| {
            info!("restart requested");
            response.insert("restarting".to_string(), Value::Bool(true));
            exit_after_response(Arc::clone(&services), None);
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("sleep", move |request, response| {
            let Some(seconds) = request["duration"].as_u64() else {
                response.insert(
                    "error".to_string(),
                    Value::String("Command contains no duration".to_string()),
                );
                return;
            };
            let duration = Duration::from_secs(seconds);
            info!(?duration, "deep sleep requested");
            response.insert("sleeping".to_string(), Value::Bool(true));
            response.insert("duration".to_string(), Value::from(seconds));
            exit_after_response(Arc::clone(&services), Some(duration));
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("update", move |request, response| {
            let field = match request["url"].as_str() {
                None => Some("Command contains no URL"),
                Some("") => Some("Command contains empty url"),
                Some(_) => None,
            };
            if let Some(failure) = field {
                response.insert("failure".to_string(), Value::String(failure.to_string()));
                return;
            }
            // Checked non-empty above.
            let url = request["url"].as_str().unwrap_or_default();
            match services.updater.request_update(url) {
                Ok(()) => {
                    response.insert(
                        "message".to_string(),
                        Value::String("Update requested".to_string()),
                    );
                }
                Err(e) => {
                    response.insert("failure".to_string(), Value::String(e.to_string()));
                }
            }
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("nvs/list", move |_request, response| {
            match services.kv.keys() {
                Ok(keys) => {
                    let entries: Vec<Value> = keys.iter().map(|k| json!({"key": k})).collect();
                    response.insert("entries".to_string(), Value::Array(entries));
                }
                Err(e) => {
                    response.insert("error".to_string(), Value::String(e.to_string()));
                }
            }
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("nvs/read", move |request, response| {
            with_key(request, response, |key, response| {
                match services.kv.get_json(key) {
                    Ok(Some(value)) => {
                        response.insert("value".to_string(), value);
                    }
                    Ok(None) => {
                        response.insert(
                            "error".to_string(),
                            Value::String("Key not found".to_string()),
                        );
                    }
                    Err(e) => {
                        response.insert("error".to_string(), Value::String(e.to_string()));
                    }
                }
            });
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("nvs/write", move |request, response| {
            with_key(request, response, |key, response| {
                match services.kv.set_json(key, &request["value"]) {
                    Ok(()) => {
                        response.insert("written".to_string(), Value::Bool(true));
                    }
                    Err(e) => {
                        response.insert("error".to_string(), Value::String(e.to_string()));
                    }
                }
            });
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("nvs/remove", move |request, response| {
            with_key(request, response, |key, response| {
                match services.kv.remove(key) {
                    Ok(true) => {
                        response.insert("removed".to_string(), Value::Bool(true));
                    }
                    Ok(false) => {
                        response.insert(
                            "error".to_string(),
                            Value::String("Key not found".to_string()),
                        );
                    }
                    Err(e) => {
                        response.insert("error".to_string(), Value::String(e.to_string()));
                    }
                }
            });
        });
    }
    {
        let services = Arc::clone(&services);
        root.register_command("ping", move |_request, response| {
            services.telemetry.request_publish();
            response.insert(
                "pong".to_string(),
                Value::from(services.started_at.elapsed().as_millis() as u64),
            );
        });
    }
}

/// Run `body` with the request's `key`, or answer with an error.  The key
/// is echoed into every response.
fn with_key(
    request: &Value,
    response: &mut Map<String, Value>,
    body: impl FnOnce(&str, &mut Map<String, Value>),
) {
    match request["key"].as_str() {
        Some(key) if !key.is_empty() => {
            response.insert("key".to_string(), Value::String(key.to_string()));
            body(key, response);
        }
        _ => {
            response.insert(
                "error".to_string(),
                Value::String("Command contains no key".to_string()),
            );
        }
    }
}

fn exit_after_response(services: Arc<CommandServices>, sleep: Option<Duration>) {
    tokio::spawn(async move {
        tokio::time::sleep(EXIT_DELAY).await;
        services.shutdown.shutdown();
        match sleep {
            Some(duration) => services.platform.deep_sleep(duration),
            None => services.platform.restart(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ExitRequest, HostPlatform};
    use croftos_config::MemoryKvStore;
    use std::sync::Mutex;

    struct RecordingUpdater {
        urls: Mutex<Vec<String>>,
    }

    impl UpdateRequester for RecordingUpdater {
        fn request_update(&self, url: &str) -> Result<(), KernelError> {
            self.urls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(url.to_string());
            Ok(())
        }
    }

    struct Fixture {
        transport: Arc<MemoryTransport>,
        root: Arc<ProtocolRoot>,
        platform: Arc<HostPlatform>,
        kv: Arc<MemoryKvStore>,
        shutdown: Arc<ShutdownManager>,
        updater: Arc<RecordingUpdater>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MemoryTransport::new());
        let root = Arc::new(ProtocolRoot::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            "devices/croftling/t",
        ));
        let platform = Arc::new(HostPlatform::default());
        let kv = Arc::new(MemoryKvStore::new());
        let shutdown = Arc::new(ShutdownManager::new());
        let updater = Arc::new(RecordingUpdater {
            urls: Mutex::new(Vec::new()),
        });
        register_builtin_commands(
            &root,
            Arc::new(CommandServices {
                platform: Arc::clone(&platform) as Arc<dyn Platform>,
                kv: Arc::clone(&kv) as Arc<dyn KvStore>,
                shutdown: Arc::clone(&shutdown),
                telemetry: TelemetryPublisher::new(),
                updater: Arc::clone(&updater) as Arc<dyn UpdateRequester>,
                started_at: Instant::now(),
            }),
        );
        Fixture {
            transport,
            root,
            platform,
            kv,
            shutdown,
            updater,
        }
    }

    #[tokio::test]
    async fn nvs_write_read_remove_cycle() {
        let f = fixture();
        let mut rx = transport_subscribe(&f, "devices/croftling/t/responses/#").await;

        send(&f, "nvs/write", json!({"key": "device-config", "value": {"model": "mk1"}})).await;
        let written = recv(&mut rx).await;
        assert_eq!(written.payload["written"], true);
        assert_eq!(written.payload["key"], "device-config");

        send(&f, "nvs/read", json!({"key": "device-config"})).await;
        let read = recv(&mut rx).await;
        assert_eq!(read.payload["value"]["model"], "mk1");

        send(&f, "nvs/list", json!({})).await;
        let list = recv(&mut rx).await;
        assert_eq!(list.payload["entries"], json!([{"key": "device-config"}]));

        send(&f, "nvs/remove", json!({"key": "device-config"})).await;
        let removed = recv(&mut rx).await;
        assert_eq!(removed.payload["removed"], true);
        assert!(f.kv.get_json("device-config").unwrap().is_none());
    }

    #[tokio::test]
    async fn nvs_read_of_missing_key_reports_not_found() {
        let f = fixture();
        let mut rx = transport_subscribe(&f, "devices/croftling/t/responses/#").await;

        send(&f, "nvs/read", json!({"key": "missing"})).await;
        assert_eq!(recv(&mut rx).await.payload["error"], "Key not found");

        send(&f, "nvs/remove", json!({"key": "missing"})).await;
        assert_eq!(recv(&mut rx).await.payload["error"], "Key not found");

        send(&f, "nvs/read", json!({})).await;
        assert_eq!(
            recv(&mut rx).await.payload["error"],
            "Command contains no key"
        );
    }

    #[tokio::test]
    async fn update_validates_the_url() {
        let f = fixture();
        let mut rx = transport_subscribe(&f, "devices/croftling/t/responses/#").await;

        send(&f, "update", json!({})).await;
        assert_eq!(
            recv(&mut rx).await.payload["failure"],
            "Command contains no URL"
        );

        send(&f, "update", json!({"url": ""})).await;
        assert_eq!(
            recv(&mut rx).await.payload["failure"],
            "Command contains empty url"
        );

        send(&f, "update", json!({"url": "https://example.com/fw.bin"})).await;
        assert_eq!(recv(&mut rx).await.payload["message"], "Update requested");
        assert_eq!(
            *f.updater.urls.lock().unwrap(),
            vec!["https://example.com/fw.bin".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_answers_then_shuts_down_and_restarts() {
        let f = fixture();
        let mut rx = transport_subscribe(&f, "devices/croftling/t/responses/#").await;

        send(&f, "restart", Value::Null).await;
        assert_eq!(recv(&mut rx).await.payload["restarting"], true);
        // The exit is deferred past the response.
        assert!(f.platform.exit_requests().is_empty());

        tokio::time::sleep(EXIT_DELAY + Duration::from_millis(100)).await;
        assert!(f.shutdown.is_shut_down());
        assert_eq!(f.platform.exit_requests(), vec![ExitRequest::Restart]);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_requires_a_duration_and_deep_sleeps() {
        let f = fixture();
        let mut rx = transport_subscribe(&f, "devices/croftling/t/responses/#").await;

        send(&f, "sleep", json!({})).await;
        assert_eq!(
            recv(&mut rx).await.payload["error"],
            "Command contains no duration"
        );

        send(&f, "sleep", json!({"duration": 3600})).await;
        assert_eq!(recv(&mut rx).await.payload["sleeping"], true);

        tokio::time::sleep(EXIT_DELAY + Duration::from_millis(100)).await;
        assert_eq!(
            f.platform.exit_requests(),
            vec![ExitRequest::DeepSleep(Duration::from_secs(3600))]
        );
    }

    #[tokio::test]
    async fn ping_answers_with_uptime() {
        let f = fixture();
        let mut rx = transport_subscribe(&f, "devices/croftling/t/responses/#").await;

        send(&f, "ping", Value::Null).await;
        let pong = recv(&mut rx).await;
        assert!(pong.payload["pong"].is_u64());
    }

    // -- helpers ---------------------------------------------------------

    use croftos_protocol::{MemoryTransport, Message, QoS, Retention, Transport};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn transport_subscribe(f: &Fixture, filter: &str) -> mpsc::Receiver<Message> {
        let _dispatch = f.root.start_dispatch().await.unwrap();
        f.transport.subscribe(filter).await.unwrap()
    }

    async fn send(f: &Fixture, command: &str, payload: Value) {
        f.transport
            .publish(Message::new(
                format!("devices/croftling/t/commands/{command}"),
                payload,
                Retention::NoRetain,
                QoS::AtLeastOnce,
            ))
            .await
            .unwrap();
    }

    async fn recv(rx: &mut mpsc::Receiver<Message>) -> Message {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("response expected")
            .unwrap()
    }
}
