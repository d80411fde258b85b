//! The debounced telemetry publication loop.
//!
//! One loop publishes the whole device's telemetry document: every source
//! contributes fields, the document is published to `telemetry`, and the
//! device watchdog is kicked at the end of each successful cycle.  A
//! publish happens on the periodic interval or early, when anything calls
//! [`TelemetryPublisher::request_publish`].
//!
//! Requests made while a cycle is in flight coalesce into at most one
//! follow-up cycle, and a debounce window of [`TELEMETRY_DEBOUNCE`] after
//! each publish bounds the rate no matter how often requests arrive.

use std::sync::Arc;
use std::time::Duration;

use croftos_kernel::task;
use croftos_kernel::watchdog::Watchdog;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::root::ProtocolRoot;
use crate::transport::{QoS, Retention};

/// Minimum gap between two telemetry publications.
pub const TELEMETRY_DEBOUNCE: Duration = Duration::from_millis(500);

/// A contributor of telemetry fields.  Runs synchronously inside the
/// telemetry cycle; expensive sampling belongs in the plugin's own task,
/// with the source reading the latest cached value.
pub type TelemetrySource = Box<dyn Fn(&mut Map<String, Value>) + Send + Sync>;

/// Handle for requesting an out-of-cycle telemetry publish.
///
/// Backed by a [`Notify`], which stores at most one pending permit: any
/// number of requests between two cycles collapse into a single extra
/// publish.
#[derive(Clone, Default)]
pub struct TelemetryPublisher {
    trigger: Arc<Notify>,
}

impl TelemetryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a publish as soon as the debounce window allows.  Never
    /// blocks; concurrent requests coalesce.
    pub fn request_publish(&self) {
        self.trigger.notify_one();
    }
}

/// Start the telemetry loop.
///
/// Each cycle stamps `uptime` (milliseconds since `started_at`) and
/// `timestamp` (wall-clock epoch milliseconds), runs every source over the
/// document, publishes it, kicks `watchdog`, then waits out the remainder
/// of `publish_interval` unless a [`TelemetryPublisher`] request cuts the
/// wait short.
pub fn start_telemetry_loop(
    root: Arc<ProtocolRoot>,
    publish_interval: Duration,
    watchdog: Arc<Watchdog>,
    sources: Arc<Vec<TelemetrySource>>,
    publisher: TelemetryPublisher,
    started_at: Instant,
) -> JoinHandle<()> {
    task::spawn_loop("telemetry", move |ctx| {
        let root = Arc::clone(&root);
        let watchdog = Arc::clone(&watchdog);
        let sources = Arc::clone(&sources);
        let trigger = Arc::clone(&publisher.trigger);
        Box::pin(async move {
            ctx.mark_wake_time();

            let mut doc = Map::new();
            doc.insert(
                "uptime".to_string(),
                Value::from(started_at.elapsed().as_millis() as u64),
            );
            doc.insert(
                "timestamp".to_string(),
                Value::from(chrono::Utc::now().timestamp_millis()),
            );
            for source in sources.iter() {
                source(&mut doc);
            }

            if let Err(e) = root
                .publish(
                    "telemetry",
                    Value::Object(doc),
                    Retention::NoRetain,
                    QoS::AtLeastOnce,
                )
                .await
            {
                warn!(error = %e, "cannot publish telemetry");
            }
            watchdog.restart();

            // Debounce first, then wait for the interval or an early
            // request, whichever comes sooner.
            ctx.delay_until_elapsed(TELEMETRY_DEBOUNCE).await;
            tokio::select! {
                _ = tokio::time::sleep(ctx.time_until(publish_interval)) => {}
                _ = trigger.notified() => {}
            }
        })
    })
}
