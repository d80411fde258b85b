//! Named one-shot and looping tasks.
//!
//! [`run`] spawns a one-shot task; [`spawn_loop`] re-invokes its body
//! indefinitely.  Each body receives a [`TaskContext`] for cooperative delay
//! and fixed-cadence interval bookkeeping.  Suspension happens only at
//! explicit `.await` points; a panicking body terminates only its own task
//! and nothing restarts it.
//!
//! # Drift-free cadence
//!
//! Periodic loops call [`TaskContext::mark_wake_time`] at the top of every
//! cycle.  The next deadline is computed from that stored instant, not from
//! "now", so the time spent doing work inside the cycle does not push the
//! cadence later:
//!
//! ```
//! use std::time::Duration;
//! use croftos_kernel::task;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! task::spawn_loop("sampler", |ctx| {
//!     Box::pin(async move {
//!         ctx.mark_wake_time();
//!         // ... do the periodic work ...
//!         ctx.delay_until_elapsed(Duration::from_secs(5)).await;
//!     })
//! });
//! # });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, info_span};

/// Per-invocation handle passed to task bodies.
pub struct TaskContext {
    name: String,
    last_wake: Instant,
}

impl TaskContext {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_wake: Instant::now(),
        }
    }

    /// The name this task was spawned under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cooperative sleep; other tasks run while this one is parked.
    pub async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Record "now" as the reference point for cadence computation.
    /// Call this at the top of each periodic cycle.
    pub fn mark_wake_time(&mut self) {
        self.last_wake = Instant::now();
    }

    /// Time remaining until `interval` has elapsed since the last
    /// [`mark_wake_time`][Self::mark_wake_time].  Zero if the deadline has
    /// already passed.
    pub fn time_until(&self, interval: Duration) -> Duration {
        (self.last_wake + interval).saturating_duration_since(Instant::now())
    }

    /// Sleep until `interval` has elapsed since the last
    /// [`mark_wake_time`][Self::mark_wake_time], regardless of how long the
    /// work so far has taken.  Returns immediately if it already has.
    pub async fn delay_until_elapsed(&self, interval: Duration) {
        tokio::time::sleep_until(self.last_wake + interval).await;
    }
}

/// Spawn a one-shot named task.
pub fn run<F, Fut>(name: &str, body: F) -> JoinHandle<()>
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let span = info_span!("task", name = %name);
    let ctx = TaskContext::new(name);
    tokio::spawn(async move { body(ctx).await }.instrument(span))
}

/// Spawn a task whose body is re-invoked indefinitely.  The loop only ends
/// when the returned handle is aborted or the runtime shuts down.
pub fn spawn_loop<F>(name: &str, mut body: F) -> JoinHandle<()>
where
    F: for<'a> FnMut(&'a mut TaskContext) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>
        + Send
        + 'static,
{
    let span = info_span!("task", name = %name);
    let mut ctx = TaskContext::new(name);
    tokio::spawn(
        async move {
            loop {
                body(&mut ctx).await;
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn cadence_compensates_for_work_duration() {
        let mut ctx = TaskContext::new("cadence");
        ctx.mark_wake_time();

        // Simulate 300 ms of work.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let remaining = ctx.time_until(Duration::from_secs(1));
        assert_eq!(remaining, Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn time_until_is_zero_once_deadline_passed() {
        let mut ctx = TaskContext::new("cadence");
        ctx.mark_wake_time();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ctx.time_until(Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_until_elapsed_lands_on_the_deadline() {
        let mut ctx = TaskContext::new("cadence");
        ctx.mark_wake_time();
        let start = Instant::now();

        tokio::time::sleep(Duration::from_millis(400)).await;
        ctx.delay_until_elapsed(Duration::from_secs(1)).await;

        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn one_shot_task_runs_to_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = run("one-shot", move |_ctx| async move {
            tx.send(42).ok();
        });
        assert_eq!(rx.recv().await, Some(42));
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_body_is_reinvoked() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_loop("ticker", move |ctx| {
            let tx = tx.clone();
            Box::pin(async move {
                tx.send(()).ok();
                ctx.delay(Duration::from_millis(10)).await;
            })
        });

        for _ in 0..3 {
            timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("loop must keep ticking")
                .unwrap();
        }
        handle.abort();
    }

    #[tokio::test]
    async fn panicking_body_terminates_only_its_own_task() {
        let panicking = run("doomed", |_ctx| async {
            panic!("boom");
        });
        let err = panicking.await.unwrap_err();
        assert!(err.is_panic());

        // Other tasks are unaffected.
        let survivor = run("survivor", |_ctx| async {});
        survivor.await.unwrap();
    }
}
