use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde_json::json;

use voxlink_core::protocol::incoming::{EventRecord, CALLBACK_ERROR_EVENT};

/// Error type subscribers may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased subscriber.
pub type Handler = Arc<dyn Fn(EventRecord) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Returned by [`Dispatcher::subscribe`]; pass to [`Dispatcher::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn event(&self) -> &str {
        &self.event
    }
}

struct Subscriber {
    id: u64,
    handler: Handler,
}

/// Registry of named-event subscribers.
///
/// Subscribers of one event run concurrently and are polled in registration
/// order; the next event is only dispatched once every subscriber of the
/// previous one has finished.
#[derive(Default)]
pub struct Dispatcher {
    subs: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F, Fut>(&self, event: impl Into<String>, f: F) -> SubscriptionHandle
    where
        F: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |rec| f(rec).boxed());
        self.subscribe_handler(event, handler)
    }

    pub fn subscribe_handler(&self, event: impl Into<String>, handler: Handler) -> SubscriptionHandle {
        let event = event.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs
            .entry(event.clone())
            .or_default()
            .push(Subscriber { id, handler });
        tracing::debug!(event = %event, id, "subscribed");
        SubscriptionHandle { event, id }
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let Some(mut list) = self.subs.get_mut(&handle.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != handle.id);
        before != list.len()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subs.get(event).map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver `record` to every subscriber of its name.
    ///
    /// Faults never propagate: each one is reported as a `callback_error`
    /// event. Faults of `callback_error` subscribers are only logged.
    pub async fn dispatch(&self, record: EventRecord) {
        let faults = self.run(&record).await;
        if faults.is_empty() {
            return;
        }

        if record.name == CALLBACK_ERROR_EVENT {
            for fault in faults {
                tracing::error!(error = %fault, "callback_error subscriber failed");
            }
            return;
        }

        for fault in faults {
            tracing::error!(event = %record.name, error = %fault, "subscriber failed");
            let report = EventRecord::new(
                CALLBACK_ERROR_EVENT,
                json!({ "event": record.name, "error": fault }),
            );
            for nested in self.run(&report).await {
                tracing::error!(error = %nested, "callback_error subscriber failed");
            }
        }
    }

    /// Run all subscribers of one event and collect their faults.
    async fn run(&self, record: &EventRecord) -> Vec<String> {
        // Clone the handlers out so no map guard is held across an await.
        let handlers: Vec<Handler> = match self.subs.get(&record.name) {
            Some(list) => list.iter().map(|s| s.handler.clone()).collect(),
            None => return Vec::new(),
        };

        let calls = handlers.into_iter().map(|h| {
            let rec = record.clone();
            AssertUnwindSafe(async move { h(rec).await }).catch_unwind()
        });

        join_all(calls)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
