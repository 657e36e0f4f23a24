//! Output Dispatcher: converts inference results into topic-tagged
//! events and fans them out to listeners plus actuators. Holds its
//! listener lists behind atomics/locks and reports a stats snapshot, but
//! unlike a broadcast channel it calls listeners directly so it can
//! guarantee delivery ordering and isolate a failing listener from the
//! rest.

use crate::actuators::Actuator;
use crate::model::{InferenceResult, OutputEvent};
use futures_util::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("listener failed: {0}")]
    Listener(String),
}

type SyncListenerFn = dyn Fn(&OutputEvent) -> Result<(), DispatchError> + Send + Sync;
type AsyncListenerFn =
    dyn Fn(&OutputEvent) -> BoxFuture<'static, Result<(), DispatchError>> + Send + Sync;

enum Listener {
    Sync(Arc<SyncListenerFn>),
    Async(Arc<AsyncListenerFn>),
}

struct Registration {
    id: u64,
    listener: Listener,
}

/// Handle returned by `subscribe`; dropping it does nothing, calling
/// `unsubscribe()` on the dispatcher with it is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DispatchStats {
    pub events_dispatched: u64,
    pub listener_errors: u64,
}

struct DispatcherState {
    topic_listeners: HashMap<String, Vec<Registration>>,
    global_listeners: Vec<Registration>,
    actuators: Vec<Arc<dyn Actuator>>,
}

pub struct OutputDispatcher {
    state: Mutex<DispatcherState>,
    next_id: AtomicU64,
    events_dispatched: AtomicU64,
    listener_errors: AtomicU64,
}

impl OutputDispatcher {
    pub fn new() -> Self {
        OutputDispatcher {
            state: Mutex::new(DispatcherState {
                topic_listeners: HashMap::new(),
                global_listeners: Vec::new(),
                actuators: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            events_dispatched: AtomicU64::new(0),
            listener_errors: AtomicU64::new(0),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe_topic_sync<F>(&self, topic: &str, listener: F) -> SubscriptionHandle
    where
        F: Fn(&OutputEvent) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        let id = self.alloc_id();
        self.state
            .lock()
            .topic_listeners
            .entry(topic.to_string())
            .or_default()
            .push(Registration {
                id,
                listener: Listener::Sync(Arc::new(listener)),
            });
        SubscriptionHandle(id)
    }

    pub fn subscribe_topic_async<F>(&self, topic: &str, listener: F) -> SubscriptionHandle
    where
        F: Fn(&OutputEvent) -> BoxFuture<'static, Result<(), DispatchError>> + Send + Sync + 'static,
    {
        let id = self.alloc_id();
        self.state
            .lock()
            .topic_listeners
            .entry(topic.to_string())
            .or_default()
            .push(Registration {
                id,
                listener: Listener::Async(Arc::new(listener)),
            });
        SubscriptionHandle(id)
    }

    pub fn subscribe_global_sync<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&OutputEvent) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        let id = self.alloc_id();
        self.state.lock().global_listeners.push(Registration {
            id,
            listener: Listener::Sync(Arc::new(listener)),
        });
        SubscriptionHandle(id)
    }

    pub fn subscribe_global_async<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&OutputEvent) -> BoxFuture<'static, Result<(), DispatchError>> + Send + Sync + 'static,
    {
        let id = self.alloc_id();
        self.state.lock().global_listeners.push(Registration {
            id,
            listener: Listener::Async(Arc::new(listener)),
        });
        SubscriptionHandle(id)
    }

    /// Idempotent: unsubscribing an id more than once (or one that never
    /// existed) is a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut state = self.state.lock();
        for listeners in state.topic_listeners.values_mut() {
            listeners.retain(|r| r.id != handle.0);
        }
        state.global_listeners.retain(|r| r.id != handle.0);
    }

    pub fn register_actuator(&self, actuator: Arc<dyn Actuator>) {
        self.state.lock().actuators.push(actuator);
    }

    /// Builds the topic-tagged event for an inference result. Pure
    /// function so it can be unit-tested without a running dispatcher.
    pub fn build_event(project: &str, result: &InferenceResult, timestamp_ms: u64) -> OutputEvent {
        let mut data = serde_json::json!({
            "gesture_type": result.gesture,
            "confidence": result.confidence,
        });
        if let serde_json::Value::Object(ref mut map) = data {
            if let Some(count) = result.finger_count {
                map.insert("finger_count".to_string(), serde_json::json!(count));
            }
            if let Some(distance) = result.pinch_distance {
                map.insert("pinch_distance".to_string(), serde_json::json!(distance));
            }
            if let Some((x, y)) = result.cursor_target {
                map.insert("cursor_x".to_string(), serde_json::json!(x));
                map.insert("cursor_y".to_string(), serde_json::json!(y));
            }
            for (k, v) in &result.aux {
                map.insert(k.clone(), v.clone());
            }
        }
        OutputEvent {
            event_type: "gesture_data".to_string(),
            project: project.to_string(),
            timestamp_ms,
            data,
        }
    }

    /// Dispatches in the documented order: topic sync, topic async
    /// (awaited as a group), global sync, global async (awaited as a
    /// group). A failing listener never prevents others from running;
    /// actuators run after listeners.
    pub async fn dispatch(&self, event: &OutputEvent, inference: &InferenceResult) {
        let (topic_sync, topic_async, global_sync, global_async, actuators) = {
            let state = self.state.lock();
            let topic = state.topic_listeners.get(&event.project);
            let (t_sync, t_async) = split_listeners(topic);
            let (g_sync, g_async) = split_listeners(Some(&state.global_listeners));
            (t_sync, t_async, g_sync, g_async, state.actuators.clone())
        };

        self.run_sync_group(&topic_sync, event);
        self.run_async_group(&topic_async, event).await;
        self.run_sync_group(&global_sync, event);
        self.run_async_group(&global_async, event).await;

        for actuator in &actuators {
            if let Err(err) = actuator.act(inference) {
                warn!(actuator = actuator.name(), error = %err, "actuator failed");
            }
        }

        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn run_sync_group(&self, listeners: &[Arc<SyncListenerFn>], event: &OutputEvent) {
        for listener in listeners {
            if let Err(err) = listener(event) {
                self.listener_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "sync listener failed");
            }
        }
    }

    async fn run_async_group(&self, listeners: &[Arc<AsyncListenerFn>], event: &OutputEvent) {
        let futures: Vec<_> = listeners.iter().map(|listener| listener(event)).collect();
        for result in join_all(futures).await {
            if let Err(err) = result {
                self.listener_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "async listener failed");
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            listener_errors: self.listener_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for OutputDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn split_listeners(
    registrations: Option<&Vec<Registration>>,
) -> (Vec<Arc<SyncListenerFn>>, Vec<Arc<AsyncListenerFn>>) {
    let mut sync = Vec::new();
    let mut async_ = Vec::new();
    if let Some(regs) = registrations {
        for reg in regs {
            match &reg.listener {
                Listener::Sync(f) => sync.push(f.clone()),
                Listener::Async(f) => async_.push(f.clone()),
            }
        }
    }
    (sync, async_)
}
