//! One shared backend listener, reference counted across every consumer.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use futures::{stream::BoxStream, StreamExt};
use serde_json::Value;
use tokio::{
    sync::{watch, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    command::{EventCallback, Subscription},
    normalize::normalize_event,
    transport::{Transport, TransportError},
};

type SubscriberTable = Arc<RwLock<HashMap<u64, EventCallback>>>;

struct ActiveListener {
    task: JoinHandle<()>,
    unlisten: Option<Box<dyn FnOnce() + Send>>,
}

impl ActiveListener {
    fn shutdown(self) {
        self.task.abort();
        if let Some(unlisten) = self.unlisten {
            unlisten();
        }
    }
}

/// `None` while the attach is in flight, then the outcome every joiner sees.
type AttachOutcome = Option<Result<(), String>>;

#[derive(Default)]
struct ListenerState {
    ref_count: usize,
    /// Present while an attach is in flight; subscribers arriving meanwhile
    /// wait on it instead of starting their own listener.
    attaching: Option<watch::Receiver<AttachOutcome>>,
    listener: Option<ActiveListener>,
}

enum AttachStep {
    Attached,
    Start(watch::Sender<AttachOutcome>),
    Join(watch::Receiver<AttachOutcome>),
}

struct Shared {
    transport: Arc<dyn Transport>,
    channel: String,
    state: Mutex<ListenerState>,
    subscribers: SubscriberTable,
    next_id: AtomicU64,
    attach_count: AtomicUsize,
}

/// Keeps exactly one transport listener alive while at least one
/// [`SubscriptionHandle`] is outstanding.
#[derive(Clone)]
pub struct SubscriptionManager {
    shared: Arc<Shared>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn Transport>, channel: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                channel: channel.into(),
                state: Mutex::new(ListenerState::default()),
                subscribers: Arc::new(RwLock::new(HashMap::new())),
                next_id: AtomicU64::new(1),
                attach_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    /// Registers `sub` and makes sure the shared listener is attached.
    ///
    /// Callers that arrive while another attach is in flight wait for it. If
    /// the attach fails, every caller that joined it has its count rolled
    /// back and receives the error; the next `subscribe` starts a fresh attach.
    pub async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle, TransportError> {
        let on_event = match sub {
            Subscription::None => return Ok(SubscriptionHandle::inert()),
            Subscription::BackendEvents { on_event } => on_event,
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.write().await.insert(id, on_event);

        let step = {
            let mut state = self.shared.state.lock().await;
            state.ref_count += 1;
            if state.listener.is_some() {
                AttachStep::Attached
            } else if let Some(outcome) = &state.attaching {
                AttachStep::Join(outcome.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                state.attaching = Some(rx);
                AttachStep::Start(tx)
            }
        };

        // Exists before any await so that a cancelled call still releases its count.
        let handle = SubscriptionHandle {
            inner: Some(HandleInner {
                shared: Arc::clone(&self.shared),
                id,
            }),
        };

        let result = match step {
            AttachStep::Attached => Ok(()),
            AttachStep::Start(outcome) => {
                // Detached so that cancelling this call cannot strand `attaching`.
                let shared = Arc::clone(&self.shared);
                match tokio::spawn(async move { attach(&shared, outcome).await }).await {
                    Ok(result) => result,
                    Err(err) => {
                        error!(channel = %self.shared.channel, error = %err, "listener attach task failed");
                        self.shared.state.lock().await.attaching = None;
                        Err(TransportError::Connect {
                            channel: self.shared.channel.clone(),
                            reason: err.to_string(),
                        })
                    }
                }
            }
            AttachStep::Join(mut outcome) => {
                let settled = outcome
                    .wait_for(Option::is_some)
                    .await
                    .map(|settled| settled.clone());
                let joined = match settled {
                    Ok(Some(joined)) => joined,
                    Ok(None) | Err(_) => Err("attach abandoned".to_string()),
                };
                joined.map_err(|reason| TransportError::Connect {
                    channel: self.shared.channel.clone(),
                    reason,
                })
            }
        };

        match result {
            Ok(()) => Ok(handle),
            Err(err) => {
                handle.unsubscribe().await;
                Err(err)
            }
        }
    }

    pub async fn ref_count(&self) -> usize {
        self.shared.state.lock().await.ref_count
    }

    pub async fn is_attached(&self) -> bool {
        self.shared.state.lock().await.listener.is_some()
    }

    /// How many times a listener has been attached over this manager's life.
    pub fn attach_count(&self) -> usize {
        self.shared.attach_count.load(Ordering::Relaxed)
    }
}

async fn attach(
    shared: &Arc<Shared>,
    outcome: watch::Sender<AttachOutcome>,
) -> Result<(), TransportError> {
    let result = shared.transport.listen(&shared.channel).await;

    let mut state = shared.state.lock().await;
    state.attaching = None;

    let source = match result {
        Ok(source) => source,
        Err(err) => {
            warn!(channel = %shared.channel, error = %err, "failed to attach event listener");
            outcome.send_replace(Some(Err(err.to_string())));
            return Err(err);
        }
    };

    if state.ref_count == 0 {
        debug!(channel = %shared.channel, "all subscribers left while attaching; releasing listener");
        drop(source.events);
        if let Some(unlisten) = source.unlisten {
            unlisten();
        }
        outcome.send_replace(Some(Ok(())));
        return Ok(());
    }

    let task = tokio::spawn(fan_out(
        source.events,
        Arc::clone(&shared.subscribers),
        shared.channel.clone(),
    ));
    state.listener = Some(ActiveListener {
        task,
        unlisten: source.unlisten,
    });
    shared.attach_count.fetch_add(1, Ordering::Relaxed);
    info!(channel = %shared.channel, subscribers = state.ref_count, "event listener attached");
    outcome.send_replace(Some(Ok(())));
    Ok(())
}

async fn fan_out(mut events: BoxStream<'static, Value>, subscribers: SubscriberTable, channel: String) {
    while let Some(raw) = events.next().await {
        let event = match normalize_event(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(channel = %channel, error = %err, "dropping malformed backend event");
                continue;
            }
        };

        let callbacks: Vec<EventCallback> = subscribers.read().await.values().cloned().collect();
        debug!(channel = %channel, kind = event.kind(), subscribers = callbacks.len(), "fanning out backend event");
        for callback in callbacks {
            let event = event.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(channel = %channel, "event subscriber panicked");
            }
        }
    }
    debug!(channel = %channel, "event stream ended");
}

async fn release(shared: Arc<Shared>, id: u64) {
    shared.subscribers.write().await.remove(&id);

    let listener = {
        let mut state = shared.state.lock().await;
        state.ref_count = state.ref_count.saturating_sub(1);
        if state.ref_count == 0 {
            state.listener.take()
        } else {
            None
        }
    };

    if let Some(listener) = listener {
        listener.shutdown();
        info!(channel = %shared.channel, "event listener detached");
    }
}

struct HandleInner {
    shared: Arc<Shared>,
    id: u64,
}

/// Cleanup for one `subscribe` call. Dropping an unreleased handle schedules
/// the release on the current tokio runtime.
#[must_use = "dropping the handle unsubscribes"]
pub struct SubscriptionHandle {
    inner: Option<HandleInner>,
}

impl SubscriptionHandle {
    fn inert() -> Self {
        Self { inner: None }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn unsubscribe(mut self) {
        if let Some(inner) = self.inner.take() {
            release(inner.shared, inner.id).await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(release(inner.shared, inner.id));
            }
            Err(_) => warn!(
                channel = %inner.shared.channel,
                "subscription handle dropped outside a runtime; listener count not released"
            ),
        }
    }
}

#[cfg(test)]
#[path = "tests/subscriptions_tests.rs"]
mod tests;
