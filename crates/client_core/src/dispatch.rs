use std::sync::Arc;

use shared::BackendEvent;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::{
    command::{Command, Subscription},
    config::RuntimeSettings,
    interpreter::Interpreter,
    subscriptions::{SubscriptionHandle, SubscriptionManager},
    transport::{Transport, TransportError},
};

/// Model-less entry points: one-off commands and subscriptions.
pub struct Runtime {
    interpreter: Interpreter,
    subscriptions: SubscriptionManager,
}

impl Runtime {
    pub fn new(transport: Arc<dyn Transport>, settings: &RuntimeSettings) -> Self {
        Self {
            interpreter: Interpreter::new(Arc::clone(&transport), settings),
            subscriptions: SubscriptionManager::new(transport, settings.event_channel.clone()),
        }
    }

    pub fn from_parts(interpreter: Interpreter, subscriptions: SubscriptionManager) -> Self {
        Self {
            interpreter,
            subscriptions,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Runs a command outside any dispatch loop; messages its continuations
    /// produce have nowhere to go and are discarded.
    pub async fn execute<M: Send + 'static>(&self, cmd: Command<M>) {
        let kind = cmd.type_name();
        let discarded = self.interpreter.interpret(cmd).await;
        if !discarded.is_empty() {
            debug!(
                command = kind,
                discarded = discarded.len(),
                "execute dropped follow-up messages"
            );
        }
    }

    pub async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle, TransportError> {
        self.subscriptions.subscribe(sub).await
    }
}

pub type Reducer<Model, Msg> = Arc<dyn Fn(&Model, Msg) -> (Model, Command<Msg>) + Send + Sync>;
pub type MessageGuard<Msg> = Arc<dyn Fn(&Msg) -> bool + Send + Sync>;

/// Drives a `(Model, Msg)` reducer: reduce, commit, interpret, and feed the
/// messages produced by continuations back through the same reducer.
///
/// Follow-up commands go onto the interpreter's work stack rather than
/// recursing, so an arbitrarily long effect chain runs in constant stack.
pub struct Dispatcher<Model, Msg> {
    runtime: Arc<Runtime>,
    model: watch::Sender<Model>,
    reducer: Reducer<Model, Msg>,
    guard: MessageGuard<Msg>,
}

impl<Model, Msg> Dispatcher<Model, Msg>
where
    Model: Send + Sync + 'static,
    Msg: Send + 'static,
{
    pub fn new(
        runtime: Arc<Runtime>,
        initial: Model,
        reducer: impl Fn(&Model, Msg) -> (Model, Command<Msg>) + Send + Sync + 'static,
    ) -> Self {
        let (model, _) = watch::channel(initial);
        Self {
            runtime,
            model,
            reducer: Arc::new(reducer),
            guard: Arc::new(|_| true),
        }
    }

    /// Only follow-up messages accepted by `guard` re-enter the loop.
    pub fn with_message_guard(mut self, guard: impl Fn(&Msg) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn watch_model(&self) -> watch::Receiver<Model> {
        self.model.subscribe()
    }

    /// Reduces `msg` and runs its command. Every follow-up message is reduced
    /// and committed the moment its continuation produces it, and the
    /// follow-up's own command runs before the remaining batch siblings.
    pub async fn dispatch(&self, msg: Msg) {
        let cmd = self.reduce(msg);
        if cmd.is_none() {
            return;
        }
        self.runtime
            .interpreter()
            .interpret_with(cmd, |next| {
                if (self.guard)(&next) {
                    self.reduce(next)
                } else {
                    warn!("continuation produced a message the guard rejected; dropping it");
                    Command::None
                }
            })
            .await;
    }

    fn reduce(&self, msg: Msg) -> Command<Msg> {
        let mut cmd = Command::None;
        self.model.send_modify(|model| {
            let (next, next_cmd) = (self.reducer)(model, msg);
            *model = next;
            cmd = next_cmd;
        });
        debug!(command = cmd.type_name(), effects = cmd.count(), "reduced message");
        cmd
    }

    /// A subscription whose events are turned into messages and dispatched
    /// one at a time, in push order, by a single drain task. The task stops
    /// once the subscription is released. Must be called inside a tokio runtime.
    pub fn backend_events(
        self: &Arc<Self>,
        to_msg: impl Fn(BackendEvent) -> Msg + Send + Sync + 'static,
    ) -> Subscription {
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                dispatcher.dispatch(msg).await;
            }
            debug!("backend event queue closed");
        });

        Subscription::backend_events(move |event| {
            if tx.send(to_msg(event)).is_err() {
                warn!("backend event queue closed; dropping event");
            }
        })
    }
}

impl<Model, Msg> Dispatcher<Model, Msg>
where
    Model: Clone + Send + Sync + 'static,
    Msg: Send + 'static,
{
    pub fn model(&self) -> Model {
        self.model.borrow().clone()
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
