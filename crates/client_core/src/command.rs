//! Effect descriptions returned by reducers.
//!
//! A [`Command`] owns no resources until the interpreter walks it. Continuations
//! captured inside [`Invoke`] decide whether a remote result turns into a new
//! message (`Some(msg)`) or ends the chain (`None`).

use std::{fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{AppError, BackendEvent};

use crate::normalize::decode;

pub type SuccessContinuation<M> = Box<dyn FnOnce(Value) -> Option<M> + Send>;
pub type FailureContinuation<M> = Box<dyn FnOnce(AppError) -> Option<M> + Send>;
pub type EventCallback = Arc<dyn Fn(BackendEvent) + Send + Sync>;

pub struct Invoke<M> {
    pub operation: String,
    pub(crate) payload: Result<Value, AppError>,
    pub(crate) on_success: SuccessContinuation<M>,
    pub(crate) on_failure: FailureContinuation<M>,
}

impl<M: 'static> Invoke<M> {
    pub fn new<P, S, F>(operation: impl Into<String>, payload: &P, on_success: S, on_failure: F) -> Self
    where
        P: Serialize + ?Sized,
        S: FnOnce(Value) -> Option<M> + Send + 'static,
        F: FnOnce(AppError) -> Option<M> + Send + 'static,
    {
        let operation = operation.into();
        let payload = serde_json::to_value(payload).map_err(|err| {
            AppError::parse(format!("payload is not serializable: {err}"))
                .with_context(format!("Command: {operation}"))
        });
        Self {
            operation,
            payload,
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }

    /// An invoke whose outcome only matters for logging.
    pub fn fire_and_forget<P>(operation: impl Into<String>, payload: &P) -> Self
    where
        P: Serialize + ?Sized,
    {
        Self::new(operation, payload, |_| None, |_| None)
    }

    /// The serialized payload, or `None` when serialization failed.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref().ok()
    }

    fn map<N: 'static>(self, f: Arc<dyn Fn(M) -> N + Send + Sync>) -> Invoke<N> {
        let on_success = self.on_success;
        let on_failure = self.on_failure;
        let f_err = Arc::clone(&f);
        Invoke {
            operation: self.operation,
            payload: self.payload,
            on_success: Box::new(move |value| on_success(value).map(|msg| (*f)(msg))),
            on_failure: Box::new(move |error| on_failure(error).map(|msg| (*f_err)(msg))),
        }
    }
}

impl<M> fmt::Debug for Invoke<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoke")
            .field("operation", &self.operation)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

pub enum Command<M> {
    None,
    Invoke(Invoke<M>),
    /// Children run strictly in order, each awaited before the next.
    Batch(Vec<Command<M>>),
    StartWatch {
        subject_id: i64,
    },
    StopWatch {
        subject_id: i64,
    },
    /// Extension slot dispatched to a handler registered under `tag`.
    Custom {
        tag: String,
        payload: Value,
    },
}

impl<M: 'static> Command<M> {
    pub fn none() -> Self {
        Self::None
    }

    pub fn batch(items: impl IntoIterator<Item = Command<M>>) -> Self {
        Self::Batch(items.into_iter().collect())
    }

    pub fn start_watch(subject_id: impl Into<i64>) -> Self {
        Self::StartWatch {
            subject_id: subject_id.into(),
        }
    }

    pub fn stop_watch(subject_id: impl Into<i64>) -> Self {
        Self::StopWatch {
            subject_id: subject_id.into(),
        }
    }

    pub fn custom(tag: impl Into<String>, payload: Value) -> Self {
        Self::Custom {
            tag: tag.into(),
            payload,
        }
    }

    pub fn invoke<P, S, F>(
        operation: impl Into<String>,
        payload: &P,
        on_success: S,
        on_failure: F,
    ) -> Self
    where
        P: Serialize + ?Sized,
        S: FnOnce(Value) -> Option<M> + Send + 'static,
        F: FnOnce(AppError) -> Option<M> + Send + 'static,
    {
        Self::Invoke(Invoke::new(operation, payload, on_success, on_failure))
    }

    /// Like [`Command::invoke`], decoding the success value into `T` first.
    /// A value that does not decode is routed to `on_failure` as `PARSE_ERROR`.
    pub fn invoke_typed<T, P, S, F>(
        operation: impl Into<String>,
        payload: &P,
        on_success: S,
        on_failure: F,
    ) -> Self
    where
        T: DeserializeOwned + 'static,
        P: Serialize + ?Sized,
        S: FnOnce(T) -> Option<M> + Send + 'static,
        F: FnOnce(AppError) -> Option<M> + Send + 'static,
    {
        let operation = operation.into();
        let decode_operation = operation.clone();
        // Both continuations need the failure path; only one of them ever runs.
        let on_failure = Arc::new(std::sync::Mutex::new(Some(on_failure)));
        let on_decode_failure = Arc::clone(&on_failure);
        Self::invoke(
            operation,
            payload,
            move |value| match decode::<T>(value, &decode_operation) {
                Ok(decoded) => on_success(decoded),
                Err(error) => take_failure(&on_decode_failure).and_then(|f| f(error)),
            },
            move |error| take_failure(&on_failure).and_then(|f| f(error)),
        )
    }

    pub fn fire_and_forget<P>(operation: impl Into<String>, payload: &P) -> Self
    where
        P: Serialize + ?Sized,
    {
        Self::Invoke(Invoke::fire_and_forget(operation, payload))
    }

    /// Stable name for tracing.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Invoke(_) => "Invoke",
            Self::Batch(_) => "Batch",
            Self::StartWatch { .. } => "StartWatch",
            Self::StopWatch { .. } => "StopWatch",
            Self::Custom { .. } => "Custom",
        }
    }

    /// Number of atomic commands, counting through nested batches.
    pub fn count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Batch(items) => items.iter().map(Self::count).sum(),
            _ => 1,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Lifts a child component's command into its parent's message type.
    pub fn map<N: 'static>(self, f: impl Fn(M) -> N + Send + Sync + 'static) -> Command<N> {
        self.map_shared(Arc::new(f))
    }

    fn map_shared<N: 'static>(self, f: Arc<dyn Fn(M) -> N + Send + Sync>) -> Command<N> {
        match self {
            Self::None => Command::None,
            Self::Invoke(invoke) => Command::Invoke(invoke.map(f)),
            Self::Batch(items) => Command::Batch(
                items
                    .into_iter()
                    .map(|item| item.map_shared(Arc::clone(&f)))
                    .collect(),
            ),
            Self::StartWatch { subject_id } => Command::StartWatch { subject_id },
            Self::StopWatch { subject_id } => Command::StopWatch { subject_id },
            Self::Custom { tag, payload } => Command::Custom { tag, payload },
        }
    }
}

impl<M> Default for Command<M> {
    fn default() -> Self {
        Self::None
    }
}

fn take_failure<F>(slot: &std::sync::Mutex<Option<F>>) -> Option<F> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

impl<M> fmt::Debug for Command<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Invoke(invoke) => f.debug_tuple("Invoke").field(invoke).finish(),
            Self::Batch(items) => f.debug_tuple("Batch").field(items).finish(),
            Self::StartWatch { subject_id } => f
                .debug_struct("StartWatch")
                .field("subject_id", subject_id)
                .finish(),
            Self::StopWatch { subject_id } => f
                .debug_struct("StopWatch")
                .field("subject_id", subject_id)
                .finish(),
            Self::Custom { tag, payload } => f
                .debug_struct("Custom")
                .field("tag", tag)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// An ongoing event source a consumer listens to.
#[derive(Default)]
pub enum Subscription {
    BackendEvents {
        on_event: EventCallback,
    },
    #[default]
    None,
}

impl Subscription {
    pub fn backend_events(on_event: impl Fn(BackendEvent) + Send + Sync + 'static) -> Self {
        Self::BackendEvents {
            on_event: Arc::new(on_event),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendEvents { .. } => write!(f, "BackendEvents(..)"),
            Self::None => write!(f, "None"),
        }
    }
}

#[cfg(test)]
#[path = "tests/command_tests.rs"]
mod tests;
