use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::AppError;
use tracing::{debug, error, warn};

use crate::{
    command::{Command, Invoke},
    config::RuntimeSettings,
    normalize::normalize,
    transport::Transport,
};

/// Handler for [`Command::Custom`] commands registered under a tag.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
struct WatchOps {
    enable: String,
    disable: String,
}

/// Executes [`Command`] values against a [`Transport`].
///
/// `interpret` never fails: invoke failures reach `on_failure`, watch and
/// custom failures are logged, and a continuation that panics is logged and
/// treated as terminal.
pub struct Interpreter {
    transport: Arc<dyn Transport>,
    watch_ops: WatchOps,
    invoke_timeout: Option<Duration>,
    handlers: HashMap<String, Arc<dyn CustomHandler>>,
}

impl Interpreter {
    pub fn new(transport: Arc<dyn Transport>, settings: &RuntimeSettings) -> Self {
        Self {
            transport,
            watch_ops: WatchOps {
                enable: settings.watch_enable_op.clone(),
                disable: settings.watch_disable_op.clone(),
            },
            invoke_timeout: settings.invoke_timeout,
            handlers: HashMap::new(),
        }
    }

    pub fn with_handler(mut self, tag: impl Into<String>, handler: Arc<dyn CustomHandler>) -> Self {
        self.handlers.insert(tag.into(), handler);
        self
    }

    /// Runs `cmd` to completion and returns, in execution order, the messages
    /// its continuations produced.
    pub async fn interpret<M: Send + 'static>(&self, cmd: Command<M>) -> Vec<M> {
        let mut produced = Vec::new();
        self.interpret_with(cmd, |msg| {
            produced.push(msg);
            Command::None
        })
        .await;
        produced
    }

    /// Runs `cmd`, handing each continuation message to `on_message` as soon
    /// as it is produced. The command `on_message` returns runs next, ahead of
    /// any remaining batch siblings.
    pub async fn interpret_with<M, F>(&self, cmd: Command<M>, mut on_message: F)
    where
        M: Send + 'static,
        F: FnMut(M) -> Command<M> + Send,
    {
        // Batches are flattened onto a stack so nesting depth never grows the call stack.
        let mut pending = vec![cmd];

        while let Some(cmd) = pending.pop() {
            match cmd {
                Command::None => {}
                Command::Invoke(invoke) => {
                    if let Some(msg) = self.run_invoke(invoke).await {
                        pending.push(on_message(msg));
                    }
                }
                Command::Batch(items) => {
                    debug!(children = items.len(), "interpreting batch");
                    pending.extend(items.into_iter().rev());
                }
                Command::StartWatch { subject_id } => {
                    self.toggle_watch(&self.watch_ops.enable, subject_id).await;
                }
                Command::StopWatch { subject_id } => {
                    self.toggle_watch(&self.watch_ops.disable, subject_id).await;
                }
                Command::Custom { tag, payload } => self.run_custom(&tag, payload).await,
            }
        }
    }

    async fn run_invoke<M>(&self, invoke: Invoke<M>) -> Option<M> {
        let Invoke {
            operation,
            payload,
            on_success,
            on_failure,
        } = invoke;

        let outcome = match payload {
            Ok(payload) => self.call(&operation, payload).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(value) => run_continuation(&operation, move || on_success(value)),
            Err(error) => {
                debug!(operation = %operation, error = %error, "invoke failed");
                run_continuation(&operation, move || on_failure(error))
            }
        }
    }

    /// One remote call, normalized. Transport rejections and timeouts become
    /// `IO_ERROR` tagged with the operation name.
    pub async fn call(&self, operation: &str, payload: Value) -> Result<Value, AppError> {
        let call = self.transport.call(operation, payload);
        let raw = match self.invoke_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(raw) => raw,
                Err(_) => {
                    warn!(operation, timeout = ?limit, "remote call timed out");
                    return Err(AppError::io(format!(
                        "timed out after {}ms",
                        limit.as_millis()
                    ))
                    .with_context(format!("Command: {operation}")));
                }
            },
            None => call.await,
        };

        match raw {
            Ok(raw) => normalize(raw, operation),
            Err(err) => {
                warn!(operation, error = %err, "remote call rejected");
                Err(AppError::io(err.to_string()).with_context(format!("Command: {operation}")))
            }
        }
    }

    async fn toggle_watch(&self, operation: &str, subject_id: i64) {
        match self
            .call(operation, json!({ "location_id": subject_id }))
            .await
        {
            Ok(_) => debug!(operation, subject_id, "watch toggled"),
            Err(error) => warn!(operation, subject_id, error = %error, "watch toggle failed"),
        }
    }

    async fn run_custom(&self, tag: &str, payload: Value) {
        let Some(handler) = self.handlers.get(tag) else {
            warn!(tag, "unrecognized command; ignoring");
            return;
        };
        if let Err(error) = handler.handle(payload).await {
            warn!(tag, error = %error, "custom command failed");
        }
    }
}

fn run_continuation<M>(operation: &str, continuation: impl FnOnce() -> Option<M>) -> Option<M> {
    match catch_unwind(AssertUnwindSafe(continuation)) {
        Ok(next) => next,
        Err(_) => {
            error!(operation, "continuation panicked; dropping its result");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/interpreter_tests.rs"]
mod tests;
