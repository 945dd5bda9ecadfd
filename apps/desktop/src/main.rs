mod controller;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, load_settings_from, settings_path, Dispatcher, HttpTransport, Runtime,
    Subscription,
};
use controller::documents::{self, DocumentsModel, DocumentsMsg};
use serde_json::Value;
use shared::domain::LocationId;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; `runtime.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    backend_url: Option<String>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Calls one backend operation and prints the normalized result.
    Invoke {
        operation: String,
        #[arg(default_value = "{}")]
        payload: String,
    },
    /// Prints backend events until interrupted.
    Listen {
        #[arg(long)]
        count: Option<usize>,
    },
    /// Selects a location and saves a new draft through the documents reducer.
    SaveDemo {
        location_id: i64,
        #[arg(long, default_value = "# Draft\n")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut settings = match settings_path(cli.config) {
        Some(path) => load_settings_from(&path)?,
        None => load_settings(),
    };
    if let Some(url) = cli.backend_url {
        settings.backend_url = url;
    }
    settings.validate()?;

    let transport = Arc::new(
        HttpTransport::new(&settings.backend_url)
            .with_context(|| format!("failed to set up transport for {}", settings.backend_url))?,
    );
    let runtime = Arc::new(Runtime::new(transport, &settings));
    tracing::info!(backend = %settings.backend_url, channel = %settings.event_channel, "runtime ready");

    match cli.command {
        CliCommand::Invoke { operation, payload } => invoke(&runtime, &operation, &payload).await,
        CliCommand::Listen { count } => listen(&runtime, count).await,
        CliCommand::SaveDemo { location_id, text } => {
            save_demo(runtime, LocationId(location_id), text).await
        }
    }
}

async fn invoke(runtime: &Runtime, operation: &str, payload: &str) -> Result<()> {
    let payload: Value = serde_json::from_str(payload).context("payload must be JSON")?;
    let value = runtime.interpreter().call(operation, payload).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn listen(runtime: &Runtime, count: Option<usize>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = runtime
        .subscribe(Subscription::backend_events(move |event| {
            let _ = tx.send(event);
        }))
        .await
        .with_context(|| {
            format!(
                "could not attach to event channel '{}'",
                runtime.subscriptions().channel()
            )
        })?;

    let mut seen = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    handle.unsubscribe().await;
    Ok(())
}

async fn save_demo(runtime: Arc<Runtime>, location: LocationId, text: String) -> Result<()> {
    let dispatcher = Arc::new(
        Dispatcher::new(runtime, DocumentsModel::default(), documents::update)
            .with_message_guard(DocumentsMsg::is_follow_up),
    );
    let events = match dispatcher
        .runtime()
        .subscribe(dispatcher.backend_events(DocumentsMsg::Backend))
        .await
    {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "continuing without backend events");
            None
        }
    };

    dispatcher.dispatch(DocumentsMsg::LocationSelected(location)).await;
    dispatcher.dispatch(DocumentsMsg::TextEdited(text)).await;
    dispatcher.dispatch(DocumentsMsg::SaveRequested).await;

    let model = dispatcher.model();
    if let Some(events) = events {
        events.unsubscribe().await;
    }

    if let Some(error) = model.error {
        bail!("save failed: {error}");
    }
    let doc = model.doc.context("no document was saved")?;
    println!(
        "saved {} in location {} ({:?}); {} documents listed",
        doc.rel_path.display(),
        doc.location_id.0,
        model.status,
        model.docs.len()
    );
    Ok(())
}
