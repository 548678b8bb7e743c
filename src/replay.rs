//! Scripted replay of an engine alert sequence

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use dlbridge::config::Config;
use dlbridge::dispatch::{self, AlertDispatcher, DispatchError};
use dlbridge::engine::{Alert, ScriptedSession, TorrentHandle, TorrentMetadata};
use dlbridge::model::{ItemId, ItemSnapshot, ItemTree, NewItem};
use dlbridge::observability::MetricsSnapshot;
use dlbridge::resume::{FjallResumeStore, ResumeError, ResumeSink};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resume store error: {0}")]
    Resume(#[from] ResumeError),

    #[error("Dispatcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One line of a replay script
#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    /// Create an item, optionally under an existing parent
    Add {
        #[serde(default)]
        parent: Option<ItemId>,
        item: NewItem,
    },
    /// The engine accepted a torrent for an item
    Bind { handle: TorrentHandle, item: ItemId },
    /// Register what the engine will answer for a metadata query
    Metadata {
        handle: TorrentHandle,
        metadata: TorrentMetadata,
    },
    Alert { alert: Alert },
}

/// Final line of a replay: the whole tree and the dispatch counters
#[derive(Serialize)]
struct Summary {
    items: Vec<ItemSnapshot>,
    metrics: MetricsSnapshot,
}

fn parse_step(line: &str) -> Result<Step, DispatchError> {
    serde_json::from_str(line).map_err(|err| DispatchError::MalformedAlertPayload {
        kind: "script",
        reason: err.to_string(),
    })
}

/// Replay `script` and print each change event as one JSON line
pub async fn run(script: &Path, config: &Config, resume_enabled: bool) -> Result<(), ReplayError> {
    let content = tokio::fs::read_to_string(script).await?;
    info!(script = %script.display(), "Replaying alert script");

    let tree = Arc::new(ItemTree::new());
    let session = Arc::new(ScriptedSession::new());
    let store = if resume_enabled && config.resume.enabled {
        Some(FjallResumeStore::open(&config.resume.path)?)
    } else {
        None
    };
    let sink: Option<Arc<dyn ResumeSink>> = store
        .clone()
        .map(|store| Arc::new(store) as Arc<dyn ResumeSink>);

    let dispatcher = AlertDispatcher::builder()
        .tree(Arc::clone(&tree))
        .session(session.clone())
        .maybe_resume(sink)
        .retry_delay(config.dispatch.retry_delay())
        .build();
    let metrics = Arc::clone(dispatcher.metrics());
    let commands = dispatcher.commands();

    let mut events = dispatcher.events().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(error = %err, "Failed to render change event"),
            }
        }
    });

    let (tx, rx) = mpsc::channel(config.dispatch.alert_channel_capacity);
    let worker = dispatch::spawn(dispatcher, rx);

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let step = match parse_step(line) {
            Ok(step) => step,
            Err(err) => {
                warn!(line = number + 1, error = %err, "Skipping script line");
                continue;
            }
        };

        match step {
            Step::Add { parent: None, item } => {
                let id = commands.add(item);
                info!(item_id = %id, "Script added item");
            }
            Step::Add {
                parent: Some(parent),
                item,
            } => match commands.add_child(parent, item) {
                Ok(id) => info!(item_id = %id, parent = %parent, "Script added child"),
                Err(err) => warn!(line = number + 1, error = %err, "Skipping script line"),
            },
            // Through the queue so it lands in order with the alerts around it
            Step::Bind { handle, item } => {
                send(
                    &tx,
                    Alert::TorrentAdded {
                        handle,
                        item: Some(item),
                        error: None,
                    },
                )
                .await
            }
            Step::Metadata { handle, metadata } => session.insert(handle, metadata),
            Step::Alert { alert } => send(&tx, alert).await,
        }
    }

    drop(tx);
    let dispatcher = worker.await?;
    // the printer ends once every handle on the bus is gone
    drop(dispatcher);
    drop(commands);
    printer.await?;

    if let Some(store) = store {
        store.persist()?;
    }

    let summary = Summary {
        items: tree.snapshots(),
        metrics: metrics.snapshot(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

async fn send(tx: &mpsc::Sender<Alert>, alert: Alert) {
    if tx.send(alert).await.is_err() {
        warn!("Dispatcher stopped, alert not delivered");
    }
}
