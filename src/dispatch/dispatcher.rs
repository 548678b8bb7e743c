//! Engine alert dispatch: handle resolution, item mutation, change events.
//!
//! One [`AlertDispatcher`] consumes the engine's alert sequence. Each alert
//! is resolved to an item through the [`HandleIndex`], applied to the
//! [`ItemTree`], and every observable change is published on the
//! [`EventBus`] with a snapshot taken under the item's lock.
//!
//! Alerts for a handle that is not bound yet are handled by class:
//! removals are ignored, registration-racing alerts are parked and retried
//! once after a fixed delay, everything else is dropped. While a handle has
//! parked alerts, later alerts for it queue behind them so per-handle order
//! is preserved.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::commands::ItemCommands;
use super::events::{ChangeEvent, ChangeKind, EventBus};
use super::handles::{HandleError, HandleIndex};
use super::retry::ParkedAlerts;
use crate::engine::{Alert, AlertClass, EngineError, TorrentHandle, TorrentMetadata, TorrentSession};
use crate::model::{
    DownloadType, ErrorCode, ItemId, ItemSnapshot, ItemStatus, ItemTree, NewItem, StatusEvent,
    TreeError,
};
use crate::observability::Metrics;
use crate::resume::ResumeSink;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Priority given to every file of a freshly received torrent
const DEFAULT_FILE_PRIORITY: i32 = 4;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no item bound to {0}")]
    UnknownHandle(TorrentHandle),

    #[error("malformed {kind} alert: {reason}")]
    MalformedAlertPayload { kind: &'static str, reason: String },

    #[error("engine query for {handle} failed: {source}")]
    EngineQueryFailed {
        handle: TorrentHandle,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Handle(#[from] HandleError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// What happened to one dispatched alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Parked,
    Ignored,
}

pub struct AlertDispatcher {
    tree: Arc<ItemTree>,
    handles: Arc<HandleIndex>,
    session: Arc<dyn TorrentSession>,
    events: EventBus,
    metrics: Arc<Metrics>,
    resume: Option<Arc<dyn ResumeSink>>,
    parked: ParkedAlerts,
}

#[bon::bon]
impl AlertDispatcher {
    #[builder]
    pub fn new(
        tree: Arc<ItemTree>,
        session: Arc<dyn TorrentSession>,
        #[builder(default)] handles: Arc<HandleIndex>,
        #[builder(default)] events: EventBus,
        #[builder(default)] metrics: Arc<Metrics>,
        resume: Option<Arc<dyn ResumeSink>>,
        #[builder(default = DEFAULT_RETRY_DELAY)] retry_delay: Duration,
    ) -> Self {
        Self {
            tree,
            handles,
            session,
            events,
            metrics,
            resume,
            parked: ParkedAlerts::new(retry_delay),
        }
    }
}

impl AlertDispatcher {
    pub fn tree(&self) -> &Arc<ItemTree> {
        &self.tree
    }

    pub fn handles(&self) -> &Arc<HandleIndex> {
        &self.handles
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// User command surface sharing this dispatcher's tree, handles and bus
    pub fn commands(&self) -> ItemCommands {
        ItemCommands::new(
            Arc::clone(&self.tree),
            Arc::clone(&self.handles),
            self.events.clone(),
            Arc::clone(&self.metrics),
        )
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Alerts currently waiting for their handle
    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    pub fn next_retry_deadline(&self) -> Option<Instant> {
        self.parked.next_deadline()
    }

    /// Process one alert.
    ///
    /// Failures are logged and counted here; the returned error is for
    /// callers that want to inspect it and never needs to stop a loop.
    pub fn dispatch(&mut self, alert: Alert) -> Result<Disposition> {
        let kind = alert.kind();
        let handle = alert.handle();
        let result = self.route(alert, Instant::now());
        if let Err(err) = &result {
            self.report(kind, handle, err);
        }
        result
    }

    /// Bind `handle` to `item` outside the alert stream and release any
    /// alerts parked for it. Returns how many were released.
    pub fn register(&mut self, handle: TorrentHandle, item: ItemId) -> Result<usize> {
        if !self.tree.contains(item) {
            return Err(TreeError::ItemNotFound(item).into());
        }
        self.handles.bind(handle, item)?;
        info!(%handle, item_id = %item, "Handle registered");
        Ok(self.release(handle, item))
    }

    /// Retry every parked queue whose deadline has passed.
    /// Returns the number of alerts applied.
    pub fn retry_due(&mut self, now: Instant) -> usize {
        let due = self.parked.take_due(now);
        self.retry(due)
    }

    /// Retry every parked queue now, regardless of deadline
    pub fn retry_all(&mut self) -> usize {
        let all = self.parked.drain_all();
        self.retry(all)
    }

    fn retry(&mut self, queues: Vec<(TorrentHandle, Vec<Alert>)>) -> usize {
        let mut applied = 0;
        for (handle, alerts) in queues {
            match self.handles.lookup(handle) {
                Some(item) => applied += self.apply_all(handle, item, alerts),
                None => {
                    warn!(
                        %handle,
                        count = alerts.len(),
                        first = ?alerts.first().map(Alert::kind),
                        "Handle still unknown after retry, dropping alerts"
                    );
                    self.metrics.alerts_dropped(alerts.len() as u64);
                }
            }
        }
        applied
    }

    fn route(&mut self, alert: Alert, now: Instant) -> Result<Disposition> {
        let Some(handle) = alert.handle() else {
            trace!(kind = alert.kind(), "Ignoring unrecognized alert");
            self.metrics.alert_ignored();
            return Ok(Disposition::Ignored);
        };

        if let Alert::TorrentAdded { item, error, .. } = alert {
            return self.on_torrent_added(handle, item, error);
        }

        if self.parked.contains(handle) {
            if let Some(item) = self.handles.lookup(handle) {
                self.release(handle, item);
                return self.apply_one(handle, item, alert);
            }
            if alert.class() == AlertClass::Terminal {
                let dropped = self.parked.take(handle).map_or(0, |alerts| alerts.len());
                debug!(%handle, dropped, "Torrent removed before registration");
                self.metrics.alerts_dropped(dropped as u64);
                self.metrics.alert_ignored();
                return Ok(Disposition::Ignored);
            }
            return Ok(self.park(handle, alert, now));
        }

        match self.handles.lookup(handle) {
            Some(item) => self.apply_one(handle, item, alert),
            None => match alert.class() {
                AlertClass::Terminal => {
                    trace!(%handle, kind = alert.kind(), "Removal for untracked handle");
                    self.metrics.alert_ignored();
                    Ok(Disposition::Ignored)
                }
                AlertClass::Registration => Ok(self.park(handle, alert, now)),
                AlertClass::Regular => Err(DispatchError::UnknownHandle(handle)),
            },
        }
    }

    fn park(&mut self, handle: TorrentHandle, alert: Alert, now: Instant) -> Disposition {
        debug!(%handle, kind = alert.kind(), "Parking alert until handle is registered");
        self.parked.park(handle, alert, now);
        self.metrics.alert_parked();
        Disposition::Parked
    }

    fn release(&mut self, handle: TorrentHandle, item: ItemId) -> usize {
        match self.parked.take(handle) {
            Some(alerts) => {
                debug!(%handle, count = alerts.len(), "Releasing parked alerts");
                self.apply_all(handle, item, alerts)
            }
            None => 0,
        }
    }

    fn apply_all(&mut self, handle: TorrentHandle, item: ItemId, alerts: Vec<Alert>) -> usize {
        let mut applied = 0;
        for alert in alerts {
            let kind = alert.kind();
            match self.apply_one(handle, item, alert) {
                Ok(_) => applied += 1,
                Err(err) => self.report(kind, Some(handle), &err),
            }
        }
        applied
    }

    fn apply_one(&mut self, handle: TorrentHandle, item: ItemId, alert: Alert) -> Result<Disposition> {
        trace!(%handle, item_id = %item, kind = alert.kind(), "Applying alert");
        self.metrics.alert_dispatched();
        self.apply(handle, item, alert)?;
        Ok(Disposition::Applied)
    }

    fn report(&self, kind: &'static str, handle: Option<TorrentHandle>, err: &DispatchError) {
        match err {
            DispatchError::UnknownHandle(_) => {
                debug!(kind, handle = ?handle, "Dropping alert for unknown handle");
                self.metrics.alerts_dropped(1);
            }
            _ => {
                warn!(kind, handle = ?handle, error = %err, "Alert dispatch failed");
                self.metrics.dispatch_failed();
            }
        }
    }

    fn on_torrent_added(
        &mut self,
        handle: TorrentHandle,
        item: Option<ItemId>,
        error: Option<String>,
    ) -> Result<Disposition> {
        let Some(item) = item else {
            warn!(%handle, error = ?error, "Torrent added without an owning item");
            self.metrics.alert_ignored();
            return Ok(Disposition::Ignored);
        };

        self.metrics.alert_dispatched();
        match error {
            Some(message) => {
                warn!(%handle, item_id = %item, error = %message, "Engine rejected torrent");
                self.fail_item(item, ErrorCode::TorrentAdd, message)?;
            }
            None => {
                self.register(handle, item)?;
            }
        }
        Ok(Disposition::Applied)
    }

    fn apply(&mut self, handle: TorrentHandle, item: ItemId, alert: Alert) -> Result<()> {
        match alert {
            Alert::StateChanged { state, .. } => {
                self.apply_status(item, StatusEvent::Reported(state.item_status()))
            }
            Alert::TorrentPaused { .. } => self.apply_status(item, StatusEvent::Paused),
            Alert::TorrentResumed { .. } => self.apply_status(item, StatusEvent::Resumed),
            Alert::TorrentRemoved { .. } => {
                self.handles.unbind(handle);
                match self.tree.update(item, |r| r.mark_for_removal()) {
                    Ok((true, snapshot)) => self.emit(ChangeKind::MarkedForRemoval, snapshot),
                    Ok((false, _)) => {}
                    Err(TreeError::ItemNotFound(_)) => {
                        trace!(%handle, item_id = %item, "Removal after local cleanup");
                    }
                    Err(err) => return Err(err.into()),
                }
                Ok(())
            }
            Alert::TorrentFinished { .. } => {
                let (changed, snapshot) = self.tree.update(item, |r| {
                    let total = r.size();
                    r.set_size_curr_downl(total)
                })?;
                if changed {
                    self.emit(ChangeKind::SizeCurrDownlChanged, snapshot);
                }
                Ok(())
            }
            Alert::TorrentChecked { .. } => {
                trace!(%handle, item_id = %item, "Torrent checked");
                Ok(())
            }
            Alert::FileError { file, message, .. } => {
                let description = match (file.is_empty(), message.is_empty()) {
                    (true, true) => "file error".to_string(),
                    (true, false) => message,
                    (false, true) => format!("{file}: file error"),
                    (false, false) => format!("{file}: {message}"),
                };
                self.fail_item(item, ErrorCode::File, description)
            }
            Alert::FileCompleted { index, .. } => {
                let child = self.file_child(item, index, "file_completed")?;
                let ((grew, finished), snapshot) = self.tree.update(child, |r| {
                    let total = r.size();
                    let grew = r.set_size_curr_downl(total);
                    (grew, r.set_status(ItemStatus::Finished))
                })?;
                let snapshot = Arc::new(snapshot);
                if grew {
                    self.emit_shared(ChangeKind::SizeCurrDownlChanged, &snapshot);
                }
                if finished {
                    self.emit_shared(ChangeKind::StatusChanged, &snapshot);
                }
                Ok(())
            }
            Alert::FileRenamed { index, name, .. } => {
                if name.is_empty() {
                    return Err(malformed("file_renamed", "empty file name"));
                }
                let child = self.file_child(item, index, "file_renamed")?;
                let (renamed, snapshot) = self.tree.update(child, |r| {
                    if r.downloaded_file_name == name {
                        return false;
                    }
                    r.downloaded_file_name = name;
                    true
                })?;
                if renamed {
                    self.emit(ChangeKind::ItemMoved, snapshot);
                }
                Ok(())
            }
            Alert::MetadataReceived { .. } => self.on_metadata(handle, item),
            Alert::SaveResumeData { data, .. } => {
                if data.is_empty() {
                    return Err(malformed("save_resume_data", "empty resume data"));
                }
                match &self.resume {
                    Some(sink) => {
                        if let Err(err) = sink.save(item, &data) {
                            warn!(item_id = %item, error = %err, "Failed to persist resume data");
                        }
                    }
                    None => trace!(item_id = %item, "No resume sink configured"),
                }
                Ok(())
            }
            Alert::SaveResumeDataFailed { message, .. } => {
                match &self.resume {
                    Some(sink) => sink.report_failure(item, &message),
                    None => warn!(item_id = %item, reason = %message, "Resume data unavailable"),
                }
                Ok(())
            }
            Alert::StorageMoved { path, .. } => {
                if path.is_empty() {
                    return Err(malformed("storage_moved", "empty storage path"));
                }
                let (moved, snapshot) = self.tree.update(item, |r| {
                    if r.torrent_save_path == path {
                        return false;
                    }
                    r.torrent_save_path = path;
                    true
                })?;
                if moved {
                    self.emit(ChangeKind::ItemMoved, snapshot);
                }
                Ok(())
            }
            Alert::StorageMovedFailed { message, .. } => {
                self.fail_item(item, ErrorCode::StorageMove, message)
            }
            Alert::Stats {
                total_wanted,
                total_wanted_done,
                download_rate,
                upload_rate,
                progress_ppm,
                ..
            } => {
                let (changes, snapshot) = self.tree.update(item, |r| {
                    let size = total_wanted > 0 && r.set_size(total_wanted);
                    let mut downloaded = r.set_size_curr_downl(total_wanted_done);
                    if let Some(ppm) = progress_ppm {
                        let percent = (ppm / 10_000).min(100) as u8;
                        downloaded |= r.set_percent_download(percent);
                    }
                    let speed = r.set_speed(download_rate);
                    let upload = r.set_speed_upload(upload_rate);
                    [
                        (ChangeKind::SizeChanged, size),
                        (ChangeKind::SizeCurrDownlChanged, downloaded),
                        (ChangeKind::SpeedChanged, speed),
                        (ChangeKind::UploadSpeedChanged, upload),
                    ]
                })?;
                let snapshot = Arc::new(snapshot);
                for (kind, changed) in changes {
                    if changed {
                        self.emit_shared(kind, &snapshot);
                    }
                }
                Ok(())
            }
            Alert::TrackerReply { url, .. } => {
                trace!(%handle, url = %url, "Tracker reply");
                Ok(())
            }
            Alert::TrackerWarning { url, message, .. } | Alert::TrackerError { url, message, .. } => {
                warn!(%handle, item_id = %item, url = %url, reason = %message, "Tracker problem");
                Ok(())
            }
            Alert::FastresumeRejected { message, .. } => {
                warn!(%handle, item_id = %item, reason = %message, "Fast-resume data rejected");
                Ok(())
            }
            // Routed before handle lookup
            Alert::TorrentAdded { .. } | Alert::Unrecognized => Ok(()),
        }
    }

    fn apply_status(&self, item: ItemId, event: StatusEvent) -> Result<()> {
        let (changed, snapshot) = self.tree.update(item, |r| {
            let changed = r.apply(event);
            let cleared = r.status() != ItemStatus::Error && r.clear_error();
            changed || cleared
        })?;
        if changed {
            self.emit(ChangeKind::StatusChanged, snapshot);
        }
        Ok(())
    }

    /// Move an item to Error with a description the user will see
    fn fail_item(&self, item: ItemId, code: ErrorCode, description: String) -> Result<()> {
        let (changed, snapshot) = self.tree.update(item, |r| {
            let error = r.set_error(code, description);
            let status = r.apply(StatusEvent::Failed);
            error || status
        })?;
        if changed {
            self.emit(ChangeKind::StatusChanged, snapshot);
        }
        Ok(())
    }

    fn file_child(&self, item: ItemId, index: usize, kind: &'static str) -> Result<ItemId> {
        self.tree.child(Some(item), index).ok_or_else(|| {
            malformed(
                kind,
                format!(
                    "file index {index} out of range ({} files)",
                    self.tree.child_count(Some(item))
                ),
            )
        })
    }

    fn on_metadata(&self, handle: TorrentHandle, item: ItemId) -> Result<()> {
        let metadata = match self.session.metadata(handle) {
            Ok(metadata) => metadata,
            Err(source) => {
                warn!(%handle, item_id = %item, error = %source, "Metadata query failed");
                self.fail_item(item, ErrorCode::EngineQuery, source.to_string())?;
                return Err(DispatchError::EngineQueryFailed { handle, source });
            }
        };

        let download_type = self.tree.with_item(item, |r| r.download_type())?;
        let files = file_items(&metadata, download_type);
        let file_count = files.len();
        self.tree.replace_children(item, files)?;

        let total = metadata.total_size();
        let (resized, snapshot) = self.tree.update(item, |r| {
            if r.downloaded_file_name.is_empty() {
                r.downloaded_file_name = metadata.name.clone();
            }
            r.torrent_save_path = metadata.save_path.clone();
            r.torrent_files_priorities = vec![DEFAULT_FILE_PRIORITY; file_count];
            total > 0 && r.set_size(total)
        })?;

        debug!(%handle, item_id = %item, files = file_count, total, "Metadata received");
        let snapshot = Arc::new(snapshot);
        if resized {
            self.emit_shared(ChangeKind::SizeChanged, &snapshot);
        }
        self.emit_shared(ChangeKind::MetadataReceived, &snapshot);
        Ok(())
    }

    fn emit(&self, kind: ChangeKind, snapshot: ItemSnapshot) {
        self.emit_shared(kind, &Arc::new(snapshot));
    }

    fn emit_shared(&self, kind: ChangeKind, snapshot: &Arc<ItemSnapshot>) {
        trace!(item_id = %snapshot.id, ?kind, "Emitting change event");
        self.events.publish(ChangeEvent {
            kind,
            item: Arc::clone(snapshot),
        });
        self.metrics.event_emitted();
    }
}

fn malformed(kind: &'static str, reason: impl Into<String>) -> DispatchError {
    DispatchError::MalformedAlertPayload {
        kind,
        reason: reason.into(),
    }
}

fn file_items(metadata: &TorrentMetadata, download_type: DownloadType) -> Vec<NewItem> {
    metadata
        .files
        .iter()
        .map(|file| {
            NewItem::builder()
                .initial_url(file.path.clone())
                .download_type(download_type)
                .size(file.size)
                .downloaded_file_name(file.path.clone())
                .torrent_save_path(metadata.save_path.clone())
                .priority(DEFAULT_FILE_PRIORITY)
                .build()
        })
        .collect()
}

/// Run the dispatcher as a task draining `alerts`.
///
/// The task wakes for parked-alert deadlines between alerts. When the
/// channel closes, parked alerts get their retry immediately and the
/// dispatcher is handed back.
pub fn spawn(
    mut dispatcher: AlertDispatcher,
    mut alerts: mpsc::Receiver<Alert>,
) -> JoinHandle<AlertDispatcher> {
    tokio::spawn(async move {
        info!("Alert dispatcher started");
        loop {
            let deadline = dispatcher.next_retry_deadline();
            tokio::select! {
                alert = alerts.recv() => match alert {
                    Some(alert) => {
                        // Logged and counted inside dispatch
                        let _ = dispatcher.dispatch(alert);
                    }
                    None => break,
                },
                _ = wait_until(deadline) => {
                    dispatcher.retry_due(Instant::now());
                }
            }
        }

        dispatcher.retry_all();
        info!(metrics = ?dispatcher.metrics.snapshot(), "Alert dispatcher stopped");
        dispatcher
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
