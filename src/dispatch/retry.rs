//! Alerts waiting for their handle to be registered

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::engine::{Alert, TorrentHandle};

struct Parked {
    deadline: Instant,
    alerts: Vec<Alert>,
}

/// Per-handle queues of alerts that arrived before their handle was bound.
///
/// A handle's deadline is fixed when its first alert is parked; later
/// alerts for the same handle queue behind it and share that deadline.
pub struct ParkedAlerts {
    delay: Duration,
    by_handle: HashMap<TorrentHandle, Parked>,
}

impl ParkedAlerts {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            by_handle: HashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Queue `alert`; returns true when this opened a new queue for the handle
    pub fn park(&mut self, handle: TorrentHandle, alert: Alert, now: Instant) -> bool {
        match self.by_handle.get_mut(&handle) {
            Some(parked) => {
                parked.alerts.push(alert);
                false
            }
            None => {
                self.by_handle.insert(
                    handle,
                    Parked {
                        deadline: now + self.delay,
                        alerts: vec![alert],
                    },
                );
                true
            }
        }
    }

    pub fn contains(&self, handle: TorrentHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    pub fn take(&mut self, handle: TorrentHandle) -> Option<Vec<Alert>> {
        self.by_handle.remove(&handle).map(|parked| parked.alerts)
    }

    /// Remove every queue whose deadline has passed, oldest deadline first
    pub fn take_due(&mut self, now: Instant) -> Vec<(TorrentHandle, Vec<Alert>)> {
        let mut due: Vec<(Instant, TorrentHandle)> = self
            .by_handle
            .iter()
            .filter(|(_, parked)| parked.deadline <= now)
            .map(|(handle, parked)| (parked.deadline, *handle))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, handle)| self.take(handle).map(|alerts| (handle, alerts)))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_handle.values().map(|parked| parked.deadline).min()
    }

    /// Remove every queue regardless of deadline
    pub fn drain_all(&mut self) -> Vec<(TorrentHandle, Vec<Alert>)> {
        let mut all: Vec<(Instant, TorrentHandle, Vec<Alert>)> = self
            .by_handle
            .drain()
            .map(|(handle, parked)| (parked.deadline, handle, parked.alerts))
            .collect();
        all.sort_by_key(|(deadline, handle, _)| (*deadline, *handle));
        all.into_iter()
            .map(|(_, handle, alerts)| (handle, alerts))
            .collect()
    }

    /// Total parked alerts across handles
    pub fn len(&self) -> usize {
        self.by_handle.values().map(|parked| parked.alerts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
