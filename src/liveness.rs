//! ==============================================================================
//! liveness.rs - device liveness tracking
//! ==============================================================================
//!
//! purpose:
//!     remembers when each known esp32 last delivered a reading and decides
//!     whether it counts as online.
//!
//! state machine (per device):
//!
//!     NeverSeen ──ingest──▶ Online ──sweep (window elapsed)──▶ Offline
//!                             ▲                                  │
//!                             └──────────────ingest──────────────┘
//!
//! timing:
//!     the sweeper runs every `sweep_interval`, the window is `window`.
//!     `status()` compares against the window directly, so a stale device
//!     reads offline even before the sweeper reaches it. the sweep interval
//!     should stay well below the window, otherwise `last_seen()` keeps
//!     reporting a stale timestamp for up to one extra sweep period.
//!
//! concurrency:
//!     the device set is fixed at construction, so the map itself is never
//!     mutated; each entry has its own lock. ingest handlers and the sweeper
//!     only ever hold one entry lock at a time.
//!
//! relationships:
//!     - written by: server.rs (ingest handlers), spawn_sweeper below
//!     - read by: server.rs (GET /esp32_status)
//!
//! ==============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    NeverSeen,
    Online { last_seen: DateTime<Utc> },
    Offline { last_seen: DateTime<Utc> },
}

#[derive(Clone)]
pub struct LivenessTracker {
    inner: Arc<Inner>,
}

struct Inner {
    window: Duration,
    devices: BTreeMap<String, Mutex<Presence>>,
}

impl LivenessTracker {
    pub fn new<I, S>(devices: I, window: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices = devices
            .into_iter()
            .map(|id| (id.into(), Mutex::new(Presence::NeverSeen)))
            .collect();
        Self {
            inner: Arc::new(Inner { window, devices }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.inner.devices.keys().map(String::as_str)
    }

    /// mark `device` as seen right now
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn record_seen(&self, device: &str) -> bool {
        self.record_seen_at(device, Utc::now())
    }

    /// returns false (and changes nothing) for an unknown device id
    pub fn record_seen_at(&self, device: &str, now: DateTime<Utc>) -> bool {
        match self.inner.devices.get(device) {
            Some(entry) => {
                let mut presence = entry.lock();
                if !matches!(*presence, Presence::Online { .. }) {
                    tracing::info!(device, "device came online");
                }
                *presence = Presence::Online { last_seen: now };
                true
            }
            None => {
                tracing::warn!(device, "ignoring reading from unknown device");
                false
            }
        }
    }

    /// moves every online device whose window has elapsed to offline,
    /// returning the ids that changed
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired = Vec::new();
        for (id, entry) in &self.inner.devices {
            let mut presence = entry.lock();
            if let Presence::Online { last_seen } = *presence {
                if now - last_seen >= self.inner.window {
                    *presence = Presence::Offline { last_seen };
                    expired.push(id.clone());
                }
            }
        }
        expired
    }

    pub fn presence(&self, device: &str) -> Option<Presence> {
        self.inner.devices.get(device).map(|entry| *entry.lock())
    }

    /// last-seen time while the device is online, `None` when never seen
    /// or already swept
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn last_seen(&self, device: &str) -> Option<DateTime<Utc>> {
        match self.presence(device)? {
            Presence::Online { last_seen } => Some(last_seen),
            _ => None,
        }
    }

    /// `None` for unknown ids
    pub fn status(&self, device: &str, now: DateTime<Utc>) -> Option<DeviceStatus> {
        let presence = self.presence(device)?;
        Some(match presence {
            Presence::Online { last_seen } if now - last_seen < self.inner.window => {
                DeviceStatus::Online
            }
            _ => DeviceStatus::Offline,
        })
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> BTreeMap<String, DeviceStatus> {
        self.devices()
            .filter_map(|id| self.status(id, now).map(|s| (id.to_string(), s)))
            .collect()
    }
}

// ==============================================================================
// background sweeper
// ==============================================================================

/// runs `sweep` every `every` until `shutdown` flips to true (or its sender drops)
pub fn spawn_sweeper(
    tracker: LivenessTracker,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval = ?every, window = %tracker.window(), "liveness sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for device in tracker.sweep(Utc::now()) {
                        tracing::info!(device = %device, "device went offline");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("liveness sweeper stopped");
    })
}
