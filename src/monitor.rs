//! Device hot-plug handling.
//!
//! Two layers: [`DeviceNotificationFilter`] classifies raw hot-plug
//! events delivered by the platform (is this an arrival/removal of a
//! capture-class interface?), and [`DeviceMonitor`] provides a polling
//! fallback for hosts with no native notification channel, diffing
//! periodic enumerations and emitting connect/disconnect events.

use crate::errors::CaptureError;
use crate::source::DeviceEnumerator;
use crate::types::DeviceDescriptor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::{uuid, Uuid};

/// Interface class of video capture devices.
pub const VIDEO_CAPTURE_CLASS: Uuid = uuid!("65e8773d-8f56-11d0-a3b9-00a0c9223196");

/// What a raw hot-plug event reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEventKind {
    Arrival,
    RemoveComplete,
    Other,
}

/// A raw hot-plug event as delivered by the platform collaborator.
#[derive(Debug, Clone)]
pub struct DeviceChangeEvent {
    pub kind: DeviceEventKind,
    pub interface_class: Uuid,
    pub symbolic_name: Option<String>,
}

/// Filters hot-plug events down to one interface class.
#[derive(Debug, Clone)]
pub struct DeviceNotificationFilter {
    category: Uuid,
}

impl DeviceNotificationFilter {
    pub fn new(category: Uuid) -> Self {
        Self { category }
    }

    /// For capture devices specifically.
    pub fn video_capture() -> Self {
        Self::new(VIDEO_CAPTURE_CLASS)
    }

    /// Whether `event` is an arrival or removal of the watched class.
    /// Everything else (volume changes, other device types) is noise.
    pub fn is_relevant(&self, event: &DeviceChangeEvent) -> bool {
        matches!(
            event.kind,
            DeviceEventKind::Arrival | DeviceEventKind::RemoveComplete
        ) && event.interface_class == self.category
    }
}

/// Connect/disconnect events emitted by the polling monitor. The
/// payload is the device's symbolic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(String),
    Disconnected(String),
}

/// Polling device monitor.
///
/// Spawns a tokio task that re-enumerates every `poll_interval` and
/// diffs against the last scan. Callers poll or await events and decide
/// what a disconnect means for their session (usually via
/// [`crate::session::CaptureSession::check_device_lost`]).
pub struct DeviceMonitor {
    enumerator: Arc<dyn DeviceEnumerator>,
    poll_interval: Duration,
    known_devices: Arc<RwLock<HashMap<String, DeviceDescriptor>>>,
    event_sender: mpsc::UnboundedSender<DeviceEvent>,
    event_receiver: Arc<RwLock<mpsc::UnboundedReceiver<DeviceEvent>>>,
    is_monitoring: Arc<RwLock<bool>>,
}

impl DeviceMonitor {
    pub fn new(enumerator: Arc<dyn DeviceEnumerator>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            enumerator,
            poll_interval: Duration::from_secs(2),
            known_devices: Arc::new(RwLock::new(HashMap::new())),
            event_sender: tx,
            event_receiver: Arc::new(RwLock::new(rx)),
            is_monitoring: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the polling task. No-op if already monitoring.
    pub async fn start_monitoring(&self) -> Result<(), CaptureError> {
        let mut is_monitoring = self.is_monitoring.write().await;
        if *is_monitoring {
            return Ok(());
        }

        // Seed the device map so the first poll doesn't report every
        // present device as newly connected.
        let initial = self.enumerator.enumerate()?;
        {
            let mut known = self.known_devices.write().await;
            known.clear();
            for device in initial {
                known.insert(device.symbolic_name.clone(), device);
            }
        }

        log::info!("device monitoring started");
        *is_monitoring = true;

        let enumerator = Arc::clone(&self.enumerator);
        let known_devices = Arc::clone(&self.known_devices);
        let event_sender = self.event_sender.clone();
        let monitoring = Arc::clone(&self.is_monitoring);
        let interval = self.poll_interval;

        tokio::spawn(async move {
            while *monitoring.read().await {
                tokio::time::sleep(interval).await;

                let devices = match enumerator.enumerate() {
                    Ok(devices) => devices,
                    Err(err) => {
                        log::debug!("device scan failed: {err}");
                        continue;
                    }
                };

                let mut known = known_devices.write().await;
                let current: HashMap<String, DeviceDescriptor> = devices
                    .into_iter()
                    .map(|d| (d.symbolic_name.clone(), d))
                    .collect();

                for symbolic in known.keys() {
                    if !current.contains_key(symbolic) {
                        log::info!("device disconnected: {symbolic}");
                        let _ = event_sender.send(DeviceEvent::Disconnected(symbolic.clone()));
                    }
                }
                for symbolic in current.keys() {
                    if !known.contains_key(symbolic) {
                        log::info!("device connected: {symbolic}");
                        let _ = event_sender.send(DeviceEvent::Connected(symbolic.clone()));
                    }
                }

                *known = current;
            }
        });

        Ok(())
    }

    /// Stop the polling task after its current sleep.
    pub async fn stop_monitoring(&self) {
        let mut is_monitoring = self.is_monitoring.write().await;
        if *is_monitoring {
            log::info!("device monitoring stopped");
            *is_monitoring = false;
        }
    }

    /// Next pending event, non-blocking.
    pub async fn poll_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.event_receiver.write().await;
        rx.try_recv().ok()
    }

    /// Wait for the next event.
    pub async fn wait_for_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.event_receiver.write().await;
        rx.recv().await
    }

    /// Devices seen in the most recent scan.
    pub async fn known_devices(&self) -> Vec<DeviceDescriptor> {
        let known = self.known_devices.read().await;
        known.values().cloned().collect()
    }
}
