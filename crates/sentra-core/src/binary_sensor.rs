//! Binary-sensor entity adapters.
//!
//! Three shapes: the generic sensor mirroring a device's on/off flag,
//! the connectivity ("Online") sensor reading the online signal, and
//! the camera motion sensor with its 30 second cool-down.

use std::sync::Arc;
use std::time::Duration;

use sentra_api::DeviceHandle;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::classify::DeviceClass;
use crate::entity::{self, ChangeSignal, DeviceInfo};
use crate::timer::{self, TimerHandle};

/// Motion is held "on" for this long after the last event.
pub const MOTION_STOPPED_SECONDS: u64 = 30;

// ── Generic binary sensor ────────────────────────────────────────────

/// Mirrors a wireless sensor's on/off flag.
pub struct BinarySensor {
    handle: DeviceHandle,
    device_class: DeviceClass,
    change: ChangeSignal,
}

impl BinarySensor {
    pub fn new(handle: DeviceHandle, device_class: DeviceClass) -> Self {
        let change = ChangeSignal::new();
        // Re-render on every registry update for this device.
        entity::spawn_update_listener(handle.clone(), change_sender(&change));
        Self {
            handle,
            device_class,
            change,
        }
    }

    pub fn unique_id(&self) -> String {
        entity::unique_id(self.handle.key(), None)
    }

    pub fn name(&self) -> String {
        self.handle.current().display_name()
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_device(&self.handle.current())
    }

    pub fn is_on(&self) -> bool {
        self.handle.current().is_on().unwrap_or(false)
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.change.subscribe()
    }
}

// ── Connectivity sensor ──────────────────────────────────────────────

/// Reports a device's reachability. Diagnostic category, fixed name.
pub struct OnlineSensor {
    handle: DeviceHandle,
    change: ChangeSignal,
}

impl OnlineSensor {
    pub fn new(handle: DeviceHandle) -> Self {
        let change = ChangeSignal::new();
        entity::spawn_update_listener(handle.clone(), change_sender(&change));
        Self { handle, change }
    }

    pub fn unique_id(&self) -> String {
        entity::unique_id(self.handle.key(), Some("online"))
    }

    /// Fixed name; the host prefixes the device name.
    pub fn name(&self) -> &'static str {
        "Online"
    }

    pub fn device_class(&self) -> DeviceClass {
        DeviceClass::Connectivity
    }

    /// Shown under diagnostics rather than controls.
    pub fn is_diagnostic(&self) -> bool {
        true
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_device(&self.handle.current())
    }

    pub fn is_on(&self) -> bool {
        self.handle
            .current()
            .online
            .is_some_and(|signal| signal.is_online())
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.change.subscribe()
    }
}

// ── Camera motion sensor ─────────────────────────────────────────────

struct MotionState {
    last_motion: Option<Instant>,
    /// At most one pending stop timer. A new event cancels and
    /// reschedules it.
    stop_timer: Option<TimerHandle>,
}

/// Camera motion with a cool-down: `is_on` for 30 seconds after the
/// latest motion event, then cleared by the stop timer.
pub struct MotionSensor {
    handle: DeviceHandle,
    state: Arc<Mutex<MotionState>>,
    change: Arc<ChangeSignal>,
}

impl MotionSensor {
    pub fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            state: Arc::new(Mutex::new(MotionState {
                last_motion: None,
                stop_timer: None,
            })),
            change: Arc::new(ChangeSignal::new()),
        }
    }

    pub fn unique_id(&self) -> String {
        entity::unique_id(self.handle.key(), None)
    }

    pub fn name(&self) -> String {
        format!("{} Motion", self.handle.current().display_name())
    }

    pub fn device_class(&self) -> DeviceClass {
        DeviceClass::Motion
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::from_device(&self.handle.current())
    }

    pub async fn is_on(&self) -> bool {
        let state = self.state.lock().await;
        state.last_motion.is_some_and(|at| {
            at.elapsed() < Duration::from_secs(MOTION_STOPPED_SECONDS)
        })
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<u64> {
        self.change.subscribe()
    }

    /// Handle a motion event: record the timestamp, reschedule the stop
    /// timer, notify.
    pub async fn on_motion(&self) {
        let mut state = self.state.lock().await;
        state.last_motion = Some(Instant::now());

        if let Some(timer) = state.stop_timer.take() {
            timer.cancel();
        }

        let stop_state = Arc::clone(&self.state);
        let stop_change = Arc::clone(&self.change);
        let key = self.handle.key();

        state.stop_timer = Some(timer::schedule(
            Duration::from_secs(MOTION_STOPPED_SECONDS),
            move || {
                debug!(device = %key, "motion stopped");
                // The timer fired uncancelled: clear the state. A lock
                // held elsewhere is released promptly; spawn to avoid
                // blocking the timer task on it.
                tokio::spawn(async move {
                    let mut state = stop_state.lock().await;
                    state.last_motion = None;
                    state.stop_timer = None;
                    drop(state);
                    stop_change.notify();
                });
            },
        ));
        drop(state);

        self.change.notify();
    }

    /// Teardown: unconditionally cancel any pending stop timer.
    pub async fn shutdown(&self) {
        if let Some(timer) = self.state.lock().await.stop_timer.take() {
            timer.cancel();
        }
    }
}

fn change_sender(change: &ChangeSignal) -> tokio::sync::watch::Sender<u64> {
    change.sender()
}
