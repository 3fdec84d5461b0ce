//! State shared between the coordinator, the sampler thread and the MQTT
//! bridge. The coordinator is the only writer besides the detection flag;
//! the others read snapshots.

use std::sync::{Arc, Mutex, MutexGuard};
use tablet_core::{AppSelection, DisplayState, Presence};

/// Point-in-time copy of the shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub presence: Presence,
    pub display: DisplayState,
    pub app: AppSelection,
    pub detection_enabled: bool,
}

/// Clone-safe handle; all clones see the same state.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<Snapshot>>,
}

impl SharedState {
    pub fn new(display: DisplayState, detection_enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Snapshot {
                presence: Presence::Absent,
                display,
                app: AppSelection::HomeAssistant,
                detection_enabled,
            })),
        }
    }

    // A panic while holding the lock leaves plain-old-data behind, still usable.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Snapshot {
        *self.lock()
    }

    pub fn set_presence(&self, presence: Presence) {
        self.lock().presence = presence;
    }

    pub fn set_display(&self, display: DisplayState) {
        self.lock().display = display;
    }

    pub fn app(&self) -> AppSelection {
        self.lock().app
    }

    pub fn set_app(&self, app: AppSelection) {
        self.lock().app = app;
    }

    pub fn detection_enabled(&self) -> bool {
        self.lock().detection_enabled
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.lock().detection_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SharedState {
        SharedState::new(
            DisplayState {
                brightness: 100,
                powered: true,
            },
            true,
        )
    }

    #[test]
    fn test_initial_snapshot() {
        let snap = state().snapshot();
        assert_eq!(snap.presence, Presence::Absent);
        assert_eq!(snap.app, AppSelection::HomeAssistant);
        assert!(snap.detection_enabled);
    }

    #[test]
    fn test_clones_share_state() {
        let a = state();
        let b = a.clone();
        a.set_app(AppSelection::Cookbook);
        a.set_presence(Presence::Present);
        b.set_detection_enabled(false);
        assert_eq!(b.app(), AppSelection::Cookbook);
        assert_eq!(b.snapshot().presence, Presence::Present);
        assert!(!a.detection_enabled());
    }

    #[test]
    fn test_concurrent_writers() {
        let shared = state();
        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let s = shared.clone();
                std::thread::spawn(move || {
                    for level in 0..100u8 {
                        s.set_display(DisplayState {
                            brightness: level,
                            powered: i % 2 == 0,
                        });
                        let _ = s.snapshot();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.snapshot().display.brightness, 99);
    }
}
