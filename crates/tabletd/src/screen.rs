use tablet_core::config::ScreenConfig;
use tablet_core::{DisplayState, Presence, ScreenAction};
use tablet_hw::Display;

/// Applies brightness and power to a [`Display`].
///
/// Calls are idempotent: a request matching what was last applied does not
/// touch the hardware again. Hardware failures are logged and the requested
/// state is kept anyway, but it only counts as applied once a write succeeds,
/// so the next request for the same value tries the hardware again.
pub struct ScreenController<D: Display> {
    display: D,
    state: DisplayState,
    brightness_applied: bool,
    power_applied: bool,
    normal_brightness: u8,
    absent_action: ScreenAction,
}

impl<D: Display> ScreenController<D> {
    pub fn new(display: D, config: &ScreenConfig) -> Self {
        Self {
            display,
            state: DisplayState {
                brightness: config.normal_brightness,
                powered: true,
            },
            brightness_applied: false,
            power_applied: false,
            normal_brightness: config.normal_brightness,
            absent_action: config.absent_action(),
        }
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    /// Set brightness in percent; values above 100 are clamped.
    pub fn set_brightness(&mut self, level: u8) -> DisplayState {
        let level = level.min(100);
        if self.brightness_applied && self.state.brightness == level {
            return self.state;
        }
        self.brightness_applied = match self.display.set_brightness(level) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    display = %self.display.name(),
                    level,
                    "set brightness failed"
                );
                false
            }
        };
        self.state.brightness = level;
        self.state
    }

    pub fn set_power(&mut self, on: bool) -> DisplayState {
        if self.power_applied && self.state.powered == on {
            return self.state;
        }
        self.power_applied = match self.display.set_power(on) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    display = %self.display.name(),
                    on,
                    "set power failed"
                );
                false
            }
        };
        self.state.powered = on;
        self.state
    }

    /// Put the screen in the configured state for `presence`.
    pub fn apply_presence(&mut self, presence: Presence) -> DisplayState {
        match (presence, self.absent_action) {
            (Presence::Present, ScreenAction::PowerOff) => {
                self.set_power(true);
                self.set_brightness(self.normal_brightness)
            }
            (Presence::Present, ScreenAction::Dim(_)) => {
                self.set_brightness(self.normal_brightness)
            }
            (Presence::Absent, ScreenAction::PowerOff) => self.set_power(false),
            (Presence::Absent, ScreenAction::Dim(level)) => self.set_brightness(level),
            (_, ScreenAction::Nothing) => self.state,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tablet_hw::DisplayError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum DisplayCall {
        Brightness(u8),
        Power(bool),
    }

    /// Records every hardware call; fails them while `fail` is set.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingDisplay {
        pub calls: Arc<Mutex<Vec<DisplayCall>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingDisplay {
        pub fn calls(&self) -> Vec<DisplayCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn result(&self) -> Result<(), DisplayError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DisplayError::NoBacklight("/test".into()));
            }
            Ok(())
        }
    }

    impl Display for RecordingDisplay {
        fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
            self.calls.lock().unwrap().push(DisplayCall::Brightness(level));
            self.result()
        }

        fn set_power(&mut self, on: bool) -> Result<(), DisplayError> {
            self.calls.lock().unwrap().push(DisplayCall::Power(on));
            self.result()
        }

        fn name(&self) -> String {
            "recording".into()
        }
    }

    fn config(turn_off: bool, dim: bool) -> ScreenConfig {
        ScreenConfig {
            turn_off_when_no_presence: turn_off,
            dim_brightness_when_no_presence: dim,
            dim_level: 20,
            normal_brightness: 90,
            backlight: None,
        }
    }

    #[test]
    fn test_brightness_is_idempotent() {
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(true, false));
        let first = screen.set_brightness(40);
        let second = screen.set_brightness(40);
        assert_eq!(first, second);
        assert_eq!(display.calls(), vec![DisplayCall::Brightness(40)]);
    }

    #[test]
    fn test_first_request_always_reaches_hardware() {
        // The initial state is only assumed, so matching it still applies.
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(true, false));
        screen.set_brightness(90);
        screen.set_power(true);
        assert_eq!(
            display.calls(),
            vec![DisplayCall::Brightness(90), DisplayCall::Power(true)]
        );
    }

    #[test]
    fn test_brightness_clamped() {
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(true, false));
        assert_eq!(screen.set_brightness(250).brightness, 100);
        assert_eq!(display.calls(), vec![DisplayCall::Brightness(100)]);
    }

    #[test]
    fn test_failure_keeps_requested_state() {
        let display = RecordingDisplay::default();
        display.set_failing(true);
        let mut screen = ScreenController::new(display.clone(), &config(true, false));
        let state = screen.set_power(false);
        assert!(!state.powered);
        assert_eq!(screen.set_brightness(10).brightness, 10);
    }

    #[test]
    fn test_failed_write_is_retried_on_same_request() {
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(true, false));
        display.set_failing(true);
        screen.set_power(false);
        screen.set_brightness(10);

        display.set_failing(false);
        screen.set_power(false);
        screen.set_brightness(10);
        // Applied now, so repeats stay off the hardware.
        screen.set_power(false);
        screen.set_brightness(10);
        assert_eq!(
            display.calls(),
            vec![
                DisplayCall::Power(false),
                DisplayCall::Brightness(10),
                DisplayCall::Power(false),
                DisplayCall::Brightness(10),
            ]
        );
    }

    #[test]
    fn test_turn_off_policy() {
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(true, true));
        let off = screen.apply_presence(Presence::Absent);
        assert!(!off.powered);
        let on = screen.apply_presence(Presence::Present);
        assert!(on.powered);
        assert_eq!(on.brightness, 90);
        assert_eq!(
            display.calls(),
            vec![
                DisplayCall::Power(false),
                DisplayCall::Power(true),
                DisplayCall::Brightness(90),
            ]
        );
    }

    #[test]
    fn test_dim_policy() {
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(false, true));
        assert_eq!(screen.apply_presence(Presence::Absent).brightness, 20);
        assert_eq!(screen.apply_presence(Presence::Present).brightness, 90);
        assert_eq!(
            display.calls(),
            vec![DisplayCall::Brightness(20), DisplayCall::Brightness(90)]
        );
    }

    #[test]
    fn test_no_policy_leaves_screen_alone() {
        let display = RecordingDisplay::default();
        let mut screen = ScreenController::new(display.clone(), &config(false, false));
        screen.apply_presence(Presence::Absent);
        screen.apply_presence(Presence::Present);
        assert!(display.calls().is_empty());
    }
}
