use crate::keys::Shortcut;
use crate::mqtt::{StatePublisher, StateUpdate};
use crate::screen::ScreenController;
use crate::state::SharedState;
use crate::webview::WebView;
use std::time::Instant;
use tablet_core::{AppSelection, Command, Config, FaceSignal, Presence, PresenceTracker};
use tablet_hw::Display;

/// Everything the coordinator reacts to. Producers: the sampler thread
/// (`Detection`), the MQTT bridge (`Remote`), the key reader (`Shortcut`)
/// and the signal handler (`Shutdown`).
#[derive(Debug)]
pub enum Event {
    Detection(FaceSignal),
    Remote(Command),
    Shortcut(Shortcut),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owns the presence tracker, the screen and the web view. Runs on the
/// main task and is the only place side effects happen, so none of its
/// parts need their own locking.
pub struct Coordinator<D: Display, W: WebView, P: StatePublisher> {
    config: Config,
    tracker: PresenceTracker,
    screen: ScreenController<D>,
    webview: W,
    publisher: P,
    state: SharedState,
    /// False when the face model failed to load and no sampler runs.
    detection_available: bool,
}

impl<D: Display, W: WebView, P: StatePublisher> Coordinator<D, W, P> {
    pub fn new(
        config: Config,
        display: D,
        webview: W,
        publisher: P,
        state: SharedState,
        detection_available: bool,
    ) -> Self {
        let tracker = PresenceTracker::new(config.presence_detection.presence_timeout());
        let screen = ScreenController::new(display, &config.screen);
        Self {
            config,
            tracker,
            screen,
            webview,
            publisher,
            state,
            detection_available,
        }
    }

    /// Show the initial app and put the screen in its startup state.
    ///
    /// With detection on, presence starts absent and the screen takes its
    /// absent configuration until someone is seen. With detection off the
    /// screen is left on at normal brightness.
    pub fn start(&mut self) {
        self.load_app(self.state.app());

        let presence = self.tracker.state();
        self.state.set_presence(presence);
        let screen_presence = if self.state.detection_enabled() {
            presence
        } else {
            Presence::Present
        };
        let before = self.screen.state();
        let display_state = self.screen.apply_presence(screen_presence);
        self.state.set_display(display_state);
        // The bridge may already have published its connect-time snapshot.
        if display_state.brightness != before.brightness {
            self.publisher
                .publish(StateUpdate::Brightness(display_state.brightness));
        }

        tracing::info!(
            presence = presence.as_payload(),
            brightness = display_state.brightness,
            powered = display_state.powered,
            detection = self.state.detection_enabled(),
            "coordinator started"
        );
    }

    pub fn handle(&mut self, event: Event, now: Instant) -> Flow {
        match event {
            Event::Detection(signal) => self.on_detection(signal, now),
            Event::Remote(command) => self.on_command(command, now),
            Event::Shortcut(Shortcut::SwitchApp) => {
                self.switch_to(self.state.app().toggled());
            }
            Event::Shortcut(Shortcut::ToggleFullscreen) => {
                let fullscreen = !self.webview.is_fullscreen();
                tracing::info!(fullscreen, "toggling fullscreen");
                self.webview.set_fullscreen(fullscreen);
            }
            Event::Shortcut(Shortcut::Quit) | Event::Shutdown => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Close the web view. The bridge is shut down by the caller.
    pub fn stop(&mut self) {
        self.webview.close();
    }

    fn on_detection(&mut self, signal: FaceSignal, now: Instant) {
        // A tick already in flight when detection was switched off.
        if !self.state.detection_enabled() {
            return;
        }
        if let Some(presence) = self.tracker.observe(&signal, now) {
            self.on_presence_change(presence);
        }
    }

    fn on_presence_change(&mut self, presence: Presence) {
        tracing::info!(presence = presence.as_payload(), "presence changed");
        self.state.set_presence(presence);

        let before = self.screen.state();
        let after = self.screen.apply_presence(presence);
        self.state.set_display(after);

        self.publisher.publish(StateUpdate::Presence(presence));
        if after.brightness != before.brightness {
            self.publisher.publish(StateUpdate::Brightness(after.brightness));
        }
    }

    fn on_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::Brightness(level) => {
                let display = self.screen.set_brightness(level);
                self.state.set_display(display);
                self.publisher
                    .publish(StateUpdate::Brightness(display.brightness));
            }
            Command::Screen(on) => {
                let display = self.screen.set_power(on);
                self.state.set_display(display);
            }
            Command::SwitchApp(target) => {
                self.switch_to(target.resolve(self.state.app()));
            }
            Command::PresenceDetection(true) if !self.detection_available => {
                tracing::warn!("presence detection requested but no face model is loaded");
                self.state.set_detection_enabled(false);
                self.publisher
                    .publish(StateUpdate::PresenceDetection(false));
            }
            Command::PresenceDetection(enabled) => {
                if enabled && !self.state.detection_enabled() {
                    self.tracker.resume(now);
                }
                tracing::info!(enabled, "presence detection switched");
                self.state.set_detection_enabled(enabled);
                self.publisher
                    .publish(StateUpdate::PresenceDetection(enabled));
            }
        }
    }

    fn switch_to(&mut self, app: AppSelection) {
        self.load_app(app);
        self.publisher.publish(StateUpdate::CurrentApp(app));
    }

    fn load_app(&mut self, app: AppSelection) {
        let url = self.config.url_for(app).to_string();
        tracing::info!(app = app.as_str(), url = %url, "loading app");
        self.webview.load(&url);
        self.state.set_app(app);
    }
}
