use anyhow::{Context, Result};
use std::time::Instant;
use tablet_core::config::{resolve_config_path, ScreenConfig};
use tablet_core::{Config, DisplayState, FaceDetector};
use tablet_hw::{Backlight, Display, NullDisplay};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod coordinator;
mod engine;
mod keys;
mod mqtt;
mod screen;
mod state;
mod webview;

use coordinator::{Coordinator, Event, Flow};
use engine::{CameraProbe, SamplerHandle};
use keys::ShortcutMap;
use state::SharedState;
use webview::KioskBrowser;

const EVENT_QUEUE: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = resolve_config_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "tabletd starting"
    );

    let state = SharedState::new(
        DisplayState {
            brightness: config.screen.normal_brightness,
            powered: true,
        },
        config.presence_detection.enabled,
    );
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE);

    let display = open_display(&config.screen);
    let sampler = start_sampler(&config, state.clone(), events_tx.clone())?;

    let bridge = config
        .mqtt
        .enabled
        .then(|| mqtt::spawn_bridge(&config.mqtt, state.clone(), events_tx.clone()));
    let publisher = bridge.as_ref().map(mqtt::Bridge::publisher);

    keys::spawn_key_reader(ShortcutMap::from_config(&config.shortcuts), events_tx.clone())
        .context("failed to spawn shortcut reader")?;

    let signal_tx = events_tx.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(err) => tracing::error!(error = %err, "signal handler failed"),
        }
        let _ = signal_tx.send(Event::Shutdown).await;
    });
    drop(events_tx);

    let webview = KioskBrowser::new(&config.web_view);
    let mut coordinator = Coordinator::new(
        config,
        display,
        webview,
        publisher,
        state,
        sampler.is_some(),
    );
    coordinator.start();
    tracing::info!("tabletd ready");

    while let Some(event) = events_rx.recv().await {
        if coordinator.handle(event, Instant::now()) == Flow::Quit {
            break;
        }
    }

    tracing::info!("tabletd shutting down");
    if let Some(sampler) = sampler {
        // Joining waits out an in-flight camera read.
        if tokio::task::spawn_blocking(move || sampler.stop())
            .await
            .is_err()
        {
            tracing::error!("sampler shutdown task failed");
        }
    }
    coordinator.stop();
    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    tracing::info!("tabletd stopped");

    Ok(())
}

/// Configured backlight, else the first one found, else log-only.
fn open_display(config: &ScreenConfig) -> Box<dyn Display> {
    let backlight = match &config.backlight {
        Some(name) => Backlight::open(name),
        None => Backlight::discover(),
    };
    match backlight {
        Ok(backlight) => {
            tracing::info!(display = %backlight.name(), "using backlight");
            Box::new(backlight)
        }
        Err(err) => {
            tracing::warn!(error = %err, "no usable backlight; screen changes will only be logged");
            Box::new(NullDisplay)
        }
    }
}

/// Load the model and start sampling. A missing model is fatal only when
/// detection starts enabled; otherwise detection just cannot be turned on.
fn start_sampler(
    config: &Config,
    state: SharedState,
    events: mpsc::Sender<Event>,
) -> Result<Option<SamplerHandle>> {
    let pd = &config.presence_detection;
    let detector = match FaceDetector::load(&pd.model_path) {
        Ok(detector) => detector,
        Err(err) if pd.enabled => {
            return Err(err).with_context(|| {
                format!("failed to load face model {}", pd.model_path.display())
            });
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                "face model unavailable; presence detection cannot be enabled"
            );
            return Ok(None);
        }
    };

    let probe = CameraProbe::new(&pd.camera_device, detector, pd.detection_confidence);
    let handle = engine::spawn_sampler(probe, pd.check_interval(), state, events)
        .context("failed to spawn sampler thread")?;
    Ok(Some(handle))
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
