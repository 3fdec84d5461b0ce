use crate::coordinator::Event;
use crate::state::SharedState;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tablet_core::detector::DetectorError;
use tablet_core::{FaceDetector, FaceSignal};
use tablet_hw::{Camera, CameraError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// One presence sample per call. Blocking; runs on the sampler thread.
pub trait PresenceProbe: Send + 'static {
    fn probe(&mut self) -> Result<FaceSignal, EngineError>;

    /// Free the capture device while detection is switched off.
    fn release(&mut self) {}
}

/// Camera + UltraFace probe.
///
/// The camera is opened lazily and dropped after a failed read, so an
/// unplugged or busy webcam is retried on every tick.
pub struct CameraProbe {
    device: String,
    camera: Option<Camera>,
    detector: FaceDetector,
    threshold: f32,
}

impl CameraProbe {
    pub fn new(device: &str, detector: FaceDetector, threshold: f32) -> Self {
        Self {
            device: device.to_string(),
            camera: None,
            detector,
            threshold,
        }
    }
}

impl PresenceProbe for CameraProbe {
    fn probe(&mut self) -> Result<FaceSignal, EngineError> {
        let camera = match self.camera.take() {
            Some(camera) => camera,
            None => Camera::open(&self.device)?,
        };
        let frame = camera.capture_frame()?;
        self.camera = Some(camera);

        if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "dark frame; counting as not seen");
            return Ok(FaceSignal::missed());
        }

        let confidence = self
            .detector
            .detect(&frame.data, frame.width, frame.height)?;
        tracing::trace!(seq = frame.sequence, confidence, "detection tick");
        Ok(FaceSignal::from_confidence(confidence, self.threshold))
    }

    fn release(&mut self) {
        if self.camera.take().is_some() {
            tracing::info!(device = %self.device, "camera released");
        }
    }
}

/// Handle to the sampler thread. Dropping it stops the thread without
/// waiting; [`SamplerHandle::stop`] also joins it.
pub struct SamplerHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn stop(mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("sampler thread panicked");
            }
        }
    }
}

/// Spawn the sampler on a dedicated OS thread.
///
/// Every `interval` the probe is sampled (when detection is enabled) and the
/// result handed to the coordinator with a non-blocking send. A tick that
/// overruns the interval is followed immediately by the next one; ticks that
/// find the event queue full are dropped, so samples never pile up.
pub fn spawn_sampler<P: PresenceProbe>(
    mut probe: P,
    interval: Duration,
    state: SharedState,
    events: mpsc::Sender<Event>,
) -> std::io::Result<SamplerHandle> {
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let thread = std::thread::Builder::new()
        .name("tablet-sampler".into())
        .spawn(move || {
            tracing::info!(interval_ms = interval.as_millis() as u64, "sampler started");
            let mut released = false;
            loop {
                let started = Instant::now();

                if state.detection_enabled() {
                    released = false;
                    let signal = match probe.probe() {
                        Ok(signal) => signal,
                        Err(err) => {
                            tracing::warn!(error = %err, "detection tick failed; counting as not seen");
                            FaceSignal::missed()
                        }
                    };
                    match events.try_send(Event::Detection(signal)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::debug!("event queue full; dropping detection tick");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                } else if !released {
                    probe.release();
                    released = true;
                }

                let elapsed = started.elapsed();
                if elapsed > interval {
                    tracing::debug!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "detection tick overran interval"
                    );
                }
                match stop_rx.recv_timeout(interval.saturating_sub(elapsed)) {
                    Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            probe.release();
            tracing::info!("sampler exiting");
        })?;

    Ok(SamplerHandle {
        stop_tx: Some(stop_tx),
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tablet_core::DisplayState;

    /// Plays back a fixed script, then reports "not seen" forever.
    struct ScriptedProbe {
        script: Arc<Mutex<VecDeque<Result<FaceSignal, EngineError>>>>,
        releases: Arc<AtomicUsize>,
    }

    impl PresenceProbe for ScriptedProbe {
        fn probe(&mut self) -> Result<FaceSignal, EngineError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(FaceSignal::missed()))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn probe(script: Vec<Result<FaceSignal, EngineError>>) -> (ScriptedProbe, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        (
            ScriptedProbe {
                script: Arc::new(Mutex::new(script.into())),
                releases: releases.clone(),
            },
            releases,
        )
    }

    fn state(enabled: bool) -> SharedState {
        SharedState::new(
            DisplayState {
                brightness: 100,
                powered: true,
            },
            enabled,
        )
    }

    fn detection(event: Event) -> FaceSignal {
        match event {
            Event::Detection(signal) => signal,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_failed_probe_counts_as_missed() {
        let (probe, _) = probe(vec![
            Ok(FaceSignal::from_confidence(0.9, 0.5)),
            Err(EngineError::Camera(CameraError::DeviceBusy("/dev/video0".into()))),
        ]);
        let (tx, mut rx) = mpsc::channel(8);
        let handle =
            spawn_sampler(probe, Duration::from_millis(5), state(true), tx).unwrap();

        let first = detection(rx.blocking_recv().unwrap());
        let second = detection(rx.blocking_recv().unwrap());
        handle.stop();

        assert!(first.seen);
        assert_eq!(second, FaceSignal::missed());
    }

    #[test]
    fn test_disabled_detection_releases_and_stays_quiet() {
        let (probe, releases) = probe(vec![Ok(FaceSignal::from_confidence(0.9, 0.5))]);
        let (tx, mut rx) = mpsc::channel(8);
        let handle =
            spawn_sampler(probe, Duration::from_millis(5), state(false), tx).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
        // Released once while disabled, not on every tick.
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        handle.stop();
    }

    #[test]
    fn test_full_queue_drops_ticks_instead_of_queueing() {
        let (probe, _) = probe(Vec::new());
        let (tx, mut rx) = mpsc::channel(1);
        let handle =
            spawn_sampler(probe, Duration::from_millis(2), state(true), tx).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        handle.stop();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stops_when_coordinator_gone() {
        let (probe, releases) = probe(Vec::new());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle =
            spawn_sampler(probe, Duration::from_millis(2), state(true), tx).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handle.stop();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
