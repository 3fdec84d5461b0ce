use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::path::PathBuf;
use std::time::Duration;
use tablet_core::config::resolve_config_path;
use tablet_core::{Command, CommandKind, Config, FaceDetector};
use tablet_hw::{Backlight, Camera, DeviceInfo, Display, Frame};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tabletctl", about = "tablet-ha kiosk diagnostics and remote control")]
struct Cli {
    /// Config file (default: $TABLET_CONFIG, then config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check config, camera, face model and display backend
    Check,
    /// List cameras and backlight devices
    Devices,
    /// Publish one command to the kiosk over MQTT
    Send {
        /// brightness, screen, switch_app or presence_detection
        command: String,
        /// e.g. 40, on, cookbook, toggle
        payload: String,
        /// Broker host (default: mqtt.broker from the config)
        #[arg(long)]
        broker: Option<String>,
        /// Broker port (default: mqtt.port from the config)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(resolve_config_path);

    match cli.command {
        Commands::Check => check(&config_path),
        Commands::Devices => {
            devices();
            Ok(())
        }
        Commands::Send {
            command,
            payload,
            broker,
            port,
        } => {
            let config = Config::load(&config_path)
                .with_context(|| format!("failed to load {}", config_path.display()))?;
            send(&config, &command, &payload, broker, port).await
        }
    }
}

fn check(config_path: &std::path::Path) -> Result<()> {
    let mut failures = 0;

    let config = match Config::load(config_path) {
        Ok(config) => {
            println!("config:  ok ({})", config_path.display());
            config
        }
        Err(err) => {
            println!("config:  FAILED {}: {err}", config_path.display());
            println!("         continuing with defaults");
            failures += 1;
            Config::default()
        }
    };
    let pd = &config.presence_detection;

    let frame = match capture_one(&pd.camera_device) {
        Ok((camera, frame)) => {
            println!(
                "camera:  ok {} {}x{} {:?}, mean luma {:.0}{}",
                camera.device_path,
                frame.width,
                frame.height,
                camera.pixel_format(),
                frame.mean_luma(),
                if frame.is_dark { " (dark frame)" } else { "" }
            );
            Some(frame)
        }
        Err(err) => {
            println!("camera:  FAILED {}: {err}", pd.camera_device);
            failures += 1;
            None
        }
    };

    match FaceDetector::load(&pd.model_path) {
        Ok(mut detector) => match frame {
            Some(frame) => match detector.detect(&frame.data, frame.width, frame.height) {
                Ok(confidence) => {
                    let verdict = if confidence >= pd.detection_confidence {
                        "face detected"
                    } else {
                        "no face"
                    };
                    println!(
                        "model:   ok confidence {confidence:.3} (threshold {:.2}): {verdict}",
                        pd.detection_confidence
                    );
                }
                Err(err) => {
                    println!("model:   FAILED inference: {err}");
                    failures += 1;
                }
            },
            None => println!("model:   ok {} (no frame to test)", pd.model_path.display()),
        },
        Err(err) => {
            println!("model:   FAILED {err}");
            failures += 1;
        }
    }

    let backlight = match &config.screen.backlight {
        Some(name) => Backlight::open(name),
        None => Backlight::discover(),
    };
    match backlight {
        Ok(backlight) => match backlight.read_brightness() {
            Ok(level) => println!("display: ok {} at {level}%", backlight.name()),
            Err(err) => {
                println!("display: FAILED {}: {err}", backlight.name());
                failures += 1;
            }
        },
        // Not fatal for the daemon; it falls back to logging only.
        Err(err) => println!("display: none ({err})"),
    }

    if config.home_assistant.token.is_empty() {
        println!("token:   not set");
    } else {
        println!("token:   set");
    }
    if config.mqtt.enabled {
        println!(
            "mqtt:    {}:{} prefix {}",
            config.mqtt.broker, config.mqtt.port, config.mqtt.topic_prefix
        );
    } else {
        println!("mqtt:    disabled");
    }

    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    println!("all checks passed");
    Ok(())
}

fn capture_one(device: &str) -> Result<(Camera, Frame)> {
    let camera = Camera::open(device)?;
    let frame = camera.capture_frame()?;
    Ok((camera, frame))
}

fn devices() {
    let cameras: Vec<DeviceInfo> = Camera::list_devices();
    if cameras.is_empty() {
        println!("cameras: none");
    } else {
        println!("cameras:");
        for cam in &cameras {
            println!("  {}  {} ({})", cam.path, cam.name, cam.driver);
        }
    }

    let backlights = Backlight::list();
    if backlights.is_empty() {
        println!("backlights: none");
    } else {
        println!("backlights:");
        for name in &backlights {
            println!("  {name}");
        }
    }
}

async fn send(
    config: &Config,
    command: &str,
    payload: &str,
    broker: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    // Reject what the kiosk would reject before touching the network.
    let kind = CommandKind::from_name(command)?;
    Command::parse(kind, payload)?;

    let mqtt = &config.mqtt;
    let broker = broker.unwrap_or_else(|| mqtt.broker.clone());
    let port = port.unwrap_or(mqtt.port);
    let topic = format!(
        "{}/command/{}",
        mqtt.topic_prefix.trim_matches('/'),
        kind.as_str()
    );

    let client_id = format!("tabletctl-{}", uuid::Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, broker.as_str(), port);
    options.set_keep_alive(SEND_TIMEOUT);
    if let Some((username, password)) = mqtt.credentials() {
        options.set_credentials(username, password);
    }

    tracing::debug!(broker = %broker, port, topic = %topic, "publishing command");
    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client
        .publish(topic.as_str(), QoS::AtLeastOnce, false, payload.trim().to_string())
        .await?;

    tokio::time::timeout(SEND_TIMEOUT, async {
        loop {
            if let Event::Incoming(Packet::PubAck(_)) = eventloop.poll().await? {
                return Ok::<_, rumqttc::ConnectionError>(());
            }
        }
    })
    .await
    .with_context(|| format!("no acknowledgement from {broker}:{port}"))??;

    client.disconnect().await?;
    // Flush the DISCONNECT; the broker closing the socket is expected.
    let _ = tokio::time::timeout(SEND_TIMEOUT, eventloop.poll()).await;

    println!("sent {topic} = {}", payload.trim());
    Ok(())
}
