//! Organ sound server
//!
//! Listens for key, stop, mode, transpose and volume commands from an organ
//! console and plays them on a SoundFont synthesizer or MIDI tone generator.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use organsound::config::{AppConfig, SynthBackend, SynthConfig};
use organsound::organ::Organ;
use organsound::sink::{ConsoleSink, MidiOutSink, SoundSink, SoundfontSink};
use organsound::transport::{MidiManualInput, MqttTransport};
use organsound::{paths, ports, OrganServer};

/// Organ sound server - voices console keys and stops on a synthesizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (searched for when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log lifecycle details
    #[arg(short, long)]
    verbose: bool,

    /// Log every key, stop and note
    #[arg(short, long)]
    debug: bool,

    /// Log level (error, warn, info, debug, trace); overrides -v/-d
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Play a short chord at startup to check the synthesizer
    #[arg(long)]
    test_synth: bool,
}

impl Args {
    fn log_level(&self) -> &str {
        match (&self.log_level, self.debug, self.verbose) {
            (Some(level), _, _) => level,
            (None, true, _) => "trace",
            (None, false, true) => "debug",
            (None, false, false) => "info",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.log_level())?;

    if args.list_ports {
        ports::list_ports_formatted();
        return Ok(());
    }

    let config_path = match args.config.clone() {
        Some(path) => path,
        None => paths::find_config_file().context(
            "No configuration file found (use --config or create organ.yaml)",
        )?,
    };
    info!("Using config file: {}", config_path.display());

    let config = AppConfig::load(&config_path).await?;
    let console = config.local_console()?.clone();
    info!(
        "This is server {} in the range 0-{}",
        config.local.this_console,
        config.consoles.len().saturating_sub(1)
    );

    let sink = build_sink(&config.synth);
    let organ = Organ::new(sink, Box::new(console.clone()), config.global.num_keyboards)
        .context("Failed to initialise the organ")?;
    let mut server = OrganServer::new(organ);
    info!(
        "{} manuals, instrument '{}' with {} stops",
        server.organ().num_keyboards(),
        server.organ().profile().mode(),
        server.organ().profile().stop_count()
    );

    if args.test_synth {
        play_test_chord(server.organ_mut().sink_mut().as_mut()).await;
    }

    let (tx, rx) = mpsc::channel(1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mqtt_task = match (&config.global.mqtt, &console.topic) {
        (Some(mqtt), Some(topic)) => {
            let client_id = format!("Server{}", config.console_section_name());
            let transport = MqttTransport::new(client_id, &mqtt.broker, mqtt.port, topic.clone());
            info!("Listening for console events on topic '{}'", transport.topic());
            Some(transport.spawn(tx.clone(), shutdown_rx.clone()))
        }
        _ => None,
    };

    let mut manuals = Vec::new();
    for input in &config.manuals {
        match MidiManualInput::connect(&input.port, input.manual, tx.clone()) {
            Ok(conn) => manuals.push(conn),
            Err(e) => warn!("Manual {} unavailable: {:#}", input.manual, e),
        }
    }
    // Without any transport, hold the queue open so the server idles until shutdown
    let _idle = if mqtt_task.is_none() && manuals.is_empty() {
        warn!("No transport configured; waiting for shutdown signal");
        Some(tx)
    } else {
        drop(tx);
        None
    };

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let result = server.run(rx, shutdown_rx).await;

    for input in manuals {
        info!("Closing manual {} ({})", input.manual(), input.port_name());
    }
    if let Some(task) = mqtt_task {
        if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
            warn!("MQTT transport did not stop in time");
        }
    }

    info!("Organ sound server stopped");
    result
}

fn build_sink(config: &SynthConfig) -> Box<dyn SoundSink> {
    match config.backend {
        SynthBackend::Soundfont => Box::new(SoundfontSink::new()),
        SynthBackend::Midi => Box::new(MidiOutSink::new(
            config.midi_port.clone().unwrap_or_default(),
        )),
        SynthBackend::Console => Box::new(ConsoleSink::new()),
    }
}

async fn play_test_chord(sink: &mut dyn SoundSink) {
    info!("Testing synth");
    let chord = [60, 67, 76];
    for note in chord {
        sink.trigger_note(1, note, 30);
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    for note in chord {
        sink.release_note(1, note);
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal caught");
}
