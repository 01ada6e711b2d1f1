use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use vrinteract::activation::TracingHapticSink;
use vrinteract::config::InteractionConfig;
use vrinteract::host::{FrameDriver, HostSettings, ReplaySession};
use vrinteract::system::{FrameReport, InteractionSystem, SemanticEvent};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let mut args = std::env::args().skip(1);
    let session_path = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("Usage: vrinteract-replay <session.toml> [interaction.toml]"))?;
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(InteractionConfig::default_path);

    let config = InteractionConfig::load_or_default(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load config {:?}: {}", config_path, e))?;
    let session = ReplaySession::load(&session_path)
        .await
        .map_err(|e| eyre!("Failed to load session {:?}: {}", session_path, e))?;

    let system = InteractionSystem::new(config, Box::new(TracingHapticSink))
        .map_err(|e| eyre!("Invalid interaction config: {}", e))?;

    let (input_sender, input_receiver) = mpsc::channel(1000);
    let (report_sender, mut report_receiver) = mpsc::channel(16);
    let mut driver = FrameDriver::create(
        system,
        input_receiver,
        report_sender,
        HostSettings::default(),
    );

    info!("Replaying {} frames", session.total_frames());
    let mut total_events = 0;
    for frame in &session.frames {
        let dt = session.delta_for(frame);
        for input in frame.inputs.iter().cloned() {
            input_sender
                .send(input)
                .await
                .map_err(|e| eyre!("Failed to queue input: {}", e))?;
        }

        for _ in 0..=frame.idle_frames {
            driver = driver.step(dt).await?;
            let report = report_receiver
                .recv()
                .await
                .ok_or_else(|| eyre!("Report channel closed"))?;
            total_events += report.events.len();
            log_report(&report);
        }
    }

    info!(
        "Replay finished after {} frames with {} events",
        driver.system().frame(),
        total_events
    );
    Ok(())
}

fn log_report(report: &FrameReport) {
    if report.events.is_empty() {
        debug!("Frame {}: idle", report.frame);
        return;
    }
    for event in &report.events {
        match event {
            SemanticEvent::Alias(event) => debug!("Frame {}: {:?}", report.frame, event),
            SemanticEvent::Interaction(event) => info!("Frame {}: {:?}", report.frame, event),
            SemanticEvent::Activation(event) => info!("Frame {}: {:?}", report.frame, event),
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
