use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use anc_client::capture::{AudioBackend, CpalBackend, SyntheticBackend};
use anc_client::render::svg;
use anc_client::session::SessionController;
use anc_client::settings::{Cli, ClientSettings};
use anc_client::state::SessionState;
use anc_client::ui::{Controls, EventLog, LogLevel, MetricsReadout};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = ClientSettings::load(&cli).context("Failed to load settings")?;
    info!("Starting ANC client against {}", settings.server_url);

    let backend: Box<dyn AudioBackend> = match settings.synthetic_tone_hz {
        Some(hz) => {
            info!("Using a synthetic {} Hz tone instead of audio devices", hz);
            Box::new(SyntheticBackend::new(hz))
        }
        None => Box::new(CpalBackend::new()),
    };

    let snapshot_path = settings.snapshot_path.clone();
    let mut log = EventLog::new(settings.log_capacity);
    let (mut controller, mut notifications) =
        SessionController::new(settings, backend).context("Failed to create session")?;

    controller.connect().await.context("Failed to connect")?;
    controller.start().context("Failed to start processing")?;
    report_status(&controller);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut status = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
            Some(notification) = notifications.recv() => {
                if log.record(&notification.event) {
                    if let Some(entry) = log.last() {
                        match entry.level {
                            LogLevel::Error => error!("{}", entry),
                            LogLevel::Warning => warn!("{}", entry),
                            LogLevel::Info | LogLevel::Success => info!("{}", entry),
                        }
                    }
                }
                controller.handle(&notification).await;
                if controller.state() == SessionState::Idle {
                    warn!("Session ended");
                    break;
                }
            }
            _ = status.tick() => report_status(&controller),
        }
    }

    if let Some(path) = snapshot_path {
        let document = controller
            .render()
            .with_surfaces(|surfaces| svg::render_document(&[&surfaces.waveform, &surfaces.spectrum]));
        std::fs::write(&path, document)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        info!("Wrote visualization snapshot to {}", path.display());
    }

    controller.disconnect().await;
    Ok(())
}

fn report_status(controller: &SessionController) {
    let controls = Controls::for_state(controller.state());
    match controller.stream() {
        Some(stream) => {
            let readout = MetricsReadout::from(&stream.metrics());
            info!(
                rms = %readout.rms,
                peak = %readout.peak,
                dominant = %readout.dominant_freq,
                volume = controller.output_volume(),
                "{}",
                controls.status
            );
        }
        None => info!("{}", controls.status),
    }
}
