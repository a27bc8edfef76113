mod args;
mod shell;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};
use tracing::{error, info, warn};
use weather_host::{
    acquisition::{AcquisitionLoop, Outcome},
    channel::{data_channel, signal_channel},
    device::{DeviceLink, WIRE_VERSION},
    store::{HistogramSet, RECORD_FILE_NAME, RecordLog, RecordLogView},
    telemetry,
};

use crate::shell::{Shell, ShellEnd, spawn_stdin_reader};

/// The sensor resets when the port opens; give it a moment before the first poll.
const STARTUP_SETTLE: Duration = Duration::from_secs(1);

/// How long `exit` waits for acquisition to stop before abandoning it. One signal wait plus
/// one poll round trip is enough unless the sensor has stalled.
const EXIT_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init(&args.log) {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    if let Err(e) = run(args).await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run(args: Args) -> Result<()> {
    let device = DeviceLink::open_serial(&args.serial, args.baud)
        .context("failed to open sensor link")?;

    let histograms = HistogramSet::open(&args.data_dir).context("failed to open histograms")?;
    let record_path = args.data_dir.join(RECORD_FILE_NAME);
    let records = RecordLog::create(&record_path).context("failed to create record log")?;

    // Read-only mappings for the shell, opened after the writer has sized the files.
    let histogram_views =
        HistogramSet::open_view(&args.data_dir).context("failed to open histogram views")?;
    let record_view = RecordLogView::open(&record_path).context("failed to open record view")?;

    let (signal_tx, signal_rx) = signal_channel();
    let (data_tx, data_rx) = data_channel();

    info!(
        serial = %args.serial,
        data_dir = ?args.data_dir,
        wire_version = WIRE_VERSION,
        "initializing host-side processes"
    );
    sleep(STARTUP_SETTLE).await;

    let mut acquisition = tokio::spawn(
        AcquisitionLoop::new(device, signal_rx, data_tx, histograms, records).run(),
    );
    let shell = Shell::new(
        signal_tx,
        data_rx,
        histogram_views,
        record_view,
        spawn_stdin_reader(),
    );

    let outcome = tokio::select! {
        joined = &mut acquisition => Some(joined.context("acquisition task panicked")??),
        end = shell.run() => {
            let end = end.context("operator shell failed")?;
            wait_for_acquisition(acquisition, end).await?
        }
    };

    match outcome {
        Some(Outcome::Completed { readings }) => info!(readings, "done with acquisition loop"),
        Some(Outcome::Exited { readings }) => info!(readings, "exited by operator"),
        None => info!("exited by operator"),
    }

    Ok(())
}

/// After end of input acquisition runs headless to completion. After `exit` it gets
/// `EXIT_GRACE` to notice and is abandoned otherwise, e.g. when stuck on a silent sensor.
async fn wait_for_acquisition(
    mut acquisition: JoinHandle<Result<Outcome>>,
    end: ShellEnd,
) -> Result<Option<Outcome>> {
    let joined = match end {
        ShellEnd::EndOfInput => acquisition.await,
        ShellEnd::Exit => match timeout(EXIT_GRACE, &mut acquisition).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(grace = ?EXIT_GRACE, "acquisition did not stop; abandoning it");
                acquisition.abort();
                return Ok(None);
            }
        },
    };

    Ok(Some(joined.context("acquisition task panicked")??))
}
