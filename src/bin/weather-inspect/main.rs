mod args;

use anyhow::Context as _;
use args::{Args, View};
use clap::Parser as _;
use weather_host::{
    store::{HistogramSet, RECORD_FILE_NAME, RecordLogView},
    telemetry,
};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(&args.log)?;

    match args.view {
        View::Hist { quantity } => {
            let histograms = HistogramSet::open_view(&args.data_dir)
                .with_context(|| format!("failed to open histograms in {:?}", args.data_dir))?;
            println!("{}", quantity.label());
            print!("{}", histograms.get(quantity).render());
        }
        View::Record => {
            let path = args.data_dir.join(RECORD_FILE_NAME);
            let records = RecordLogView::open(&path)
                .with_context(|| format!("failed to open record log: {path:?}"))?;
            let mut total = 0;
            for record in records.records() {
                print!("{record}");
                total += 1;
            }
            println!("{total} records in {path:?}");
        }
    }

    Ok(())
}
