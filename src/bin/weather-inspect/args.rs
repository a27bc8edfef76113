use std::path::PathBuf;

use clap::{Parser, Subcommand};
use weather_host::store::Quantity;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "WEATHER_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "warn")]
    pub log: String,

    #[command(subcommand)]
    pub view: View,
}

#[derive(Debug, Subcommand)]
pub enum View {
    /// Hour-by-bucket table for one quantity (t, p or h)
    Hist { quantity: Quantity },

    /// Records written by the current run
    Record,
}
