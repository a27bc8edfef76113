use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "WEATHER_SERIAL", default_value = "/dev/ttyACM0")]
    pub serial: String,

    #[arg(long, env = "WEATHER_BAUD", default_value_t = 9600)]
    pub baud: u32,

    #[arg(long, env = "WEATHER_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    #[arg(long, default_value = "info")]
    pub log: String,
}
