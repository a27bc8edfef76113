use std::io::{self, BufRead as _, Write as _};
use std::str::FromStr;

use anyhow::{Context as _, Error, Result};
use memmap2::Mmap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use weather_host::{
    channel::{DataReceiver, SignalSender},
    command::Command,
    reading::Reading,
    store::{HistogramSet, Quantity, RecordLogView},
};

const MENU: &str = "Available commands:
\tpause
\tresume
\tblink X
\tenv
\trecord
\thist t
\thist p
\thist h
\texit
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Hist(Quantity),
    Record,
    Help,
}

impl FromStr for Input {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "record" => Ok(Input::Record),
            "help" => Ok(Input::Help),
            _ => match s.strip_prefix("hist ") {
                Some(quantity) => Ok(Input::Hist(quantity.trim().parse()?)),
                None => Ok(Input::Command(s.parse()?)),
            },
        }
    }
}

/// Why the operator shell stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEnd {
    Exit,
    EndOfInput,
}

/// Operator side of the controller: forwards commands and renders the shared stores.
pub struct Shell {
    signals: SignalSender,
    replies: DataReceiver,
    histograms: HistogramSet<Mmap>,
    records: RecordLogView,
    lines: mpsc::Receiver<String>,
    paused: bool,
}

impl Shell {
    pub fn new(
        signals: SignalSender,
        replies: DataReceiver,
        histograms: HistogramSet<Mmap>,
        records: RecordLogView,
        lines: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            signals,
            replies,
            histograms,
            records,
            lines,
            paused: false,
        }
    }

    /// Runs until the operator types `exit` or stdin closes.
    pub async fn run(mut self) -> Result<ShellEnd> {
        print!("{MENU}");
        loop {
            prompt();

            let Some(line) = self.lines.recv().await else {
                info!("stdin closed; operator shell stopping");
                return Ok(ShellEnd::EndOfInput);
            };

            let input = match line.parse::<Input>() {
                Ok(input) => input,
                Err(_) => {
                    print!("{MENU}");
                    continue;
                }
            };

            match input {
                Input::Command(Command::Exit) => {
                    self.signals.send(&Command::Exit).await?;
                    return Ok(ShellEnd::Exit);
                }
                // A paused loop does not poll, so the reply would never come.
                Input::Command(Command::Request) if self.paused => {
                    println!("\tacquisition is paused; resume before requesting a reading");
                }
                Input::Command(Command::Request) => {
                    self.signals.send(&Command::Request).await?;
                    let frame = self
                        .replies
                        .recv_reply()
                        .await
                        .context("failed to receive sensor reply")?;
                    match Reading::from_frame(&frame) {
                        Ok(reading) => match reading.measured_at() {
                            Ok(at) => println!("\tReply: {reading} ({at})"),
                            Err(_) => println!("\tReply: {reading}"),
                        },
                        Err(err) => warn!(%err, ?frame, "undecodable reply"),
                    }
                }
                Input::Command(command) => {
                    self.signals.send(&command).await?;
                    match command {
                        Command::Pause => self.paused = true,
                        Command::Resume => self.paused = false,
                        _ => {}
                    }
                }
                Input::Hist(quantity) => {
                    println!("{}", quantity.label());
                    print!("{}", self.histograms.get(quantity).render());
                }
                Input::Record => {
                    for record in self.records.records() {
                        print!("{record}");
                    }
                }
                Input::Help => print!("{MENU}"),
            }
        }
    }
}

fn prompt() {
    print!("-> ");
    if let Err(err) = io::stdout().flush() {
        warn!(%err, "failed to flush prompt");
    }
}

/// Reads stdin on its own thread so a pending line never holds up runtime shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
