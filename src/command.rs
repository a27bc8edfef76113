mod parser;

pub use parser::*;

use std::fmt;
use std::str::FromStr;

use anyhow::{Context as _, Error, bail};

/// Operator command as carried on the signal channel, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Resume,
    Pause,
    Exit,
    Blink(u8),
    Request,
}

impl Command {
    /// Newline-terminated form written onto the signal channel.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Resume => f.write_str("resume"),
            Command::Pause => f.write_str("pause"),
            Command::Exit => f.write_str("exit"),
            Command::Blink(frequency) => write!(f, "blink {frequency}"),
            Command::Request => f.write_str("env"),
        }
    }
}

/// Parses one whole operator line, as typed at the shell.
impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "resume" => Ok(Command::Resume),
            "pause" => Ok(Command::Pause),
            "exit" => Ok(Command::Exit),
            "env" => Ok(Command::Request),
            _ => {
                let Some(arg) = s.strip_prefix("blink ") else {
                    bail!("unknown command: {}", s);
                };
                let frequency = arg
                    .trim()
                    .parse()
                    .with_context(|| format!("failed to parse blink frequency: {arg}"))?;
                Ok(Command::Blink(frequency))
            }
        }
    }
}
