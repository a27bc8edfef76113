use tracing::trace;

use super::Command;

/// Longest run of bytes without a newline kept while waiting for the rest of a line.
pub const MAX_PENDING: usize = 1024;

/// Keywords in match priority order. `blink` is handled separately since it carries a payload.
const KEYWORDS: [(&[u8], Command); 3] = [
    (b"resume", Command::Resume),
    (b"pause", Command::Pause),
    (b"exit", Command::Exit),
];

const BLINK: &[u8] = b"blink ";

const REQUEST: &[u8] = b"env";

enum Scan {
    Matched(Command, usize),
    Pending,
    Miss,
}

/// Turns the raw byte stream of the signal channel into commands.
///
/// Bytes are buffered across reads. A command is recognised by its leading keyword;
/// everything after the keyword up to and including the next newline is dropped with it.
/// Lines that match nothing are dropped silently once their newline arrives.
#[derive(Debug, Default)]
pub struct CommandParser {
    buf: Vec<u8>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn next_command(&mut self) -> Option<Command> {
        while !self.buf.is_empty() {
            let newline = self.buf.iter().position(|&b| b == b'\n');

            match scan(&self.buf) {
                Scan::Matched(command, matched) => {
                    let end = newline.map_or(matched, |i| i + 1);
                    self.buf.drain(..end);
                    return Some(command);
                }
                Scan::Pending if newline.is_none() && self.buf.len() <= MAX_PENDING => {
                    return None;
                }
                Scan::Pending | Scan::Miss => match newline {
                    Some(i) => {
                        trace!(line = %String::from_utf8_lossy(&self.buf[..i]), "discarding unrecognised line");
                        self.buf.drain(..=i);
                    }
                    None if self.buf.len() > MAX_PENDING => {
                        trace!(len = self.buf.len(), "discarding oversized line");
                        self.buf.clear();
                    }
                    None => return None,
                },
            }
        }

        None
    }
}

fn scan(buf: &[u8]) -> Scan {
    for (keyword, command) in KEYWORDS {
        if buf.starts_with(keyword) {
            return Scan::Matched(command, keyword.len());
        }
    }

    if let Some(rest) = buf.strip_prefix(BLINK) {
        match scan_blink(rest) {
            Scan::Matched(command, len) => return Scan::Matched(command, BLINK.len() + len),
            Scan::Pending => return Scan::Pending,
            Scan::Miss => {}
        }
    }

    if buf.starts_with(REQUEST) {
        return Scan::Matched(Command::Request, REQUEST.len());
    }

    Scan::Pending
}

/// Scans the payload of a `blink` line. Digits only count once something follows them,
/// so a frequency split across two reads is never cut short.
fn scan_blink(rest: &[u8]) -> Scan {
    let spaces = rest.iter().take_while(|&&b| b == b' ').count();
    let digits = rest[spaces..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    let end = spaces + digits;

    if end == rest.len() {
        return Scan::Pending;
    }
    if digits == 0 {
        return Scan::Miss;
    }

    // ASCII digits, so from_utf8 cannot fail; the parse rejects values above 255.
    match std::str::from_utf8(&rest[spaces..end])
        .ok()
        .and_then(|s| s.parse::<u8>().ok())
    {
        Some(frequency) => Scan::Matched(Command::Blink(frequency), end),
        None => Scan::Miss,
    }
}
