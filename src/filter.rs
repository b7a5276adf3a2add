//! Severity-based admission for the log-bridge producer path
//!
//! Lines coming from the system log facility carry a one-letter level
//! marker (`E (123) tag: ...`, `W (..)`, ...). The filter looks for that
//! marker in a small prefix window, skipping ANSI colour sequences, and
//! decides whether the line enters the transfer queue.
//!
//! Runs on the producer side, possibly in interrupt context, so it never
//! allocates and only ever inspects a bounded prefix of the line.

/// Number of significant characters inspected for a level marker
const SCAN_WINDOW: usize = 8;

const ESC: u8 = 0x1b;

/// Log severity rank, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    /// `E` marker
    Error = 1,
    /// `W` marker
    Warn = 2,
    /// `I` marker
    Info = 3,
    /// `D` marker
    Debug = 4,
    /// `V` marker
    Verbose = 5,
}

impl Severity {
    /// Map a marker letter to its severity
    pub fn from_marker(c: u8) -> Option<Self> {
        match c {
            b'E' => Some(Severity::Error),
            b'W' => Some(Severity::Warn),
            b'I' => Some(Severity::Info),
            b'D' => Some(Severity::Debug),
            b'V' => Some(Severity::Verbose),
            _ => None,
        }
    }

    /// Marker letter used when rendering a line at this severity
    pub fn marker(self) -> char {
        match self {
            Severity::Error => 'E',
            Severity::Warn => 'W',
            Severity::Info => 'I',
            Severity::Debug => 'D',
            Severity::Verbose => 'V',
        }
    }
}

/// Detect the level marker of a formatted line
///
/// Returns `None` when no marker is found in the scan window. Any other
/// uppercase letter or a `[` ends the scan, since those start prefixes
/// (timestamps, tags) that are not level markers.
pub fn detect(line: &[u8]) -> Option<Severity> {
    let mut i = 0;
    let mut seen = 0;
    while i < line.len() && seen < SCAN_WINDOW {
        let c = line[i];
        if c == ESC {
            i = skip_escape(line, i);
            continue;
        }
        if let Some(level) = Severity::from_marker(c) {
            return Some(level);
        }
        if c.is_ascii_uppercase() || c == b'[' {
            return None;
        }
        seen += 1;
        i += 1;
    }
    None
}

/// Returns the index just past an escape sequence starting at `start`
fn skip_escape(line: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if line.get(i) != Some(&b'[') {
        return i;
    }
    i += 1;
    // CSI parameters end at the first byte in 0x40..=0x7e
    while i < line.len() {
        let c = line[i];
        i += 1;
        if (0x40..=0x7e).contains(&c) {
            break;
        }
    }
    i
}

/// Decide whether a line is admitted under `ceiling`
///
/// Lines without a recognisable marker are always admitted. A marked line
/// is admitted iff its rank is at or above the ceiling.
pub fn admit(line: &[u8], ceiling: Severity) -> bool {
    match detect(line) {
        Some(level) => level >= ceiling,
        None => true,
    }
}
