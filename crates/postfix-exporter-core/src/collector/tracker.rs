//! Position tracking for a growing, rotating log file.
//!
//! Given the current identity and size of the log and the last committed
//! position, decides which byte range is new. Rotation is detected by a
//! device/inode change, truncation by the file shrinking below the stored
//! offset. With no stored position only a bounded tail window is read.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use crate::storage::{LogIdentity, LogPosition};

/// Block size for the backwards newline scan on bootstrap.
const TAIL_SCAN_BLOCK: u64 = 8 * 1024;

/// How the range for this cycle was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMode {
    /// No persisted position: last N lines only.
    Bootstrap,
    /// Same file, grown or unchanged since last cycle.
    Incremental,
    /// Identity changed: new file read from its beginning.
    Rotated,
    /// Same file, shrunk below the stored offset: read from its beginning.
    Truncated,
}

impl TrackerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackerMode::Bootstrap => "bootstrap",
            TrackerMode::Incremental => "incremental",
            TrackerMode::Rotated => "rotated",
            TrackerMode::Truncated => "truncated",
        }
    }
}

/// Byte range to classify in this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub mode: TrackerMode,
    pub identity: LogIdentity,
    pub start: u64,
    pub end: u64,
}

/// Result of streaming a range through a line sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Offset just past the last complete line consumed.
    pub end_offset: u64,
    pub lines_read: u64,
    /// Complete lines dropped because they are not valid UTF-8.
    pub lines_skipped: u64,
}

impl ReadSummary {
    pub fn position(&self, identity: LogIdentity) -> LogPosition {
        LogPosition {
            identity,
            byte_offset: self.end_offset,
        }
    }
}

/// Chooses the tracker mode from the current file and the stored position.
pub fn select_mode(identity: LogIdentity, size: u64, stored: Option<LogPosition>) -> TrackerMode {
    match stored {
        None => TrackerMode::Bootstrap,
        Some(pos) if pos.identity != identity => TrackerMode::Rotated,
        Some(pos) if size < pos.byte_offset => TrackerMode::Truncated,
        Some(_) => TrackerMode::Incremental,
    }
}

/// Resolves the new byte range of an open log file.
pub fn resolve_range(
    file: &mut File,
    identity: LogIdentity,
    size: u64,
    stored: Option<LogPosition>,
    bootstrap_lines: usize,
) -> io::Result<ResolvedRange> {
    let mode = select_mode(identity, size, stored);
    let start = match (mode, stored) {
        (TrackerMode::Bootstrap, _) => tail_start_offset(file, size, bootstrap_lines)?,
        (TrackerMode::Incremental, Some(pos)) => pos.byte_offset,
        _ => 0,
    };

    Ok(ResolvedRange {
        mode,
        identity,
        start,
        end: size,
    })
}

/// Offset where the last `lines` complete lines before `size` begin.
///
/// A trailing line without a newline is not counted as one of them.
/// Returns 0 if the file holds `lines` complete lines or fewer.
pub fn tail_start_offset<R: Read + Seek>(
    reader: &mut R,
    size: u64,
    lines: usize,
) -> io::Result<u64> {
    // The (lines + 1)-th newline from the end terminates the line just
    // before the window.
    let mut newlines_needed = lines.saturating_add(1);
    let mut block_end = size;
    let mut buf = vec![0u8; TAIL_SCAN_BLOCK as usize];

    while block_end > 0 {
        let block_start = block_end.saturating_sub(TAIL_SCAN_BLOCK);
        let len = (block_end - block_start) as usize;
        reader.seek(SeekFrom::Start(block_start))?;
        reader.read_exact(&mut buf[..len])?;

        for (i, byte) in buf[..len].iter().enumerate().rev() {
            if *byte == b'\n' {
                newlines_needed -= 1;
                if newlines_needed == 0 {
                    return Ok(block_start + i as u64 + 1);
                }
            }
        }
        block_end = block_start;
    }

    Ok(0)
}

/// Streams complete lines in `[start, end)` to `sink`.
///
/// Stops at the last newline inside the range; an unterminated tail is left
/// for the next cycle. Lines that are not valid UTF-8 are skipped.
pub fn read_range<F>(
    file: &mut File,
    start: u64,
    end: u64,
    mut sink: F,
) -> io::Result<ReadSummary>
where
    F: FnMut(&str),
{
    let mut summary = ReadSummary {
        end_offset: start,
        ..Default::default()
    };
    if end <= start {
        return Ok(summary);
    }

    file.seek(SeekFrom::Start(start))?;
    let mut reader = BufReader::new(Read::by_ref(file).take(end - start));
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || buf.last() != Some(&b'\n') {
            break;
        }
        summary.end_offset += n as u64;

        let line = &buf[..n - 1];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(line) => {
                summary.lines_read += 1;
                sink(line);
            }
            Err(_) => summary.lines_skipped += 1,
        }
    }

    Ok(summary)
}
