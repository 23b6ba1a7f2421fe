//! Drainable log sink.
//!
//! Installs a `log` implementation that formats each record into a
//! fixed-size entry and pushes it onto a lock-free ring buffer. Tests
//! drain the buffer to inspect kernel diagnostics; overflow drops new
//! entries rather than blocking.

use core::fmt::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};
use thingbuf::StaticThingBuf;

/// Maximum size of a single entry's content (target + message).
pub const LOG_ENTRY_CONTENT_SIZE: usize = 200;

/// Number of entry slots in the ring buffer.
pub const LOG_BUFFER_SLOTS: usize = 256;

/// One captured log record with fixed-size storage.
#[derive(Clone)]
pub struct LogEntry {
    level: u8,
    target_len: u8,
    message_len: u16,
    /// Layout: `[target bytes][message bytes]`.
    content: [u8; LOG_ENTRY_CONTENT_SIZE],
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            level: 0,
            target_len: 0,
            message_len: 0,
            content: [0u8; LOG_ENTRY_CONTENT_SIZE],
        }
    }
}

impl LogEntry {
    fn new(level: Level, target: &str, message: &str) -> Self {
        let mut entry = Self {
            level: level as u8,
            ..Self::default()
        };

        let target_bytes = target.as_bytes();
        let target_len = target_bytes.len().min(u8::MAX as usize);
        entry.content[..target_len].copy_from_slice(&target_bytes[..target_len]);
        entry.target_len = target_len as u8;

        let message_bytes = message.as_bytes();
        let message_len = message_bytes.len().min(LOG_ENTRY_CONTENT_SIZE - target_len);
        entry.content[target_len..target_len + message_len]
            .copy_from_slice(&message_bytes[..message_len]);
        entry.message_len = message_len as u16;

        entry
    }

    /// Severity of the captured record.
    pub fn level(&self) -> Level {
        match self.level {
            1 => Level::Error,
            2 => Level::Warn,
            3 => Level::Info,
            4 => Level::Debug,
            _ => Level::Trace,
        }
    }

    /// Module path the record was emitted from.
    pub fn target(&self) -> &str {
        let len = self.target_len as usize;
        core::str::from_utf8(&self.content[..len]).unwrap_or("<invalid>")
    }

    /// The formatted message, possibly truncated.
    pub fn message(&self) -> &str {
        let start = self.target_len as usize;
        let len = self.message_len as usize;
        core::str::from_utf8(&self.content[start..start + len]).unwrap_or("<invalid>")
    }
}

static BUFFER: StaticThingBuf<LogEntry, LOG_BUFFER_SLOTS> = StaticThingBuf::new();

/// Stack buffer for formatting a record before it enters the ring.
struct MessageBuffer {
    data: [u8; LOG_ENTRY_CONTENT_SIZE],
    len: usize,
}

impl MessageBuffer {
    const fn new() -> Self {
        Self {
            data: [0u8; LOG_ENTRY_CONTENT_SIZE],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.data[..self.len]).unwrap_or("<invalid>")
    }
}

impl Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let to_copy = bytes.len().min(LOG_ENTRY_CONTENT_SIZE - self.len);
        self.data[self.len..self.len + to_copy].copy_from_slice(&bytes[..to_copy]);
        self.len += to_copy;
        Ok(())
    }
}

struct RingLogger;

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut message = MessageBuffer::new();
            let _ = write!(message, "{}", record.args());
            let entry = LogEntry::new(record.level(), record.target(), message.as_str());
            BUFFER.push(entry).ok();
        }
    }

    fn flush(&self) {}
}

static LOGGER: RingLogger = RingLogger;

/// Install the ring-buffer sink as the process logger.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LevelFilter::Trace))
        .ok();
}

/// Drain every captured entry.
pub fn drain() -> Vec<LogEntry> {
    let mut entries = Vec::new();
    while let Some(entry) = BUFFER.pop() {
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip() {
        let entry = LogEntry::new(Level::Warn, "keel_kernel::sched", "thread 3 killed");
        assert_eq!(entry.level(), Level::Warn);
        assert_eq!(entry.target(), "keel_kernel::sched");
        assert_eq!(entry.message(), "thread 3 killed");
    }

    #[test]
    fn test_long_message_is_truncated() {
        let long = "x".repeat(LOG_ENTRY_CONTENT_SIZE * 2);
        let entry = LogEntry::new(Level::Info, "t", &long);
        assert_eq!(entry.message().len(), LOG_ENTRY_CONTENT_SIZE - 1);
    }

    #[test]
    fn test_drain_captures_records() {
        init();
        log::info!(target: "keel_pal::logger::probe", "captured {}", 7);
        let entries = drain();
        let entry = entries
            .iter()
            .find(|entry| entry.target() == "keel_pal::logger::probe")
            .expect("probe record captured");
        assert_eq!(entry.level(), Level::Info);
        assert_eq!(entry.message(), "captured 7");
    }
}
