//! Timestamped, leveled log lines.
//!
//! Lines are rendered as `YYYY-MM-DD HH:MM:SS [component] LEVEL: message`
//! into a fixed-capacity buffer and handed to a [`LogSink`]. Lines longer
//! than [`LINE_CAPACITY`] are truncated, never dropped.

use core::fmt::{self, Write};

use heapless::String;

use crate::time::DateTime;

/// Capacity of one rendered log line.
pub const LINE_CAPACITY: usize = 160;

const TRUNCATION_MARKER: &str = "~";

/// Severity of a log line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for rendered log lines.
pub trait LogSink {
    fn write_line(&mut self, line: &str);
}

/// One log event before rendering.
#[derive(Copy, Clone, Debug)]
pub struct LogRecord<'a> {
    pub at: DateTime,
    pub level: Level,
    pub component: &'a str,
    pub message: fmt::Arguments<'a>,
}

impl LogRecord<'_> {
    /// Renders the record, truncating with a trailing `~` when it overflows.
    pub fn render(&self) -> String<LINE_CAPACITY> {
        let mut line = TruncatingWriter::default();
        // TruncatingWriter never reports an error.
        let _ = write!(
            line,
            "{} [{}] {}: {}",
            self.at, self.component, self.level, self.message
        );
        line.finish()
    }
}

#[derive(Default)]
struct TruncatingWriter {
    line: String<LINE_CAPACITY>,
    truncated: bool,
}

impl TruncatingWriter {
    fn finish(mut self) -> String<LINE_CAPACITY> {
        if self.truncated {
            while self.line.len() + TRUNCATION_MARKER.len() > LINE_CAPACITY {
                self.line.pop();
            }
            let _ = self.line.push_str(TRUNCATION_MARKER);
        }
        self.line
    }
}

impl Write for TruncatingWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        for ch in s.chars() {
            if self.line.push(ch).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}

/// Leveled logger writing to a [`LogSink`].
pub struct Logger<S> {
    sink: S,
    min_level: Level,
}

impl<S: LogSink> Logger<S> {
    /// Creates a logger that emits `Info` and above.
    pub const fn new(sink: S) -> Self {
        Self {
            sink,
            min_level: Level::Info,
        }
    }

    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub const fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    pub fn log(&mut self, at: DateTime, level: Level, component: &str, message: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord {
            at,
            level,
            component,
            message,
        };
        self.sink.write_line(&record.render());
    }

    pub fn debug(&mut self, at: DateTime, component: &str, message: fmt::Arguments<'_>) {
        self.log(at, Level::Debug, component, message);
    }

    pub fn info(&mut self, at: DateTime, component: &str, message: fmt::Arguments<'_>) {
        self.log(at, Level::Info, component, message);
    }

    pub fn warn(&mut self, at: DateTime, component: &str, message: fmt::Arguments<'_>) {
        self.log(at, Level::Warning, component, message);
    }

    pub fn error(&mut self, at: DateTime, component: &str, message: fmt::Arguments<'_>) {
        self.log(at, Level::Error, component, message);
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
