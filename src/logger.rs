use crate::progress::Progress;
use console::{Color, style};
use log::{Level, LevelFilter, Log, Metadata, Record, set_max_level};
use std::io::{Write, stderr};

/// The main logging facade
pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    /// Create a new logger
    pub fn new(level: LevelFilter) -> Box<Self> {
        set_max_level(level);
        Self { level }.into()
    }

    fn format(record: &Record<'_>) -> String {
        let (level_name, level_color) = match record.level() {
            Level::Error => ("ERROR", Color::Red),
            Level::Warn => ("WARN ", Color::Yellow),
            Level::Info => ("INFO ", Color::Green),
            Level::Debug => ("DEBUG", Color::Cyan),
            Level::Trace => ("TRACE", Color::Magenta),
        };
        format!(
            "{}{}{} {}",
            style("[").white().dim(),
            style(level_name).fg(level_color),
            style("]").white().dim(),
            style(record.args()),
        )
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let msg = Self::format(record);
        match Progress::get() {
            // Info messages replace each other on the spinner, everything
            // else stays above it
            Some(pb) if record.level() == Level::Info => {
                pb.set_message(record.args().to_string());
                pb.println(msg);
            }
            Some(pb) => pb.println(msg),
            None => {
                writeln!(stderr(), "{}", msg).ok();
            }
        }
    }

    fn flush(&self) {
        stderr().flush().ok();
    }
}
