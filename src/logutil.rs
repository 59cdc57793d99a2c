//! Logging setup and log-line hygiene.
//!
//! The configuration carries an ordered list of sinks (stdout and/or
//! files, each with its own level). env_logger only has one global filter,
//! so the builder is set to the most verbose sink and the custom format
//! fans each record out to every sink that wants it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::LevelFilter;

use crate::config::LoggerConfig;

struct Sink {
    stdout: bool,
    file: Option<Arc<Mutex<File>>>,
    level: LevelFilter,
    hide_time: bool,
}

/// Install the global logger from the configured sinks. `quiet` disables
/// all output (used by the user-management CLI paths). Safe to call more
/// than once; later calls are ignored.
pub fn init_logging(configs: &[LoggerConfig], quiet: bool) {
    let mut builder = env_logger::Builder::new();

    if quiet {
        builder.filter_level(LevelFilter::Off);
        let _ = builder.try_init();
        return;
    }

    let mut sinks = Vec::new();
    for cfg in configs {
        let level = parse_level(&cfg.level);
        let file = cfg.file.as_ref().and_then(|path| open_log_file(path));
        if cfg.stdout || file.is_some() {
            sinks.push(Sink {
                stdout: cfg.stdout,
                file,
                level,
                hide_time: cfg.hide_time,
            });
        }
    }
    if sinks.is_empty() {
        sinks.push(Sink {
            stdout: true,
            file: None,
            level: LevelFilter::Info,
            hide_time: false,
        });
    }

    let global = sinks
        .iter()
        .map(|s| s.level)
        .max()
        .unwrap_or(LevelFilter::Info);
    builder.filter_level(global);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        for sink in &sinks {
            if record.level() > sink.level {
                continue;
            }
            let line = if sink.hide_time {
                format!("[{}] {}", record.level(), record.args())
            } else {
                format!("{} [{}] {}", ts, record.level(), record.args())
            };
            if sink.stdout {
                writeln!(fmt, "{line}")?;
            }
            if let Some(file) = &sink.file {
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{line}");
                }
            }
        }
        Ok(())
    });

    let _ = builder.try_init();
}

fn open_log_file(path: &str) -> Option<Arc<Mutex<File>>> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() && std::fs::create_dir_all(dir).is_err() {
            eprintln!("failed to create log directory for {path}");
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(e) => {
            eprintln!("failed to open log file {path}: {e}");
            None
        }
    }
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Escape a string for single-line logging. Newlines, carriage returns and
/// tabs become their escape sequences, other control characters become
/// `\xNN`, and very long values are cut with an ellipsis so one chatty
/// peer cannot flood the log.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{escape_log, parse_level};
    use log::LevelFilter;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("a\nb\r\tc"), "a\\nb\\r\\tc");
        assert_eq!(escape_log("bell\x07"), "bell\\x07");
        assert_eq!(escape_log("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn truncates_long_values() {
        let long = "x".repeat(400);
        let escaped = escape_log(&long);
        assert!(escaped.ends_with('…'));
        assert!(escaped.chars().count() <= 301);
    }

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARNING"), LevelFilter::Warn);
        assert_eq!(parse_level("bogus"), LevelFilter::Info);
    }
}
