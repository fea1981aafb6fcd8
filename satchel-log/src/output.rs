//! Line rendering.

use crate::config::{LogConfig, config, is_level_enabled};
use crate::level::{Format, Level};
use std::io::Write;

/// Write one line. Called by the macros; checks the level again so direct
/// callers get the same filtering.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    let config = config();
    if !is_level_enabled(level) {
        return;
    }

    let line = render(level, target, message, config);
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", line);
}

pub(crate) fn render(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    match config.format {
        Format::Pretty => pretty(level, target, message, config),
        Format::Compact => compact(level, target, message, config),
        Format::Json => json(level, target, message),
    }
}

fn pretty(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    let mut line = String::new();
    if config.timestamps {
        line.push_str(&chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f ").to_string());
    }

    #[cfg(feature = "color")]
    let level_name = if config.color {
        format!("{:5}", level.colored())
    } else {
        format!("{:5}", level.as_str())
    };
    #[cfg(not(feature = "color"))]
    let level_name = format!("{:5}", level.as_str());

    line.push_str(&level_name);
    line.push(' ');

    if config.module_path && !target.is_empty() {
        line.push('[');
        line.push_str(target);
        line.push_str("] ");
    }
    line.push_str(message);
    line
}

fn compact(level: Level, target: &str, message: &str, config: &LogConfig) -> String {
    let mut line = String::new();
    if config.timestamps {
        line.push_str(&chrono::Local::now().format("%H:%M:%S ").to_string());
    }
    line.push(level.as_str().chars().next().unwrap_or('?'));
    line.push(' ');
    if config.module_path && !target.is_empty() {
        line.push_str(target);
        line.push_str(": ");
    }
    line.push_str(message);
    line
}

#[cfg(feature = "json")]
fn json(level: Level, target: &str, message: &str) -> String {
    #[derive(serde::Serialize)]
    struct Entry<'a> {
        timestamp: String,
        level: &'a str,
        target: &'a str,
        message: &'a str,
    }

    let entry = Entry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        level: level.as_str(),
        target,
        message,
    };
    serde_json::to_string(&entry).unwrap_or_default()
}

#[cfg(not(feature = "json"))]
fn json(level: Level, target: &str, message: &str) -> String {
    format!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}"}}"#,
        chrono::Utc::now().to_rfc3339(),
        level.as_str(),
        escape(target),
        escape(message)
    )
}

#[cfg(not(feature = "json"))]
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(format: Format) -> LogConfig {
        LogConfig {
            format,
            color: false,
            timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn test_pretty_line() {
        let line = render(Level::Warn, "satchel::engine", "gc failed", &plain(Format::Pretty));
        assert_eq!(line, "WARN  [satchel::engine] gc failed");
    }

    #[test]
    fn test_compact_line() {
        let line = render(Level::Info, "store", "opened", &plain(Format::Compact));
        assert_eq!(line, "I store: opened");
    }

    #[test]
    fn test_json_line_escapes_message() {
        let line = render(Level::Error, "t", "bad \"quote\"", &plain(Format::Json));
        assert!(line.starts_with('{'));
        assert!(line.contains(r#""level":"ERROR""#));
        assert!(line.contains(r#"bad \"quote\""#));
    }
}
