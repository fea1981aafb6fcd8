//! Satchel Logging
//!
//! Structured stderr logging shared by the Satchel crates, controlled through
//! `SATCHEL_*` environment variables.
//!
//! # Usage
//!
//! ```rust
//! use satchel_log::{debug, info, warn, error, trace, redact};
//!
//! debug!("opening store");
//! info!("session {} started", redact("3f9a0c1b7e"));
//! warn!(target: "satchel::store::file", "directory already existed");
//! error!("could not read session: {}", "disk full");
//! trace!("done");
//! ```
//!
//! # Environment Variables
//!
//! - `SATCHEL_DEBUG=1` - Enable debug logging
//! - `SATCHEL_LOG_LEVEL=trace|debug|info|warn|error|off` - Minimum level
//! - `SATCHEL_LOG_FORMAT=json|pretty|compact` - Output format (json by default)
//! - `SATCHEL_LOG_COLOR=1|0` - Colored level names in pretty output
//! - `SATCHEL_LOG_TIMESTAMPS=1|0`, `SATCHEL_LOG_MODULE=1|0`

mod config;
mod level;
mod output;
mod redact;

pub use config::{
    LogConfig, config, current_level, init, is_debug_enabled, is_level_enabled, set_debug,
    set_level,
};
pub use level::{Format, Level, UnknownName};
#[doc(hidden)]
pub use output::log;
pub use redact::{Redacted, redact};

/// Log a trace message.
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__log!($crate::Level::Trace, $target, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Trace, module_path!(), $($arg)+)
    };
}

/// Log a debug message. Also written whenever `SATCHEL_DEBUG=1`.
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => {
        if $crate::is_debug_enabled() || $crate::is_level_enabled($crate::Level::Debug) {
            $crate::log($crate::Level::Debug, $target, &format!($($arg)+));
        }
    };
    ($($arg:tt)+) => {
        $crate::debug!(target: module_path!(), $($arg)+)
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__log!($crate::Level::Info, $target, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Info, module_path!(), $($arg)+)
    };
}

/// Log a warning.
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__log!($crate::Level::Warn, $target, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Warn, module_path!(), $($arg)+)
    };
}

/// Log an error.
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => {
        $crate::__log!($crate::Level::Error, $target, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Error, module_path!(), $($arg)+)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:expr, $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::log($level, $target, &format!($($arg)+));
        }
    };
}

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Tracing bridge honouring the `SATCHEL_*` level.

    use super::*;

    /// A subscriber filtered at the configured level unless `RUST_LOG` is set.
    pub fn subscriber() -> impl tracing::Subscriber {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{EnvFilter, fmt};

        let config = config();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(config.color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("DEBUG".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("warning".parse::<Level>(), Ok(Level::Warn));
        assert!("loud".parse::<Level>().is_err());
        assert_eq!("compact".parse::<Format>(), Ok(Format::Compact));
    }

    #[test]
    fn test_runtime_level_changes() {
        let original = current_level();

        set_level(Level::Error);
        assert!(!is_level_enabled(Level::Warn));
        assert!(is_level_enabled(Level::Error));
        assert!(!is_level_enabled(Level::Off));

        set_debug(true);
        assert!(is_debug_enabled());
        assert_eq!(current_level(), Level::Debug);
        set_debug(false);

        set_level(original);
    }

    #[test]
    fn test_macros_expand() {
        let id = "0123456789abcdef";
        trace!("trace {}", 1);
        debug!("debug {}", redact(id));
        info!(target: "satchel::test", "info");
        warn!("warn");
        error!(target: "satchel::test", "error {}", id.len());
    }
}
