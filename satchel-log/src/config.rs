//! Environment driven logger configuration.

use crate::level::{Format, Level};
use once_cell::sync::Lazy;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logger configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `SATCHEL_DEBUG` was set.
    pub debug: bool,
    /// Minimum level written.
    pub level: Level,
    pub format: Format,
    pub color: bool,
    pub timestamps: bool,
    /// Write the module path (or explicit target) of each line.
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            module_path: true,
        }
    }
}

impl LogConfig {
    /// Build the configuration from `SATCHEL_*` variables and publish the
    /// level to the global filters.
    ///
    /// - `SATCHEL_DEBUG=1` lowers the default level to debug
    /// - `SATCHEL_LOG_LEVEL=trace|debug|info|warn|error|off`
    /// - `SATCHEL_LOG_FORMAT=json|pretty|compact`
    /// - `SATCHEL_LOG_COLOR`, `SATCHEL_LOG_TIMESTAMPS`, `SATCHEL_LOG_MODULE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let debug = flag("SATCHEL_DEBUG").unwrap_or(false);

        let level = env::var("SATCHEL_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { defaults.level });

        let format = env::var("SATCHEL_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.format);

        let color = flag("SATCHEL_LOG_COLOR").unwrap_or_else(|| {
            env::var_os("NO_COLOR").is_none() && env::var_os("TERM").is_some()
        });

        let config = Self {
            debug,
            level,
            format,
            color,
            timestamps: flag("SATCHEL_LOG_TIMESTAMPS").unwrap_or(defaults.timestamps),
            module_path: flag("SATCHEL_LOG_MODULE").unwrap_or(defaults.module_path),
        };

        DEBUG_ENABLED.store(config.debug, Ordering::SeqCst);
        LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);
        config
    }
}

fn flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Force the environment to be read now instead of at the first log line.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// The configuration in effect.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

#[inline]
pub fn is_debug_enabled() -> bool {
    init();
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    init();
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn current_level() -> Level {
    init();
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Change the minimum level at runtime.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Toggle debug mode at runtime; enabling it also lowers the level to debug.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        LOG_LEVEL.store(Level::Debug as u8, Ordering::SeqCst);
    }
}
