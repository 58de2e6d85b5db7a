//! Internal logging facilities. This module (re)exports the five logging
//! macros: `error!`, `warn!`, `info!`, `debug!` and `trace!`, where
//! `error!` is the highest-priority and `trace!` the lowest. To emit a log
//! message, simply use one of these macros in your code.
//!
//! Logging is disabled by default. It is enabled/disabled with:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level)`: enables only messages with priority at least
//!    `level`

pub use log::{debug, error, info, trace, warn, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::Handle;
use std::sync::{Mutex, OnceLock};

/// A handle to the installed logger, kept so the level can be changed
/// after initialization. The global logger can only be installed once per
/// process; subsequent level changes go through the handle.
static LOG_HANDLE: OnceLock<Mutex<Handle>> = OnceLock::new();

fn build_config(level: LevelFilter) -> Config {
    let stderr = ConsoleAppender::builder().target(Target::Stderr).build();
    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .expect("the static logging configuration is valid")
}

/// Sets the global log level. A level of `LevelFilter::Off` disables
/// logging.
pub fn set_log_level(level: LevelFilter) {
    match LOG_HANDLE.get() {
        Some(handle) => handle.lock().unwrap().set_config(build_config(level)),
        None => {
            let handle = log4rs::init_config(build_config(level))
                .expect("the global logger can only be installed once");
            let _ = LOG_HANDLE.set(Mutex::new(handle));
        }
    }
}

/// Enables the logger with no level filter / full logging. Equivalent to
/// `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Disables logging completely. Equivalent to
/// `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_level_reconfigures_without_panic() {
        // The global logger survives reconfiguration through the handle.
        set_log_level(LevelFilter::Info);
        info!("logging at info");
        set_log_level(LevelFilter::Off);
        enable_logging();
        disable_logging();
    }
}
