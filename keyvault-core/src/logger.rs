//! Bridge from the crate's log records to the host application's logger.
//!
//! The vault emits `tracing` events. Without a `tracing` subscriber they are
//! forwarded to the `log` facade, and [`set_logger`] routes that facade to a
//! [`Logger`] supplied by the host (the mobile app's own logging).

use std::sync::{Arc, OnceLock};

/// Receives log messages on behalf of the host application.
///
/// # Examples
///
/// ```rust
/// use keyvault_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Logs `message` at `level`.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Very detailed diagnostics.
    Trace,
    /// Debugging information.
    Debug,
    /// Normal progress, such as a record being created.
    Info,
    /// Something failed but the vault stayed consistent.
    Warn,
    /// Errors.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), record.args().to_string());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace records are only forwarded from this crate.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let from_keyvault = module_path.is_some_and(|path| path.starts_with("keyvault"));
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    from_keyvault || !verbose
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs the host logger.
///
/// Only the first call has an effect. It also fails quietly if another `log`
/// logger is already registered in the process.
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("keyvault logger already set");
        return;
    }
    if let Err(err) = init_logger() {
        eprintln!("failed to set keyvault logger: {err}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(log::Level::Debug, Some("keyvault_core::vault"), true ; "own debug")]
    #[test_case(log::Level::Debug, Some("hyper::client"), false ; "foreign debug")]
    #[test_case(log::Level::Trace, None, false ; "unknown trace")]
    #[test_case(log::Level::Info, Some("hyper::client"), true ; "foreign info")]
    #[test_case(log::Level::Warn, None, true ; "unknown warn")]
    fn test_should_forward(level: log::Level, module_path: Option<&str>, expected: bool) {
        assert_eq!(should_forward(level, module_path), expected);
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::from(log::Level::Warn), LogLevel::Warn);
        assert_eq!(LogLevel::from(log::Level::Trace), LogLevel::Trace);
    }
}
