use std::fmt::Arguments;
use std::sync::Mutex;

use super::{LogLevel, Logger};

/// Forwards to the `log` crate facade under the `hangar` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacadeLogger;

impl Logger for LogFacadeLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        let level = match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        };
        log::log!(target: "hangar", level, "{}", args);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline]
    fn log(&self, _level: LogLevel, _args: Arguments<'_>) {}
}

/// Keeps every line in memory. Useful for asserting on conflicts and
/// per-package failures that are reported but not returned.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Messages logged at `level` or above.
    pub fn messages_at_least(&self, level: LogLevel) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l >= level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, args.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_loggers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogFacadeLogger>();
        assert_send_sync::<NoOpLogger>();
        assert_send_sync::<MemoryLogger>();
    }

    #[test]
    fn test_memory_logger_filters_by_level() {
        let logger = MemoryLogger::new();
        logger.info(format_args!("fine"));
        logger.warn(format_args!("careful"));
        logger.error(format_args!("broken"));

        assert_eq!(
            logger.messages_at_least(LogLevel::Warn),
            vec!["careful".to_string(), "broken".to_string()]
        );
    }

    #[test]
    fn test_trait_objects() {
        let loggers: Vec<Arc<dyn Logger>> = vec![
            Arc::new(LogFacadeLogger),
            Arc::new(NoOpLogger),
            Arc::new(MemoryLogger::new()),
        ];
        for logger in loggers {
            logger.debug(format_args!("hello"));
        }
    }
}
