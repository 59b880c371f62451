use log::Level;

/// Leveled logger handed to handlers through the request context
///
/// Implementors only need [`Logger::log`]; the level helpers forward to it.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warning(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Logger that forwards to the `log` facade under a fixed target
#[derive(Debug, Clone)]
pub struct StdLogger {
    target: String,
}

impl StdLogger {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for StdLogger {
    fn default() -> Self {
        Self::new("gem_server::app")
    }
}

impl Logger for StdLogger {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: self.target.as_str(), level, "{}", message);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Logger that keeps every line, for assertions
    #[derive(Default)]
    pub(crate) struct RecordingLogger {
        pub lines: Mutex<Vec<(Level, String)>>,
    }

    impl Logger for RecordingLogger {
        fn log(&self, level: Level, message: &str) {
            self.lines.lock().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_level_helpers_forward() {
        let logger = RecordingLogger::default();
        logger.debug("d");
        logger.info("i");
        logger.warning("w");
        logger.error("e");

        let lines = logger.lines.lock();
        let levels: Vec<Level> = lines.iter().map(|(level, _)| *level).collect();
        assert_eq!(levels, vec![Level::Debug, Level::Info, Level::Warn, Level::Error]);
        assert_eq!(lines[3].1, "e");
    }

    #[test]
    fn test_std_logger_target() {
        let logger = StdLogger::new("my_app");
        assert_eq!(logger.target(), "my_app");
        // No backend installed in unit tests; this must simply not panic
        logger.info("hello");
    }
}
