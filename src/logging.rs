use std::sync::OnceLock;

use chrono::Local;
use log::{Level, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::broadcast;

const LOG_CHANNEL_CAPACITY: usize = 256;

static LOGGER: OnceLock<BroadcastLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Logger that writes to stderr and forwards every record to subscribers,
/// so a UI can render the core's log alongside its own state.
pub struct BroadcastLogger {
    level: Level,
    tx: broadcast::Sender<LogMessage>,
}

impl BroadcastLogger {
    pub fn new(level: Level) -> Self {
        let (tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self { level, tx }
    }

    /// Installs the process-wide logger
    pub fn init(level: Level) -> Result<&'static BroadcastLogger, SetLoggerError> {
        let logger = LOGGER.get_or_init(|| BroadcastLogger::new(level));
        log::set_logger(logger).map(|()| log::set_max_level(level.to_level_filter()))?;
        Ok(logger)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogMessage> {
        self.tx.subscribe()
    }

    fn emit_log(&self, record: &Record) {
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };

        // No subscribers is not an error
        let _ = self.tx.send(log_message);
    }
}

impl log::Log for BroadcastLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
            self.emit_log(record);
        }
    }

    fn flush(&self) {}
}

/// Initialize logging. Falls back to env_logger when another logger is
/// already installed.
pub fn init(level: Level) -> Option<&'static BroadcastLogger> {
    match BroadcastLogger::init(level) {
        Ok(logger) => {
            log::info!("Logging initialized");
            Some(logger)
        }
        Err(e) => {
            eprintln!("Failed to install broadcast logger: {}", e);
            let _ = env_logger::builder()
                .filter_level(level.to_level_filter())
                .try_init();
            None
        }
    }
}

/// Subscribe to forwarded log records, if the broadcast logger is installed
pub fn subscribe() -> Option<broadcast::Receiver<LogMessage>> {
    LOGGER.get().map(BroadcastLogger::subscribe)
}

/// env_logger in test mode; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn forwards_enabled_records() {
        let logger = BroadcastLogger::new(Level::Info);
        let mut rx = logger.subscribe();

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("Smart LED detected: {}", "AA:BB"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .args(format_args!("dropped"))
                .build(),
        );

        let message = rx.try_recv().unwrap();
        assert_eq!(message.level, "INFO");
        assert_eq!(message.message, "Smart LED detected: AA:BB");
        assert!(rx.try_recv().is_err());
    }
}
