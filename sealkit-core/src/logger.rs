//! Forwards `tracing` events to a logger provided by the host app.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Trait representing a logger that can log messages at various levels.
///
/// Implemented by the host app to receive the crate's `tracing` events.
///
/// # Examples
///
/// ```rust
/// use sealkit_core::logger::{Logger, LogLevel};
///
/// struct MyLogger;
///
/// impl Logger for MyLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{:?}] {}", level, message);
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// object SealKitLoggerBridge : Logger {
///     override fun log(level: LogLevel, message: String) {
///         Log.println(level.toPriority(), "sealkit", message)
///     }
/// }
///
/// // Application.onCreate, once
/// setLogger(SealKitLoggerBridge)
/// ```
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Enumeration of possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Designates very low priority, often extremely detailed messages.
    Trace,
    /// Designates lower priority debugging information.
    Debug,
    /// Designates informational messages that highlight the progress of the application.
    Info,
    /// Designates potentially harmful situations.
    Warn,
    /// Designates error events that might still allow the application to continue running.
    Error,
}

/// Forwards `tracing` events to a foreign [`Logger`].
///
/// Debug and trace events are only forwarded when they originate from this
/// crate.
pub(crate) struct ForeignLayer {
    logger: Arc<dyn Logger>,
}

impl ForeignLayer {
    pub(crate) fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }
}

impl<S: Subscriber> Layer<S> for ForeignLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        let is_verbose = level == Level::DEBUG || level == Level::TRACE;
        if is_verbose && !metadata.target().starts_with("sealkit") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.logger.log(log_level(level), visitor.finish());
    }
}

/// Flattens an event into `message key=value ...`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

fn log_level(level: Level) -> LogLevel {
    if level == Level::ERROR {
        LogLevel::Error
    } else if level == Level::WARN {
        LogLevel::Warn
    } else if level == Level::INFO {
        LogLevel::Info
    } else if level == Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

/// Sets the global logger.
///
/// Installs a `tracing` subscriber that forwards every event to `logger`.
/// Call it once, early. If a global subscriber is already installed the
/// call has no effect and a warning is emitted through the existing one.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    let installed = tracing_subscriber::registry()
        .with(ForeignLayer::new(logger))
        .try_init();
    if let Err(err) = installed {
        tracing::warn!("logger already set: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Captured(Mutex<Vec<(LogLevel, String)>>);

    impl Logger for Captured {
        fn log(&self, level: LogLevel, message: String) {
            self.0.lock().expect("lock").push((level, message));
        }
    }

    #[test]
    fn test_events_are_forwarded_with_fields() {
        let captured = Arc::new(Captured::default());
        let subscriber =
            tracing_subscriber::registry().with(ForeignLayer::new(captured.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "sealkit_core::orchestrator", key_name = "app_key", "key invalidated");
            tracing::debug!(target: "hyper::client", "noise from a dependency");
            tracing::debug!(target: "sealkit_core::gate", "presenting prompt");
        });

        let events = captured.0.lock().expect("lock");
        assert_eq!(
            events.as_slice(),
            &[
                (LogLevel::Warn, "key invalidated key_name=app_key".to_string()),
                (LogLevel::Debug, "presenting prompt".to_string()),
            ]
        );
    }
}
