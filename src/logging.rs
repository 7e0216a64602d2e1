//! Logger capability injected into the sync engine.

use std::fmt::{self, Display, Write as _};

/// Structured key/value pairs attached to a log message.
pub type LogContext<'a> = &'a [(&'a str, &'a dyn Display)];

/// Logging sink used by the engine. Implementations must be cheap to call
/// from many concurrent transfer tasks.
pub trait SyncLogger: Send + Sync {
    fn debug(&self, message: &str, context: LogContext<'_>);
    fn info(&self, message: &str, context: LogContext<'_>);
    fn warn(&self, message: &str, context: LogContext<'_>);
    fn error(&self, message: &str, context: LogContext<'_>);
}

/// Forwards engine logs to `tracing` under the `workspace_sync` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SyncLogger for TracingLogger {
    fn debug(&self, message: &str, context: LogContext<'_>) {
        tracing::debug!(target: "workspace_sync", "{}{}", message, Fields(context));
    }

    fn info(&self, message: &str, context: LogContext<'_>) {
        tracing::info!(target: "workspace_sync", "{}{}", message, Fields(context));
    }

    fn warn(&self, message: &str, context: LogContext<'_>) {
        tracing::warn!(target: "workspace_sync", "{}{}", message, Fields(context));
    }

    fn error(&self, message: &str, context: LogContext<'_>) {
        tracing::error!(target: "workspace_sync", "{}{}", message, Fields(context));
    }
}

/// Renders context as ` key=value key=value`.
struct Fields<'a>(LogContext<'a>);

impl Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.0 {
            f.write_char(' ')?;
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
