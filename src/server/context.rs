//! The handle a tool's `execute` receives.

use super::session::Session;
use crate::types::{methods, LoggingLevel, LoggingMessageParams, ProgressParams, ProgressToken};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Progress of a running tool, as sent in `notifications/progress`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub progress: f64,
    pub total: Option<f64>,
}

impl Progress {
    pub fn new(progress: f64) -> Self {
        Self {
            progress,
            total: None,
        }
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Per-call context: progress reporting, client logging and access to the
/// owning session.
#[derive(Clone)]
pub struct ToolContext {
    session: Session,
    progress_token: Option<ProgressToken>,
    last_progress: Arc<Mutex<Option<f64>>>,
    log: Logger,
}

impl ToolContext {
    pub(crate) fn new(session: Session, progress_token: Option<ProgressToken>) -> Self {
        Self {
            log: Logger {
                session: session.clone(),
            },
            session,
            progress_token,
            last_progress: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends a progress notification tagged with the caller's progress token.
    ///
    /// Fire-and-forget. Does nothing when the request carried no token.
    pub fn report_progress(&self, progress: Progress) {
        let Some(token) = self.progress_token.clone() else {
            debug!("No progress token on request; dropping progress report");
            return;
        };

        {
            let mut last = self
                .last_progress
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = *last {
                if progress.progress < previous {
                    warn!(
                        previous,
                        current = progress.progress,
                        "Progress went backwards"
                    );
                }
            }
            *last = Some(progress.progress);
        }

        let params = ProgressParams {
            progress_token: token,
            progress: progress.progress,
            total: progress.total,
        };
        if let Err(e) = self.session.notify(methods::NOTIFY_PROGRESS, params) {
            debug!(error = %e, "Failed to queue progress notification");
        }
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }
}

/// Emits `notifications/message` to the client.
///
/// Messages are sent regardless of the level the client selected with
/// `logging/setLevel`; that level is only recorded on the session.
#[derive(Clone)]
pub struct Logger {
    session: Session,
}

impl Logger {
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Warning, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Error, message, None);
    }

    /// Sends a message at `level`, with optional structured context.
    pub fn log(&self, level: LoggingLevel, message: impl Into<String>, context: Option<Value>) {
        let mut data = json!({ "message": message.into() });
        if let Some(context) = context {
            data["context"] = context;
        }
        let params = LoggingMessageParams {
            level,
            logger: None,
            data,
        };
        if let Err(e) = self.session.notify(methods::NOTIFY_MESSAGE, params) {
            debug!(error = %e, "Failed to queue log notification");
        }
    }
}
