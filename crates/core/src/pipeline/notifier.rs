use crossbeam_channel::Sender;

use crate::shared::error::FaceFeedError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A short user-facing message (toast, status line, log entry).
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn from_error(error: &FaceFeedError) -> Self {
        Self {
            severity: Severity::Error,
            title: error.title().to_string(),
            description: error.description(),
        }
    }

    /// Summary shown after an on-demand batch is applied.
    pub fn batch_complete(face_count: usize) -> Self {
        let description = if face_count == 0 {
            "No faces were detected in the image.".to_string()
        } else {
            format!("Detected {face_count} face(s).")
        };
        Self::info("Analysis Complete", description)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Sink for user-facing notices.
///
/// Keeps the orchestrator independent of how notices are shown.
pub trait Notifier: Send {
    fn notify(&mut self, notice: Notice);
}

/// Discards every notice.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&mut self, _notice: Notice) {}
}

/// Writes notices to the `log` facade.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, notice: Notice) {
        match notice.severity {
            Severity::Info => log::info!("{}: {}", notice.title, notice.description),
            Severity::Error => log::warn!("{}: {}", notice.title, notice.description),
        }
    }
}

/// Forwards notices to another thread, e.g. a GUI event loop.
pub struct ChannelNotifier {
    tx: Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&mut self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            log::debug!("Notice dropped: receiver disconnected");
        }
    }
}
