use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Sink for user-facing notices. The flow stages report through this seam
/// instead of assuming any particular surface.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    /// Ask the surface to open its login prompt. Default is a no-op for
    /// surfaces without one.
    fn request_login(&self) {}
}

/// Captures notices so tests can assert on the exact texts shown.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
    login_requests: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .map(|(_, message)| message)
            .collect()
    }

    pub fn login_requests(&self) -> usize {
        self.login_requests.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((level, message.to_string()));
        }
    }

    fn request_login(&self) {
        self.login_requests.fetch_add(1, Ordering::SeqCst);
    }
}
