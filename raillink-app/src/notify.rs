use raillink_flow::{NoticeLevel, Notifier};

/// Stands in for the toast surface: flow notices land in the log.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info | NoticeLevel::Success => tracing::info!("{}", message),
            NoticeLevel::Warning => tracing::warn!("{}", message),
            NoticeLevel::Error => tracing::error!("{}", message),
        }
    }

    fn request_login(&self) {
        tracing::warn!("This action needs a logged-in session");
    }
}
