//! Operator alert channel

use tracing::error;

/// Where failures that need a human go
pub trait Notifier: Send + Sync {
    fn notify(&self, subject: &str, body: &str);
}

/// Emits alerts as error events on the `ballast::alert` target, so a log
/// shipper can route them separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        error!(target: "ballast::alert", subject, "{}", body);
    }
}
