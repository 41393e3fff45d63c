//! Failure notification sink.
//!
//! The notifying session operations (`probe`, `download`, `upload`, `clear`)
//! report each failure exactly once through a [`Notifier`]. Callers that want
//! to handle errors themselves use the `try_*` operations instead.

use log::error;

/// Title used for every protocol failure report.
pub const ERROR_TITLE: &str = "Serial Error";

/// Receives human-readable failure reports.
pub trait Notifier {
    fn report_error(&mut self, title: &str, message: &str);
}

/// Default sink: writes reports to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn report_error(&mut self, title: &str, message: &str) {
        error!("{title}: {message}");
    }
}

/// A single recorded report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// Collects reports in memory, in the order they were made.
///
/// # Examples
/// ```
/// use cubesync_core::protocol::notify::{Notification, Notifier};
///
/// let mut sink: Vec<Notification> = Vec::new();
/// sink.report_error("Serial Error", "probe failed");
/// assert_eq!(sink[0].message, "probe failed");
/// ```
impl Notifier for Vec<Notification> {
    fn report_error(&mut self, title: &str, message: &str) {
        self.push(Notification {
            title: title.to_string(),
            message: message.to_string(),
        });
    }
}
