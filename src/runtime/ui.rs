//! Notification and navigation boundaries.
//!
//! A headless host has no real UI, so notifications surface through the
//! log and navigation requests are logged for the embedding application
//! to act on. Notifications are deduplicated by key: repeated failures
//! with the same cause must not stack duplicate alerts while they are
//! showing. A full-page navigation discards whatever is on screen, so it
//! also resets the dedup set; the same key notifies again on the new page.

use log::{debug, error, warn};

use super::{Page, RealRuntime};

impl RealRuntime {
    pub(crate) fn notify_error_impl(&self, key: &str, message: &str) {
        let mut shown = self.shown_notifications.lock().unwrap();
        if shown.insert(key.to_string()) {
            error!("{}", message);
        } else {
            debug!("Suppressing duplicate notification for key {}", key);
        }
    }

    pub(crate) fn navigate_impl(&self, page: Page) {
        warn!("Navigation requested to {}", page.path());
        self.shown_notifications.lock().unwrap().clear();
    }
}
