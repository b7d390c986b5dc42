//! Recording notification sink.

use async_trait::async_trait;
use session_controller::errors::ScError;
use session_controller::upstream::{NotificationContext, Notifier};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// [`Notifier`] that records every notification it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationContext>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications recorded so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationContext> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Make subsequent notifications fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, context: NotificationContext) -> Result<(), ScError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScError::Upstream(
                "simulated notifier failure".to_string(),
            ));
        }
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(context);
        Ok(())
    }
}
