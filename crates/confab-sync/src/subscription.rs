//! Unsubscribe handles for long-lived store subscriptions.

/// Handle returned by every subscribe call.
///
/// Calling [`unsubscribe`](Self::unsubscribe) stops future deliveries.
/// Dropping the handle without calling it leaves the registration in
/// place, so callbacks may still fire after a caller has logically moved
/// on; callback code must check its own liveness before acting.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop future deliveries. Idempotent by construction (consumes self).
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
