//! Online/offline and typing state against the ephemeral presence store.
//!
//! Presence writes are fire-and-forget relative to the rest of the system:
//! nothing in the commit discipline waits on them. Abrupt connection loss
//! self-heals through the store's disconnect-write registration rather
//! than any heartbeat timer.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use confab_shared::{PresenceRecord, TypingRecord};

use crate::error::Result;
use crate::presence_store::{
    PresenceCallback, PresenceError, PresenceErrorCallback, PresenceStore, TypingCallback,
};
use crate::subscription::Subscription;

/// Tracks one user's presence and typing indicators.
pub struct PresenceTracker<P: PresenceStore> {
    store: Arc<P>,
}

impl<P: PresenceStore> PresenceTracker<P> {
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }

    /// Mark the user online and register the compensating offline write
    /// that fires if the connection drops without an explicit
    /// [`set_offline`](Self::set_offline).
    pub async fn set_online(&self, user_id: &str, user_name: &str) -> Result<()> {
        let now = Utc::now();
        self.store
            .set_presence(PresenceRecord {
                user_id: user_id.to_string(),
                is_online: true,
                user_name: user_name.to_string(),
                last_seen: now,
            })
            .await?;

        // The store stamps last_seen with the actual disconnect time when
        // the registration fires.
        self.store
            .register_disconnect_write(
                user_id,
                PresenceRecord {
                    user_id: user_id.to_string(),
                    is_online: false,
                    user_name: user_name.to_string(),
                    last_seen: now,
                },
            )
            .await?;

        info!(user_id, "presence online");
        Ok(())
    }

    /// Mark the user offline and cancel the disconnect registration so a
    /// stale fallback can't clobber a later session.
    ///
    /// Permission failures are expected here during sign-out races (the
    /// credentials may already be gone) and are swallowed, not surfaced.
    pub async fn set_offline(&self, user_id: &str, user_name: &str) -> Result<()> {
        let record = PresenceRecord {
            user_id: user_id.to_string(),
            is_online: false,
            user_name: user_name.to_string(),
            last_seen: Utc::now(),
        };

        if let Err(e) = self.store.set_presence(record).await {
            self.swallow_teardown_denial(user_id, e)?;
        }
        if let Err(e) = self.store.cancel_disconnect_write(user_id).await {
            self.swallow_teardown_denial(user_id, e)?;
        }

        info!(user_id, "presence offline");
        Ok(())
    }

    /// Refresh the online record without re-registering the disconnect
    /// fallback. Idempotent.
    pub async fn update_presence_heartbeat(&self, user_id: &str, user_name: &str) -> Result<()> {
        self.store
            .set_presence(PresenceRecord {
                user_id: user_id.to_string(),
                is_online: true,
                user_name: user_name.to_string(),
                last_seen: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Subscribe to another user's presence record.
    pub fn subscribe_to_presence(
        &self,
        user_id: &str,
        on_data: PresenceCallback,
        on_error: PresenceErrorCallback,
    ) -> Subscription {
        self.store.subscribe_presence(user_id, on_data, on_error)
    }

    /// Subscribe to the typing indicators of a chat.
    ///
    /// The delivered list never contains the caller's own record; every
    /// store implementation gets that filter for free because it is
    /// applied here, on top of the raw subscription.
    pub fn subscribe_to_typing(
        &self,
        chat_id: &str,
        self_user_id: &str,
        on_data: TypingCallback,
        on_error: PresenceErrorCallback,
    ) -> Subscription {
        let self_id = self_user_id.to_string();
        let filtered: TypingCallback = Arc::new(move |records: Vec<TypingRecord>| {
            let others: Vec<TypingRecord> = records
                .into_iter()
                .filter(|r| r.user_id != self_id)
                .collect();
            on_data(others);
        });
        self.store.subscribe_typing(chat_id, filtered, on_error)
    }

    /// Publish a typing indicator for `(chat_id, user_id)`.
    pub async fn start_typing(&self, chat_id: &str, user_id: &str, user_name: &str) -> Result<()> {
        self.store
            .set_typing(TypingRecord {
                chat_id: chat_id.to_string(),
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                timestamp: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Clear the typing indicator. Idempotent, so any observer may clear a
    /// record left behind by a crashed client.
    pub async fn stop_typing(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.store.remove_typing(chat_id, user_id).await?;
        Ok(())
    }

    /// On the teardown path only: drop PermissionDenied, propagate the rest.
    fn swallow_teardown_denial(&self, user_id: &str, e: PresenceError) -> Result<()> {
        match e {
            PresenceError::PermissionDenied(_) => {
                debug!(user_id, "presence teardown raced sign-out, ignoring");
                Ok(())
            }
            other => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::SyncError;
    use crate::testing::MemoryPresence;

    fn tracker() -> (Arc<MemoryPresence>, PresenceTracker<MemoryPresence>) {
        let store = Arc::new(MemoryPresence::new());
        let tracker = PresenceTracker::new(Arc::clone(&store));
        (store, tracker)
    }

    #[tokio::test]
    async fn online_registers_disconnect_fallback() {
        let (store, tracker) = tracker();

        tracker.set_online("u1", "Ada").await.unwrap();

        assert!(store.presence("u1").unwrap().is_online);
        assert!(store.has_disconnect_registration("u1"));

        store.drop_connection("u1");
        let record = store.presence("u1").unwrap();
        assert!(!record.is_online);
        assert_eq!(record.user_name, "Ada");
    }

    #[tokio::test]
    async fn explicit_offline_cancels_fallback() {
        let (store, tracker) = tracker();
        tracker.set_online("u1", "Ada").await.unwrap();

        tracker.set_offline("u1", "Ada").await.unwrap();
        assert!(!store.has_disconnect_registration("u1"));

        // A later session must not be clobbered by a stale fallback.
        tracker.update_presence_heartbeat("u1", "Ada").await.unwrap();
        store.drop_connection("u1");
        assert!(store.presence("u1").unwrap().is_online);
    }

    #[tokio::test]
    async fn heartbeat_does_not_reregister() {
        let (store, tracker) = tracker();
        tracker.set_online("u1", "Ada").await.unwrap();
        tracker.set_offline("u1", "Ada").await.unwrap();

        tracker.update_presence_heartbeat("u1", "Ada").await.unwrap();
        assert!(!store.has_disconnect_registration("u1"));
    }

    #[tokio::test]
    async fn teardown_swallows_permission_denied() {
        let (store, tracker) = tracker();
        tracker.set_online("u1", "Ada").await.unwrap();

        // Sign-out race: credentials are gone by the time we tear down.
        store.deny_writes(true);
        tracker.set_offline("u1", "Ada").await.unwrap();
    }

    #[tokio::test]
    async fn setup_still_surfaces_permission_denied() {
        let (store, tracker) = tracker();
        store.deny_writes(true);

        let err = tracker.set_online("u1", "Ada").await.unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn typing_subscription_excludes_self() {
        let (_store, tracker) = tracker();
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

        let seen_cb = Arc::clone(&seen);
        let _sub = tracker.subscribe_to_typing(
            "c1",
            "u1",
            Arc::new(move |records| {
                seen_cb
                    .lock()
                    .unwrap()
                    .push(records.iter().map(|r| r.user_id.clone()).collect());
            }),
            Arc::new(|_| {}),
        );

        tracker.start_typing("c1", "u1", "Ada").await.unwrap();
        tracker.start_typing("c1", "u2", "Grace").await.unwrap();

        let snapshots = seen.lock().unwrap();
        let last = snapshots.last().unwrap();
        assert_eq!(last, &vec!["u2".to_string()]);
        // Never a payload containing the caller.
        assert!(snapshots.iter().all(|s| !s.contains(&"u1".to_string())));
    }

    #[tokio::test]
    async fn stop_typing_clears_record() {
        let (store, tracker) = tracker();
        tracker.start_typing("c1", "u1", "Ada").await.unwrap();
        assert_eq!(store.typing_records("c1").len(), 1);

        tracker.stop_typing("c1", "u1").await.unwrap();
        assert!(store.typing_records("c1").is_empty());

        // Clearing an absent record is fine.
        tracker.stop_typing("c1", "u1").await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribed_typing_callback_stops_firing() {
        let (_store, tracker) = tracker();
        let count = Arc::new(Mutex::new(0usize));

        let count_cb = Arc::clone(&count);
        let sub = tracker.subscribe_to_typing(
            "c1",
            "observer",
            Arc::new(move |_| {
                *count_cb.lock().unwrap() += 1;
            }),
            Arc::new(|_| {}),
        );

        tracker.start_typing("c1", "u2", "Grace").await.unwrap();
        let before = *count.lock().unwrap();
        assert!(before > 0);

        sub.unsubscribe();
        tracker.start_typing("c1", "u3", "Edsger").await.unwrap();
        assert_eq!(*count.lock().unwrap(), before);
    }
}
