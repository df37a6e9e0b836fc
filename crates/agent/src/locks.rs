use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use listing_core::domain::property::ContactId;

/// Keyed async mutexes serializing all work for one contact.
#[derive(Default)]
pub struct ContactLocks {
    locks: Mutex<HashMap<ContactId, Arc<Mutex<()>>>>,
}

pub type ContactGuard = OwnedMutexGuard<()>;

impl ContactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, contact: &ContactId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(contact.clone()).or_default().clone()
    }

    pub async fn lock(&self, contact: &ContactId) -> ContactGuard {
        self.entry(contact).await.lock_owned().await
    }

    /// `None` while another task holds the contact.
    pub async fn try_lock(&self, contact: &ContactId) -> Option<ContactGuard> {
        self.entry(contact).await.try_lock_owned().ok()
    }

    /// Drops entries nobody holds or waits on.
    pub async fn prune(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use listing_core::domain::property::ContactId;

    use super::ContactLocks;

    #[tokio::test]
    async fn try_lock_fails_only_for_the_held_contact() {
        let locks = ContactLocks::new();
        let ana = ContactId("573001112233".to_string());
        let luis = ContactId("573004445566".to_string());

        let guard = locks.lock(&ana).await;
        assert!(locks.try_lock(&ana).await.is_none());
        assert!(locks.try_lock(&luis).await.is_some());

        drop(guard);
        assert!(locks.try_lock(&ana).await.is_some());
    }

    #[tokio::test]
    async fn prune_keeps_held_entries() {
        let locks = ContactLocks::new();
        let ana = ContactId("573001112233".to_string());
        let _guard = locks.lock(&ana).await;
        let _ = locks.try_lock(&ContactId("573004445566".to_string())).await;

        assert_eq!(locks.prune().await, 1);
        assert_eq!(locks.len().await, 1);
    }
}
