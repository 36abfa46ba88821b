use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::assessment::AssessmentId;

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per assessment id. Holders of different ids never contend.
#[derive(Clone, Default)]
pub struct AssessmentLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AssessmentLocks {
    pub async fn acquire(&self, id: &AssessmentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(id.0.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the entry for a purged assessment.
    pub async fn forget(&self, id: &AssessmentId) {
        let mut locks = self.inner.lock().await;
        if locks.get(&id.0).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id.0);
        }
    }

    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::AssessmentLocks;
    use crate::domain::assessment::AssessmentId;

    #[tokio::test]
    async fn same_id_is_serialized() {
        let locks = AssessmentLocks::default();
        let id = AssessmentId("a-1".to_owned());
        let log = Arc::new(Mutex::new(Vec::new()));

        let guard = locks.acquire(&id).await;
        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
                log.lock().await.push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        log.lock().await.push("first");
        drop(guard);
        waiter.await.expect("join");

        assert_eq!(*log.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_ids_do_not_contend() {
        let locks = AssessmentLocks::default();
        let _first = locks.acquire(&AssessmentId("a-1".to_owned())).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&AssessmentId("a-2".to_owned())),
        )
        .await;

        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn forget_removes_idle_entries() {
        let locks = AssessmentLocks::default();
        let id = AssessmentId("a-1".to_owned());
        drop(locks.acquire(&id).await);
        assert_eq!(locks.tracked().await, 1);

        locks.forget(&id).await;
        assert_eq!(locks.tracked().await, 0);
    }
}
