//! Serialized reconciliation runs over a shared store.
//!
//! Runs on one medium never overlap, and chapter/section rank insertion is
//! exclusive per lecture: a run holds its medium's lock, then its lecture's.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use scriptsync_shared::{
    AnchorStore, BookmarkRecord, CurriculumStore, OutlineConfig, ReferralStore, Result,
    ScriptSyncError,
};

use crate::destinations::{self, DestinationSync};
use crate::manuscript::{self, ImportOutcome, Manuscript};

type LockMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Per-medium and per-lecture run locks.
#[derive(Debug, Default)]
pub struct RunLocks {
    media: LockMap,
    lectures: LockMap,
}

/// Held for the duration of a mutating run. Dropping it releases both locks
/// and forgets the ones no other run holds or waits for.
#[derive(Debug)]
pub struct RunGuard<'a> {
    locks: &'a RunLocks,
    medium_id: String,
    lecture_id: Option<String>,
    medium: Option<OwnedMutexGuard<()>>,
    lecture: Option<OwnedMutexGuard<()>>,
}

fn slot(map: &LockMap, key: &str) -> Arc<AsyncMutex<()>> {
    let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
    map.entry(key.to_string()).or_default().clone()
}

/// Drop the entry for `key` when the map holds its only reference. Every
/// clone is taken under the map lock, so no run can be about to use it.
fn forget_idle(map: &LockMap, key: &str) {
    let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
    if map.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        map.remove(key);
    }
}

impl RunLocks {
    /// Wait for the medium's lock, then for the lecture's.
    pub async fn acquire(&self, medium_id: &str, lecture_id: Option<&str>) -> RunGuard<'_> {
        let medium = slot(&self.media, medium_id).lock_owned().await;
        let lecture = match lecture_id {
            Some(id) => Some(slot(&self.lectures, id).lock_owned().await),
            None => None,
        };
        debug!(medium_id, lecture_id, "run locks acquired");
        RunGuard {
            locks: self,
            medium_id: medium_id.to_string(),
            lecture_id: lecture_id.map(String::from),
            medium: Some(medium),
            lecture,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lecture.take();
        self.medium.take();
        if let Some(lecture_id) = &self.lecture_id {
            forget_idle(&self.locks.lectures, lecture_id);
        }
        forget_idle(&self.locks.media, &self.medium_id);
    }
}

/// Entry point for callers that may run reconciliations concurrently.
pub struct Reconciler<S> {
    store: S,
    outline: OutlineConfig,
    locks: RunLocks,
}

impl<S> Reconciler<S>
where
    S: CurriculumStore + AnchorStore + ReferralStore,
{
    pub fn new(store: S, outline: OutlineConfig) -> Self {
        Self {
            store,
            outline,
            locks: RunLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn lock_run(&self, medium_id: &str) -> Result<RunGuard<'_>> {
        let medium = self
            .store
            .get_medium(medium_id)
            .await?
            .ok_or_else(|| ScriptSyncError::not_found("medium", medium_id))?;
        Ok(self
            .locks
            .acquire(&medium.id, medium.lecture_id.as_deref())
            .await)
    }

    /// Load and match an outline without writing anything.
    pub async fn check(&self, medium_id: &str, bookmarks: &[BookmarkRecord]) -> Result<Manuscript> {
        Manuscript::load(&self.store, medium_id, bookmarks.to_vec(), &self.outline).await
    }

    pub async fn import(
        &self,
        medium_id: &str,
        bookmarks: &[BookmarkRecord],
    ) -> Result<ImportOutcome> {
        let _guard = self.lock_run(medium_id).await?;
        manuscript::import_if_eligible(&self.store, bookmarks, medium_id, &self.outline).await
    }

    pub async fn sync_destinations(
        &self,
        medium_id: &str,
        bookmarks: &[BookmarkRecord],
    ) -> Result<DestinationSync> {
        let _guard = self.lock_run(medium_id).await?;
        destinations::reconcile_destinations(&self.store, medium_id, bookmarks).await
    }

    pub async fn reset_destinations(
        &self,
        medium_id: &str,
        bookmarks: &[BookmarkRecord],
    ) -> Result<DestinationSync> {
        let _guard = self.lock_run(medium_id).await?;
        destinations::reset_destinations(&self.store, medium_id, bookmarks).await
    }

    pub async fn destroy_destinations(
        &self,
        medium_id: &str,
        destinations: &[String],
    ) -> Result<usize> {
        let _guard = self.lock_run(medium_id).await?;
        destinations::destroy_destinations(&self.store, medium_id, destinations).await
    }
}
