//! The bounded page cache shared by every transaction of one engine.
//!
//! All page access funnels through [`PageCache::fetch`]: the cache makes
//! the page resident (evicting the least-recently-used clean page when
//! full), acquires the page lock on the caller's behalf, and records the
//! page in the transaction's page set so completion can release every
//! lock the transaction ever took, not only the ones it wrote under.
//!
//! A dirty page is never evicted; when every resident page is dirty a
//! fetch miss fails with `CacheFull` rather than force-writing
//! uncommitted data. Transaction completion also lives here, next to the
//! page-set bookkeeping it consumes.

pub mod lru;

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::concurrency::lock::{LockManager, Permission};
use crate::error::{DbError, DbResult};
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;
use lru::LruList;

#[derive(Default)]
struct CacheState {
    resident: HashMap<PageId, Arc<HeapPage>>,
    order: LruList,
    /// Every page a transaction fetched, read or write.
    tx_pages: HashMap<TransactionId, HashSet<PageId>>,
}

/// Bounded `PageId -> HeapPage` cache with LRU eviction.
pub struct PageCache {
    capacity: usize,
    catalog: Arc<Catalog>,
    locks: Arc<LockManager>,
    state: Mutex<CacheState>,
}

impl PageCache {
    pub fn new(catalog: Arc<Catalog>, locks: Arc<LockManager>, capacity: usize) -> Self {
        Self {
            capacity,
            catalog,
            locks,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Retrieves a page with the given permission, blocking until the
    /// corresponding lock is granted. A `TransactionAborted` error means
    /// the caller was chosen as a deadlock victim and must complete the
    /// transaction with `commit = false`.
    pub fn fetch(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> DbResult<Arc<HeapPage>> {
        loop {
            self.ensure_resident(pid)?;
            // The cache mutex is not held while blocking on the lock.
            self.locks.acquire(tid, pid, perm.lock_mode())?;

            let mut state = self.state.lock();
            if let Some(page) = state.resident.get(&pid).cloned() {
                state.order.touch(pid);
                state.tx_pages.entry(tid).or_default().insert(pid);
                return Ok(page);
            }
            // The page was evicted while this caller waited on the lock;
            // reload and try again (the lock is already held now).
            drop(state);
        }
    }

    fn ensure_resident(&self, pid: PageId) -> DbResult<()> {
        let mut state = self.state.lock();
        if state.resident.contains_key(&pid) {
            state.order.touch(pid);
            return Ok(());
        }
        if state.resident.len() >= self.capacity {
            self.evict_one(&mut state)?;
        }
        let file = self.catalog.file(pid.table)?;
        let page = file.read_page(pid)?;
        state.resident.insert(pid, Arc::new(page));
        state.order.touch(pid);
        Ok(())
    }

    /// Removes the least-recently-used clean page. Locks still held on
    /// the victim are force-released: eviction can race another
    /// transaction's access pattern, and a stale lock on a non-resident
    /// page must not outlive the page.
    fn evict_one(&self, state: &mut CacheState) -> DbResult<()> {
        let victim = {
            let CacheState {
                resident, order, ..
            } = state;
            order
                .iter_lru()
                .find(|pid| resident.get(pid).is_some_and(|p| p.dirtied_by().is_none()))
        };
        let victim = victim.ok_or(DbError::CacheFull)?;
        log::debug!("evicting page {}", victim);
        state.resident.remove(&victim);
        state.order.remove(victim);
        self.locks.release_all_holders(victim);
        Ok(())
    }

    /// Drops a page from the cache without flushing it.
    pub fn discard(&self, pid: PageId) {
        let mut state = self.state.lock();
        state.resident.remove(&pid);
        state.order.remove(pid);
    }

    /// Commits or aborts a transaction: flushes (commit) or reverts
    /// (abort) every page it dirtied, then releases every lock it holds.
    ///
    /// Calling this twice for the same transaction is a no-op the second
    /// time; two threads detecting a mutual deadlock may both trigger the
    /// abort of the same victim.
    pub fn complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let pids = match self.state.lock().tx_pages.remove(&tid) {
            Some(pids) => pids,
            None => return Ok(()),
        };
        for pid in pids {
            let page = self.state.lock().resident.get(&pid).cloned();
            if let Some(page) = page {
                if page.dirtied_by() == Some(tid) {
                    let file = self.catalog.file(pid.table)?;
                    if commit {
                        log::debug!("{} flushing page {}", tid, pid);
                        file.write_page(&page)?;
                    } else {
                        log::debug!("{} reverting page {}", tid, pid);
                        page.overwrite(&*file.read_image(pid)?);
                    }
                    page.clear_dirty();
                }
            }
            // Flush/revert happens before the lock release so no other
            // transaction can fetch uncommitted bytes in between.
            self.locks.release(tid, pid);
        }
        self.locks.forget(tid);
        Ok(())
    }

    /// Resident page count.
    pub fn len(&self) -> usize {
        self.state.lock().resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pid: PageId) -> bool {
        self.state.lock().resident.contains_key(&pid)
    }

    /// The pages a transaction has fetched so far.
    pub fn transaction_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.state
            .lock()
            .tx_pages
            .get(&tid)
            .map(|pids| pids.iter().copied().collect())
            .unwrap_or_default()
    }
}
