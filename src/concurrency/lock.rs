//! Page lock management for two-phase locking.
//!
//! Each page moves between `Unlocked`, `Shared` (any number of holders),
//! and `Exclusive` (one holder, excluding everything else). A transaction
//! that is the sole holder of a shared lock may upgrade it in place. Locks
//! are never stepped down; they are released wholesale when the
//! transaction completes or a cached page is evicted.
//!
//! A blocked request parks on a condition variable and re-checks both the
//! grant and the wait-for graph on every wake-up. A detected cycle aborts
//! the requester synchronously out of the blocked call; the policy is
//! conservative (false positives allowed, false negatives not).

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Access level requested by a page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Lock modes supported by the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode can coexist with another holder's.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

#[derive(Debug, Default)]
struct LockTables {
    /// Granted locks: page to its holders. A page with an Exclusive entry
    /// has exactly one holder.
    holders: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// Wait-for edges: each blocked transaction and the single page it is
    /// currently waiting on. Replaced on re-attempt, removed on grant or
    /// abort.
    waiting: HashMap<TransactionId, PageId>,
}

/// The process-wide lock table shared by every transaction of one engine.
pub struct LockManager {
    tables: Mutex<LockTables>,
    released: Condvar,
    recheck: Duration,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_recheck_interval(Duration::from_millis(20))
    }

    /// Overrides how long a blocked request waits before re-running the
    /// grant and the deadlock check when no release has woken it.
    pub fn with_recheck_interval(recheck: Duration) -> Self {
        Self {
            tables: Mutex::new(LockTables::default()),
            released: Condvar::new(),
            recheck,
        }
    }

    /// Acquires a lock, blocking until it is granted or a wait-for cycle
    /// is detected. A detected cycle returns `TransactionAborted`; the
    /// caller must treat that as the transaction's termination signal.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<()> {
        let mut tables = self.tables.lock();
        loop {
            if Self::try_grant(&mut tables, tid, pid, mode) {
                tables.waiting.remove(&tid);
                return Ok(());
            }
            tables.waiting.insert(tid, pid);
            if Self::wait_would_cycle(&tables, tid, pid) {
                tables.waiting.remove(&tid);
                log::debug!("{} aborted: deadlock waiting for page {}", tid, pid);
                return Err(DbError::TransactionAborted(tid));
            }
            log::trace!("{} blocked on page {} ({:?})", tid, pid, mode);
            let _ = self.released.wait_for(&mut tables, self.recheck);
        }
    }

    /// Non-blocking acquisition attempt. Records a wait-for edge on
    /// failure and clears it on success.
    pub fn try_acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let mut tables = self.tables.lock();
        if Self::try_grant(&mut tables, tid, pid, mode) {
            tables.waiting.remove(&tid);
            true
        } else {
            tables.waiting.insert(tid, pid);
            false
        }
    }

    fn try_grant(
        tables: &mut LockTables,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> bool {
        let holders = tables.holders.entry(pid).or_default();
        match mode {
            LockMode::Shared => {
                if holders
                    .iter()
                    .any(|(&h, &m)| h != tid && m == LockMode::Exclusive)
                {
                    return false;
                }
                // A transaction already holding Exclusive keeps it.
                holders.entry(tid).or_insert(LockMode::Shared);
                true
            }
            LockMode::Exclusive => {
                if holders.keys().any(|&h| h != tid) {
                    return false;
                }
                // Fresh grant, or in-place upgrade of our own Shared entry.
                holders.insert(tid, LockMode::Exclusive);
                true
            }
        }
    }

    /// Reachability check over the wait-for graph: does some current
    /// holder of `pid` (transitively) wait on a page `tid` holds?
    ///
    /// Iterative with an explicit visited set; seeding the set with `tid`
    /// terminates any path that loops back to the requester.
    fn wait_would_cycle(tables: &LockTables, tid: TransactionId, pid: PageId) -> bool {
        let held: HashSet<PageId> = tables
            .holders
            .iter()
            .filter(|(_, holders)| holders.contains_key(&tid))
            .map(|(&p, _)| p)
            .collect();
        let Some(holders) = tables.holders.get(&pid) else {
            return false;
        };

        let mut visited: HashSet<TransactionId> = HashSet::from([tid]);
        let mut stack: Vec<TransactionId> =
            holders.keys().copied().filter(|&h| h != tid).collect();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(&waited_on) = tables.waiting.get(&current) else {
                continue;
            };
            if held.contains(&waited_on) {
                return true;
            }
            if let Some(next_holders) = tables.holders.get(&waited_on) {
                stack.extend(next_holders.keys().copied());
            }
        }
        false
    }

    /// Removes `tid`'s lock entry for one page and wakes blocked requests.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut tables = self.tables.lock();
        if let Some(holders) = tables.holders.get_mut(&pid) {
            holders.remove(&tid);
            if holders.is_empty() {
                tables.holders.remove(&pid);
            }
        }
        drop(tables);
        self.released.notify_all();
    }

    /// Forcibly clears every holder of a page. Only valid while evicting a
    /// page whose holders have abandoned it.
    pub fn release_all_holders(&self, pid: PageId) {
        let mut tables = self.tables.lock();
        tables.holders.remove(&pid);
        drop(tables);
        self.released.notify_all();
    }

    /// Clears `tid`'s wait-for record on transaction completion.
    pub fn forget(&self, tid: TransactionId) {
        self.tables.lock().waiting.remove(&tid);
    }

    /// The mode `tid` holds on `pid`, if any.
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        self.tables
            .lock()
            .holders
            .get(&pid)
            .and_then(|holders| holders.get(&tid))
            .copied()
    }

    /// Every page `tid` currently holds a lock on.
    pub fn held_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.tables
            .lock()
            .holders
            .iter()
            .filter(|(_, holders)| holders.contains_key(&tid))
            .map(|(&pid, _)| pid)
            .collect()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableId;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn pid(index: u32) -> PageId {
        PageId::new(TableId(1), index)
    }

    fn tid(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn test_lock_compatibility() {
        assert!(LockMode::Shared.is_compatible_with(&LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible_with(&LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible_with(&LockMode::Shared));
        assert!(!LockMode::Exclusive.is_compatible_with(&LockMode::Exclusive));
    }

    #[test]
    fn test_permission_mapping() {
        assert_eq!(Permission::ReadOnly.lock_mode(), LockMode::Shared);
        assert_eq!(Permission::ReadWrite.lock_mode(), LockMode::Exclusive);
    }

    #[test]
    fn test_shared_locks_coexist() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(3), pid(0), LockMode::Shared));

        assert_eq!(manager.holds(tid(1), pid(0)), Some(LockMode::Shared));
        assert_eq!(manager.holds(tid(3), pid(0)), Some(LockMode::Shared));

        // A fourth transaction cannot write while readers remain.
        assert!(!manager.try_acquire(tid(4), pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_exclusive_excludes_everyone() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        assert!(!manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert!(!manager.try_acquire(tid(2), pid(0), LockMode::Exclusive));

        // The holder itself can re-request either mode.
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert_eq!(manager.holds(tid(1), pid(0)), Some(LockMode::Exclusive));
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_upgrade_when_sole_holder() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        assert_eq!(manager.holds(tid(1), pid(0)), Some(LockMode::Exclusive));
        // The in-place upgrade never touched the wait table.
        assert!(manager.tables.lock().waiting.is_empty());
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        assert!(!manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        // The failed upgrade left the shared entry untouched.
        assert_eq!(manager.holds(tid(1), pid(0)), Some(LockMode::Shared));
    }

    #[test]
    fn test_release_frees_page() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        manager.release(tid(1), pid(0));
        assert_eq!(manager.holds(tid(1), pid(0)), None);
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Exclusive));
    }

    #[test]
    fn test_release_all_holders() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        manager.release_all_holders(pid(0));
        assert_eq!(manager.holds(tid(1), pid(0)), None);
        assert_eq!(manager.holds(tid(2), pid(0)), None);
    }

    #[test]
    fn test_held_pages() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Shared));
        assert!(manager.try_acquire(tid(1), pid(3), LockMode::Exclusive));
        let mut held = manager.held_pages(tid(1));
        held.sort_by_key(|p| p.index);
        assert_eq!(held, vec![pid(0), pid(3)]);
    }

    #[test]
    fn test_blocking_handoff() {
        let manager = Arc::new(LockManager::with_recheck_interval(Duration::from_millis(5)));
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));

        let barrier = Arc::new(Barrier::new(2));
        let handle = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.acquire(tid(2), pid(0), LockMode::Exclusive)
            })
        };

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        manager.release(tid(1), pid(0));

        assert!(handle.join().unwrap().is_ok());
        assert_eq!(manager.holds(tid(2), pid(0)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_cycle_detected_synchronously() {
        let manager = LockManager::new();
        // T1 reads P1, T2 reads P2.
        assert!(manager.try_acquire(tid(1), pid(1), LockMode::Shared));
        assert!(manager.try_acquire(tid(2), pid(2), LockMode::Shared));
        // T2 blocks trying to write P1.
        assert!(!manager.try_acquire(tid(2), pid(1), LockMode::Exclusive));
        // T1's write request on P2 closes the cycle and must abort.
        let result = manager.acquire(tid(1), pid(2), LockMode::Exclusive);
        assert!(matches!(result, Err(DbError::TransactionAborted(t)) if t == tid(1)));
        // The aborted request left no wait record behind.
        assert!(manager.tables.lock().waiting.get(&tid(1)).is_none());
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let manager = LockManager::new();
        // T1 holds P1, T2 holds P2, T3 holds P3.
        assert!(manager.try_acquire(tid(1), pid(1), LockMode::Exclusive));
        assert!(manager.try_acquire(tid(2), pid(2), LockMode::Exclusive));
        assert!(manager.try_acquire(tid(3), pid(3), LockMode::Exclusive));
        // T2 waits on P3, T3 waits on P1: a chain back to T1's holdings.
        assert!(!manager.try_acquire(tid(2), pid(3), LockMode::Exclusive));
        assert!(!manager.try_acquire(tid(3), pid(1), LockMode::Exclusive));
        // T1 requesting P2 would complete the cycle T1 -> T2 -> T3 -> T1.
        let result = manager.acquire(tid(1), pid(2), LockMode::Exclusive);
        assert!(matches!(result, Err(DbError::TransactionAborted(_))));
    }

    #[test]
    fn test_no_false_cycle_on_plain_contention() {
        let manager = Arc::new(LockManager::with_recheck_interval(Duration::from_millis(5)));
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        // T2 merely waits; T1 holds nothing T2 owns, so no cycle exists.
        let handle = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.acquire(tid(2), pid(0), LockMode::Shared))
        };
        thread::sleep(Duration::from_millis(20));
        manager.release(tid(1), pid(0));
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_forget_clears_wait_record() {
        let manager = LockManager::new();
        assert!(manager.try_acquire(tid(1), pid(0), LockMode::Exclusive));
        assert!(!manager.try_acquire(tid(2), pid(0), LockMode::Shared));
        manager.forget(tid(2));
        assert!(manager.tables.lock().waiting.get(&tid(2)).is_none());
    }
}
