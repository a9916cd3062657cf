//! The engine context.
//!
//! A `Database` owns one catalog, one lock manager, and one page cache,
//! and hands out transaction ids. All shared state is reached through an
//! explicitly constructed instance, so several engines can coexist in one
//! process (as the tests do).

use std::path::PathBuf;
use std::sync::Arc;

use crate::access::heap::{HeapFile, TableScan};
use crate::access::tuple::{Schema, Tuple};
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::{LockManager, Permission};
use crate::error::{DbError, DbResult};
use crate::storage::cache::PageCache;
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::{TransactionId, TransactionIdGenerator};

/// Default page-cache capacity, in pages.
pub const DEFAULT_CACHE_PAGES: usize = 50;

pub struct Database {
    catalog: Arc<Catalog>,
    locks: Arc<LockManager>,
    cache: Arc<PageCache>,
    tx_ids: TransactionIdGenerator,
}

impl Database {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_PAGES)
    }

    /// Builds an engine with the given page-cache capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let catalog = Arc::new(Catalog::new());
        let locks = Arc::new(LockManager::new());
        let cache = Arc::new(PageCache::new(
            Arc::clone(&catalog),
            Arc::clone(&locks),
            capacity,
        ));
        Self {
            catalog,
            locks,
            cache,
            tx_ids: TransactionIdGenerator::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn page_cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Starts a new transaction.
    pub fn begin(&self) -> TransactionId {
        let tid = self.tx_ids.next();
        log::debug!("{} begins", tid);
        tid
    }

    /// Creates a table backed by a fresh heap file and registers it.
    pub fn create_table(
        &self,
        path: impl Into<PathBuf>,
        name: &str,
        schema: Schema,
    ) -> DbResult<TableId> {
        let file = Arc::new(HeapFile::create(path, schema)?);
        Ok(self.catalog.register_table(file, name))
    }

    /// Registers a table backed by an existing heap file.
    pub fn open_table(
        &self,
        path: impl Into<PathBuf>,
        name: &str,
        schema: Schema,
    ) -> DbResult<TableId> {
        let file = Arc::new(HeapFile::open(path, schema)?);
        Ok(self.catalog.register_table(file, name))
    }

    /// Fetches a page with the given permission, blocking on its lock.
    pub fn fetch_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> DbResult<Arc<HeapPage>> {
        self.cache.fetch(tid, pid, perm)
    }

    /// Inserts a tuple into a table on behalf of `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table: TableId,
        tuple: &mut Tuple,
    ) -> DbResult<()> {
        self.catalog.file(table)?.insert_tuple(&self.cache, tid, tuple)
    }

    /// Deletes a tuple located by its record id on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        self.catalog
            .file(rid.page.table)?
            .delete_tuple(&self.cache, tid, tuple)
    }

    /// A sequential scan of a table under `tid`.
    pub fn scan(&self, tid: TransactionId, table: TableId) -> DbResult<TableScan> {
        let file = self.catalog.file(table)?;
        Ok(file.scan(Arc::clone(&self.cache), tid))
    }

    /// Commits or aborts a transaction. Safe to call twice for the same
    /// id; the second call is a no-op.
    pub fn complete_transaction(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        log::debug!("{} completing (commit = {})", tid, commit);
        self.cache.complete(tid, commit)
    }

    pub fn commit(&self, tid: TransactionId) -> DbResult<()> {
        self.complete_transaction(tid, true)
    }

    pub fn abort(&self, tid: TransactionId) -> DbResult<()> {
        self.complete_transaction(tid, false)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{Field, FieldType};
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::from_types(&[FieldType::Int, FieldType::Text])
    }

    fn row(id: i32, name: &str) -> Tuple {
        Tuple::new(vec![Field::Int(id), Field::Text(name.into())])
    }

    #[test]
    fn test_begin_hands_out_distinct_ids() {
        let db = Database::new();
        let a = db.begin();
        let b = db.begin();
        assert_ne!(a, b);
    }

    #[test]
    fn test_insert_commit_scan() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::with_capacity(8);
        let table = db.create_table(dir.path().join("users.dat"), "users", schema())?;

        let t = db.begin();
        let mut tuple = row(1, "ada");
        db.insert_tuple(t, table, &mut tuple)?;
        db.commit(t)?;

        let reader = db.begin();
        let mut scan = db.scan(reader, table)?;
        scan.open()?;
        let found = scan.next()?.expect("one row");
        assert_eq!(found.field(1), &Field::Text("ada".into()));
        assert!(scan.next()?.is_none());
        db.commit(reader)?;
        Ok(())
    }

    #[test]
    fn test_committed_rows_survive_reopen() -> DbResult<()> {
        let dir = tempdir()?;
        let path = dir.path().join("users.dat");
        {
            let db = Database::with_capacity(8);
            let table = db.create_table(&path, "users", schema())?;
            let t = db.begin();
            let mut tuple = row(7, "grace");
            db.insert_tuple(t, table, &mut tuple)?;
            db.commit(t)?;
        }

        // A second engine over the same file sees the committed data.
        let db = Database::with_capacity(8);
        let table = db.open_table(&path, "users", schema())?;
        let t = db.begin();
        let mut scan = db.scan(t, table)?;
        scan.open()?;
        let found = scan.next()?.expect("one row");
        assert_eq!(found.field(0), &Field::Int(7));
        db.commit(t)?;
        Ok(())
    }

    #[test]
    fn test_aborted_insert_leaves_nothing() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::with_capacity(8);
        let table = db.create_table(dir.path().join("users.dat"), "users", schema())?;

        let t = db.begin();
        let mut tuple = row(1, "ghost");
        db.insert_tuple(t, table, &mut tuple)?;
        db.abort(t)?;

        let reader = db.begin();
        let mut scan = db.scan(reader, table)?;
        scan.open()?;
        assert!(scan.next()?.is_none());
        db.commit(reader)?;
        Ok(())
    }

    #[test]
    fn test_delete_without_record_id_fails() {
        let db = Database::new();
        let t = db.begin();
        let orphan = row(1, "x");
        assert!(matches!(
            db.delete_tuple(t, &orphan),
            Err(DbError::MissingRecordId)
        ));
    }
}
