//! Heap files: one table's pages on stable storage.
//!
//! A heap file is a flat sequence of fixed-size pages holding tuples in
//! no particular order. Page-granularity read/write goes straight to the
//! file; tuple-granularity insert and delete go through the page cache so
//! every page access participates in caching and locking uniformly.
//! The page count only grows; there is no compaction.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::access::tuple::{Schema, Tuple};
use crate::catalog::TableId;
use crate::concurrency::lock::Permission;
use crate::error::{DbError, DbResult};
use crate::storage::cache::PageCache;
use crate::storage::page::{HeapPage, PageId};
use crate::storage::PAGE_SIZE;
use crate::transaction::TransactionId;

/// One table's on-disk page file.
pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    table: TableId,
    schema: Schema,
    pages: AtomicU32,
}

impl HeapFile {
    /// Creates an empty heap file, truncating anything already there.
    pub fn create(path: impl Into<PathBuf>, schema: Schema) -> DbResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        let table = derive_table_id(&path);
        Ok(Self {
            path,
            file: Mutex::new(file),
            table,
            schema,
            pages: AtomicU32::new(0),
        })
    }

    /// Opens an existing heap file; the page count comes from its length.
    pub fn open(path: impl Into<PathBuf>, schema: Schema) -> DbResult<Self> {
        let path = path.into();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        let table = derive_table_id(&path);
        Ok(Self {
            path,
            file: Mutex::new(file),
            table,
            schema,
            pages: AtomicU32::new(pages),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table_id(&self) -> TableId {
        self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn page_count(&self) -> u32 {
        self.pages.load(Ordering::SeqCst)
    }

    /// Reads a raw page image from disk.
    pub fn read_image(&self, pid: PageId) -> DbResult<Box<[u8; PAGE_SIZE]>> {
        let pages = self.page_count();
        if pid.index >= pages {
            return Err(DbError::PageOutOfBounds { pid, pages });
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pid.index as u64 * PAGE_SIZE as u64))?;
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        file.read_exact(buf.as_mut())?;
        Ok(buf)
    }

    /// Reads a page from disk.
    pub fn read_page(&self, pid: PageId) -> DbResult<HeapPage> {
        let image = self.read_image(pid)?;
        Ok(HeapPage::from_bytes(pid, self.schema.clone(), image))
    }

    /// Writes a page's byte image back to its on-disk offset.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let pid = page.pid();
        let pages = self.page_count();
        if pid.index >= pages {
            // Backing store is only extended by allocate_page.
            return Err(DbError::PageOutOfBounds { pid, pages });
        }
        let image = page.image();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pid.index as u64 * PAGE_SIZE as u64))?;
        file.write_all(image.as_ref())?;
        file.sync_all()?;
        Ok(())
    }

    /// Appends a zeroed page to the file and advances the page count.
    pub fn allocate_page(&self) -> DbResult<PageId> {
        let file = self.file.lock();
        let index = self.pages.load(Ordering::SeqCst);
        file.set_len((index as u64 + 1) * PAGE_SIZE as u64)?;
        file.sync_all()?;
        self.pages.store(index + 1, Ordering::SeqCst);
        log::debug!("table {} extended to {} pages", self.table, index + 1);
        Ok(PageId::new(self.table, index))
    }

    /// Inserts a tuple into the first page with a free slot, extending the
    /// file when every existing page is full. The touched page is marked
    /// dirty under `tid` and the tuple receives its record id.
    pub fn insert_tuple(
        &self,
        cache: &PageCache,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<()> {
        for index in 0..self.page_count() {
            let pid = PageId::new(self.table, index);
            let page = cache.fetch(tid, pid, Permission::ReadWrite)?;
            if page.empty_slot_count() > 0 {
                page.insert_tuple(tuple)?;
                page.mark_dirty(tid);
                return Ok(());
            }
        }
        // Every existing page is full. Persist the new page's existence
        // first, then re-fetch it through the cache so it is locked and
        // tracked like any other page.
        let pid = self.allocate_page()?;
        let page = cache.fetch(tid, pid, Permission::ReadWrite)?;
        page.insert_tuple(tuple)?;
        page.mark_dirty(tid);
        Ok(())
    }

    /// Deletes a tuple by its record id from a prior insert or scan.
    pub fn delete_tuple(
        &self,
        cache: &PageCache,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let pages = self.page_count();
        if rid.page.table != self.table || rid.page.index >= pages {
            return Err(DbError::PageOutOfBounds {
                pid: rid.page,
                pages,
            });
        }
        let page = cache.fetch(tid, rid.page, Permission::ReadWrite)?;
        page.delete_tuple(rid)?;
        page.mark_dirty(tid);
        Ok(())
    }

    /// A restartable sequential scan over this table's live tuples.
    pub fn scan(self: &Arc<Self>, cache: Arc<PageCache>, tid: TransactionId) -> TableScan {
        TableScan {
            file: Arc::clone(self),
            cache,
            tid,
            next_index: 0,
            buffered: VecDeque::new(),
            opened: false,
        }
    }
}

fn derive_table_id(path: &Path) -> TableId {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    TableId(hasher.finish() as u32)
}

/// Lazy cross-page tuple sequence.
///
/// Pages are pulled one at a time with read permission and drained before
/// advancing, so the scan's cache and lock footprint stays at one page.
/// Positional calls before `open` or after `close` are usage errors.
pub struct TableScan {
    file: Arc<HeapFile>,
    cache: Arc<PageCache>,
    tid: TransactionId,
    next_index: u32,
    buffered: VecDeque<Tuple>,
    opened: bool,
}

impl TableScan {
    pub fn open(&mut self) -> DbResult<()> {
        self.opened = true;
        self.next_index = 0;
        self.buffered.clear();
        Ok(())
    }

    /// The next live tuple, or `None` once the table is exhausted.
    pub fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.opened {
            return Err(DbError::Usage("scan is not open"));
        }
        loop {
            if let Some(tuple) = self.buffered.pop_front() {
                return Ok(Some(tuple));
            }
            if self.next_index >= self.file.page_count() {
                return Ok(None);
            }
            let pid = PageId::new(self.file.table_id(), self.next_index);
            self.next_index += 1;
            let page = self.cache.fetch(self.tid, pid, Permission::ReadOnly)?;
            self.buffered = page.tuples()?.into();
        }
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) -> DbResult<()> {
        if !self.opened {
            return Err(DbError::Usage("scan is not open"));
        }
        self.next_index = 0;
        self.buffered.clear();
        Ok(())
    }

    pub fn close(&mut self) {
        self.opened = false;
        self.buffered.clear();
    }
}
