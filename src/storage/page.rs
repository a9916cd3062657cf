//! The slotted heap page.
//!
//! A page is a fixed `PAGE_SIZE`-byte image: a bit-packed occupancy header
//! followed by fixed-width tuple slots. With `s` bytes per slot the page
//! holds `floor(PAGE_SIZE * 8 / (s * 8 + 1))` slots (one header bit plus
//! `s` bytes each); header bit `i` is `header[i/8] & (1 << (i % 8))`. The
//! layout is shared with the page files on disk, so a page image can be
//! written and re-read verbatim.
//!
//! Identity (the [`PageId`]) is immutable for the page's lifetime; the
//! byte content and the dirty marker are interior-mutable so one cached
//! page can be shared across transactions. Mutation methods are only ever
//! invoked while the caller holds the exclusive lock on this page; the
//! inner `RwLock` protects the bytes, not the locking protocol.

use parking_lot::{Mutex, RwLock};

use crate::access::tuple::{RecordId, Schema, Tuple};
use crate::catalog::TableId;
use crate::error::{DbError, DbResult};
use crate::storage::PAGE_SIZE;
use crate::transaction::TransactionId;

/// Compound page key: owning table plus position within the table's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub table: TableId,
    pub index: u32,
}

impl PageId {
    pub fn new(table: TableId, index: u32) -> Self {
        Self { table, index }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table, self.index)
    }
}

/// Number of tuple slots a page holds under the given schema.
pub fn slots_per_page(schema: &Schema) -> u16 {
    let slot_bits = schema.tuple_bytes() * 8 + 1;
    ((PAGE_SIZE * 8) / slot_bits) as u16
}

/// Bytes of occupancy header for the given slot count.
pub fn header_bytes(slots: u16) -> usize {
    (slots as usize + 7) / 8
}

/// A cached heap page.
pub struct HeapPage {
    pid: PageId,
    schema: Schema,
    slots: u16,
    header: usize,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    dirty: Mutex<Option<TransactionId>>,
}

impl HeapPage {
    /// Creates an all-empty page.
    pub fn new_empty(pid: PageId, schema: Schema) -> Self {
        Self::from_bytes(pid, schema, Box::new([0u8; PAGE_SIZE]))
    }

    /// Wraps a page image read from disk.
    pub fn from_bytes(pid: PageId, schema: Schema, data: Box<[u8; PAGE_SIZE]>) -> Self {
        let slots = slots_per_page(&schema);
        Self {
            pid,
            schema,
            slots,
            header: header_bytes(slots),
            data: RwLock::new(data),
            dirty: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn slot_count(&self) -> u16 {
        self.slots
    }

    fn slot_offset(&self, slot: u16) -> usize {
        self.header + slot as usize * self.schema.tuple_bytes()
    }

    fn slot_used(data: &[u8; PAGE_SIZE], slot: u16) -> bool {
        data[slot as usize / 8] & (1 << (slot % 8)) != 0
    }

    /// Number of free slots on this page.
    pub fn empty_slot_count(&self) -> u16 {
        let data = self.data.read();
        (0..self.slots)
            .filter(|&slot| !Self::slot_used(&data, slot))
            .count() as u16
    }

    /// Inserts a tuple into the first free slot and stamps its record id.
    ///
    /// Caller must hold the exclusive lock on this page.
    pub fn insert_tuple(&self, tuple: &mut Tuple) -> DbResult<u16> {
        let mut data = self.data.write();
        let slot = (0..self.slots)
            .find(|&slot| !Self::slot_used(&data, slot))
            .ok_or(DbError::PageFull)?;

        let offset = self.slot_offset(slot);
        let mut out = Vec::with_capacity(self.schema.tuple_bytes());
        self.schema.encode_tuple(tuple, &mut out)?;
        data[offset..offset + out.len()].copy_from_slice(&out);
        data[slot as usize / 8] |= 1 << (slot % 8);

        tuple.set_record_id(RecordId::new(self.pid, slot));
        Ok(slot)
    }

    /// Clears the occupancy bit of the given slot.
    ///
    /// Caller must hold the exclusive lock on this page.
    pub fn delete_tuple(&self, rid: RecordId) -> DbResult<()> {
        if rid.slot >= self.slots {
            return Err(DbError::InvalidSlot {
                slot: rid.slot,
                slots: self.slots,
            });
        }
        let mut data = self.data.write();
        if !Self::slot_used(&data, rid.slot) {
            return Err(DbError::SlotEmpty { slot: rid.slot });
        }
        data[rid.slot as usize / 8] &= !(1 << (rid.slot % 8));
        Ok(())
    }

    /// Decodes every live tuple on the page, record ids included.
    pub fn tuples(&self) -> DbResult<Vec<Tuple>> {
        let data = self.data.read();
        let mut out = Vec::new();
        for slot in 0..self.slots {
            if !Self::slot_used(&data, slot) {
                continue;
            }
            let offset = self.slot_offset(slot);
            let mut tuple = self
                .schema
                .decode_tuple(&data[offset..offset + self.schema.tuple_bytes()])?;
            tuple.set_record_id(RecordId::new(self.pid, slot));
            out.push(tuple);
        }
        Ok(out)
    }

    /// The transaction whose uncommitted write last touched this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        *self.dirty.lock()
    }

    pub fn mark_dirty(&self, tid: TransactionId) {
        *self.dirty.lock() = Some(tid);
    }

    pub fn clear_dirty(&self) {
        *self.dirty.lock() = None;
    }

    /// Snapshot of the page image, for flushing to disk.
    pub fn image(&self) -> Box<[u8; PAGE_SIZE]> {
        Box::new(**self.data.read())
    }

    /// Replaces the page image in place. Used to revert an aborted
    /// transaction's writes: every holder of this page observes the
    /// restored bytes.
    pub fn overwrite(&self, bytes: &[u8; PAGE_SIZE]) {
        **self.data.write() = *bytes;
    }
}

impl std::fmt::Debug for HeapPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapPage")
            .field("pid", &self.pid)
            .field("slots", &self.slots)
            .field("dirty", &self.dirtied_by())
            .finish()
    }
}
