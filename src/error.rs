//! Crate-wide error types.

use thiserror::Error;

use crate::catalog::TableId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Errors surfaced by the storage engine and its operators.
#[derive(Error, Debug)]
pub enum DbError {
    /// An iterator or executor method was called out of protocol order.
    #[error("invalid usage: {0}")]
    Usage(&'static str),

    #[error("unknown table: {0}")]
    UnknownTable(TableId),

    #[error("page {pid} is beyond the file extent ({pages} pages)")]
    PageOutOfBounds { pid: PageId, pages: u32 },

    #[error("tuple carries no record id; it was never inserted or scanned")]
    MissingRecordId,

    #[error("slot {slot} is out of range (page holds {slots} slots)")]
    InvalidSlot { slot: u16, slots: u16 },

    #[error("slot {slot} is empty")]
    SlotEmpty { slot: u16 },

    #[error("page is full: no free slot")]
    PageFull,

    /// Raised out of a blocked lock acquisition when a wait-for cycle is
    /// detected. The caller must abort the transaction.
    #[error("{0} aborted: deadlock detected")]
    TransactionAborted(TransactionId),

    /// Every resident page is dirty; nothing can be evicted.
    #[error("page cache is full and every resident page is dirty")]
    CacheFull,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type DbResult<T> = Result<T, DbError>;
