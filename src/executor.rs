//! Query operators over the storage engine.
//!
//! Volcano-style iterator model: each executor produces tuples one at a
//! time via `next()`, after a mandatory `init()`. Calling a positional
//! method before `init` is a usage error. `rewind` restarts the operator
//! from its first tuple; blocking and locking happen inside the page
//! fetches the operators issue.

use std::sync::Arc;

use crate::access::tuple::{Schema, Tuple};
use crate::catalog::Catalog;
use crate::database::Database;
use crate::error::DbResult;
use crate::storage::cache::PageCache;

pub mod aggregate;
pub mod delete;
pub mod filter;
pub mod insert;
pub mod join;
pub mod seq_scan;

pub use aggregate::{AggregateExecutor, AggregateOp};
pub use delete::DeleteExecutor;
pub use filter::{FilterExecutor, Predicate};
pub use insert::InsertExecutor;
pub use join::{JoinExecutor, JoinPredicate};
pub use seq_scan::SeqScanExecutor;

/// Trait for all query executors.
pub trait Executor: Send {
    /// Prepares the executor. Must be called before `next` or `rewind`.
    fn init(&mut self) -> DbResult<()>;

    /// The next output tuple, or `None` when exhausted.
    fn next(&mut self) -> DbResult<Option<Tuple>>;

    /// Restarts the executor from its first output tuple.
    fn rewind(&mut self) -> DbResult<()>;

    /// The output schema of this executor.
    fn schema(&self) -> &Schema;
}

/// Shared resources an executor tree runs against.
#[derive(Clone)]
pub struct ExecutionContext {
    pub catalog: Arc<Catalog>,
    pub cache: Arc<PageCache>,
}

impl ExecutionContext {
    pub fn new(catalog: Arc<Catalog>, cache: Arc<PageCache>) -> Self {
        Self { catalog, cache }
    }

    pub fn from_database(db: &Database) -> Self {
        Self {
            catalog: Arc::clone(db.catalog()),
            cache: Arc::clone(db.page_cache()),
        }
    }
}
