//! Sequential scan executor.

use crate::access::heap::TableScan;
use crate::access::tuple::{Schema, Tuple};
use crate::catalog::TableId;
use crate::error::{DbError, DbResult};
use crate::executor::{ExecutionContext, Executor};
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Produces every live tuple of a table, one page at a time.
pub struct SeqScanExecutor {
    context: ExecutionContext,
    table: TableId,
    tid: TransactionId,
    schema: Schema,
    scan: Option<TableScan>,
}

impl SeqScanExecutor {
    pub fn new(context: ExecutionContext, tid: TransactionId, table: TableId) -> DbResult<Self> {
        let schema = context.catalog.schema(table)?;
        Ok(Self {
            context,
            table,
            tid,
            schema,
            scan: None,
        })
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> DbResult<()> {
        if self.scan.is_some() {
            return Ok(());
        }
        let file = self.context.catalog.file(self.table)?;
        let mut scan = file.scan(Arc::clone(&self.context.cache), self.tid);
        scan.open()?;
        self.scan = Some(scan);
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        self.scan
            .as_mut()
            .ok_or(DbError::Usage("executor is not initialized"))?
            .next()
    }

    fn rewind(&mut self) -> DbResult<()> {
        self.scan
            .as_mut()
            .ok_or(DbError::Usage("executor is not initialized"))?
            .rewind()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
