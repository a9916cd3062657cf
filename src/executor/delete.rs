//! Delete executor.

use crate::access::tuple::{Column, Schema, Tuple};
use crate::access::value::{Field, FieldType};
use crate::error::{DbError, DbResult};
use crate::executor::{ExecutionContext, Executor};
use crate::transaction::TransactionId;

/// Deletes every tuple the child produces and emits the affected count.
///
/// Child tuples must carry record ids (a scan, possibly filtered, does).
pub struct DeleteExecutor {
    context: ExecutionContext,
    tid: TransactionId,
    child: Box<dyn Executor>,
    schema: Schema,
    deleted: Option<i32>,
    emitted: bool,
    initialized: bool,
}

impl DeleteExecutor {
    pub fn new(context: ExecutionContext, tid: TransactionId, child: Box<dyn Executor>) -> Self {
        Self {
            context,
            tid,
            child,
            schema: Schema::new(vec![Column::new("count", FieldType::Int)]),
            deleted: None,
            emitted: false,
            initialized: false,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> DbResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.child.init()?;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        if self.emitted {
            return Ok(None);
        }
        let count = match self.deleted {
            Some(count) => count,
            None => {
                let mut count = 0;
                while let Some(tuple) = self.child.next()? {
                    let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
                    let file = self.context.catalog.file(rid.page.table)?;
                    file.delete_tuple(&self.context.cache, self.tid, &tuple)?;
                    count += 1;
                }
                self.deleted = Some(count);
                count
            }
        };
        self.emitted = true;
        Ok(Some(Tuple::new(vec![Field::Int(count)])))
    }

    fn rewind(&mut self) -> DbResult<()> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        self.emitted = false;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::CompareOp;
    use crate::executor::{FilterExecutor, Predicate, SeqScanExecutor};
    use crate::database::Database;
    use tempfile::tempdir;

    #[test]
    fn test_delete_filtered_rows() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::with_capacity(8);
        let schema = Schema::from_types(&[FieldType::Int]);
        let table = db.create_table(dir.path().join("d.dat"), "d", schema)?;

        let t = db.begin();
        for i in 0..10 {
            let mut tuple = Tuple::new(vec![Field::Int(i)]);
            db.insert_tuple(t, table, &mut tuple)?;
        }
        db.commit(t)?;

        // Delete the rows below five.
        let writer = db.begin();
        let context = ExecutionContext::from_database(&db);
        let scan = SeqScanExecutor::new(context.clone(), writer, table)?;
        let matching = FilterExecutor::new(
            Box::new(scan),
            Predicate::new(0, CompareOp::Lt, Field::Int(5)),
        );
        let mut delete = DeleteExecutor::new(context.clone(), writer, Box::new(matching));
        delete.init()?;
        let count = delete.next()?.expect("count tuple");
        assert_eq!(count.field(0), &Field::Int(5));
        assert!(delete.next()?.is_none());
        db.commit(writer)?;

        let reader = db.begin();
        let mut scan = SeqScanExecutor::new(context, reader, table)?;
        scan.init()?;
        let mut remaining = Vec::new();
        while let Some(tuple) = scan.next()? {
            remaining.push(tuple.field(0).clone());
        }
        assert_eq!(
            remaining,
            vec![
                Field::Int(5),
                Field::Int(6),
                Field::Int(7),
                Field::Int(8),
                Field::Int(9)
            ]
        );
        db.commit(reader)?;
        Ok(())
    }
}
