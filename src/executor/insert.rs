//! Insert executor.

use crate::access::tuple::{Column, Schema, Tuple};
use crate::access::value::{Field, FieldType};
use crate::catalog::TableId;
use crate::error::{DbError, DbResult};
use crate::executor::{ExecutionContext, Executor};
use crate::transaction::TransactionId;

/// Inserts a batch of rows into a table and emits the affected count.
pub struct InsertExecutor {
    context: ExecutionContext,
    tid: TransactionId,
    table: TableId,
    rows: Vec<Tuple>,
    schema: Schema,
    inserted: Option<i32>,
    emitted: bool,
    initialized: bool,
}

impl InsertExecutor {
    pub fn new(
        context: ExecutionContext,
        tid: TransactionId,
        table: TableId,
        rows: Vec<Tuple>,
    ) -> Self {
        Self {
            context,
            tid,
            table,
            rows,
            schema: Schema::new(vec![Column::new("count", FieldType::Int)]),
            inserted: None,
            emitted: false,
            initialized: false,
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> DbResult<()> {
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
        // The batch is applied exactly once; rewinding only replays the
        // count tuple.
        let count = match self.inserted {
            Some(count) => count,
            None => {
                let file = self.context.catalog.file(self.table)?;
                let mut rows = std::mem::take(&mut self.rows);
                for row in rows.iter_mut() {
                    file.insert_tuple(&self.context.cache, self.tid, row)?;
                }
                let count = rows.len() as i32;
                self.inserted = Some(count);
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
    use crate::database::Database;
    use crate::executor::SeqScanExecutor;
    use tempfile::tempdir;

    #[test]
    fn test_insert_reports_count_and_rows_land() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::with_capacity(8);
        let schema = Schema::from_types(&[FieldType::Int]);
        let table = db.create_table(dir.path().join("i.dat"), "i", schema)?;

        let t = db.begin();
        let rows = (0..4)
            .map(|i| Tuple::new(vec![Field::Int(i)]))
            .collect::<Vec<_>>();
        let mut insert = InsertExecutor::new(ExecutionContext::from_database(&db), t, table, rows);
        insert.init()?;

        let count = insert.next()?.expect("count tuple");
        assert_eq!(count.field(0), &Field::Int(4));
        assert!(insert.next()?.is_none());

        // Rewind replays the count without inserting again.
        insert.rewind()?;
        assert_eq!(insert.next()?.unwrap().field(0), &Field::Int(4));
        db.commit(t)?;

        let reader = db.begin();
        let mut scan = SeqScanExecutor::new(ExecutionContext::from_database(&db), reader, table)?;
        scan.init()?;
        let mut seen = 0;
        while scan.next()?.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 4);
        db.commit(reader)?;
        Ok(())
    }

    #[test]
    fn test_insert_requires_init() {
        let db = Database::new();
        let t = db.begin();
        let mut insert = InsertExecutor::new(
            ExecutionContext::from_database(&db),
            t,
            crate::catalog::TableId(1),
            Vec::new(),
        );
        assert!(matches!(insert.next(), Err(DbError::Usage(_))));
    }
}
