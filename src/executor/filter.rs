//! Filter executor.

use crate::access::tuple::{Schema, Tuple};
use crate::access::value::{CompareOp, Field};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;

/// A column-operator-constant comparison.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub column: usize,
    pub op: CompareOp,
    pub operand: Field,
}

impl Predicate {
    pub fn new(column: usize, op: CompareOp, operand: Field) -> Self {
        Self {
            column,
            op,
            operand,
        }
    }

    pub fn matches(&self, tuple: &Tuple) -> DbResult<bool> {
        if self.column >= tuple.fields().len() {
            return Err(DbError::SchemaMismatch(format!(
                "predicate column {} out of range for a {}-field tuple",
                self.column,
                tuple.fields().len()
            )));
        }
        tuple.field(self.column).compare(self.op, &self.operand)
    }
}

/// Passes through the child's tuples that satisfy a predicate.
pub struct FilterExecutor {
    child: Box<dyn Executor>,
    predicate: Predicate,
    schema: Schema,
    initialized: bool,
}

impl FilterExecutor {
    pub fn new(child: Box<dyn Executor>, predicate: Predicate) -> Self {
        Self {
            child,
            predicate,
            schema: Schema::new(Vec::new()),
            initialized: false,
        }
    }
}

impl Executor for FilterExecutor {
    fn init(&mut self) -> DbResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.child.init()?;
        self.schema = self.child.schema().clone();
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        while let Some(tuple) = self.child.next()? {
            if self.predicate.matches(&tuple)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> DbResult<()> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        self.child.rewind()
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::FieldType;
    use crate::database::Database;
    use crate::executor::{ExecutionContext, SeqScanExecutor};
    use tempfile::tempdir;

    #[test]
    fn test_filter_selects_matching_rows() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::with_capacity(8);
        let schema = Schema::from_types(&[FieldType::Int, FieldType::Text]);
        let table = db.create_table(dir.path().join("f.dat"), "f", schema)?;

        let t = db.begin();
        for i in 0..10 {
            let mut tuple = Tuple::new(vec![Field::Int(i), Field::Text(format!("r{}", i))]);
            db.insert_tuple(t, table, &mut tuple)?;
        }
        db.commit(t)?;

        let reader = db.begin();
        let scan = SeqScanExecutor::new(ExecutionContext::from_database(&db), reader, table)?;
        let mut filter = FilterExecutor::new(
            Box::new(scan),
            Predicate::new(0, CompareOp::Ge, Field::Int(7)),
        );
        filter.init()?;

        let mut matched = Vec::new();
        while let Some(tuple) = filter.next()? {
            matched.push(tuple.field(0).clone());
        }
        assert_eq!(matched, vec![Field::Int(7), Field::Int(8), Field::Int(9)]);
        db.commit(reader)?;
        Ok(())
    }

    #[test]
    fn test_filter_on_text_column() -> DbResult<()> {
        let dir = tempdir()?;
        let db = Database::with_capacity(8);
        let schema = Schema::from_types(&[FieldType::Int, FieldType::Text]);
        let table = db.create_table(dir.path().join("f.dat"), "f", schema)?;

        let t = db.begin();
        for name in ["ada", "bob", "ada"] {
            let mut tuple = Tuple::new(vec![Field::Int(0), Field::Text(name.into())]);
            db.insert_tuple(t, table, &mut tuple)?;
        }
        db.commit(t)?;

        let reader = db.begin();
        let scan = SeqScanExecutor::new(ExecutionContext::from_database(&db), reader, table)?;
        let mut filter = FilterExecutor::new(
            Box::new(scan),
            Predicate::new(1, CompareOp::Eq, Field::Text("ada".into())),
        );
        filter.init()?;

        let mut count = 0;
        while filter.next()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        db.commit(reader)?;
        Ok(())
    }

    #[test]
    fn test_predicate_out_of_range_column() {
        let predicate = Predicate::new(5, CompareOp::Eq, Field::Int(1));
        let tuple = Tuple::new(vec![Field::Int(1)]);
        assert!(predicate.matches(&tuple).is_err());
    }
}
