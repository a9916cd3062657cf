//! Nested-loop join executor.

use crate::access::tuple::{Schema, Tuple};
use crate::access::value::CompareOp;
use crate::error::{DbError, DbResult};
use crate::executor::Executor;

/// A comparison between one left-side and one right-side column.
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    pub left_column: usize,
    pub op: CompareOp,
    pub right_column: usize,
}

impl JoinPredicate {
    pub fn new(left_column: usize, op: CompareOp, right_column: usize) -> Self {
        Self {
            left_column,
            op,
            right_column,
        }
    }

    fn matches(&self, left: &Tuple, right: &Tuple) -> DbResult<bool> {
        left.field(self.left_column)
            .compare(self.op, right.field(self.right_column))
    }
}

/// Inner join: for each left tuple the right child is drained and rewound.
pub struct JoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: JoinPredicate,
    schema: Schema,
    current_left: Option<Tuple>,
    initialized: bool,
}

impl JoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: JoinPredicate,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            schema: Schema::new(Vec::new()),
            current_left: None,
            initialized: false,
        }
    }
}

impl Executor for JoinExecutor {
    fn init(&mut self) -> DbResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.left.init()?;
        self.right.init()?;
        self.schema = self.left.schema().join(self.right.schema());
        self.current_left = self.left.next()?;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        loop {
            let Some(left) = self.current_left.clone() else {
                return Ok(None);
            };
            while let Some(right) = self.right.next()? {
                if self.predicate.matches(&left, &right)? {
                    return Ok(Some(Tuple::concat(&left, &right)));
                }
            }
            self.current_left = self.left.next()?;
            self.right.rewind()?;
        }
    }

    fn rewind(&mut self) -> DbResult<()> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        self.left.rewind()?;
        self.right.rewind()?;
        self.current_left = self.left.next()?;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
