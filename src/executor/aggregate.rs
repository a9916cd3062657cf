//! Grouped aggregation executor.
//!
//! Aggregates one column of the child's output, optionally grouped by
//! another column. COUNT works over any field type; SUM, AVG, MIN, and
//! MAX require an integer column. AVG is integer division, matching the
//! engine's integer-only arithmetic.

use std::collections::HashMap;

use crate::access::tuple::{Column, Schema, Tuple};
use crate::access::value::{Field, FieldType};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
        }
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl Accumulator {
    fn add(&mut self, value: Option<i32>) {
        self.count += 1;
        if let Some(v) = value {
            self.sum += v as i64;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn result(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Count => self.count as i32,
            AggregateOp::Sum => self.sum as i32,
            AggregateOp::Avg => (self.sum / self.count) as i32,
            AggregateOp::Min => self.min.unwrap_or(0),
            AggregateOp::Max => self.max.unwrap_or(0),
        }
    }
}

/// Computes aggregates in one pass over the child, then replays them.
pub struct AggregateExecutor {
    child: Box<dyn Executor>,
    op: AggregateOp,
    column: usize,
    group_by: Option<usize>,
    schema: Schema,
    results: Vec<Tuple>,
    cursor: usize,
    initialized: bool,
}

impl AggregateExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        op: AggregateOp,
        column: usize,
        group_by: Option<usize>,
    ) -> Self {
        Self {
            child,
            op,
            column,
            group_by,
            schema: Schema::new(Vec::new()),
            results: Vec::new(),
            cursor: 0,
            initialized: false,
        }
    }

    fn build_schema(&self) -> DbResult<Schema> {
        let input = self.child.schema();
        if self.column >= input.len() {
            return Err(DbError::SchemaMismatch(format!(
                "aggregate column {} out of range",
                self.column
            )));
        }
        let agg_input = input.column(self.column);
        if self.op != AggregateOp::Count && agg_input.ty != FieldType::Int {
            return Err(DbError::SchemaMismatch(format!(
                "{} requires an int column, got {}",
                self.op.name(),
                agg_input.ty
            )));
        }
        let agg_column = Column::new(
            format!("{}({})", self.op.name(), agg_input.name),
            FieldType::Int,
        );
        Ok(match self.group_by {
            Some(group) => {
                if group >= input.len() {
                    return Err(DbError::SchemaMismatch(format!(
                        "group column {} out of range",
                        group
                    )));
                }
                Schema::new(vec![input.column(group).clone(), agg_column])
            }
            None => Schema::new(vec![agg_column]),
        })
    }
}

impl Executor for AggregateExecutor {
    fn init(&mut self) -> DbResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.child.init()?;
        self.schema = self.build_schema()?;

        // First-seen group order keeps the output deterministic.
        let mut groups: Vec<(Option<Field>, Accumulator)> = Vec::new();
        let mut index: HashMap<Field, usize> = HashMap::new();
        while let Some(tuple) = self.child.next()? {
            let value = match tuple.field(self.column) {
                Field::Int(v) => Some(*v),
                Field::Text(_) => None,
            };
            let slot = match self.group_by {
                Some(group) => {
                    let key = tuple.field(group).clone();
                    *index.entry(key.clone()).or_insert_with(|| {
                        groups.push((Some(key), Accumulator::default()));
                        groups.len() - 1
                    })
                }
                None => {
                    if groups.is_empty() {
                        groups.push((None, Accumulator::default()));
                    }
                    0
                }
            };
            groups[slot].1.add(value);
        }

        self.results = groups
            .into_iter()
            .map(|(key, acc)| {
                let result = Field::Int(acc.result(self.op));
                match key {
                    Some(key) => Tuple::new(vec![key, result]),
                    None => Tuple::new(vec![result]),
                }
            })
            .collect();
        self.cursor = 0;
        self.initialized = true;
        Ok(())
    }

    fn next(&mut self) -> DbResult<Option<Tuple>> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        let tuple = self.results.get(self.cursor).cloned();
        if tuple.is_some() {
            self.cursor += 1;
        }
        Ok(tuple)
    }

    fn rewind(&mut self) -> DbResult<()> {
        if !self.initialized {
            return Err(DbError::Usage("executor is not initialized"));
        }
        self.cursor = 0;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
