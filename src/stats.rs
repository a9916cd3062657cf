//! Table statistics for selectivity estimation.
//!
//! Fixed-width histograms over integer columns, built by scanning a table
//! twice: one pass to find each column's range, one to load the buckets.
//! Space and per-value time are constant in the number of values seen.

use std::collections::HashMap;
use std::sync::Arc;

use crate::access::heap::HeapFile;
use crate::access::value::{CompareOp, Field, FieldType};
use crate::error::DbResult;
use crate::storage::cache::PageCache;
use crate::transaction::TransactionId;

/// Bucket count used for table statistics.
pub const NUM_HIST_BINS: usize = 100;

/// Selectivity assumed for predicates over text columns.
pub const DEFAULT_TEXT_SELECTIVITY: f64 = 0.1;

/// A fixed-width histogram over one integer column.
///
/// Bucket width is `ceil(span / buckets)`; the rounding can push the last
/// bucket past `max`, so its width is tracked separately.
#[derive(Debug)]
pub struct IntHistogram {
    buckets: Vec<f64>,
    min: i32,
    max: i32,
    width: i32,
    last_width: i32,
    count: u64,
}

impl IntHistogram {
    pub fn new(buckets: usize, min: i32, max: i32) -> Self {
        let n = buckets.max(1);
        let span = (max as i64 - min as i64 + 1) as f64;
        let width = (span / n as f64).ceil().max(1.0) as i32;
        let last_min = min as i64 + width as i64 * (n as i64 - 1);
        let last_width = (max as i64 - last_min + 1).max(1) as i32;
        Self {
            buckets: vec![0.0; n],
            min,
            max,
            width,
            last_width,
            count: 0,
        }
    }

    pub fn add_value(&mut self, value: i32) {
        let index = self.index_of(value);
        self.buckets[index] += 1.0;
        self.count += 1;
    }

    fn index_of(&self, value: i32) -> usize {
        (((value as i64 - self.min as i64) / self.width as i64) as usize)
            .min(self.buckets.len() - 1)
    }

    fn bucket_width(&self, index: usize) -> i32 {
        if index == self.buckets.len() - 1 {
            self.last_width
        } else {
            self.width
        }
    }

    fn bucket_min(&self, index: usize) -> i64 {
        self.min as i64 + self.width as i64 * index as i64
    }

    fn bucket_max(&self, index: usize) -> i64 {
        self.bucket_min(index) + self.bucket_width(index) as i64 - 1
    }

    /// Estimated fraction of values satisfying `value <op> operand`.
    pub fn selectivity(&self, op: CompareOp, operand: i32) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        match op {
            CompareOp::Eq => {
                if operand < self.min || operand > self.max {
                    0.0
                } else {
                    let index = self.index_of(operand);
                    self.buckets[index] / self.bucket_width(index) as f64 / self.count as f64
                }
            }
            CompareOp::Ne => 1.0 - self.selectivity(CompareOp::Eq, operand),
            CompareOp::Gt => {
                if operand < self.min {
                    1.0
                } else if operand >= self.max {
                    0.0
                } else {
                    let index = self.index_of(operand);
                    let fraction = (self.bucket_max(index) - operand as i64) as f64
                        / self.bucket_width(index) as f64;
                    let mut selected = self.buckets[index] * fraction;
                    for higher in &self.buckets[index + 1..] {
                        selected += higher;
                    }
                    selected / self.count as f64
                }
            }
            CompareOp::Lt => {
                if operand <= self.min {
                    0.0
                } else if operand > self.max {
                    1.0
                } else {
                    let index = self.index_of(operand);
                    let fraction = (operand as i64 - self.bucket_min(index)) as f64
                        / self.bucket_width(index) as f64;
                    let mut selected = self.buckets[index] * fraction;
                    for lower in &self.buckets[..index] {
                        selected += lower;
                    }
                    selected / self.count as f64
                }
            }
            CompareOp::Le => {
                self.selectivity(CompareOp::Lt, operand) + self.selectivity(CompareOp::Eq, operand)
            }
            CompareOp::Ge => {
                self.selectivity(CompareOp::Gt, operand) + self.selectivity(CompareOp::Eq, operand)
            }
        }
    }
}

/// Per-table statistics: tuple count, page count, and per-column
/// histograms for the integer columns.
pub struct TableStats {
    io_cost_per_page: f64,
    pages: u32,
    tuple_count: u64,
    histograms: HashMap<usize, IntHistogram>,
}

impl TableStats {
    /// Scans the table twice under `tid`: ranges first, then loading.
    pub fn build(
        file: &Arc<HeapFile>,
        cache: Arc<PageCache>,
        tid: TransactionId,
        io_cost_per_page: f64,
    ) -> DbResult<Self> {
        let schema = file.schema().clone();
        let mut scan = file.scan(cache, tid);
        scan.open()?;

        let mut tuple_count = 0u64;
        let mut ranges: HashMap<usize, (i32, i32)> = HashMap::new();
        while let Some(tuple) = scan.next()? {
            tuple_count += 1;
            for (column, field) in tuple.fields().iter().enumerate() {
                if let Field::Int(v) = field {
                    let entry = ranges.entry(column).or_insert((*v, *v));
                    entry.0 = entry.0.min(*v);
                    entry.1 = entry.1.max(*v);
                }
            }
        }

        let mut histograms: HashMap<usize, IntHistogram> = ranges
            .iter()
            .map(|(&column, &(min, max))| (column, IntHistogram::new(NUM_HIST_BINS, min, max)))
            .collect();

        scan.rewind()?;
        while let Some(tuple) = scan.next()? {
            for (column, field) in tuple.fields().iter().enumerate() {
                if let Field::Int(v) = field {
                    if let Some(histogram) = histograms.get_mut(&column) {
                        histogram.add_value(*v);
                    }
                }
            }
        }
        scan.close();

        // Text columns get no histogram; selectivity falls back to a
        // fixed default.
        debug_assert!(schema
            .columns()
            .iter()
            .enumerate()
            .all(|(i, c)| c.ty == FieldType::Int || !histograms.contains_key(&i)));

        Ok(Self {
            io_cost_per_page,
            pages: file.page_count(),
            tuple_count,
            histograms,
        })
    }

    /// Cost of a full sequential scan of the table.
    pub fn estimate_scan_cost(&self) -> f64 {
        self.pages as f64 * self.io_cost_per_page
    }

    pub fn tuple_count(&self) -> u64 {
        self.tuple_count
    }

    /// Expected result cardinality for a given selectivity.
    pub fn estimate_cardinality(&self, selectivity: f64) -> u64 {
        (self.tuple_count as f64 * selectivity) as u64
    }

    /// Estimated selectivity of `column <op> operand`.
    pub fn estimate_selectivity(&self, column: usize, op: CompareOp, operand: &Field) -> f64 {
        match (operand, self.histograms.get(&column)) {
            (Field::Int(v), Some(histogram)) => histogram.selectivity(op, *v),
            _ => DEFAULT_TEXT_SELECTIVITY,
        }
    }
}
