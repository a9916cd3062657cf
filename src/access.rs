pub mod heap;
pub mod tuple;
pub mod value;

pub use heap::{HeapFile, TableScan};
pub use tuple::{Column, RecordId, Schema, Tuple};
pub use value::{CompareOp, Field, FieldType};
