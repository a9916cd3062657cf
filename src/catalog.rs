//! The table registry.
//!
//! Maps table ids to their heap files and schemas, and table names to
//! ids. Purely in-memory: the engine persists nothing beyond the page
//! files themselves. Parsing declarative catalog files is a caller
//! concern.

use dashmap::DashMap;
use std::sync::Arc;

use crate::access::heap::HeapFile;
use crate::access::tuple::Schema;
use crate::error::{DbError, DbResult};

/// Identifier of one table. Derived from the heap file's storage path,
/// so the same file always maps to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Concurrent registry of all tables known to one engine.
pub struct Catalog {
    files: DashMap<TableId, Arc<HeapFile>>,
    names: DashMap<String, TableId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Registers a table under a name. A name conflict resolves to the
    /// most recently registered table.
    pub fn register_table(&self, file: Arc<HeapFile>, name: impl Into<String>) -> TableId {
        let table = file.table_id();
        self.files.insert(table, file);
        self.names.insert(name.into(), table);
        table
    }

    /// The heap file backing a table.
    pub fn file(&self, table: TableId) -> DbResult<Arc<HeapFile>> {
        self.files
            .get(&table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DbError::UnknownTable(table))
    }

    /// The schema of a table's tuples.
    pub fn schema(&self, table: TableId) -> DbResult<Schema> {
        Ok(self.file(table)?.schema().clone())
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|entry| *entry.value())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.names.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::FieldType;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::from_types(&[FieldType::Int])
    }

    #[test]
    fn test_register_and_lookup() -> DbResult<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let file = Arc::new(HeapFile::create(dir.path().join("a.dat"), schema())?);
        let table = catalog.register_table(Arc::clone(&file), "a");

        assert_eq!(catalog.table_id("a"), Some(table));
        assert!(Arc::ptr_eq(&catalog.file(table)?, &file));
        assert_eq!(catalog.schema(table)?, schema());
        Ok(())
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.file(TableId(99)),
            Err(DbError::UnknownTable(TableId(99)))
        ));
        assert_eq!(catalog.table_id("nope"), None);
    }

    #[test]
    fn test_name_conflict_last_wins() -> DbResult<()> {
        let dir = tempdir()?;
        let catalog = Catalog::new();
        let first = Arc::new(HeapFile::create(dir.path().join("x.dat"), schema())?);
        let second = Arc::new(HeapFile::create(dir.path().join("y.dat"), schema())?);
        catalog.register_table(first, "t");
        let replacement = catalog.register_table(Arc::clone(&second), "t");

        assert_eq!(catalog.table_id("t"), Some(replacement));
        Ok(())
    }
}
