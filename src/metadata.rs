//! Schema metadata discovered from the database.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One `(database, table, column)` row returned by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTriple {
    pub database: String,
    pub table: String,
    pub column: String,
}

impl ColumnTriple {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    database: String,
    table: String,
    columns: Vec<String>,
}

impl TableDescriptor {
    /// Build a descriptor, dropping repeated column names but keeping
    /// the order in which they were first seen.
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut seen = HashSet::new();
        let columns = columns
            .into_iter()
            .map(Into::<String>::into)
            .filter(|c| seen.insert(c.clone()))
            .collect();

        Self {
            database: database.into(),
            table: table.into(),
            columns,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// `database.table`
    pub fn fq_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// Same table, different column list. Used when pruning candidates.
    pub(crate) fn with_columns(&self, columns: Vec<String>) -> Self {
        Self::new(self.database.clone(), self.table.clone(), columns)
    }
}

/// Every known table at one point in time.
///
/// Tables are kept sorted by database, then table name. Candidate scoring
/// breaks ties on this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: Vec<TableDescriptor>,
}

impl SchemaSnapshot {
    pub fn new(mut tables: Vec<TableDescriptor>) -> Self {
        tables.sort_by(|a, b| {
            (a.database.as_str(), a.table.as_str()).cmp(&(b.database.as_str(), b.table.as_str()))
        });
        Self { tables }
    }

    /// Group introspection rows into one descriptor per `(database, table)`.
    pub fn from_triples(triples: impl IntoIterator<Item = ColumnTriple>) -> Self {
        let mut grouped: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for triple in triples {
            grouped
                .entry((triple.database, triple.table))
                .or_default()
                .push(triple.column);
        }

        let tables = grouped
            .into_iter()
            .map(|((database, table), columns)| TableDescriptor::new(database, table, columns))
            .filter(|t| !t.columns.is_empty())
            .collect();

        Self::new(tables)
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_dedups_columns_in_first_seen_order() {
        let table = TableDescriptor::new("shop", "orders", ["id", "amount", "id", "order_date"]);
        assert_eq!(table.columns(), &["id", "amount", "order_date"]);
        assert_eq!(table.fq_name(), "shop.orders");
    }

    #[test]
    fn test_snapshot_groups_triples_and_sorts_by_fq_name() {
        let snapshot = SchemaSnapshot::from_triples(vec![
            ColumnTriple::new("shop", "orders", "id"),
            ColumnTriple::new("analytics", "events", "ts"),
            ColumnTriple::new("shop", "orders", "amount"),
            ColumnTriple::new("shop", "customers", "id"),
            ColumnTriple::new("shop", "orders", "id"),
        ]);

        let names: Vec<String> = snapshot.tables().iter().map(|t| t.fq_name()).collect();
        assert_eq!(names, vec!["analytics.events", "shop.customers", "shop.orders"]);
        assert_eq!(snapshot.tables()[2].columns(), &["id", "amount"]);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = SchemaSnapshot::from_triples(Vec::new());
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }
}
