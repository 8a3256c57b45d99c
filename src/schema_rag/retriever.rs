//! Candidate Selector
//!
//! Picks the tables (and the columns within them) that are worth showing the
//! generator for one user query. Scoring is plain substring matching against
//! the lower-cased query.

use crate::metadata::{SchemaSnapshot, TableDescriptor};
use std::collections::HashSet;

/// Tables and pruned columns exposed to the generator for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    tables: Vec<TableDescriptor>,
}

impl CandidateSet {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Names a statement may reference: `database.table` and bare `table`.
    pub fn allow_set(&self) -> HashSet<String> {
        self.tables
            .iter()
            .flat_map(|t| [t.fq_name(), t.table().to_string()])
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    max_tables: usize,
    max_columns_per_table: usize,
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self {
            max_tables: 6,
            max_columns_per_table: 12,
        }
    }
}

impl CandidateSelector {
    pub fn new(max_tables: usize, max_columns_per_table: usize) -> Self {
        Self {
            max_tables,
            max_columns_per_table,
        }
    }

    pub fn select(&self, snapshot: &SchemaSnapshot, query: &str) -> CandidateSet {
        select(snapshot, query, self.max_tables, self.max_columns_per_table)
    }
}

/// Relevance of one table to an already lower-cased query.
pub fn score_table(table: &TableDescriptor, query: &str) -> u32 {
    let mut score = 0;

    let name = table.table().to_lowercase();
    if query.contains(&name) || name.contains(query) {
        score += 5;
    }

    for column in table.columns() {
        let column = column.to_lowercase();
        if query.contains(&column) {
            score += 2;
        }
        // partial-word matches, e.g. "amount" against "total_amount"
        if column.contains(query) {
            score += 1;
        }
    }

    score
}

pub fn select(
    snapshot: &SchemaSnapshot,
    query: &str,
    max_tables: usize,
    max_columns_per_table: usize,
) -> CandidateSet {
    let query = query.to_lowercase();

    let mut scored: Vec<(u32, &TableDescriptor)> = snapshot
        .tables()
        .iter()
        .map(|t| (score_table(t, &query), t))
        .collect();
    // stable: equal scores keep catalog order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut selected: Vec<&TableDescriptor> = scored
        .into_iter()
        .filter(|(score, _)| *score > 0)
        .take(max_tables)
        .map(|(_, t)| t)
        .collect();

    if selected.is_empty() {
        selected = snapshot.tables().iter().take(max_tables).collect();
    }

    let tables = selected
        .into_iter()
        .map(|t| prune_columns(t, &query, max_columns_per_table))
        .collect();

    CandidateSet::new(tables)
}

fn prune_columns(table: &TableDescriptor, query: &str, max_columns: usize) -> TableDescriptor {
    let mut columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| query.contains(&c.to_lowercase()))
        .take(max_columns)
        .cloned()
        .collect();

    if columns.is_empty() {
        columns = table.columns().iter().take(max_columns).cloned().collect();
    }

    table.with_columns(columns)
}
