//! Table references in a parsed statement.

use sqlparser::ast::{ObjectName, Query, Statement, TableFactor, Visit, Visitor};
use std::ops::ControlFlow;

/// Collects every relation named in FROM/JOIN position, at any depth.
///
/// `WITH` names are visible only inside the query that defines them, so each
/// query pushes its own scope on entry and pops it on exit.
#[derive(Default)]
struct RelationCollector {
    cte_scopes: Vec<Vec<String>>,
    tables: Vec<String>,
}

impl RelationCollector {
    fn is_cte(&self, name: &str) -> bool {
        self.cte_scopes
            .iter()
            .any(|scope| scope.iter().any(|cte| cte == name))
    }
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        let scope = query
            .with
            .as_ref()
            .map(|with| {
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.clone())
                    .collect()
            })
            .unwrap_or_default();
        self.cte_scopes.push(scope);
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.cte_scopes.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let name = normalize(relation);
        if !(relation.0.len() == 1 && self.is_cte(&name)) {
            self.tables.push(name);
        }
        ControlFlow::Continue(())
    }
}

/// Finds a table aliased `FINAL`, which is how the parser reads ClickHouse's
/// `FROM t FINAL` modifier.
struct FinalAliasFinder;

impl Visitor for FinalAliasFinder {
    type Break = ();

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        match factor {
            TableFactor::Table {
                alias: Some(alias), ..
            } if alias.name.value.eq_ignore_ascii_case("final") => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }
}

/// Identifier parts joined with `.`, quoting removed.
pub fn normalize(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Referenced tables in walk order, excluding names bound by an enclosing
/// `WITH` clause. Duplicates are kept so the first offending reference can be
/// reported.
pub fn referenced_tables(statement: &Statement) -> Vec<String> {
    let mut collector = RelationCollector::default();
    let _ = statement.visit(&mut collector);
    collector.tables
}

pub fn has_final_alias(statement: &Statement) -> bool {
    statement.visit(&mut FinalAliasFinder).is_break()
}
