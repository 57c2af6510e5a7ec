//! Persistence engine boundary
//!
//! The compiler and binder never talk to a database directly. They hand a
//! [`SelectQuery`] to a [`QueryEngine`] and get [`Row`]s back.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use async_trait::async_trait;

pub use memory::MemoryEngine;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEngine;

use crate::error::EngineError;
use crate::meta::{Properties, write_property};
use crate::naming::to_column_name;
use crate::query::condition::{ColumnRef, ConditionNode};
use crate::query::join::JoinClause;
use crate::query::pagination::{Direction, Pagination};
use crate::value::Value;

/// Executes select queries and returns column-name keyed rows.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &SelectQuery) -> Result<Vec<Row>, EngineError>;

    /// Number of rows `query` matches, ignoring ordering and paging.
    async fn count(&self, query: &SelectQuery) -> Result<i64, EngineError>;
}

#[async_trait]
impl<'a, T: QueryEngine + ?Sized> QueryEngine for &'a T {
    async fn query(&self, query: &SelectQuery) -> Result<Vec<Row>, EngineError> {
        (**self).query(query).await
    }

    async fn count(&self, query: &SelectQuery) -> Result<i64, EngineError> {
        (**self).count(query).await
    }
}

#[async_trait]
impl<T: QueryEngine + ?Sized> QueryEngine for std::sync::Arc<T> {
    async fn query(&self, query: &SelectQuery) -> Result<Vec<Row>, EngineError> {
        (**self).query(query).await
    }

    async fn count(&self, query: &SelectQuery) -> Result<i64, EngineError> {
        (**self).count(query).await
    }
}

/// An engine-facing select.
///
/// With joins the primary table is aliased `self` and only its columns are
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub joins: Vec<JoinClause>,
    pub condition: ConditionNode,
    /// Columns to return; empty means every primary-table column.
    pub projection: Vec<ColumnRef>,
    pub order: Vec<(ColumnRef, Direction)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            joins: Vec::new(),
            condition: ConditionNode::empty(),
            projection: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    pub fn joins(mut self, joins: Vec<JoinClause>) -> Self {
        self.distinct = self.distinct || !joins.is_empty();
        self.joins = joins;
        self
    }

    pub fn filter(mut self, condition: ConditionNode) -> Self {
        self.condition = condition;
        self
    }

    pub fn project(mut self, columns: Vec<ColumnRef>) -> Self {
        self.projection = columns;
        self
    }

    pub fn order(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.order.push((column, direction));
        self
    }

    pub fn page(mut self, pagination: &Pagination) -> Self {
        self.limit = Some(pagination.limit());
        self.offset = Some(pagination.offset());
        self
    }

    pub fn is_join(&self) -> bool {
        !self.joins.is_empty()
    }

    /// The same select without ordering or paging, for counting.
    pub fn unpaged(&self) -> Self {
        Self {
            order: Vec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// One result row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    /// Insert or replace a column.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self
            .columns
            .iter_mut()
            .find(|(c, _)| c.eq_ignore_ascii_case(&column))
        {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Case-insensitive lookup. A qualifier (`alias.column`) is ignored.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let bare = column.rsplit_once('.').map_or(column, |(_, c)| c);
        self.columns
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(bare))
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keep only `columns`, in the given order.
    pub fn project(&self, columns: &[ColumnRef]) -> Row {
        let mut out = Row::new();
        for column in columns {
            if let Some(value) = self.get(&column.name) {
                out.push(column.name.clone(), value.clone());
            }
        }
        out
    }

    /// Copy matching columns onto `target`'s properties.
    ///
    /// A property matches a column by name or by its snake-case column name.
    /// Returns the number of properties written.
    pub fn apply_to<P: Properties>(&self, target: &mut P) -> usize {
        let mut written = 0;
        for name in P::property_names() {
            let value = self
                .get(name)
                .or_else(|| self.get(&to_column_name(name)))
                .cloned();
            if let Some(value) = value {
                if write_property(target, name, value) {
                    written += 1;
                }
            }
        }
        written
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.push(k, v);
        }
        row
    }
}
