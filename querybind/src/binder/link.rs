//! Relation link configuration

use crate::error::BindError;
use crate::query::condition::ConditionNode;

/// A junction table between owners and related rows.
///
/// Rows in `table` map the owner's join value (`owner_column`) to a related
/// key (`related_column`). Only one mapping is supported.
#[derive(Debug, Clone, PartialEq)]
pub struct MiddleTable {
    pub table: String,
    pub mappings: Vec<(String, String)>,
    pub filter: Option<ConditionNode>,
}

impl MiddleTable {
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            mappings: vec![(owner_column.into(), related_column.into())],
            filter: None,
        }
    }

    /// Add another owner-to-related column mapping.
    pub fn map(mut self, owner_column: impl Into<String>, related_column: impl Into<String>) -> Self {
        self.mappings.push((owner_column.into(), related_column.into()));
        self
    }

    /// Constant condition ANDed onto the middle-table lookup.
    pub fn filter(mut self, condition: ConditionNode) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn owner_column(&self) -> Option<&str> {
        self.mappings.first().map(|(o, _)| o.as_str())
    }

    pub fn related_column(&self) -> Option<&str> {
        self.mappings.first().map(|(_, r)| r.as_str())
    }
}

/// How owners are linked to a related table and which fields are copied.
///
/// ```rust,ignore
/// // employee.dept_id -> dept.id, copy dept.name into employee.dept_name
/// let link = RelationLink::new("dept")
///     .join("dept_id", "id")
///     .link("name", "dept_name");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLink {
    pub related_table: String,
    /// `(owner_field, related_column)`, position-aligned.
    pub joins: Vec<(String, String)>,
    pub middle: Option<MiddleTable>,
    /// `(related_column, owner_field)` copy pairs.
    pub links: Vec<(String, String)>,
    pub filter: Option<ConditionNode>,
}

impl RelationLink {
    pub fn new(related_table: impl Into<String>) -> Self {
        Self {
            related_table: related_table.into(),
            joins: Vec::new(),
            middle: None,
            links: Vec::new(),
            filter: None,
        }
    }

    pub fn join(mut self, owner_field: impl Into<String>, related_column: impl Into<String>) -> Self {
        self.joins.push((owner_field.into(), related_column.into()));
        self
    }

    pub fn middle(mut self, middle: MiddleTable) -> Self {
        self.middle = Some(middle);
        self
    }

    pub fn link(mut self, related_field: impl Into<String>, owner_field: impl Into<String>) -> Self {
        self.links.push((related_field.into(), owner_field.into()));
        self
    }

    /// Constant condition ANDed onto the related-table lookup.
    pub fn filter(mut self, condition: ConditionNode) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn owner_fields(&self) -> impl Iterator<Item = &str> {
        self.joins.iter().map(|(o, _)| o.as_str())
    }

    pub fn related_columns(&self) -> impl Iterator<Item = &str> {
        self.joins.iter().map(|(_, r)| r.as_str())
    }

    /// Reject configurations the binder cannot execute.
    pub fn validate(&self) -> Result<(), BindError> {
        if self.related_table.is_empty() {
            return Err(BindError::invalid_usage("relation link has no related table"));
        }
        if self.joins.is_empty() {
            return Err(BindError::invalid_usage(format!(
                "relation link to {} has no join columns",
                self.related_table
            )));
        }
        if self.links.is_empty() {
            return Err(BindError::invalid_usage(format!(
                "relation link to {} copies no fields",
                self.related_table
            )));
        }
        if let Some(middle) = &self.middle {
            if self.joins.len() > 1 {
                return Err(BindError::invalid_usage(format!(
                    "middle table {} supports a single join column, got {}",
                    middle.table,
                    self.joins.len()
                )));
            }
            if middle.mappings.len() != 1 {
                return Err(BindError::invalid_usage(format!(
                    "middle table {} supports a single owner mapping, got {}",
                    middle.table,
                    middle.mappings.len()
                )));
            }
        }
        Ok(())
    }
}
