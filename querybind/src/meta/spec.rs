//! Binding metadata declared on transfer-object fields
//!
//! These are the types the derive macros emit. They can also be built by hand
//! for types that cannot carry the derive.

use std::fmt;

use crate::value::Value;

/// How a field value is compared against its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparison {
    #[default]
    Eq,
    NotEq,
    In,
    NotIn,
    Contains,
    Like,
    StartsWith,
    EndsWith,
    Gt,
    Ge,
    Lt,
    Le,
    Between,
    BetweenBegin,
    BetweenEnd,
}

impl Comparison {
    pub fn name(&self) -> &'static str {
        match self {
            Comparison::Eq => "EQ",
            Comparison::NotEq => "NOT_EQ",
            Comparison::In => "IN",
            Comparison::NotIn => "NOT_IN",
            Comparison::Contains => "CONTAINS",
            Comparison::Like => "LIKE",
            Comparison::StartsWith => "STARTSWITH",
            Comparison::EndsWith => "ENDSWITH",
            Comparison::Gt => "GT",
            Comparison::Ge => "GE",
            Comparison::Lt => "LT",
            Comparison::Le => "LE",
            Comparison::Between => "BETWEEN",
            Comparison::BetweenBegin => "BETWEEN_BEGIN",
            Comparison::BetweenEnd => "BETWEEN_END",
        }
    }

    /// Set-membership comparisons reject empty collections outright.
    pub fn is_membership(&self) -> bool {
        matches!(self, Comparison::In | Comparison::NotIn)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decides whether a field value takes part in the query at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// Keep only non-empty values (not null, not `""`, not an empty list).
    #[default]
    IgnoreEmpty,
    /// Keep any non-null value.
    IncludeEmpty,
    /// Keep every value; null compiles to an `IS NULL` check.
    IncludeNull,
}

impl Strategy {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Strategy::IgnoreEmpty => !value.is_empty(),
            Strategy::IncludeEmpty => !value.is_null(),
            Strategy::IncludeNull => true,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Strategy::IgnoreEmpty => 0,
            Strategy::IncludeEmpty => 1,
            Strategy::IncludeNull => 2,
        }
    }

    /// The more permissive of two strategies.
    pub fn widest(self, other: Strategy) -> Strategy {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// Table-level metadata for an entity, produced by `#[derive(Entity)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    pub name: String,
    pub table: String,
    /// `(field, column)` pairs.
    pub columns: Vec<(String, String)>,
    /// Field names whose values are stored transformed.
    pub protected: Vec<String>,
}

impl EntityInfo {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            protected: Vec::new(),
        }
    }

    pub fn column(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.push((field.into(), column.into()));
        self
    }

    pub fn protect(mut self, field: impl Into<String>) -> Self {
        self.protected.push(field.into());
        self
    }

    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, c)| c.as_str())
    }
}

/// One binding rule attached to a transfer-object field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindSpec {
    pub comparison: Comparison,
    pub strategy: Strategy,
    /// Entity that owns the target column; defaults to the DTO's entity.
    pub entity: Option<EntityInfo>,
    /// Field on the target entity; defaults to the DTO field's name.
    pub field: Option<String>,
    /// Join condition, `this.col=col AND ...`.
    pub condition: Option<String>,
    pub alias: Option<String>,
    pub ignore: bool,
}

impl BindSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn entity(mut self, entity: EntityInfo) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn ignore(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    /// Whether this spec's own emptiness rule throws the value away.
    pub fn rejects(&self, value: &Value) -> bool {
        (self.strategy == Strategy::IgnoreEmpty || self.comparison.is_membership())
            && value.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    Value,
    /// Raw date or timestamp; always considered regardless of the allowed field list.
    Date,
}

/// A declared field of a transfer object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Explicit storage column.
    pub column: Option<String>,
    pub kind: FieldKind,
    /// `false` for fields that exist on the DTO only.
    pub persistent: bool,
    /// Never read and never compiled.
    pub transient: bool,
    /// Sentinel meaning "deleted"; a field holding it is skipped.
    pub logic_delete: Option<Value>,
    /// Accessor used when the stored value is empty.
    pub getter: Option<String>,
    pub binds: Vec<BindSpec>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            kind: FieldKind::Value,
            persistent: true,
            transient: false,
            logic_delete: None,
            getter: None,
            binds: Vec::new(),
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    pub fn logic_delete(mut self, sentinel: impl Into<Value>) -> Self {
        self.logic_delete = Some(sentinel.into());
        self
    }

    pub fn getter(mut self, getter: impl Into<String>) -> Self {
        self.getter = Some(getter.into());
        self
    }

    pub fn bind(mut self, spec: BindSpec) -> Self {
        self.binds.push(spec);
        self
    }
}

/// Everything declared on one transfer-object type.
#[derive(Debug, Clone, PartialEq)]
pub struct DtoDescriptor {
    pub name: String,
    pub entity: Option<EntityInfo>,
    pub table: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl DtoDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity: None,
            table: None,
            fields: Vec::new(),
        }
    }

    pub fn entity(mut self, entity: EntityInfo) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Primary table: the explicit table, else the entity's.
    pub fn primary_table(&self) -> Option<&str> {
        self.table
            .as_deref()
            .or_else(|| self.entity.as_ref().map(|e| e.table.as_str()))
    }
}
