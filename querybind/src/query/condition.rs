//! Engine-independent condition tree

use std::fmt;

use crate::value::Value;

/// A possibly qualified column, displayed as `alias.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    /// The leaf value is the finished pattern.
    Like,
    Gt,
    Ge,
    Lt,
    Le,
    /// The leaf value is a two-element list.
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Between => "BETWEEN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A composable predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    Leaf {
        column: ColumnRef,
        op: Operator,
        value: Value,
    },
    And(Vec<ConditionNode>),
    Or(Vec<ConditionNode>),
}

impl Default for ConditionNode {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConditionNode {
    /// The condition that matches everything.
    pub fn empty() -> Self {
        ConditionNode::And(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ConditionNode::Leaf { .. } => false,
            ConditionNode::And(children) | ConditionNode::Or(children) => {
                children.iter().all(ConditionNode::is_empty)
            }
        }
    }

    pub fn leaf(column: ColumnRef, op: Operator, value: impl Into<Value>) -> Self {
        ConditionNode::Leaf {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: ColumnRef, value: impl Into<Value>) -> Self {
        Self::leaf(column, Operator::Eq, value)
    }

    pub fn is_null(column: ColumnRef) -> Self {
        Self::leaf(column, Operator::IsNull, Value::Null)
    }

    /// Set membership; a single value degrades to equality.
    pub fn in_values(column: ColumnRef, mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            let only = values.remove(0);
            Self::leaf(column, Operator::Eq, only)
        } else {
            Self::leaf(column, Operator::In, Value::List(values))
        }
    }

    /// Conjunction. Empty children are dropped and a single child is returned as is.
    pub fn and(children: impl IntoIterator<Item = ConditionNode>) -> Self {
        Self::group(children, ConditionNode::And)
    }

    /// Disjunction. Empty children are dropped and a single child is returned as is.
    pub fn or(children: impl IntoIterator<Item = ConditionNode>) -> Self {
        Self::group(children, ConditionNode::Or)
    }

    fn group(
        children: impl IntoIterator<Item = ConditionNode>,
        make: fn(Vec<ConditionNode>) -> ConditionNode,
    ) -> Self {
        let mut kept: Vec<ConditionNode> =
            children.into_iter().filter(|c| !c.is_empty()).collect();
        match kept.len() {
            0 => Self::empty(),
            1 => kept.remove(0),
            _ => make(kept),
        }
    }

    pub fn and_also(self, other: ConditionNode) -> Self {
        Self::and([self, other])
    }

    /// All leaves, depth first.
    pub fn leaves(&self) -> Vec<&ConditionNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ConditionNode>) {
        match self {
            ConditionNode::Leaf { .. } => out.push(self),
            ConditionNode::And(children) | ConditionNode::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Columns referenced by the tree, in first-seen order.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out: Vec<&ColumnRef> = Vec::new();
        for leaf in self.leaves() {
            if let ConditionNode::Leaf { column, .. } = leaf {
                if !out.contains(&column) {
                    out.push(column);
                }
            }
        }
        out
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionNode::Leaf { column, op, value } => match op {
                Operator::IsNull | Operator::IsNotNull => write!(f, "{} {}", column, op.sql()),
                Operator::Between => match value.as_list() {
                    Some([low, high, ..]) => write!(f, "{} BETWEEN {} AND {}", column, low, high),
                    _ => write!(f, "{} BETWEEN {}", column, value),
                },
                _ => write!(f, "{} {} {}", column, op.sql(), value),
            },
            ConditionNode::And(children) | ConditionNode::Or(children) if children.is_empty() => {
                f.write_str("TRUE")
            }
            ConditionNode::And(children) => write_group(f, children, " AND "),
            ConditionNode::Or(children) => write_group(f, children, " OR "),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, children: &[ConditionNode], sep: &str) -> fmt::Result {
    let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
    write!(f, "({})", parts.join(sep))
}
