//! SQL rendering for [`SelectQuery`]
//!
//! Produces parameterized SQL with numbered `?N` placeholders and the values
//! to bind, in placeholder order. Identifiers are checked before they are
//! spliced in; values are always bound.

use crate::engine::SelectQuery;
use crate::error::EngineError;
use crate::naming::is_identifier;
use crate::value::Value;

use super::condition::{ColumnRef, ConditionNode, Operator};
use super::join::PRIMARY_ALIAS;

#[derive(Debug, Default)]
pub struct SqlWriter {
    binds: Vec<Value>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a full select with ordering and paging.
    pub fn select(query: &SelectQuery) -> Result<(String, Vec<Value>), EngineError> {
        let mut writer = Self::new();
        let sql = writer.render_select(query, true)?;
        Ok((sql, writer.binds))
    }

    /// Render a `COUNT(*)` over the same rows.
    pub fn count(query: &SelectQuery) -> Result<(String, Vec<Value>), EngineError> {
        let mut writer = Self::new();
        let sql = if query.distinct || query.is_join() {
            let inner = writer.render_select(query, false)?;
            format!("SELECT COUNT(*) FROM ({}) AS counted", inner)
        } else {
            let mut sql = format!("SELECT COUNT(*) FROM {}", ident(&query.table)?);
            if let Some(clause) = writer.render_node(&query.condition, false)? {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
            sql
        };
        Ok((sql, writer.binds))
    }

    fn render_select(&mut self, query: &SelectQuery, paged: bool) -> Result<String, EngineError> {
        let joined = query.is_join();
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        if query.projection.is_empty() {
            sql.push_str(if joined { "self.*" } else { "*" });
        } else {
            let columns = query
                .projection
                .iter()
                .map(|c| column(c, joined))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&columns.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(ident(&query.table)?);
        if joined {
            sql.push(' ');
            sql.push_str(PRIMARY_ALIAS);
        }

        for join in &query.joins {
            let on = join
                .on
                .iter()
                .map(|(l, r)| Ok(format!("{} = {}", column(l, true)?, column(r, true)?)))
                .collect::<Result<Vec<_>, EngineError>>()?;
            sql.push_str(&format!(
                " LEFT JOIN {} {} ON {}",
                ident(&join.table)?,
                ident(&join.alias)?,
                on.join(" AND ")
            ));
        }

        if let Some(clause) = self.render_node(&query.condition, joined)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if paged {
            if !query.order.is_empty() {
                let order = query
                    .order
                    .iter()
                    .map(|(c, dir)| Ok(format!("{} {}", column(c, joined)?, dir.to_sql())))
                    .collect::<Result<Vec<_>, EngineError>>()?;
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.join(", "));
            }

            match (query.limit, query.offset) {
                (Some(limit), Some(offset)) if offset > 0 => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
                }
                (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
                (None, Some(offset)) if offset > 0 => {
                    sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset))
                }
                _ => {}
            }
        }

        Ok(sql)
    }

    fn placeholder(&mut self, value: Value) -> String {
        self.binds.push(value);
        format!("?{}", self.binds.len())
    }

    fn render_node(
        &mut self,
        node: &ConditionNode,
        joined: bool,
    ) -> Result<Option<String>, EngineError> {
        match node {
            ConditionNode::Leaf { column: c, op, value } => {
                self.render_leaf(c, *op, value, joined).map(Some)
            }
            ConditionNode::And(children) => self.render_group(children, " AND ", joined),
            ConditionNode::Or(children) => self.render_group(children, " OR ", joined),
        }
    }

    fn render_group(
        &mut self,
        children: &[ConditionNode],
        sep: &str,
        joined: bool,
    ) -> Result<Option<String>, EngineError> {
        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            if let Some(part) = self.render_node(child, joined)? {
                parts.push(part);
            }
        }
        Ok(match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(format!("({})", parts.join(sep))),
        })
    }

    fn render_leaf(
        &mut self,
        col: &ColumnRef,
        op: Operator,
        value: &Value,
        joined: bool,
    ) -> Result<String, EngineError> {
        let col = column(col, joined)?;
        match op {
            Operator::IsNull | Operator::IsNotNull => Ok(format!("{} {}", col, op.sql())),
            Operator::In | Operator::NotIn => {
                let items = value.as_list().ok_or_else(|| {
                    EngineError::Unsupported(format!("{} {} needs a list value", col, op.sql()))
                })?;
                if items.is_empty() {
                    // Nothing is in an empty set
                    return Ok(if op == Operator::In { "1 = 0" } else { "1 = 1" }.to_string());
                }
                let placeholders: Vec<String> =
                    items.iter().map(|v| self.placeholder(v.clone())).collect();
                Ok(format!("{} {} ({})", col, op.sql(), placeholders.join(", ")))
            }
            Operator::Between => match value.as_list() {
                Some([low, high]) => {
                    let low = self.placeholder(low.clone());
                    let high = self.placeholder(high.clone());
                    Ok(format!("{} BETWEEN {} AND {}", col, low, high))
                }
                _ => Err(EngineError::Unsupported(format!(
                    "{} BETWEEN needs exactly two values",
                    col
                ))),
            },
            _ => {
                if value.is_list() {
                    return Err(EngineError::Unsupported(format!(
                        "{} {} cannot compare against a list",
                        col,
                        op.sql()
                    )));
                }
                let p = self.placeholder(value.clone());
                Ok(format!("{} {} {}", col, op.sql(), p))
            }
        }
    }
}

fn ident(name: &str) -> Result<&str, EngineError> {
    if is_identifier(name) && !name.contains('.') {
        Ok(name)
    } else {
        Err(EngineError::Unsupported(format!("invalid identifier `{}`", name)))
    }
}

/// Render a column, qualifying bare names with the primary alias in joined queries.
fn column(c: &ColumnRef, joined: bool) -> Result<String, EngineError> {
    let name = ident(&c.name)?;
    match (&c.qualifier, joined) {
        (Some(q), _) => Ok(format!("{}.{}", ident(q)?, name)),
        (None, true) => Ok(format!("{}.{}", PRIMARY_ALIAS, name)),
        (None, false) => Ok(name.to_string()),
    }
}
