//! In-process engine over `Vec<Row>` tables
//!
//! Evaluates condition trees (with LEFT JOIN plans), ordering and paging the
//! way SQLite would for the subset of SQL the compiler emits. Every executed
//! query is logged per table so batching can be asserted on.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::EngineError;
use crate::query::condition::{ColumnRef, ConditionNode, Operator};
use crate::query::join::PRIMARY_ALIAS;
use crate::query::pagination::Direction;
use crate::value::Value;

use super::{QueryEngine, Row, SelectQuery};

#[derive(Default)]
pub struct MemoryEngine {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<SelectQuery>>,
}

/// A base row plus the joined rows visible while evaluating it.
struct Scope<'a> {
    base: &'a Row,
    joined: Vec<(&'a str, Option<&'a Row>)>,
}

impl Scope<'_> {
    fn get(&self, column: &ColumnRef) -> Value {
        let row = match column.qualifier.as_deref() {
            None | Some(PRIMARY_ALIAS) => Some(self.base),
            Some(alias) => self
                .joined
                .iter()
                .find(|(a, _)| *a == alias)
                .and_then(|(_, r)| *r),
        };
        row.and_then(|r| r.get(&column.name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table.
    pub fn insert_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        self.tables.write().insert(table.into(), rows);
    }

    pub fn with_table(self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_table(table, rows);
        self
    }

    /// Every query executed so far, oldest first.
    pub fn query_log(&self) -> Vec<SelectQuery> {
        self.log.lock().clone()
    }

    /// Number of queries executed against `table`.
    pub fn queries_for(&self, table: &str) -> usize {
        self.log.lock().iter().filter(|q| q.table == table).count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn matching(&self, query: &SelectQuery) -> Result<Vec<Row>, EngineError> {
        let tables = self.tables.read();
        let base_rows = tables
            .get(&query.table)
            .ok_or_else(|| EngineError::UnknownTable(query.table.clone()))?;

        for join in &query.joins {
            if !tables.contains_key(&join.table) {
                return Err(EngineError::UnknownTable(join.table.clone()));
            }
        }

        let mut out = Vec::new();
        for base in base_rows {
            let mut scopes = vec![Scope {
                base,
                joined: Vec::new(),
            }];

            for join in &query.joins {
                let candidates = tables.get(&join.table).map(Vec::as_slice).unwrap_or(&[]);
                let mut next = Vec::new();
                for scope in scopes {
                    let matched: Vec<&Row> = candidates
                        .iter()
                        .filter(|candidate| {
                            join.on.iter().all(|(left, right)| {
                                let l = resolve_side(&scope, left, &join.alias, candidate);
                                let r = resolve_side(&scope, right, &join.alias, candidate);
                                !l.is_null() && l.loose_eq(&r)
                            })
                        })
                        .collect();

                    if matched.is_empty() {
                        let mut joined = scope.joined.clone();
                        joined.push((join.alias.as_str(), None));
                        next.push(Scope { base, joined });
                    } else {
                        for row in matched {
                            let mut joined = scope.joined.clone();
                            joined.push((join.alias.as_str(), Some(row)));
                            next.push(Scope { base, joined });
                        }
                    }
                }
                scopes = next;
            }

            // Unjoined selects keep duplicates; joined ones collapse to the base row.
            let hits = scopes
                .iter()
                .filter(|s| evaluate(&query.condition, s))
                .count();
            if hits > 0 {
                let copies = if query.distinct || query.is_join() { 1 } else { hits };
                for _ in 0..copies {
                    out.push(base.clone());
                }
            }
        }

        Ok(out)
    }
}

/// Resolve one side of an ON pair, reading the candidate row for the clause being joined.
fn resolve_side(scope: &Scope<'_>, column: &ColumnRef, alias: &str, candidate: &Row) -> Value {
    if column.qualifier.as_deref() == Some(alias) {
        candidate.get(&column.name).cloned().unwrap_or(Value::Null)
    } else {
        scope.get(column)
    }
}

fn evaluate(node: &ConditionNode, scope: &Scope<'_>) -> bool {
    match node {
        ConditionNode::And(children) => children.iter().all(|c| evaluate(c, scope)),
        ConditionNode::Or(children) => {
            children.is_empty() || children.iter().any(|c| evaluate(c, scope))
        }
        ConditionNode::Leaf { column, op, value } => {
            let actual = scope.get(column);
            match op {
                Operator::IsNull => actual.is_null(),
                Operator::IsNotNull => !actual.is_null(),
                _ if actual.is_null() => false,
                Operator::Eq => actual.loose_eq(value),
                Operator::Ne => !value.is_null() && !actual.loose_eq(value),
                Operator::In => value
                    .as_list()
                    .is_some_and(|items| items.iter().any(|v| actual.loose_eq(v))),
                Operator::NotIn => value
                    .as_list()
                    .is_some_and(|items| !items.iter().any(|v| actual.loose_eq(v))),
                Operator::Like => like(&actual.to_key_string(), &value.to_key_string()),
                Operator::Gt => actual.compare(value).is_some_and(|o| o.is_gt()),
                Operator::Ge => actual.compare(value).is_some_and(|o| o.is_ge()),
                Operator::Lt => actual.compare(value).is_some_and(|o| o.is_lt()),
                Operator::Le => actual.compare(value).is_some_and(|o| o.is_le()),
                Operator::Between => match value.as_list() {
                    Some([low, high]) => {
                        actual.compare(low).is_some_and(|o| o.is_ge())
                            && actual.compare(high).is_some_and(|o| o.is_le())
                    }
                    _ => false,
                },
            }
        }
    }
}

/// SQL LIKE with `%` and `_`, ASCII case-insensitive.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // dp[j]: pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen = seen || dp[j];
                    next[j] = seen;
                }
            }
            _ => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && (*p == '_' || *p == text[j - 1]);
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}

fn sort_rows(rows: &mut [Row], order: &[(ColumnRef, Direction)]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for (column, direction) in order {
            let av = a.get(&column.name).cloned().unwrap_or(Value::Null);
            let bv = b.get(&column.name).cloned().unwrap_or(Value::Null);
            // NULLs first, like SQLite
            let ordering = match (av.is_null(), bv.is_null()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => av.compare(&bv).unwrap_or(std::cmp::Ordering::Equal),
            };
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    async fn query(&self, query: &SelectQuery) -> Result<Vec<Row>, EngineError> {
        self.log.lock().push(query.clone());

        let mut rows = self.matching(query)?;
        sort_rows(&mut rows, &query.order);

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let rows: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();

        tracing::debug!(table = %query.table, rows = rows.len(), "Executed in-memory query");

        Ok(if query.projection.is_empty() {
            rows
        } else {
            rows.iter().map(|r| r.project(&query.projection)).collect()
        })
    }

    async fn count(&self, query: &SelectQuery) -> Result<i64, EngineError> {
        self.log.lock().push(query.unpaged());
        Ok(self.matching(query)?.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::join::JoinClause;

    fn engine() -> MemoryEngine {
        MemoryEngine::new()
            .with_table(
                "employee",
                vec![
                    Row::new().with("id", 1).with("name", "Ann").with("dept_id", 5),
                    Row::new().with("id", 2).with("name", "Bob").with("dept_id", 6),
                    Row::new().with("id", 3).with("name", "Cy").with("dept_id", Value::Null),
                ],
            )
            .with_table(
                "dept",
                vec![
                    Row::new().with("id", "5").with("name", "Eng"),
                    Row::new().with("id", "6").with("name", "Ops"),
                ],
            )
    }

    #[test]
    fn test_like() {
        assert!(like("Engineering", "%gin%"));
        assert!(like("Engineering", "eng%"));
        assert!(like("Engineering", "%ING"));
        assert!(like("abc", "a_c"));
        assert!(!like("abc", "a_"));
        assert!(like("", "%"));
    }

    #[tokio::test]
    async fn test_filters_and_orders() {
        let engine = engine();
        let query = SelectQuery::new("employee")
            .filter(ConditionNode::leaf(
                ColumnRef::new("id"),
                Operator::Ge,
                2,
            ))
            .order(ColumnRef::new("name"), Direction::Desc);
        let rows = engine.query(&query).await.unwrap();
        let names: Vec<String> = rows
            .iter()
            .map(|r| r.get("name").unwrap().to_key_string())
            .collect();
        assert_eq!(names, vec!["Cy", "Bob"]);
        assert_eq!(engine.queries_for("employee"), 1);
    }

    #[tokio::test]
    async fn test_left_join_filter() {
        let engine = engine();
        let query = SelectQuery::new("employee")
            .joins(vec![JoinClause {
                table: "dept".into(),
                alias: "r1".into(),
                entity: Some("Dept".into()),
                on: vec![(
                    ColumnRef::qualified("self", "dept_id"),
                    ColumnRef::qualified("r1", "id"),
                )],
            }])
            .filter(ConditionNode::eq(ColumnRef::qualified("r1", "name"), "Eng"));

        let rows = engine.query(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Ann")));
        assert_eq!(engine.count(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let result = engine().query(&SelectQuery::new("nope")).await;
        assert!(matches!(result, Err(EngineError::UnknownTable(t)) if t == "nope"));
    }
}
