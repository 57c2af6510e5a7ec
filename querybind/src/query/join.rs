//! Join resolution for fields bound to other tables
//!
//! A join condition is a list of `left=right` column pairs joined by `AND`.
//! `this.` or `self.` addresses the DTO's primary table, a bare column
//! addresses the target entity, and any other qualifier names a middle table
//! joined in between:
//!
//! ```text
//! this.dept_id=id
//! this.id=user_role.user_id AND user_role.role_id=id
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::BindError;

use super::condition::ColumnRef;

/// Alias of the primary table in joined queries.
pub const PRIMARY_ALIAS: &str = "self";

static PAIR_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+AND\s+").unwrap());

static PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(\w+)\.)?(\w+)\s*=\s*(?:(\w+)\.)?(\w+)\s*$").unwrap()
});

/// One `LEFT JOIN table alias ON ...` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    /// Entity name for target clauses, `None` for middle tables.
    pub entity: Option<String>,
    pub on: Vec<(ColumnRef, ColumnRef)>,
}

/// The joins one target alias needs: its middle tables, then the target itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinDef {
    pub alias: String,
    pub clauses: Vec<JoinClause>,
}

/// Joins attached to one compiled query, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPlan {
    pub clauses: Vec<JoinClause>,
}

impl JoinPlan {
    /// Select the clauses needed by `aliases`, keeping definition order.
    pub fn resolve(defs: &[JoinDef], aliases: &[&str]) -> Self {
        let clauses = defs
            .iter()
            .filter(|def| aliases.contains(&def.alias.as_str()))
            .flat_map(|def| def.clauses.iter().cloned())
            .collect();
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.clauses.iter().map(|c| c.alias.as_str()).collect()
    }

    pub fn clause(&self, alias: &str) -> Option<&JoinClause> {
        self.clauses.iter().find(|c| c.alias == alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Side {
    Primary,
    Target,
    Middle(String),
}

/// Parse a join condition into its clauses.
///
/// `next_middle` numbers middle-table aliases across one DTO type.
pub(crate) fn parse_condition(
    condition: &str,
    target_table: &str,
    target_alias: &str,
    entity: &str,
    next_middle: &mut usize,
) -> Result<JoinDef, BindError> {
    let mut middles: Vec<(String, JoinClause)> = Vec::new();
    let mut target = JoinClause {
        table: target_table.to_string(),
        alias: target_alias.to_string(),
        entity: Some(entity.to_string()),
        on: Vec::new(),
    };

    for pair in PAIR_SPLIT.split(condition.trim()) {
        let caps = PAIR.captures(pair).ok_or_else(|| {
            BindError::invalid_usage(format!("unsupported join condition `{}`", pair.trim()))
        })?;

        let left = classify(caps.get(1).map(|m| m.as_str()), target_table, target_alias);
        let right = classify(caps.get(3).map(|m| m.as_str()), target_table, target_alias);
        let left_col = &caps[2];
        let right_col = &caps[4];

        for side in [&left, &right] {
            if let Side::Middle(table) = side {
                if !middles.iter().any(|(t, _)| t == table) {
                    *next_middle += 1;
                    middles.push((
                        table.clone(),
                        JoinClause {
                            table: table.clone(),
                            alias: format!("m{}", next_middle),
                            entity: None,
                            on: Vec::new(),
                        },
                    ));
                }
            }
        }

        let column = |side: &Side, name: &str| -> ColumnRef {
            match side {
                Side::Primary => ColumnRef::qualified(PRIMARY_ALIAS, name),
                Side::Target => ColumnRef::qualified(target_alias, name),
                Side::Middle(table) => {
                    let alias = middles
                        .iter()
                        .find(|(t, _)| t == table)
                        .map(|(_, c)| c.alias.clone())
                        .unwrap_or_default();
                    ColumnRef::qualified(alias, name)
                }
            }
        };

        let on = (column(&left, left_col), column(&right, right_col));
        match (&left, &right) {
            (Side::Primary, Side::Primary) | (Side::Target, Side::Target) => {
                return Err(BindError::invalid_usage(format!(
                    "join condition `{}` must link two different tables",
                    pair.trim()
                )));
            }
            (Side::Target, _) | (_, Side::Target) => target.on.push(on),
            (Side::Middle(a), Side::Middle(b)) => {
                // Attach to whichever middle table was introduced later.
                let later = middles
                    .iter()
                    .rposition(|(t, _)| t == a || t == b)
                    .unwrap_or_default();
                middles[later].1.on.push(on);
            }
            (Side::Middle(table), Side::Primary) | (Side::Primary, Side::Middle(table)) => {
                if let Some((_, clause)) = middles.iter_mut().find(|(t, _)| t == table) {
                    clause.on.push(on);
                }
            }
        }
    }

    if target.on.is_empty() {
        return Err(BindError::invalid_usage(format!(
            "join condition `{}` never references the target table {}",
            condition, target_table
        )));
    }
    if let Some((table, _)) = middles.iter().find(|(_, c)| c.on.is_empty()) {
        return Err(BindError::invalid_usage(format!(
            "middle table {} is not joined to the primary table in `{}`",
            table, condition
        )));
    }

    let mut clauses: Vec<JoinClause> = middles.into_iter().map(|(_, c)| c).collect();
    clauses.push(target);
    Ok(JoinDef {
        alias: target_alias.to_string(),
        clauses,
    })
}

fn classify(qualifier: Option<&str>, target_table: &str, target_alias: &str) -> Side {
    match qualifier {
        None => Side::Target,
        Some(q) if q.eq_ignore_ascii_case("this") || q.eq_ignore_ascii_case(PRIMARY_ALIAS) => {
            Side::Primary
        }
        Some(q) if q == target_table || q == target_alias => Side::Target,
        Some(q) => Side::Middle(q.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_direct_join() {
        let mut counter = 0;
        let def = parse_condition("this.dept_id=id", "dept", "r1", "Dept", &mut counter).unwrap();
        assert_eq!(def.clauses.len(), 1);
        assert_eq!(
            def.clauses[0].on,
            vec![(
                ColumnRef::qualified("self", "dept_id"),
                ColumnRef::qualified("r1", "id")
            )]
        );
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_middle_table_join() {
        let mut counter = 0;
        let def = parse_condition(
            "this.id=user_role.user_id and user_role.role_id=id",
            "role",
            "r1",
            "Role",
            &mut counter,
        )
        .unwrap();

        let tables: Vec<&str> = def.clauses.iter().map(|c| c.table.as_str()).collect();
        assert_eq!(tables, vec!["user_role", "role"]);
        assert_eq!(def.clauses[0].alias, "m1");
        assert_eq!(
            def.clauses[1].on,
            vec![(
                ColumnRef::qualified("m1", "role_id"),
                ColumnRef::qualified("r1", "id")
            )]
        );
    }

    #[test]
    fn test_multi_column_join() {
        let mut counter = 0;
        let def = parse_condition(
            "this.org_id=org_id AND this.code=code",
            "dept",
            "r2",
            "Dept",
            &mut counter,
        )
        .unwrap();
        assert_eq!(def.clauses[0].on.len(), 2);
    }

    #[test]
    fn test_rejects_malformed_conditions() {
        let mut counter = 0;
        assert!(parse_condition("this.id > id", "dept", "r1", "Dept", &mut counter).is_err());
        assert!(parse_condition("this.a=this.b", "dept", "r1", "Dept", &mut counter).is_err());
        assert!(parse_condition("this.a=ur.b", "dept", "r1", "Dept", &mut counter).is_err());
    }

    #[test]
    fn test_resolve_keeps_only_used_aliases() {
        let mut counter = 0;
        let defs = vec![
            parse_condition("this.dept_id=id", "dept", "r1", "Dept", &mut counter).unwrap(),
            parse_condition("this.org_id=id", "org", "r2", "Org", &mut counter).unwrap(),
        ];
        let plan = JoinPlan::resolve(&defs, &["r2"]);
        assert_eq!(plan.aliases(), vec!["r2"]);
        assert!(JoinPlan::resolve(&defs, &[]).is_empty());
    }
}
