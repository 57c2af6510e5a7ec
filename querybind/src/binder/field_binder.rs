//! Batched application-level joins
//!
//! [`FieldBinder::bind`] issues one lookup per table no matter how many
//! owners it is given, then copies the linked columns onto every owner whose
//! join values match a related row.

use std::collections::{HashMap, HashSet};

use crate::engine::{QueryEngine, Row, SelectQuery};
use crate::error::BindError;
use crate::meta::{Properties, read_property, write_property};
use crate::naming::to_column_name;
use crate::query::condition::{ColumnRef, ConditionNode};
use crate::value::Value;

use super::link::{MiddleTable, RelationLink};
use super::match_key::MatchKey;

pub struct FieldBinder<'e, E: QueryEngine + ?Sized> {
    engine: &'e E,
}

impl<'e, E: QueryEngine + ?Sized> FieldBinder<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Bind `link` onto `owners`. Returns how many owners received a value.
    ///
    /// Configuration errors are raised before any lookup runs, and no owner is
    /// modified unless every lookup succeeded. Owners without a match are left
    /// untouched.
    pub async fn bind<O: Properties>(
        &self,
        owners: &mut [O],
        link: &RelationLink,
    ) -> Result<usize, BindError> {
        link.validate()?;
        if owners.is_empty() {
            return Ok(0);
        }

        let owner_fields: Vec<&str> = link.owner_fields().collect();
        let owner_keys: Vec<Option<Vec<Value>>> = owners
            .iter()
            .map(|owner| owner_values(owner, &owner_fields))
            .collect();

        let (rows, middle_map) = match &link.middle {
            None => {
                let lookups = distinct_columns(&owner_keys, owner_fields.len());
                if lookups.iter().any(Vec::is_empty) {
                    tracing::debug!(related = %link.related_table, "No owner join values, skipping lookup");
                    return Ok(0);
                }
                (self.lookup_related(link, lookups).await?, None)
            }
            Some(middle) => {
                let values = distinct_columns(&owner_keys, 1).remove(0);
                if values.is_empty() {
                    tracing::debug!(middle = %middle.table, "No owner join values, skipping lookup");
                    return Ok(0);
                }
                let map = self.lookup_middle(middle, values).await?;

                let mut seen = HashSet::new();
                let related_keys: Vec<Value> = map
                    .values()
                    .filter(|v| seen.insert(v.to_key_string()))
                    .cloned()
                    .collect();
                if related_keys.is_empty() {
                    return Ok(0);
                }
                (
                    self.lookup_related(link, vec![related_keys]).await?,
                    Some(map),
                )
            }
        };

        let related_columns: Vec<&str> = link.related_columns().collect();
        let mut index: HashMap<MatchKey, usize> = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let parts: Option<Vec<&Value>> = related_columns.iter().map(|c| row.get(c)).collect();
            if let Some(key) = parts.and_then(|p| MatchKey::new(p)) {
                index.insert(key, i);
            }
        }

        let linked: Vec<(String, &str)> = link
            .links
            .iter()
            .map(|(related, owner)| (to_column_name(related), owner.as_str()))
            .collect();

        let mut bound = 0;
        for (owner, values) in owners.iter_mut().zip(owner_keys) {
            let Some(values) = values else {
                continue;
            };
            let key = match &middle_map {
                None => MatchKey::new(values.iter()),
                Some(map) => MatchKey::new(values.iter())
                    .and_then(|k| map.get(&k))
                    .and_then(|related| MatchKey::new([related])),
            };
            let Some(row) = key.and_then(|k| index.get(&k)).map(|&i| &rows[i]) else {
                continue;
            };

            let mut wrote = false;
            for (related_column, owner_field) in &linked {
                if let Some(value) = row.get(related_column) {
                    wrote |= write_property(owner, owner_field, value.clone());
                }
            }
            if wrote {
                bound += 1;
            }
        }

        tracing::debug!(
            related = %link.related_table,
            owners = owners.len(),
            rows = rows.len(),
            bound,
            "Bound related fields"
        );
        Ok(bound)
    }

    /// Bind several links in sequence.
    pub async fn bind_all<O: Properties>(
        &self,
        owners: &mut [O],
        links: &[RelationLink],
    ) -> Result<usize, BindError> {
        for link in links {
            link.validate()?;
        }
        let mut total = 0;
        for link in links {
            total += self.bind(owners, link).await?;
        }
        Ok(total)
    }

    async fn lookup_related(
        &self,
        link: &RelationLink,
        lookups: Vec<Vec<Value>>,
    ) -> Result<Vec<Row>, BindError> {
        let mut columns: Vec<ColumnRef> = Vec::new();
        let linked = link.links.iter().map(|(related, _)| to_column_name(related));
        for name in link.related_columns().map(str::to_string).chain(linked) {
            let column = ColumnRef::new(name);
            if !columns.contains(&column) {
                columns.push(column);
            }
        }

        let condition = ConditionNode::and(
            link.related_columns()
                .zip(lookups)
                .map(|(column, values)| ConditionNode::in_values(ColumnRef::new(column), values)),
        );
        let condition = match &link.filter {
            Some(filter) => condition.and_also(filter.clone()),
            None => condition,
        };

        let query = SelectQuery::new(link.related_table.clone())
            .filter(condition)
            .project(columns);
        Ok(self.engine.query(&query).await?)
    }

    /// Owner join value key -> related key, last row wins.
    async fn lookup_middle(
        &self,
        middle: &MiddleTable,
        owner_values: Vec<Value>,
    ) -> Result<HashMap<MatchKey, Value>, BindError> {
        let (Some(owner_column), Some(related_column)) =
            (middle.owner_column(), middle.related_column())
        else {
            return Err(BindError::invalid_usage(format!(
                "middle table {} has no column mapping",
                middle.table
            )));
        };

        let condition = ConditionNode::in_values(ColumnRef::new(owner_column), owner_values);
        let condition = match &middle.filter {
            Some(filter) => condition.and_also(filter.clone()),
            None => condition,
        };
        let query = SelectQuery::new(middle.table.clone())
            .filter(condition)
            .project(vec![ColumnRef::new(owner_column), ColumnRef::new(related_column)]);
        let rows = self.engine.query(&query).await?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in &rows {
            let (Some(owner), Some(related)) = (row.get(owner_column), row.get(related_column))
            else {
                continue;
            };
            if related.is_null() {
                continue;
            }
            if let Some(key) = MatchKey::new([owner]) {
                map.insert(key, related.clone());
            }
        }
        Ok(map)
    }
}

/// An owner's join values, `None` when any is missing or null.
fn owner_values<O: Properties>(owner: &O, fields: &[&str]) -> Option<Vec<Value>> {
    fields
        .iter()
        .map(|field| read_property(owner, field).filter(|v| !v.is_null()))
        .collect()
}

/// Distinct non-null values per join column, in first-seen order.
fn distinct_columns(keys: &[Option<Vec<Value>>], width: usize) -> Vec<Vec<Value>> {
    let mut out: Vec<Vec<Value>> = vec![Vec::new(); width];
    let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); width];
    for values in keys.iter().flatten() {
        for (i, value) in values.iter().enumerate().take(width) {
            if seen[i].insert(value.to_key_string()) {
                out[i].push(value.clone());
            }
        }
    }
    out
}
