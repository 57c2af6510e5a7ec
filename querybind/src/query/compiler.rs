//! Transfer object to condition tree compilation
//!
//! [`QueryCompiler::compile`] walks a DTO's declared fields, keeps the ones
//! whose values should take part in the query, resolves each to a column and
//! turns its binding rules into leaves:
//!
//! - one rule per field becomes one leaf, a field without rules is an `=` leaf
//! - several rules on a field become an OR group
//! - all fields are ANDed together
//!
//! Columns bound to other tables switch the whole query into joined form:
//! primary columns are qualified `self.` and foreign ones with their join alias.

use std::sync::Arc;

use crate::engine::SelectQuery;
use crate::error::BindError;
use crate::meta::{
    Comparison, DtoMeta, FieldKind, FieldMeta, MetaCache, QueryDto, ResolvedSpec, Strategy,
};
use crate::naming::{is_identifier, to_column_name};
use crate::protect::{ProtectError, ProtectFieldHandler};
use crate::value::Value;

use super::condition::{ColumnRef, ConditionNode, Operator};
use super::join::{JoinPlan, PRIMARY_ALIAS};
use super::pagination::{Direction, Pagination};

/// Output of one compile call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub table: String,
    pub condition: ConditionNode,
    /// Present when any kept field is bound to another table.
    pub join_plan: Option<JoinPlan>,
    /// Names of the fields that took part, in declaration order.
    pub fields: Vec<String>,
    pub pagination: Option<Pagination>,
    columns: Vec<ColumnRef>,
    order: Vec<(ColumnRef, Direction)>,
}

impl CompiledQuery {
    /// The resolved column of every kept field.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn is_join(&self) -> bool {
        self.join_plan.is_some()
    }

    /// Resolved order-by columns.
    pub fn order(&self) -> &[(ColumnRef, Direction)] {
        &self.order
    }

    /// The engine-facing select, paged when a pagination was given.
    pub fn to_select(&self) -> SelectQuery {
        let joins = self
            .join_plan
            .as_ref()
            .map(|p| p.clauses.clone())
            .unwrap_or_default();
        let mut query = SelectQuery::new(self.table.clone())
            .joins(joins)
            .filter(self.condition.clone());
        for (column, direction) in &self.order {
            query = query.order(column.clone(), *direction);
        }
        if let Some(pagination) = &self.pagination {
            query = query.page(pagination);
        }
        query
    }
}

struct FieldAndValue<'m> {
    field: &'m FieldMeta,
    value: Value,
}

/// Compiles [`QueryDto`]s against the process-wide [`MetaCache`].
#[derive(Clone)]
pub struct QueryCompiler {
    cache: &'static MetaCache,
    protector: Option<Arc<dyn ProtectFieldHandler>>,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("protector", &self.protector.as_ref().map(|_| "..."))
            .finish()
    }
}

impl QueryCompiler {
    pub fn new() -> Self {
        Self {
            cache: MetaCache::global(),
            protector: None,
        }
    }

    /// Route protected fields through `handler` before they are compared.
    pub fn with_protector(mut self, handler: Arc<dyn ProtectFieldHandler>) -> Self {
        self.protector = Some(handler);
        self
    }

    pub fn cache(&self) -> &'static MetaCache {
        self.cache
    }

    /// Compile `dto` into a condition tree.
    ///
    /// `allowed_fields` limits which fields are considered; date fields and
    /// fields named in the pagination's order-by are kept regardless. Field
    /// read and conversion failures drop the field; broken join metadata is
    /// an [`BindError::InvalidUsage`].
    pub fn compile<D: QueryDto>(
        &self,
        dto: &D,
        allowed_fields: Option<&[&str]>,
        pagination: Option<&Pagination>,
    ) -> Result<CompiledQuery, BindError> {
        let meta = self.cache.dto_meta::<D>()?;
        let order_fields = pagination
            .map(Pagination::order_field_names)
            .unwrap_or_default();

        let kept = self.extract(&meta, dto, allowed_fields, &order_fields);
        let names: Vec<&str> = kept.iter().map(|f| f.field.name()).collect();
        let joined = kept.iter().any(|f| f.field.has_join());
        let join_plan = joined.then(|| meta.join_plan(&names));

        let mut leaves = Vec::with_capacity(kept.len());
        let mut columns = Vec::with_capacity(kept.len());
        for fv in &kept {
            let active: Vec<&ResolvedSpec> = fv.field.active_specs().collect();
            columns.push(resolve_column(fv.field, active.first().copied(), joined));

            if active.len() > 1 {
                let group = ConditionNode::or(
                    active
                        .iter()
                        .filter(|s| !s.spec.rejects(&fv.value))
                        .filter_map(|s| self.build_leaf(&meta, fv.field, Some(s), &fv.value, joined)),
                );
                leaves.push(group);
                continue;
            }

            let spec = active.first().copied();
            let skip = match spec {
                Some(s) => s.spec.rejects(&fv.value),
                None => fv.value.is_empty(),
            };
            if skip {
                continue;
            }
            if let Some(leaf) = self.build_leaf(&meta, fv.field, spec, &fv.value, joined) {
                leaves.push(leaf);
            }
        }

        let condition = ConditionNode::and(leaves);
        let order = pagination
            .map(|p| resolve_order(&meta, p, joined))
            .unwrap_or_default();

        tracing::debug!(
            dto = %meta.name,
            fields = kept.len(),
            joined,
            condition = %condition,
            "Compiled query condition"
        );

        Ok(CompiledQuery {
            table: meta.table.clone(),
            condition,
            join_plan,
            fields: names.iter().map(|n| n.to_string()).collect(),
            pagination: pagination.cloned(),
            columns,
            order,
        })
    }

    fn extract<'m, D: QueryDto>(
        &self,
        meta: &'m DtoMeta,
        dto: &D,
        allowed_fields: Option<&[&str]>,
        order_fields: &[String],
    ) -> Vec<FieldAndValue<'m>> {
        let mut kept = Vec::new();

        for field in &meta.fields {
            let d = &field.descriptor;
            if d.transient {
                continue;
            }

            let ordered = is_order_field(&d.name, order_fields);
            let allowed = allowed_fields.is_none_or(|a| a.contains(&d.name.as_str()));
            if !allowed && !ordered && d.kind != FieldKind::Date {
                continue;
            }
            if !d.persistent {
                continue;
            }
            if !field.specs.is_empty() && field.active_specs().next().is_none() {
                continue;
            }

            let value = match dto.read_field(&d.name) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(dto = %meta.name, field = %d.name, error = %e, "Field read failed, skipping");
                    continue;
                }
            };

            if let Some(sentinel) = &d.logic_delete {
                if value.loose_eq(sentinel) {
                    continue;
                }
            }

            let strategy = field
                .active_specs()
                .map(|s| s.spec.strategy)
                .reduce(Strategy::widest)
                .unwrap_or_default();
            if !ordered && !strategy.accepts(&value) {
                continue;
            }

            kept.push(FieldAndValue { field, value });
        }

        kept
    }

    fn build_leaf(
        &self,
        meta: &DtoMeta,
        field: &FieldMeta,
        spec: Option<&ResolvedSpec>,
        value: &Value,
        joined: bool,
    ) -> Option<ConditionNode> {
        let (comparison, strategy) = spec
            .map(|s| (s.spec.comparison, s.spec.strategy))
            .unwrap_or_default();
        let column = resolve_column(field, spec, joined);

        let value = match self.protect(meta, field, spec, value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(field = %field.name(), error = %e, "Protected value could not be encrypted, skipping");
                return None;
            }
        };

        if value.is_null() {
            return match (strategy, comparison) {
                (Strategy::IncludeNull, Comparison::Eq) => Some(ConditionNode::is_null(column)),
                (Strategy::IncludeNull, Comparison::NotEq) => {
                    Some(ConditionNode::leaf(column, Operator::IsNotNull, Value::Null))
                }
                _ => None,
            };
        }

        let scalar = |op: Operator, value: Value| -> Option<ConditionNode> {
            if value.is_list() {
                tracing::warn!(field = %field.name(), comparison = %comparison, "List value for scalar comparison, skipping");
                return None;
            }
            Some(ConditionNode::leaf(column.clone(), op, value))
        };

        match comparison {
            Comparison::Eq => scalar(Operator::Eq, value),
            Comparison::NotEq => scalar(Operator::Ne, value),
            Comparison::In | Comparison::NotIn => {
                let negated = comparison == Comparison::NotIn;
                match value {
                    Value::List(mut items) => match items.len() {
                        0 => None,
                        1 => {
                            let op = if negated { Operator::Ne } else { Operator::Eq };
                            Some(ConditionNode::leaf(column, op, items.remove(0)))
                        }
                        _ => {
                            let op = if negated { Operator::NotIn } else { Operator::In };
                            Some(ConditionNode::leaf(column, op, Value::List(items)))
                        }
                    },
                    _ => {
                        tracing::warn!(field = %field.name(), comparison = %comparison, "Set comparison needs a collection, skipping");
                        None
                    }
                }
            }
            Comparison::Contains | Comparison::Like | Comparison::StartsWith | Comparison::EndsWith => {
                if value.is_empty() {
                    return None;
                }
                if value.is_list() {
                    return scalar(Operator::Like, value);
                }
                let text = value.to_key_string();
                let pattern = match comparison {
                    Comparison::StartsWith => format!("{}%", text),
                    Comparison::EndsWith => format!("%{}", text),
                    _ => format!("%{}%", text),
                };
                Some(ConditionNode::leaf(column, Operator::Like, pattern))
            }
            Comparison::Gt | Comparison::Ge | Comparison::Lt | Comparison::Le => {
                if value.is_empty() {
                    return None;
                }
                let op = match comparison {
                    Comparison::Gt => Operator::Gt,
                    Comparison::Ge => Operator::Ge,
                    Comparison::Lt => Operator::Lt,
                    _ => Operator::Le,
                };
                scalar(op, value)
            }
            Comparison::BetweenBegin if !value.is_empty() => scalar(Operator::Ge, value),
            Comparison::BetweenEnd if !value.is_empty() => scalar(Operator::Le, value),
            Comparison::BetweenBegin | Comparison::BetweenEnd => None,
            Comparison::Between => between(column, field, value),
        }
    }

    fn protect(
        &self,
        meta: &DtoMeta,
        field: &FieldMeta,
        spec: Option<&ResolvedSpec>,
        value: &Value,
    ) -> Result<Value, ProtectError> {
        let Some(handler) = &self.protector else {
            return Ok(value.clone());
        };

        let entity = spec
            .and_then(|s| s.entity.as_deref())
            .or_else(|| meta.entity_name());
        let target = spec.map_or(field.name(), |s| s.target_field.as_str());
        let Some(entity) = entity else {
            return Ok(value.clone());
        };
        if !self.cache.protected_fields(entity).contains(target) {
            return Ok(value.clone());
        }

        encrypt_value(handler.as_ref(), entity, target, value)
    }
}

fn encrypt_value(
    handler: &dyn ProtectFieldHandler,
    entity: &str,
    field: &str,
    value: &Value,
) -> Result<Value, ProtectError> {
    Ok(match value {
        Value::Null => Value::Null,
        Value::Text(s) => Value::Text(handler.encrypt(entity, field, s)?),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| encrypt_value(handler, entity, field, item))
                .collect::<Result<_, _>>()?,
        ),
        other => Value::Text(handler.encrypt(entity, field, &other.to_key_string())?),
    })
}

fn between(column: ColumnRef, field: &FieldMeta, value: Value) -> Option<ConditionNode> {
    match value {
        Value::List(mut items) => match items.len() {
            0 => None,
            1 => Some(ConditionNode::leaf(column, Operator::Ge, items.remove(0))),
            _ => {
                items.truncate(2);
                Some(ConditionNode::leaf(column, Operator::Between, Value::List(items)))
            }
        },
        Value::Text(text) if text.contains(',') => {
            let parts: Vec<&str> = text.split(',').map(str::trim).collect();
            match parts.as_slice() {
                [low, high] if !low.is_empty() && !high.is_empty() => Some(ConditionNode::leaf(
                    column,
                    Operator::Between,
                    Value::List(vec![Value::from(*low), Value::from(*high)]),
                )),
                _ => {
                    tracing::warn!(field = %field.name(), value = %text, "BETWEEN string needs exactly two values, skipping");
                    None
                }
            }
        }
        other if other.is_empty() => None,
        other => Some(ConditionNode::leaf(column, Operator::Ge, other)),
    }
}

/// Column a leaf compares against.
fn resolve_column(field: &FieldMeta, spec: Option<&ResolvedSpec>, joined: bool) -> ColumnRef {
    match spec {
        Some(ResolvedSpec {
            join: Some(alias),
            column,
            ..
        }) => ColumnRef::qualified(alias.clone(), column.clone()),
        Some(s) => primary_column(&s.column, joined),
        None => primary_column(&field.column, joined),
    }
}

fn primary_column(name: &str, joined: bool) -> ColumnRef {
    if joined {
        ColumnRef::qualified(PRIMARY_ALIAS, name)
    } else {
        ColumnRef::new(name)
    }
}

fn is_order_field(name: &str, order_fields: &[String]) -> bool {
    if order_fields.is_empty() {
        return false;
    }
    let snake = to_column_name(name);
    order_fields.iter().any(|f| *f == name || *f == snake)
}

fn resolve_order(meta: &DtoMeta, pagination: &Pagination, joined: bool) -> Vec<(ColumnRef, Direction)> {
    pagination
        .order_items()
        .into_iter()
        .filter_map(|item| {
            let column = meta
                .fields
                .iter()
                .find(|f| f.name() == item.field || to_column_name(f.name()) == item.field)
                .map(|f| f.column.clone())
                .unwrap_or_else(|| item.field.clone());
            if !is_identifier(&column) {
                tracing::warn!(dto = %meta.name, order_by = %item.field, "Ignoring invalid order-by field");
                return None;
            }
            Some((primary_column(&column, joined), item.direction))
        })
        .collect()
}
