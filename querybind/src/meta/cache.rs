//! Process-wide metadata cache
//!
//! Descriptors are resolved once per DTO type (column names, join aliases,
//! protected fields) and then only read. Two threads racing on the first
//! lookup both compute the same metadata; the first insert wins and the other
//! result is discarded.

use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::BindError;
use crate::naming::to_column_name;
use crate::query::join::{JoinDef, JoinPlan, PRIMARY_ALIAS, parse_condition};

use super::spec::{BindSpec, DtoDescriptor, EntityInfo, FieldDescriptor};
use super::traits::{Entity, QueryDto};

static GLOBAL: Lazy<MetaCache> = Lazy::new(MetaCache::new);

/// A join already defined for the DTO being resolved.
struct JoinKey {
    /// `entity|normalized condition`
    signature: String,
    alias: String,
    explicit: bool,
}

/// A [`BindSpec`] with its target column and join alias worked out.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    /// DTO field the spec is declared on.
    pub field_name: String,
    pub spec: BindSpec,
    /// Entity owning the target column, if known.
    pub entity: Option<String>,
    /// Field name on the target entity.
    pub target_field: String,
    pub column: String,
    /// Join alias when the column lives on another table.
    pub join: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    pub descriptor: FieldDescriptor,
    pub specs: Vec<ResolvedSpec>,
    /// Column on the primary table, used by specless fields and ordering.
    pub column: String,
}

impl FieldMeta {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Specs that are not marked `ignore`.
    pub fn active_specs(&self) -> impl Iterator<Item = &ResolvedSpec> {
        self.specs.iter().filter(|s| !s.spec.ignore)
    }

    pub fn has_join(&self) -> bool {
        self.active_specs().any(|s| s.join.is_some())
    }
}

/// Resolved metadata for one DTO type.
#[derive(Debug, Clone, PartialEq)]
pub struct DtoMeta {
    pub name: String,
    pub table: String,
    pub entity: Option<EntityInfo>,
    pub fields: Vec<FieldMeta>,
    pub joins: Vec<JoinDef>,
}

impl DtoMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.descriptor.name == name)
    }

    pub fn entity_name(&self) -> Option<&str> {
        self.entity.as_ref().map(|e| e.name.as_str())
    }

    /// Whether any of `fields` is bound to a column on another table.
    pub fn has_join_table(&self, fields: &[&str]) -> bool {
        self.fields
            .iter()
            .filter(|f| fields.contains(&f.name()))
            .any(FieldMeta::has_join)
    }

    /// Joins needed by `fields`.
    pub fn join_plan(&self, fields: &[&str]) -> JoinPlan {
        let aliases: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| fields.contains(&f.name()))
            .flat_map(|f| f.active_specs().filter_map(|s| s.join.as_deref()))
            .collect();
        JoinPlan::resolve(&self.joins, &aliases)
    }
}

/// Memoized DTO and entity metadata.
#[derive(Default)]
pub struct MetaCache {
    dtos: RwLock<HashMap<TypeId, Arc<DtoMeta>>>,
    protected: RwLock<HashMap<String, Arc<HashSet<String>>>>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every compiler in the process.
    pub fn global() -> &'static MetaCache {
        &GLOBAL
    }

    pub fn dto_meta<D: QueryDto>(&self) -> Result<Arc<DtoMeta>, BindError> {
        let key = TypeId::of::<D>();
        if let Some(meta) = self.dtos.read().get(&key) {
            return Ok(meta.clone());
        }

        let descriptor = D::describe();
        let meta = Arc::new(resolve(&descriptor)?);
        tracing::debug!(
            dto = %meta.name,
            rust_type = type_name::<D>(),
            fields = meta.fields.len(),
            joins = meta.joins.len(),
            "Resolved query metadata"
        );

        if let Some(entity) = &descriptor.entity {
            self.register_info(entity);
        }
        for spec in descriptor.fields.iter().flat_map(|f| f.binds.iter()) {
            if let Some(entity) = &spec.entity {
                self.register_info(entity);
            }
        }

        let mut dtos = self.dtos.write();
        Ok(dtos.entry(key).or_insert(meta).clone())
    }

    /// Every binding rule on `D`, in field declaration order.
    pub fn bind_specs<D: QueryDto>(&self) -> Result<Vec<ResolvedSpec>, BindError> {
        let meta = self.dto_meta::<D>()?;
        Ok(meta
            .fields
            .iter()
            .flat_map(|f| f.specs.iter().cloned())
            .collect())
    }

    pub fn has_join_table<D: QueryDto>(&self, fields: &[&str]) -> Result<bool, BindError> {
        Ok(self.dto_meta::<D>()?.has_join_table(fields))
    }

    /// Protected field names of an entity; empty when the entity is unknown.
    pub fn protected_fields(&self, entity: &str) -> Arc<HashSet<String>> {
        self.protected.read().get(entity).cloned().unwrap_or_default()
    }

    pub fn register_entity<E: Entity>(&self) {
        self.register_info(&E::entity_info());
    }

    fn register_info(&self, info: &EntityInfo) {
        if self.protected.read().contains_key(&info.name) {
            return;
        }
        let fields: HashSet<String> = info.protected.iter().cloned().collect();
        self.protected
            .write()
            .entry(info.name.clone())
            .or_insert_with(|| Arc::new(fields));
    }
}

fn resolve(descriptor: &DtoDescriptor) -> Result<DtoMeta, BindError> {
    let table = descriptor.primary_table().ok_or_else(|| {
        BindError::invalid_usage(format!(
            "{} declares neither an entity nor a table",
            descriptor.name
        ))
    })?;

    let mut joins: Vec<JoinDef> = Vec::new();
    let mut join_keys: Vec<JoinKey> = Vec::new();
    let mut next_middle = 0;
    let mut fields = Vec::with_capacity(descriptor.fields.len());

    for field in &descriptor.fields {
        let mut specs = Vec::with_capacity(field.binds.len());
        for spec in &field.binds {
            specs.push(resolve_spec(
                descriptor,
                table,
                field,
                spec,
                &mut joins,
                &mut join_keys,
                &mut next_middle,
            )?);
        }

        let column = field
            .column
            .clone()
            .or_else(|| {
                descriptor
                    .entity
                    .as_ref()
                    .and_then(|e| e.column_for(&field.name))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| to_column_name(&field.name));

        fields.push(FieldMeta {
            descriptor: field.clone(),
            specs,
            column,
        });
    }

    Ok(DtoMeta {
        name: descriptor.name.clone(),
        table: table.to_string(),
        entity: descriptor.entity.clone(),
        fields,
        joins,
    })
}

fn resolve_spec(
    descriptor: &DtoDescriptor,
    table: &str,
    field: &FieldDescriptor,
    spec: &BindSpec,
    joins: &mut Vec<JoinDef>,
    join_keys: &mut Vec<JoinKey>,
    next_middle: &mut usize,
) -> Result<ResolvedSpec, BindError> {
    let target = spec.entity.as_ref().or(descriptor.entity.as_ref());
    let target_field = spec.field.clone().unwrap_or_else(|| field.name.clone());

    let column = match (&spec.field, &field.column) {
        (None, Some(explicit)) if spec.entity.is_none() => explicit.clone(),
        _ => target
            .and_then(|e| e.column_for(&target_field))
            .map(str::to_string)
            .unwrap_or_else(|| to_column_name(&target_field)),
    };

    let join = match (&spec.condition, &spec.entity) {
        (Some(_), None) => {
            return Err(BindError::invalid_usage(format!(
                "{}.{} declares a join condition without a target entity",
                descriptor.name, field.name
            )));
        }
        (None, Some(entity)) if entity.table != table => {
            return Err(BindError::invalid_usage(format!(
                "{}.{} targets {} on table {} without a join condition",
                descriptor.name, field.name, entity.name, entity.table
            )));
        }
        (None, _) => None,
        (Some(condition), Some(entity)) => {
            let normalized = condition.split_whitespace().collect::<Vec<_>>().join(" ");
            let signature = format!("{}|{}", entity.name, normalized);
            let existing = join_keys.iter().find(|k| match &spec.alias {
                Some(alias) => k.alias.eq_ignore_ascii_case(alias),
                None => !k.explicit && k.signature == signature,
            });
            match existing {
                Some(k) if k.signature == signature => Some(k.alias.clone()),
                Some(k) => {
                    return Err(BindError::invalid_usage(format!(
                        "{}.{} reuses join alias {} for a different join",
                        descriptor.name, field.name, k.alias
                    )));
                }
                None => {
                    let alias = match &spec.alias {
                        Some(alias)
                            if alias.eq_ignore_ascii_case(PRIMARY_ALIAS)
                                || alias.eq_ignore_ascii_case("this") =>
                        {
                            return Err(BindError::invalid_usage(format!(
                                "{}.{} uses the reserved join alias {}",
                                descriptor.name, field.name, alias
                            )));
                        }
                        Some(alias) => alias.clone(),
                        None => next_free_alias(joins),
                    };
                    let def =
                        parse_condition(&normalized, &entity.table, &alias, &entity.name, next_middle)?;
                    if let Some(clash) = def.clauses.iter().find(|c| alias_taken(joins, &c.alias)) {
                        return Err(BindError::invalid_usage(format!(
                            "{}.{} join alias {} is already in use",
                            descriptor.name, field.name, clash.alias
                        )));
                    }
                    joins.push(def);
                    join_keys.push(JoinKey {
                        signature,
                        alias: alias.clone(),
                        explicit: spec.alias.is_some(),
                    });
                    Some(alias)
                }
            }
        }
    };

    Ok(ResolvedSpec {
        field_name: field.name.clone(),
        spec: spec.clone(),
        entity: target.map(|e| e.name.clone()),
        target_field,
        column,
        join,
    })
}

fn alias_taken(joins: &[JoinDef], alias: &str) -> bool {
    joins
        .iter()
        .flat_map(|d| &d.clauses)
        .any(|c| c.alias.eq_ignore_ascii_case(alias))
}

/// First `rN` no clause uses yet.
fn next_free_alias(joins: &[JoinDef]) -> String {
    let mut n = joins.len() + 1;
    loop {
        let alias = format!("r{}", n);
        if !alias_taken(joins, &alias) {
            return alias;
        }
        n += 1;
    }
}
