//! Querybind
//!
//! Compiles annotated transfer objects into engine-independent condition
//! trees and binds fields from related tables onto loaded rows in batches.
//!
//! ```rust,ignore
//! use querybind::{Entity, QueryCompiler, QueryDto};
//!
//! #[derive(Entity)]
//! #[entity(table = "employee")]
//! struct Employee { id: i64, name: String, dept_id: i64 }
//!
//! #[derive(QueryDto, Default)]
//! #[query(entity = Employee)]
//! struct EmployeeQuery {
//!     #[bind_query(comparison = Contains)]
//!     name: Option<String>,
//!     #[bind_query(comparison = In, field = "dept_id")]
//!     depts: Vec<i64>,
//! }
//!
//! let compiled = QueryCompiler::new().compile(&dto, None, None)?;
//! let rows = engine.query(&compiled.to_select()).await?;
//! ```

// Lets the derives' `::querybind::` paths resolve inside this crate's own tests.
extern crate self as querybind;

pub mod binder;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod meta;
pub mod naming;
pub mod protect;
pub mod query;
pub mod service;
pub mod value;

pub use binder::{FieldBinder, MatchKey, MiddleTable, RelationLink};
pub use config::Config;
#[cfg(feature = "sqlite")]
pub use engine::SqliteEngine;
pub use engine::{MemoryEngine, QueryEngine, Row, SelectQuery};
pub use error::{BindError, EngineError};
pub use meta::{
    BindSpec, Comparison, DtoDescriptor, Entity, EntityInfo, FieldDescriptor, FieldKind,
    MetaCache, Properties, PropertyError, QueryDto, Strategy,
};
pub use protect::{AesProtectHandler, ProtectError, ProtectFieldHandler};
pub use query::{
    ColumnRef, CompiledQuery, ConditionNode, Direction, JoinPlan, Operator, Pagination,
    QueryCompiler,
};
pub use querybind_macros::{Entity, Properties, QueryDto};
pub use service::QueryService;
pub use value::{FromValue, ToValue, Value, ValueError};
