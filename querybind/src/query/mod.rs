//! Condition compilation
//!
//! - [`condition`]: the `Leaf | And | Or` tree
//! - [`compiler`]: DTO fields to tree
//! - [`join`]: join conditions and alias plans
//! - [`pagination`]: paging and ordering input
//! - [`sql`]: rendering for SQL engines

pub mod compiler;
pub mod condition;
pub mod join;
pub mod pagination;
pub mod sql;

pub use compiler::{CompiledQuery, QueryCompiler};
pub use condition::{ColumnRef, ConditionNode, Operator};
pub use join::{JoinClause, JoinPlan};
pub use pagination::{Direction, OrderItem, Pagination};
pub use sql::SqlWriter;
