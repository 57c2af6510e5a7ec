//! Field metadata: binding rules, accessor traits and the metadata cache
//!
//! The derive macros in `querybind-macros` generate implementations of the
//! traits here from annotated structs:
//! - `#[derive(Entity)]` describes a table and its protected fields
//! - `#[derive(QueryDto)]` describes a transfer object and its [`BindSpec`]s
//! - `#[derive(Properties)]` provides by-name get/set for relation binding
//!
//! ```rust,ignore
//! #[derive(QueryDto, Default)]
//! #[query(entity = Employee)]
//! struct EmployeeQuery {
//!     #[bind_query(comparison = Contains)]
//!     name: Option<String>,
//!     #[bind_query(comparison = In, field = "dept_id")]
//!     depts: Vec<i64>,
//! }
//! ```

mod cache;
mod spec;
mod traits;

pub use cache::*;
pub use spec::*;
pub use traits::*;
