//! Relation binding
//!
//! Copies fields from related rows onto already-loaded owners without the
//! engine performing the join:
//!
//! - direct: `owner.dept_id -> dept.id`, one lookup against `dept`
//! - through a middle table: `owner.id -> user_role.user_id`,
//!   `user_role.role_id -> role.id`, one lookup per table
//!
//! ```rust,ignore
//! let link = RelationLink::new("role")
//!     .join("id", "id")
//!     .middle(MiddleTable::new("user_role", "user_id", "role_id"))
//!     .link("role_name", "role_name");
//! FieldBinder::new(&engine).bind(&mut users, &link).await?;
//! ```

mod field_binder;
mod link;
mod match_key;

pub use field_binder::FieldBinder;
pub use link::{MiddleTable, RelationLink};
pub use match_key::MatchKey;
