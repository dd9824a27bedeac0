//! The permission model: rule records compiled to predicates.
//!
//! A stored rule carries a JSON [`QueryTemplate`]. Binding it to a
//! membership with an [`Environment`] yields an [`InstantiatedPermission`]
//! whose [`Predicate`] runs both as a SQL condition and in memory. The
//! backend that gathers and composes rules lives in `ops::backend`.

mod cache;
mod instance;
mod model;
mod predicate;
mod query;
mod scopes;

pub(crate) use cache::{CheckKey, FilterKey, PermissionCache};
pub(crate) use instance::expand_snapshot;
pub use instance::{Environment, InstantiatedPermission, instantiate};
pub use model::{ModelKind, Op};
pub use predicate::{CompareOp, FieldPath, Operand, Predicate, Scalar};
pub use query::QueryTemplate;
pub use scopes::{format_scopes, parse_scope, parse_scopes};
