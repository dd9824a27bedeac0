//! Permission rules.
//!
//! `query` holds the JSON query template; see
//! [`QueryTemplate`](crate::permission::QueryTemplate) for the grammar.

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Target model name, e.g. `account`.
    pub model: String,
    /// One of `view`, `add`, `change`, `delete`.
    pub op: String,
    /// Only for `view` and `change`.
    pub field: Option<String>,
    pub query: String,
    /// The rule is active when the session mask is at least this rank.
    pub rank: i64,
    /// Permanent rules also apply outside the membership window.
    pub permanent: bool,
    pub description: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Permission;

    fn pk(&self) -> i64 {
        self.id
    }
}
