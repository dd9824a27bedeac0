//! Append-only change log.
//!
//! `previous` and `data` hold the changed fields for edits and the full row
//! for creations and deletions.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// What happened to the logged row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "changelogs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Acting user, absent on the administrative path.
    pub user_id: Option<i64>,
    pub ip: Option<String>,
    pub model: String,
    pub instance_pk: i64,
    pub previous: Option<Json>,
    pub data: Option<Json>,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
