//! Bank remittances grouping special transactions.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "remittances")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub remittance_type_id: i64,
    pub date: DateTime<Utc>,
    pub comment: String,
    pub closed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Remittance;

    fn pk(&self) -> i64 {
        self.id
    }
}
