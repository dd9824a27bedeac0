//! Membership transactions covered by a credit.

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "credit_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub credit_id: i64,
    #[sea_orm(unique)]
    pub transaction_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::credits::Entity",
        from = "Column::CreditId",
        to = "super::credits::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Credits,
}

impl Related<super::credits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::CreditTransaction;

    fn pk(&self) -> i64 {
        self.id
    }
}
