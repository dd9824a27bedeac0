//! Banking-partner credits: one per user, funding several membership fees
//! through a single deferred transaction.

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "credits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub user_id: i64,
    /// The aggregate transaction from the bank-transfer account.
    pub credit_transaction_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::credit_transactions::Entity")]
    CreditTransactions,
}

impl Related<super::credit_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Credit;

    fn pk(&self) -> i64 {
        self.id
    }
}
