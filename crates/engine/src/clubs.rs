//! Clubs table.

use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "clubs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub email: String,
    /// Joining this club requires a concurrent membership of the parent.
    pub parent_club_id: Option<i64>,
    pub require_memberships: bool,
    pub membership_fee_paid: i64,
    pub membership_fee_unpaid: i64,
    /// Membership length in days; unbounded when absent.
    pub membership_duration: Option<i64>,
    /// First day a membership may start.
    pub membership_start: Option<NaiveDate>,
    /// Last day any membership may run to.
    pub membership_end: Option<NaiveDate>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentClubId",
        to = "Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    ParentClub,
    #[sea_orm(has_many = "super::memberships::Entity")]
    Memberships,
}

impl Related<super::memberships::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Club;

    fn pk(&self) -> i64 {
        self.id
    }
}

impl Model {
    /// Fee charged to a user, depending on the paid-student flag.
    pub fn fee_for(&self, paid: bool) -> i64 {
        if paid {
            self.membership_fee_paid
        } else {
            self.membership_fee_unpaid
        }
    }
}
