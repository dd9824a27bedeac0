//! Memberships table: a user's time-bounded attachment to a club.

use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "memberships")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub club_id: i64,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub fee: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::clubs::Entity",
        from = "Column::ClubId",
        to = "super::clubs::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Clubs,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::clubs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Clubs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Membership;

    fn pk(&self) -> i64 {
        self.id
    }
}

impl Model {
    /// Whether `day` falls inside `[date_start, date_end]`.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.date_start <= day && day <= self.date_end
    }

    /// Whether the two closed intervals intersect.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.date_start <= end && start <= self.date_end
    }
}
