//! Activities organised by clubs, with an optional guest entry fee.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "activities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: String,
    pub organizer_id: i64,
    /// Members of this club may attend.
    pub attendees_club_id: i64,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub valid: bool,
    pub open: bool,
    pub guest_entry_fee: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::guests::Entity")]
    Guests,
}

impl Related<super::guests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Guests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Activity;

    fn pk(&self) -> i64 {
        self.id
    }
}
