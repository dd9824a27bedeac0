//! Roles: named groups of permissions, optionally scoped to one club.

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{permission::ModelKind, tracked::Tracked};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "roles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    /// When set, the role may only be held in this club.
    pub for_club_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Role;

    fn pk(&self) -> i64 {
        self.id
    }
}

impl Model {
    /// Whether the role may be attached to a membership of `club_id`.
    pub fn applies_to(&self, club_id: i64) -> bool {
        self.for_club_id.is_none_or(|club| club == club_id)
    }
}
