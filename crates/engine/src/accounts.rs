//! The module contains the polymorphic `accounts` table.
//!
//! One row per balance-bearing identity. The `kind` discriminator tells which
//! of `user_id`, `club_id` or `special_type` is set.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{EngineError, permission::ModelKind, tracked::Tracked};

/// Account variant stored in the `kind` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountKind {
    User,
    Club,
    Special,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Club => "club",
            Self::Special => "special",
        }
    }
}

impl TryFrom<&str> for AccountKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "club" => Ok(Self::Club),
            "special" => Ok(Self::Special),
            other => Err(EngineError::validation(
                "kind",
                "invalid_kind",
                format!("invalid account kind: {other}"),
            )),
        }
    }
}

/// Why an account is inactive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InactivityReason {
    /// The owner locked the account.
    Manual,
    /// An administrator locked the account.
    Forced,
}

impl InactivityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Forced => "forced",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub kind: String,
    #[sea_orm(unique)]
    pub user_id: Option<i64>,
    #[sea_orm(unique)]
    pub club_id: Option<i64>,
    #[sea_orm(unique)]
    pub special_type: Option<String>,
    /// Balance in hundredths.
    pub balance: i64,
    pub is_active: bool,
    /// `manual`, `forced`, or empty while active.
    pub inactivity_reason: String,
    pub last_negative: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub display_image: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Users,
    #[sea_orm(
        belongs_to = "super::clubs::Entity",
        from = "Column::ClubId",
        to = "super::clubs::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Clubs,
    #[sea_orm(has_many = "super::aliases::Entity")]
    Aliases,
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

impl Related<super::aliases::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Aliases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Account;

    fn pk(&self) -> i64 {
        self.id
    }
}

impl Model {
    pub fn account_kind(&self) -> Result<AccountKind, EngineError> {
        AccountKind::try_from(self.kind.as_str())
    }

    pub fn is_special(&self) -> bool {
        self.kind == AccountKind::Special.as_str()
    }

    /// A fresh, active, zero-balance account of `kind`.
    pub(crate) fn blank(kind: AccountKind, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            kind: kind.as_str().to_string(),
            user_id: None,
            club_id: None,
            special_type: None,
            balance: 0,
            is_active: true,
            inactivity_reason: String::new(),
            last_negative: None,
            created_at: now,
            display_image: String::from("pic/default.png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_kind_round_trip() {
        for kind in [AccountKind::User, AccountKind::Club, AccountKind::Special] {
            assert_eq!(AccountKind::try_from(kind.as_str()).unwrap(), kind);
        }
        assert!(AccountKind::try_from("bank").is_err());
    }
}
