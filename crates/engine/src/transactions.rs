//! The module contains the polymorphic `transactions` table.
//!
//! Every money movement is one row; `polymorphic_kind` selects which of the
//! variant columns are meaningful.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::{EngineError, permission::ModelKind, tracked::Tracked};

/// Variant tag stored in `polymorphic_kind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Plain,
    Template,
    Membership,
    Special,
    Guest,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Template => "template",
            Self::Membership => "membership",
            Self::Special => "special",
            Self::Guest => "guest",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "plain" => Ok(Self::Plain),
            "template" => Ok(Self::Template),
            "membership" => Ok(Self::Membership),
            "special" => Ok(Self::Special),
            "guest" => Ok(Self::Guest),
            other => Err(EngineError::validation(
                "polymorphic_kind",
                "invalid_kind",
                format!("invalid transaction kind: {other}"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub source_id: i64,
    pub destination_id: i64,
    /// Display string of the source, captured at creation.
    pub source_alias: String,
    pub destination_alias: String,
    pub quantity: i64,
    /// Unit amount in hundredths.
    pub amount: i64,
    pub reason: String,
    pub valid: bool,
    /// Empty iff `valid`.
    pub invalidity_reason: String,
    pub created_at: DateTime<Utc>,
    pub polymorphic_kind: String,
    pub template_id: Option<i64>,
    pub category_id: Option<i64>,
    #[sea_orm(unique)]
    pub membership_id: Option<i64>,
    #[sea_orm(unique)]
    pub guest_id: Option<i64>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub bank: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::SourceId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Source,
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::DestinationId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Destination,
}

impl ActiveModelBehavior for ActiveModel {}

impl Tracked for Model {
    const KIND: ModelKind = ModelKind::Transaction;

    fn pk(&self) -> i64 {
        self.id
    }
}

impl Model {
    /// `quantity × amount`, saturating on overflow.
    pub fn total(&self) -> i64 {
        self.quantity.saturating_mul(self.amount)
    }

    pub fn kind(&self) -> Result<TransactionKind, EngineError> {
        TransactionKind::try_from(self.polymorphic_kind.as_str())
    }
}
