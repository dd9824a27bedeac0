//! Seeds the payment-method accounts money enters and leaves the Note through.

use chrono::Utc;
use sea_orm_migration::prelude::*;

use super::m20250901_000000_init::Accounts;

/// Special types created with the schema, `transfer` being the account
/// banking-partner credits are drawn from.
const SPECIAL_TYPES: [&str; 4] = ["cash", "card", "check", "transfer"];

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let created_at = Utc::now().to_rfc3339();
        for special_type in SPECIAL_TYPES {
            let insert = Query::insert()
                .into_table(Accounts::Table)
                .columns([
                    Accounts::Kind,
                    Accounts::SpecialType,
                    Accounts::Balance,
                    Accounts::IsActive,
                    Accounts::InactivityReason,
                    Accounts::CreatedAt,
                    Accounts::DisplayImage,
                ])
                .values([
                    "special".into(),
                    special_type.into(),
                    0_i64.into(),
                    true.into(),
                    "".into(),
                    created_at.clone().into(),
                    "pic/default.png".into(),
                ])
                .map_err(|err| DbErr::Custom(err.to_string()))?
                .to_owned();
            manager.exec_stmt(insert).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let delete = Query::delete()
            .from_table(Accounts::Table)
            .and_where(Expr::col(Accounts::SpecialType).is_in(SPECIAL_TYPES))
            .to_owned();
        manager.exec_stmt(delete).await
    }
}
