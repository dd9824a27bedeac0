//! Initial schema of the Note.
//!
//! - identities: `users`, `clubs`, `accounts`, `aliases`
//! - ledger: `transactions`, `transaction_templates`, `template_categories`
//! - permissions: `roles`, `permissions`, `role_permissions`,
//!   `memberships`, `membership_roles`, `sessions`, `access_tokens`
//! - audit: `changelogs`
//! - partner bank: `credits`, `credit_transactions`
//! - activities: `activities`, `guests`
//! - treasury: `invoices`, `products`, `remittance_types`, `remittances`,
//!   `remittance_transactions`

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Username,
    Password,
    FirstName,
    LastName,
    Email,
    Paid,
    IsSuperuser,
    CreatedAt,
}

#[derive(Iden)]
enum Clubs {
    Table,
    Id,
    Name,
    Email,
    ParentClubId,
    RequireMemberships,
    MembershipFeePaid,
    MembershipFeeUnpaid,
    MembershipDuration,
    MembershipStart,
    MembershipEnd,
}

#[derive(Iden)]
pub(crate) enum Accounts {
    Table,
    Id,
    Kind,
    UserId,
    ClubId,
    SpecialType,
    Balance,
    IsActive,
    InactivityReason,
    LastNegative,
    CreatedAt,
    DisplayImage,
}

#[derive(Iden)]
enum Aliases {
    Table,
    Id,
    Name,
    NormalizedName,
    AccountId,
}

#[derive(Iden)]
enum TemplateCategories {
    Table,
    Id,
    Name,
}

#[derive(Iden)]
enum TransactionTemplates {
    Table,
    Id,
    Name,
    DestinationId,
    Amount,
    CategoryId,
    Display,
    Highlighted,
    Description,
}

#[derive(Iden)]
enum Roles {
    Table,
    Id,
    Name,
    ForClubId,
}

#[derive(Iden)]
enum Permissions {
    Table,
    Id,
    Model,
    Op,
    Field,
    Query,
    Rank,
    Permanent,
    Description,
}

#[derive(Iden)]
enum RolePermissions {
    Table,
    Id,
    RoleId,
    PermissionId,
}

#[derive(Iden)]
enum Memberships {
    Table,
    Id,
    UserId,
    ClubId,
    DateStart,
    DateEnd,
    Fee,
}

#[derive(Iden)]
enum MembershipRoles {
    Table,
    Id,
    MembershipId,
    RoleId,
}

#[derive(Iden)]
enum Activities {
    Table,
    Id,
    Name,
    Description,
    OrganizerId,
    AttendeesClubId,
    DateStart,
    DateEnd,
    Valid,
    Open,
    GuestEntryFee,
}

#[derive(Iden)]
enum Guests {
    Table,
    Id,
    ActivityId,
    InviterId,
    FirstName,
    LastName,
    CreatedAt,
    EntryTime,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    SourceId,
    DestinationId,
    SourceAlias,
    DestinationAlias,
    Quantity,
    Amount,
    Reason,
    Valid,
    InvalidityReason,
    CreatedAt,
    PolymorphicKind,
    TemplateId,
    CategoryId,
    MembershipId,
    GuestId,
    LastName,
    FirstName,
    Bank,
}

#[derive(Iden)]
enum Credits {
    Table,
    Id,
    UserId,
    CreditTransactionId,
}

#[derive(Iden)]
enum CreditTransactions {
    Table,
    Id,
    CreditId,
    TransactionId,
}

#[derive(Iden)]
enum Changelogs {
    Table,
    Id,
    UserId,
    Ip,
    Model,
    InstancePk,
    Previous,
    Data,
    Action,
    Timestamp,
}

#[derive(Iden)]
enum Sessions {
    Table,
    Key,
    UserId,
    PermissionMask,
    CreatedAt,
}

#[derive(Iden)]
enum AccessTokens {
    Table,
    Token,
    UserId,
    Scopes,
    CreatedAt,
    ExpiresAt,
}

#[derive(Iden)]
enum Invoices {
    Table,
    Id,
    Bde,
    Object,
    Description,
    Name,
    Address,
    Date,
    Acquitted,
    Locked,
}

#[derive(Iden)]
enum Products {
    Table,
    Id,
    InvoiceId,
    Designation,
    Quantity,
    Amount,
}

#[derive(Iden)]
enum RemittanceTypes {
    Table,
    Id,
    SpecialAccountId,
}

#[derive(Iden)]
enum Remittances {
    Table,
    Id,
    RemittanceTypeId,
    Date,
    Comment,
    Closed,
}

#[derive(Iden)]
enum RemittanceTransactions {
    Table,
    Id,
    TransactionId,
    RemittanceId,
}

fn id_col<T: Iden + 'static>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn fk<T, C, R, P>(name: &str, table: T, col: C, ref_table: R, ref_col: P) -> ForeignKeyCreateStatement
where
    T: IntoIden + 'static,
    C: IntoIden,
    R: IntoIden + 'static,
    P: IntoIden,
{
    ForeignKey::create()
        .name(name)
        .from(table, col)
        .to(ref_table, ref_col)
        .to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Identities
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(&mut id_col(Users::Id))
                    .col(ColumnDef::new(Users::Username).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Password).string().not_null())
                    .col(ColumnDef::new(Users::FirstName).string().not_null().default(""))
                    .col(ColumnDef::new(Users::LastName).string().not_null().default(""))
                    .col(ColumnDef::new(Users::Email).string().not_null().default(""))
                    .col(ColumnDef::new(Users::Paid).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Users::IsSuperuser)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Clubs::Table)
                    .if_not_exists()
                    .col(&mut id_col(Clubs::Id))
                    .col(ColumnDef::new(Clubs::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Clubs::Email).string().not_null().default(""))
                    .col(ColumnDef::new(Clubs::ParentClubId).big_integer())
                    .col(
                        ColumnDef::new(Clubs::RequireMemberships)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Clubs::MembershipFeePaid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Clubs::MembershipFeeUnpaid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Clubs::MembershipDuration).big_integer())
                    .col(ColumnDef::new(Clubs::MembershipStart).date())
                    .col(ColumnDef::new(Clubs::MembershipEnd).date())
                    .foreign_key(&mut fk(
                        "fk-clubs-parent_club_id",
                        Clubs::Table,
                        Clubs::ParentClubId,
                        Clubs::Table,
                        Clubs::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(&mut id_col(Accounts::Id))
                    .col(ColumnDef::new(Accounts::Kind).string().not_null())
                    .col(ColumnDef::new(Accounts::UserId).big_integer().unique_key())
                    .col(ColumnDef::new(Accounts::ClubId).big_integer().unique_key())
                    .col(ColumnDef::new(Accounts::SpecialType).string().unique_key())
                    .col(
                        ColumnDef::new(Accounts::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Accounts::InactivityReason)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Accounts::LastNegative).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Accounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Accounts::DisplayImage)
                            .string()
                            .not_null()
                            .default("pic/default.png"),
                    )
                    .foreign_key(&mut fk(
                        "fk-accounts-user_id",
                        Accounts::Table,
                        Accounts::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-accounts-club_id",
                        Accounts::Table,
                        Accounts::ClubId,
                        Clubs::Table,
                        Clubs::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Aliases::Table)
                    .if_not_exists()
                    .col(&mut id_col(Aliases::Id))
                    .col(ColumnDef::new(Aliases::Name).string().not_null())
                    .col(
                        ColumnDef::new(Aliases::NormalizedName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Aliases::AccountId).big_integer().not_null())
                    .foreign_key(&mut fk(
                        "fk-aliases-account_id",
                        Aliases::Table,
                        Aliases::AccountId,
                        Accounts::Table,
                        Accounts::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-aliases-account_id")
                    .table(Aliases::Table)
                    .col(Aliases::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Templates
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(TemplateCategories::Table)
                    .if_not_exists()
                    .col(&mut id_col(TemplateCategories::Id))
                    .col(
                        ColumnDef::new(TemplateCategories::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TransactionTemplates::Table)
                    .if_not_exists()
                    .col(&mut id_col(TransactionTemplates::Id))
                    .col(
                        ColumnDef::new(TransactionTemplates::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(TransactionTemplates::DestinationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionTemplates::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionTemplates::CategoryId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionTemplates::Display)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TransactionTemplates::Highlighted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TransactionTemplates::Description)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .foreign_key(&mut fk(
                        "fk-transaction_templates-destination_id",
                        TransactionTemplates::Table,
                        TransactionTemplates::DestinationId,
                        Accounts::Table,
                        Accounts::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-transaction_templates-category_id",
                        TransactionTemplates::Table,
                        TransactionTemplates::CategoryId,
                        TemplateCategories::Table,
                        TemplateCategories::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Roles and permissions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(&mut id_col(Roles::Id))
                    .col(ColumnDef::new(Roles::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Roles::ForClubId).big_integer())
                    .foreign_key(&mut fk(
                        "fk-roles-for_club_id",
                        Roles::Table,
                        Roles::ForClubId,
                        Clubs::Table,
                        Clubs::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(&mut id_col(Permissions::Id))
                    .col(ColumnDef::new(Permissions::Model).string().not_null())
                    .col(ColumnDef::new(Permissions::Op).string().not_null())
                    .col(ColumnDef::new(Permissions::Field).string())
                    .col(ColumnDef::new(Permissions::Query).text().not_null())
                    .col(
                        ColumnDef::new(Permissions::Rank)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Permissions::Permanent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Permissions::Description)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolePermissions::Table)
                    .if_not_exists()
                    .col(&mut id_col(RolePermissions::Id))
                    .col(ColumnDef::new(RolePermissions::RoleId).big_integer().not_null())
                    .col(
                        ColumnDef::new(RolePermissions::PermissionId)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(&mut fk(
                        "fk-role_permissions-role_id",
                        RolePermissions::Table,
                        RolePermissions::RoleId,
                        Roles::Table,
                        Roles::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-role_permissions-permission_id",
                        RolePermissions::Table,
                        RolePermissions::PermissionId,
                        Permissions::Table,
                        Permissions::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-role_permissions-role_id-permission_id-unique")
                    .table(RolePermissions::Table)
                    .col(RolePermissions::RoleId)
                    .col(RolePermissions::PermissionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Memberships::Table)
                    .if_not_exists()
                    .col(&mut id_col(Memberships::Id))
                    .col(ColumnDef::new(Memberships::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Memberships::ClubId).big_integer().not_null())
                    .col(ColumnDef::new(Memberships::DateStart).date().not_null())
                    .col(ColumnDef::new(Memberships::DateEnd).date().not_null())
                    .col(
                        ColumnDef::new(Memberships::Fee)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(&mut fk(
                        "fk-memberships-user_id",
                        Memberships::Table,
                        Memberships::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-memberships-club_id",
                        Memberships::Table,
                        Memberships::ClubId,
                        Clubs::Table,
                        Clubs::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-memberships-user_id-club_id")
                    .table(Memberships::Table)
                    .col(Memberships::UserId)
                    .col(Memberships::ClubId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MembershipRoles::Table)
                    .if_not_exists()
                    .col(&mut id_col(MembershipRoles::Id))
                    .col(
                        ColumnDef::new(MembershipRoles::MembershipId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MembershipRoles::RoleId).big_integer().not_null())
                    .foreign_key(&mut fk(
                        "fk-membership_roles-membership_id",
                        MembershipRoles::Table,
                        MembershipRoles::MembershipId,
                        Memberships::Table,
                        Memberships::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-membership_roles-role_id",
                        MembershipRoles::Table,
                        MembershipRoles::RoleId,
                        Roles::Table,
                        Roles::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Activities
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Activities::Table)
                    .if_not_exists()
                    .col(&mut id_col(Activities::Id))
                    .col(ColumnDef::new(Activities::Name).string().not_null())
                    .col(
                        ColumnDef::new(Activities::Description)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Activities::OrganizerId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Activities::AttendeesClubId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Activities::DateStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Activities::DateEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Activities::Valid).boolean().not_null().default(false))
                    .col(ColumnDef::new(Activities::Open).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Activities::GuestEntryFee)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(&mut fk(
                        "fk-activities-organizer_id",
                        Activities::Table,
                        Activities::OrganizerId,
                        Clubs::Table,
                        Clubs::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-activities-attendees_club_id",
                        Activities::Table,
                        Activities::AttendeesClubId,
                        Clubs::Table,
                        Clubs::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Guests::Table)
                    .if_not_exists()
                    .col(&mut id_col(Guests::Id))
                    .col(ColumnDef::new(Guests::ActivityId).big_integer().not_null())
                    .col(ColumnDef::new(Guests::InviterId).big_integer().not_null())
                    .col(ColumnDef::new(Guests::FirstName).string().not_null())
                    .col(ColumnDef::new(Guests::LastName).string().not_null())
                    .col(
                        ColumnDef::new(Guests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Guests::EntryTime).timestamp_with_time_zone())
                    .foreign_key(&mut fk(
                        "fk-guests-activity_id",
                        Guests::Table,
                        Guests::ActivityId,
                        Activities::Table,
                        Activities::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-guests-inviter_id",
                        Guests::Table,
                        Guests::InviterId,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(&mut id_col(Transactions::Id))
                    .col(ColumnDef::new(Transactions::SourceId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Transactions::DestinationId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::SourceAlias)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Transactions::DestinationAlias)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Transactions::Quantity)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Reason).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::Valid)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Transactions::InvalidityReason)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::PolymorphicKind)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::TemplateId).big_integer())
                    .col(ColumnDef::new(Transactions::CategoryId).big_integer())
                    .col(
                        ColumnDef::new(Transactions::MembershipId)
                            .big_integer()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Transactions::GuestId).big_integer().unique_key())
                    .col(ColumnDef::new(Transactions::LastName).string())
                    .col(ColumnDef::new(Transactions::FirstName).string())
                    .col(ColumnDef::new(Transactions::Bank).string())
                    .foreign_key(&mut fk(
                        "fk-transactions-source_id",
                        Transactions::Table,
                        Transactions::SourceId,
                        Accounts::Table,
                        Accounts::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-transactions-destination_id",
                        Transactions::Table,
                        Transactions::DestinationId,
                        Accounts::Table,
                        Accounts::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-transactions-template_id",
                        Transactions::Table,
                        Transactions::TemplateId,
                        TransactionTemplates::Table,
                        TransactionTemplates::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-transactions-membership_id",
                        Transactions::Table,
                        Transactions::MembershipId,
                        Memberships::Table,
                        Memberships::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-transactions-guest_id",
                        Transactions::Table,
                        Transactions::GuestId,
                        Guests::Table,
                        Guests::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-source_id")
                    .table(Transactions::Table)
                    .col(Transactions::SourceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-destination_id")
                    .table(Transactions::Table)
                    .col(Transactions::DestinationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-created_at")
                    .table(Transactions::Table)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Partner-bank credits
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Credits::Table)
                    .if_not_exists()
                    .col(&mut id_col(Credits::Id))
                    .col(
                        ColumnDef::new(Credits::UserId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Credits::CreditTransactionId).big_integer())
                    .foreign_key(&mut fk(
                        "fk-credits-user_id",
                        Credits::Table,
                        Credits::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-credits-credit_transaction_id",
                        Credits::Table,
                        Credits::CreditTransactionId,
                        Transactions::Table,
                        Transactions::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CreditTransactions::Table)
                    .if_not_exists()
                    .col(&mut id_col(CreditTransactions::Id))
                    .col(
                        ColumnDef::new(CreditTransactions::CreditId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditTransactions::TransactionId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .foreign_key(&mut fk(
                        "fk-credit_transactions-credit_id",
                        CreditTransactions::Table,
                        CreditTransactions::CreditId,
                        Credits::Table,
                        Credits::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-credit_transactions-transaction_id",
                        CreditTransactions::Table,
                        CreditTransactions::TransactionId,
                        Transactions::Table,
                        Transactions::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Change log, sessions and tokens
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Changelogs::Table)
                    .if_not_exists()
                    .col(&mut id_col(Changelogs::Id))
                    .col(ColumnDef::new(Changelogs::UserId).big_integer())
                    .col(ColumnDef::new(Changelogs::Ip).string())
                    .col(ColumnDef::new(Changelogs::Model).string().not_null())
                    .col(ColumnDef::new(Changelogs::InstancePk).big_integer().not_null())
                    .col(ColumnDef::new(Changelogs::Previous).json())
                    .col(ColumnDef::new(Changelogs::Data).json())
                    .col(ColumnDef::new(Changelogs::Action).string().not_null())
                    .col(
                        ColumnDef::new(Changelogs::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-changelogs-model-instance_pk")
                    .table(Changelogs::Table)
                    .col(Changelogs::Model)
                    .col(Changelogs::InstancePk)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sessions::Key).string().not_null().primary_key())
                    .col(ColumnDef::new(Sessions::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Sessions::PermissionMask)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Sessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(&mut fk(
                        "fk-sessions-user_id",
                        Sessions::Table,
                        Sessions::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AccessTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessTokens::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AccessTokens::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(AccessTokens::Scopes)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(AccessTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AccessTokens::ExpiresAt).timestamp_with_time_zone())
                    .foreign_key(&mut fk(
                        "fk-access_tokens-user_id",
                        AccessTokens::Table,
                        AccessTokens::UserId,
                        Users::Table,
                        Users::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 8. Treasury
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(&mut id_col(Invoices::Id))
                    .col(ColumnDef::new(Invoices::Bde).string().not_null())
                    .col(ColumnDef::new(Invoices::Object).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Invoices::Name).string().not_null())
                    .col(ColumnDef::new(Invoices::Address).text().not_null().default(""))
                    .col(ColumnDef::new(Invoices::Date).date().not_null())
                    .col(
                        ColumnDef::new(Invoices::Acquitted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Invoices::Locked).boolean().not_null().default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(&mut id_col(Products::Id))
                    .col(ColumnDef::new(Products::InvoiceId).big_integer().not_null())
                    .col(ColumnDef::new(Products::Designation).string().not_null())
                    .col(ColumnDef::new(Products::Quantity).big_integer().not_null())
                    .col(ColumnDef::new(Products::Amount).big_integer().not_null())
                    .foreign_key(&mut fk(
                        "fk-products-invoice_id",
                        Products::Table,
                        Products::InvoiceId,
                        Invoices::Table,
                        Invoices::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RemittanceTypes::Table)
                    .if_not_exists()
                    .col(&mut id_col(RemittanceTypes::Id))
                    .col(
                        ColumnDef::new(RemittanceTypes::SpecialAccountId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .foreign_key(&mut fk(
                        "fk-remittance_types-special_account_id",
                        RemittanceTypes::Table,
                        RemittanceTypes::SpecialAccountId,
                        Accounts::Table,
                        Accounts::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Remittances::Table)
                    .if_not_exists()
                    .col(&mut id_col(Remittances::Id))
                    .col(
                        ColumnDef::new(Remittances::RemittanceTypeId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Remittances::Date)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Remittances::Comment)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Remittances::Closed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(&mut fk(
                        "fk-remittances-remittance_type_id",
                        Remittances::Table,
                        Remittances::RemittanceTypeId,
                        RemittanceTypes::Table,
                        RemittanceTypes::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RemittanceTransactions::Table)
                    .if_not_exists()
                    .col(&mut id_col(RemittanceTransactions::Id))
                    .col(
                        ColumnDef::new(RemittanceTransactions::TransactionId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(RemittanceTransactions::RemittanceId)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(&mut fk(
                        "fk-remittance_transactions-transaction_id",
                        RemittanceTransactions::Table,
                        RemittanceTransactions::TransactionId,
                        Transactions::Table,
                        Transactions::Id,
                    ))
                    .foreign_key(&mut fk(
                        "fk-remittance_transactions-remittance_id",
                        RemittanceTransactions::Table,
                        RemittanceTransactions::RemittanceId,
                        Remittances::Table,
                        Remittances::Id,
                    ))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order of creation (respecting FK dependencies)
        let tables: [DynIden; 24] = [
            RemittanceTransactions::Table.into_iden(),
            Remittances::Table.into_iden(),
            RemittanceTypes::Table.into_iden(),
            Products::Table.into_iden(),
            Invoices::Table.into_iden(),
            AccessTokens::Table.into_iden(),
            Sessions::Table.into_iden(),
            Changelogs::Table.into_iden(),
            CreditTransactions::Table.into_iden(),
            Credits::Table.into_iden(),
            Transactions::Table.into_iden(),
            Guests::Table.into_iden(),
            Activities::Table.into_iden(),
            MembershipRoles::Table.into_iden(),
            Memberships::Table.into_iden(),
            RolePermissions::Table.into_iden(),
            Permissions::Table.into_iden(),
            Roles::Table.into_iden(),
            TransactionTemplates::Table.into_iden(),
            TemplateCategories::Table.into_iden(),
            Aliases::Table.into_iden(),
            Accounts::Table.into_iden(),
            Clubs::Table.into_iden(),
            Users::Table.into_iden(),
        ];
        for table in tables {
            manager
                .drop_table(Table::drop().table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}
