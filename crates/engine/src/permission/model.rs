//! Registry of the models permissions can target.

use std::fmt;

use sea_orm::{ConnectionTrait, EntityTrait, Iterable, QueryOrder, prelude::*};
use serde_json::Value;

use crate::{
    EngineError, ResultEngine, access_tokens, accounts, activities, aliases, changelogs, clubs,
    credit_transactions, credits, guests, invoices, membership_roles, memberships,
    permissions, products, remittance_transactions, remittance_types, remittances,
    role_permissions, roles, sessions, template_categories, tracked::Tracked,
    transaction_templates, transactions, users,
};

/// Operation a permission grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    View,
    Add,
    Change,
    Delete,
}

impl Op {
    pub const ALL: [Op; 4] = [Op::View, Op::Add, Op::Change, Op::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Add => "add",
            Self::Change => "change",
            Self::Delete => "delete",
        }
    }

    /// Whether a rule of this operation may name a single field.
    pub fn accepts_field(self) -> bool {
        matches!(self, Self::View | Self::Change)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Op {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "view" => Ok(Self::View),
            "add" => Ok(Self::Add),
            "change" => Ok(Self::Change),
            "delete" => Ok(Self::Delete),
            other => Err(EngineError::validation(
                "op",
                "invalid_op",
                format!("invalid permission operation: {other}"),
            )),
        }
    }
}

/// Every persistent model of the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelKind {
    User,
    Club,
    Account,
    Alias,
    Transaction,
    TemplateCategory,
    TransactionTemplate,
    Membership,
    MembershipRole,
    Role,
    Permission,
    RolePermission,
    Changelog,
    Credit,
    CreditTransaction,
    Session,
    AccessToken,
    Activity,
    Guest,
    Invoice,
    Product,
    RemittanceType,
    Remittance,
    RemittanceTransaction,
}

impl ModelKind {
    pub const ALL: [ModelKind; 24] = [
        ModelKind::User,
        ModelKind::Club,
        ModelKind::Account,
        ModelKind::Alias,
        ModelKind::Transaction,
        ModelKind::TemplateCategory,
        ModelKind::TransactionTemplate,
        ModelKind::Membership,
        ModelKind::MembershipRole,
        ModelKind::Role,
        ModelKind::Permission,
        ModelKind::RolePermission,
        ModelKind::Changelog,
        ModelKind::Credit,
        ModelKind::CreditTransaction,
        ModelKind::Session,
        ModelKind::AccessToken,
        ModelKind::Activity,
        ModelKind::Guest,
        ModelKind::Invoice,
        ModelKind::Product,
        ModelKind::RemittanceType,
        ModelKind::Remittance,
        ModelKind::RemittanceTransaction,
    ];

    /// Name used in permission rows and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Club => "club",
            Self::Account => "account",
            Self::Alias => "alias",
            Self::Transaction => "transaction",
            Self::TemplateCategory => "template_category",
            Self::TransactionTemplate => "transaction_template",
            Self::Membership => "membership",
            Self::MembershipRole => "membership_role",
            Self::Role => "role",
            Self::Permission => "permission",
            Self::RolePermission => "role_permission",
            Self::Changelog => "changelog",
            Self::Credit => "credit",
            Self::CreditTransaction => "credit_transaction",
            Self::Session => "session",
            Self::AccessToken => "access_token",
            Self::Activity => "activity",
            Self::Guest => "guest",
            Self::Invoice => "invoice",
            Self::Product => "product",
            Self::RemittanceType => "remittance_type",
            Self::Remittance => "remittance",
            Self::RemittanceTransaction => "remittance_transaction",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Club => "clubs",
            Self::Account => "accounts",
            Self::Alias => "aliases",
            Self::Transaction => "transactions",
            Self::TemplateCategory => "template_categories",
            Self::TransactionTemplate => "transaction_templates",
            Self::Membership => "memberships",
            Self::MembershipRole => "membership_roles",
            Self::Role => "roles",
            Self::Permission => "permissions",
            Self::RolePermission => "role_permissions",
            Self::Changelog => "changelogs",
            Self::Credit => "credits",
            Self::CreditTransaction => "credit_transactions",
            Self::Session => "sessions",
            Self::AccessToken => "access_tokens",
            Self::Activity => "activities",
            Self::Guest => "guests",
            Self::Invoice => "invoices",
            Self::Product => "products",
            Self::RemittanceType => "remittance_types",
            Self::Remittance => "remittances",
            Self::RemittanceTransaction => "remittance_transactions",
        }
    }

    /// Models the write pipeline never checks nor logs.
    pub fn is_excluded(self) -> bool {
        matches!(self, Self::Changelog | Self::Session | Self::AccessToken)
    }

    /// Target of the relation `name`, stored in the `{name}_id` column.
    pub fn relation(self, name: &str) -> Option<ModelKind> {
        let target = match (self, name) {
            (Self::Account, "user") => Self::User,
            (Self::Account, "club") => Self::Club,
            (Self::Alias, "account") => Self::Account,
            (Self::Club, "parent_club") => Self::Club,
            (Self::Transaction, "source" | "destination") => Self::Account,
            (Self::Transaction, "template") => Self::TransactionTemplate,
            (Self::Transaction, "category") => Self::TemplateCategory,
            (Self::Transaction, "membership") => Self::Membership,
            (Self::Transaction, "guest") => Self::Guest,
            (Self::TransactionTemplate, "destination") => Self::Account,
            (Self::TransactionTemplate, "category") => Self::TemplateCategory,
            (Self::Membership, "user") => Self::User,
            (Self::Membership, "club") => Self::Club,
            (Self::MembershipRole, "membership") => Self::Membership,
            (Self::MembershipRole, "role") => Self::Role,
            (Self::Role, "for_club") => Self::Club,
            (Self::RolePermission, "role") => Self::Role,
            (Self::RolePermission, "permission") => Self::Permission,
            (Self::Changelog | Self::Session | Self::AccessToken, "user") => Self::User,
            (Self::Credit, "user") => Self::User,
            (Self::Credit, "credit_transaction") => Self::Transaction,
            (Self::CreditTransaction, "credit") => Self::Credit,
            (Self::CreditTransaction, "transaction") => Self::Transaction,
            (Self::Activity, "organizer" | "attendees_club") => Self::Club,
            (Self::Guest, "activity") => Self::Activity,
            (Self::Guest, "inviter") => Self::User,
            (Self::Product, "invoice") => Self::Invoice,
            (Self::RemittanceType, "special_account") => Self::Account,
            (Self::Remittance, "remittance_type") => Self::RemittanceType,
            (Self::RemittanceTransaction, "transaction") => Self::Transaction,
            (Self::RemittanceTransaction, "remittance") => Self::Remittance,
            _ => return None,
        };
        Some(target)
    }

    /// Column names of the backing table.
    pub fn columns(self) -> Vec<String> {
        match self {
            Self::User => column_names::<users::Entity>(),
            Self::Club => column_names::<clubs::Entity>(),
            Self::Account => column_names::<accounts::Entity>(),
            Self::Alias => column_names::<aliases::Entity>(),
            Self::Transaction => column_names::<transactions::Entity>(),
            Self::TemplateCategory => column_names::<template_categories::Entity>(),
            Self::TransactionTemplate => column_names::<transaction_templates::Entity>(),
            Self::Membership => column_names::<memberships::Entity>(),
            Self::MembershipRole => column_names::<membership_roles::Entity>(),
            Self::Role => column_names::<roles::Entity>(),
            Self::Permission => column_names::<permissions::Entity>(),
            Self::RolePermission => column_names::<role_permissions::Entity>(),
            Self::Changelog => column_names::<changelogs::Entity>(),
            Self::Credit => column_names::<credits::Entity>(),
            Self::CreditTransaction => column_names::<credit_transactions::Entity>(),
            Self::Session => column_names::<sessions::Entity>(),
            Self::AccessToken => column_names::<access_tokens::Entity>(),
            Self::Activity => column_names::<activities::Entity>(),
            Self::Guest => column_names::<guests::Entity>(),
            Self::Invoice => column_names::<invoices::Entity>(),
            Self::Product => column_names::<products::Entity>(),
            Self::RemittanceType => column_names::<remittance_types::Entity>(),
            Self::Remittance => column_names::<remittances::Entity>(),
            Self::RemittanceTransaction => column_names::<remittance_transactions::Entity>(),
        }
    }

    pub fn has_column(self, column: &str) -> bool {
        self.columns().iter().any(|name| name == column)
    }

    /// Load one row as its snapshot. Models keyed by strings yield `None`.
    pub(crate) async fn load_snapshot<C: ConnectionTrait>(
        self,
        conn: &C,
        pk: i64,
    ) -> ResultEngine<Option<Value>> {
        macro_rules! snapshot_of {
            ($module:ident) => {
                $module::Entity::find_by_id(pk)
                    .one(conn)
                    .await?
                    .map(|model| model.snapshot())
            };
        }

        let snapshot = match self {
            Self::User => snapshot_of!(users),
            Self::Club => snapshot_of!(clubs),
            Self::Account => snapshot_of!(accounts),
            Self::Alias => snapshot_of!(aliases),
            Self::Transaction => snapshot_of!(transactions),
            Self::TemplateCategory => snapshot_of!(template_categories),
            Self::TransactionTemplate => snapshot_of!(transaction_templates),
            Self::Membership => snapshot_of!(memberships),
            Self::MembershipRole => snapshot_of!(membership_roles),
            Self::Role => snapshot_of!(roles),
            Self::Permission => snapshot_of!(permissions),
            Self::RolePermission => snapshot_of!(role_permissions),
            Self::Credit => snapshot_of!(credits),
            Self::CreditTransaction => snapshot_of!(credit_transactions),
            Self::Activity => snapshot_of!(activities),
            Self::Guest => snapshot_of!(guests),
            Self::Invoice => snapshot_of!(invoices),
            Self::Product => snapshot_of!(products),
            Self::RemittanceType => snapshot_of!(remittance_types),
            Self::Remittance => snapshot_of!(remittances),
            Self::RemittanceTransaction => snapshot_of!(remittance_transactions),
            Self::Changelog => changelogs::Entity::find_by_id(pk)
                .one(conn)
                .await?
                .and_then(|model| serde_json::to_value(model).ok()),
            Self::Session | Self::AccessToken => None,
        };
        Ok(snapshot)
    }
}

impl ModelKind {
    /// Load every row of the table as its snapshot, ordered by primary key.
    pub(crate) async fn load_snapshots<C: ConnectionTrait>(
        self,
        conn: &C,
    ) -> ResultEngine<Vec<Value>> {
        macro_rules! snapshots_of {
            ($module:ident) => {
                $module::Entity::find()
                    .order_by_asc($module::Column::Id)
                    .all(conn)
                    .await?
                    .iter()
                    .map(Tracked::snapshot)
                    .collect()
            };
        }

        let snapshots: Vec<Value> = match self {
            Self::User => snapshots_of!(users),
            Self::Club => snapshots_of!(clubs),
            Self::Account => snapshots_of!(accounts),
            Self::Alias => snapshots_of!(aliases),
            Self::Transaction => snapshots_of!(transactions),
            Self::TemplateCategory => snapshots_of!(template_categories),
            Self::TransactionTemplate => snapshots_of!(transaction_templates),
            Self::Membership => snapshots_of!(memberships),
            Self::MembershipRole => snapshots_of!(membership_roles),
            Self::Role => snapshots_of!(roles),
            Self::Permission => snapshots_of!(permissions),
            Self::RolePermission => snapshots_of!(role_permissions),
            Self::Credit => snapshots_of!(credits),
            Self::CreditTransaction => snapshots_of!(credit_transactions),
            Self::Activity => snapshots_of!(activities),
            Self::Guest => snapshots_of!(guests),
            Self::Invoice => snapshots_of!(invoices),
            Self::Product => snapshots_of!(products),
            Self::RemittanceType => snapshots_of!(remittance_types),
            Self::Remittance => snapshots_of!(remittances),
            Self::RemittanceTransaction => snapshots_of!(remittance_transactions),
            Self::Changelog => changelogs::Entity::find()
                .order_by_asc(changelogs::Column::Id)
                .all(conn)
                .await?
                .into_iter()
                .filter_map(|model| serde_json::to_value(model).ok())
                .collect(),
            Self::Session | Self::AccessToken => Vec::new(),
        };
        Ok(snapshots)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<&str> for ModelKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == value)
            .ok_or_else(|| {
                EngineError::validation("model", "invalid_model", format!("unknown model: {value}"))
            })
    }
}

fn column_names<E: EntityTrait>() -> Vec<String> {
    E::Column::iter()
        .map(|column| column.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::try_from(kind.name()).unwrap(), kind);
        }
        assert!(ModelKind::try_from("wallet").is_err());
    }

    #[test]
    fn relations_point_at_fk_columns() {
        for kind in ModelKind::ALL {
            for column in kind.columns() {
                if let Some(name) = column.strip_suffix("_id")
                    && let Some(target) = kind.relation(name)
                {
                    assert!(target.has_column("id"), "{kind}.{name}");
                }
            }
        }
        assert!(ModelKind::Account.has_column("balance"));
        assert_eq!(ModelKind::Transaction.relation("source"), Some(ModelKind::Account));
        assert_eq!(ModelKind::Transaction.relation("balance"), None);
    }

    #[test]
    fn only_bookkeeping_models_are_excluded() {
        let excluded: Vec<_> = ModelKind::ALL
            .into_iter()
            .filter(|kind| kind.is_excluded())
            .collect();
        assert_eq!(
            excluded,
            vec![ModelKind::Changelog, ModelKind::Session, ModelKind::AccessToken]
        );
    }
}
