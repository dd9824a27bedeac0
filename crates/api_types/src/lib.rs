use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod session {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Login {
        pub username: String,
        pub password: String,
        /// Permission mask for the new session, clamped to `0..=42`.
        pub mask: Option<i64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionView {
        pub key: String,
        pub user_id: i64,
        pub mask: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MaskUpdate {
        pub mask: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TokenNew {
        /// Space-separated `<permission>_<club>` scopes.
        pub scopes: String,
        pub expires_at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TokenView {
        pub token: String,
        pub scopes: String,
        pub expires_at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ScopesResponse {
        pub scopes: Vec<String>,
    }
}

pub mod account {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AccountKind {
        User,
        Club,
        Special,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountView {
        pub id: i64,
        pub kind: AccountKind,
        pub display: String,
        /// Hundredths.
        pub balance: i64,
        pub is_active: bool,
        pub inactivity_reason: String,
        pub last_negative: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccountActivity {
        pub active: bool,
        /// `manual` or `forced`; ignored when reactivating.
        pub reason: Option<String>,
    }
}

pub mod alias {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AliasNew {
        pub account_id: i64,
        pub name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AliasView {
        pub id: i64,
        pub name: String,
        pub normalized_name: String,
        pub account_id: i64,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum TransactionKind {
        Plain,
        Template,
        Membership,
        Special,
        Guest,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub source: i64,
        pub destination: i64,
        pub quantity: Option<i64>,
        /// Unit amount in hundredths.
        pub amount: i64,
        #[serde(default)]
        pub reason: String,
        /// Only for deposits and withdrawals through a special account.
        pub special: Option<SpecialDetails>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SpecialDetails {
        pub last_name: String,
        pub first_name: String,
        #[serde(default)]
        pub bank: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TemplateTransactionNew {
        pub source: i64,
        pub quantity: Option<i64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ValidityUpdate {
        pub valid: bool,
        #[serde(default)]
        pub reason: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionList {
        pub account: Option<i64>,
        pub valid: Option<bool>,
        pub from: Option<DateTime<Utc>>,
        pub to: Option<DateTime<Utc>>,
        pub limit: Option<u64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: i64,
        pub kind: TransactionKind,
        pub source: i64,
        pub destination: i64,
        pub source_alias: String,
        pub destination_alias: String,
        pub quantity: i64,
        pub amount: i64,
        pub total: i64,
        pub reason: String,
        pub valid: bool,
        pub invalidity_reason: String,
        pub created_at: DateTime<Utc>,
    }

    /// `transaction` is absent when source and destination coincide.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionCreated {
        pub transaction: Option<TransactionView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionListResponse {
        pub transactions: Vec<TransactionView>,
    }
}

pub mod membership {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MembershipNew {
        pub user_id: i64,
        pub club_id: i64,
        pub date_start: Option<NaiveDate>,
        #[serde(default)]
        pub roles: Vec<i64>,
        #[serde(default)]
        pub cascade: bool,
        #[serde(default)]
        pub partner_credit: bool,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct MembershipRenew {
        #[serde(default)]
        pub cascade: bool,
        #[serde(default)]
        pub partner_credit: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct MembershipView {
        pub id: i64,
        pub user_id: i64,
        pub club_id: i64,
        pub date_start: NaiveDate,
        pub date_end: NaiveDate,
        pub fee: i64,
    }
}

pub mod credit {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum CreditState {
        Open,
        Validated,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CreditView {
        pub id: i64,
        pub user_id: i64,
        pub credit_transaction_id: Option<i64>,
        pub state: CreditState,
        pub members: Vec<i64>,
    }
}

pub mod permission {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PermissionCheck {
        pub model: String,
        pub op: String,
        pub id: Option<i64>,
        pub field: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PermissionAnswer {
        pub allowed: bool,
    }
}

pub mod activity {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GuestNew {
        pub inviter_id: i64,
        pub first_name: String,
        pub last_name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GuestView {
        pub id: i64,
        pub activity_id: i64,
        pub inviter_id: i64,
        pub first_name: String,
        pub last_name: String,
        pub entry_time: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GuestEntered {
        pub guest: GuestView,
        pub transaction_id: Option<i64>,
    }
}

pub mod changelog {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ChangelogEntry {
        pub id: i64,
        pub user_id: Option<i64>,
        pub ip: Option<String>,
        pub model: String,
        pub instance_pk: i64,
        pub action: String,
        pub previous: Option<serde_json::Value>,
        pub data: Option<serde_json::Value>,
        pub timestamp: DateTime<Utc>,
    }
}

pub mod error {
    use super::*;

    /// One violated field rule.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct Violation {
        pub field: String,
        pub code: String,
        pub message: String,
    }

    /// Body of every non-2xx response.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ErrorBody {
        pub error: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub violations: Vec<Violation>,
    }
}
