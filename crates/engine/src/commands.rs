//! Command structs for engine operations.
//!
//! These types group parameters for write operations (users, clubs,
//! transactions, memberships, treasury), keeping call sites readable and
//! avoiding long argument lists.

use chrono::{DateTime, NaiveDate, Utc};

/// Create a user, its account and its main alias.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub paid: bool,
    pub is_superuser: bool,
}

impl NewUser {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            paid: false,
            is_superuser: false,
        }
    }

    #[must_use]
    pub fn names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    #[must_use]
    pub fn paid(mut self, paid: bool) -> Self {
        self.paid = paid;
        self
    }

    #[must_use]
    pub fn superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = is_superuser;
        self
    }
}

/// Create a club, its account and its main alias.
#[derive(Clone, Debug)]
pub struct NewClub {
    pub name: String,
    pub email: String,
    pub parent_club_id: Option<i64>,
    pub require_memberships: bool,
    pub membership_fee_paid: i64,
    pub membership_fee_unpaid: i64,
    pub membership_duration: Option<i64>,
    pub membership_start: Option<NaiveDate>,
    pub membership_end: Option<NaiveDate>,
}

impl NewClub {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: String::new(),
            parent_club_id: None,
            require_memberships: true,
            membership_fee_paid: 0,
            membership_fee_unpaid: 0,
            membership_duration: None,
            membership_start: None,
            membership_end: None,
        }
    }

    #[must_use]
    pub fn parent(mut self, parent_club_id: i64) -> Self {
        self.parent_club_id = Some(parent_club_id);
        self
    }

    #[must_use]
    pub fn fees(mut self, paid: i64, unpaid: i64) -> Self {
        self.membership_fee_paid = paid;
        self.membership_fee_unpaid = unpaid;
        self
    }

    #[must_use]
    pub fn duration_days(mut self, days: i64) -> Self {
        self.membership_duration = Some(days);
        self
    }

    #[must_use]
    pub fn window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.membership_start = start;
        self.membership_end = end;
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// Variant-specific data of a new transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TransactionPayload {
    #[default]
    Plain,
    /// Destination, unit amount and category come from the template.
    Template { template_id: i64 },
    Membership { membership_id: i64 },
    /// Money entering or leaving through a special account.
    Special {
        last_name: String,
        first_name: String,
        bank: String,
    },
    /// Source and destination may coincide.
    Guest { guest_id: i64 },
}

/// Create a transaction between two accounts.
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub source: i64,
    pub destination: i64,
    pub quantity: i64,
    pub amount: i64,
    pub reason: String,
    pub valid: bool,
    pub payload: TransactionPayload,
}

impl NewTransaction {
    #[must_use]
    pub fn new(source: i64, destination: i64, amount: i64) -> Self {
        Self {
            source,
            destination,
            quantity: 1,
            amount,
            reason: String::new(),
            valid: true,
            payload: TransactionPayload::Plain,
        }
    }

    #[must_use]
    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn valid(mut self, valid: bool) -> Self {
        self.valid = valid;
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: TransactionPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// Filters for listing transactions.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    /// Either endpoint.
    pub account: Option<i64>,
    pub valid: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Create a membership through the coordinator.
#[derive(Clone, Debug)]
pub struct NewMembership {
    pub user_id: i64,
    pub club_id: i64,
    /// Defaults to today.
    pub date_start: Option<NaiveDate>,
    pub roles: Vec<i64>,
    /// Create missing parent memberships instead of failing.
    pub cascade: bool,
    /// Defer the fees to the user's banking-partner credit.
    pub partner_credit: bool,
}

impl NewMembership {
    #[must_use]
    pub fn new(user_id: i64, club_id: i64) -> Self {
        Self {
            user_id,
            club_id,
            date_start: None,
            roles: Vec::new(),
            cascade: false,
            partner_credit: false,
        }
    }

    #[must_use]
    pub fn starting(mut self, date_start: NaiveDate) -> Self {
        self.date_start = Some(date_start);
        self
    }

    #[must_use]
    pub fn roles(mut self, roles: Vec<i64>) -> Self {
        self.roles = roles;
        self
    }

    #[must_use]
    pub fn cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub fn partner_credit(mut self, partner_credit: bool) -> Self {
        self.partner_credit = partner_credit;
        self
    }
}

/// Options for renewing a membership.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenewOptions {
    pub cascade: bool,
    pub partner_credit: bool,
}

/// Create a transaction template.
#[derive(Clone, Debug)]
pub struct NewTemplate {
    pub name: String,
    pub destination: i64,
    pub amount: i64,
    pub category_id: i64,
    pub display: bool,
    pub highlighted: bool,
    pub description: String,
}

impl NewTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, destination: i64, amount: i64, category_id: i64) -> Self {
        Self {
            name: name.into(),
            destination,
            amount,
            category_id,
            display: true,
            highlighted: false,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn highlighted(mut self, highlighted: bool) -> Self {
        self.highlighted = highlighted;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Create a permission rule.
#[derive(Clone, Debug)]
pub struct NewPermission {
    pub model: String,
    pub op: String,
    pub field: Option<String>,
    pub query: String,
    pub rank: i64,
    pub permanent: bool,
    pub description: String,
}

impl NewPermission {
    #[must_use]
    pub fn new(model: impl Into<String>, op: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            op: op.into(),
            field: None,
            query: query.into(),
            rank: 0,
            permanent: false,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    pub fn rank(mut self, rank: i64) -> Self {
        self.rank = rank;
        self
    }

    #[must_use]
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Create an activity.
#[derive(Clone, Debug)]
pub struct NewActivity {
    pub name: String,
    pub description: String,
    pub organizer_id: i64,
    pub attendees_club_id: i64,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub guest_entry_fee: i64,
}

/// One invoice line.
#[derive(Clone, Debug)]
pub struct ProductLine {
    pub designation: String,
    pub quantity: i64,
    pub amount: i64,
}

/// Create or replace an invoice.
#[derive(Clone, Debug)]
pub struct NewInvoice {
    pub bde: String,
    pub object: String,
    pub description: String,
    pub name: String,
    pub address: String,
    pub date: NaiveDate,
    pub acquitted: bool,
    pub products: Vec<ProductLine>,
}
