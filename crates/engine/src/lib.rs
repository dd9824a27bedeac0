//! The core of the Note: accounts and aliases, the transaction ledger, the
//! dynamic permission engine, the change log, the membership coordinator and
//! banking-partner credits.
//!
//! Everything goes through [`Engine`]. Writes traverse the mutation pipeline
//! (permission check, change log) and each public operation runs in one
//! database transaction. The caller identity is read from the task-local
//! [`request`] context; outside any context the engine acts on behalf of an
//! administrator.

pub use commands::{
    NewActivity, NewClub, NewInvoice, NewMembership, NewPermission, NewTemplate,
    NewTransaction, NewUser, ProductLine, RenewOptions, TransactionListFilter,
    TransactionPayload,
};
pub use error::{EngineError, FieldViolation, ValidationErrors};
pub use notify::{LogNotifier, NegativeBalanceNotifier};
pub use ops::{
    AuditMismatch, CreditState, Engine, EngineBuilder, PermissionFilter, Signal,
};
pub use permission::{InstantiatedPermission, ModelKind, Op, Predicate};
pub use request::{Auth, Principal, RequestContext};
pub use util::normalize;

pub mod access_tokens;
pub mod accounts;
pub mod activities;
pub mod aliases;
pub mod changelogs;
pub mod clubs;
mod commands;
pub mod credit_transactions;
pub mod credits;
mod error;
pub mod guests;
pub mod invoices;
pub mod membership_roles;
pub mod memberships;
mod notify;
mod ops;
pub mod permission;
pub mod permissions;
pub mod products;
pub mod remittance_transactions;
pub mod remittance_types;
pub mod remittances;
pub mod request;
pub mod role_permissions;
pub mod roles;
pub mod sessions;
pub mod template_categories;
mod tracked;
pub mod transaction_templates;
pub mod transactions;
pub mod users;
mod util;

pub use tracked::Tracked;

type ResultEngine<T> = Result<T, EngineError>;
