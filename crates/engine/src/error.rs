//! The module contains the errors the engine can return.
//!
//! Every fallible operation returns one of these kinds as a typed value:
//!
//! - [`PermissionDenied`] when the write pipeline or an explicit check refuses.
//! - [`Validation`] with the full list of field violations.
//! - [`BalanceOutOfRange`] when an account balance would leave the bounded domain.
//! - [`ConservationViolation`] when the ledger invariant is broken (a bug).
//!
//!  [`PermissionDenied`]: EngineError::PermissionDenied
//!  [`Validation`]: EngineError::Validation
//!  [`BalanceOutOfRange`]: EngineError::BalanceOutOfRange
//!  [`ConservationViolation`]: EngineError::ConservationViolation
use std::fmt;

use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

/// One field-level invariant violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// The full set of violations collected while validating one write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub Vec<FieldViolation>);

impl ValidationErrors {
    pub fn push(&mut self, field: &str, code: &str, message: impl Into<String>) {
        self.0.push(FieldViolation::new(field, code, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `Err(Validation)` when at least one violation was collected.
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(self))
        }
    }

    pub fn codes(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.code.as_str()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| format!("{}: {} ({})", v.field, v.message, v.code))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("permission denied: cannot {op} {model}{}", .field.as_ref().map(|f| format!(".{f}")).unwrap_or_default())]
    PermissionDenied {
        model: String,
        op: String,
        field: Option<String>,
    },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("conservation violated: {0}")]
    ConservationViolation(String),
    #[error("balance of account {account} would be {would_be}, out of range")]
    BalanceOutOfRange { account: i64, would_be: i64 },
    #[error("account {account} is inactive")]
    InactiveEndpoint { account: i64 },
    #[error("club {club} requires a parent membership")]
    MissingParentMembership { club: i64 },
    #[error("user {user} needs {required} but only has {available}")]
    InsufficientFunds {
        user: i64,
        required: i64,
        available: i64,
    },
    #[error("{kind} \"{key}\" not found")]
    NotFound { kind: String, key: String },
    #[error("{entity} is locked")]
    Locked { entity: String },
    #[error("invalid permission query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    pub(crate) fn not_found(kind: &str, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn validation(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors(vec![FieldViolation::new(
            field, code, message,
        )]))
    }

    pub(crate) fn locked(entity: impl ToString) -> Self {
        Self::Locked {
            entity: entity.to_string(),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::PermissionDenied {
                    model: a,
                    op: b,
                    field: c,
                },
                Self::PermissionDenied {
                    model: x,
                    op: y,
                    field: z,
                },
            ) => a == x && b == y && c == z,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::ConservationViolation(a), Self::ConservationViolation(b)) => a == b,
            (
                Self::BalanceOutOfRange {
                    account: a,
                    would_be: b,
                },
                Self::BalanceOutOfRange {
                    account: x,
                    would_be: y,
                },
            ) => a == x && b == y,
            (Self::InactiveEndpoint { account: a }, Self::InactiveEndpoint { account: b }) => a == b,
            (Self::MissingParentMembership { club: a }, Self::MissingParentMembership { club: b }) => {
                a == b
            }
            (
                Self::InsufficientFunds {
                    user: a,
                    required: b,
                    available: c,
                },
                Self::InsufficientFunds {
                    user: x,
                    required: y,
                    available: z,
                },
            ) => a == x && b == y && c == z,
            (Self::NotFound { kind: a, key: b }, Self::NotFound { kind: x, key: y }) => {
                a == x && b == y
            }
            (Self::Locked { entity: a }, Self::Locked { entity: b }) => a == b,
            (Self::InvalidQuery(a), Self::InvalidQuery(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
