//! Negative-balance notifications.

use std::fmt;

use crate::accounts;

/// Receives an account whose balance just crossed from non-negative to
/// negative. Called once per crossing, inside the atomic unit that caused it.
pub trait NegativeBalanceNotifier: Send + Sync + fmt::Debug {
    fn negative_balance(&self, account: &accounts::Model);
}

/// Default notifier: records the crossing in the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NegativeBalanceNotifier for LogNotifier {
    fn negative_balance(&self, account: &accounts::Model) {
        tracing::info!(
            account = account.id,
            balance = account.balance,
            "account balance went negative"
        );
    }
}
