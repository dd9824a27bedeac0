use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{LogNotifier, NegativeBalanceNotifier, ResultEngine, permission::PermissionCache};

mod accounts;
mod activities;
mod aliases;
mod backend;
mod credits;
mod ledger;
mod memberships;
mod pipeline;
mod roles;
mod sessions;
mod templates;
mod treasury;

pub use backend::PermissionFilter;
pub use credits::CreditState;
pub use ledger::AuditMismatch;
pub use pipeline::Signal;

pub(crate) use pipeline::Target;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    cache: PermissionCache,
    memoize: bool,
    partner_bank: String,
    credit_source: String,
    notifier: Arc<dyn NegativeBalanceNotifier>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Name of the banking partner written on credit transactions.
    pub fn partner_bank(&self) -> &str {
        &self.partner_bank
    }
}

/// The builder for `Engine`
#[derive(Debug)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    memoize: bool,
    partner_bank: String,
    credit_source: String,
    notifier: Arc<dyn NegativeBalanceNotifier>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            memoize: true,
            partner_bank: String::from("Partner bank"),
            credit_source: String::from("transfer"),
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Enable or disable permission memoization. Tests turn it off.
    pub fn memoize(mut self, memoize: bool) -> EngineBuilder {
        self.memoize = memoize;
        self
    }

    pub fn partner_bank(mut self, name: impl Into<String>) -> EngineBuilder {
        self.partner_bank = name.into();
        self
    }

    /// Special account type funding banking-partner credits.
    pub fn credit_source(mut self, special_type: impl Into<String>) -> EngineBuilder {
        self.credit_source = special_type.into();
        self
    }

    pub fn negative_balance_notifier(
        mut self,
        notifier: Arc<dyn NegativeBalanceNotifier>,
    ) -> EngineBuilder {
        self.notifier = notifier;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            cache: PermissionCache::default(),
            memoize: self.memoize,
            partner_bank: self.partner_bank,
            credit_source: self.credit_source,
            notifier: self.notifier,
        })
    }
}
