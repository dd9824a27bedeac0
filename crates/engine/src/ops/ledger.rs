use std::collections::HashMap;

use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    EngineError, NewTransaction, ResultEngine, TransactionListFilter, TransactionPayload,
    ValidationErrors, accounts,
    permission::{ModelKind, Op},
    transaction_templates, transactions,
    transactions::TransactionKind,
    util::{self, balance_in_range},
};

use super::{Engine, Signal, accounts::display_of, with_tx};

const REASON_MAX_LEN: usize = 255;

/// An account whose stored balance disagrees with its valid transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditMismatch {
    pub account: i64,
    pub stored: i64,
    pub computed: i64,
}

fn validate_amounts(cmd: &NewTransaction) -> ResultEngine<()> {
    let mut errors = ValidationErrors::default();
    if cmd.quantity < 1 {
        errors.push("quantity", "invalid_quantity", "quantity must be at least 1");
    }
    if cmd.amount < 0 {
        errors.push("amount", "invalid_amount", "amount must not be negative");
    }
    if cmd.reason.chars().count() > REASON_MAX_LEN {
        errors.push("reason", "too_long", "reason is longer than 255 characters");
    }
    errors.into_result()
}

/// Lock and load an account row for the rest of the database transaction.
pub(crate) async fn lock_account(
    db_tx: &DatabaseTransaction,
    id: i64,
) -> ResultEngine<accounts::Model> {
    accounts::Entity::find_by_id(id)
        .lock_exclusive()
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::not_found("account", id))
}

/// Lock two accounts in ascending id order and return them as `(a, b)`.
pub(crate) async fn lock_pair(
    db_tx: &DatabaseTransaction,
    a: i64,
    b: i64,
) -> ResultEngine<(accounts::Model, accounts::Model)> {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let low = lock_account(db_tx, low).await?;
    let high = if high == low.id {
        low.clone()
    } else {
        lock_account(db_tx, high).await?
    };
    Ok(if low.id == a { (low, high) } else { (high, low) })
}

impl Engine {
    /// Create a transaction and apply it to both balances.
    ///
    /// Returns `None` without persisting anything when source and destination
    /// coincide, except for guest transactions.
    pub async fn create_transaction(
        &self,
        cmd: NewTransaction,
    ) -> ResultEngine<Option<transactions::Model>> {
        with_tx!(self, |db_tx| {
            self.create_transaction_in(&db_tx, Signal::Checked, cmd).await
        })
    }

    pub(crate) async fn create_transaction_in(
        &self,
        db_tx: &DatabaseTransaction,
        signal: Signal,
        mut cmd: NewTransaction,
    ) -> ResultEngine<Option<transactions::Model>> {
        let mut category_id = None;
        if let TransactionPayload::Template { template_id } = cmd.payload {
            let template = transaction_templates::Entity::find_by_id(template_id)
                .one(db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("transaction_template", template_id))?;
            cmd.destination = template.destination_id;
            cmd.amount = template.amount;
            category_id = Some(template.category_id);
        }
        validate_amounts(&cmd)?;

        let (source, destination) = lock_pair(db_tx, cmd.source, cmd.destination).await?;

        for endpoint in [&source, &destination] {
            if !endpoint.is_active {
                return Err(EngineError::InactiveEndpoint {
                    account: endpoint.id,
                });
            }
        }

        let is_guest = matches!(cmd.payload, TransactionPayload::Guest { .. });
        if source.id == destination.id && !is_guest {
            debug!(account = source.id, "self transfer ignored");
            return Ok(None);
        }

        if matches!(cmd.payload, TransactionPayload::Special { .. })
            && source.is_special() == destination.is_special()
        {
            return Err(EngineError::validation(
                "source",
                "special_endpoint",
                "exactly one endpoint must be a special account",
            ));
        }

        let kind = match cmd.payload {
            TransactionPayload::Plain => TransactionKind::Plain,
            TransactionPayload::Template { .. } => TransactionKind::Template,
            TransactionPayload::Membership { .. } => TransactionKind::Membership,
            TransactionPayload::Special { .. } => TransactionKind::Special,
            TransactionPayload::Guest { .. } => TransactionKind::Guest,
        };
        let mut candidate = transactions::Model {
            id: 0,
            source_id: source.id,
            destination_id: destination.id,
            source_alias: display_of(db_tx, &source).await?,
            destination_alias: display_of(db_tx, &destination).await?,
            quantity: cmd.quantity,
            amount: cmd.amount,
            reason: cmd.reason,
            valid: cmd.valid,
            invalidity_reason: String::new(),
            created_at: util::now(),
            polymorphic_kind: kind.as_str().to_string(),
            template_id: None,
            category_id,
            membership_id: None,
            guest_id: None,
            last_name: None,
            first_name: None,
            bank: None,
        };
        match cmd.payload {
            TransactionPayload::Plain => {}
            TransactionPayload::Template { template_id } => {
                candidate.template_id = Some(template_id);
            }
            TransactionPayload::Membership { membership_id } => {
                candidate.membership_id = Some(membership_id);
            }
            TransactionPayload::Special {
                last_name,
                first_name,
                bank,
            } => {
                candidate.last_name = Some(last_name);
                candidate.first_name = Some(first_name);
                candidate.bank = Some(bank);
            }
            TransactionPayload::Guest { guest_id } => candidate.guest_id = Some(guest_id),
        }

        let delta = if candidate.valid {
            candidate
                .quantity
                .checked_mul(candidate.amount)
                .ok_or(EngineError::BalanceOutOfRange {
                    account: source.id,
                    would_be: i64::MIN,
                })?
        } else {
            0
        };

        let transaction = self.insert_tracked(db_tx, signal, candidate).await?;
        self.shift_balances(db_tx, source, destination, delta).await?;
        debug!(
            transaction = transaction.id,
            kind = kind.as_str(),
            delta,
            "transaction created"
        );
        Ok(Some(transaction))
    }

    /// Move `delta` from `source` to `destination`. Both rows must be locked.
    async fn shift_balances(
        &self,
        db_tx: &DatabaseTransaction,
        mut source: accounts::Model,
        mut destination: accounts::Model,
        delta: i64,
    ) -> ResultEngine<()> {
        if delta == 0 || source.id == destination.id {
            return Ok(());
        }
        let before_source = source.balance;
        let before_destination = destination.balance;
        let new_source = before_source.saturating_sub(delta);
        let new_destination = before_destination.saturating_add(delta);
        for (account, would_be) in [(source.id, new_source), (destination.id, new_destination)] {
            if !balance_in_range(would_be) {
                return Err(EngineError::BalanceOutOfRange { account, would_be });
            }
        }
        if new_source - before_source != before_destination - new_destination {
            error!(
                source = source.id,
                destination = destination.id,
                delta,
                "balance shift does not conserve money"
            );
            return Err(EngineError::ConservationViolation(format!(
                "shift of {delta} between {} and {}",
                source.id, destination.id
            )));
        }

        source.balance = new_source;
        destination.balance = new_destination;
        let now = util::now();
        let mut crossed = Vec::new();
        for (account, before) in [
            (&mut source, before_source),
            (&mut destination, before_destination),
        ] {
            if before >= 0 && account.balance < 0 {
                account.last_negative = Some(now);
                crossed.push(account.id);
            }
        }

        let source = self.update_tracked(db_tx, Signal::ForceSave, source).await?;
        let destination = self
            .update_tracked(db_tx, Signal::ForceSave, destination)
            .await?;
        for account in [&source, &destination] {
            if crossed.contains(&account.id) {
                info!(account = account.id, balance = account.balance, "balance went negative");
                self.notifier.negative_balance(account);
            }
        }
        Ok(())
    }

    /// Flip a transaction's validity, reversing or reapplying its effect.
    pub async fn set_validity(
        &self,
        transaction_id: i64,
        valid: bool,
        reason: impl Into<String>,
    ) -> ResultEngine<transactions::Model> {
        let reason = reason.into();
        with_tx!(self, |db_tx| {
            self.set_validity_in(&db_tx, Signal::Checked, transaction_id, valid, reason)
                .await
        })
    }

    pub(crate) async fn set_validity_in(
        &self,
        db_tx: &DatabaseTransaction,
        signal: Signal,
        transaction_id: i64,
        valid: bool,
        reason: String,
    ) -> ResultEngine<transactions::Model> {
        let mut transaction = transactions::Entity::find_by_id(transaction_id)
            .lock_exclusive()
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("transaction", transaction_id))?;
        if reason.chars().count() > REASON_MAX_LEN {
            return Err(EngineError::validation(
                "invalidity_reason",
                "too_long",
                "reason is longer than 255 characters",
            ));
        }

        let was_valid = transaction.valid;
        transaction.valid = valid;
        transaction.invalidity_reason = if valid { String::new() } else { reason };
        let transaction = self.update_tracked(db_tx, signal, transaction).await?;
        if was_valid == valid {
            return Ok(transaction);
        }

        let (source, destination) =
            lock_pair(db_tx, transaction.source_id, transaction.destination_id).await?;
        let total = transaction
            .quantity
            .checked_mul(transaction.amount)
            .ok_or(EngineError::BalanceOutOfRange {
                account: source.id,
                would_be: i64::MIN,
            })?;
        let delta = if valid { total } else { -total };
        self.shift_balances(db_tx, source, destination, delta).await?;
        debug!(transaction = transaction.id, valid, "validity changed");
        Ok(transaction)
    }

    /// Transactions are never deleted; invalidate them instead.
    pub async fn delete_transaction(&self, _transaction_id: i64) -> ResultEngine<()> {
        Err(EngineError::PermissionDenied {
            model: ModelKind::Transaction.name().to_string(),
            op: Op::Delete.as_str().to_string(),
            field: None,
        })
    }

    pub async fn transaction(&self, transaction_id: i64) -> ResultEngine<transactions::Model> {
        let filter = self
            .filter_query(ModelKind::Transaction, Op::View, None)
            .await;
        transactions::Entity::find_by_id(transaction_id)
            .filter(filter.condition())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("transaction", transaction_id))
    }

    /// Transactions visible to the current principal, newest first.
    pub async fn list_transactions(
        &self,
        filter: TransactionListFilter,
    ) -> ResultEngine<Vec<transactions::Model>> {
        let visible = self
            .filter_query(ModelKind::Transaction, Op::View, None)
            .await;
        let mut query = transactions::Entity::find().filter(visible.condition());
        if let Some(account) = filter.account {
            query = query.filter(
                transactions::Column::SourceId
                    .eq(account)
                    .or(transactions::Column::DestinationId.eq(account)),
            );
        }
        if let Some(valid) = filter.valid {
            query = query.filter(transactions::Column::Valid.eq(valid));
        }
        if let Some(from) = filter.from {
            query = query.filter(transactions::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(transactions::Column::CreatedAt.lt(to));
        }
        query = query
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id);
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        query.all(&self.database).await.map_err(Into::into)
    }

    /// Recompute every balance from the valid transactions.
    pub async fn audit_conservation(&self) -> ResultEngine<Vec<AuditMismatch>> {
        let mut computed: HashMap<i64, i64> = HashMap::new();
        let valid = transactions::Entity::find()
            .filter(transactions::Column::Valid.eq(true))
            .all(&self.database)
            .await?;
        for transaction in valid {
            if transaction.source_id == transaction.destination_id {
                continue;
            }
            let total = transaction.total();
            *computed.entry(transaction.source_id).or_default() -= total;
            *computed.entry(transaction.destination_id).or_default() += total;
        }

        let mut mismatches = Vec::new();
        for account in accounts::Entity::find()
            .order_by_asc(accounts::Column::Id)
            .all(&self.database)
            .await?
        {
            let expected = computed.get(&account.id).copied().unwrap_or(0);
            if expected != account.balance {
                error!(
                    account = account.id,
                    stored = account.balance,
                    computed = expected,
                    "conservation mismatch"
                );
                mismatches.push(AuditMismatch {
                    account: account.id,
                    stored: account.balance,
                    computed: expected,
                });
            }
        }
        Ok(mismatches)
    }
}

#[cfg(test)]
mod tests {
    use migration::MigratorTrait;
    use sea_orm::Database;

    use super::*;
    use crate::NewUser;

    #[tokio::test]
    async fn pair_locks_keep_the_requested_order() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let engine = Engine::builder()
            .database(db)
            .memoize(false)
            .build()
            .await
            .unwrap();
        let (_, low) = engine.create_user(NewUser::new("alice", "pw")).await.unwrap();
        let (_, high) = engine.create_user(NewUser::new("bob", "pw")).await.unwrap();
        assert!(low.id < high.id);

        let db_tx = engine.database.begin().await.unwrap();
        let (a, b) = lock_pair(&db_tx, high.id, low.id).await.unwrap();
        assert_eq!((a.id, b.id), (high.id, low.id));
        let (a, b) = lock_pair(&db_tx, low.id, high.id).await.unwrap();
        assert_eq!((a.id, b.id), (low.id, high.id));
        let (a, b) = lock_pair(&db_tx, low.id, low.id).await.unwrap();
        assert_eq!((a.id, b.id), (low.id, low.id));
    }
}
