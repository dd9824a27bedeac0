//! Banking-partner credit.
//!
//! A credit gathers membership transactions posted invalid and funds them at
//! once with an aggregate Special transaction from the configured special
//! account to the user's account. The credit is *validated* when that
//! aggregate transaction exists and is valid, *open* otherwise.

use sea_orm::{
    ConnectionTrait, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
    EngineError, NewTransaction, ResultEngine, TransactionPayload, accounts, credit_transactions,
    credits,
    permission::{ModelKind, Op},
    transactions, users, util,
};

use super::{Engine, Signal, Target, ledger::lock_account, with_tx};

const INVALIDATED: &str = "banking-partner credit invalidated";

/// State of a banking-partner credit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CreditState {
    Open,
    Validated,
}

impl Engine {
    /// The user's credit, created on first use, with `transaction_id` linked.
    ///
    /// A validated credit is reopened and validated again so that its
    /// aggregate keeps funding every linked transaction.
    pub(crate) async fn attach_to_credit_in(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: i64,
        transaction_id: i64,
    ) -> ResultEngine<credits::Model> {
        let existing = credits::Entity::find()
            .filter(credits::Column::UserId.eq(user_id))
            .one(db_tx)
            .await?;
        let credit = match existing {
            Some(credit) => credit,
            None => {
                let credit = credits::Model {
                    id: 0,
                    user_id,
                    credit_transaction_id: None,
                };
                self.insert_tracked(db_tx, Signal::ForceSave, credit).await?
            }
        };
        let link = credit_transactions::Model {
            id: 0,
            credit_id: credit.id,
            transaction_id,
        };
        let validated = aggregate_of(db_tx, &credit)
            .await?
            .is_some_and(|aggregate| aggregate.valid);
        self.insert_tracked(db_tx, Signal::ForceSave, link).await?;
        debug!(credit = credit.id, transaction = transaction_id, "transaction added to credit");
        if validated {
            info!(credit = credit.id, "validated credit reopened for a new transaction");
            return self.validate_credit_in(db_tx, credit.id).await;
        }
        self.update_credit_in(db_tx, credit.id).await
    }

    pub async fn credit_for_user(&self, user_id: i64) -> ResultEngine<Option<credits::Model>> {
        credits::Entity::find()
            .filter(credits::Column::UserId.eq(user_id))
            .one(&self.database)
            .await
            .map_err(Into::into)
    }

    /// One credit, if visible to the current principal.
    pub async fn credit(&self, credit_id: i64) -> ResultEngine<credits::Model> {
        let visible = self.filter_query(ModelKind::Credit, Op::View, None).await;
        credits::Entity::find_by_id(credit_id)
            .filter(visible.condition())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("credit", credit_id))
    }

    pub async fn credit_state(&self, credit_id: i64) -> ResultEngine<CreditState> {
        let credit = credits::Entity::find_by_id(credit_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("credit", credit_id))?;
        let Some(transaction_id) = credit.credit_transaction_id else {
            return Ok(CreditState::Open);
        };
        let validated = transactions::Entity::find_by_id(transaction_id)
            .one(&self.database)
            .await?
            .is_some_and(|transaction| transaction.valid);
        Ok(if validated {
            CreditState::Validated
        } else {
            CreditState::Open
        })
    }

    /// Membership transactions funded by the credit.
    pub async fn credit_transactions(
        &self,
        credit_id: i64,
    ) -> ResultEngine<Vec<transactions::Model>> {
        member_transactions(&self.database, credit_id).await
    }

    /// Recompute the aggregate amount, creating the aggregate transaction if
    /// missing. A validated credit keeps its amount.
    pub async fn update_credit(&self, credit_id: i64) -> ResultEngine<credits::Model> {
        with_tx!(self, |db_tx| {
            self.authorize_credit(&db_tx, credit_id).await?;
            self.update_credit_in(&db_tx, credit_id).await
        })
    }

    /// Fund every member transaction with the aggregate transaction.
    pub async fn validate_credit(&self, credit_id: i64) -> ResultEngine<credits::Model> {
        with_tx!(self, |db_tx| {
            self.authorize_credit(&db_tx, credit_id).await?;
            self.validate_credit_in(&db_tx, credit_id).await
        })
    }

    /// Return the user's account to its pre-credit balance.
    pub async fn invalidate_credit(&self, credit_id: i64) -> ResultEngine<credits::Model> {
        with_tx!(self, |db_tx| {
            self.authorize_credit(&db_tx, credit_id).await?;
            let credit = self.lock_credit(&db_tx, credit_id).await?;
            self.invalidate_credit_in(&db_tx, &credit).await?;
            Ok(credit)
        })
    }

    /// Delete the credit; the user pays the fees from their own balance.
    pub async fn drop_credit(&self, credit_id: i64) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            self.authorize(
                &db_tx,
                Op::Delete,
                ModelKind::Credit,
                Target::Stored(credit_id),
                None,
            )
            .await?;
            self.drop_credit_in(&db_tx, credit_id).await
        })
    }

    async fn authorize_credit(&self, db_tx: &DatabaseTransaction, credit_id: i64) -> ResultEngine<()> {
        self.authorize(
            db_tx,
            Op::Change,
            ModelKind::Credit,
            Target::Stored(credit_id),
            None,
        )
        .await
    }

    async fn lock_credit(
        &self,
        db_tx: &DatabaseTransaction,
        credit_id: i64,
    ) -> ResultEngine<credits::Model> {
        credits::Entity::find_by_id(credit_id)
            .lock_exclusive()
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("credit", credit_id))
    }

    async fn update_credit_in(
        &self,
        db_tx: &DatabaseTransaction,
        credit_id: i64,
    ) -> ResultEngine<credits::Model> {
        let mut credit = self.lock_credit(db_tx, credit_id).await?;
        let members = member_transactions(db_tx, credit.id).await?;
        let sum = total_of(&members)?;

        match aggregate_of(db_tx, &credit).await? {
            Some(aggregate) if aggregate.valid => {
                debug!(credit = credit.id, "validated credit keeps its amount");
            }
            Some(mut aggregate) => {
                aggregate.quantity = 1;
                aggregate.amount = sum;
                self.update_tracked(db_tx, Signal::ForceSave, aggregate).await?;
            }
            None => {
                let aggregate = self.open_aggregate_in(db_tx, &credit, sum).await?;
                credit.credit_transaction_id = Some(aggregate.id);
                credit = self.update_tracked(db_tx, Signal::ForceSave, credit).await?;
            }
        }
        debug!(credit = credit.id, amount = sum, "credit updated");
        Ok(credit)
    }

    async fn open_aggregate_in(
        &self,
        db_tx: &DatabaseTransaction,
        credit: &credits::Model,
        sum: i64,
    ) -> ResultEngine<transactions::Model> {
        let user = users::Entity::find_by_id(credit.user_id)
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("user", credit.user_id))?;
        let source = accounts::Entity::find()
            .filter(accounts::Column::SpecialType.eq(self.credit_source.as_str()))
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("special account", &self.credit_source))?;
        let destination = accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user.id))
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("user account", user.id))?;

        let cmd = NewTransaction::new(source.id, destination.id, sum)
            .reason(format!("Credit {}", self.partner_bank))
            .valid(false)
            .payload(TransactionPayload::Special {
                last_name: user.last_name.clone(),
                first_name: user.first_name.clone(),
                bank: self.partner_bank.clone(),
            });
        self.create_transaction_in(db_tx, Signal::ForceSave, cmd)
            .await?
            .ok_or_else(|| {
                EngineError::ConservationViolation(format!(
                    "credit {} would fund account {} from itself",
                    credit.id, destination.id
                ))
            })
    }

    async fn validate_credit_in(
        &self,
        db_tx: &DatabaseTransaction,
        credit_id: i64,
    ) -> ResultEngine<credits::Model> {
        let credit = self.lock_credit(db_tx, credit_id).await?;
        self.invalidate_credit_in(db_tx, &credit).await?;
        let credit = self.update_credit_in(db_tx, credit.id).await?;
        let aggregate_id = credit
            .credit_transaction_id
            .ok_or_else(|| EngineError::not_found("credit transaction", credit.id))?;

        let aggregate = self
            .set_validity_in(db_tx, Signal::ForceSave, aggregate_id, true, String::new())
            .await?;
        let now = util::now();
        for member in member_transactions(db_tx, credit.id).await? {
            let mut member = self
                .set_validity_in(db_tx, Signal::ForceSave, member.id, true, String::new())
                .await?;
            member.created_at = now;
            self.update_tracked(db_tx, Signal::ForceSave, member).await?;
        }

        let members = member_transactions(db_tx, credit.id).await?;
        let sum = total_of(&members)?;
        if aggregate.total() != sum || members.iter().any(|member| !member.valid) {
            error!(
                credit = credit.id,
                aggregate = aggregate.total(),
                sum,
                "validated credit does not fund its transactions"
            );
            return Err(EngineError::ConservationViolation(format!(
                "credit {} funds {} but its transactions total {sum}",
                credit.id,
                aggregate.total()
            )));
        }
        info!(credit = credit.id, user = credit.user_id, amount = sum, "credit validated");
        Ok(credit)
    }

    async fn invalidate_credit_in(
        &self,
        db_tx: &DatabaseTransaction,
        credit: &credits::Model,
    ) -> ResultEngine<()> {
        for member in member_transactions(db_tx, credit.id).await? {
            if member.valid {
                self.set_validity_in(
                    db_tx,
                    Signal::ForceSave,
                    member.id,
                    false,
                    INVALIDATED.to_string(),
                )
                .await?;
            }
        }
        if let Some(aggregate) = aggregate_of(db_tx, credit).await? {
            if aggregate.valid {
                self.set_validity_in(
                    db_tx,
                    Signal::ForceSave,
                    aggregate.id,
                    false,
                    INVALIDATED.to_string(),
                )
                .await?;
                info!(credit = credit.id, user = credit.user_id, "credit invalidated");
            }
        }
        Ok(())
    }

    async fn drop_credit_in(&self, db_tx: &DatabaseTransaction, credit_id: i64) -> ResultEngine<()> {
        let credit = self.lock_credit(db_tx, credit_id).await?;
        self.invalidate_credit_in(db_tx, &credit).await?;

        let members = member_transactions(db_tx, credit.id).await?;
        let required = total_of(&members)?;
        let account = self.lock_user_account(db_tx, credit.user_id).await?;
        if account.balance < required {
            return Err(EngineError::InsufficientFunds {
                user: credit.user_id,
                required,
                available: account.balance,
            });
        }
        for member in &members {
            self.set_validity_in(db_tx, Signal::ForceSave, member.id, true, String::new())
                .await?;
        }

        if let Some(mut aggregate) = aggregate_of(db_tx, &credit).await? {
            aggregate.reason.push_str(" (invalid)");
            self.update_tracked(db_tx, Signal::ForceSave, aggregate).await?;
        }
        let links = credit_transactions::Entity::find()
            .filter(credit_transactions::Column::CreditId.eq(credit.id))
            .all(db_tx)
            .await?;
        for link in links {
            self.delete_tracked(db_tx, Signal::ForceSave, link).await?;
        }
        let user = credit.user_id;
        self.delete_tracked(db_tx, Signal::ForceSave, credit).await?;
        info!(credit = credit_id, user, paid = required, "credit dropped");
        Ok(())
    }

    async fn lock_user_account(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: i64,
    ) -> ResultEngine<accounts::Model> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("user account", user_id))?;
        lock_account(db_tx, account.id).await
    }
}

async fn member_transactions<C: ConnectionTrait>(
    conn: &C,
    credit_id: i64,
) -> ResultEngine<Vec<transactions::Model>> {
    let ids: Vec<i64> = credit_transactions::Entity::find()
        .filter(credit_transactions::Column::CreditId.eq(credit_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.transaction_id)
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    transactions::Entity::find()
        .filter(transactions::Column::Id.is_in(ids))
        .order_by_asc(transactions::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

async fn aggregate_of<C: ConnectionTrait>(
    conn: &C,
    credit: &credits::Model,
) -> ResultEngine<Option<transactions::Model>> {
    let Some(id) = credit.credit_transaction_id else {
        return Ok(None);
    };
    transactions::Entity::find_by_id(id)
        .one(conn)
        .await
        .map_err(Into::into)
}

fn total_of(members: &[transactions::Model]) -> ResultEngine<i64> {
    members.iter().try_fold(0_i64, |sum, member| {
        member
            .quantity
            .checked_mul(member.amount)
            .and_then(|total| sum.checked_add(total))
            .ok_or_else(|| EngineError::ConservationViolation("credit total overflows".to_string()))
    })
}
