//! Invoices and bank remittances.

use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;

use crate::{
    EngineError, NewInvoice, ResultEngine, ValidationErrors, accounts, invoices,
    permission::{ModelKind, Op},
    products, remittance_transactions, remittance_types, remittances, transactions,
    transactions::TransactionKind,
    util,
};

use super::{Engine, Signal, Target, with_tx};

fn validate_invoice(cmd: &NewInvoice) -> ResultEngine<()> {
    let mut errors = ValidationErrors::default();
    for (label, value) in [("object", &cmd.object), ("name", &cmd.name)] {
        if value.trim().is_empty() {
            errors.push(label, "required", format!("{label} must not be empty"));
        }
    }
    for product in &cmd.products {
        if product.designation.trim().is_empty() {
            errors.push("designation", "required", "designation must not be empty");
        }
        if product.quantity < 1 {
            errors.push("quantity", "invalid_quantity", "quantity must be at least 1");
        }
    }
    errors.into_result()
}

impl Engine {
    pub async fn create_invoice(
        &self,
        cmd: NewInvoice,
    ) -> ResultEngine<(invoices::Model, Vec<products::Model>)> {
        validate_invoice(&cmd)?;
        with_tx!(self, |db_tx| {
            let invoice = invoices::Model {
                id: 0,
                bde: cmd.bde.clone(),
                object: cmd.object.trim().to_string(),
                description: cmd.description.clone(),
                name: cmd.name.trim().to_string(),
                address: cmd.address.clone(),
                date: cmd.date,
                acquitted: cmd.acquitted,
                locked: false,
            };
            let invoice = self.insert_tracked(&db_tx, Signal::Checked, invoice).await?;
            let products = self.replace_products_in(&db_tx, Signal::Checked, invoice.id, &cmd).await?;
            Ok((invoice, products))
        })
    }

    /// Replace the fields and the product lines of an unlocked invoice.
    pub async fn update_invoice(
        &self,
        invoice_id: i64,
        cmd: NewInvoice,
    ) -> ResultEngine<(invoices::Model, Vec<products::Model>)> {
        validate_invoice(&cmd)?;
        with_tx!(self, |db_tx| {
            self.update_invoice_in(&db_tx, Signal::Checked, invoice_id, &cmd)
                .await
        })
    }

    /// Correct a locked invoice. Needs `change` on the `locked` field.
    pub async fn force_update_invoice(
        &self,
        invoice_id: i64,
        cmd: NewInvoice,
    ) -> ResultEngine<(invoices::Model, Vec<products::Model>)> {
        validate_invoice(&cmd)?;
        with_tx!(self, |db_tx| {
            self.authorize(
                &db_tx,
                Op::Change,
                ModelKind::Invoice,
                Target::Stored(invoice_id),
                Some("locked"),
            )
            .await?;
            self.update_invoice_in(&db_tx, Signal::ForceSave, invoice_id, &cmd)
                .await
        })
    }

    async fn update_invoice_in(
        &self,
        db_tx: &DatabaseTransaction,
        signal: Signal,
        invoice_id: i64,
        cmd: &NewInvoice,
    ) -> ResultEngine<(invoices::Model, Vec<products::Model>)> {
        let mut invoice = find_invoice(db_tx, invoice_id).await?;
        if invoice.locked && signal != Signal::ForceSave {
            return Err(EngineError::locked("invoice"));
        }
        invoice.bde = cmd.bde.clone();
        invoice.object = cmd.object.trim().to_string();
        invoice.description = cmd.description.clone();
        invoice.name = cmd.name.trim().to_string();
        invoice.address = cmd.address.clone();
        invoice.date = cmd.date;
        invoice.acquitted = cmd.acquitted;
        let invoice = self.update_tracked(db_tx, signal, invoice).await?;
        let products = self.replace_products_in(db_tx, signal, invoice.id, cmd).await?;
        Ok((invoice, products))
    }

    async fn replace_products_in(
        &self,
        db_tx: &DatabaseTransaction,
        signal: Signal,
        invoice_id: i64,
        cmd: &NewInvoice,
    ) -> ResultEngine<Vec<products::Model>> {
        let previous = products::Entity::find()
            .filter(products::Column::InvoiceId.eq(invoice_id))
            .all(db_tx)
            .await?;
        for product in previous {
            self.delete_tracked(db_tx, signal, product).await?;
        }
        let mut stored = Vec::with_capacity(cmd.products.len());
        for line in &cmd.products {
            let product = products::Model {
                id: 0,
                invoice_id,
                designation: line.designation.trim().to_string(),
                quantity: line.quantity,
                amount: line.amount,
            };
            stored.push(self.insert_tracked(db_tx, signal, product).await?);
        }
        Ok(stored)
    }

    /// Freeze an invoice; later edits fail with `locked{invoice}`.
    pub async fn lock_invoice(&self, invoice_id: i64) -> ResultEngine<invoices::Model> {
        with_tx!(self, |db_tx| {
            let mut invoice = find_invoice(&db_tx, invoice_id).await?;
            invoice.locked = true;
            self.update_tracked(&db_tx, Signal::Checked, invoice).await
        })
    }

    /// Lift the lock. Needs `change` on the `locked` field.
    pub async fn unlock_invoice(&self, invoice_id: i64) -> ResultEngine<invoices::Model> {
        with_tx!(self, |db_tx| {
            self.authorize(
                &db_tx,
                Op::Change,
                ModelKind::Invoice,
                Target::Stored(invoice_id),
                Some("locked"),
            )
            .await?;
            let mut invoice = find_invoice(&db_tx, invoice_id).await?;
            invoice.locked = false;
            self.update_tracked(&db_tx, Signal::ForceSave, invoice).await
        })
    }

    pub async fn invoice_products(&self, invoice_id: i64) -> ResultEngine<Vec<products::Model>> {
        products::Entity::find()
            .filter(products::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(products::Column::Id)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }

    /// Declare a special account whose incoming money is remitted to the bank.
    pub async fn create_remittance_type(
        &self,
        special_account_id: i64,
    ) -> ResultEngine<remittance_types::Model> {
        with_tx!(self, |db_tx| {
            let account = accounts::Entity::find_by_id(special_account_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("account", special_account_id))?;
            if !account.is_special() {
                return Err(EngineError::validation(
                    "special_account",
                    "not_special",
                    "a remittance type needs a special account",
                ));
            }
            let remittance_type = remittance_types::Model {
                id: 0,
                special_account_id,
            };
            self.insert_tracked(&db_tx, Signal::Checked, remittance_type)
                .await
        })
    }

    pub async fn open_remittance(
        &self,
        remittance_type_id: i64,
        comment: &str,
    ) -> ResultEngine<remittances::Model> {
        with_tx!(self, |db_tx| {
            remittance_types::Entity::find_by_id(remittance_type_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("remittance_type", remittance_type_id))?;
            let remittance = remittances::Model {
                id: 0,
                remittance_type_id,
                date: util::now(),
                comment: comment.trim().to_string(),
                closed: false,
            };
            self.insert_tracked(&db_tx, Signal::Checked, remittance).await
        })
    }

    /// Add a special transaction to an open remittance of the matching type.
    pub async fn link_special_transaction(
        &self,
        remittance_id: i64,
        transaction_id: i64,
    ) -> ResultEngine<remittance_transactions::Model> {
        with_tx!(self, |db_tx| {
            let remittance = find_remittance(&db_tx, remittance_id).await?;
            if remittance.closed {
                return Err(EngineError::locked("remittance"));
            }
            let remittance_type = remittance_types::Entity::find_by_id(remittance.remittance_type_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| {
                    EngineError::not_found("remittance_type", remittance.remittance_type_id)
                })?;
            let transaction = transactions::Entity::find_by_id(transaction_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("transaction", transaction_id))?;
            if transaction.kind()? != TransactionKind::Special
                || transaction.source_id != remittance_type.special_account_id
            {
                return Err(EngineError::validation(
                    "transaction",
                    "wrong_type",
                    "the transaction does not come from this remittance type",
                ));
            }
            let linked = remittance_transactions::Entity::find()
                .filter(remittance_transactions::Column::TransactionId.eq(transaction_id))
                .one(&db_tx)
                .await?;
            if linked.is_some() {
                return Err(EngineError::validation(
                    "transaction",
                    "already_linked",
                    "the transaction already belongs to a remittance",
                ));
            }
            let link = remittance_transactions::Model {
                id: 0,
                transaction_id,
                remittance_id,
            };
            self.insert_tracked(&db_tx, Signal::Checked, link).await
        })
    }

    pub async fn close_remittance(&self, remittance_id: i64) -> ResultEngine<remittances::Model> {
        with_tx!(self, |db_tx| {
            let mut remittance = find_remittance(&db_tx, remittance_id).await?;
            if remittance.closed {
                return Err(EngineError::locked("remittance"));
            }
            remittance.closed = true;
            let remittance = self
                .update_tracked(&db_tx, Signal::Checked, remittance)
                .await?;
            info!(remittance = remittance.id, "remittance closed");
            Ok(remittance)
        })
    }

    /// Sum of the linked transactions, in hundredths.
    pub async fn remittance_amount(&self, remittance_id: i64) -> ResultEngine<i64> {
        let ids: Vec<i64> = remittance_transactions::Entity::find()
            .filter(remittance_transactions::Column::RemittanceId.eq(remittance_id))
            .all(&self.database)
            .await?
            .into_iter()
            .map(|link| link.transaction_id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let linked = transactions::Entity::find()
            .filter(transactions::Column::Id.is_in(ids))
            .all(&self.database)
            .await?;
        Ok(linked
            .iter()
            .map(transactions::Model::total)
            .fold(0_i64, i64::saturating_add))
    }
}

async fn find_invoice(db_tx: &DatabaseTransaction, invoice_id: i64) -> ResultEngine<invoices::Model> {
    invoices::Entity::find_by_id(invoice_id)
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::not_found("invoice", invoice_id))
}

async fn find_remittance(
    db_tx: &DatabaseTransaction,
    remittance_id: i64,
) -> ResultEngine<remittances::Model> {
    remittances::Entity::find_by_id(remittance_id)
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::not_found("remittance", remittance_id))
}
