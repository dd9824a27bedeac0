use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    EngineError, NewTemplate, NewTransaction, ResultEngine, TransactionPayload, accounts,
    accounts::AccountKind,
    permission::{ModelKind, Op},
    template_categories, transaction_templates, transactions,
    util::normalize_required_name,
};

use super::{Engine, Signal, with_tx};

impl Engine {
    pub async fn create_template_category(
        &self,
        name: &str,
    ) -> ResultEngine<template_categories::Model> {
        let name = normalize_required_name(name, "name")?;
        with_tx!(self, |db_tx| {
            let existing = template_categories::Entity::find()
                .filter(template_categories::Column::Name.eq(name.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::validation(
                    "name",
                    "taken",
                    format!("category {name} already exists"),
                ));
            }
            let category = template_categories::Model { id: 0, name };
            self.insert_tracked(&db_tx, Signal::Checked, category).await
        })
    }

    /// Create a button: a fixed amount credited to a club account.
    pub async fn create_template(
        &self,
        cmd: NewTemplate,
    ) -> ResultEngine<transaction_templates::Model> {
        let name = normalize_required_name(&cmd.name, "name")?;
        if cmd.amount < 0 {
            return Err(EngineError::validation(
                "amount",
                "invalid_amount",
                "amount must not be negative",
            ));
        }
        with_tx!(self, |db_tx| {
            let existing = transaction_templates::Entity::find()
                .filter(transaction_templates::Column::Name.eq(name.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::validation(
                    "name",
                    "taken",
                    format!("template {name} already exists"),
                ));
            }
            let destination = accounts::Entity::find_by_id(cmd.destination)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("account", cmd.destination))?;
            if destination.account_kind()? != AccountKind::Club {
                return Err(EngineError::validation(
                    "destination",
                    "not_club",
                    "a template credits a club account",
                ));
            }
            template_categories::Entity::find_by_id(cmd.category_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("template_category", cmd.category_id))?;

            let template = transaction_templates::Model {
                id: 0,
                name,
                destination_id: destination.id,
                amount: cmd.amount,
                category_id: cmd.category_id,
                display: cmd.display,
                highlighted: cmd.highlighted,
                description: cmd.description.clone(),
            };
            self.insert_tracked(&db_tx, Signal::Checked, template).await
        })
    }

    pub async fn set_template_display(
        &self,
        template_id: i64,
        display: bool,
    ) -> ResultEngine<transaction_templates::Model> {
        with_tx!(self, |db_tx| {
            let mut template = transaction_templates::Entity::find_by_id(template_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("transaction_template", template_id))?;
            template.display = display;
            self.update_tracked(&db_tx, Signal::Checked, template).await
        })
    }

    /// Displayed templates visible to the current principal.
    pub async fn list_templates(&self) -> ResultEngine<Vec<transaction_templates::Model>> {
        let visible = self
            .filter_query(ModelKind::TransactionTemplate, Op::View, None)
            .await;
        transaction_templates::Entity::find()
            .filter(transaction_templates::Column::Display.eq(true))
            .filter(visible.condition())
            .order_by_desc(transaction_templates::Column::Highlighted)
            .order_by_asc(transaction_templates::Column::Name)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }

    /// Debit `source` for `quantity` uses of a template.
    pub async fn create_template_transaction(
        &self,
        template_id: i64,
        source: i64,
        quantity: i64,
    ) -> ResultEngine<Option<transactions::Model>> {
        with_tx!(self, |db_tx| {
            let template = transaction_templates::Entity::find_by_id(template_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("transaction_template", template_id))?;
            let cmd = NewTransaction::new(source, template.destination_id, template.amount)
                .quantity(quantity)
                .reason(template.name)
                .payload(TransactionPayload::Template { template_id });
            self.create_transaction_in(&db_tx, Signal::Checked, cmd)
                .await
        })
    }
}
