use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::debug;

use crate::{
    EngineError, ResultEngine, accounts, aliases,
    permission::{ModelKind, Op},
    util::{checked_normalize, normalize},
};

use super::{Engine, Signal, accounts::display_of, with_tx};

async fn find_normalized(
    db_tx: &DatabaseTransaction,
    normalized: &str,
) -> ResultEngine<Option<aliases::Model>> {
    aliases::Entity::find()
        .filter(aliases::Column::NormalizedName.eq(normalized))
        .one(db_tx)
        .await
        .map_err(Into::into)
}

fn taken(name: &str) -> EngineError {
    EngineError::validation("name", "alias_taken", format!("alias {name} is already taken"))
}

impl Engine {
    pub(crate) async fn insert_alias_in(
        &self,
        db_tx: &DatabaseTransaction,
        signal: Signal,
        account_id: i64,
        name: &str,
    ) -> ResultEngine<aliases::Model> {
        let normalized = checked_normalize(name)?;
        if find_normalized(db_tx, &normalized).await?.is_some() {
            return Err(taken(name));
        }
        let alias = aliases::Model {
            id: 0,
            name: name.to_string(),
            normalized_name: normalized,
            account_id,
        };
        let alias = self.insert_tracked(db_tx, signal, alias).await?;
        debug!(alias = %alias.normalized_name, account = account_id, "alias created");
        Ok(alias)
    }

    /// Point the account's names at `new_name` after its owner was renamed.
    ///
    /// The main alias is edited in place when the normalized form is kept,
    /// otherwise a new alias is added and the old one stays.
    pub(crate) async fn rename_alias_in(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: i64,
        old_name: &str,
        new_name: &str,
    ) -> ResultEngine<aliases::Model> {
        let normalized = checked_normalize(new_name)?;
        match find_normalized(db_tx, &normalized).await? {
            Some(existing) if existing.account_id != account_id => Err(taken(new_name)),
            Some(mut existing) if normalize(old_name) == normalized => {
                existing.name = new_name.to_string();
                self.update_tracked(db_tx, Signal::Checked, existing).await
            }
            Some(existing) => Ok(existing),
            None => {
                self.insert_alias_in(db_tx, Signal::Checked, account_id, new_name)
                    .await
            }
        }
    }

    /// Aliases of an account visible to the current principal.
    pub async fn list_aliases(&self, account_id: i64) -> ResultEngine<Vec<aliases::Model>> {
        let visible = self.filter_query(ModelKind::Alias, Op::View, None).await;
        aliases::Entity::find()
            .filter(aliases::Column::AccountId.eq(account_id))
            .filter(visible.condition())
            .order_by_asc(aliases::Column::NormalizedName)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }

    /// Find the account behind any spelling of an alias.
    pub async fn resolve_alias(&self, name: &str) -> ResultEngine<accounts::Model> {
        let normalized = normalize(name);
        let alias = aliases::Entity::find()
            .filter(aliases::Column::NormalizedName.eq(normalized.as_str()))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("alias", name))?;
        accounts::Entity::find_by_id(alias.account_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("account", alias.account_id))
    }

    pub async fn create_alias(&self, account_id: i64, name: &str) -> ResultEngine<aliases::Model> {
        with_tx!(self, |db_tx| {
            let account = accounts::Entity::find_by_id(account_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("account", account_id))?;
            if account.is_special() {
                Err(EngineError::validation(
                    "account",
                    "special_account",
                    "special accounts have no alias",
                ))
            } else {
                self.insert_alias_in(&db_tx, Signal::Checked, account_id, name)
                    .await
            }
        })
    }

    /// Delete an alias. The main alias of an account cannot be deleted.
    pub async fn delete_alias(&self, alias_id: i64) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let alias = aliases::Entity::find_by_id(alias_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("alias", alias_id))?;
            let account = accounts::Entity::find_by_id(alias.account_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("account", alias.account_id))?;
            if normalize(&display_of(&db_tx, &account).await?) == alias.normalized_name {
                Err(EngineError::validation(
                    "name",
                    "main_alias",
                    "the main alias cannot be deleted",
                ))
            } else {
                self.delete_tracked(&db_tx, Signal::Checked, alias).await
            }
        })
    }
}
