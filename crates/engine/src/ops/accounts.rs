use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;

use crate::{
    EngineError, NewClub, NewUser, ResultEngine, accounts,
    accounts::{AccountKind, InactivityReason},
    clubs,
    permission::{ModelKind, Op},
    users,
    util::{self, hash_password, normalize_required_name, verify_password},
};

use super::{Engine, Signal, Target, with_tx};

/// Display string of an account: username, club name or special type.
pub(crate) async fn display_of<C: ConnectionTrait>(
    conn: &C,
    account: &accounts::Model,
) -> ResultEngine<String> {
    if let Some(user_id) = account.user_id {
        let user = users::Entity::find_by_id(user_id)
            .one(conn)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;
        return Ok(user.username);
    }
    if let Some(club_id) = account.club_id {
        let club = clubs::Entity::find_by_id(club_id)
            .one(conn)
            .await?
            .ok_or_else(|| EngineError::not_found("club", club_id))?;
        return Ok(club.name);
    }
    Ok(account.special_type.clone().unwrap_or_default())
}

impl Engine {
    /// Create a user with its account and main alias.
    pub async fn create_user(&self, cmd: NewUser) -> ResultEngine<(users::Model, accounts::Model)> {
        let username = normalize_required_name(&cmd.username, "username")?;
        if cmd.password.is_empty() {
            return Err(EngineError::validation(
                "password",
                "required",
                "password must not be empty",
            ));
        }
        let now = util::now();

        with_tx!(self, |db_tx| {
            let existing = users::Entity::find()
                .filter(users::Column::Username.eq(username.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::validation(
                    "username",
                    "taken",
                    format!("username {username} is already taken"),
                ));
            }

            let user = users::Model {
                id: 0,
                username: username.clone(),
                password: hash_password(&cmd.password),
                first_name: cmd.first_name.trim().to_string(),
                last_name: cmd.last_name.trim().to_string(),
                email: cmd.email.trim().to_string(),
                paid: cmd.paid,
                is_superuser: cmd.is_superuser,
                created_at: now,
            };
            let user = self.insert_tracked(&db_tx, Signal::Checked, user).await?;

            let mut account = accounts::Model::blank(AccountKind::User, now);
            account.user_id = Some(user.id);
            let account = self.insert_tracked(&db_tx, Signal::Checked, account).await?;
            self.insert_alias_in(&db_tx, Signal::Checked, account.id, &username)
                .await?;
            info!(user = user.id, account = account.id, "user created");
            Ok((user, account))
        })
    }

    /// Check credentials. `None` when the user is unknown or the password wrong.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> ResultEngine<Option<users::Model>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username.trim()))
            .one(&self.database)
            .await?;
        Ok(user.filter(|user| verify_password(&user.password, password)))
    }

    /// Create a club with its account and main alias.
    pub async fn create_club(&self, cmd: NewClub) -> ResultEngine<(clubs::Model, accounts::Model)> {
        let name = normalize_required_name(&cmd.name, "name")?;
        if cmd.membership_fee_paid < 0 || cmd.membership_fee_unpaid < 0 {
            return Err(EngineError::validation(
                "membership_fee",
                "invalid_amount",
                "membership fees must not be negative",
            ));
        }
        if cmd.membership_duration.is_some_and(|days| days < 1) {
            return Err(EngineError::validation(
                "membership_duration",
                "invalid_duration",
                "membership duration must be at least one day",
            ));
        }
        let now = util::now();

        with_tx!(self, |db_tx| {
            if let Some(parent) = cmd.parent_club_id {
                clubs::Entity::find_by_id(parent)
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::not_found("club", parent))?;
            }
            let existing = clubs::Entity::find()
                .filter(clubs::Column::Name.eq(name.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::validation(
                    "name",
                    "taken",
                    format!("club {name} already exists"),
                ));
            }

            let club = clubs::Model {
                id: 0,
                name: name.clone(),
                email: cmd.email.trim().to_string(),
                parent_club_id: cmd.parent_club_id,
                require_memberships: cmd.require_memberships,
                membership_fee_paid: cmd.membership_fee_paid,
                membership_fee_unpaid: cmd.membership_fee_unpaid,
                membership_duration: cmd.membership_duration,
                membership_start: cmd.membership_start,
                membership_end: cmd.membership_end,
            };
            let club = self.insert_tracked(&db_tx, Signal::Checked, club).await?;

            let mut account = accounts::Model::blank(AccountKind::Club, now);
            account.club_id = Some(club.id);
            let account = self.insert_tracked(&db_tx, Signal::Checked, account).await?;
            self.insert_alias_in(&db_tx, Signal::Checked, account.id, &name)
                .await?;
            info!(club = club.id, account = account.id, "club created");
            Ok((club, account))
        })
    }

    /// Create the account of a payment method (`cash`, `card`, ...).
    pub async fn create_special_account(&self, special_type: &str) -> ResultEngine<accounts::Model> {
        let special_type = normalize_required_name(special_type, "special_type")?;
        with_tx!(self, |db_tx| {
            let existing = accounts::Entity::find()
                .filter(accounts::Column::SpecialType.eq(special_type.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::validation(
                    "special_type",
                    "taken",
                    format!("special account {special_type} already exists"),
                ));
            }
            let mut account = accounts::Model::blank(AccountKind::Special, util::now());
            account.special_type = Some(special_type.clone());
            self.insert_tracked(&db_tx, Signal::Checked, account).await
        })
    }

    pub async fn special_account(&self, special_type: &str) -> ResultEngine<accounts::Model> {
        accounts::Entity::find()
            .filter(accounts::Column::SpecialType.eq(special_type))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("special account", special_type))
    }

    pub async fn user_account(&self, user_id: i64) -> ResultEngine<accounts::Model> {
        accounts::Entity::find()
            .filter(accounts::Column::UserId.eq(user_id))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("user account", user_id))
    }

    pub async fn club_account(&self, club_id: i64) -> ResultEngine<accounts::Model> {
        accounts::Entity::find()
            .filter(accounts::Column::ClubId.eq(club_id))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("club account", club_id))
    }

    pub async fn rename_user(&self, user_id: i64, username: &str) -> ResultEngine<users::Model> {
        let username = normalize_required_name(username, "username")?;
        with_tx!(self, |db_tx| {
            let mut user = users::Entity::find_by_id(user_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("user", user_id))?;
            let account = accounts::Entity::find()
                .filter(accounts::Column::UserId.eq(user_id))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("user account", user_id))?;
            let previous = std::mem::replace(&mut user.username, username.clone());
            self.rename_alias_in(&db_tx, account.id, &previous, &username)
                .await?;
            self.update_tracked(&db_tx, Signal::Checked, user).await
        })
    }

    pub async fn rename_club(&self, club_id: i64, name: &str) -> ResultEngine<clubs::Model> {
        let name = normalize_required_name(name, "name")?;
        with_tx!(self, |db_tx| {
            let mut club = clubs::Entity::find_by_id(club_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("club", club_id))?;
            let account = accounts::Entity::find()
                .filter(accounts::Column::ClubId.eq(club_id))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("club account", club_id))?;
            let previous = std::mem::replace(&mut club.name, name.clone());
            self.rename_alias_in(&db_tx, account.id, &previous, &name)
                .await?;
            self.update_tracked(&db_tx, Signal::Checked, club).await
        })
    }

    /// Activate an account, or deactivate it for `reason`.
    ///
    /// Lifting a forced deactivation requires `change` on
    /// `inactivity_reason`.
    pub async fn set_account_active(
        &self,
        account_id: i64,
        active: bool,
        reason: InactivityReason,
    ) -> ResultEngine<accounts::Model> {
        with_tx!(self, |db_tx| {
            let mut account = accounts::Entity::find_by_id(account_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("account", account_id))?;
            if active && account.inactivity_reason == InactivityReason::Forced.as_str() {
                self.authorize(
                    &db_tx,
                    Op::Change,
                    ModelKind::Account,
                    Target::Stored(account_id),
                    Some("inactivity_reason"),
                )
                .await?;
            }
            account.is_active = active;
            account.inactivity_reason = if active {
                String::new()
            } else {
                reason.as_str().to_string()
            };
            self.update_tracked(&db_tx, Signal::Checked, account).await
        })
    }

    pub async fn account_display(&self, account_id: i64) -> ResultEngine<String> {
        let account = accounts::Entity::find_by_id(account_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("account", account_id))?;
        display_of(&self.database, &account).await
    }

    /// One account, if visible to the current principal.
    pub async fn account(&self, account_id: i64) -> ResultEngine<accounts::Model> {
        let visible = self.filter_query(ModelKind::Account, Op::View, None).await;
        accounts::Entity::find_by_id(account_id)
            .filter(visible.condition())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("account", account_id))
    }

    /// Accounts visible to the current principal.
    pub async fn list_accounts(&self) -> ResultEngine<Vec<accounts::Model>> {
        let visible = self.filter_query(ModelKind::Account, Op::View, None).await;
        accounts::Entity::find()
            .filter(visible.condition())
            .order_by_asc(accounts::Column::Id)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }

    pub async fn user(&self, user_id: i64) -> ResultEngine<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))
    }

    pub async fn club(&self, club_id: i64) -> ResultEngine<clubs::Model> {
        clubs::Entity::find_by_id(club_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("club", club_id))
    }
}
