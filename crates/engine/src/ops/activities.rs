use chrono::Duration;
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;

use crate::{
    EngineError, NewActivity, NewTransaction, ResultEngine, TransactionPayload, ValidationErrors,
    accounts, activities, clubs, guests,
    permission::{ModelKind, Op},
    transactions, users,
    util::{self, normalize_required_name},
};

use super::{Engine, Signal, with_tx};

/// Invitations of one person over the last year.
const MAX_INVITATIONS_PER_YEAR: usize = 5;
const MAX_GUESTS_PER_INVITER: usize = 3;

impl Engine {
    pub async fn create_activity(&self, cmd: NewActivity) -> ResultEngine<activities::Model> {
        let name = normalize_required_name(&cmd.name, "name")?;
        let mut errors = ValidationErrors::default();
        if cmd.date_end <= cmd.date_start {
            errors.push("date_end", "invalid_window", "the activity ends before it starts");
        }
        if cmd.guest_entry_fee < 0 {
            errors.push("guest_entry_fee", "invalid_amount", "fee must not be negative");
        }
        errors.into_result()?;

        with_tx!(self, |db_tx| {
            for club_id in [cmd.organizer_id, cmd.attendees_club_id] {
                clubs::Entity::find_by_id(club_id)
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::not_found("club", club_id))?;
            }
            let activity = activities::Model {
                id: 0,
                name,
                description: cmd.description.clone(),
                organizer_id: cmd.organizer_id,
                attendees_club_id: cmd.attendees_club_id,
                date_start: cmd.date_start,
                date_end: cmd.date_end,
                valid: false,
                open: false,
                guest_entry_fee: cmd.guest_entry_fee,
            };
            self.insert_tracked(&db_tx, Signal::Checked, activity).await
        })
    }

    pub async fn set_activity_valid(
        &self,
        activity_id: i64,
        valid: bool,
    ) -> ResultEngine<activities::Model> {
        with_tx!(self, |db_tx| {
            let mut activity = find_activity(&db_tx, activity_id).await?;
            activity.valid = valid;
            if !valid {
                activity.open = false;
            }
            self.update_tracked(&db_tx, Signal::Checked, activity).await
        })
    }

    /// Open or close the entry desk. Only valid activities open.
    pub async fn set_activity_open(
        &self,
        activity_id: i64,
        open: bool,
    ) -> ResultEngine<activities::Model> {
        with_tx!(self, |db_tx| {
            let mut activity = find_activity(&db_tx, activity_id).await?;
            if open && !activity.valid {
                return Err(EngineError::validation(
                    "activity",
                    "not_valid",
                    "the activity is not validated",
                ));
            }
            activity.open = open;
            self.update_tracked(&db_tx, Signal::Checked, activity).await
        })
    }

    pub async fn list_activities(&self) -> ResultEngine<Vec<activities::Model>> {
        let visible = self
            .filter_query(ModelKind::Activity, Op::View, None)
            .await;
        activities::Entity::find()
            .filter(visible.condition())
            .order_by_desc(activities::Column::DateStart)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }

    /// Invite an outside guest to a validated activity.
    pub async fn invite_guest(
        &self,
        activity_id: i64,
        inviter_id: i64,
        first_name: &str,
        last_name: &str,
    ) -> ResultEngine<guests::Model> {
        let first_name = normalize_required_name(first_name, "first_name")?;
        let last_name = normalize_required_name(last_name, "last_name")?;

        with_tx!(self, |db_tx| {
            let activity = find_activity(&db_tx, activity_id).await?;
            users::Entity::find_by_id(inviter_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("user", inviter_id))?;

            let mut errors = ValidationErrors::default();
            if !activity.valid {
                errors.push("inviter", "not_valid", "the activity is not validated");
            }

            let since = activity.date_start - Duration::days(365);
            let recent: Vec<i64> = activities::Entity::find()
                .filter(activities::Column::DateStart.gte(since))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|activity| activity.id)
                .collect();
            let invitations = guests::Entity::find()
                .filter(guests::Column::FirstName.eq(first_name.as_str()))
                .filter(guests::Column::LastName.eq(last_name.as_str()))
                .filter(guests::Column::ActivityId.is_in(recent))
                .all(&db_tx)
                .await?;
            if invitations.len() >= MAX_INVITATIONS_PER_YEAR {
                errors.push(
                    "last_name",
                    "too_many_invitations",
                    "this person has already been invited 5 times this year",
                );
            }
            if invitations.iter().any(|guest| guest.activity_id == activity.id) {
                errors.push("last_name", "already_invited", "this person is already invited");
            }

            let invited_by = guests::Entity::find()
                .filter(guests::Column::ActivityId.eq(activity.id))
                .filter(guests::Column::InviterId.eq(inviter_id))
                .all(&db_tx)
                .await?;
            if invited_by.len() >= MAX_GUESTS_PER_INVITER {
                errors.push(
                    "inviter",
                    "too_many_invitations",
                    "an inviter cannot bring more than 3 guests",
                );
            }
            errors.into_result()?;

            let guest = guests::Model {
                id: 0,
                activity_id: activity.id,
                inviter_id,
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                created_at: util::now(),
                entry_time: None,
            };
            self.insert_tracked(&db_tx, Signal::Checked, guest).await
        })
    }

    /// Let a guest in and charge the entry fee to the inviter.
    pub async fn guest_entry(
        &self,
        guest_id: i64,
    ) -> ResultEngine<(guests::Model, Option<transactions::Model>)> {
        with_tx!(self, |db_tx| {
            let mut guest = guests::Entity::find_by_id(guest_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("guest", guest_id))?;
            let activity = find_activity(&db_tx, guest.activity_id).await?;
            if !activity.open {
                return Err(EngineError::validation(
                    "activity",
                    "closed",
                    "the activity is not open",
                ));
            }
            if guest.entry_time.is_some() {
                return Err(EngineError::validation(
                    "guest",
                    "already_entered",
                    "the guest already entered",
                ));
            }

            guest.entry_time = Some(util::now());
            let guest = self.update_tracked(&db_tx, Signal::Checked, guest).await?;

            let mut transaction = None;
            if activity.guest_entry_fee > 0 {
                let account = accounts::Entity::find()
                    .filter(accounts::Column::UserId.eq(guest.inviter_id))
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::not_found("user account", guest.inviter_id))?;
                let cmd = NewTransaction::new(account.id, account.id, activity.guest_entry_fee)
                    .reason(format!(
                        "Guest entry {} {} ({})",
                        guest.first_name, guest.last_name, activity.name
                    ))
                    .payload(TransactionPayload::Guest { guest_id: guest.id });
                transaction = self
                    .create_transaction_in(&db_tx, Signal::ForceSave, cmd)
                    .await?;
            }
            info!(guest = guest.id, activity = activity.id, "guest entered");
            Ok((guest, transaction))
        })
    }
}

async fn find_activity(
    db_tx: &sea_orm::DatabaseTransaction,
    activity_id: i64,
) -> ResultEngine<activities::Model> {
    activities::Entity::find_by_id(activity_id)
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::not_found("activity", activity_id))
}
