//! Membership coordinator.
//!
//! A membership may cascade into its club's parent chain and posts the
//! membership fee as a Membership transaction from the user's account to the
//! club's account, optionally deferred to the user's banking-partner credit.

use chrono::{Days, NaiveDate};
use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::{debug, info};

use crate::{
    EngineError, NewMembership, NewTransaction, RenewOptions, ResultEngine, TransactionPayload,
    ValidationErrors, accounts, clubs, membership_roles, memberships,
    permission::{ModelKind, Op},
    roles, users, util,
};

use super::{Engine, Signal, ledger::lock_pair, with_tx};

/// Length of a membership in a club without a configured duration.
const UNBOUNDED_DAYS: u64 = 424_242;

/// Last day of a membership starting on `start` in `club`.
fn membership_end(club: &clubs::Model, start: NaiveDate) -> NaiveDate {
    let days = club
        .membership_duration
        .and_then(|days| u64::try_from(days).ok())
        .unwrap_or(UNBOUNDED_DAYS);
    let end = start
        .checked_add_days(Days::new(days))
        .unwrap_or(NaiveDate::MAX);
    match club.membership_end {
        Some(cap) => end.min(cap),
        None => end,
    }
}

/// Parameters of one step of the coordinator, shared with the cascade.
#[derive(Clone, Debug)]
struct Enrolment {
    user_id: i64,
    club_id: i64,
    date_start: NaiveDate,
    roles: Vec<i64>,
    cascade: bool,
    partner_credit: bool,
}

impl Engine {
    /// Create a membership, its parent memberships when cascading, and the
    /// fee transactions, in one database transaction.
    pub async fn create_membership(&self, cmd: NewMembership) -> ResultEngine<memberships::Model> {
        let enrolment = Enrolment {
            user_id: cmd.user_id,
            club_id: cmd.club_id,
            date_start: cmd.date_start.unwrap_or_else(|| util::now().date_naive()),
            roles: cmd.roles,
            cascade: cmd.cascade,
            partner_credit: cmd.partner_credit,
        };
        let membership = with_tx!(self, |db_tx| self.enrol_in(&db_tx, enrolment).await)?;
        self.clear_permission_cache();
        Ok(membership)
    }

    /// Create the next membership of the same user in the same club, with the
    /// same roles.
    pub async fn renew_membership(
        &self,
        membership_id: i64,
        options: RenewOptions,
    ) -> ResultEngine<memberships::Model> {
        let membership = with_tx!(self, |db_tx| {
            let previous = memberships::Entity::find_by_id(membership_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("membership", membership_id))?;
            let roles = membership_roles::Entity::find()
                .filter(membership_roles::Column::MembershipId.eq(previous.id))
                .order_by_asc(membership_roles::Column::Id)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|link| link.role_id)
                .collect();
            let after_previous = previous
                .date_end
                .succ_opt()
                .unwrap_or(previous.date_end);
            let enrolment = Enrolment {
                user_id: previous.user_id,
                club_id: previous.club_id,
                date_start: after_previous.max(util::now().date_naive()),
                roles,
                cascade: options.cascade,
                partner_credit: options.partner_credit,
            };
            self.enrol_in(&db_tx, enrolment).await
        })?;
        self.clear_permission_cache();
        Ok(membership)
    }

    async fn enrol_in(
        &self,
        db_tx: &DatabaseTransaction,
        enrolment: Enrolment,
    ) -> ResultEngine<memberships::Model> {
        let user = users::Entity::find_by_id(enrolment.user_id)
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("user", enrolment.user_id))?;
        let club = clubs::Entity::find_by_id(enrolment.club_id)
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::not_found("club", enrolment.club_id))?;
        let user_account = owner_account(db_tx, accounts::Column::UserId, user.id).await?;
        let club_account = owner_account(db_tx, accounts::Column::ClubId, club.id).await?;
        let (user_account, club_account) =
            lock_pair(db_tx, user_account.id, club_account.id).await?;

        let date_start = enrolment.date_start;
        let date_end = membership_end(&club, date_start);
        self.validate_enrolment(db_tx, &enrolment, &club, date_end)
            .await?;

        if let Some(parent_id) = club.parent_club_id {
            let covered = memberships::Entity::find()
                .filter(memberships::Column::UserId.eq(user.id))
                .filter(memberships::Column::ClubId.eq(parent_id))
                .all(db_tx)
                .await?
                .iter()
                .any(|membership| membership.covers(date_start));
            if !covered {
                if !enrolment.cascade {
                    return Err(EngineError::MissingParentMembership { club: club.id });
                }
                debug!(user = user.id, club = parent_id, "cascading to parent club");
                let parent = Enrolment {
                    club_id: parent_id,
                    roles: Vec::new(),
                    ..enrolment.clone()
                };
                Box::pin(self.enrol_in(db_tx, parent)).await?;
            }
        }

        let fee = club.fee_for(user.paid);
        let membership = memberships::Model {
            id: 0,
            user_id: user.id,
            club_id: club.id,
            date_start,
            date_end,
            fee,
        };
        let membership = self.insert_tracked(db_tx, Signal::Checked, membership).await?;
        for role_id in &enrolment.roles {
            let link = membership_roles::Model {
                id: 0,
                membership_id: membership.id,
                role_id: *role_id,
            };
            self.insert_tracked(db_tx, Signal::Checked, link).await?;
        }

        if fee > 0 {
            let cmd = NewTransaction::new(user_account.id, club_account.id, fee)
                .reason(format!("Membership {}", club.name))
                .valid(!enrolment.partner_credit)
                .payload(TransactionPayload::Membership {
                    membership_id: membership.id,
                });
            let transaction = self
                .create_transaction_in(db_tx, Signal::ForceSave, cmd)
                .await?;
            if let (true, Some(transaction)) = (enrolment.partner_credit, transaction) {
                self.attach_to_credit_in(db_tx, user.id, transaction.id)
                    .await?;
            }
        }

        info!(
            membership = membership.id,
            user = user.id,
            club = club.id,
            fee,
            "membership created"
        );
        Ok(membership)
    }

    /// Collect every violation of the membership invariants at once.
    async fn validate_enrolment(
        &self,
        db_tx: &DatabaseTransaction,
        enrolment: &Enrolment,
        club: &clubs::Model,
        date_end: NaiveDate,
    ) -> ResultEngine<()> {
        let mut errors = ValidationErrors::default();
        let date_start = enrolment.date_start;

        if club.membership_start.is_some_and(|first| date_start < first) {
            errors.push(
                "date_start",
                "before_membership_start",
                "the membership starts before the club opens memberships",
            );
        }
        if date_end < date_start {
            errors.push(
                "date_end",
                "invalid_window",
                "the membership would end before it starts",
            );
        }

        let overlapping = memberships::Entity::find()
            .filter(memberships::Column::UserId.eq(enrolment.user_id))
            .filter(memberships::Column::ClubId.eq(club.id))
            .all(db_tx)
            .await?
            .iter()
            .any(|membership| membership.overlaps(date_start, date_end));
        if overlapping {
            errors.push(
                "membership",
                "overlap",
                "the user is already a member of this club for this period",
            );
        }

        for role_id in &enrolment.roles {
            match roles::Entity::find_by_id(*role_id).one(db_tx).await? {
                Some(role) if role.applies_to(club.id) => {}
                Some(role) => errors.push(
                    "roles",
                    "role_scope",
                    format!("role {} does not apply to club {}", role.name, club.name),
                ),
                None => errors.push("roles", "unknown_role", format!("role {role_id} does not exist")),
            }
        }
        errors.into_result()
    }

    /// Memberships of a user visible to the current principal.
    pub async fn list_memberships(&self, user_id: i64) -> ResultEngine<Vec<memberships::Model>> {
        let visible = self
            .filter_query(ModelKind::Membership, Op::View, None)
            .await;
        memberships::Entity::find()
            .filter(memberships::Column::UserId.eq(user_id))
            .filter(visible.condition())
            .order_by_asc(memberships::Column::DateStart)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }
}

async fn owner_account(
    db_tx: &DatabaseTransaction,
    owner: accounts::Column,
    owner_id: i64,
) -> ResultEngine<accounts::Model> {
    accounts::Entity::find()
        .filter(owner.eq(owner_id))
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::not_found("account", owner_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn club(duration: Option<i64>, end: Option<NaiveDate>) -> clubs::Model {
        clubs::Model {
            id: 1,
            name: "club".to_string(),
            email: String::new(),
            parent_club_id: None,
            require_memberships: true,
            membership_fee_paid: 0,
            membership_fee_unpaid: 0,
            membership_duration: duration,
            membership_start: None,
            membership_end: end,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_is_start_plus_duration_capped_by_club_end() {
        let start = day(2024, 9, 1);
        assert_eq!(membership_end(&club(Some(30), None), start), day(2024, 10, 1));
        assert_eq!(
            membership_end(&club(Some(400), Some(day(2025, 9, 30))), start),
            day(2025, 9, 30)
        );
        assert_eq!(
            membership_end(&club(None, Some(day(2025, 9, 30))), start),
            day(2025, 9, 30)
        );
        assert!(membership_end(&club(None, None), start) > day(3000, 1, 1));
    }
}
