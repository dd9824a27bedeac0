//! Membership and banking-partner credit endpoints

use api_types::{
    credit::{CreditState as ApiCreditState, CreditView},
    membership::{MembershipNew, MembershipRenew, MembershipView},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{CreditState, Engine, NewMembership, RenewOptions, credits, memberships};

use crate::{ServerError, server::ServerState};

fn membership_view(membership: memberships::Model) -> MembershipView {
    MembershipView {
        id: membership.id,
        user_id: membership.user_id,
        club_id: membership.club_id,
        date_start: membership.date_start,
        date_end: membership.date_end,
        fee: membership.fee,
    }
}

async fn credit_view(engine: &Engine, credit: credits::Model) -> Result<CreditView, ServerError> {
    let state = match engine.credit_state(credit.id).await? {
        CreditState::Open => ApiCreditState::Open,
        CreditState::Validated => ApiCreditState::Validated,
    };
    let members = engine
        .credit_transactions(credit.id)
        .await?
        .into_iter()
        .map(|tx| tx.id)
        .collect();
    Ok(CreditView {
        id: credit.id,
        user_id: credit.user_id,
        credit_transaction_id: credit.credit_transaction_id,
        state,
        members,
    })
}

/// Register a user to a club, paying the fee now or through the partner
/// bank.
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<MembershipNew>,
) -> Result<(StatusCode, Json<MembershipView>), ServerError> {
    let mut cmd = NewMembership::new(payload.user_id, payload.club_id)
        .roles(payload.roles)
        .cascade(payload.cascade)
        .partner_credit(payload.partner_credit);
    if let Some(date_start) = payload.date_start {
        cmd = cmd.starting(date_start);
    }
    let membership = state.engine.create_membership(cmd).await?;
    Ok((StatusCode::CREATED, Json(membership_view(membership))))
}

pub async fn renew(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    payload: Option<Json<MembershipRenew>>,
) -> Result<(StatusCode, Json<MembershipView>), ServerError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    let membership = state
        .engine
        .renew_membership(
            id,
            RenewOptions {
                cascade: payload.cascade,
                partner_credit: payload.partner_credit,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(membership_view(membership))))
}

pub async fn credit(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<CreditView>, ServerError> {
    let credit = state.engine.credit(id).await?;
    Ok(Json(credit_view(&state.engine, credit).await?))
}

/// Rebuild the aggregate transaction from the member transactions.
pub async fn update_credit(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<CreditView>, ServerError> {
    let credit = state.engine.update_credit(id).await?;
    Ok(Json(credit_view(&state.engine, credit).await?))
}

pub async fn validate_credit(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<CreditView>, ServerError> {
    let credit = state.engine.validate_credit(id).await?;
    Ok(Json(credit_view(&state.engine, credit).await?))
}

pub async fn invalidate_credit(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<CreditView>, ServerError> {
    let credit = state.engine.invalidate_credit(id).await?;
    Ok(Json(credit_view(&state.engine, credit).await?))
}

/// Give up the credit; the user pays the fees from their own balance.
pub async fn drop_credit(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
    state.engine.drop_credit(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
