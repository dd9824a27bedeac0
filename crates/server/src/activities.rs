//! Activity guest endpoints

use api_types::activity::{GuestEntered, GuestNew, GuestView};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::guests;

use crate::{ServerError, server::ServerState};

fn guest_view(guest: guests::Model) -> GuestView {
    GuestView {
        id: guest.id,
        activity_id: guest.activity_id,
        inviter_id: guest.inviter_id,
        first_name: guest.first_name,
        last_name: guest.last_name,
        entry_time: guest.entry_time,
    }
}

pub async fn invite(
    State(state): State<ServerState>,
    Path(activity_id): Path<i64>,
    Json(payload): Json<GuestNew>,
) -> Result<(StatusCode, Json<GuestView>), ServerError> {
    let guest = state
        .engine
        .invite_guest(
            activity_id,
            payload.inviter_id,
            &payload.first_name,
            &payload.last_name,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(guest_view(guest))))
}

/// Let the guest in; the inviter is charged the entry fee.
pub async fn entry(
    State(state): State<ServerState>,
    Path(guest_id): Path<i64>,
) -> Result<Json<GuestEntered>, ServerError> {
    let (guest, transaction) = state.engine.guest_entry(guest_id).await?;
    Ok(Json(GuestEntered {
        guest: guest_view(guest),
        transaction_id: transaction.map(|tx| tx.id),
    }))
}
