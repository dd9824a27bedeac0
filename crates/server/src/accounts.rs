//! Account and alias endpoints

use api_types::{
    account::{AccountActivity, AccountKind, AccountView},
    alias::{AliasNew, AliasView},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{Engine, accounts::InactivityReason, aliases};

use crate::{ServerError, server::ServerState};

fn map_kind(kind: engine::accounts::AccountKind) -> AccountKind {
    match kind {
        engine::accounts::AccountKind::User => AccountKind::User,
        engine::accounts::AccountKind::Club => AccountKind::Club,
        engine::accounts::AccountKind::Special => AccountKind::Special,
    }
}

pub(crate) fn alias_view(alias: aliases::Model) -> AliasView {
    AliasView {
        id: alias.id,
        name: alias.name,
        normalized_name: alias.normalized_name,
        account_id: alias.account_id,
    }
}

async fn account_view(
    engine: &Engine,
    account: engine::accounts::Model,
) -> Result<AccountView, ServerError> {
    let display = engine.account_display(account.id).await?;
    Ok(AccountView {
        id: account.id,
        kind: map_kind(account.account_kind()?),
        display,
        balance: account.balance,
        is_active: account.is_active,
        inactivity_reason: account.inactivity_reason,
        last_negative: account.last_negative,
    })
}

/// Accounts visible to the caller.
pub async fn list(State(state): State<ServerState>) -> Result<Json<Vec<AccountView>>, ServerError> {
    let accounts = state.engine.list_accounts().await?;
    let mut views = Vec::with_capacity(accounts.len());
    for account in accounts {
        views.push(account_view(&state.engine, account).await?);
    }
    Ok(Json(views))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<AccountView>, ServerError> {
    let account = state.engine.account(id).await?;
    Ok(Json(account_view(&state.engine, account).await?))
}

pub async fn set_active(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<AccountActivity>,
) -> Result<Json<AccountView>, ServerError> {
    let reason = match payload.reason.as_deref() {
        None | Some("manual") => InactivityReason::Manual,
        Some("forced") => InactivityReason::Forced,
        Some(other) => {
            return Err(ServerError::Generic(format!(
                "unknown inactivity reason: {other}"
            )));
        }
    };
    let account = state
        .engine
        .set_account_active(id, payload.active, reason)
        .await?;
    Ok(Json(account_view(&state.engine, account).await?))
}

pub async fn aliases(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AliasView>>, ServerError> {
    let aliases = state.engine.list_aliases(id).await?;
    Ok(Json(aliases.into_iter().map(alias_view).collect()))
}

pub async fn alias_new(
    State(state): State<ServerState>,
    Json(payload): Json<AliasNew>,
) -> Result<(StatusCode, Json<AliasView>), ServerError> {
    let alias = state
        .engine
        .create_alias(payload.account_id, &payload.name)
        .await?;
    Ok((StatusCode::CREATED, Json(alias_view(alias))))
}

pub async fn alias_delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_alias(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve any spelling of an alias to its account.
pub async fn resolve(
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<AccountView>, ServerError> {
    let account = state.engine.resolve_alias(&name).await?;
    // Resolution only reveals accounts the caller may see.
    let account = state.engine.account(account.id).await?;
    Ok(Json(account_view(&state.engine, account).await?))
}
