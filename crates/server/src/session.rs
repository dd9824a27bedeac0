//! Login, session mask and bearer token endpoints

use api_types::session::{Login, MaskUpdate, ScopesResponse, SessionView, TokenNew, TokenView};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use engine::Auth;

use crate::{
    ServerError,
    context::{self, SESSION_COOKIE},
    server::ServerState,
};

/// Highest mask a session may carry.
const FULL_MASK: i64 = 42;

fn session_key() -> Result<String, ServerError> {
    match context::principal().map(|principal| principal.auth) {
        Some(Auth::Session { key, .. }) => Ok(key),
        _ => Err(ServerError::Unauthorized),
    }
}

/// Check credentials and open a session. The key is returned in the body and
/// as the session cookie.
pub async fn login(
    State(state): State<ServerState>,
    Json(payload): Json<Login>,
) -> Result<impl IntoResponse, ServerError> {
    let Some(user) = state
        .engine
        .authenticate(&payload.username, &payload.password)
        .await?
    else {
        return Err(ServerError::Unauthorized);
    };

    let session = state
        .engine
        .open_session(user.id, payload.mask.unwrap_or(FULL_MASK))
        .await?;
    tracing::info!(user = user.id, mask = session.permission_mask, "user logged in");

    let cookie = format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Strict",
        session.key
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(SessionView {
            key: session.key,
            user_id: session.user_id,
            mask: session.permission_mask,
        }),
    ))
}

pub async fn logout(State(state): State<ServerState>) -> Result<StatusCode, ServerError> {
    let key = session_key()?;
    state.engine.close_session(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lower (or raise back) the permission mask of the current session.
pub async fn set_mask(
    State(state): State<ServerState>,
    Json(payload): Json<MaskUpdate>,
) -> Result<Json<SessionView>, ServerError> {
    let key = session_key()?;
    let session = state.engine.set_session_mask(&key, payload.mask).await?;
    Ok(Json(SessionView {
        key: session.key,
        user_id: session.user_id,
        mask: session.permission_mask,
    }))
}

pub async fn scopes(State(state): State<ServerState>) -> Result<Json<ScopesResponse>, ServerError> {
    if context::principal().is_none() {
        return Err(ServerError::Unauthorized);
    }
    let scopes = state.engine.available_scopes().await?;
    Ok(Json(ScopesResponse { scopes }))
}

/// Issue a token for the caller. Only scopes the caller holds may be
/// delegated.
pub async fn issue_token(
    State(state): State<ServerState>,
    Json(payload): Json<TokenNew>,
) -> Result<(StatusCode, Json<TokenView>), ServerError> {
    let Some(principal) = context::principal() else {
        return Err(ServerError::Unauthorized);
    };
    let held = state.engine.available_scopes().await?;
    if let Some(scope) = payload
        .scopes
        .split_whitespace()
        .find(|scope| !held.iter().any(|h| h == scope))
    {
        return Err(ServerError::Engine(engine::EngineError::PermissionDenied {
            model: "access_token".to_string(),
            op: "add".to_string(),
            field: Some(format!("scope {scope}")),
        }));
    }

    let token = state
        .engine
        .issue_token(principal.user_id, &payload.scopes, payload.expires_at)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TokenView {
            token: token.token,
            scopes: token.scopes,
            expires_at: token.expires_at,
        }),
    ))
}

pub async fn revoke_token(
    State(state): State<ServerState>,
    Path(token): Path<String>,
) -> Result<StatusCode, ServerError> {
    let Some(principal) = context::principal() else {
        return Err(ServerError::Unauthorized);
    };
    let owner = state.engine.resolve_token(&token).await?;
    if owner.map(|owner| owner.user_id) != Some(principal.user_id) {
        return Err(ServerError::Engine(engine::EngineError::NotFound {
            kind: "token".to_string(),
            key: "<redacted>".to_string(),
        }));
    }
    state.engine.revoke_token(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
