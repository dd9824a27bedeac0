//! Permission checks and change-log reads

use api_types::{
    changelog::ChangelogEntry,
    permission::{PermissionAnswer, PermissionCheck},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use engine::{ModelKind, Op};

use crate::{ServerError, server::ServerState};

/// Whether the caller may perform `op` on `model` (optionally one instance
/// and one field).
pub async fn check(
    State(state): State<ServerState>,
    Query(query): Query<PermissionCheck>,
) -> Result<Json<PermissionAnswer>, ServerError> {
    let kind = ModelKind::try_from(query.model.as_str())?;
    let op = Op::try_from(query.op.as_str())?;
    let allowed = state
        .engine
        .can_perform(op, kind, query.id, query.field.as_deref())
        .await;
    Ok(Json(PermissionAnswer { allowed }))
}

/// History of one instance. Reading the log needs `view` on `changelog`.
pub async fn changelog(
    State(state): State<ServerState>,
    Path((model, pk)): Path<(String, i64)>,
) -> Result<Json<Vec<ChangelogEntry>>, ServerError> {
    let kind = ModelKind::try_from(model.as_str())?;
    if !state
        .engine
        .can_perform(Op::View, ModelKind::Changelog, None, None)
        .await
    {
        return Err(ServerError::Engine(engine::EngineError::PermissionDenied {
            model: ModelKind::Changelog.to_string(),
            op: Op::View.to_string(),
            field: None,
        }));
    }
    let entries = state
        .engine
        .changelog_for(kind, pk)
        .await?
        .into_iter()
        .map(|entry| ChangelogEntry {
            id: entry.id,
            user_id: entry.user_id,
            ip: entry.ip,
            model: entry.model,
            instance_pk: entry.instance_pk,
            action: entry.action,
            previous: entry.previous,
            data: entry.data,
            timestamp: entry.timestamp,
        })
        .collect();
    Ok(Json(entries))
}
