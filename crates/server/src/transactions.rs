//! Transactions API endpoints

use api_types::transaction::{
    TemplateTransactionNew, TransactionCreated, TransactionKind as ApiKind, TransactionList,
    TransactionListResponse, TransactionNew, TransactionView, ValidityUpdate,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use engine::{NewTransaction, TransactionListFilter, TransactionPayload, transactions};

use crate::{ServerError, server::ServerState};

fn map_kind(kind: transactions::TransactionKind) -> ApiKind {
    match kind {
        transactions::TransactionKind::Plain => ApiKind::Plain,
        transactions::TransactionKind::Template => ApiKind::Template,
        transactions::TransactionKind::Membership => ApiKind::Membership,
        transactions::TransactionKind::Special => ApiKind::Special,
        transactions::TransactionKind::Guest => ApiKind::Guest,
    }
}

fn transaction_view(tx: transactions::Model) -> Result<TransactionView, ServerError> {
    Ok(TransactionView {
        id: tx.id,
        kind: map_kind(tx.kind()?),
        source: tx.source_id,
        destination: tx.destination_id,
        total: tx.total(),
        source_alias: tx.source_alias,
        destination_alias: tx.destination_alias,
        quantity: tx.quantity,
        amount: tx.amount,
        reason: tx.reason,
        valid: tx.valid,
        invalidity_reason: tx.invalidity_reason,
        created_at: tx.created_at,
    })
}

fn created(
    tx: Option<transactions::Model>,
) -> Result<(StatusCode, Json<TransactionCreated>), ServerError> {
    let status = if tx.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(TransactionCreated {
            transaction: tx.map(transaction_view).transpose()?,
        }),
    ))
}

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<TransactionNew>,
) -> Result<(StatusCode, Json<TransactionCreated>), ServerError> {
    let mut cmd = NewTransaction::new(payload.source, payload.destination, payload.amount)
        .quantity(payload.quantity.unwrap_or(1))
        .reason(payload.reason);
    if let Some(special) = payload.special {
        cmd = cmd.payload(TransactionPayload::Special {
            last_name: special.last_name,
            first_name: special.first_name,
            bank: special.bank,
        });
    }
    let tx = state.engine.create_transaction(cmd).await?;
    created(tx)
}

/// Buy through a button: destination and unit amount come from the template.
pub async fn from_template(
    State(state): State<ServerState>,
    Path(template_id): Path<i64>,
    Json(payload): Json<TemplateTransactionNew>,
) -> Result<(StatusCode, Json<TransactionCreated>), ServerError> {
    let tx = state
        .engine
        .create_template_transaction(template_id, payload.source, payload.quantity.unwrap_or(1))
        .await?;
    created(tx)
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<TransactionList>,
) -> Result<Json<TransactionListResponse>, ServerError> {
    let filter = TransactionListFilter {
        account: query.account,
        valid: query.valid,
        from: query.from,
        to: query.to,
        limit: Some(query.limit.unwrap_or(50)),
    };
    let transactions = state
        .engine
        .list_transactions(filter)
        .await?
        .into_iter()
        .map(transaction_view)
        .collect::<Result<_, _>>()?;
    Ok(Json(TransactionListResponse { transactions }))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> Result<Json<TransactionView>, ServerError> {
    let tx = state.engine.transaction(id).await?;
    Ok(Json(transaction_view(tx)?))
}

/// Invalidate or revalidate a transaction. Balances move accordingly.
pub async fn set_validity(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<ValidityUpdate>,
) -> Result<Json<TransactionView>, ServerError> {
    let tx = state
        .engine
        .set_validity(id, payload.valid, payload.reason)
        .await?;
    Ok(Json(transaction_view(tx)?))
}
