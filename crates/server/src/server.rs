use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::{accounts, activities, context, memberships, permissions, session, transactions};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        .route("/session/mask", put(session::set_mask))
        .route("/scopes", get(session::scopes))
        .route("/tokens", post(session::issue_token))
        .route("/tokens/{token}", delete(session::revoke_token))
        .route("/accounts", get(accounts::list))
        .route("/accounts/{id}", get(accounts::get))
        .route("/accounts/{id}/active", put(accounts::set_active))
        .route("/accounts/{id}/aliases", get(accounts::aliases))
        .route("/aliases", post(accounts::alias_new))
        .route("/aliases/{id}", delete(accounts::alias_delete))
        .route("/aliases/resolve/{name}", get(accounts::resolve))
        .route(
            "/transactions",
            get(transactions::list).post(transactions::create),
        )
        .route("/transactions/{id}", get(transactions::get))
        .route("/transactions/{id}/validity", put(transactions::set_validity))
        .route(
            "/templates/{id}/transactions",
            post(transactions::from_template),
        )
        .route("/memberships", post(memberships::create))
        .route("/memberships/{id}/renew", post(memberships::renew))
        .route(
            "/credits/{id}",
            get(memberships::credit).delete(memberships::drop_credit),
        )
        .route("/credits/{id}/update", post(memberships::update_credit))
        .route("/credits/{id}/validate", post(memberships::validate_credit))
        .route(
            "/credits/{id}/invalidate",
            post(memberships::invalidate_credit),
        )
        .route("/permissions/check", get(permissions::check))
        .route("/changelog/{model}/{pk}", get(permissions::changelog))
        .route("/activities/{id}/guests", post(activities::invite))
        .route("/guests/{id}/entry", post(activities::entry))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            context::request_context,
        ))
        .with_state(state)
}

pub async fn run(engine: Arc<Engine>, bind: &str) {
    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {bind}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(engine, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState { engine };

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

pub fn spawn_with_listener(
    engine: Arc<Engine>,
    listener: tokio::net::TcpListener,
) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
