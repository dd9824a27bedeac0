use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use migration::MigratorTrait;
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::{Engine, NewPermission, NewTransaction, NewUser, TransactionPayload};
use server::{ServerState, router};

struct Fixture {
    app: Router,
    engine: Arc<Engine>,
    alice: i64,
    alice_account: i64,
    bob_account: i64,
}

async fn fixture() -> Fixture {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .memoize(false)
        .build()
        .await
        .unwrap();

    let (alice, alice_account) = engine
        .create_user(NewUser::new("alice", "secret"))
        .await
        .unwrap();
    let (_, bob_account) = engine
        .create_user(NewUser::new("bob", "secret"))
        .await
        .unwrap();
    let cash = engine.special_account("cash").await.unwrap();
    engine
        .create_transaction(NewTransaction::new(cash.id, alice_account.id, 1000).payload(
            TransactionPayload::Special {
                last_name: "Doe".to_string(),
                first_name: "Alice".to_string(),
                bank: String::new(),
            },
        ))
        .await
        .unwrap();

    let (bde, _) = engine
        .create_club(engine::NewClub::new("BDE"))
        .await
        .unwrap();
    let role = engine.create_role("Adherent", None).await.unwrap();
    for permission in [
        NewPermission::new("account", "view", r#"["pk", "user.account"]"#),
        NewPermission::new(
            "transaction",
            "add",
            r#"["filter", {"source": ["var", "user.account"]}]"#,
        ),
    ] {
        let permission = engine.create_permission(permission).await.unwrap();
        engine.grant(role.id, permission.id).await.unwrap();
    }
    let membership = engine
        .create_membership(engine::NewMembership::new(alice.id, bde.id))
        .await
        .unwrap();
    engine.assign_role(membership.id, role.id).await.unwrap();

    let engine = Arc::new(engine);
    Fixture {
        app: router(ServerState {
            engine: engine.clone(),
        }),
        engine,
        alice: alice.id,
        alice_account: alice_account.id,
        bob_account: bob_account.id,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        post("/login")
            .body(Body::from(
                json!({"username": "alice", "password": "secret"}).to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["key"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let f = fixture().await;
    let (status, _) = send(
        &f.app,
        post("/login")
            .body(Body::from(
                json!({"username": "alice", "password": "nope"}).to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_carries_the_principal() {
    let f = fixture().await;
    let key = login(&f.app).await;

    let (status, body) = send(
        &f.app,
        Request::builder()
            .uri("/accounts")
            .header(header::COOKIE, format!("note_session={key}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let accounts = body.as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["display"], "alice");
    assert_eq!(accounts[0]["balance"], 1000);

    let transfer = json!({
        "source": f.alice_account,
        "destination": f.bob_account,
        "amount": 250,
        "reason": "pizza",
    });
    let (status, body) = send(
        &f.app,
        post("/transactions")
            .header(header::COOKIE, format!("note_session={key}"))
            .header("x-real-ip", "192.0.2.7")
            .body(Body::from(transfer.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["transaction"]["id"].as_i64().unwrap();

    let log = f
        .engine
        .changelog_for(engine::ModelKind::Transaction, id)
        .await
        .unwrap();
    assert_eq!(log[0].user_id, Some(f.alice));
    assert_eq!(log[0].ip.as_deref(), Some("192.0.2.7"));
}

#[tokio::test]
async fn anonymous_writes_are_forbidden() {
    let f = fixture().await;
    let body = json!({"source": f.alice_account, "destination": f.bob_account, "amount": 10});
    let (status, body) = send(
        &f.app,
        post("/transactions")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("transaction"));
}

#[tokio::test]
async fn unknown_bearer_token_is_unauthorized() {
    let f = fixture().await;
    let (status, _) = send(
        &f.app,
        Request::builder()
            .uri("/accounts")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_errors_list_violations() {
    let f = fixture().await;
    let key = login(&f.app).await;
    let body = json!({
        "source": f.alice_account,
        "destination": f.bob_account,
        "amount": -3,
        "quantity": 0,
    });
    let (status, body) = send(
        &f.app,
        post("/transactions")
            .header(header::COOKIE, format!("note_session={key}"))
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["violations"].as_array().unwrap().len(), 2);
}
