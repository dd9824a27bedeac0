#![allow(dead_code)]

use sea_orm::Database;

use engine::{
    Engine, NewClub, NewPermission, NewTransaction, NewUser, Principal, RequestContext,
    TransactionPayload, accounts, clubs, request, transactions, users,
};
use migration::MigratorTrait;

pub async fn engine() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::builder()
        .database(db)
        .memoize(false)
        .build()
        .await
        .unwrap()
}

pub async fn user(engine: &Engine, username: &str) -> (users::Model, accounts::Model) {
    engine
        .create_user(NewUser::new(username, "password").names("Jean", username))
        .await
        .unwrap()
}

pub async fn club(engine: &Engine, cmd: NewClub) -> (clubs::Model, accounts::Model) {
    engine.create_club(cmd).await.unwrap()
}

/// Credit `account` with `amount` from the cash special account.
pub async fn deposit(engine: &Engine, account: i64, amount: i64) -> transactions::Model {
    let cash = engine.special_account("cash").await.unwrap();
    engine
        .create_transaction(
            NewTransaction::new(cash.id, account, amount)
                .reason("deposit")
                .payload(TransactionPayload::Special {
                    last_name: "Doe".to_string(),
                    first_name: "Jean".to_string(),
                    bank: "Cash".to_string(),
                }),
        )
        .await
        .unwrap()
        .unwrap()
}

pub async fn balance(engine: &Engine, account: i64) -> i64 {
    engine.account(account).await.unwrap().balance
}

/// A principal holding `permissions` through one role in `club_id`.
pub async fn grant_all(
    engine: &Engine,
    user_id: i64,
    club_id: i64,
    role: &str,
    permissions: Vec<NewPermission>,
) {
    let role = engine.create_role(role, None).await.unwrap();
    for permission in permissions {
        let permission = engine.create_permission(permission).await.unwrap();
        engine.grant(role.id, permission.id).await.unwrap();
    }
    let memberships = engine.list_memberships(user_id).await.unwrap();
    let membership = match memberships.iter().find(|m| m.club_id == club_id) {
        Some(membership) => membership.clone(),
        None => engine
            .create_membership(engine::NewMembership::new(user_id, club_id))
            .await
            .unwrap(),
    };
    engine.assign_role(membership.id, role.id).await.unwrap();
}

pub fn session(user_id: i64, mask: i64) -> RequestContext {
    RequestContext::new(
        Some(Principal::session(user_id, format!("session-{user_id}-{mask}"), mask)),
        Some("127.0.0.1".to_string()),
    )
}

pub async fn as_principal<F: std::future::Future>(ctx: RequestContext, fut: F) -> F::Output {
    request::scope(ctx, fut).await
}
