mod common;

use engine::{
    EngineError, ModelKind, NewTransaction, TransactionListFilter, TransactionPayload,
    accounts::InactivityReason, changelogs::Action,
};

use common::{balance, deposit, engine, user};

async fn edits_of(engine: &engine::Engine, kind: ModelKind, pk: i64) -> usize {
    engine
        .changelog_for(kind, pk)
        .await
        .unwrap()
        .iter()
        .filter(|entry| entry.action == Action::Edit.as_str())
        .count()
}

#[tokio::test]
async fn transfer_moves_quantity_times_amount() {
    let engine = engine().await;
    let (_, u1) = user(&engine, "alice").await;
    let (_, u2) = user(&engine, "bob").await;
    deposit(&engine, u1.id, 1000).await;
    deposit(&engine, u2.id, 500).await;
    let u1_edits = edits_of(&engine, ModelKind::Account, u1.id).await;
    let u2_edits = edits_of(&engine, ModelKind::Account, u2.id).await;

    let txn = engine
        .create_transaction(NewTransaction::new(u1.id, u2.id, 150).quantity(2).reason("pizza"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(balance(&engine, u1.id).await, 700);
    assert_eq!(balance(&engine, u2.id).await, 800);
    assert_eq!(txn.source_alias, "alice");
    assert_eq!(txn.destination_alias, "bob");

    let created = engine
        .changelog_for(ModelKind::Transaction, txn.id)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].action, Action::Create.as_str());
    assert_eq!(edits_of(&engine, ModelKind::Account, u1.id).await, u1_edits + 1);
    assert_eq!(edits_of(&engine, ModelKind::Account, u2.id).await, u2_edits + 1);
}

#[tokio::test]
async fn invalidate_then_revalidate_restores_balances() {
    let engine = engine().await;
    let (_, u1) = user(&engine, "alice").await;
    let (_, u2) = user(&engine, "bob").await;
    deposit(&engine, u1.id, 1000).await;
    deposit(&engine, u2.id, 500).await;
    let txn = engine
        .create_transaction(NewTransaction::new(u1.id, u2.id, 150).quantity(2))
        .await
        .unwrap()
        .unwrap();

    let invalid = engine.set_validity(txn.id, false, "error").await.unwrap();
    assert!(!invalid.valid);
    assert_eq!(invalid.invalidity_reason, "error");
    assert_eq!(balance(&engine, u1.id).await, 1000);
    assert_eq!(balance(&engine, u2.id).await, 500);

    // Setting the same validity again changes nothing.
    engine.set_validity(txn.id, false, "still wrong").await.unwrap();
    assert_eq!(balance(&engine, u1.id).await, 1000);

    let valid = engine.set_validity(txn.id, true, "").await.unwrap();
    assert!(valid.valid);
    assert!(valid.invalidity_reason.is_empty());
    assert_eq!(balance(&engine, u1.id).await, 700);
    assert_eq!(balance(&engine, u2.id).await, 800);
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}

#[tokio::test]
async fn balance_bounds_reject_overflowing_credit() {
    let engine = engine().await;
    let (_, u) = user(&engine, "alice").await;
    deposit(&engine, u.id, 2_147_483_000).await;

    let cash = engine.special_account("cash").await.unwrap();
    let err = engine
        .create_transaction(
            NewTransaction::new(cash.id, u.id, 1000).payload(TransactionPayload::Special {
                last_name: "Doe".to_string(),
                first_name: "Jean".to_string(),
                bank: String::new(),
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::BalanceOutOfRange { account, .. } if account == u.id));
    assert_eq!(balance(&engine, u.id).await, 2_147_483_000);
}

#[tokio::test]
async fn self_transfer_is_ignored() {
    let engine = engine().await;
    let (_, u) = user(&engine, "alice").await;
    let created = engine
        .create_transaction(NewTransaction::new(u.id, u.id, 100))
        .await
        .unwrap();
    assert!(created.is_none());
    let listed = engine
        .list_transactions(TransactionListFilter {
            account: Some(u.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn invalid_amounts_are_reported_together() {
    let engine = engine().await;
    let (_, u1) = user(&engine, "alice").await;
    let (_, u2) = user(&engine, "bob").await;
    let err = engine
        .create_transaction(
            NewTransaction::new(u1.id, u2.id, -5)
                .quantity(0)
                .reason("x".repeat(300)),
        )
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert_eq!(
        errors.codes(),
        vec!["invalid_quantity", "invalid_amount", "too_long"]
    );
}

#[tokio::test]
async fn inactive_endpoint_blocks_transactions() {
    let engine = engine().await;
    let (_, u1) = user(&engine, "alice").await;
    let (_, u2) = user(&engine, "bob").await;
    deposit(&engine, u1.id, 1000).await;
    engine
        .set_account_active(u2.id, false, InactivityReason::Manual)
        .await
        .unwrap();

    let err = engine
        .create_transaction(NewTransaction::new(u1.id, u2.id, 100))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InactiveEndpoint { account: u2.id });
    assert_eq!(balance(&engine, u1.id).await, 1000);
}

#[tokio::test]
async fn special_transactions_need_exactly_one_special_endpoint() {
    let engine = engine().await;
    let (_, u1) = user(&engine, "alice").await;
    let (_, u2) = user(&engine, "bob").await;
    let err = engine
        .create_transaction(
            NewTransaction::new(u1.id, u2.id, 100).payload(TransactionPayload::Special {
                last_name: "Doe".to_string(),
                first_name: "Jean".to_string(),
                bank: String::new(),
            }),
        )
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["special_endpoint"]);
}

#[tokio::test]
async fn negative_crossing_stamps_last_negative() {
    let engine = engine().await;
    let (_, u1) = user(&engine, "alice").await;
    let (_, u2) = user(&engine, "bob").await;
    deposit(&engine, u1.id, 100).await;
    assert!(engine.account(u1.id).await.unwrap().last_negative.is_none());

    engine
        .create_transaction(NewTransaction::new(u1.id, u2.id, 250))
        .await
        .unwrap();
    let account = engine.account(u1.id).await.unwrap();
    assert_eq!(account.balance, -150);
    assert!(account.last_negative.is_some());
}

#[tokio::test]
async fn transactions_are_never_deleted() {
    let engine = engine().await;
    let (_, u) = user(&engine, "alice").await;
    let txn = deposit(&engine, u.id, 100).await;
    assert!(matches!(
        engine.delete_transaction(txn.id).await,
        Err(EngineError::PermissionDenied { .. })
    ));
    assert!(matches!(
        engine.delete_changelog(1).await,
        Err(EngineError::PermissionDenied { .. })
    ));
    assert_eq!(engine.transaction(txn.id).await.unwrap().id, txn.id);
}

#[tokio::test]
async fn templates_fill_destination_and_amount() {
    let engine = engine().await;
    let (_, u) = user(&engine, "alice").await;
    let (_, bar) = common::club(&engine, engine::NewClub::new("Kfet")).await;
    deposit(&engine, u.id, 1000).await;
    let category = engine.create_template_category("Soft").await.unwrap();
    let template = engine
        .create_template(engine::NewTemplate::new("Coca", bar.id, 80, category.id))
        .await
        .unwrap();

    let txn = engine
        .create_template_transaction(template.id, u.id, 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.destination_id, bar.id);
    assert_eq!(txn.total(), 240);
    assert_eq!(txn.category_id, Some(category.id));
    assert_eq!(balance(&engine, u.id).await, 760);
    assert_eq!(balance(&engine, bar.id).await, 240);

    // Templates must credit a club.
    let (_, other) = user(&engine, "bob").await;
    let err = engine
        .create_template(engine::NewTemplate::new("Gift", other.id, 10, category.id))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn every_tracked_write_is_logged() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;

    let user_log = engine.changelog_for(ModelKind::User, alice.id).await.unwrap();
    assert_eq!(user_log.len(), 1);
    assert_eq!(user_log[0].action, Action::Create.as_str());
    assert!(user_log[0].previous.is_none());
    assert!(user_log[0].user_id.is_none());

    let renamed = engine.rename_user(alice.id, "alicia").await.unwrap();
    assert_eq!(renamed.username, "alicia");
    let user_log = engine.changelog_for(ModelKind::User, alice.id).await.unwrap();
    assert_eq!(user_log.len(), 2);
    let edit = &user_log[1];
    assert_eq!(edit.action, Action::Edit.as_str());
    let data = edit.data.as_ref().unwrap();
    assert_eq!(data["username"], "alicia");
    assert!(data.get("email").is_none());
    assert_eq!(edit.previous.as_ref().unwrap()["username"], "alice");

    // The main alias follows the rename.
    assert_eq!(engine.resolve_alias("alicia").await.unwrap().id, account.id);
}
