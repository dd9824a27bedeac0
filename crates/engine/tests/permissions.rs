mod common;

use sea_orm::Database;

use engine::{
    Engine, EngineError, ModelKind, NewClub, NewPermission, NewTransaction, NewUser, Op,
    RequestContext, accounts::InactivityReason,
};
use migration::MigratorTrait;

use common::{as_principal, balance, club, deposit, engine, grant_all, session, user};

const OWN_ACCOUNT: &str = r#"["pk", "user.account"]"#;
const FROM_OWN_ACCOUNT: &str = r#"["filter", {"source": ["var", "user.account"]}]"#;

#[tokio::test]
async fn view_filter_follows_the_session_mask() {
    let engine = engine().await;
    let (alice, alice_account) = user(&engine, "alice").await;
    user(&engine, "bob").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![NewPermission::new("account", "view", OWN_ACCOUNT).rank(10)],
    )
    .await;

    let visible = as_principal(session(alice.id, 10), engine.list_accounts())
        .await
        .unwrap();
    assert_eq!(
        visible.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![alice_account.id]
    );

    let filter = as_principal(
        session(alice.id, 0),
        engine.filter_query(ModelKind::Account, Op::View, None),
    )
    .await;
    assert!(filter.allows_nothing());
    let hidden = as_principal(session(alice.id, 0), engine.list_accounts())
        .await
        .unwrap();
    assert!(hidden.is_empty());
}

#[tokio::test]
async fn anonymous_sees_and_writes_nothing() {
    let engine = engine().await;
    let (_, alice_account) = user(&engine, "alice").await;
    let (_, bob_account) = user(&engine, "bob").await;
    deposit(&engine, alice_account.id, 500).await;

    let anonymous = RequestContext::anonymous(Some("10.0.0.9".to_string()));
    let visible = as_principal(anonymous.clone(), engine.list_accounts())
        .await
        .unwrap();
    assert!(visible.is_empty());

    let err = as_principal(
        anonymous,
        engine.create_transaction(NewTransaction::new(alice_account.id, bob_account.id, 100)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { ref model, ref op, .. }
        if model == "transaction" && op == "add"));
    assert_eq!(balance(&engine, alice_account.id).await, 500);
}

#[tokio::test]
async fn add_rules_are_checked_against_the_candidate() {
    let engine = engine().await;
    let (alice, alice_account) = user(&engine, "alice").await;
    let (_, bob_account) = user(&engine, "bob").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    deposit(&engine, alice_account.id, 1000).await;
    deposit(&engine, bob_account.id, 1000).await;
    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![NewPermission::new("transaction", "add", FROM_OWN_ACCOUNT)],
    )
    .await;

    let txn = as_principal(
        session(alice.id, 0),
        engine.create_transaction(NewTransaction::new(alice_account.id, bob_account.id, 300)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(balance(&engine, bob_account.id).await, 1300);

    let log = engine
        .changelog_for(ModelKind::Transaction, txn.id)
        .await
        .unwrap();
    assert_eq!(log[0].user_id, Some(alice.id));
    assert_eq!(log[0].ip.as_deref(), Some("127.0.0.1"));

    let err = as_principal(
        session(alice.id, 0),
        engine.create_transaction(NewTransaction::new(bob_account.id, alice_account.id, 300)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { .. }));
    assert_eq!(balance(&engine, bob_account.id).await, 1300);
}

#[tokio::test]
async fn field_rules_cover_only_their_field() {
    let engine = engine().await;
    let (alice, alice_account) = user(&engine, "alice").await;
    let (_, bob_account) = user(&engine, "bob").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![
            NewPermission::new("account", "change", OWN_ACCOUNT).field("is_active"),
            NewPermission::new("account", "change", OWN_ACCOUNT).field("inactivity_reason"),
        ],
    )
    .await;
    let ctx = session(alice.id, 0);

    let locked = as_principal(
        ctx.clone(),
        engine.set_account_active(alice_account.id, false, InactivityReason::Manual),
    )
    .await
    .unwrap();
    assert!(!locked.is_active);

    let err = as_principal(
        ctx.clone(),
        engine.set_account_active(bob_account.id, false, InactivityReason::Manual),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { field: Some(_), .. }));

    // Renaming the club touches a field no rule covers.
    let err = as_principal(ctx, engine.rename_club(bde.id, "Bureau"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { .. }));
}

#[tokio::test]
async fn lifting_a_forced_deactivation_needs_the_reason_field() {
    let engine = engine().await;
    let (alice, alice_account) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![NewPermission::new("account", "change", OWN_ACCOUNT).field("is_active")],
    )
    .await;
    engine
        .set_account_active(alice_account.id, false, InactivityReason::Forced)
        .await
        .unwrap();

    let err = as_principal(
        session(alice.id, 0),
        engine.set_account_active(alice_account.id, true, InactivityReason::Manual),
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        EngineError::PermissionDenied {
            model: "account".to_string(),
            op: "change".to_string(),
            field: Some("inactivity_reason".to_string()),
        }
    );
    assert!(!engine.account(alice_account.id).await.unwrap().is_active);
}

#[tokio::test]
async fn superusers_bypass_only_at_full_mask() {
    let engine = engine().await;
    let (root, _) = engine
        .create_user(NewUser::new("root", "pw").superuser(true))
        .await
        .unwrap();
    user(&engine, "alice").await;
    let total = engine.list_accounts().await.unwrap().len();

    let all = as_principal(session(root.id, 42), engine.list_accounts())
        .await
        .unwrap();
    assert_eq!(all.len(), total);

    let none = as_principal(session(root.id, 41), engine.list_accounts())
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn tokens_only_hold_their_scopes() {
    let engine = engine().await;
    let (alice, alice_account) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![NewPermission::new("account", "view", OWN_ACCOUNT).rank(10)],
    )
    .await;
    let permission = engine.list_permissions().await.unwrap().remove(0);

    let scopes = as_principal(session(alice.id, 10), engine.available_scopes())
        .await
        .unwrap();
    assert_eq!(scopes, vec![format!("{}_{}", permission.id, bde.id)]);

    let scoped = engine
        .issue_token(alice.id, &scopes[0], None)
        .await
        .unwrap();
    let principal = engine.resolve_token(&scoped.token).await.unwrap().unwrap();
    let visible = as_principal(
        RequestContext::new(Some(principal), None),
        engine.list_accounts(),
    )
    .await
    .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, alice_account.id);

    let bare = engine.issue_token(alice.id, "", None).await.unwrap();
    let principal = engine.resolve_token(&bare.token).await.unwrap().unwrap();
    let visible = as_principal(
        RequestContext::new(Some(principal), None),
        engine.list_accounts(),
    )
    .await
    .unwrap();
    assert!(visible.is_empty());

    engine.revoke_token(&scoped.token).await.unwrap();
    assert!(engine.resolve_token(&scoped.token).await.unwrap().is_none());

    let err = engine.issue_token(alice.id, "999_1", None).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn memoized_results_are_dropped_on_grant() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .memoize(true)
        .build()
        .await
        .unwrap();
    let (alice, alice_account) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    let ctx = session(alice.id, 10);

    let before = as_principal(ctx.clone(), engine.list_accounts())
        .await
        .unwrap();
    assert!(before.is_empty());

    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![NewPermission::new("account", "view", OWN_ACCOUNT)],
    )
    .await;

    let after = as_principal(ctx.clone(), engine.list_accounts())
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, alice_account.id);
    let allowed = as_principal(
        ctx,
        engine.can_perform(Op::View, ModelKind::Account, Some(alice_account.id), None),
    )
    .await;
    assert!(allowed);
}

#[tokio::test]
async fn malformed_rules_are_refused() {
    let engine = engine().await;
    let err = engine
        .create_permission(NewPermission::new("wallet", "view", r#"["all"]"#))
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["invalid_model"]);
}

#[tokio::test]
async fn regex_rules_match_stored_rows() {
    let engine = engine().await;
    let (alice, alice_account) = user(&engine, "alice").await;
    let (bob, _) = user(&engine, "bob").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    grant_all(
        &engine,
        alice.id,
        bde.id,
        "Adherent",
        vec![
            NewPermission::new("user", "view", r#"["regex", ["field", "username"], "^ali"]"#),
            NewPermission::new(
                "account",
                "view",
                r#"["regex", ["field", "user.username"], "^ali"]"#,
            ),
        ],
    )
    .await;
    let ctx = session(alice.id, 0);

    assert!(
        as_principal(
            ctx.clone(),
            engine.can_perform(Op::View, ModelKind::User, Some(alice.id), None),
        )
        .await
    );
    assert!(
        !as_principal(
            ctx.clone(),
            engine.can_perform(Op::View, ModelKind::User, Some(bob.id), None),
        )
        .await
    );

    let visible = as_principal(ctx.clone(), engine.list_accounts())
        .await
        .unwrap();
    assert_eq!(
        visible.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![alice_account.id]
    );

    // The list filter and the row check agree.
    let filter = as_principal(ctx, engine.filter_query(ModelKind::Account, Op::View, None)).await;
    assert!(!filter.allows_nothing());
    assert!(!filter.predicate.uses_regex());
}
