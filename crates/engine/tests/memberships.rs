mod common;

use chrono::{Days, NaiveDate, Utc};
use engine::{
    CreditState, EngineError, NewClub, NewMembership, NewUser, RenewOptions,
    TransactionListFilter, transactions::TransactionKind,
};

use common::{balance, club, deposit, engine, user};

async fn balances(engine: &engine::Engine, ids: [i64; 3]) -> [i64; 3] {
    [
        balance(engine, ids[0]).await,
        balance(engine, ids[1]).await,
        balance(engine, ids[2]).await,
    ]
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn cascade_creates_parent_membership_and_both_fees() {
    let engine = engine().await;
    let (alice, user_account) = user(&engine, "alice").await;
    deposit(&engine, user_account.id, 10_000).await;
    let (foo, foo_account) = club(&engine, NewClub::new("Foo").fees(500, 500)).await;
    let (bar, bar_account) =
        club(&engine, NewClub::new("Bar").parent(foo.id).fees(300, 300)).await;

    let membership = engine
        .create_membership(NewMembership::new(alice.id, bar.id).cascade(true))
        .await
        .unwrap();
    assert_eq!(membership.club_id, bar.id);
    assert_eq!(membership.fee, 300);

    let memberships = engine.list_memberships(alice.id).await.unwrap();
    let clubs: Vec<i64> = memberships.iter().map(|m| m.club_id).collect();
    assert!(clubs.contains(&foo.id) && clubs.contains(&bar.id));

    assert_eq!(balance(&engine, user_account.id).await, 10_000 - 800);
    assert_eq!(balance(&engine, foo_account.id).await, 500);
    assert_eq!(balance(&engine, bar_account.id).await, 300);

    let fees: Vec<_> = engine
        .list_transactions(TransactionListFilter {
            account: Some(user_account.id),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.kind().unwrap() == TransactionKind::Membership)
        .collect();
    assert_eq!(fees.len(), 2);
}

#[tokio::test]
async fn missing_parent_without_cascade_rolls_back() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;
    let (foo, _) = club(&engine, NewClub::new("Foo").fees(500, 500)).await;
    let (bar, _) = club(&engine, NewClub::new("Bar").parent(foo.id).fees(300, 300)).await;

    let err = engine
        .create_membership(NewMembership::new(alice.id, bar.id))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::MissingParentMembership { club: bar.id });
    assert!(engine.list_memberships(alice.id).await.unwrap().is_empty());
    assert_eq!(balance(&engine, account.id).await, 0);
}

#[tokio::test]
async fn paid_students_pay_the_reduced_fee() {
    let engine = engine().await;
    let (paid, paid_account) = engine
        .create_user(NewUser::new("paid", "pw").paid(true))
        .await
        .unwrap();
    let (unpaid, unpaid_account) = user(&engine, "unpaid").await;
    let (bde, _) = club(&engine, NewClub::new("BDE").fees(1500, 3000)).await;

    engine
        .create_membership(NewMembership::new(paid.id, bde.id))
        .await
        .unwrap();
    engine
        .create_membership(NewMembership::new(unpaid.id, bde.id))
        .await
        .unwrap();
    assert_eq!(balance(&engine, paid_account.id).await, -1500);
    assert_eq!(balance(&engine, unpaid_account.id).await, -3000);
}

#[tokio::test]
async fn overlapping_memberships_are_rejected() {
    let engine = engine().await;
    let (alice, _) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE").duration_days(365)).await;
    engine
        .create_membership(NewMembership::new(alice.id, bde.id).starting(today()))
        .await
        .unwrap();

    let err = engine
        .create_membership(
            NewMembership::new(alice.id, bde.id)
                .starting(today().checked_add_days(Days::new(10)).unwrap()),
        )
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["overlap"]);
}

#[tokio::test]
async fn renewal_starts_after_the_previous_membership() {
    let engine = engine().await;
    let (alice, _) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE").duration_days(30)).await;
    let role = engine.create_role("Member", Some(bde.id)).await.unwrap();
    let first = engine
        .create_membership(
            NewMembership::new(alice.id, bde.id)
                .starting(today())
                .roles(vec![role.id]),
        )
        .await
        .unwrap();

    let renewed = engine
        .renew_membership(first.id, RenewOptions::default())
        .await
        .unwrap();
    assert_eq!(renewed.date_start, first.date_end.succ_opt().unwrap());
    assert_eq!(
        engine.roles_in_club(alice.id, bde.id).await.unwrap()[0].id,
        role.id
    );
}

#[tokio::test]
async fn roles_must_belong_to_the_club() {
    let engine = engine().await;
    let (alice, _) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    let (kfet, _) = club(&engine, NewClub::new("Kfet")).await;
    let role = engine.create_role("Barman", Some(kfet.id)).await.unwrap();

    let err = engine
        .create_membership(NewMembership::new(alice.id, bde.id).roles(vec![role.id, 999]))
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["role_scope", "unknown_role"]);
}

#[tokio::test]
async fn partner_credit_validation_balances_out() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;
    let (bde, bde_account) = club(&engine, NewClub::new("BDE").fees(1000, 1000)).await;
    let (kfet, kfet_account) =
        club(&engine, NewClub::new("Kfet").parent(bde.id).fees(500, 500)).await;

    engine
        .create_membership(
            NewMembership::new(alice.id, kfet.id)
                .cascade(true)
                .partner_credit(true),
        )
        .await
        .unwrap();
    assert_eq!(balance(&engine, account.id).await, 0);

    let credit = engine.credit_for_user(alice.id).await.unwrap().unwrap();
    let members = engine.credit_transactions(credit.id).await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|t| !t.valid));
    assert_eq!(engine.credit_state(credit.id).await.unwrap(), CreditState::Open);

    let credit = engine.update_credit(credit.id).await.unwrap();
    let aggregate = engine
        .transaction(credit.credit_transaction_id.unwrap())
        .await
        .unwrap();
    assert_eq!(aggregate.total(), 1500);
    assert!(!aggregate.valid);
    assert_eq!(aggregate.bank.as_deref(), Some(engine.partner_bank()));

    engine.validate_credit(credit.id).await.unwrap();
    assert_eq!(
        engine.credit_state(credit.id).await.unwrap(),
        CreditState::Validated
    );
    assert!(
        engine
            .credit_transactions(credit.id)
            .await
            .unwrap()
            .iter()
            .all(|t| t.valid)
    );
    assert_eq!(balance(&engine, account.id).await, 0);
    assert_eq!(balance(&engine, bde_account.id).await, 1000);
    assert_eq!(balance(&engine, kfet_account.id).await, 500);
    let transfer = engine.special_account("transfer").await.unwrap();
    assert_eq!(balance(&engine, transfer.id).await, -1500);
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}

#[tokio::test]
async fn dropping_a_credit_needs_funds() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE").fees(1000, 1000)).await;
    engine
        .create_membership(NewMembership::new(alice.id, bde.id).partner_credit(true))
        .await
        .unwrap();
    let credit = engine.credit_for_user(alice.id).await.unwrap().unwrap();

    let err = engine.drop_credit(credit.id).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientFunds {
            user: alice.id,
            required: 1000,
            available: 0,
        }
    );
    assert!(engine.credit_for_user(alice.id).await.unwrap().is_some());

    deposit(&engine, account.id, 1200).await;
    engine.drop_credit(credit.id).await.unwrap();
    assert!(engine.credit_for_user(alice.id).await.unwrap().is_none());
    assert_eq!(balance(&engine, account.id).await, 200);
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}

#[tokio::test]
async fn revalidating_a_credit_restores_the_validated_balances() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;
    let (bde, bde_account) = club(&engine, NewClub::new("BDE").fees(1000, 1000)).await;
    engine
        .create_membership(NewMembership::new(alice.id, bde.id).partner_credit(true))
        .await
        .unwrap();
    let credit = engine.credit_for_user(alice.id).await.unwrap().unwrap();
    let transfer = engine.special_account("transfer").await.unwrap();

    let ids = [account.id, bde_account.id, transfer.id];

    engine.validate_credit(credit.id).await.unwrap();
    let validated = balances(&engine, ids).await;
    assert_eq!(validated, [0, 1000, -1000]);

    engine.invalidate_credit(credit.id).await.unwrap();
    assert_eq!(engine.credit_state(credit.id).await.unwrap(), CreditState::Open);
    assert_eq!(balances(&engine, ids).await, [0, 0, 0]);

    let credit = engine.validate_credit(credit.id).await.unwrap();
    assert_eq!(balances(&engine, ids).await, validated);
    assert_eq!(
        engine.credit_state(credit.id).await.unwrap(),
        CreditState::Validated
    );
    let aggregate = engine
        .transaction(credit.credit_transaction_id.unwrap())
        .await
        .unwrap();
    let members = engine.credit_transactions(credit.id).await.unwrap();
    assert_eq!(aggregate.total(), members.iter().map(|t| t.total()).sum::<i64>());
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}

#[tokio::test]
async fn memberships_after_validation_are_funded_by_the_credit() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;
    let (bde, bde_account) = club(&engine, NewClub::new("BDE").fees(1000, 1000)).await;
    let (art, art_account) = club(&engine, NewClub::new("Art").fees(500, 500)).await;
    engine
        .create_membership(NewMembership::new(alice.id, bde.id).partner_credit(true))
        .await
        .unwrap();
    let credit = engine.credit_for_user(alice.id).await.unwrap().unwrap();
    engine.validate_credit(credit.id).await.unwrap();

    engine
        .create_membership(NewMembership::new(alice.id, art.id).partner_credit(true))
        .await
        .unwrap();

    let credit = engine.credit_for_user(alice.id).await.unwrap().unwrap();
    assert_eq!(
        engine.credit_state(credit.id).await.unwrap(),
        CreditState::Validated
    );
    let members = engine.credit_transactions(credit.id).await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|t| t.valid));
    let aggregate = engine
        .transaction(credit.credit_transaction_id.unwrap())
        .await
        .unwrap();
    assert!(aggregate.valid);
    assert_eq!(aggregate.total(), 1500);

    assert_eq!(balance(&engine, account.id).await, 0);
    assert_eq!(balance(&engine, bde_account.id).await, 1000);
    assert_eq!(balance(&engine, art_account.id).await, 500);
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}

#[tokio::test]
async fn fees_flow_whichever_account_is_older() {
    let engine = engine().await;
    let (bde, bde_account) = club(&engine, NewClub::new("BDE").fees(700, 700)).await;
    let (alice, account) = user(&engine, "alice").await;
    assert!(bde_account.id < account.id);
    deposit(&engine, account.id, 1000).await;

    engine
        .create_membership(NewMembership::new(alice.id, bde.id))
        .await
        .unwrap();
    assert_eq!(balance(&engine, account.id).await, 300);
    assert_eq!(balance(&engine, bde_account.id).await, 700);
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}
