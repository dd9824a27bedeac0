mod common;

use chrono::{Duration, Utc};
use engine::{EngineError, NewActivity, NewClub, transactions::TransactionKind};

use common::{balance, club, deposit, engine, user};

fn party(organizer: i64, fee: i64, days_from_now: i64) -> NewActivity {
    let start = Utc::now() + Duration::days(days_from_now);
    NewActivity {
        name: format!("Soirée J{days_from_now}"),
        description: String::new(),
        organizer_id: organizer,
        attendees_club_id: organizer,
        date_start: start,
        date_end: start + Duration::hours(6),
        guest_entry_fee: fee,
    }
}

fn codes(err: EngineError) -> Vec<String> {
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    errors.codes().into_iter().map(str::to_string).collect()
}

#[tokio::test]
async fn only_validated_activities_take_guests() {
    let engine = engine().await;
    let (alice, _) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    let activity = engine.create_activity(party(bde.id, 500, 1)).await.unwrap();
    assert!(!activity.valid && !activity.open);

    let err = engine
        .invite_guest(activity.id, alice.id, "Marie", "Curie")
        .await
        .unwrap_err();
    assert_eq!(codes(err), vec!["not_valid"]);

    let err = engine.set_activity_open(activity.id, true).await.unwrap_err();
    assert_eq!(codes(err), vec!["not_valid"]);
}

#[tokio::test]
async fn activities_end_after_they_start() {
    let engine = engine().await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    let mut cmd = party(bde.id, -1, 1);
    cmd.date_end = cmd.date_start;
    let err = engine.create_activity(cmd).await.unwrap_err();
    assert_eq!(codes(err), vec!["invalid_window", "invalid_amount"]);
}

#[tokio::test]
async fn invitation_limits_are_enforced() {
    let engine = engine().await;
    let (alice, _) = user(&engine, "alice").await;
    let (bob, _) = user(&engine, "bob").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;

    let first = engine.create_activity(party(bde.id, 0, 1)).await.unwrap();
    engine.set_activity_valid(first.id, true).await.unwrap();
    for name in ["Ada", "Grace", "Hedy"] {
        engine
            .invite_guest(first.id, alice.id, name, "Lovelace")
            .await
            .unwrap();
    }
    let err = engine
        .invite_guest(first.id, alice.id, "Emmy", "Noether")
        .await
        .unwrap_err();
    assert_eq!(codes(err), vec!["too_many_invitations"]);

    // The same person cannot be invited twice to one activity.
    let err = engine
        .invite_guest(first.id, bob.id, "Ada", "Lovelace")
        .await
        .unwrap_err();
    assert_eq!(codes(err), vec!["already_invited"]);

    // Five invitations a year per guest, whoever invites them.
    for day in 2..=5 {
        let activity = engine.create_activity(party(bde.id, 0, day)).await.unwrap();
        engine.set_activity_valid(activity.id, true).await.unwrap();
        engine
            .invite_guest(activity.id, bob.id, "Grace", "Lovelace")
            .await
            .unwrap();
    }
    let sixth = engine.create_activity(party(bde.id, 0, 6)).await.unwrap();
    engine.set_activity_valid(sixth.id, true).await.unwrap();
    let err = engine
        .invite_guest(sixth.id, bob.id, "Grace", "Lovelace")
        .await
        .unwrap_err();
    assert_eq!(codes(err), vec!["too_many_invitations"]);
}

#[tokio::test]
async fn guest_entry_charges_the_inviter_once() {
    let engine = engine().await;
    let (alice, account) = user(&engine, "alice").await;
    let (bde, _) = club(&engine, NewClub::new("BDE")).await;
    deposit(&engine, account.id, 1000).await;
    let activity = engine.create_activity(party(bde.id, 500, 0)).await.unwrap();
    engine.set_activity_valid(activity.id, true).await.unwrap();
    let guest = engine
        .invite_guest(activity.id, alice.id, "Marie", "Curie")
        .await
        .unwrap();

    let err = engine.guest_entry(guest.id).await.unwrap_err();
    assert_eq!(codes(err), vec!["closed"]);

    engine.set_activity_open(activity.id, true).await.unwrap();
    let (entered, transaction) = engine.guest_entry(guest.id).await.unwrap();
    assert!(entered.entry_time.is_some());
    let transaction = transaction.unwrap();
    assert_eq!(transaction.kind().unwrap(), TransactionKind::Guest);
    assert_eq!(transaction.guest_id, Some(guest.id));
    assert_eq!(transaction.total(), 500);
    assert_eq!(transaction.source_id, account.id);
    assert_eq!(transaction.destination_id, account.id);
    assert_eq!(balance(&engine, account.id).await, 1000);

    let err = engine.guest_entry(guest.id).await.unwrap_err();
    assert_eq!(codes(err), vec!["already_entered"]);
    assert!(engine.audit_conservation().await.unwrap().is_empty());
}
