mod common;

use chrono::NaiveDate;
use engine::{EngineError, NewInvoice, NewTransaction, ProductLine, TransactionPayload};

use common::{deposit, engine, user};

fn invoice(products: Vec<(&str, i64, i64)>) -> NewInvoice {
    NewInvoice {
        bde: "Saperlistpopette".to_string(),
        object: "Soirée".to_string(),
        description: "Location de matériel".to_string(),
        name: "Asso Voisine".to_string(),
        address: "1 rue de la Paix".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
        acquitted: false,
        products: products
            .into_iter()
            .map(|(designation, quantity, amount)| ProductLine {
                designation: designation.to_string(),
                quantity,
                amount,
            })
            .collect(),
    }
}

#[tokio::test]
async fn locked_invoices_only_change_through_force_update() {
    let engine = engine().await;
    let (created, products) = engine
        .create_invoice(invoice(vec![("Sono", 1, 5000), ("Fût", 2, 12000)]))
        .await
        .unwrap();
    assert_eq!(products.len(), 2);
    assert!(!created.locked);

    let (_, products) = engine
        .update_invoice(created.id, invoice(vec![("Sono", 1, 4500)]))
        .await
        .unwrap();
    assert_eq!(products.len(), 1);

    engine.lock_invoice(created.id).await.unwrap();
    let err = engine
        .update_invoice(created.id, invoice(vec![("Sono", 1, 1)]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Locked {
            entity: "invoice".to_string()
        }
    );
    assert_eq!(
        engine.invoice_products(created.id).await.unwrap()[0].amount,
        4500
    );

    let (forced, products) = engine
        .force_update_invoice(created.id, invoice(vec![("Sono", 1, 4000)]))
        .await
        .unwrap();
    assert!(forced.locked);
    assert_eq!(products[0].amount, 4000);

    let unlocked = engine.unlock_invoice(created.id).await.unwrap();
    assert!(!unlocked.locked);
    engine
        .update_invoice(created.id, invoice(vec![("Sono", 1, 3900)]))
        .await
        .unwrap();
}

#[tokio::test]
async fn invoice_lines_are_validated() {
    let engine = engine().await;
    let err = engine
        .create_invoice(invoice(vec![(" ", 0, 100)]))
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["required", "invalid_quantity"]);
}

#[tokio::test]
async fn remittances_collect_matching_special_transactions() {
    let engine = engine().await;
    let (_, account) = user(&engine, "alice").await;
    let check = engine.special_account("check").await.unwrap();
    let remittance_type = engine.create_remittance_type(check.id).await.unwrap();
    let remittance = engine
        .open_remittance(remittance_type.id, "Septembre")
        .await
        .unwrap();

    let by_check = engine
        .create_transaction(
            NewTransaction::new(check.id, account.id, 2000).payload(TransactionPayload::Special {
                last_name: "Doe".to_string(),
                first_name: "Jean".to_string(),
                bank: "Banque Populaire".to_string(),
            }),
        )
        .await
        .unwrap()
        .unwrap();
    let by_cash = deposit(&engine, account.id, 300).await;

    engine
        .link_special_transaction(remittance.id, by_check.id)
        .await
        .unwrap();
    assert_eq!(engine.remittance_amount(remittance.id).await.unwrap(), 2000);

    let err = engine
        .link_special_transaction(remittance.id, by_cash.id)
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["wrong_type"]);

    let err = engine
        .link_special_transaction(remittance.id, by_check.id)
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["already_linked"]);

    let closed = engine.close_remittance(remittance.id).await.unwrap();
    assert!(closed.closed);
    assert_eq!(
        engine.close_remittance(remittance.id).await.unwrap_err(),
        EngineError::Locked {
            entity: "remittance".to_string()
        }
    );
}

#[tokio::test]
async fn remittance_types_need_a_special_account() {
    let engine = engine().await;
    let (_, account) = user(&engine, "alice").await;
    let err = engine.create_remittance_type(account.id).await.unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(errors.codes(), vec!["not_special"]);
}
