/// Role-scoped ledger reads and disputes
mod common;

use common::{admin, learner};
use learnhub::{
    ledger::{
        LedgerError, LedgerReader, Money, NewTransaction, PriceBreakdown, TaxRate, Transaction,
        TransactionStatus, UNKNOWN_USER,
    },
    store::{DataStore, MemoryStore},
};
use std::sync::Arc;
use uuid::Uuid;

async fn buy(store: &MemoryStore, user_id: Uuid, title: &str, price_major: i64) -> Transaction {
    store
        .insert_transaction(NewTransaction::completed(
            user_id,
            Uuid::new_v4(),
            title,
            PriceBreakdown::compute(Money::from_major(price_major), TaxRate::from_basis_points(1800)).unwrap(),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_learner_sees_only_own_transactions() {
    let store = Arc::new(MemoryStore::new());
    let ada = learner("ada@example.com", "Ada");
    let bob = learner("bob@example.com", "Bob");
    store.put_profile(ada.clone()).await;
    store.put_profile(bob.clone()).await;

    let mine = buy(&store, ada.id, "Rust", 100).await;
    buy(&store, bob.id, "Go", 50).await;

    let reader = LedgerReader::new(store.clone());
    let views = reader.list_transactions(Some(&ada)).await.unwrap();

    assert_eq!(views.len(), 1);
    assert_eq!(views[0].transaction.id, mine.id);
    assert_eq!(views[0].user_name, None);
}

#[tokio::test]
async fn test_admin_sees_all_with_purchaser_names() {
    let store = Arc::new(MemoryStore::new());
    let root = admin("root@example.com");
    let ada = learner("ada@example.com", "Ada");
    store.put_profile(ada.clone()).await;

    buy(&store, ada.id, "Rust", 100).await;
    let orphan = buy(&store, Uuid::new_v4(), "Go", 50).await;

    let reader = LedgerReader::new(store.clone());
    let views = reader.list_transactions(Some(&root)).await.unwrap();
    assert_eq!(views.len(), 2);

    let ada_view = views.iter().find(|v| v.transaction.user_id == ada.id).unwrap();
    assert_eq!(ada_view.user_name.as_deref(), Some("Ada"));
    assert_eq!(ada_view.user_email.as_deref(), Some("ada@example.com"));

    let orphan_view = views.iter().find(|v| v.transaction.id == orphan.id).unwrap();
    assert_eq!(orphan_view.user_name.as_deref(), Some(UNKNOWN_USER));
    assert_eq!(orphan_view.user_email.as_deref(), Some(""));
}

#[tokio::test]
async fn test_reads_require_caller() {
    let reader = LedgerReader::new(Arc::new(MemoryStore::new()));
    assert_eq!(
        reader.list_transactions(None).await.unwrap_err(),
        LedgerError::AuthenticationRequired
    );
}

#[tokio::test]
async fn test_dispute_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let ada = learner("ada@example.com", "Ada");
    let bob = learner("bob@example.com", "Bob");
    let tx = buy(&store, ada.id, "Rust", 100).await;
    let reader = LedgerReader::new(store.clone());

    assert_eq!(
        reader.file_dispute(Some(&ada), tx.id, "   ").await.unwrap_err(),
        LedgerError::EmptyReason
    );
    assert_eq!(
        reader.file_dispute(Some(&bob), tx.id, "not mine").await.unwrap_err(),
        LedgerError::NotOwner
    );

    let disputed = reader
        .file_dispute(Some(&ada), tx.id, "  charged twice  ")
        .await
        .unwrap();
    assert_eq!(disputed.status, TransactionStatus::Disputed);
    assert_eq!(disputed.dispute_reason.as_deref(), Some("charged twice"));
    assert_eq!(disputed.total_amount, tx.total_amount);

    assert_eq!(
        reader.file_dispute(Some(&ada), tx.id, "again").await.unwrap_err(),
        LedgerError::AlreadyDisputed
    );
    assert_eq!(
        reader
            .file_dispute(Some(&ada), Uuid::new_v4(), "ghost")
            .await
            .unwrap_err(),
        LedgerError::NotFound
    );
}

#[tokio::test]
async fn test_admin_may_dispute_any_transaction() {
    let store = Arc::new(MemoryStore::new());
    let ada = learner("ada@example.com", "Ada");
    let tx = buy(&store, ada.id, "Rust", 100).await;

    let reader = LedgerReader::new(store.clone());
    let disputed = reader
        .file_dispute(Some(&admin("root@example.com")), tx.id, "chargeback")
        .await
        .unwrap();
    assert_eq!(disputed.status, TransactionStatus::Disputed);
}

#[tokio::test]
async fn test_summary_counts_revenue_and_disputes() {
    let store = Arc::new(MemoryStore::new());
    let ada = learner("ada@example.com", "Ada");
    let first = buy(&store, ada.id, "Rust", 100).await;
    buy(&store, ada.id, "Go", 50).await;
    store.mark_disputed(first.id, "duplicate").await.unwrap();

    let reader = LedgerReader::new(store.clone());
    let summary = reader.summary(Some(&admin("root@example.com"))).await.unwrap();

    assert_eq!(summary.transaction_count, 2);
    assert_eq!(summary.disputed_count, 1);
    assert_eq!(summary.total_revenue, Money::from_major(177));
    assert_eq!(summary.total_tax_collected, Money::from_major(27));
}
