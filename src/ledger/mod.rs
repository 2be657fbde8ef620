/// Transaction ledger: purchase records, role-scoped history and disputes
///
/// A transaction's price, tax and total are frozen when it is created and are
/// never recomputed from the live course row.

mod money;

pub use money::{Money, PriceBreakdown, TaxRate};

use crate::{
    account::Account,
    error::HubError,
    store::{DataStore, StoreError},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const UNKNOWN_USER: &str = "Unknown User";

/// Transaction status. The only transition is completed -> disputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Disputed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Disputed => "disputed",
        }
    }
}

/// Purchase record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_price: Money,
    pub service_tax: Money,
    pub total_amount: Money,
    pub status: TransactionStatus,
    #[serde(default)]
    pub dispute_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// total == price + tax, as frozen at creation
    pub fn is_consistent(&self) -> bool {
        self.course_price.checked_add(self.service_tax) == Some(self.total_amount)
    }

    pub fn breakdown(&self) -> PriceBreakdown {
        PriceBreakdown {
            price: self.course_price,
            tax: self.service_tax,
            total: self.total_amount,
        }
    }
}

/// Row for inserting a transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_price: Money,
    pub service_tax: Money,
    pub total_amount: Money,
    pub status: TransactionStatus,
}

impl NewTransaction {
    pub fn completed(
        user_id: Uuid,
        course_id: Uuid,
        course_title: impl Into<String>,
        breakdown: PriceBreakdown,
    ) -> Self {
        Self {
            user_id,
            course_id,
            course_title: course_title.into(),
            course_price: breakdown.price,
            service_tax: breakdown.tax,
            total_amount: breakdown.total,
            status: TransactionStatus::Completed,
        }
    }
}

/// Transaction as shown in a history list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// Purchaser display name; only filled for admin listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Totals for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub transaction_count: usize,
    pub disputed_count: usize,
    pub total_revenue: Money,
    pub total_tax_collected: Money,
}

impl LedgerSummary {
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        transactions
            .into_iter()
            .fold(LedgerSummary::default(), |mut summary, tx| {
                summary.transaction_count += 1;
                if tx.status == TransactionStatus::Disputed {
                    summary.disputed_count += 1;
                }
                summary.total_revenue = summary.total_revenue + tx.total_amount;
                summary.total_tax_collected = summary.total_tax_collected + tx.service_tax;
                summary
            })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Sign in to view purchases")]
    AuthenticationRequired,
    #[error("A reason is required to dispute a transaction")]
    EmptyReason,
    #[error("Transaction is already disputed")]
    AlreadyDisputed,
    #[error("Transaction not found")]
    NotFound,
    #[error("Transaction belongs to another account")]
    NotOwner,
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Unavailable(_) => "Failed to load transactions. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => LedgerError::NotFound,
            other => LedgerError::Unavailable(other.to_string()),
        }
    }
}

impl From<LedgerError> for HubError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AuthenticationRequired => HubError::Authentication(err.to_string()),
            LedgerError::EmptyReason => HubError::Validation(err.to_string()),
            LedgerError::AlreadyDisputed => HubError::Conflict(err.to_string()),
            LedgerError::NotFound => HubError::NotFound(err.to_string()),
            LedgerError::NotOwner => HubError::Authorization(err.to_string()),
            LedgerError::Unavailable(msg) => HubError::Backend(msg),
        }
    }
}

/// Role-scoped reader over the transactions table
#[derive(Clone)]
pub struct LedgerReader {
    store: Arc<dyn DataStore>,
}

impl LedgerReader {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Admins see every transaction with purchaser names resolved in one
    /// batched lookup; learners see only their own.
    pub async fn list_transactions(
        &self,
        caller: Option<&Account>,
    ) -> Result<Vec<TransactionView>, LedgerError> {
        let caller = caller.ok_or(LedgerError::AuthenticationRequired)?;

        if !caller.is_admin() {
            let own = self.store.list_transactions(Some(caller.id)).await?;
            return Ok(own
                .into_iter()
                .map(|transaction| TransactionView {
                    transaction,
                    user_name: None,
                    user_email: None,
                })
                .collect());
        }

        let all = self.store.list_transactions(None).await?;

        let mut seen = HashSet::new();
        let user_ids: Vec<Uuid> = all
            .iter()
            .map(|tx| tx.user_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let profiles: HashMap<Uuid, Account> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            match self.store.get_profiles(&user_ids).await {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id, p)).collect(),
                Err(e) => {
                    warn!("Failed to resolve purchaser names: {}", e);
                    HashMap::new()
                }
            }
        };

        Ok(all
            .into_iter()
            .map(|transaction| {
                let profile = profiles.get(&transaction.user_id);
                TransactionView {
                    user_name: Some(
                        profile
                            .map(|p| p.display_name().to_string())
                            .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                    ),
                    user_email: Some(profile.map(|p| p.email.clone()).unwrap_or_default()),
                    transaction,
                }
            })
            .collect())
    }

    /// Mark a completed transaction as disputed. One-way; the reason is
    /// required and stored trimmed.
    pub async fn file_dispute(
        &self,
        caller: Option<&Account>,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<Transaction, LedgerError> {
        let caller = caller.ok_or(LedgerError::AuthenticationRequired)?;

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::EmptyReason);
        }

        let existing = self.store.get_transaction(transaction_id).await?;
        if !caller.is_admin() && existing.user_id != caller.id {
            return Err(LedgerError::NotOwner);
        }
        if existing.status == TransactionStatus::Disputed {
            return Err(LedgerError::AlreadyDisputed);
        }

        let updated = self.store.mark_disputed(transaction_id, reason).await?;
        info!("Transaction {} disputed by {}", transaction_id, caller.id);
        Ok(updated)
    }

    pub async fn summary(&self, caller: Option<&Account>) -> Result<LedgerSummary, LedgerError> {
        let views = self.list_transactions(caller).await?;
        Ok(LedgerSummary::from_transactions(
            views.iter().map(|v| &v.transaction),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(status: TransactionStatus, price: i64, tax: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            course_title: "Course".to_string(),
            course_price: Money::from_cents(price),
            service_tax: Money::from_cents(tax),
            total_amount: Money::from_cents(price + tax),
            status,
            dispute_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_totals() {
        let txs = vec![
            tx(TransactionStatus::Completed, 10_000, 800),
            tx(TransactionStatus::Disputed, 5_000, 400),
        ];
        let summary = LedgerSummary::from_transactions(&txs);

        assert_eq!(summary.transaction_count, 2);
        assert_eq!(summary.disputed_count, 1);
        assert_eq!(summary.total_revenue, Money::from_cents(16_200));
        assert_eq!(summary.total_tax_collected, Money::from_cents(1_200));
    }

    #[test]
    fn test_new_transaction_freezes_breakdown() {
        let breakdown =
            PriceBreakdown::compute(Money::from_major(100), TaxRate::from_basis_points(800)).unwrap();
        let row = NewTransaction::completed(Uuid::new_v4(), Uuid::new_v4(), "Rust", breakdown);

        assert_eq!(row.status, TransactionStatus::Completed);
        assert_eq!(row.course_price + row.service_tax, row.total_amount);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["total_amount"], 108.0);
    }

    #[test]
    fn test_status_wire_format() {
        let status: TransactionStatus = serde_json::from_str("\"disputed\"").unwrap();
        assert_eq!(status, TransactionStatus::Disputed);
    }
}
