/// Purchase orchestration
///
/// A purchase is a fixed list of independent writes with no surrounding
/// transaction. Each step carries its own failure policy:
///
/// | step              | policy           |
/// |-------------------|------------------|
/// | CreateTransaction | abort everything |
/// | GrantAccess       | log and continue |
/// | RefreshAccess     | log and continue |
/// | SendConfirmation  | fire and forget  |
///
/// The transaction row is the source of truth. A failed grant leaves the
/// course paid but not linked until access is next reconciled.

mod corporate;
mod payment;

pub use corporate::{
    create_corporate_transaction, CorporatePackage, CORPORATE_CATEGORY, CORPORATE_IMAGE,
    CORPORATE_INSTRUCTOR,
};
pub use payment::{format_card_number, is_valid_email, PaymentDetails};

use crate::{
    account::{Account, AccountStatus},
    catalog::Course,
    error::FieldError,
    ledger::{NewTransaction, PriceBreakdown, TaxRate, Transaction},
    mailer::{CoursePurchaseData, EmailMessage, EmailSender},
    metrics,
    session::SessionResolver,
    store::{DataStore, PurchaseLink},
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStep {
    CreateTransaction,
    GrantAccess,
    RefreshAccess,
    SendConfirmation,
}

impl PurchaseStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStep::CreateTransaction => "create_transaction",
            PurchaseStep::GrantAccess => "grant_access",
            PurchaseStep::RefreshAccess => "refresh_access",
            PurchaseStep::SendConfirmation => "send_confirmation",
        }
    }

    pub fn policy(&self) -> StepPolicy {
        match self {
            PurchaseStep::CreateTransaction => StepPolicy::AbortAll,
            PurchaseStep::GrantAccess | PurchaseStep::RefreshAccess => StepPolicy::LogAndContinue,
            PurchaseStep::SendConfirmation => StepPolicy::FireAndForget,
        }
    }
}

/// What a step failure does to the rest of the purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    AbortAll,
    LogAndContinue,
    /// Dispatched in the background; the result is only logged
    FireAndForget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum StepOutcome {
    Completed,
    Failed(String),
    Skipped,
    Dispatched,
}

impl StepOutcome {
    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Completed => "completed",
            StepOutcome::Failed(_) => "failed",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Dispatched => "dispatched",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: PurchaseStep,
    pub policy: StepPolicy,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Successful purchase. Later steps may still have failed; see `steps`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub transaction: Transaction,
    pub recipient: String,
    pub steps: Vec<StepReport>,
}

impl PurchaseReceipt {
    pub fn outcome(&self, step: PurchaseStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }

    /// Every step that ran finished cleanly
    pub fn is_fully_applied(&self) -> bool {
        self.steps
            .iter()
            .all(|r| !matches!(r.outcome, StepOutcome::Failed(_)))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("Sign in to purchase")]
    AuthenticationRequired,

    #[error("Admins cannot purchase courses")]
    AdminCannotPurchase,

    #[error("Account pending approval")]
    PendingApproval,

    #[error("Account blocked")]
    Blocked,

    #[error("Invalid payment details")]
    InvalidPayment(Vec<FieldError>),

    #[error("Price out of range")]
    PriceOutOfRange,

    #[error("Failed to create transaction: {0}")]
    TransactionFailed(String),
}

impl PurchaseError {
    pub fn user_message(&self) -> String {
        match self {
            PurchaseError::AuthenticationRequired => "Please sign in to purchase this course".to_string(),
            PurchaseError::AdminCannotPurchase => "Admins cannot purchase courses".to_string(),
            PurchaseError::PendingApproval => {
                "Your account is pending admin approval. You can purchase courses once approved.".to_string()
            }
            PurchaseError::Blocked => crate::session::BLOCKED_MESSAGE.to_string(),
            PurchaseError::InvalidPayment(_) => "Please correct the highlighted payment fields".to_string(),
            PurchaseError::PriceOutOfRange => "This item cannot be purchased at its listed price".to_string(),
            PurchaseError::TransactionFailed(_) => {
                "Failed to process purchase. Please try again.".to_string()
            }
        }
    }
}

pub struct PurchaseOrchestrator {
    store: Arc<dyn DataStore>,
    session: Arc<SessionResolver>,
    email: Arc<dyn EmailSender>,
    tax_rate: TaxRate,
    zoom_link: Option<String>,
}

impl PurchaseOrchestrator {
    pub fn new(
        store: Arc<dyn DataStore>,
        session: Arc<SessionResolver>,
        email: Arc<dyn EmailSender>,
        tax_rate: TaxRate,
    ) -> Self {
        Self {
            store,
            session,
            email,
            tax_rate,
            zoom_link: None,
        }
    }

    /// Class link included in confirmation emails
    pub fn with_zoom_link(mut self, link: Option<String>) -> Self {
        self.zoom_link = link.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn quote(&self, course: &Course) -> Result<PriceBreakdown, PurchaseError> {
        PriceBreakdown::compute(course.price, self.tax_rate).ok_or(PurchaseError::PriceOutOfRange)
    }

    /// Buy one catalog course for the signed-in learner
    pub async fn purchase_course(
        &self,
        course: &Course,
        payment: &PaymentDetails,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let account = self.check_preconditions(payment)?;
        let breakdown = self.quote(course)?;
        let mut steps = Vec::with_capacity(4);

        let transaction = self
            .create_transaction(
                &mut steps,
                self.store.insert_transaction(NewTransaction::completed(
                    account.id,
                    course.id,
                    course.title.clone(),
                    breakdown,
                )),
                &account,
            )
            .await?;

        let grant = self
            .store
            .insert_purchase_link(PurchaseLink {
                user_id: account.id,
                course_id: course.id,
                transaction_id: Some(transaction.id),
            })
            .await;
        match grant {
            Ok(_) => record(&mut steps, PurchaseStep::GrantAccess, StepOutcome::Completed),
            Err(e) => {
                warn!(
                    user_id = %account.id,
                    course_id = %course.id,
                    transaction_id = %transaction.id,
                    "Access grant failed after payment was recorded: {}", e
                );
                record(&mut steps, PurchaseStep::GrantAccess, StepOutcome::Failed(e.to_string()));
            }
        }

        match self.session.refresh_access().await {
            Ok(_) => record(&mut steps, PurchaseStep::RefreshAccess, StepOutcome::Completed),
            Err(e) => {
                warn!(
                    user_id = %account.id,
                    course_id = %course.id,
                    transaction_id = %transaction.id,
                    "Access refresh failed: {}", e
                );
                record(&mut steps, PurchaseStep::RefreshAccess, StepOutcome::Failed(e.to_string()));
            }
        }

        let recipient = payment.recipient_or(&account.email).to_string();
        self.dispatch_confirmation(&mut steps, &account, &transaction, &course.instructor, &recipient);

        info!(
            "Purchase {} complete: {} bought {}",
            transaction.id, account.id, course.id
        );
        Ok(PurchaseReceipt {
            transaction,
            recipient,
            steps,
        })
    }

    /// Buy a corporate package. Same flow minus the access grant.
    pub async fn purchase_corporate(
        &self,
        package: CorporatePackage,
        payment: &PaymentDetails,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let account = self.check_preconditions(payment)?;
        let breakdown = PriceBreakdown::compute(package.list_price(), self.tax_rate)
            .ok_or(PurchaseError::PriceOutOfRange)?;
        let mut steps = Vec::with_capacity(4);

        let transaction = self
            .create_transaction(
                &mut steps,
                create_corporate_transaction(self.store.as_ref(), account.id, package, breakdown),
                &account,
            )
            .await?;

        record(&mut steps, PurchaseStep::GrantAccess, StepOutcome::Skipped);
        record(&mut steps, PurchaseStep::RefreshAccess, StepOutcome::Skipped);

        let recipient = payment.recipient_or(&account.email).to_string();
        self.dispatch_confirmation(
            &mut steps,
            &account,
            &transaction,
            CORPORATE_INSTRUCTOR,
            &recipient,
        );

        Ok(PurchaseReceipt {
            transaction,
            recipient,
            steps,
        })
    }

    /// Checked before any write
    fn check_preconditions(&self, payment: &PaymentDetails) -> Result<Account, PurchaseError> {
        let snapshot = self.session.current();
        let account = snapshot
            .account
            .clone()
            .ok_or(PurchaseError::AuthenticationRequired)?;

        if account.is_admin() {
            return Err(PurchaseError::AdminCannotPurchase);
        }
        match account.status() {
            AccountStatus::Blocked => return Err(PurchaseError::Blocked),
            AccountStatus::PendingApproval => return Err(PurchaseError::PendingApproval),
            AccountStatus::Active => {}
        }

        payment.validate().map_err(PurchaseError::InvalidPayment)?;
        Ok(account)
    }

    async fn create_transaction<F>(
        &self,
        steps: &mut Vec<StepReport>,
        insert: F,
        account: &Account,
    ) -> Result<Transaction, PurchaseError>
    where
        F: std::future::Future<Output = crate::store::StoreResult<Transaction>>,
    {
        match insert.await {
            Ok(transaction) => {
                record(steps, PurchaseStep::CreateTransaction, StepOutcome::Completed);
                Ok(transaction)
            }
            Err(e) => {
                error!("Transaction insert failed for {}: {}", account.id, e);
                metrics::record_purchase_step(PurchaseStep::CreateTransaction.as_str(), "failed");
                Err(PurchaseError::TransactionFailed(e.to_string()))
            }
        }
    }

    fn dispatch_confirmation(
        &self,
        steps: &mut Vec<StepReport>,
        account: &Account,
        transaction: &Transaction,
        instructor: &str,
        recipient: &str,
    ) {
        let message = EmailMessage::CoursePurchase {
            to: recipient.to_string(),
            data: CoursePurchaseData {
                user_name: account.display_name().to_string(),
                course_title: transaction.course_title.clone(),
                instructor: instructor.to_string(),
                total_amount: transaction.total_amount,
                transaction_id: transaction.id.to_string(),
                zoom_link: self.zoom_link.clone(),
            },
        };

        let email = Arc::clone(&self.email);
        let transaction_id = transaction.id;
        tokio::spawn(async move {
            match email.send(&message).await {
                Ok(()) => debug!("Confirmation for {} sent", transaction_id),
                Err(e) => warn!(
                    transaction_id = %transaction_id,
                    "Confirmation email failed: {}", e
                ),
            }
        });

        record(steps, PurchaseStep::SendConfirmation, StepOutcome::Dispatched);
    }
}

fn record(steps: &mut Vec<StepReport>, step: PurchaseStep, outcome: StepOutcome) {
    metrics::record_purchase_step(step.as_str(), outcome.label());
    steps.push(StepReport {
        step,
        policy: step.policy(),
        outcome,
    });
}
