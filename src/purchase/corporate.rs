/// Corporate training packages
///
/// Packages are sold through the ledger like courses, but they are backed
/// by fixed placeholder course rows and never grant catalog access.
use crate::{
    catalog::{Level, NewCourse},
    ledger::{Money, NewTransaction, PriceBreakdown, Transaction},
    store::{DataStore, StoreError, StoreResult},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const CORPORATE_CATEGORY: &str = "Corporate Training";
pub const CORPORATE_INSTRUCTOR: &str = "Corporate Training Team";
pub const CORPORATE_IMAGE: &str =
    "https://images.unsplash.com/photo-1522202176988-66273c2fd55f?w=800";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorporatePackage {
    #[serde(rename = "15 Days")]
    FifteenDays,
    #[serde(rename = "45 Days")]
    FortyFiveDays,
    #[serde(rename = "3 Months")]
    ThreeMonths,
}

impl CorporatePackage {
    pub const ALL: [CorporatePackage; 3] = [
        CorporatePackage::FifteenDays,
        CorporatePackage::FortyFiveDays,
        CorporatePackage::ThreeMonths,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CorporatePackage::FifteenDays => "15 Days",
            CorporatePackage::FortyFiveDays => "45 Days",
            CorporatePackage::ThreeMonths => "3 Months",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label.trim())
    }

    /// Unknown labels are sold as the 15 day package
    pub fn from_label_or_default(label: &str) -> Self {
        Self::from_label(label).unwrap_or(CorporatePackage::FifteenDays)
    }

    /// Fixed id of the placeholder course row
    pub fn course_id(&self) -> Uuid {
        match self {
            CorporatePackage::FifteenDays => Uuid::from_u128(0x11111111_1111_1111_1111_111111111111),
            CorporatePackage::FortyFiveDays => Uuid::from_u128(0x22222222_2222_2222_2222_222222222222),
            CorporatePackage::ThreeMonths => Uuid::from_u128(0x33333333_3333_3333_3333_333333333333),
        }
    }

    /// Placeholder rows back corporate sales only and never grant catalog access
    pub fn is_placeholder_course(course_id: Uuid) -> bool {
        Self::ALL.iter().any(|p| p.course_id() == course_id)
    }

    pub fn list_price(&self) -> Money {
        match self {
            CorporatePackage::FifteenDays => Money::from_major(14_999),
            CorporatePackage::FortyFiveDays => Money::from_major(25_000),
            CorporatePackage::ThreeMonths => Money::from_major(50_000),
        }
    }

    pub fn title(&self) -> String {
        format!("Corporate Training - {}", self.label())
    }

    fn placeholder(&self, price: Money, category_id: Option<Uuid>) -> NewCourse {
        NewCourse {
            id: Some(self.course_id()),
            title: self.title(),
            description: format!(
                "Corporate training package for {}. One-on-one training by specialized instructors. Available on-site in any city worldwide.",
                self.label()
            ),
            instructor: CORPORATE_INSTRUCTOR.to_string(),
            price,
            image_url: Some(CORPORATE_IMAGE.to_string()),
            duration: self.label().to_string(),
            level: Level::Corporate,
            students: 0,
            rating: 5.0,
            category_id,
        }
    }
}

/// Find or create the corporate category. Failures only cost the category
/// link on the placeholder course, so they are logged and absorbed.
async fn ensure_category(store: &dyn DataStore) -> Option<Uuid> {
    match store.find_category_by_name(CORPORATE_CATEGORY).await {
        Ok(Some(category)) => return Some(category.id),
        Ok(None) => {}
        Err(e) => warn!("Corporate category lookup failed: {}", e),
    }

    match store.insert_category(CORPORATE_CATEGORY).await {
        Ok(category) => {
            info!("Created category {}", CORPORATE_CATEGORY);
            Some(category.id)
        }
        Err(StoreError::Conflict(_)) => store
            .find_category_by_name(CORPORATE_CATEGORY)
            .await
            .ok()
            .flatten()
            .map(|c| c.id),
        Err(e) => {
            error!("Creating corporate category failed: {}", e);
            None
        }
    }
}

async fn ensure_course(store: &dyn DataStore, package: CorporatePackage, price: Money) {
    if store.get_course(package.course_id()).await.is_ok() {
        return;
    }

    let category_id = ensure_category(store).await;
    match store.insert_course(package.placeholder(price, category_id)).await {
        Ok(_) => info!("Created placeholder course for {}", package.label()),
        // Created concurrently
        Err(StoreError::Conflict(_)) => debug!("Placeholder for {} already exists", package.label()),
        Err(e) => error!("Creating placeholder course for {} failed: {}", package.label(), e),
    }
}

/// Record a corporate package sale. The placeholder course is created on
/// first use; only the transaction insert can fail the call.
pub async fn create_corporate_transaction(
    store: &dyn DataStore,
    user_id: Uuid,
    package: CorporatePackage,
    breakdown: PriceBreakdown,
) -> StoreResult<Transaction> {
    ensure_course(store, package, breakdown.price).await;

    let transaction = store
        .insert_transaction(NewTransaction::completed(
            user_id,
            package.course_id(),
            package.title(),
            breakdown,
        ))
        .await?;

    info!(
        "Corporate transaction {} for {} ({})",
        transaction.id,
        user_id,
        package.label()
    );
    Ok(transaction)
}
