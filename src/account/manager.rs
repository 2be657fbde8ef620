/// Admin-side account operations
use crate::{
    account::{Account, ProfileFlags},
    error::HubResult,
    store::DataStore,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Learner row for the admin dashboard
#[derive(Debug, Clone, Serialize)]
pub struct LearnerSummary {
    #[serde(flatten)]
    pub account: Account,
    pub purchased_course_ids: Vec<Uuid>,
}

/// Account manager
#[derive(Clone)]
pub struct AccountManager {
    store: Arc<dyn DataStore>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Approve or revoke approval for an account
    pub async fn set_approval(&self, user_id: Uuid, approved: bool) -> HubResult<Account> {
        let flags = ProfileFlags {
            is_approved: Some(approved),
            ..Default::default()
        };
        let account = self.store.update_profile_flags(user_id, flags).await?;
        info!("Account {} approval set to {}", user_id, approved);
        Ok(account)
    }

    /// Block or unblock an account
    pub async fn set_blocked(&self, user_id: Uuid, blocked: bool) -> HubResult<Account> {
        let flags = ProfileFlags {
            is_blocked: Some(blocked),
            ..Default::default()
        };
        let account = self.store.update_profile_flags(user_id, flags).await?;
        info!("Account {} blocked set to {}", user_id, blocked);
        Ok(account)
    }

    /// All learners with their purchased course ids, using one batched
    /// purchase lookup for the whole page
    pub async fn list_learners_with_purchases(&self) -> HubResult<Vec<LearnerSummary>> {
        let learners = self.store.list_learners().await?;
        if learners.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = learners.iter().map(|a| a.id).collect();
        let links = match self.store.list_purchase_links_for(&ids).await {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!("Failed to load purchased courses for learners: {}", e);
                Vec::new()
            }
        };

        let mut by_user: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for link in links {
            by_user.entry(link.user_id).or_default().push(link.course_id);
        }

        Ok(learners
            .into_iter()
            .map(|account| {
                let purchased_course_ids = by_user.remove(&account.id).unwrap_or_default();
                LearnerSummary {
                    account,
                    purchased_course_ids,
                }
            })
            .collect())
    }
}
