/// Account records, roles and approval state
///
/// Profile rows are created by the hosted auth service when a credential is
/// registered; this crate reads them and lets admins flip approval and block
/// flags.

mod manager;

pub use manager::{AccountManager, LearnerSummary};

use crate::error::{HubError, HubResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. Learners are stored as `user` in the profiles table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user", alias = "learner")]
    Learner,
    #[serde(rename = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "user" | "learner" => Ok(Role::Learner),
            "admin" => Ok(Role::Admin),
            _ => Err(HubError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Learner
    }
}

/// Effective standing of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    PendingApproval,
    Blocked,
}

fn default_true() -> bool {
    true
}

/// Profile row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_approved: bool,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Stand-in profile for a freshly registered learner whose row has not
    /// appeared yet. The authoritative row arrives later via session events.
    pub fn synthesized(id: Uuid, email: &str, name: &str) -> Self {
        Self {
            id,
            email: email.to_string(),
            name: Some(name.to_string()),
            role: Role::Learner,
            is_approved: false,
            is_blocked: false,
            created_at: Some(Utc::now()),
        }
    }

    /// Blocked wins over pending; admins are never pending
    pub fn status(&self) -> AccountStatus {
        if self.is_blocked {
            AccountStatus::Blocked
        } else if self.role == Role::Learner && !self.is_approved {
            AccountStatus::PendingApproval
        } else {
            AccountStatus::Active
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name for greetings and admin listings
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// Flag changes applied by admins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFlags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
}
