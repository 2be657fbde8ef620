/// Shared session snapshot
use crate::account::Account;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// What the rest of the client sees about the signed-in account.
/// Never mutated in place; every change publishes a new snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub account: Option<Account>,
    pub access_token: Option<String>,
    pub purchased_course_ids: Vec<Uuid>,
    /// The account was synthesized after signup and awaits the real row
    pub provisional: bool,
}

impl SessionSnapshot {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.is_some()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.account.as_ref().map(|a| a.id)
    }

    pub fn has_purchased(&self, course_id: Uuid) -> bool {
        self.purchased_course_ids.contains(&course_id)
    }
}

/// Single-writer, many-reader holder for the current snapshot
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Arc<SessionSnapshot>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(SessionSnapshot::signed_out()));
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Arc<SessionSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, snapshot: SessionSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// Build the next snapshot from the current one and publish it whole.
    /// Runs under the channel's write lock, so `f` must not touch the store.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&SessionSnapshot) -> SessionSnapshot,
    {
        self.tx.send_modify(|current| {
            let next = f(current);
            *current = Arc::new(next);
        });
    }

    pub fn clear(&self) {
        self.replace(SessionSnapshot::signed_out());
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.tx.subscribe()
    }
}
