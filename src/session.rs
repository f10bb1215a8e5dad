//! Per-user session state for the search funnel.
//!
//! Every funnel step reads the user's accumulated selections from here and
//! writes its own choice back. Handlers never recover state from previously
//! rendered chat text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Which marketplace the user is building a search against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marketplace {
    Encar,
    Kbchachacha,
    Kcar,
}

/// Free-text input the bot is waiting for from this user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingInput {
    /// Lower price bound, millions of won, or "любой".
    PriceFrom,
    /// Upper price bound, millions of won, or "любой".
    PriceTo,
    /// Numeric Telegram id to grant access to (manager only).
    GrantUserId,
}

/// A facet the user picked: marketplace-native code plus display name.
/// Encar selects by name, KbChaChaCha and KCar select by code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetChoice {
    pub code: String,
    pub name: String,
}

impl FacetChoice {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Accumulating record of one user's funnel selections. Created on the first
/// menu interaction and kept for the process lifetime.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub marketplace: Option<Marketplace>,

    // Hierarchy selections, native-language values captured verbatim.
    pub manufacturer: Option<FacetChoice>,
    pub model_group: Option<FacetChoice>,
    pub model: Option<FacetChoice>,
    pub trim: Option<FacetChoice>,

    // Production years of the selected generation, as inferred.
    pub generation_years: Option<(i32, i32)>,

    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// 0 means "any month"; only Encar encodes months into its year filter.
    pub month_from: u32,
    pub month_to: u32,

    pub mileage_from: Option<u32>,
    pub mileage_to: Option<u32>,

    /// Native-language color token; `None` means any color.
    pub color: Option<String>,

    /// Won. `None` means unbounded on that side.
    pub price_from: Option<i64>,
    pub price_to: Option<i64>,

    /// Region code; `None` means anywhere.
    pub location: Option<String>,

    pub pending: Option<PendingInput>,
}

impl SearchQuery {
    /// True once every field the Encar catalog query needs is present.
    pub fn is_complete_for_encar(&self) -> bool {
        self.manufacturer.is_some()
            && self.model_group.is_some()
            && self.model.is_some()
            && self.trim.is_some()
            && self.year_from.is_some()
            && self.year_to.is_some()
    }
}

/// Keyed store of session records. Reads clone the record out; writes go
/// through a closure under the lock, so concurrent callbacks for different
/// users cannot cross-contaminate.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<u64, SearchQuery>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the user's record, creating an empty one if absent.
    pub async fn get_or_create(&self, user_id: u64) -> SearchQuery {
        if let Some(q) = self.sessions.read().await.get(&user_id) {
            return q.clone();
        }
        self.sessions
            .write()
            .await
            .entry(user_id)
            .or_default()
            .clone()
    }

    /// Apply `f` to the user's record under the write lock.
    pub async fn update<F>(&self, user_id: u64, f: F)
    where
        F: FnOnce(&mut SearchQuery),
    {
        let mut sessions = self.sessions.write().await;
        f(sessions.entry(user_id).or_default());
    }

    /// Drop the user's record, e.g. when a fresh funnel starts.
    pub async fn clear(&self, user_id: u64) {
        self.sessions.write().await.remove(&user_id);
    }

    /// Take the pending-input marker, if any, resetting it to `None`.
    pub async fn take_pending(&self, user_id: u64) -> Option<PendingInput> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&user_id).and_then(|q| q.pending.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_returns_empty_record() {
        let store = SessionStore::new();
        let q = store.get_or_create(1).await;
        assert!(q.manufacturer.is_none());
        assert_eq!(q.month_from, 0);
    }

    #[tokio::test]
    async fn updates_are_keyed_per_user() {
        let store = SessionStore::new();
        store
            .update(1, |q| {
                q.manufacturer = Some(FacetChoice::new("", "현대"));
            })
            .await;
        store
            .update(2, |q| {
                q.manufacturer = Some(FacetChoice::new("", "기아"));
            })
            .await;

        assert_eq!(
            store.get_or_create(1).await.manufacturer.unwrap().name,
            "현대"
        );
        assert_eq!(
            store.get_or_create(2).await.manufacturer.unwrap().name,
            "기아"
        );
    }

    #[tokio::test]
    async fn clear_removes_record() {
        let store = SessionStore::new();
        store.update(1, |q| q.year_from = Some(2018)).await;
        store.clear(1).await;
        assert!(store.get_or_create(1).await.year_from.is_none());
    }

    #[tokio::test]
    async fn take_pending_resets_marker() {
        let store = SessionStore::new();
        store
            .update(1, |q| q.pending = Some(PendingInput::PriceFrom))
            .await;
        assert_eq!(store.take_pending(1).await, Some(PendingInput::PriceFrom));
        assert_eq!(store.take_pending(1).await, None);
    }
}
