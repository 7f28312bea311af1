// Favorites ledger
// At most one favorite per (user, hotel), enforced by a query before insert; concurrent toggles can still duplicate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::catalog::Hotel;
use crate::config::EngineConfig;
use crate::error::{BookingError, StoreError};
use crate::store::{decode_all, encode, Collection, DocumentStore, Filter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub hotel_id: String,
    pub hotel_name: String,
    pub city: String,
    pub image: String,
    pub price: String,
    pub rating: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

pub struct FavoritesLedger<S: DocumentStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: DocumentStore> FavoritesLedger<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    fn membership_filter(user_id: &str, hotel_id: &str) -> [Filter; 2] {
        [
            Filter::eq("userId", user_id),
            Filter::eq("hotelId", hotel_id),
        ]
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        let docs = self
            .store
            .query_equals(Collection::Favorites, &[Filter::eq("userId", user_id)])
            .await
            .map_err(|e| {
                error!(%user_id, error = %e, "error fetching favorites");
                e
            })?;
        decode_all(&docs)
    }

    // Store failures read as "not a favorite"
    pub async fn is_favorite(&self, user_id: &str, hotel_id: &str) -> bool {
        match self
            .store
            .query_equals(
                Collection::Favorites,
                &Self::membership_filter(user_id, hotel_id),
            )
            .await
        {
            Ok(docs) => !docs.is_empty(),
            Err(e) => {
                error!(%user_id, %hotel_id, error = %e, "error checking favorite status");
                false
            }
        }
    }

    pub async fn add(&self, user_id: &str, hotel: &Hotel) -> Result<String, BookingError> {
        let existing = self
            .store
            .query_equals(
                Collection::Favorites,
                &Self::membership_filter(user_id, &hotel.id),
            )
            .await?;
        if !existing.is_empty() {
            return Err(BookingError::AlreadyFavorite);
        }

        let favorite = Favorite {
            id: String::new(),
            user_id: user_id.to_string(),
            hotel_id: hotel.id.clone(),
            hotel_name: hotel.name.clone(),
            city: hotel.location.clone(),
            image: hotel.image.clone(),
            price: hotel.display_price(&self.config),
            rating: hotel.rating.clone(),
            created_at: Some(Utc::now()),
        };
        let id = self
            .store
            .insert(Collection::Favorites, encode(&favorite)?)
            .await?;
        info!(%user_id, hotel_id = %hotel.id, favorite_id = %id, "added favorite");
        Ok(id)
    }

    // Removes the first matching record; absent favorites are a no-op
    pub async fn remove(&self, user_id: &str, hotel_id: &str) -> Result<bool, StoreError> {
        let docs = self
            .store
            .query_equals(
                Collection::Favorites,
                &Self::membership_filter(user_id, hotel_id),
            )
            .await?;
        match docs.first() {
            Some(doc) => {
                self.store.delete(Collection::Favorites, &doc.id).await?;
                info!(%user_id, %hotel_id, "removed favorite");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn toggle(&self, user_id: &str, hotel: &Hotel) -> Result<ToggleOutcome, BookingError> {
        if self.remove(user_id, &hotel.id).await? {
            return Ok(ToggleOutcome::Removed);
        }
        self.add(user_id, hotel).await?;
        Ok(ToggleOutcome::Added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::hotel;
    use crate::store::InMemoryStore;

    fn ledger() -> (Arc<InMemoryStore>, FavoritesLedger<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = FavoritesLedger::new(store.clone(), EngineConfig::default());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_empty_state() {
        let (store, ledger) = ledger();
        let villa = hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000);

        assert_eq!(
            ledger.toggle("u1", &villa).await.unwrap(),
            ToggleOutcome::Added
        );
        assert!(ledger.is_favorite("u1", "h1").await);

        let favorites = ledger.list("u1").await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].price, "Rp 2.500.000");
        assert_eq!(favorites[0].city, "Bali, Indonesia");

        assert_eq!(
            ledger.toggle("u1", &villa).await.unwrap(),
            ToggleOutcome::Removed
        );
        assert!(!ledger.is_favorite("u1", "h1").await);
        assert!(store.is_empty(Collection::Favorites));
    }

    #[tokio::test]
    async fn test_add_twice_is_rejected() {
        let (store, ledger) = ledger();
        let villa = hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000);
        ledger.add("u1", &villa).await.unwrap();
        assert!(matches!(
            ledger.add("u1", &villa).await,
            Err(BookingError::AlreadyFavorite)
        ));
        assert_eq!(store.len(Collection::Favorites), 1);
    }

    #[tokio::test]
    async fn test_favorites_are_per_user() {
        let (_, ledger) = ledger();
        let villa = hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000);
        ledger.add("u1", &villa).await.unwrap();
        ledger.add("u2", &villa).await.unwrap();
        assert_eq!(ledger.list("u1").await.unwrap().len(), 1);
        ledger.remove("u2", "h1").await.unwrap();
        assert!(ledger.is_favorite("u1", "h1").await);
    }

    #[tokio::test]
    async fn test_remove_missing_favorite_is_noop() {
        let (_, ledger) = ledger();
        assert!(!ledger.remove("u1", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_is_favorite_swallows_store_errors() {
        let (store, ledger) = ledger();
        let villa = hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000);
        ledger.add("u1", &villa).await.unwrap();
        store.fail_next_requests(1);
        assert!(!ledger.is_favorite("u1", "h1").await);
    }

    #[tokio::test]
    async fn test_toggle_failure_leaves_store_unchanged() {
        let (store, ledger) = ledger();
        let villa = hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000);
        store.fail_next_requests(1);
        assert!(ledger.toggle("u1", &villa).await.is_err());
        assert!(store.is_empty(Collection::Favorites));
    }
}
