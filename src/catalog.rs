// Catalog reader: hotel listing, dashboard stats and search filtering
// Pure reads; the catalog and stats documents are maintained outside the application

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::money::{format_amount, Amount};
use crate::store::{decode_all, Collection, DocumentStore};

// Stored field names follow the catalog's existing Indonesian schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "nama")]
    pub name: String,
    #[serde(rename = "lokasi")]
    pub location: String,
    #[serde(rename = "harga_per_malam")]
    pub nightly_price: Amount,
    #[serde(rename = "deskripsi", default)]
    pub description: String,
    #[serde(default)]
    pub rating: String,
    #[serde(rename = "gambar", default)]
    pub image: String,
}

impl Hotel {
    pub fn display_price(&self, config: &EngineConfig) -> String {
        format_amount(&config.currency_prefix, self.nightly_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stats {
    pub total_bookings: u64,
    pub upcoming_trips: u64,
    pub favorite_hotels: u64,
    pub total_spent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    #[default]
    All,
    Bali,
    Jakarta,
    // Anywhere outside Indonesia
    International,
}

impl Destination {
    fn matches(&self, location: &str) -> bool {
        let location = location.to_lowercase();
        match self {
            Destination::All => true,
            Destination::Bali => location.contains("bali"),
            Destination::Jakarta => location.contains("jakarta"),
            Destination::International => {
                !location.contains("bali")
                    && !location.contains("jakarta")
                    && !location.contains("indonesia")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HotelFilter {
    pub query: String,
    pub destination: Destination,
}

impl HotelFilter {
    pub fn matches(&self, hotel: &Hotel) -> bool {
        let query = self.query.to_lowercase();
        let matches_query = hotel.name.to_lowercase().contains(&query)
            || hotel.location.to_lowercase().contains(&query);
        matches_query && self.destination.matches(&hotel.location)
    }

    pub fn apply<'a>(&self, hotels: &'a [Hotel]) -> Vec<&'a Hotel> {
        hotels.iter().filter(|h| self.matches(h)).collect()
    }
}

pub struct CatalogReader<S: DocumentStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: DocumentStore> CatalogReader<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub async fn fetch_hotels(&self) -> Result<Vec<Hotel>, StoreError> {
        let docs = self
            .store
            .query_equals(Collection::Hotel, &[])
            .await
            .map_err(|e| {
                error!(error = %e, "error fetching hotels");
                e
            })?;
        let hotels = decode_all(&docs)?;
        debug!(count = docs.len(), "fetched hotels");
        Ok(hotels)
    }

    pub async fn search(&self, filter: &HotelFilter) -> Result<Vec<Hotel>, StoreError> {
        let hotels = self.fetch_hotels().await?;
        Ok(hotels.into_iter().filter(|h| filter.matches(h)).collect())
    }

    // Missing stats document reads as all zeroes
    pub async fn fetch_stats(&self) -> Result<Stats, StoreError> {
        let doc = self
            .store
            .get_by_id(Collection::Stats, &self.config.stats_document_id)
            .await
            .map_err(|e| {
                error!(error = %e, "error fetching stats");
                e
            })?;
        match doc {
            Some(doc) => doc.decode(),
            None => Ok(Stats::default()),
        }
    }

    // Stats with the favorites count taken from the user's actual favorites
    pub async fn dashboard_stats(&self, favorite_count: usize) -> Result<Stats, StoreError> {
        let mut stats = self.fetch_stats().await?;
        stats.favorite_hotels = favorite_count as u64;
        Ok(stats)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::store::{encode, InMemoryStore};

    pub fn hotel(id: &str, name: &str, location: &str, price: Amount) -> Hotel {
        Hotel {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            nightly_price: price,
            description: format!("{} di {}", name, location),
            rating: "4.8".to_string(),
            image: format!("https://img.example/{}.jpg", id),
        }
    }

    pub fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        for h in [
            hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000),
            hotel("h2", "Grand Sudirman", "Jakarta, Indonesia", 1_200_000),
            hotel("h3", "Paris Luxury Resort", "Paris, France", 4_000_000),
            hotel("h4", "Ocean View Resort", "Lombok, Indonesia", 1_750_000),
        ] {
            let id = h.id.clone();
            store.put(Collection::Hotel, &id, encode(&h).unwrap());
        }
        store
    }
}
