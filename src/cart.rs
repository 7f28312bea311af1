// Cart & pricing engine
// Holds the user's pending bookings, keeps them in step with the store and prices each line

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::Hotel;
use crate::config::EngineConfig;
use crate::error::{BookingError, PricingError, StoreError};
use crate::money::{format_amount, line_total, parse_amount, Amount, PriceBreakdown};
use crate::store::{decode_all, encode, Collection, DocumentStore, Fields, Filter};

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub hotel_name: String,
    pub city: String,
    pub image: String,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default = "one")]
    pub guests: u32,
    #[serde(default = "one")]
    pub nights: u32,
    // Nightly price as displayed, e.g. "Rp 2.500.000"
    pub price: String,
    #[serde(default)]
    pub total_price: String,
    #[serde(default)]
    pub room_type: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CartItem {
    // Line amount: the stored total when present, otherwise the nightly price
    pub fn line_amount(&self) -> Result<Amount, PricingError> {
        if self.total_price.is_empty() {
            parse_amount(&self.price)
        } else {
            parse_amount(&self.total_price)
        }
    }
}

// A prior booking or cart record offered for booking again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorBooking {
    pub hotel_name: String,
    pub city: String,
    pub image: String,
    pub price: String,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default)]
    pub guests: Option<u32>,
    #[serde(default)]
    pub nights: Option<u32>,
    #[serde(default)]
    pub room_type: Option<String>,
}

impl From<&CartItem> for PriorBooking {
    fn from(item: &CartItem) -> Self {
        Self {
            hotel_name: item.hotel_name.clone(),
            city: item.city.clone(),
            image: item.image.clone(),
            price: item.price.clone(),
            check_in: item.check_in,
            check_out: item.check_out,
            guests: Some(item.guests),
            nights: Some(item.nights),
            room_type: Some(item.room_type.clone()),
        }
    }
}

// What the user asked to book. Both shapes are converted into a canonical
// `CartItem` before anything reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BookingIntent {
    CatalogHotel {
        hotel: Hotel,
        #[serde(default)]
        guests: Option<u32>,
        #[serde(default)]
        nights: Option<u32>,
    },
    PriorBooking(PriorBooking),
}

impl BookingIntent {
    pub fn hotel_name(&self) -> &str {
        match self {
            BookingIntent::CatalogHotel { hotel, .. } => &hotel.name,
            BookingIntent::PriorBooking(prior) => &prior.hotel_name,
        }
    }

    pub fn into_cart_item(
        self,
        user_id: &str,
        config: &EngineConfig,
    ) -> Result<CartItem, PricingError> {
        let (hotel_name, city, image, price, check_in, check_out, guests, nights, room_type) =
            match self {
                BookingIntent::CatalogHotel {
                    hotel,
                    guests,
                    nights,
                } => {
                    let price = hotel.display_price(config);
                    (
                        hotel.name, hotel.location, hotel.image, price, None, None, guests,
                        nights, None,
                    )
                }
                BookingIntent::PriorBooking(prior) => (
                    prior.hotel_name,
                    prior.city,
                    prior.image,
                    prior.price,
                    prior.check_in,
                    prior.check_out,
                    prior.guests,
                    prior.nights,
                    prior.room_type,
                ),
            };

        let guests = guests.unwrap_or(config.default_guests).max(1);
        let nights = nights.unwrap_or(config.default_nights).max(1);
        let total = line_total(&price, guests, nights)?;

        Ok(CartItem {
            id: String::new(),
            user_id: user_id.to_string(),
            hotel_name,
            city,
            image,
            check_in,
            check_out,
            guests,
            nights,
            total_price: format_amount(&config.currency_prefix, total),
            price,
            room_type: room_type
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| config.default_room_type.clone()),
            created_at: Some(Utc::now()),
        })
    }
}

// Whole calendar days between the two dates, regardless of order.
// The same date gives 0 and an inverted range gives the positive distance.
pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> u32 {
    let days = (check_out - check_in).num_days().unsigned_abs();
    u32::try_from(days).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartUpdate {
    pub guests: u32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(String),
    AlreadyInCart,
}

// The user's cart.
// The in-memory copy is only ever replaced by a fresh read of the store after
// a mutation, so it never holds an item the store did not return. When that
// read fails the previous copy stays in place.
pub struct CartEngine<S: DocumentStore> {
    store: Arc<S>,
    config: EngineConfig,
    items: RwLock<Vec<CartItem>>,
}

impl<S: DocumentStore> CartEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            items: RwLock::new(Vec::new()),
        }
    }

    pub fn items(&self) -> Vec<CartItem> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn breakdown(&self) -> Result<PriceBreakdown, PricingError> {
        let items = self.items.read();
        let lines = items
            .iter()
            .map(CartItem::line_amount)
            .collect::<Result<Vec<_>, _>>()?;
        PriceBreakdown::from_line_totals(lines, &self.config)
    }

    pub async fn reload(&self, user_id: &str) -> Result<Vec<CartItem>, StoreError> {
        let docs = self
            .store
            .query_equals(Collection::Cart, &[Filter::eq("userId", user_id)])
            .await
            .map_err(|e| {
                error!(%user_id, error = %e, "error fetching cart items");
                e
            })?;
        let items: Vec<CartItem> = decode_all(&docs)?;
        debug!(%user_id, count = items.len(), "cart reloaded");
        *self.items.write() = items.clone();
        Ok(items)
    }

    pub async fn add(
        &self,
        user_id: &str,
        intent: BookingIntent,
    ) -> Result<AddOutcome, BookingError> {
        let hotel_name = intent.hotel_name().to_string();
        let existing = self
            .store
            .query_equals(
                Collection::Cart,
                &[
                    Filter::eq("userId", user_id),
                    Filter::eq("hotelName", hotel_name.as_str()),
                ],
            )
            .await?;
        if !existing.is_empty() {
            info!(%user_id, %hotel_name, "hotel already in cart");
            return Ok(AddOutcome::AlreadyInCart);
        }

        let item = intent.into_cart_item(user_id, &self.config)?;
        let id = self.store.insert(Collection::Cart, encode(&item)?).await?;
        info!(%user_id, %hotel_name, item_id = %id, total = %item.total_price, "added to cart");

        self.reload(user_id).await?;
        Ok(AddOutcome::Added(id))
    }

    // Returns None when the item does not belong to the user's stored cart
    pub async fn update(
        &self,
        user_id: &str,
        item_id: &str,
        update: CartUpdate,
    ) -> Result<Option<CartItem>, BookingError> {
        let docs = self.find(user_id, item_id).await?;
        let Some(doc) = docs.first() else {
            warn!(%user_id, %item_id, "cart item to update not found");
            return Ok(None);
        };
        let current: CartItem = doc.decode()?;

        let guests = update.guests.max(1);
        let nights = nights_between(update.check_in, update.check_out);
        let total = line_total(&current.price, guests, nights)?;

        let mut patch = Fields::new();
        patch.insert("guests".to_string(), json!(guests));
        patch.insert("nights".to_string(), json!(nights));
        patch.insert(
            "totalPrice".to_string(),
            Value::String(format_amount(&self.config.currency_prefix, total)),
        );
        patch.insert("checkIn".to_string(), json!(update.check_in));
        patch.insert("checkOut".to_string(), json!(update.check_out));
        patch.insert("updatedAt".to_string(), json!(Utc::now()));
        self.store.update(Collection::Cart, &doc.id, patch).await?;
        info!(%user_id, %item_id, guests, nights, total, "cart item updated");

        let items = self.reload(user_id).await?;
        Ok(items.into_iter().find(|i| i.id == doc.id))
    }

    pub async fn remove(&self, user_id: &str, item_id: &str) -> Result<(), BookingError> {
        let docs = self.find(user_id, item_id).await?;
        if let Some(doc) = docs.first() {
            self.store.delete(Collection::Cart, &doc.id).await?;
            info!(%user_id, %item_id, "removed from cart");
        } else {
            debug!(%user_id, %item_id, "cart item already gone");
        }
        self.items.write().retain(|i| i.id != item_id);
        self.reload(user_id).await?;
        Ok(())
    }

    // Deletes every cart record of the user; deletes run concurrently and are not rolled back
    pub async fn clear(&self, user_id: &str) -> Result<usize, StoreError> {
        let docs = self
            .store
            .query_equals(Collection::Cart, &[Filter::eq("userId", user_id)])
            .await?;
        let store = &self.store;
        try_join_all(
            docs.iter()
                .map(|doc| store.delete(Collection::Cart, &doc.id)),
        )
        .await
        .map_err(|e| {
            error!(%user_id, error = %e, "error clearing cart");
            e
        })?;
        self.items.write().clear();
        info!(%user_id, removed = docs.len(), "cart cleared");
        Ok(docs.len())
    }

    async fn find(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Vec<crate::store::Document>, StoreError> {
        self.store
            .query_equals(
                Collection::Cart,
                &[Filter::eq("userId", user_id), Filter::eq("id", item_id)],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::hotel;
    use crate::store::{InMemoryStore, StoreOp};
    use test_case::test_case;

    fn engine() -> (Arc<InMemoryStore>, CartEngine<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let engine = CartEngine::new(store.clone(), EngineConfig::default());
        (store, engine)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn villa_intent() -> BookingIntent {
        BookingIntent::CatalogHotel {
            hotel: hotel("h1", "Ubud Jungle Villa", "Bali, Indonesia", 2_500_000),
            guests: None,
            nights: None,
        }
    }

    fn prior(name: &str, price: &str, guests: u32, nights: u32) -> BookingIntent {
        BookingIntent::PriorBooking(PriorBooking {
            hotel_name: name.to_string(),
            city: "Bali".to_string(),
            image: "img.jpg".to_string(),
            price: price.to_string(),
            check_in: Some(date("2026-11-01")),
            check_out: Some(date("2026-11-03")),
            guests: Some(guests),
            nights: Some(nights),
            room_type: Some("Deluxe".to_string()),
        })
    }

    #[test_case("2026-11-01", "2026-11-01", 0 ; "same day")]
    #[test_case("2026-11-01", "2026-11-04", 3 ; "forward range")]
    #[test_case("2026-11-04", "2026-11-01", 3 ; "inverted range is absolute")]
    #[test_case("2026-12-30", "2027-01-02", 3 ; "across year end")]
    fn test_nights_between(check_in: &str, check_out: &str, expected: u32) {
        assert_eq!(nights_between(date(check_in), date(check_out)), expected);
    }

    #[test]
    fn test_catalog_intent_uses_defaults() {
        let item = villa_intent()
            .into_cart_item("u1", &EngineConfig::default())
            .unwrap();
        assert_eq!(item.guests, 1);
        assert_eq!(item.nights, 1);
        assert_eq!(item.price, "Rp 2.500.000");
        assert_eq!(item.total_price, "Rp 2.500.000");
        assert_eq!(item.room_type, "Standard Room");
        assert_eq!(item.city, "Bali, Indonesia");
        assert!(item.check_in.is_none());
    }

    #[test]
    fn test_prior_booking_intent_keeps_its_stay() {
        let item = prior("Seminyak Suites", "Rp 1.000.000", 2, 3)
            .into_cart_item("u1", &EngineConfig::default())
            .unwrap();
        assert_eq!(item.total_price, "Rp 6.000.000");
        assert_eq!(item.room_type, "Deluxe");
        assert_eq!(item.check_in, Some(date("2026-11-01")));
    }

    #[test]
    fn test_intent_is_tagged_on_the_wire() {
        let json = serde_json::to_value(villa_intent()).unwrap();
        assert_eq!(json["kind"], "catalogHotel");
        let json = serde_json::to_value(prior("A", "Rp 1", 1, 1)).unwrap();
        assert_eq!(json["kind"], "priorBooking");
    }

    #[test]
    fn test_line_amount_falls_back_to_nightly_price() {
        let mut item = villa_intent()
            .into_cart_item("u1", &EngineConfig::default())
            .unwrap();
        item.total_price = String::new();
        assert_eq!(item.line_amount(), Ok(2_500_000));
    }

    #[tokio::test]
    async fn test_add_persists_and_reloads() {
        let (store, engine) = engine();
        let outcome = engine.add("u1", villa_intent()).await.unwrap();
        let AddOutcome::Added(id) = outcome else {
            panic!("expected item to be added");
        };
        assert_eq!(store.len(Collection::Cart), 1);
        let items = engine.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_adding_same_hotel_name_twice_keeps_one_item() {
        let (store, engine) = engine();
        engine.add("u1", villa_intent()).await.unwrap();
        let inserts_before = store.stats().inserts;

        let again = prior("Ubud Jungle Villa", "Rp 9.999.999", 4, 4);
        assert_eq!(
            engine.add("u1", again).await.unwrap(),
            AddOutcome::AlreadyInCart
        );
        assert_eq!(store.stats().inserts, inserts_before);
        assert_eq!(store.len(Collection::Cart), 1);
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_same_hotel_for_different_users() {
        let (store, engine) = engine();
        engine.add("u1", villa_intent()).await.unwrap();
        engine.add("u2", villa_intent()).await.unwrap();
        assert_eq!(store.len(Collection::Cart), 2);
        assert_eq!(engine.items()[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_add_failure_leaves_cart_unchanged() {
        let (store, engine) = engine();
        engine.add("u1", villa_intent()).await.unwrap();
        let before = engine.items();

        store.fail_operation(StoreOp::Insert, 0);
        let result = engine.add("u1", prior("Other", "Rp 100.000", 1, 1)).await;
        assert!(matches!(result, Err(BookingError::Store(_))));
        assert_eq!(engine.items(), before);
    }

    #[tokio::test]
    async fn test_add_with_failed_reload_keeps_stale_view() {
        let (store, engine) = engine();
        // Duplicate check succeeds, reload after the insert fails
        store.fail_operation(StoreOp::Query, 1);
        let result = engine.add("u1", villa_intent()).await;
        assert!(result.is_err());
        assert!(engine.is_empty());
        assert_eq!(store.len(Collection::Cart), 1);

        engine.reload("u1").await.unwrap();
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_update_recomputes_nights_and_total() {
        let (store, engine) = engine();
        let AddOutcome::Added(id) = engine.add("u1", villa_intent()).await.unwrap() else {
            panic!("expected item to be added");
        };

        let update = CartUpdate {
            guests: 2,
            check_in: date("2026-11-01"),
            check_out: date("2026-11-04"),
        };
        let item = engine.update("u1", &id, update).await.unwrap().unwrap();
        assert_eq!(item.guests, 2);
        assert_eq!(item.nights, 3);
        assert_eq!(item.total_price, "Rp 15.000.000");
        assert_eq!(item.check_out, Some(date("2026-11-04")));
        assert_eq!(engine.items()[0], item);

        let stored = store.documents(Collection::Cart);
        assert_eq!(stored[0].fields["totalPrice"], "Rp 15.000.000");
    }

    #[tokio::test]
    async fn test_update_clamps_guests_and_allows_zero_nights() {
        let (_, engine) = engine();
        let AddOutcome::Added(id) = engine.add("u1", villa_intent()).await.unwrap() else {
            panic!("expected item to be added");
        };
        let update = CartUpdate {
            guests: 0,
            check_in: date("2026-11-01"),
            check_out: date("2026-11-01"),
        };
        let item = engine.update("u1", &id, update).await.unwrap().unwrap();
        assert_eq!(item.guests, 1);
        assert_eq!(item.nights, 0);
        assert_eq!(item.total_price, "Rp 0");
    }

    #[tokio::test]
    async fn test_update_of_foreign_item_is_ignored() {
        let (store, engine) = engine();
        let AddOutcome::Added(id) = engine.add("u1", villa_intent()).await.unwrap() else {
            panic!("expected item to be added");
        };
        let update = CartUpdate {
            guests: 3,
            check_in: date("2026-11-01"),
            check_out: date("2026-11-02"),
        };
        assert!(engine.update("u2", &id, update).await.unwrap().is_none());
        assert_eq!(store.stats().updates, 0);
    }

    #[tokio::test]
    async fn test_remove_deletes_and_reloads() {
        let (store, engine) = engine();
        let AddOutcome::Added(id) = engine.add("u1", villa_intent()).await.unwrap() else {
            panic!("expected item to be added");
        };
        engine
            .add("u1", prior("Seminyak Suites", "Rp 1.000.000", 1, 1))
            .await
            .unwrap();

        engine.remove("u1", &id).await.unwrap();
        assert_eq!(store.len(Collection::Cart), 1);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.items()[0].hotel_name, "Seminyak Suites");
    }

    #[tokio::test]
    async fn test_remove_missing_item_is_safe() {
        let (_, engine) = engine();
        assert!(engine.remove("u1", "does-not-exist").await.is_ok());
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_only_users_items() {
        let (store, engine) = engine();
        engine.add("u2", villa_intent()).await.unwrap();
        engine.add("u1", villa_intent()).await.unwrap();
        engine
            .add("u1", prior("Seminyak Suites", "Rp 1.000.000", 1, 1))
            .await
            .unwrap();

        assert_eq!(engine.clear("u1").await.unwrap(), 2);
        assert!(engine.is_empty());
        assert_eq!(store.len(Collection::Cart), 1);
    }

    #[tokio::test]
    async fn test_breakdown_over_current_items() {
        let (_, engine) = engine();
        engine
            .add("u1", prior("A", "Rp 100.000", 1, 1))
            .await
            .unwrap();
        engine
            .add("u1", prior("B", "Rp 25.000", 2, 1))
            .await
            .unwrap();
        let breakdown = engine.breakdown().unwrap();
        assert_eq!(breakdown.subtotal, 150_000);
        assert_eq!(breakdown.total, 169_500);
    }
}
