// Application state container
// Wires the ledgers together for one signed-in user and turns every failure into a notice

use futures::try_join;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{error, info};

use crate::cart::{AddOutcome, BookingIntent, CartEngine, CartItem, CartUpdate};
use crate::catalog::{CatalogReader, Hotel, HotelFilter, Stats};
use crate::checkout::{finalize, CheckoutReceipt, CheckoutSession};
use crate::config::EngineConfig;
use crate::error::{BookingError, Notice};
use crate::favorites::{Favorite, FavoritesLedger, ToggleOutcome};
use crate::history::{HistoryItem, HistoryLedger};
use crate::identity::{AuthSession, IdentityProvider};
use crate::money::PriceBreakdown;
use crate::payment::{PaymentDetails, PaymentMethod, PaymentRegistry, PaymentUpdate};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Dashboard,
    Search,
    Favorites,
    Cart,
    Checkout,
    History,
    PaymentMethods,
}

#[derive(Debug, Default)]
struct AppState {
    view: View,
    hotels: Vec<Hotel>,
    stats: Stats,
    favorites: Vec<Favorite>,
    history: Vec<HistoryItem>,
    payment_methods: Vec<PaymentMethod>,
    last_receipt: Option<CheckoutReceipt>,
}

// Everything the dashboard reads and every action it can take.
// Each action awaits its store calls before returning, so actions from one
// caller never overlap on the same entity. Failures are logged and reported
// as a `Notice`; cached state is only replaced by successful reads.
pub struct BookingApp<S: DocumentStore, P: IdentityProvider> {
    config: EngineConfig,
    auth: AuthSession<P>,
    catalog: CatalogReader<S>,
    favorites: FavoritesLedger<S>,
    cart: CartEngine<S>,
    payments: PaymentRegistry<S>,
    history: HistoryLedger<S>,
    state: RwLock<AppState>,
    checkout: Mutex<Option<Arc<CheckoutSession>>>,
}

impl<S: DocumentStore, P: IdentityProvider> BookingApp<S, P> {
    pub fn new(store: Arc<S>, identity: Arc<P>, config: EngineConfig) -> Self {
        Self {
            auth: AuthSession::new(identity),
            catalog: CatalogReader::new(store.clone(), config.clone()),
            favorites: FavoritesLedger::new(store.clone(), config.clone()),
            cart: CartEngine::new(store.clone(), config.clone()),
            payments: PaymentRegistry::new(store.clone()),
            history: HistoryLedger::new(store),
            config,
            state: RwLock::new(AppState::default()),
            checkout: Mutex::new(None),
        }
    }

    pub fn auth(&self) -> &AuthSession<P> {
        &self.auth
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn view(&self) -> View {
        self.state.read().view
    }

    pub fn navigate(&self, view: View) {
        self.state.write().view = view;
    }

    pub fn hotels(&self) -> Vec<Hotel> {
        self.state.read().hotels.clone()
    }

    pub fn stats(&self) -> Stats {
        self.state.read().stats
    }

    pub fn favorites(&self) -> Vec<Favorite> {
        self.state.read().favorites.clone()
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        self.state.read().history.clone()
    }

    pub fn payment_methods(&self) -> Vec<PaymentMethod> {
        self.state.read().payment_methods.clone()
    }

    pub fn cart_items(&self) -> Vec<CartItem> {
        self.cart.items()
    }

    pub fn cart_breakdown(&self) -> Option<PriceBreakdown> {
        match self.cart.breakdown() {
            Ok(breakdown) => Some(breakdown),
            Err(e) => {
                error!(error = %e, "cart could not be priced");
                None
            }
        }
    }

    pub fn last_receipt(&self) -> Option<CheckoutReceipt> {
        self.state.read().last_receipt.clone()
    }

    pub fn is_favorite(&self, hotel_id: &str) -> bool {
        self.state
            .read()
            .favorites
            .iter()
            .any(|f| f.hotel_id == hotel_id)
    }

    pub fn search(&self, filter: &HotelFilter) -> Vec<Hotel> {
        self.state
            .read()
            .hotels
            .iter()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect()
    }

    fn user_id(&self) -> Result<String, BookingError> {
        self.auth
            .user()
            .map(|u| u.uid)
            .ok_or(BookingError::NotSignedIn)
    }

    fn fail(&self, action: &str, err: BookingError) -> Notice {
        error!(action, error = %err, "operation failed");
        Notice::from(&err)
    }

    // Load every list the dashboard shows. Returns a notice only on failure.
    pub async fn load_dashboard(&self) -> Option<Notice> {
        match self.try_load_dashboard().await {
            Ok(()) => None,
            Err(e) => Some(self.fail("load dashboard", e)),
        }
    }

    async fn try_load_dashboard(&self) -> Result<(), BookingError> {
        let user_id = self.user_id()?;
        let (hotels, favorites, history, methods, _) = try_join!(
            self.catalog.fetch_hotels(),
            self.favorites.list(&user_id),
            self.history.fetch(&user_id),
            self.payments.list(&user_id),
            self.cart.reload(&user_id),
        )?;
        let stats = self.catalog.dashboard_stats(favorites.len()).await?;

        let mut state = self.state.write();
        state.hotels = hotels;
        state.favorites = favorites;
        state.history = history;
        state.payment_methods = methods;
        state.stats = stats;
        Ok(())
    }

    pub async fn book(&self, intent: BookingIntent) -> Notice {
        self.try_book(intent)
            .await
            .unwrap_or_else(|e| self.fail("add to cart", e))
    }

    async fn try_book(&self, intent: BookingIntent) -> Result<Notice, BookingError> {
        let user_id = self.user_id()?;
        let hotel_name = intent.hotel_name().to_string();
        match self.cart.add(&user_id, intent).await? {
            AddOutcome::Added(_) => {
                self.navigate(View::Cart);
                Ok(Notice::Success(format!(
                    "{} berhasil ditambahkan ke keranjang!",
                    hotel_name
                )))
            }
            AddOutcome::AlreadyInCart => Ok(Notice::Info(format!(
                "{} sudah ada di keranjang.",
                hotel_name
            ))),
        }
    }

    pub async fn update_cart_item(&self, item_id: &str, update: CartUpdate) -> Notice {
        self.try_update_cart_item(item_id, update)
            .await
            .unwrap_or_else(|e| self.fail("update cart item", e))
    }

    async fn try_update_cart_item(
        &self,
        item_id: &str,
        update: CartUpdate,
    ) -> Result<Notice, BookingError> {
        let user_id = self.user_id()?;
        match self.cart.update(&user_id, item_id, update).await? {
            Some(item) => Ok(Notice::Success(format!(
                "Pesanan diperbarui: {} malam, total {}",
                item.nights, item.total_price
            ))),
            None => Ok(Notice::Info("Item tidak ditemukan di keranjang.".to_string())),
        }
    }

    pub async fn remove_cart_item(&self, item_id: &str) -> Notice {
        let result = async {
            let user_id = self.user_id()?;
            self.cart.remove(&user_id, item_id).await?;
            Ok::<_, BookingError>(Notice::Success("Item dihapus dari keranjang.".to_string()))
        };
        result
            .await
            .unwrap_or_else(|e| self.fail("remove from cart", e))
    }

    pub async fn toggle_favorite(&self, hotel: &Hotel) -> Notice {
        self.try_toggle_favorite(hotel)
            .await
            .unwrap_or_else(|e| self.fail("toggle favorite", e))
    }

    async fn try_toggle_favorite(&self, hotel: &Hotel) -> Result<Notice, BookingError> {
        let user_id = self.user_id()?;
        let outcome = self.favorites.toggle(&user_id, hotel).await?;
        let favorites = self.favorites.list(&user_id).await?;
        {
            let mut state = self.state.write();
            state.stats.favorite_hotels = favorites.len() as u64;
            state.favorites = favorites;
        }
        Ok(match outcome {
            ToggleOutcome::Added => {
                Notice::Success(format!("{} ditambahkan ke favorit.", hotel.name))
            }
            ToggleOutcome::Removed => {
                Notice::Success(format!("{} dihapus dari favorit.", hotel.name))
            }
        })
    }

    async fn refresh_payment_methods(&self, user_id: &str) -> Result<(), BookingError> {
        let methods = self.payments.list(user_id).await?;
        self.state.write().payment_methods = methods;
        Ok(())
    }

    pub async fn add_payment_method(&self, details: PaymentDetails) -> Notice {
        let result = async {
            let user_id = self.user_id()?;
            self.payments.add(&user_id, details).await?;
            self.refresh_payment_methods(&user_id).await?;
            Ok::<_, BookingError>(Notice::Success(
                "Metode pembayaran berhasil ditambahkan.".to_string(),
            ))
        };
        result
            .await
            .unwrap_or_else(|e| self.fail("add payment method", e))
    }

    pub async fn update_payment_method(&self, method_id: &str, update: PaymentUpdate) -> Notice {
        let result = async {
            let user_id = self.user_id()?;
            let updated = self.payments.update(&user_id, method_id, update).await?;
            self.refresh_payment_methods(&user_id).await?;
            Ok::<_, BookingError>(match updated {
                Some(_) => Notice::Success("Metode pembayaran diperbarui.".to_string()),
                None => Notice::Info("Metode pembayaran tidak ditemukan.".to_string()),
            })
        };
        result
            .await
            .unwrap_or_else(|e| self.fail("update payment method", e))
    }

    pub async fn delete_payment_method(&self, method_id: &str) -> Notice {
        let result = async {
            let user_id = self.user_id()?;
            let outcome = self.payments.delete(&user_id, method_id).await?;
            self.refresh_payment_methods(&user_id).await?;
            let has_methods = !self.state.read().payment_methods.is_empty();
            Ok::<_, BookingError>(if outcome.default_cleared && has_methods {
                Notice::Info(
                    "Metode pembayaran dihapus. Pilih metode utama yang baru.".to_string(),
                )
            } else {
                Notice::Success("Metode pembayaran dihapus.".to_string())
            })
        };
        result
            .await
            .unwrap_or_else(|e| self.fail("delete payment method", e))
    }

    pub async fn set_default_payment_method(&self, method_id: &str) -> Notice {
        let result = async {
            let user_id = self.user_id()?;
            self.payments.set_default(&user_id, method_id).await?;
            self.refresh_payment_methods(&user_id).await?;
            Ok::<_, BookingError>(Notice::Success(
                "Metode pembayaran utama diperbarui.".to_string(),
            ))
        };
        result
            .await
            .unwrap_or_else(|e| self.fail("set default payment method", e))
    }

    // Open checkout over the current cart with the default method pre-selected.
    pub async fn open_checkout(&self) -> Option<Notice> {
        let result = async {
            let user_id = self.user_id()?;
            let items = self.cart.reload(&user_id).await?;
            if items.is_empty() {
                return Err(BookingError::EmptyCart);
            }
            self.refresh_payment_methods(&user_id).await?;
            let methods = self.payment_methods();
            let session = CheckoutSession::open(items, methods, self.config.clone())?;
            *self.checkout.lock() = Some(Arc::new(session));
            self.navigate(View::Checkout);
            Ok::<(), BookingError>(())
        }
        .await;
        result.err().map(|e| self.fail("open checkout", e))
    }

    pub fn checkout_session(&self) -> Option<Arc<CheckoutSession>> {
        self.checkout.lock().clone()
    }

    pub fn select_payment_method(&self, method_id: &str) -> Option<Notice> {
        let session = self.checkout_session()?;
        session
            .select_method(method_id)
            .err()
            .map(|e| self.fail("select payment method", e))
    }

    // Also enabled when a payment was taken but recording it failed
    pub fn can_pay(&self) -> bool {
        self.checkout_session()
            .is_some_and(|s| s.can_pay() || s.confirmation().is_some())
    }

    // Pay, record history and clear the cart. On success the receipt is kept
    // for the success summary and the history view is shown. If recording
    // fails the session stays open and the next call records the same
    // payment again.
    pub async fn pay(&self) -> Notice {
        self.try_pay()
            .await
            .unwrap_or_else(|e| self.fail("checkout", e))
    }

    async fn try_pay(&self) -> Result<Notice, BookingError> {
        let user_id = self.user_id()?;
        let session = self.checkout_session().ok_or(BookingError::EmptyCart)?;
        let confirmation = match session.confirmation() {
            Some(confirmation) => {
                info!(%user_id, transaction_id = %confirmation.transaction_id, "retrying checkout record");
                confirmation
            }
            None => session.pay().await?,
        };
        let receipt = finalize(&session, confirmation, &user_id, &self.cart, &self.history).await?;
        info!(%user_id, transaction_id = %receipt.confirmation.transaction_id, "payment success");

        let notice = Notice::Success(format!(
            "Pembayaran berhasil! Nomor transaksi {}",
            receipt.confirmation.transaction_id
        ));
        {
            let mut state = self.state.write();
            state.history = receipt.history.clone();
            state.last_receipt = Some(receipt);
            state.view = View::History;
        }
        *self.checkout.lock() = None;
        Ok(notice)
    }
}
