// Hotel booking engine: cart, pricing and checkout over a pluggable document store

pub mod app;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod favorites;
pub mod history;
pub mod identity;
pub mod money;
pub mod payment;
pub mod store;

// Re-export key types for convenience
pub use app::{BookingApp, View};
pub use cart::{AddOutcome, BookingIntent, CartEngine, CartItem, CartUpdate, PriorBooking};
pub use catalog::{CatalogReader, Destination, Hotel, HotelFilter, Stats};
pub use checkout::{finalize, CheckoutReceipt, CheckoutSession, PaymentConfirmation, PaymentPhase};
pub use config::{EngineConfig, TotalPaidPolicy};
pub use error::{BookingError, Notice, PricingError, StoreError};
pub use favorites::{Favorite, FavoritesLedger, ToggleOutcome};
pub use history::{HistoryItem, HistoryLedger, HistoryStatus};
pub use identity::{AuthError, AuthSession, IdentityProvider, InMemoryIdentityProvider, User};
pub use money::{Amount, PriceBreakdown};
pub use payment::{DeleteOutcome, PaymentDetails, PaymentMethod, PaymentRegistry, PaymentUpdate};
pub use store::{Collection, Document, DocumentStore, Filter, InMemoryStore};
