// Error types shared across the booking engine
// Store and pricing failures propagate with `?` up to the app boundary, where they become notices

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("Price contains no digits: {0:?}")]
    NoDigits(String),

    #[error("Amount overflow while computing {0}")]
    Overflow(&'static str),
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No signed-in user")]
    NotSignedIn,

    #[error("Hotel already in favorites")]
    AlreadyFavorite,

    #[error("No payment method selected")]
    NoPaymentMethod,

    #[error("Payment method not found: {0}")]
    UnknownPaymentMethod(String),

    #[error("Invalid payment details: {0}")]
    InvalidPaymentDetails(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Checkout already in progress")]
    CheckoutBusy,
}

// User-facing notification raised by an app operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Info(String),
    Error(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Info(m) | Notice::Error(m) => m,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Error(_))
    }
}

pub const GENERIC_ERROR_MESSAGE: &str = "Terjadi kesalahan. Silakan coba lagi.";

impl From<&BookingError> for Notice {
    fn from(err: &BookingError) -> Self {
        match err {
            BookingError::NotSignedIn => {
                Notice::Error("Silakan masuk terlebih dahulu.".to_string())
            }
            BookingError::AlreadyFavorite => {
                Notice::Info("Hotel sudah ada di favorit.".to_string())
            }
            BookingError::NoPaymentMethod => {
                Notice::Error("Pilih metode pembayaran terlebih dahulu.".to_string())
            }
            BookingError::EmptyCart => Notice::Info("Keranjang Anda kosong.".to_string()),
            BookingError::InvalidPaymentDetails(_) => {
                Notice::Error("Data metode pembayaran belum lengkap.".to_string())
            }
            _ => Notice::Error(GENERIC_ERROR_MESSAGE.to_string()),
        }
    }
}
