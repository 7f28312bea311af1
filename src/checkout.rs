// Checkout: payment method selection, simulated payment and the cart → history hand-off
// Payment always succeeds after a fixed delay; persistence failures keep the cart for a retry

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::{error, info};

use crate::cart::{CartEngine, CartItem};
use crate::config::{EngineConfig, TotalPaidPolicy};
use crate::error::{BookingError, PricingError};
use crate::history::{format_date_id, format_timestamp_id, HistoryItem, HistoryLedger, HistoryStatus};
use crate::money::PriceBreakdown;
use crate::payment::PaymentMethod;
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPhase {
    Idle,
    Processing,
    Succeeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
    pub method_id: String,
    pub method_label: String,
    pub breakdown: PriceBreakdown,
}

// Summary shown once the history rows are written and the cart is cleared
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutReceipt {
    pub confirmation: PaymentConfirmation,
    pub items: Vec<CartItem>,
    pub history: Vec<HistoryItem>,
}

// "TRX-" and the last eight digits of the millisecond timestamp
pub fn generate_transaction_id(at: DateTime<Utc>) -> String {
    let millis = at.timestamp_millis().unsigned_abs().to_string();
    let tail = &millis[millis.len().saturating_sub(8)..];
    format!("TRX-{}", tail)
}

// One checkout attempt over a snapshot of the cart.
// Totals are computed once when the session opens and the user's default
// method is pre-selected. A successful payment is kept so that recording it
// can be retried without paying again.
pub struct CheckoutSession {
    config: EngineConfig,
    items: Vec<CartItem>,
    methods: Vec<PaymentMethod>,
    breakdown: PriceBreakdown,
    selected: Mutex<Option<String>>,
    phase: Mutex<PaymentPhase>,
    confirmation: Mutex<Option<PaymentConfirmation>>,
}

impl CheckoutSession {
    pub fn open(
        items: Vec<CartItem>,
        methods: Vec<PaymentMethod>,
        config: EngineConfig,
    ) -> Result<Self, PricingError> {
        let lines = items
            .iter()
            .map(CartItem::line_amount)
            .collect::<Result<Vec<_>, _>>()?;
        let breakdown = PriceBreakdown::from_line_totals(lines, &config)?;
        let selected = methods.iter().find(|m| m.is_default).map(|m| m.id.clone());

        Ok(Self {
            config,
            items,
            methods,
            breakdown,
            selected: Mutex::new(selected),
            phase: Mutex::new(PaymentPhase::Idle),
            confirmation: Mutex::new(None),
        })
    }

    pub fn breakdown(&self) -> PriceBreakdown {
        self.breakdown
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn methods(&self) -> &[PaymentMethod] {
        &self.methods
    }

    pub fn selected_method(&self) -> Option<&PaymentMethod> {
        let selected = self.selected.lock().clone()?;
        self.methods.iter().find(|m| m.id == selected)
    }

    pub fn select_method(&self, method_id: &str) -> Result<(), BookingError> {
        if !self.methods.iter().any(|m| m.id == method_id) {
            return Err(BookingError::UnknownPaymentMethod(method_id.to_string()));
        }
        *self.selected.lock() = Some(method_id.to_string());
        Ok(())
    }

    pub fn phase(&self) -> PaymentPhase {
        *self.phase.lock()
    }

    // The payment taken by this session, if any
    pub fn confirmation(&self) -> Option<PaymentConfirmation> {
        self.confirmation.lock().clone()
    }

    // Whether the pay control is enabled
    pub fn can_pay(&self) -> bool {
        !self.items.is_empty()
            && self.selected_method().is_some()
            && self.phase() == PaymentPhase::Idle
    }

    // Simulated payment: waits the configured delay, then succeeds
    pub async fn pay(&self) -> Result<PaymentConfirmation, BookingError> {
        if self.items.is_empty() {
            return Err(BookingError::EmptyCart);
        }
        let method = self
            .selected_method()
            .cloned()
            .ok_or(BookingError::NoPaymentMethod)?;
        {
            let mut phase = self.phase.lock();
            if *phase != PaymentPhase::Idle {
                return Err(BookingError::CheckoutBusy);
            }
            *phase = PaymentPhase::Processing;
        }
        info!(method_id = %method.id, total = self.breakdown.total, "processing payment");

        sleep(self.config.payment_delay()).await;

        let paid_at = Utc::now();
        let confirmation = PaymentConfirmation {
            transaction_id: generate_transaction_id(paid_at),
            paid_at,
            method_id: method.id.clone(),
            method_label: method.details.label(),
            breakdown: self.breakdown,
        };
        *self.confirmation.lock() = Some(confirmation.clone());
        *self.phase.lock() = PaymentPhase::Succeeded;
        Ok(confirmation)
    }

    // One history row per cart item, all sharing the transaction id
    pub fn history_rows(
        &self,
        user_id: &str,
        confirmation: &PaymentConfirmation,
    ) -> Result<Vec<HistoryItem>, PricingError> {
        let date = format_timestamp_id(&confirmation.paid_at.with_timezone(&Local));
        self.items
            .iter()
            .map(|item| -> Result<HistoryItem, PricingError> {
                let total_paid = match self.config.total_paid_policy {
                    TotalPaidPolicy::GrandTotal => confirmation.breakdown.total,
                    TotalPaidPolicy::ItemShare => item.line_amount()?,
                };
                Ok(HistoryItem {
                    id: String::new(),
                    user_id: user_id.to_string(),
                    transaction_id: confirmation.transaction_id.clone(),
                    date: date.clone(),
                    hotel_name: item.hotel_name.clone(),
                    city: item.city.clone(),
                    image: item.image.clone(),
                    check_in: item.check_in.map(format_date_id).unwrap_or_else(|| "-".to_string()),
                    check_out: item
                        .check_out
                        .map(format_date_id)
                        .unwrap_or_else(|| "-".to_string()),
                    guests: item.guests,
                    nights: item.nights,
                    total_paid,
                    status: HistoryStatus::Completed,
                    created_at: Some(confirmation.paid_at),
                })
            })
            .collect()
    }
}

// Persist the history rows of a paid checkout, then clear the cart.
// Rows are written concurrently with no rollback: if any write fails the
// error is returned and the cart is left as it was, so a retry may
// duplicate the rows that did land.
pub async fn finalize<S: DocumentStore>(
    session: &CheckoutSession,
    confirmation: PaymentConfirmation,
    user_id: &str,
    cart: &CartEngine<S>,
    history: &HistoryLedger<S>,
) -> Result<CheckoutReceipt, BookingError> {
    let rows = session.history_rows(user_id, &confirmation)?;
    if let Err(e) = history.append_all(&rows).await {
        error!(%user_id, transaction_id = %confirmation.transaction_id, error = %e, "checkout not recorded");
        return Err(e.into());
    }
    let history_items = history.fetch(user_id).await?;
    cart.clear(user_id).await?;
    info!(
        %user_id,
        transaction_id = %confirmation.transaction_id,
        total = confirmation.breakdown.total,
        "checkout completed"
    );

    Ok(CheckoutReceipt {
        confirmation,
        items: session.items().to_vec(),
        history: history_items,
    })
}
