// Engine configuration
// Pricing rates, the simulated payment delay and the locale defaults used when a booking is created

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BookingError;

// How each history row produced by one checkout records the amount paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TotalPaidPolicy {
    // Every row repeats the checkout grand total
    #[default]
    GrandTotal,
    // Every row records its own line total
    ItemShare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    // Rates are basis points: 200 = 2%
    pub service_fee_bps: u64,
    pub tax_bps: u64,
    pub payment_delay_ms: u64,
    pub default_guests: u32,
    pub default_nights: u32,
    pub default_room_type: String,
    pub currency_prefix: String,
    pub total_paid_policy: TotalPaidPolicy,
    pub stats_document_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_fee_bps: 200,
            tax_bps: 1100,
            payment_delay_ms: 2000,
            default_guests: 1,
            default_nights: 1,
            default_room_type: "Standard Room".to_string(),
            currency_prefix: "Rp".to_string(),
            total_paid_policy: TotalPaidPolicy::GrandTotal,
            stats_document_id: "dashboard".to_string(),
        }
    }
}

impl EngineConfig {
    // Parse a JSON object of overrides; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, BookingError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| BookingError::Config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if self.default_guests == 0 {
            return Err(BookingError::Config(
                "defaultGuests must be at least 1".to_string(),
            ));
        }
        if self.default_nights == 0 {
            return Err(BookingError::Config(
                "defaultNights must be at least 1".to_string(),
            ));
        }
        if self.currency_prefix.is_empty() {
            return Err(BookingError::Config(
                "currencyPrefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }
}
