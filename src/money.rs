// Rupiah amounts: parsing display strings, formatting, line totals and checkout breakdown
// Amounts are whole rupiah; there are no decimal places anywhere in the engine

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::PricingError;

pub type Amount = u64;

pub const DEFAULT_CURRENCY_PREFIX: &str = "Rp";

// Extract the integer amount from a display string by dropping every non-digit.
// `"Rp 2.500.000"` parses to `2500000`. A string with no digits at all is an
// error rather than zero so a corrupt price never silently becomes free.
pub fn parse_amount(display: &str) -> Result<Amount, PricingError> {
    let digits: String = display.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(PricingError::NoDigits(display.to_string()));
    }
    digits
        .parse::<Amount>()
        .map_err(|_| PricingError::Overflow("parsed amount"))
}

// Group digits in threes with `.` separators, as the `id-ID` locale does.
pub fn group_digits(amount: Amount) -> String {
    let raw = amount.to_string();
    let mut grouped = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    grouped
}

pub fn format_amount(prefix: &str, amount: Amount) -> String {
    format!("{} {}", prefix, group_digits(amount))
}

pub fn format_rupiah(amount: Amount) -> String {
    format_amount(DEFAULT_CURRENCY_PREFIX, amount)
}

// Nightly price × guests × nights.
pub fn line_total(nightly_price: &str, guests: u32, nights: u32) -> Result<Amount, PricingError> {
    let nightly = parse_amount(nightly_price)?;
    nightly
        .checked_mul(Amount::from(guests))
        .and_then(|v| v.checked_mul(Amount::from(nights)))
        .ok_or(PricingError::Overflow("line total"))
}

// round(amount * bps / 10000), half rounding up
fn apply_rate(amount: Amount, bps: u64, what: &'static str) -> Result<Amount, PricingError> {
    amount
        .checked_mul(bps)
        .and_then(|v| v.checked_add(5_000))
        .map(|v| v / 10_000)
        .ok_or(PricingError::Overflow(what))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Amount,
    pub service_fee: Amount,
    pub tax: Amount,
    pub total: Amount,
}

impl PriceBreakdown {
    // Fee and tax are each rounded on their own before being added to the
    // subtotal. Rounding the sum instead differs by one rupiah at boundaries.
    pub fn from_subtotal(subtotal: Amount, config: &EngineConfig) -> Result<Self, PricingError> {
        let service_fee = apply_rate(subtotal, config.service_fee_bps, "service fee")?;
        let tax = apply_rate(subtotal, config.tax_bps, "tax")?;
        let total = subtotal
            .checked_add(service_fee)
            .and_then(|v| v.checked_add(tax))
            .ok_or(PricingError::Overflow("grand total"))?;

        Ok(Self {
            subtotal,
            service_fee,
            tax,
            total,
        })
    }

    pub fn from_line_totals<I>(lines: I, config: &EngineConfig) -> Result<Self, PricingError>
    where
        I: IntoIterator<Item = Amount>,
    {
        let subtotal = lines
            .into_iter()
            .try_fold(0 as Amount, |acc, line| acc.checked_add(line))
            .ok_or(PricingError::Overflow("subtotal"))?;
        Self::from_subtotal(subtotal, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Rp 2.500.000", 2_500_000 ; "formatted rupiah")]
    #[test_case("Rp 850.000 / malam", 850_000 ; "trailing text")]
    #[test_case("1500000", 1_500_000 ; "bare digits")]
    #[test_case("IDR 0", 0 ; "zero")]
    fn test_parse_amount(input: &str, expected: Amount) {
        assert_eq!(parse_amount(input), Ok(expected));
    }

    #[test]
    fn test_parse_amount_without_digits() {
        assert_eq!(
            parse_amount("Rp -"),
            Err(PricingError::NoDigits("Rp -".to_string()))
        );
    }

    #[test]
    fn test_parse_amount_overflow() {
        let huge = "9".repeat(40);
        assert!(matches!(
            parse_amount(&huge),
            Err(PricingError::Overflow(_))
        ));
    }

    #[test_case(0, "Rp 0")]
    #[test_case(999, "Rp 999")]
    #[test_case(1_000, "Rp 1.000")]
    #[test_case(100_000, "Rp 100.000")]
    #[test_case(2_500_000, "Rp 2.500.000")]
    #[test_case(1_234_567_890, "Rp 1.234.567.890")]
    fn test_format_rupiah(amount: Amount, expected: &str) {
        assert_eq!(format_rupiah(amount), expected);
    }

    #[test]
    fn test_line_total_multiplies_guests_and_nights() {
        let total = line_total("Rp 2.500.000", 2, 3).unwrap();
        assert_eq!(total, 15_000_000);
        // Formatting and parsing again recovers the same amount
        assert_eq!(parse_amount(&format_rupiah(total)), Ok(total));
    }

    #[test]
    fn test_line_total_with_zero_nights_is_zero() {
        assert_eq!(line_total("Rp 500.000", 2, 0), Ok(0));
    }

    #[test]
    fn test_line_total_overflow() {
        assert_eq!(
            line_total(&u64::MAX.to_string(), 2, 1),
            Err(PricingError::Overflow("line total"))
        );
    }

    #[test]
    fn test_breakdown_for_two_item_checkout() {
        let config = EngineConfig::default();
        let breakdown = PriceBreakdown::from_line_totals([100_000, 50_000], &config).unwrap();
        assert_eq!(
            breakdown,
            PriceBreakdown {
                subtotal: 150_000,
                service_fee: 3_000,
                tax: 16_500,
                total: 169_500,
            }
        );
    }

    #[test_case(0, 0, 0, 0 ; "empty")]
    #[test_case(25, 1, 3, 29 ; "fee rounds half up on its own")]
    #[test_case(50, 1, 6, 57 ; "tax rounds half up")]
    #[test_case(10, 0, 1, 11 ; "small amounts round down")]
    #[test_case(1_234_567, 24_691, 135_802, 1_395_060 ; "large subtotal")]
    fn test_breakdown_rounds_components_independently(
        subtotal: Amount,
        fee: Amount,
        tax: Amount,
        total: Amount,
    ) {
        let config = EngineConfig::default();
        let breakdown = PriceBreakdown::from_subtotal(subtotal, &config).unwrap();
        assert_eq!(breakdown.service_fee, fee);
        assert_eq!(breakdown.tax, tax);
        assert_eq!(breakdown.total, total);
    }

    #[test]
    fn test_independent_rounding_differs_from_rounding_the_sum() {
        let config = EngineConfig::default();
        let breakdown = PriceBreakdown::from_subtotal(25, &config).unwrap();
        // round(25 * 1.13) = round(28.25) = 28
        let rounded_sum = (25 * 11_300 + 5_000) / 10_000;
        assert_eq!(rounded_sum, 28);
        assert_eq!(breakdown.total, 29);
    }

    #[test]
    fn test_breakdown_overflow_is_reported() {
        let config = EngineConfig::default();
        assert!(matches!(
            PriceBreakdown::from_line_totals([u64::MAX, 1], &config),
            Err(PricingError::Overflow("subtotal"))
        ));
    }
}
