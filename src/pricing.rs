//! Market-index price adjustment.
//!
//! Converts the model's raw per-sqm output (base-year terms) into a
//! market-adjusted total price using the city's IPAI multiplier and the
//! listing area.

use crate::market::MarketData;

/// Raw and adjusted prices for one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBreakdown {
    pub raw_price_per_sqm: f64,
    pub adjusted_price_per_sqm: f64,
    pub raw_total: f64,
    pub adjusted_total: f64,
    pub adjustment_factor: f64,
}

/// Apply the city's index adjustment to a raw per-sqm prediction.
///
/// The raw output is floored at zero first: negative model output is clamped,
/// never surfaced as a negative price.
pub fn market_adjusted(
    market: &MarketData,
    city: &str,
    raw_per_sqm: f64,
    size_sqm: f64,
) -> PriceBreakdown {
    let raw_price_per_sqm = raw_per_sqm.max(0.0);
    let adjustment_factor = market.adjustment_factor(city);
    let adjusted_price_per_sqm = raw_price_per_sqm * adjustment_factor;

    PriceBreakdown {
        raw_price_per_sqm,
        adjusted_price_per_sqm,
        raw_total: raw_price_per_sqm * size_sqm,
        adjusted_total: adjusted_price_per_sqm * size_sqm,
        adjustment_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_marrakech_reference_figures() {
        let market = MarketData::default();
        let breakdown = market_adjusted(&market, "marrakech", 8000.0, 100.0);

        assert_relative_eq!(breakdown.adjustment_factor, 1.109, epsilon = 1e-12);
        assert_relative_eq!(breakdown.raw_price_per_sqm, 8000.0);
        assert_relative_eq!(breakdown.adjusted_price_per_sqm, 8872.0, epsilon = 1e-9);
        assert_relative_eq!(breakdown.raw_total, 800_000.0);
        assert_relative_eq!(breakdown.adjusted_total, 887_200.0, epsilon = 1e-6);
    }

    #[test]
    fn test_negative_prediction_is_clamped() {
        let market = MarketData::default();
        let breakdown = market_adjusted(&market, "rabat", -1500.0, 80.0);

        assert_eq!(breakdown.raw_price_per_sqm, 0.0);
        assert_eq!(breakdown.adjusted_price_per_sqm, 0.0);
        assert_eq!(breakdown.adjusted_total, 0.0);
    }

    #[test]
    fn test_unknown_city_uses_default_index() {
        let market = MarketData::default();
        let breakdown = market_adjusted(&market, "zagora", 5000.0, 50.0);

        assert_relative_eq!(breakdown.adjustment_factor, 1.105, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_prices_are_never_negative(
            raw in -1e7f64..1e7,
            size in 0.0f64..10_000.0,
            city in "[a-zA-Z ]{0,16}",
        ) {
            let market = MarketData::default();
            let breakdown = market_adjusted(&market, &city, raw, size);

            prop_assert!(breakdown.raw_price_per_sqm >= 0.0);
            prop_assert!(breakdown.adjusted_price_per_sqm >= 0.0);
            prop_assert!(breakdown.raw_total >= 0.0);
            prop_assert!(breakdown.adjusted_total >= 0.0);
        }

        #[test]
        fn prop_adjusted_is_raw_times_factor(
            raw in 0.0f64..1e7,
            size in 1.0f64..10_000.0,
        ) {
            let market = MarketData::default();
            let breakdown = market_adjusted(&market, "tanger", raw, size);

            prop_assert!(
                (breakdown.adjusted_total - breakdown.raw_total * 1.177).abs()
                    <= 1e-9 * breakdown.raw_total.max(1.0)
            );
        }
    }
}
