//! Price quotes and the freshness/confidence checks applied before any quote
//! reaches vault arithmetic.
//!
//! The core never fetches prices. Hosts obtain a quote through the
//! [`crate::PriceOracle`] seam and pass it into engine operations, which run
//! it through [`QuoteValidation::validate`] before touching state.

use serde::{Deserialize, Serialize};

use crate::types::{Bps, Price, Timestamp};
use crate::{IndentureError, Result};

/// A validated-price candidate from an external market source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceQuote {
    /// Token price in stablecoin minor units, scaled by `PRICE_SCALE`.
    pub price: Price,
    /// Source-side observation time.
    pub timestamp: Timestamp,
    /// Source-reported confidence in bps (10_000 = fully trusted).
    pub confidence: Bps,
}

/// Quote acceptance policy, fixed at genesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteValidation {
    pub max_age_secs: i64,
    pub min_confidence_bps: u16,
}

impl QuoteValidation {
    pub fn new(max_age_secs: i64, min_confidence_bps: u16) -> Result<Self> {
        if max_age_secs <= 0 {
            return Err(IndentureError::InvalidInput(
                "max_age_secs must be > 0".into(),
            ));
        }
        if min_confidence_bps > 10_000 {
            return Err(IndentureError::InvalidInput(
                "min_confidence_bps must be <= 10_000".into(),
            ));
        }
        Ok(Self {
            max_age_secs,
            min_confidence_bps,
        })
    }

    /// Accepts or rejects a quote against this policy.
    ///
    /// Quotes from the future are rejected outright: a timestamp ahead of the
    /// caller's `now` means either clock skew beyond tolerance or a forged
    /// observation, and neither is usable for collateral valuation.
    pub fn validate(&self, quote: &PriceQuote, now: Timestamp) -> Result<Price> {
        let age_secs = now.since(quote.timestamp);
        if age_secs < 0 {
            return Err(IndentureError::InvalidInput(format!(
                "quote timestamp {} is ahead of now {}",
                quote.timestamp.get(),
                now.get()
            )));
        }
        if age_secs > self.max_age_secs {
            return Err(IndentureError::OracleStale {
                age_secs,
                max_age_secs: self.max_age_secs,
            });
        }
        if quote.confidence.get() < self.min_confidence_bps {
            return Err(IndentureError::OracleUntrusted {
                confidence_bps: quote.confidence.get(),
                min_confidence_bps: self.min_confidence_bps,
            });
        }
        Ok(quote.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(at: i64, confidence: u16) -> PriceQuote {
        PriceQuote {
            price: Price::PAR,
            timestamp: Timestamp(at),
            confidence: Bps::new(confidence).unwrap(),
        }
    }

    fn policy() -> QuoteValidation {
        QuoteValidation::new(300, 8_000).unwrap()
    }

    #[test]
    fn fresh_confident_quote_passes() {
        let p = policy()
            .validate(&quote(1_000, 9_000), Timestamp(1_100))
            .unwrap();
        assert_eq!(p, Price::PAR);
    }

    #[test]
    fn stale_quote_is_rejected() {
        let err = policy()
            .validate(&quote(1_000, 9_000), Timestamp(1_400))
            .unwrap_err();
        assert!(matches!(err, IndentureError::OracleStale { age_secs: 400, .. }));
    }

    #[test]
    fn low_confidence_quote_is_rejected() {
        let err = policy()
            .validate(&quote(1_000, 7_999), Timestamp(1_000))
            .unwrap_err();
        assert!(matches!(err, IndentureError::OracleUntrusted { .. }));
    }

    #[test]
    fn future_quote_is_rejected() {
        let err = policy()
            .validate(&quote(2_000, 9_000), Timestamp(1_000))
            .unwrap_err();
        assert!(matches!(err, IndentureError::InvalidInput(_)));
    }

    #[test]
    fn policy_rejects_degenerate_bounds() {
        assert!(QuoteValidation::new(0, 100).is_err());
        assert!(QuoteValidation::new(300, 10_001).is_err());
    }
}
