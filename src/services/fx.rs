//! FX rate quoting and conversion.
//!
//! Rates are a static mid-market table; the configured spread is deducted to
//! produce the effective rate a customer actually gets. All arithmetic runs
//! in `Decimal` and is rounded exactly once, half away from zero, to integer
//! minor units. The implicit fee is the gap between the mid-market result and
//! the effective result, in destination minor units.

use std::collections::HashMap;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AppError;
use crate::models::account::Currency;

#[derive(Debug, Clone)]
pub struct Quote {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub mid_market_rate: Decimal,
    pub effective_rate: Decimal,
    pub spread_pct: Decimal,
}

#[derive(Debug, Clone)]
pub struct Conversion {
    pub source_amount: i64,
    pub dest_amount: i64,

    /// Fee implicit in the spread, in destination minor units.
    pub fee_amount: i64,

    pub exchange_rate: Decimal,
    pub mid_market_rate: Decimal,
}

pub struct RateService {
    rates: HashMap<(Currency, Currency), Decimal>,
    spread_pct: Decimal,
}

impl RateService {
    pub fn new(spread_pct: f64) -> Self {
        use Currency::*;

        let rates = HashMap::from([
            ((Usd, Eur), Decimal::new(92, 2)),
            ((Eur, Usd), Decimal::new(1087, 3)),
            ((Usd, Gbp), Decimal::new(79, 2)),
            ((Gbp, Usd), Decimal::new(1266, 3)),
            ((Eur, Gbp), Decimal::new(858, 3)),
            ((Gbp, Eur), Decimal::new(1166, 3)),
        ]);

        Self {
            rates,
            spread_pct: Decimal::from_f64(spread_pct).unwrap_or_default(),
        }
    }

    /// Quote the pair. Identity pairs quote exactly 1 with zero spread.
    pub fn get_rate(&self, from: Currency, to: Currency) -> Result<Quote, AppError> {
        if from == to {
            return Ok(Quote {
                from_currency: from,
                to_currency: to,
                mid_market_rate: Decimal::ONE,
                effective_rate: Decimal::ONE,
                spread_pct: Decimal::ZERO,
            });
        }

        let mid = *self
            .rates
            .get(&(from, to))
            .ok_or(AppError::InvalidCurrency)?;
        let effective = mid * (Decimal::ONE - self.spread_pct);

        Ok(Quote {
            from_currency: from,
            to_currency: to,
            mid_market_rate: mid,
            effective_rate: effective,
            spread_pct: self.spread_pct,
        })
    }

    /// Convert `amount` source minor units into destination minor units.
    ///
    /// Dust conversions clamp to 1 minor unit: a non-zero transfer always
    /// produces a non-zero receipt, at worst slightly over-paying the
    /// recipient by a fraction of a cent.
    pub fn convert(&self, amount: i64, from: Currency, to: Currency) -> Result<Conversion, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount);
        }

        let quote = self.get_rate(from, to)?;

        if from == to {
            return Ok(Conversion {
                source_amount: amount,
                dest_amount: amount,
                fee_amount: 0,
                exchange_rate: quote.effective_rate,
                mid_market_rate: quote.mid_market_rate,
            });
        }

        let src = Decimal::from(amount);

        let dest_raw = (src * quote.effective_rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let dest_amount = dest_raw.to_i64().ok_or(AppError::InvalidAmount)?.max(1);

        let mid_rounded = (src * quote.mid_market_rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(AppError::InvalidAmount)?;
        let fee_amount = (mid_rounded - dest_amount).max(0);

        Ok(Conversion {
            source_amount: amount,
            dest_amount,
            fee_amount,
            exchange_rate: quote.effective_rate,
            mid_market_rate: quote.mid_market_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn get_rate_applies_spread() {
        let svc = RateService::new(0.005);

        let cases = [
            (Currency::Usd, Currency::Eur, "0.92", "0.9154"),
            (Currency::Eur, Currency::Usd, "1.087", "1.081565"),
            (Currency::Usd, Currency::Gbp, "0.79", "0.78605"),
        ];

        for (from, to, mid, effective) in cases {
            let quote = svc.get_rate(from, to).unwrap();
            assert_eq!(quote.mid_market_rate, dec(mid), "{from}/{to} mid");
            assert_eq!(quote.effective_rate, dec(effective), "{from}/{to} effective");
            assert_eq!(quote.spread_pct, dec("0.005"));
        }
    }

    #[test]
    fn get_rate_identity_pair_is_exactly_one() {
        let svc = RateService::new(0.005);
        let quote = svc.get_rate(Currency::Usd, Currency::Usd).unwrap();
        assert_eq!(quote.mid_market_rate, Decimal::ONE);
        assert_eq!(quote.effective_rate, Decimal::ONE);
        assert_eq!(quote.spread_pct, Decimal::ZERO);
    }

    #[test]
    fn convert_usd_to_eur_with_spread() {
        let svc = RateService::new(0.005);
        let conv = svc.convert(10_000, Currency::Usd, Currency::Eur).unwrap();

        // 10_000 * 0.9154 = 9_154; mid would have been 9_200.
        assert_eq!(conv.source_amount, 10_000);
        assert_eq!(conv.dest_amount, 9_154);
        assert_eq!(conv.fee_amount, 46);
        assert_eq!(conv.exchange_rate, dec("0.9154"));
        assert_eq!(conv.mid_market_rate, dec("0.92"));
    }

    #[test]
    fn convert_rounds_halves_away_from_zero() {
        let svc = RateService::new(0.005);

        // 10_000 * 0.78605 = 7_860.5 exactly.
        let conv = svc.convert(10_000, Currency::Usd, Currency::Gbp).unwrap();
        assert_eq!(conv.dest_amount, 7_861);
        assert_eq!(conv.fee_amount, 39);
    }

    #[test]
    fn convert_same_currency_is_passthrough() {
        let svc = RateService::new(0.005);
        let conv = svc.convert(5_000, Currency::Usd, Currency::Usd).unwrap();
        assert_eq!(conv.dest_amount, 5_000);
        assert_eq!(conv.fee_amount, 0);
        assert_eq!(conv.exchange_rate, Decimal::ONE);
    }

    #[test]
    fn convert_dust_clamps_to_one_minor_unit() {
        let svc = RateService::new(0.005);
        let conv = svc.convert(1, Currency::Usd, Currency::Eur).unwrap();
        assert_eq!(conv.dest_amount, 1);
        assert_eq!(conv.fee_amount, 0);
    }

    #[test]
    fn convert_zero_spread_means_no_fee() {
        let svc = RateService::new(0.0);
        let conv = svc.convert(10_000, Currency::Usd, Currency::Eur).unwrap();
        assert_eq!(conv.dest_amount, 9_200);
        assert_eq!(conv.fee_amount, 0);
    }

    #[test]
    fn convert_rejects_non_positive_amounts() {
        let svc = RateService::new(0.005);
        for amount in [0, -100] {
            let err = svc.convert(amount, Currency::Usd, Currency::Eur).unwrap_err();
            assert!(matches!(err, AppError::InvalidAmount));
        }
    }
}
