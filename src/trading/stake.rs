//! Stake sizing.
//!
//! Two independent, stateless strategies: equal-profit allocation across
//! arbitrage legs, and a bounded fractional-Kelly sizing for EV bets.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ArbitrageError;

/// Fraction of full Kelly used by the dollar sizer.
pub const DOLLAR_KELLY_FRACTION: Decimal = dec!(0.25);

/// Dollar stakes never exceed this share of the bankroll.
pub const MAX_BANKROLL_FRACTION: Decimal = dec!(0.02);

/// Dollar stakes for edges of at least [`FLOOR_EV_PERCENT`] never go below this share.
pub const MIN_BANKROLL_FRACTION: Decimal = dec!(0.005);

/// EV at which the dollar floor applies.
pub const FLOOR_EV_PERCENT: Decimal = dec!(5);

/// Unit stake returned when sizing is not possible.
pub const MIN_UNIT_STAKE: Decimal = dec!(0.5);

/// Estimated true win probability: `1 / (odds · (1 + ev/100))`.
pub fn true_probability(ev_percent: Decimal, odds: Decimal) -> Decimal {
    let true_odds = odds * (Decimal::ONE + ev_percent / Decimal::ONE_HUNDRED);
    if true_odds <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (Decimal::ONE / true_odds).clamp(Decimal::ZERO, Decimal::ONE)
}

/// Kelly fraction `(b·p − q) / b`, clamped to be non-negative.
pub fn kelly_fraction(true_prob: Decimal, odds: Decimal) -> Decimal {
    let b = odds - Decimal::ONE;
    if b <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let q = Decimal::ONE - true_prob;
    ((b * true_prob - q) / b).max(Decimal::ZERO)
}

/// Share of Kelly applied, shrinking with the edge.
pub fn confidence_multiplier(ev_percent: Decimal) -> Decimal {
    if ev_percent >= dec!(20) {
        dec!(0.5)
    } else if ev_percent >= dec!(15) {
        dec!(0.4)
    } else if ev_percent >= dec!(10) {
        dec!(0.3)
    } else if ev_percent >= dec!(7) {
        dec!(0.25)
    } else if ev_percent >= dec!(5) {
        dec!(0.2)
    } else {
        dec!(0.15)
    }
}

/// Stake multiplier by price band.
pub fn odds_risk_adjustment(odds: Decimal) -> Decimal {
    if odds >= dec!(4.0) {
        dec!(0.7)
    } else if odds >= dec!(3.0) {
        dec!(0.85)
    } else if odds >= dec!(2.5) {
        dec!(0.95)
    } else if odds <= dec!(1.5) {
        dec!(1.1)
    } else {
        Decimal::ONE
    }
}

/// `[min, max]` unit stake band for an EV tier.
pub fn unit_bounds(ev_percent: Decimal) -> (Decimal, Decimal) {
    if ev_percent >= dec!(15) {
        (dec!(2.0), dec!(12.0))
    } else if ev_percent >= dec!(10) {
        (dec!(1.5), dec!(8.0))
    } else if ev_percent >= dec!(7) {
        (dec!(1.0), dec!(6.0))
    } else if ev_percent >= dec!(5) {
        (dec!(0.8), dec!(4.0))
    } else {
        (dec!(0.5), dec!(2.5))
    }
}

/// Suggested stake in abstract units for an EV bet.
pub fn ev_stake_units(ev_percent: Decimal, odds: Decimal, precision: u32) -> Decimal {
    if ev_percent <= Decimal::ZERO || odds <= Decimal::ONE {
        return MIN_UNIT_STAKE;
    }

    let kelly = kelly_fraction(true_probability(ev_percent, odds), odds);
    let stake = kelly * confidence_multiplier(ev_percent) * Decimal::ONE_HUNDRED;
    let stake = stake * odds_risk_adjustment(odds);

    let (min, max) = unit_bounds(ev_percent);
    stake.clamp(min, max).round_dp(precision)
}

/// Suggested stake in currency for an EV bet against `bankroll`.
///
/// Quarter Kelly scaled by the edge (`kelly · ev/100 · 0.25 · bankroll`),
/// capped at 2% of the bankroll, with a 0.5% floor once the edge reaches 5%.
pub fn ev_stake_dollars(
    ev_percent: Decimal,
    odds: Decimal,
    bankroll: Decimal,
    precision: u32,
) -> Decimal {
    if ev_percent <= Decimal::ZERO || odds <= Decimal::ONE || bankroll <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let kelly = kelly_fraction(true_probability(ev_percent, odds), odds);
    let edge = ev_percent / Decimal::ONE_HUNDRED;
    let mut stake = (kelly * edge * DOLLAR_KELLY_FRACTION * bankroll).min(bankroll * MAX_BANKROLL_FRACTION);

    if ev_percent >= FLOOR_EV_PERCENT {
        stake = stake.max(bankroll * MIN_BANKROLL_FRACTION);
    }

    stake.round_dp(precision)
}

/// Stake on one arbitrage leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegStake {
    /// Leg label (outcome, or outcome and bookmaker).
    pub label: String,
    /// Decimal price.
    pub price: Decimal,
    /// Stake, rounded.
    pub stake: Decimal,
    /// Return if this leg wins.
    pub payout: Decimal,
    /// Profit if this leg wins (payout minus total stake).
    pub profit: Decimal,
}

/// Equal-profit stake split across arbitrage legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageStakes {
    /// Per-leg stakes.
    pub legs: Vec<LegStake>,
    /// Notional total stake.
    pub total_stake: Decimal,
    /// Σ 1/price.
    pub inv_sum: Decimal,
    /// `(1 − inv_sum) × 100`.
    pub margin_pct: Decimal,
    /// Minimum profit across outcomes.
    pub guaranteed_profit: Decimal,
    /// Guaranteed profit as a percentage of the total stake.
    pub roi_pct: Decimal,
}

/// Sum of reciprocal prices, rejecting any price at or below 1.
pub fn inverse_sum(legs: &[(String, Decimal)]) -> Result<Decimal, ArbitrageError> {
    legs.iter().try_fold(Decimal::ZERO, |acc, (label, price)| {
        if *price <= Decimal::ONE {
            return Err(ArbitrageError::InvalidPrice {
                outcome: label.clone(),
                price: *price,
            });
        }
        Ok(acc + Decimal::ONE / *price)
    })
}

/// Split `total_stake` so every leg returns the same amount.
///
/// Leg stake is `T / (price · inv_sum)`; every leg then pays `T / inv_sum`.
/// Stakes are rounded to `precision` places and profits are computed from
/// the rounded stakes, so they may differ by a rounding step.
pub fn split_arbitrage_stake(
    legs: &[(String, Decimal)],
    total_stake: Decimal,
    precision: u32,
) -> Result<ArbitrageStakes, ArbitrageError> {
    if legs.len() < 2 {
        return Err(ArbitrageError::NotEnoughLegs {
            required: 2,
            actual: legs.len(),
        });
    }
    if total_stake <= Decimal::ZERO {
        return Err(ArbitrageError::InvalidStake(total_stake));
    }

    let inv_sum = inverse_sum(legs)?;
    if inv_sum >= Decimal::ONE {
        return Err(ArbitrageError::NoOpportunity { inv_sum });
    }

    let leg_stakes: Vec<LegStake> = legs
        .iter()
        .map(|(label, price)| {
            let stake = (total_stake / (*price * inv_sum)).round_dp(precision);
            let payout = (stake * *price).round_dp(precision);
            LegStake {
                label: label.clone(),
                price: *price,
                stake,
                payout,
                profit: payout - total_stake,
            }
        })
        .collect();

    let guaranteed_profit = leg_stakes
        .iter()
        .map(|leg| leg.profit)
        .min()
        .unwrap_or(Decimal::ZERO);

    Ok(ArbitrageStakes {
        legs: leg_stakes,
        total_stake,
        inv_sum,
        margin_pct: (Decimal::ONE - inv_sum) * Decimal::ONE_HUNDRED,
        guaranteed_profit,
        roi_pct: guaranteed_profit / total_stake * Decimal::ONE_HUNDRED,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn legs(prices: &[Decimal]) -> Vec<(String, Decimal)> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("leg{}", i), *p))
            .collect()
    }

    #[test]
    fn true_probability_discounts_offered_odds_by_edge() {
        // true odds 2.0 x 1.1 = 2.2
        assert_eq!(true_probability(dec!(10), dec!(2.0)), Decimal::ONE / dec!(2.2));
        assert_eq!(true_probability(dec!(0), dec!(4.0)), dec!(0.25));
    }

    #[test]
    fn units_follow_kelly_with_confidence_band() {
        // p = 1/2.2, kelly < 0 -> 0, lifted to the 10% tier minimum
        assert_eq!(ev_stake_units(dec!(10), dec!(2.0), 1), dec!(1.5));
    }

    #[test]
    fn units_are_clamped_into_tier_bounds() {
        assert_eq!(ev_stake_units(dec!(5.13), dec!(2.05), 1), dec!(0.8));
        assert_eq!(ev_stake_units(dec!(7), dec!(3.0), 1), dec!(1.0));
        assert_eq!(ev_stake_units(dec!(1), dec!(2.0), 1), dec!(0.5));
        assert_eq!(ev_stake_units(dec!(60), dec!(2.0), 1), dec!(2.0));
    }

    #[test]
    fn units_fall_back_to_minimum_on_bad_inputs() {
        assert_eq!(ev_stake_units(dec!(0), dec!(2.0), 1), MIN_UNIT_STAKE);
        assert_eq!(ev_stake_units(dec!(10), dec!(1.0), 1), MIN_UNIT_STAKE);
    }

    #[test]
    fn long_odds_are_scaled_down() {
        assert_eq!(odds_risk_adjustment(dec!(4.5)), dec!(0.7));
        assert_eq!(odds_risk_adjustment(dec!(3.2)), dec!(0.85));
        assert_eq!(odds_risk_adjustment(dec!(2.5)), dec!(0.95));
        assert_eq!(odds_risk_adjustment(dec!(1.4)), dec!(1.1));
        assert_eq!(odds_risk_adjustment(dec!(2.0)), Decimal::ONE);
    }

    #[test]
    fn kelly_is_never_negative() {
        assert_eq!(kelly_fraction(dec!(0.2), dec!(2.0)), Decimal::ZERO);
        assert_eq!(kelly_fraction(dec!(0.6), dec!(1.0)), Decimal::ZERO);
    }

    #[test]
    fn dollars_scale_kelly_by_edge() {
        // kelly 0 under the discounted probability, so only the floor remains
        assert_eq!(ev_stake_dollars(dec!(10), dec!(2.0), dec!(1000), 2), dec!(5.00));
        assert!(ev_stake_dollars(dec!(10), dec!(2.0), dec!(1000), 2) <= dec!(20.00));
    }

    #[test]
    fn dollars_floor_applies_from_five_percent() {
        assert_eq!(ev_stake_dollars(dec!(5.13), dec!(2.05), dec!(1000), 2), dec!(5.00));
        assert_eq!(ev_stake_dollars(dec!(5), dec!(10.0), dec!(2000), 2), dec!(10.00));
        // below 5% there is no floor
        assert_eq!(ev_stake_dollars(dec!(1), dec!(2.0), dec!(1000), 2), dec!(0.00));
    }

    #[test]
    fn dollars_are_zero_for_invalid_inputs() {
        assert_eq!(ev_stake_dollars(dec!(-1), dec!(2.0), dec!(1000), 2), Decimal::ZERO);
        assert_eq!(ev_stake_dollars(dec!(5), dec!(1.0), dec!(1000), 2), Decimal::ZERO);
    }

    #[test]
    fn arbitrage_split_equalizes_returns() {
        let stakes = split_arbitrage_stake(&legs(&[dec!(2.10), dec!(2.05)]), dec!(100), 10).unwrap();

        let target = dec!(100) / stakes.inv_sum;
        for leg in &stakes.legs {
            assert!((leg.stake * leg.price - target).abs() < dec!(0.0000001));
        }
        assert!((stakes.margin_pct - dec!(3.6005)).abs() < dec!(0.001));
        assert!(stakes.guaranteed_profit > Decimal::ZERO);
    }

    #[test]
    fn arbitrage_split_rounds_to_precision() {
        let stakes = split_arbitrage_stake(&legs(&[dec!(2.10), dec!(2.05)]), dec!(100), 2).unwrap();

        assert_eq!(stakes.legs[0].stake, dec!(49.40));
        assert_eq!(stakes.legs[1].stake, dec!(50.60));
        assert_eq!(stakes.guaranteed_profit, dec!(3.73));
    }

    #[test]
    fn arbitrage_split_rejects_bad_inputs() {
        assert!(matches!(
            split_arbitrage_stake(&legs(&[dec!(1.0), dec!(3.0)]), dec!(100), 2),
            Err(ArbitrageError::InvalidPrice { .. })
        ));
        assert!(matches!(
            split_arbitrage_stake(&legs(&[dec!(1.9), dec!(1.9)]), dec!(100), 2),
            Err(ArbitrageError::NoOpportunity { .. })
        ));
        assert!(matches!(
            split_arbitrage_stake(&legs(&[dec!(2.1), dec!(2.1)]), dec!(0), 2),
            Err(ArbitrageError::InvalidStake(_))
        ));
        assert!(matches!(
            split_arbitrage_stake(&legs(&[dec!(2.1)]), dec!(10), 2),
            Err(ArbitrageError::NotEnoughLegs { .. })
        ));
    }
}
