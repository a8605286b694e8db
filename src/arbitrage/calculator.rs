//! Arbitrage opportunity scoring and stake calculation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use time::OffsetDateTime;

use crate::error::ArbitrageError;
use crate::market::{Event, EventInfo, MarketKey, NormalizedOutcome};
use crate::trading::stake::{inverse_sum, split_arbitrage_stake, ArbitrageStakes};

/// Best price for one side of a 2-way market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageLeg {
    /// Normalized outcome (comparison key plus structured selection).
    pub outcome: NormalizedOutcome,
    /// Bookmaker offering the best price.
    pub bookmaker: String,
    /// Best price.
    pub price: Decimal,
}

/// Detected arbitrage opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    /// Event being traded.
    pub event: EventInfo,
    /// Market type.
    pub market_key: MarketKey,
    /// Exactly two legs.
    pub legs: SmallVec<[ArbitrageLeg; 2]>,
    /// Σ 1/best_price.
    pub inv_sum: Decimal,
    /// `(1 − inv_sum) × 100`.
    pub margin_pct: Decimal,
    /// Timestamp when opportunity was detected.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl ArbitrageOpportunity {
    /// Alert de-duplication key: `{event_id}-{market}-{margin:.1}`.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}-{}-{:.1}",
            self.event.id,
            self.market_key,
            self.margin_pct.round_dp(1)
        )
    }

    /// Price and label pairs for the stake calculator.
    pub fn priced_legs(&self) -> Vec<(String, Decimal)> {
        self.legs
            .iter()
            .map(|leg| (format!("{} @ {}", leg.outcome.key, leg.bookmaker), leg.price))
            .collect()
    }

    /// Equal-profit split of `total_stake` across the legs.
    pub fn stakes(
        &self,
        total_stake: Decimal,
        precision: u32,
    ) -> Result<ArbitrageStakes, ArbitrageError> {
        split_arbitrage_stake(&self.priced_legs(), total_stake, precision)
    }
}

/// Score the best price per side of an event.
///
/// Returns `Ok(None)` when the book is not profitable or the margin is below
/// `min_margin_pct`.
pub fn calculate_opportunity(
    event: &Event,
    market_key: MarketKey,
    legs: SmallVec<[ArbitrageLeg; 2]>,
    min_margin_pct: Decimal,
    detected_at: OffsetDateTime,
) -> Result<Option<ArbitrageOpportunity>, ArbitrageError> {
    if legs.len() != 2 {
        return Err(ArbitrageError::NotEnoughLegs {
            required: 2,
            actual: legs.len(),
        });
    }

    let priced: Vec<(String, Decimal)> = legs
        .iter()
        .map(|leg| (leg.outcome.key.clone(), leg.price))
        .collect();
    let inv_sum = inverse_sum(&priced)?;

    if inv_sum <= Decimal::ZERO || inv_sum >= Decimal::ONE {
        return Ok(None);
    }

    let margin_pct = (Decimal::ONE - inv_sum) * Decimal::ONE_HUNDRED;
    if margin_pct < min_margin_pct {
        return Ok(None);
    }

    Ok(Some(ArbitrageOpportunity {
        event: EventInfo::from(event),
        market_key,
        legs,
        inv_sum,
        margin_pct,
        detected_at,
    }))
}

/// Stand-alone calculator over user-supplied odds.
///
/// Accepts any number of legs (2 or more); rejects odds at or below 1.0 and
/// books that are not profitable.
pub fn arbitrage_calculator(
    odds: &[(String, Decimal)],
    total_stake: Decimal,
    precision: u32,
) -> Result<ArbitrageStakes, ArbitrageError> {
    split_arbitrage_stake(odds, total_stake, precision)
}
