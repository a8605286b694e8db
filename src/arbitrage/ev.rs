//! Positive expected value detection.
//!
//! Fair price for an outcome is the reciprocal of the trimmed mean implied
//! probability across every allowed bookmaker quoting it. The best offer is
//! then compared against that consensus.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::detector::{best_price, collect_offers, in_window};
use crate::market::{Event, EventInfo, MarketKey, NormalizedOutcome, Selection};
use crate::trading::stake::ev_stake_units;

/// Minimum quotes needed to establish a consensus.
pub const MIN_QUOTES: usize = 2;

/// Detected positive-EV offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvOpportunity {
    /// Event being priced.
    pub event: EventInfo,
    /// Market type.
    pub market_key: MarketKey,
    /// Normalized outcome key.
    pub outcome: String,
    /// Structured selection behind the key.
    pub selection: Selection,
    /// Line, for totals and spreads.
    pub point: Option<Decimal>,
    /// Bookmaker with the best offer.
    pub bookmaker: String,
    /// Best offered price.
    pub offered_price: Decimal,
    /// Consensus fair price, rounded to 2 places.
    pub fair_price: Decimal,
    /// `(offered / fair − 1) × 100`, rounded to 2 places.
    pub ev_percent: Decimal,
    /// Suggested stake in units.
    pub suggested_units: Decimal,
    /// Number of quotes behind the fair price.
    pub num_bookmakers: usize,
    /// Timestamp when opportunity was detected.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl EvOpportunity {
    /// Alert de-duplication key: `{event_id}-{outcome}`.
    pub fn dedup_key(&self) -> String {
        format!("{}-{}", self.event.id, self.outcome)
    }

    /// Structured form of the backed outcome.
    pub fn normalized(&self) -> NormalizedOutcome {
        NormalizedOutcome {
            key: self.outcome.clone(),
            selection: self.selection.clone(),
            point: self.point,
        }
    }
}

/// Consensus fair price from a set of quotes.
///
/// With 3 or more quotes, `max(1, n / 10)` implied probabilities are trimmed
/// from each end before averaging. Returns `None` for an empty set or any
/// non-positive price.
pub fn fair_price(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() || prices.iter().any(|p| *p <= Decimal::ZERO) {
        return None;
    }

    let mut implied: Vec<Decimal> = prices.iter().map(|p| Decimal::ONE / *p).collect();
    implied.sort();

    let n = implied.len();
    let kept = if n >= 3 {
        let trim = (n / 10).max(1);
        if n > 2 * trim {
            &implied[trim..n - trim]
        } else {
            &implied[..]
        }
    } else {
        &implied[..]
    };

    let mean = kept.iter().copied().sum::<Decimal>() / Decimal::from(kept.len());
    Decimal::ONE.checked_div(mean)
}

/// `(offered / fair − 1) × 100`.
pub fn expected_value_percent(offered_price: Decimal, fair_price: Decimal) -> Decimal {
    match offered_price.checked_div(fair_price) {
        Some(ratio) => (ratio - Decimal::ONE) * Decimal::ONE_HUNDRED,
        None => Decimal::ZERO,
    }
}

/// Find offers priced above consensus by at least `min_ev_percent`.
pub fn find_ev_opportunities(
    events: &[Event],
    market_key: MarketKey,
    min_ev_percent: Decimal,
    allowed_bookmakers: &[String],
) -> Vec<EvOpportunity> {
    find_ev_opportunities_at(
        events,
        market_key,
        min_ev_percent,
        allowed_bookmakers,
        OffsetDateTime::now_utc(),
        1,
    )
}

/// [`find_ev_opportunities`] with an explicit clock and unit precision.
///
/// Results are sorted by EV, highest first.
#[instrument(skip(events, allowed_bookmakers), fields(events = events.len(), market = %market_key))]
pub fn find_ev_opportunities_at(
    events: &[Event],
    market_key: MarketKey,
    min_ev_percent: Decimal,
    allowed_bookmakers: &[String],
    now: OffsetDateTime,
    units_precision: u32,
) -> Vec<EvOpportunity> {
    let mut opportunities = Vec::new();

    for event in events.iter().filter(|e| in_window(e, now)) {
        // outcome key -> (outcome, every quote)
        let mut quotes: BTreeMap<String, (NormalizedOutcome, Vec<(String, Decimal)>)> =
            BTreeMap::new();
        for offer in collect_offers(event, market_key, allowed_bookmakers) {
            quotes
                .entry(offer.outcome.key.clone())
                .or_insert_with(|| (offer.outcome.clone(), Vec::new()))
                .1
                .push((offer.bookmaker, offer.price));
        }

        for (outcome, offers) in quotes.values() {
            if offers.len() < MIN_QUOTES {
                continue;
            }

            let prices: Vec<Decimal> = offers.iter().map(|(_, p)| *p).collect();
            let Some(fair) = fair_price(&prices) else {
                continue;
            };

            // Best price per bookmaker, then best overall with the name tie-break.
            let mut per_book: BTreeMap<String, Decimal> = BTreeMap::new();
            for (bookmaker, price) in offers {
                let best = per_book.entry(bookmaker.clone()).or_insert(*price);
                if *price > *best {
                    *best = *price;
                }
            }
            let Some((bookmaker, offered)) = best_price(&per_book) else {
                continue;
            };

            let ev = expected_value_percent(offered, fair);
            if ev < min_ev_percent {
                continue;
            }

            debug!(
                event_id = %event.id,
                outcome = %outcome.key,
                bookmaker = %bookmaker,
                ev = %ev.round_dp(2),
                "EV opportunity detected"
            );

            opportunities.push(EvOpportunity {
                event: EventInfo::from(event),
                market_key,
                outcome: outcome.key.clone(),
                selection: outcome.selection.clone(),
                point: outcome.point,
                bookmaker: bookmaker.clone(),
                offered_price: offered,
                fair_price: fair.round_dp(2),
                ev_percent: ev.round_dp(2),
                suggested_units: ev_stake_units(ev, offered, units_precision),
                num_bookmakers: offers.len(),
                detected_at: now,
            });
        }
    }

    opportunities.sort_by(|a, b| b.ev_percent.cmp(&a.ev_percent));
    opportunities
}
