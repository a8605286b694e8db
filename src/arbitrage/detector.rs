//! Arbitrage opportunity detection.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use smallvec::SmallVec;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::calculator::{calculate_opportunity, ArbitrageLeg, ArbitrageOpportunity};
use crate::error::ArbitrageError;
use crate::market::{normalize_outcome, Event, MarketKey, NormalizedOutcome};

/// Prices at or below this are treated as noise.
pub const MIN_VALID_PRICE: Decimal = dec!(1.01);

/// Prices above this are treated as feed errors.
pub const MAX_VALID_PRICE: Decimal = dec!(50);

/// Check whether a quoted price is usable (`1.01 < price <= 50`).
pub fn is_valid_price(price: Decimal) -> bool {
    price > MIN_VALID_PRICE && price <= MAX_VALID_PRICE
}

/// Check whether a bookmaker title is on the allow-list.
pub fn is_allowed(bookmaker: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|b| b.eq_ignore_ascii_case(bookmaker))
}

/// One valid quote for a normalized outcome.
#[derive(Debug, Clone)]
pub(crate) struct Offer {
    pub outcome: NormalizedOutcome,
    pub bookmaker: String,
    pub price: Decimal,
}

/// Collect every valid, allowed quote for `market_key` on an event.
pub(crate) fn collect_offers(event: &Event, market_key: MarketKey, allowed: &[String]) -> Vec<Offer> {
    let mut offers = Vec::new();
    for bookmaker in &event.bookmakers {
        if !is_allowed(&bookmaker.title, allowed) {
            continue;
        }
        for market in bookmaker.markets.iter().filter(|m| m.is(market_key)) {
            for outcome in &market.outcomes {
                if !is_valid_price(outcome.price) {
                    continue;
                }
                offers.push(Offer {
                    outcome: normalize_outcome(&outcome.name, market_key.as_ref(), outcome.point),
                    bookmaker: bookmaker.title.clone(),
                    price: outcome.price,
                });
            }
        }
    }
    offers
}

/// Check the detection window, logging events that cannot be placed in time.
pub(crate) fn in_window(event: &Event, now: OffsetDateTime) -> bool {
    if event.commence_time.is_none() {
        debug!(event_id = %event.id, "Skipping event with unparseable commence time");
        return false;
    }
    event.is_in_detection_window(now)
}

/// Best price across bookmakers; ties go to the lexicographically first title.
pub(crate) fn best_price(prices: &BTreeMap<String, Decimal>) -> Option<(&String, Decimal)> {
    prices.iter().fold(None, |best, (bookmaker, price)| match best {
        Some((_, best_price)) if *price <= best_price => best,
        _ => Some((bookmaker, *price)),
    })
}

/// Find 2-way arbitrage across the allowed bookmakers.
pub fn find_arbitrage(
    events: &[Event],
    market_key: MarketKey,
    min_margin_pct: Decimal,
    allowed_bookmakers: &[String],
) -> Vec<ArbitrageOpportunity> {
    find_arbitrage_at(
        events,
        market_key,
        min_margin_pct,
        allowed_bookmakers,
        OffsetDateTime::now_utc(),
    )
}

/// [`find_arbitrage`] with an explicit clock.
#[instrument(skip(events, allowed_bookmakers), fields(events = events.len(), market = %market_key))]
pub fn find_arbitrage_at(
    events: &[Event],
    market_key: MarketKey,
    min_margin_pct: Decimal,
    allowed_bookmakers: &[String],
    now: OffsetDateTime,
) -> Vec<ArbitrageOpportunity> {
    let mut opportunities = Vec::new();

    for event in events.iter().filter(|e| in_window(e, now)) {
        match score_event(event, market_key, min_margin_pct, allowed_bookmakers, now) {
            Ok(Some(opp)) => {
                info!(
                    event_id = %event.id,
                    game = %event.title(),
                    margin_pct = %opp.margin_pct.round_dp(2),
                    "Arbitrage opportunity detected"
                );
                opportunities.push(opp);
            }
            Ok(None) => {}
            Err(e) => warn!(event_id = %event.id, error = %e, "Failed to score event"),
        }
    }

    opportunities
}

fn score_event(
    event: &Event,
    market_key: MarketKey,
    min_margin_pct: Decimal,
    allowed: &[String],
    now: OffsetDateTime,
) -> Result<Option<ArbitrageOpportunity>, ArbitrageError> {
    // outcome key -> (outcome, bookmaker -> best price)
    let mut book: BTreeMap<String, (NormalizedOutcome, BTreeMap<String, Decimal>)> = BTreeMap::new();

    for offer in collect_offers(event, market_key, allowed) {
        let (_, prices) = book
            .entry(offer.outcome.key.clone())
            .or_insert_with(|| (offer.outcome.clone(), BTreeMap::new()));
        let best = prices.entry(offer.bookmaker).or_insert(offer.price);
        if offer.price > *best {
            *best = offer.price;
        }
    }

    if book.len() != 2 {
        return Ok(None);
    }

    let contributing: std::collections::BTreeSet<&String> =
        book.values().flat_map(|(_, prices)| prices.keys()).collect();
    if contributing.len() < 2 {
        debug!(event_id = %event.id, "Only one bookmaker quotes this market");
        return Ok(None);
    }

    let mut legs: SmallVec<[ArbitrageLeg; 2]> = SmallVec::new();
    for (outcome, prices) in book.values() {
        if let Some((bookmaker, price)) = best_price(prices) {
            legs.push(ArbitrageLeg {
                outcome: outcome.clone(),
                bookmaker: bookmaker.clone(),
                price,
            });
        }
    }

    calculate_opportunity(event, market_key, legs, min_margin_pct, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockEventBuilder;
    use pretty_assertions::assert_eq;
    use time::Duration;

    fn allowed() -> Vec<String> {
        vec!["X".to_string(), "Y".to_string(), "Z".to_string()]
    }

    fn two_way(home_price: Decimal, away_price: Decimal) -> Event {
        MockEventBuilder::new("e1", "TeamA", "TeamB")
            .price("X", MarketKey::H2h, "TeamA", home_price)
            .price("X", MarketKey::H2h, "TeamB", dec!(1.50))
            .price("Y", MarketKey::H2h, "TeamA", dec!(1.50))
            .price("Y", MarketKey::H2h, "TeamB", away_price)
            .build()
    }

    #[test]
    fn price_band_is_exclusive_below_inclusive_above() {
        assert!(!is_valid_price(dec!(1.01)));
        assert!(is_valid_price(dec!(1.02)));
        assert!(is_valid_price(dec!(50)));
        assert!(!is_valid_price(dec!(50.01)));
    }

    #[test]
    fn detects_two_bookmaker_arbitrage() {
        let events = vec![two_way(dec!(2.10), dec!(2.05))];

        let found = find_arbitrage(&events, MarketKey::H2h, dec!(2.0), &allowed());

        assert_eq!(found.len(), 1);
        let opp = &found[0];
        assert_eq!(opp.legs.len(), 2);
        assert_eq!(opp.legs[0].outcome.key, "Teama");
        assert_eq!(opp.legs[0].bookmaker, "X");
        assert_eq!(opp.legs[1].bookmaker, "Y");
        assert!(opp.inv_sum < Decimal::ONE);
        assert!(opp.margin_pct >= dec!(2.0));
    }

    #[test]
    fn respects_minimum_margin() {
        let events = vec![two_way(dec!(2.10), dec!(2.05))];
        assert!(find_arbitrage(&events, MarketKey::H2h, dec!(5.0), &allowed()).is_empty());
    }

    #[test]
    fn single_bookmaker_is_not_arbitrage() {
        let event = MockEventBuilder::new("e1", "TeamA", "TeamB")
            .price("X", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("X", MarketKey::H2h, "TeamB", dec!(2.10))
            .build();

        assert!(find_arbitrage(&[event], MarketKey::H2h, dec!(0), &allowed()).is_empty());
    }

    #[test]
    fn three_way_markets_are_excluded() {
        let event = MockEventBuilder::new("e1", "TeamA", "TeamB")
            .price("X", MarketKey::H2h, "TeamA", dec!(4.0))
            .price("Y", MarketKey::H2h, "TeamB", dec!(4.0))
            .price("Z", MarketKey::H2h, "Draw", dec!(4.0))
            .build();

        assert!(find_arbitrage(&[event], MarketKey::H2h, dec!(0), &allowed()).is_empty());
    }

    #[test]
    fn disallowed_bookmakers_are_ignored() {
        let events = vec![two_way(dec!(2.10), dec!(2.05))];
        let only_x = vec!["X".to_string()];

        assert!(find_arbitrage(&events, MarketKey::H2h, dec!(0), &only_x).is_empty());
    }

    #[test]
    fn invalid_prices_are_discarded() {
        let event = MockEventBuilder::new("e1", "TeamA", "TeamB")
            .price("X", MarketKey::H2h, "TeamA", dec!(75))
            .price("X", MarketKey::H2h, "TeamB", dec!(1.2))
            .price("Y", MarketKey::H2h, "TeamA", dec!(1.2))
            .price("Y", MarketKey::H2h, "TeamB", dec!(1.2))
            .build();

        assert!(find_arbitrage(&[event], MarketKey::H2h, dec!(0), &allowed()).is_empty());
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let soon = MockEventBuilder::new("soon", "TeamA", "TeamB")
            .commence_in(Duration::minutes(30))
            .price("X", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("Y", MarketKey::H2h, "TeamB", dec!(2.05))
            .build();
        let far = MockEventBuilder::new("far", "TeamA", "TeamB")
            .commence_in(Duration::days(8))
            .price("X", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("Y", MarketKey::H2h, "TeamB", dec!(2.05))
            .build();
        let unknown = MockEventBuilder::new("unknown", "TeamA", "TeamB")
            .commence_at(None)
            .price("X", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("Y", MarketKey::H2h, "TeamB", dec!(2.05))
            .build();

        assert!(find_arbitrage(&[soon, far, unknown], MarketKey::H2h, dec!(0), &allowed()).is_empty());
    }

    #[test]
    fn totals_labels_from_different_books_are_merged() {
        let event = MockEventBuilder::new("e1", "TeamA", "TeamB")
            .line("X", MarketKey::Totals, "OVER", dec!(2.10), Some(dec!(220.5)))
            .line("Y", MarketKey::Totals, " under ", dec!(2.05), Some(dec!(220.5)))
            .build();

        let found = find_arbitrage(&[event], MarketKey::Totals, dec!(2.0), &allowed());

        assert_eq!(found.len(), 1);
        let keys: Vec<&str> = found[0].legs.iter().map(|l| l.outcome.key.as_str()).collect();
        assert_eq!(keys, vec!["Over 220.5", "Under 220.5"]);
    }

    #[test]
    fn same_bookmaker_duplicates_keep_max_price() {
        let event = MockEventBuilder::new("e1", "TeamA", "TeamB")
            .price("X", MarketKey::H2h, "TeamA", dec!(1.80))
            .price("X", MarketKey::H2h, "TeamA", dec!(2.10))
            .price("Y", MarketKey::H2h, "TeamB", dec!(2.05))
            .build();

        let found = find_arbitrage(&[event], MarketKey::H2h, dec!(0), &allowed());

        assert_eq!(found[0].legs[0].price, dec!(2.10));
    }

    #[test]
    fn equal_prices_break_ties_by_bookmaker_name() {
        let mut prices = BTreeMap::new();
        prices.insert("Zed".to_string(), dec!(2.0));
        prices.insert("Alpha".to_string(), dec!(2.0));
        prices.insert("Mid".to_string(), dec!(1.9));

        let (bookmaker, price) = best_price(&prices).unwrap();

        assert_eq!(bookmaker, "Alpha");
        assert_eq!(price, dec!(2.0));
    }
}
