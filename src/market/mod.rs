//! Market data module.
//!
//! This module handles:
//! - Upstream data types (sports, events, quotes, scores)
//! - The odds provider client
//! - The read-through odds cache
//! - Outcome label normalization
//! - Mock provider for testing

pub mod cache;
pub mod client;
pub mod mock;
pub mod normalize;
pub mod types;

pub use cache::{Freshness, Lookup, OddsCache};
pub use client::{OddsApiClient, OddsProvider};
pub use mock::{final_score, MockEventBuilder, MockFailure, MockOddsProvider};
pub use normalize::{normalize, normalize_outcome, NormalizedOutcome, Selection};
pub use types::{BookmakerQuote, Event, EventInfo, GameScore, Market, MarketKey, Outcome, Sport, TeamScore};
