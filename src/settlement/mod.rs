//! Settlement of virtual bets against final game results.

pub mod outcome;
pub mod resolver;

pub use outcome::{determine_outcome, final_score, match_team, FinalScore, Side};
pub use resolver::{candidate_sports, classify_age, BetAge, CycleSummary, ResolverConfig, ResultResolver};
