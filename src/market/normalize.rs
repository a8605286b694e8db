//! Outcome label canonicalization.
//!
//! Bookmakers label the same selection differently ("OVER", " Over ",
//! "Tie", "draw"). Every outcome is reduced to a key that compares equal
//! across bookmakers when it describes the same real-world bet.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::MarketKey;

/// Labels treated as the draw outcome of a head-to-head market.
pub const DRAW_SYNONYMS: [&str; 3] = ["draw", "tie", "deadlock"];

/// Canonical draw token.
pub const DRAW_KEY: &str = "Draw";

/// Which side of a market a selection backs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "side", content = "name", rename_all = "snake_case")]
pub enum Selection {
    /// A named team (head-to-head or spread).
    Team(String),
    /// The draw of a head-to-head market.
    Draw,
    /// Combined score above the line.
    Over,
    /// Combined score below the line.
    Under,
    /// Anything the scanner cannot classify.
    Other(String),
}

/// Structured form of a normalized outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedOutcome {
    /// Comparison key, e.g. `Over 45.5` or `Lakers (-3.5)`.
    pub key: String,
    /// Side backed by the selection.
    pub selection: Selection,
    /// Line, for totals and spreads.
    pub point: Option<Decimal>,
}

/// Normalize a raw label into its cross-bookmaker comparison key.
pub fn normalize(raw_label: &str, market_key: &str, point: Option<Decimal>) -> String {
    normalize_outcome(raw_label, market_key, point).key
}

/// Normalize a raw label, keeping the structured selection alongside the key.
pub fn normalize_outcome(
    raw_label: &str,
    market_key: &str,
    point: Option<Decimal>,
) -> NormalizedOutcome {
    let clean = clean_label(raw_label);

    match MarketKey::from_str(market_key.trim()) {
        Ok(MarketKey::H2h) => {
            if DRAW_SYNONYMS.contains(&clean.as_str()) {
                NormalizedOutcome {
                    key: DRAW_KEY.to_string(),
                    selection: Selection::Draw,
                    point: None,
                }
            } else {
                let team = title_case(&clean);
                NormalizedOutcome {
                    key: team.clone(),
                    selection: Selection::Team(team),
                    point: None,
                }
            }
        }
        Ok(MarketKey::Totals) => {
            let line = point.unwrap_or(Decimal::ZERO).normalize();
            let (key, selection) = if clean.contains("over") {
                (format!("Over {}", line), Selection::Over)
            } else if clean.contains("under") {
                (format!("Under {}", line), Selection::Under)
            } else {
                let label = title_case(&clean);
                (format!("{} {}", label, line), Selection::Other(label))
            };
            NormalizedOutcome {
                key,
                selection,
                point: Some(line),
            }
        }
        Ok(MarketKey::Spreads) => {
            let line = point.unwrap_or(Decimal::ZERO).normalize();
            let team = title_case(&clean);
            NormalizedOutcome {
                key: format!("{} ({})", team, signed(line)),
                selection: Selection::Team(team),
                point: Some(line),
            }
        }
        Err(_) => {
            let label = title_case(&clean);
            NormalizedOutcome {
                key: label.clone(),
                selection: Selection::Other(label),
                point,
            }
        }
    }
}

/// Lowercase, trim and collapse internal whitespace.
pub fn clean_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Uppercase the first letter of each word.
pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a line with an explicit sign: `+3.5`, `-7`, `+0`.
pub fn signed(line: Decimal) -> String {
    if line.is_sign_negative() && !line.is_zero() {
        line.to_string()
    } else {
        format!("+{}", line.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn totals_are_case_and_whitespace_insensitive() {
        let a = normalize("  Over ", "totals", Some(dec!(45.5)));
        let b = normalize("OVER", "totals", Some(dec!(45.5)));
        assert_eq!(a, "Over 45.5");
        assert_eq!(a, b);
        assert_eq!(normalize("under", "totals", Some(dec!(45.50))), "Under 45.5");
    }

    #[test]
    fn normalization_is_deterministic() {
        let first = normalize_outcome("Los Angeles Lakers", "h2h", None);
        let second = normalize_outcome("Los Angeles Lakers", "h2h", None);
        assert_eq!(first, second);
    }

    #[test]
    fn h2h_draw_synonyms_collapse() {
        for label in ["Draw", "TIE", " deadlock "] {
            let outcome = normalize_outcome(label, "h2h", None);
            assert_eq!(outcome.key, DRAW_KEY);
            assert_eq!(outcome.selection, Selection::Draw);
        }
    }

    #[test]
    fn h2h_team_names_are_title_cased() {
        let outcome = normalize_outcome("los  angeles LAKERS", "h2h", None);
        assert_eq!(outcome.key, "Los Angeles Lakers");
        assert_eq!(outcome.selection, Selection::Team("Los Angeles Lakers".to_string()));
    }

    #[test]
    fn spreads_carry_signed_line() {
        assert_eq!(normalize("Lakers", "spreads", Some(dec!(-3.5))), "Lakers (-3.5)");
        assert_eq!(normalize("lakers", "spreads", Some(dec!(3.50))), "Lakers (+3.5)");
        assert_eq!(normalize("Lakers", "spreads", Some(dec!(0))), "Lakers (+0)");

        let outcome = normalize_outcome("Lakers", "spreads", Some(dec!(-3.5)));
        assert_eq!(outcome.point, Some(dec!(-3.5)));
    }

    #[test]
    fn unknown_market_falls_back_to_title_case() {
        let outcome = normalize_outcome("manchester united", "outrights", None);
        assert_eq!(outcome.key, "Manchester United");
        assert_eq!(outcome.selection, Selection::Other("Manchester United".to_string()));
    }

    #[test]
    fn totals_without_point_use_zero_line() {
        assert_eq!(normalize("Over", "totals", None), "Over 0");
    }
}
