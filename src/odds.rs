//! Betting odds parsing and win-multiplier math.
//!
//! Odds come in as moderator-entered strings. `"[N:D]"` is a fixed-odds
//! spec paying N/D per scale staked; an absent or empty string means
//! parimutuel, where the multiplier is the ratio of the total pool to the
//! winning pool. Awarded amounts are always floored into whole scales.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Parsed odds for one betting option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Odds {
    /// No fixed odds: the multiplier comes from relative pool sizes.
    Parimutuel,
    /// Fixed odds `[N:D]`: multiplier N/D regardless of pool sizes.
    Fixed { numerator: u32, denominator: u32 },
    /// Malformed odds recovered from storage. Pays nothing.
    Void,
}

impl Odds {
    /// Parse an odds string. Total: anything malformed degrades to
    /// [`Odds::Void`] rather than failing, so settlement can never error
    /// on stored data. Input validation happens separately via
    /// [`Odds::validate`] before a game is persisted.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Odds::Parimutuel,
            Some(s) if s.trim().is_empty() => Odds::Parimutuel,
            Some(s) => Self::parse_fixed(s.trim()).unwrap_or(Odds::Void),
        }
    }

    fn parse_fixed(s: &str) -> Option<Odds> {
        let inner = s.strip_prefix('[')?.strip_suffix(']')?;
        let (numerator, denominator) = inner.split_once(':')?;
        let numerator: u32 = numerator.parse().ok()?;
        let denominator: u32 = denominator.parse().ok()?;
        Some(Odds::Fixed {
            numerator,
            // Clamp to avoid division by zero.
            denominator: denominator.max(1),
        })
    }

    /// Whether a moderator-entered odds string is acceptable input.
    pub fn validate(raw: &str) -> bool {
        !matches!(Self::parse(Some(raw)), Odds::Void)
    }

    /// Win multiplier given the full pool and the pool on the winning
    /// option. A parimutuel round with no winning stake pays 0.
    pub fn win_multiplier(&self, total_pool: i64, winning_pool: i64) -> Decimal {
        match *self {
            Odds::Parimutuel => {
                if winning_pool == 0 {
                    Decimal::ZERO
                } else {
                    Decimal::from(total_pool) / Decimal::from(winning_pool)
                }
            }
            Odds::Fixed {
                numerator,
                denominator,
            } => Decimal::from(numerator) / Decimal::from(denominator.max(1)),
            Odds::Void => Decimal::ZERO,
        }
    }

    /// Payout for a single winning wager: `floor(multiplier * stake)`.
    pub fn payout(multiplier: Decimal, stake: i64) -> i64 {
        (multiplier * Decimal::from(stake))
            .floor()
            .to_i64()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
