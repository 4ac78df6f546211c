//! Wager rules: numbers, stakes, draw outcomes, hit evaluation and payouts.
//!
//! Everything here is pure. Persistence and transactions live in the daemon.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places used for every persisted money amount.
pub const MONEY_DP: u32 = 2;

/// Largest accepted stake amount (`NUMERIC(12,2)`).
pub const MAX_STAKE: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Historical bound on the number of special numbers per draw.
pub const DEFAULT_MAX_SPECIALS: usize = 5;

/// Validation errors for wager inputs and draw outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WagerError {
    #[error("invalid number '{0}' (expected 00-99)")]
    InvalidNumber(String),

    #[error("invalid stake '{0}'")]
    InvalidStake(String),

    #[error("all stakes are zero")]
    ZeroStake,

    #[error("amount out of range: {0}")]
    Overflow(String),

    #[error("invalid size class '{0}'")]
    InvalidSizeClass(String),

    #[error("invalid parity class '{0}'")]
    InvalidParityClass(String),

    #[error("invalid special numbers: {0}")]
    InvalidSpecials(String),

    #[error("unknown hit type '{0}'")]
    UnknownHitType(String),
}

/// Normalize a bet or draw number to its two-digit form.
///
/// Accepts one or two ASCII digits ("7" becomes "07").
pub fn normalize_number(raw: &str) -> Result<String, WagerError> {
    let s = raw.trim();
    if s.is_empty() || s.len() > 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WagerError::InvalidNumber(raw.to_string()));
    }
    Ok(format!("{s:0>2}"))
}

/// Round a money amount to two places, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Render a money amount with exactly two decimals (storage form).
pub fn money_text(value: Decimal) -> String {
    format!("{:.2}", round_money(value))
}

// =========================================================================
// Stakes
// =========================================================================

/// The six independent stake amounts of one bet line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stakes {
    /// Straight number, head only.
    pub n1: Decimal,
    /// Straight number, head or special.
    pub n: Decimal,
    pub big: Decimal,
    pub small: Decimal,
    pub odd: Decimal,
    pub even: Decimal,
}

impl Stakes {
    /// Parse user-entered amounts in the order n1, n, big, small, odd, even.
    ///
    /// Blank fields count as zero. Amounts must be non-negative with at most
    /// two decimal places.
    pub fn parse(inputs: [&str; 6]) -> Result<Self, WagerError> {
        let [n1, n, big, small, odd, even] = inputs.map(parse_amount);
        Ok(Self {
            n1: n1?,
            n: n?,
            big: big?,
            small: small?,
            odd: odd?,
            even: even?,
        })
    }

    const fn amounts(&self) -> [Decimal; 6] {
        [self.n1, self.n, self.big, self.small, self.odd, self.even]
    }

    /// Sum of the six stakes.
    pub fn total(&self) -> Result<Decimal, WagerError> {
        self.amounts()
            .into_iter()
            .try_fold(Decimal::ZERO, |sum, amount| {
                sum.checked_add(amount)
                    .ok_or_else(|| WagerError::Overflow(format!("{sum} + {amount}")))
            })
    }

    /// Whether every stake is zero (such rows are never stored).
    pub fn is_zero(&self) -> bool {
        self.amounts().iter().all(Decimal::is_zero)
    }

    /// Ensure every amount is a valid non-negative money value and at least
    /// one is positive.
    pub fn validate(&self) -> Result<(), WagerError> {
        for amount in self.amounts() {
            check_amount(amount)?;
        }
        if self.is_zero() {
            return Err(WagerError::ZeroStake);
        }
        Ok(())
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, WagerError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let amount = Decimal::from_str(s).map_err(|_| WagerError::InvalidStake(raw.to_string()))?;
    check_amount(amount)?;
    Ok(amount)
}

fn check_amount(amount: Decimal) -> Result<(), WagerError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(WagerError::InvalidStake(amount.to_string()));
    }
    if amount.normalize().scale() > MONEY_DP || amount > MAX_STAKE {
        return Err(WagerError::InvalidStake(amount.to_string()));
    }
    Ok(())
}

// =========================================================================
// Hit types and odds
// =========================================================================

/// Category of a winning match; the persisted tag is [`HitType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HitType {
    JackpotExact,
    HeadMatch,
    SpecialMatch,
    Big,
    Small,
    Odd,
    Even,
}

impl HitType {
    pub const ALL: [Self; 7] = [
        Self::JackpotExact,
        Self::HeadMatch,
        Self::SpecialMatch,
        Self::Big,
        Self::Small,
        Self::Odd,
        Self::Even,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JackpotExact => "N1",
            Self::HeadMatch => "N_HEAD",
            Self::SpecialMatch => "N_SPECIAL",
            Self::Big => "B",
            Self::Small => "S",
            Self::Odd => "DS",
            Self::Even => "SS",
        }
    }

    /// The stake field this hit type pays out on.
    pub const fn stake_of(&self, stakes: &Stakes) -> Decimal {
        match self {
            Self::JackpotExact => stakes.n1,
            Self::HeadMatch | Self::SpecialMatch => stakes.n,
            Self::Big => stakes.big,
            Self::Small => stakes.small,
            Self::Odd => stakes.odd,
            Self::Even => stakes.even,
        }
    }
}

impl fmt::Display for HitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HitType {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == s)
            .ok_or_else(|| WagerError::UnknownHitType(s.to_string()))
    }
}

/// Payout multipliers per hit type, inclusive of principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Odds {
    pub jackpot_exact: Decimal,
    pub head_match: Decimal,
    pub special_match: Decimal,
    pub big_small: Decimal,
    pub odd_even: Decimal,
}

impl Default for Odds {
    fn default() -> Self {
        Self {
            jackpot_exact: Decimal::from(50),
            head_match: Decimal::from(28),
            special_match: Decimal::from(7),
            big_small: Decimal::new(190, 2),
            odd_even: Decimal::new(190, 2),
        }
    }
}

impl Odds {
    pub const fn multiplier(&self, hit: HitType) -> Decimal {
        match hit {
            HitType::JackpotExact => self.jackpot_exact,
            HitType::HeadMatch => self.head_match,
            HitType::SpecialMatch => self.special_match,
            HitType::Big | HitType::Small => self.big_small,
            HitType::Odd | HitType::Even => self.odd_even,
        }
    }

    /// `stake * (multiplier - 1)`, rounded to two places half away from zero.
    pub fn payout(&self, hit: HitType, stake: Decimal) -> Result<Decimal, WagerError> {
        self.multiplier(hit)
            .checked_sub(Decimal::ONE)
            .and_then(|net| stake.checked_mul(net))
            .map(round_money)
            .ok_or_else(|| WagerError::Overflow(format!("{stake} at {hit} odds")))
    }
}

// =========================================================================
// Draw outcome
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeClass {
    Big,
    Small,
}

impl SizeClass {
    /// Big iff the head is 50 or above.
    pub const fn of(head: u8) -> Self {
        if head >= 50 { Self::Big } else { Self::Small }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Big => "big",
            Self::Small => "small",
        }
    }
}

impl FromStr for SizeClass {
    type Err = WagerError;

    /// Accepts the English names and the legacy labels 大/小.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "big" | "b" | "大" => Ok(Self::Big),
            "small" | "s" | "小" => Ok(Self::Small),
            _ => Err(WagerError::InvalidSizeClass(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityClass {
    Odd,
    Even,
}

impl ParityClass {
    pub const fn of(head: u8) -> Self {
        if head % 2 == 1 { Self::Odd } else { Self::Even }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Odd => "odd",
            Self::Even => "even",
        }
    }
}

impl FromStr for ParityClass {
    type Err = WagerError;

    /// Accepts the English names and the legacy labels 单/双.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "odd" | "单" => Ok(Self::Odd),
            "even" | "双" => Ok(Self::Even),
            _ => Err(WagerError::InvalidParityClass(s.to_string())),
        }
    }
}

/// Validated outcome of one (slot, market) draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub head: String,
    pub specials: Vec<String>,
    pub size: SizeClass,
    pub parity: ParityClass,
}

impl DrawOutcome {
    /// Parse a stored or entered draw.
    ///
    /// `specials` is comma separated. Size and parity are derived from the
    /// head when not supplied (blank counts as not supplied).
    pub fn parse(
        head: &str,
        specials: &str,
        size: Option<&str>,
        parity: Option<&str>,
        max_specials: usize,
    ) -> Result<Self, WagerError> {
        let head = normalize_number(head)?;
        let head_value: u8 = head
            .parse()
            .map_err(|_| WagerError::InvalidNumber(head.clone()))?;

        let mut parsed = Vec::new();
        for raw in specials.split(',').filter(|s| !s.trim().is_empty()) {
            let number = normalize_number(raw)?;
            if number == head {
                return Err(WagerError::InvalidSpecials(format!(
                    "{number} is also the head number"
                )));
            }
            if parsed.contains(&number) {
                return Err(WagerError::InvalidSpecials(format!("{number} is repeated")));
            }
            parsed.push(number);
        }
        if parsed.len() > max_specials {
            return Err(WagerError::InvalidSpecials(format!(
                "{} given, at most {max_specials} allowed",
                parsed.len()
            )));
        }

        let size = match size.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse()?,
            None => SizeClass::of(head_value),
        };
        let parity = match parity.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse()?,
            None => ParityClass::of(head_value),
        };

        Ok(Self {
            head,
            specials: parsed,
            size,
            parity,
        })
    }

    /// Specials in storage form.
    pub fn specials_csv(&self) -> String {
        self.specials.join(",")
    }
}

/// One winning match of a bet line against a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub hit_type: HitType,
    pub stake: Decimal,
    pub odds: Decimal,
    pub payout: Decimal,
}

/// Evaluate the six stake rules of one bet line against a draw.
///
/// Each rule only fires with a positive stake. Head and special matches on the
/// `n` stake are mutually exclusive: a head match wins. Fails when a payout
/// does not fit in a decimal.
pub fn evaluate(
    number: &str,
    stakes: &Stakes,
    draw: &DrawOutcome,
    odds: &Odds,
) -> Result<Vec<Hit>, WagerError> {
    let is_head = number == draw.head;
    let n_hit = if is_head {
        Some(HitType::HeadMatch)
    } else if draw.specials.iter().any(|s| s == number) {
        Some(HitType::SpecialMatch)
    } else {
        None
    };

    let candidates = [
        is_head.then_some(HitType::JackpotExact),
        n_hit,
        (draw.size == SizeClass::Big).then_some(HitType::Big),
        (draw.size == SizeClass::Small).then_some(HitType::Small),
        (draw.parity == ParityClass::Odd).then_some(HitType::Odd),
        (draw.parity == ParityClass::Even).then_some(HitType::Even),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter(|hit_type| hit_type.stake_of(stakes) > Decimal::ZERO)
        .map(|hit_type| -> Result<Hit, WagerError> {
            let stake = hit_type.stake_of(stakes);
            Ok(Hit {
                hit_type,
                stake,
                odds: odds.multiplier(hit_type),
                payout: odds.payout(hit_type, stake)?,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn draw_14() -> DrawOutcome {
        DrawOutcome::parse("14", "15,88,99,87,62", Some("small"), Some("even"), 5).unwrap()
    }

    fn stakes(n1: &str, n: &str) -> Stakes {
        Stakes::parse([n1, n, "", "", "", ""]).unwrap()
    }

    #[test]
    fn normalizes_numbers() {
        // One-digit entry is padded rather than rejected.
        assert_eq!(normalize_number("7").unwrap(), "07");
        assert_eq!(normalize_number("0").unwrap(), "00");
        assert_eq!(normalize_number(" 9").unwrap(), "09");
        assert_eq!(normalize_number(" 42 ").unwrap(), "42");
        assert_eq!(normalize_number("00").unwrap(), "00");
        for bad in ["", "100", "-1", "4a", "１２"] {
            assert!(normalize_number(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn stakes_parse_and_validate() {
        let s = Stakes::parse(["10", "", "2.5", "0", "", "1.25"]).unwrap();
        assert_eq!(s.n1, dec("10"));
        assert_eq!(s.n, Decimal::ZERO);
        assert_eq!(s.total().unwrap(), dec("13.75"));
        assert!(s.validate().is_ok());

        assert!(matches!(
            Stakes::parse(["abc", "", "", "", "", ""]),
            Err(WagerError::InvalidStake(_))
        ));
        assert!(Stakes::parse(["-1", "", "", "", "", ""]).is_err());
        assert!(Stakes::parse(["1.001", "", "", "", "", ""]).is_err());
        assert_eq!(
            Stakes::parse(["", "0", "0.00", "", "", ""]).unwrap().validate(),
            Err(WagerError::ZeroStake)
        );
    }

    #[test]
    fn stakes_are_capped() {
        assert_eq!(MAX_STAKE, dec("9999999999.99"));
        let max = Stakes::parse(["9999999999.99"; 6]).unwrap();
        assert!(max.validate().is_ok());
        assert_eq!(max.total().unwrap(), dec("59999999999.94"));

        assert!(matches!(
            Stakes::parse(["10000000000", "", "", "", "", ""]),
            Err(WagerError::InvalidStake(_))
        ));
        let huge = "50000000000000000000000000000";
        assert!(Stakes::parse([huge, huge, "", "", "", ""]).is_err());

        // Amounts that bypassed parsing are still refused without panicking.
        let unchecked = Stakes {
            n1: Decimal::MAX,
            n: Decimal::MAX,
            ..Stakes::default()
        };
        assert!(matches!(unchecked.total(), Err(WagerError::Overflow(_))));
        assert!(matches!(unchecked.validate(), Err(WagerError::InvalidStake(_))));
    }

    #[test]
    fn oversized_payout_is_an_error() {
        let big = Decimal::from_str("2000000000000000000000000000").unwrap();
        assert!(matches!(
            Odds::default().payout(HitType::JackpotExact, big),
            Err(WagerError::Overflow(_))
        ));
        let stakes = Stakes {
            n1: big,
            ..Stakes::default()
        };
        assert!(matches!(
            evaluate("14", &stakes, &draw_14(), &Odds::default()),
            Err(WagerError::Overflow(_))
        ));
    }

    #[test]
    fn hit_type_tags_round_trip() {
        for hit in HitType::ALL {
            assert_eq!(hit.as_str().parse::<HitType>().unwrap(), hit);
        }
        assert!("N2".parse::<HitType>().is_err());
    }

    #[test]
    fn payout_excludes_principal() {
        let odds = Odds::default();
        assert_eq!(odds.payout(HitType::JackpotExact, dec("10.00")).unwrap(), dec("490.00"));
        assert_eq!(odds.payout(HitType::HeadMatch, dec("5.00")).unwrap(), dec("135.00"));
        assert_eq!(odds.payout(HitType::SpecialMatch, dec("5.00")).unwrap(), dec("30.00"));
        assert_eq!(odds.payout(HitType::Big, dec("10")).unwrap(), dec("9.00"));
    }

    #[test]
    fn payout_rounds_half_away_from_zero() {
        // 0.05 * 0.9 = 0.045
        assert_eq!(Odds::default().payout(HitType::Odd, dec("0.05")).unwrap(), dec("0.05"));
        // 0.01 * 0.9 = 0.009
        assert_eq!(Odds::default().payout(HitType::Even, dec("0.01")).unwrap(), dec("0.01"));
        assert_eq!(money_text(dec("490")), "490.00");
    }

    #[test]
    fn draw_derives_classes_from_head() {
        let d = DrawOutcome::parse("57", "01,02", None, Some(" "), 5).unwrap();
        assert_eq!(d.size, SizeClass::Big);
        assert_eq!(d.parity, ParityClass::Odd);
        let d = DrawOutcome::parse("0", "", None, None, 5).unwrap();
        assert_eq!(d.head, "00");
        assert_eq!(d.size, SizeClass::Small);
        assert_eq!(d.parity, ParityClass::Even);
        assert!(d.specials.is_empty());
    }

    #[test]
    fn draw_accepts_legacy_labels() {
        let d = DrawOutcome::parse("14", "", Some("大"), Some("单"), 5).unwrap();
        assert_eq!(d.size, SizeClass::Big);
        assert_eq!(d.parity, ParityClass::Odd);
    }

    #[test]
    fn draw_rejects_malformed_input() {
        assert!(DrawOutcome::parse("", "1,2", None, None, 5).is_err());
        assert!(DrawOutcome::parse("14", "14,15", None, None, 5).is_err());
        assert!(DrawOutcome::parse("14", "15,15", None, None, 5).is_err());
        assert!(DrawOutcome::parse("14", "1,2,3,4,5,6", None, None, 5).is_err());
        assert!(DrawOutcome::parse("14", "1,x", None, None, 5).is_err());
        assert!(DrawOutcome::parse("14", "", Some("medium"), None, 5).is_err());
    }

    #[test]
    fn head_number_hits_jackpot_and_head() {
        let hits = evaluate("14", &stakes("10.00", "5.00"), &draw_14(), &Odds::default()).unwrap();
        let tags: Vec<_> = hits.iter().map(|h| h.hit_type).collect();
        assert_eq!(tags, vec![HitType::JackpotExact, HitType::HeadMatch]);
        assert_eq!(hits[0].payout, dec("490.00"));
        assert_eq!(hits[1].payout, dec("135.00"));
    }

    #[test]
    fn special_number_hits_special_only() {
        let hits = evaluate("15", &stakes("10.00", "5.00"), &draw_14(), &Odds::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hit_type, HitType::SpecialMatch);
        assert_eq!(hits[0].odds, dec("7"));
        assert_eq!(hits[0].payout, dec("30.00"));
    }

    #[test]
    fn attribute_stakes_follow_draw_classes() {
        let all = Stakes::parse(["", "", "1", "2", "3", "4"]).unwrap();
        let hits = evaluate("70", &all, &draw_14(), &Odds::default()).unwrap();
        let tags: Vec<_> = hits.iter().map(|h| h.hit_type).collect();
        assert_eq!(tags, vec![HitType::Small, HitType::Even]);
        assert_eq!(hits[0].stake, dec("2"));
        assert_eq!(hits[1].payout, dec("3.60"));
    }

    #[test]
    fn zero_stakes_never_hit() {
        let hits = evaluate("14", &stakes("", "0"), &draw_14(), &Odds::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn head_and_special_are_mutually_exclusive() {
        for number in 0..100u8 {
            let number = format!("{number:02}");
            let hits = evaluate(&number, &stakes("", "1"), &draw_14(), &Odds::default()).unwrap();
            let n_hits = hits
                .iter()
                .filter(|h| matches!(h.hit_type, HitType::HeadMatch | HitType::SpecialMatch))
                .count();
            assert!(n_hits <= 1, "{number} produced {n_hits} n-stake hits");
        }
    }
}
