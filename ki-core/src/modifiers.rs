//! Per-action modifier tokens.
//!
//! Combat commands carry short tokens after the action name, e.g.
//! `attack @vegeta e4 a+5 m*1.5 ma+2`. This module turns such a token list
//! into a [`ModifierSet`]. Supported grammar (order-independent, case-insensitive):
//!
//! | token            | meaning                                        | ki |
//! |------------------|------------------------------------------------|----|
//! | `e<1-5>`         | effort level (default 2)                       | ±  |
//! | `a+N` / `a-N`    | agility delta for accuracy                     | yes|
//! | `a*R` / `a/R`    | accuracy roll multiplier / divisor             | yes|
//! | `m+N` / `m-N`    | main stat delta                                | no |
//! | `m*R` / `m/R`    | final roll multiplier / divisor                | no |
//! | `ma+N` / `ma-N`  | accuracy-only agility delta                    | no |
//! | `ma*R` / `ma/R`  | accuracy-only roll multiplier / divisor        | no |
//!
//! Anything that does not look like a modifier is kept as a pass-through
//! token (targets, mentions, free text).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for modifier parsing. Every variant names the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid number in modifier `{0}`")]
    InvalidNumber(String),
    #[error("Effort level out of range (1-5) in `{0}`")]
    EffortOutOfRange(String),
    #[error("Zero multiplier or divisor in `{0}`")]
    ZeroRatio(String),
    #[error("Modifier value too large in `{0}`")]
    Overflow(String),
}

impl ParseError {
    /// The token that failed to parse.
    pub fn token(&self) -> &str {
        match self {
            ParseError::InvalidNumber(t)
            | ParseError::EffortOutOfRange(t)
            | ParseError::ZeroRatio(t)
            | ParseError::Overflow(t) => t,
        }
    }
}

// ============================================================================
// Ratio
// ============================================================================

/// An exact non-negative rational number used for multipliers.
///
/// All scaling in the engine goes through [`Ratio::apply`], which floors, so
/// results are reproducible across platforms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ratio {
    num: u64,
    den: u64,
}

impl Ratio {
    pub const ONE: Ratio = Ratio { num: 1, den: 1 };
    pub const ZERO: Ratio = Ratio { num: 0, den: 1 };

    /// Create a reduced ratio. Returns `None` for a zero denominator.
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let g = gcd(num as u128, den as u128) as u64;
        let g = g.max(1);
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Build a ratio from a known-good pair. `den` must be non-zero.
    pub(crate) const fn from_parts(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    /// Whole-number ratio.
    pub fn whole(n: u64) -> Self {
        Self { num: n, den: 1 }
    }

    pub fn percent(pct: u64) -> Self {
        Self::new(pct, 100).unwrap_or(Self::ZERO)
    }

    pub fn numer(&self) -> u64 {
        self.num
    }

    pub fn denom(&self) -> u64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_one(&self) -> bool {
        self.num == self.den
    }

    /// Parse a decimal literal such as `2`, `1.5` or `.25`.
    pub fn from_decimal(s: &str) -> Option<Self> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let mut num: u64 = 0;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let digit = ch.to_digit(10)? as u64;
            num = num.checked_mul(10)?.checked_add(digit)?;
        }
        let den = 10u64.checked_pow(frac_part.len() as u32)?;
        Self::new(num, den)
    }

    /// `floor(value × self)`, saturating at `u64::MAX`.
    pub fn apply(&self, value: u64) -> u64 {
        let scaled = value as u128 * self.num as u128 / self.den as u128;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    pub fn checked_mul(self, other: Ratio) -> Option<Ratio> {
        let num = self.num as u128 * other.num as u128;
        let den = self.den as u128 * other.den as u128;
        let g = gcd(num, den).max(1);
        Some(Ratio {
            num: u64::try_from(num / g).ok()?,
            den: u64::try_from(den / g).ok()?,
        })
    }

    /// `1 / self`, or `None` when the ratio is zero.
    pub fn recip(self) -> Option<Ratio> {
        if self.num == 0 {
            None
        } else {
            Some(Ratio {
                num: self.den,
                den: self.num,
            })
        }
    }

    /// Number of started `step` increments above 1, i.e. `ceil((self - 1) / step)`.
    ///
    /// Zero when the ratio is at or below 1.
    pub fn steps_above_one(&self, step: Ratio) -> u64 {
        if *self <= Ratio::ONE || step.is_zero() {
            return 0;
        }
        // (num/den - 1) / (s_num/s_den) = (num - den) * s_den / (den * s_num)
        let excess = (self.num - self.den) as u128 * step.den as u128;
        let unit = self.den as u128 * step.num as u128;
        let steps = excess.div_ceil(unit);
        u64::try_from(steps).unwrap_or(u64::MAX)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Default for Ratio {
    fn default() -> Self {
        Ratio::ONE
    }
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.num as u128 * other.den as u128 == other.num as u128 * self.den as u128
    }
}

impl Eq for Ratio {}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as u128 * other.den as u128).cmp(&(other.num as u128 * self.den as u128))
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for Ratio {
    type Err = String;

    /// Accepts `num/den` or a decimal literal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((n, d)) = s.split_once('/') {
            let num: u64 = n.trim().parse().map_err(|_| format!("invalid ratio: {s}"))?;
            let den: u64 = d.trim().parse().map_err(|_| format!("invalid ratio: {s}"))?;
            Ratio::new(num, den).ok_or_else(|| format!("zero denominator: {s}"))
        } else {
            Ratio::from_decimal(s).ok_or_else(|| format!("invalid ratio: {s}"))
        }
    }
}

impl TryFrom<String> for Ratio {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ratio> for String {
    fn from(value: Ratio) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Effort
// ============================================================================

/// Effort level on the 1-5 scale. Level 2 is a normal effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct EffortLevel(u8);

impl EffortLevel {
    pub const NORMAL: EffortLevel = EffortLevel(2);

    pub fn new(level: u8) -> Option<Self> {
        (1..=5).contains(&level).then_some(Self(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Zero-based index into the per-level config tables.
    pub fn index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl Default for EffortLevel {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for EffortLevel {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        EffortLevel::new(level).ok_or_else(|| format!("effort level out of range: {level}"))
    }
}

impl From<EffortLevel> for u8 {
    fn from(value: EffortLevel) -> Self {
        value.0
    }
}

// ============================================================================
// Modifiers
// ============================================================================

/// A single recognized modifier token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    /// `e<1-5>`
    Effort(EffortLevel),
    /// `a+N` / `a-N`, ki-costed
    KiAgility(i64),
    /// `a*R` / `a/R`, ki-costed (stored as the effective multiplier)
    KiAccuracy(Ratio),
    /// `m+N` / `m-N`
    MainStat(i64),
    /// `m*R` / `m/R`
    RollScale(Ratio),
    /// `ma+N` / `ma-N`
    FreeAgility(i64),
    /// `ma*R` / `ma/R`
    FreeAccuracy(Ratio),
}

impl Modifier {
    pub fn is_ki_costed(&self) -> bool {
        matches!(self, Modifier::KiAgility(_) | Modifier::KiAccuracy(_))
    }
}

/// The parsed, normalized result of a token list.
///
/// Immutable once built: deltas are summed and multipliers composed at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModifierSet {
    effort: EffortLevel,
    ki_agility: i64,
    ki_accuracy: Ratio,
    main_stat: i64,
    roll_scale: Ratio,
    free_agility: i64,
    free_accuracy: Ratio,
    modifiers: Vec<Modifier>,
    passthrough: Vec<String>,
}

impl ModifierSet {
    /// A set with no modifiers at normal effort.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a whitespace-separated modifier string.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse_modifiers(input.split_whitespace())
    }

    pub fn effort(&self) -> EffortLevel {
        self.effort
    }

    /// Ki-costed agility delta (`a±`).
    pub fn ki_agility(&self) -> i64 {
        self.ki_agility
    }

    /// Ki-costed accuracy multiplier (`a*`, `a/`).
    pub fn ki_accuracy(&self) -> Ratio {
        self.ki_accuracy
    }

    /// Free main stat delta (`m±`).
    pub fn main_stat(&self) -> i64 {
        self.main_stat
    }

    /// Free multiplier on the final damage or defense roll (`m*`, `m/`).
    pub fn roll_scale(&self) -> Ratio {
        self.roll_scale
    }

    /// Free accuracy-only agility delta (`ma±`).
    pub fn free_agility(&self) -> i64 {
        self.free_agility
    }

    /// Free accuracy-only multiplier (`ma*`, `ma/`).
    pub fn free_accuracy(&self) -> Ratio {
        self.free_accuracy
    }

    /// Total agility delta used for accuracy and evasion rolls.
    pub fn accuracy_agility_delta(&self) -> i64 {
        self.ki_agility.saturating_add(self.free_agility)
    }

    /// Combined multiplier for the accuracy or evasion roll.
    pub fn accuracy_multiplier(&self) -> Ratio {
        self.ki_accuracy
            .checked_mul(self.free_accuracy)
            .unwrap_or(self.ki_accuracy)
    }

    /// Recognized modifiers in the order they appeared.
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Tokens that were not modifiers (targets, mentions).
    pub fn passthrough(&self) -> &[String] {
        &self.passthrough
    }

    pub fn has_ki_costed(&self) -> bool {
        self.modifiers.iter().any(Modifier::is_ki_costed)
    }

    fn push(&mut self, modifier: Modifier, token: &str) -> Result<(), ParseError> {
        let overflow = || ParseError::Overflow(token.to_string());
        match modifier {
            Modifier::Effort(level) => self.effort = level,
            Modifier::KiAgility(n) => {
                self.ki_agility = self.ki_agility.checked_add(n).ok_or_else(overflow)?
            }
            Modifier::MainStat(n) => {
                self.main_stat = self.main_stat.checked_add(n).ok_or_else(overflow)?
            }
            Modifier::FreeAgility(n) => {
                self.free_agility = self.free_agility.checked_add(n).ok_or_else(overflow)?
            }
            Modifier::KiAccuracy(r) => {
                self.ki_accuracy = self.ki_accuracy.checked_mul(r).ok_or_else(overflow)?
            }
            Modifier::RollScale(r) => {
                self.roll_scale = self.roll_scale.checked_mul(r).ok_or_else(overflow)?
            }
            Modifier::FreeAccuracy(r) => {
                self.free_accuracy = self.free_accuracy.checked_mul(r).ok_or_else(overflow)?
            }
        }
        self.modifiers.push(modifier);
        Ok(())
    }
}

impl FromStr for ModifierSet {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModifierSet::parse(s)
    }
}

/// Which stat family a modifier prefix addresses.
#[derive(Clone, Copy)]
enum Family {
    Ki,
    Main,
    FreeAccuracy,
}

/// Parse a list of command tokens into a [`ModifierSet`].
///
/// Pure and total over non-modifier input: unknown tokens are passed through,
/// while tokens that look like modifiers but carry a malformed value fail.
pub fn parse_modifiers<I, S>(tokens: I) -> Result<ModifierSet, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = ModifierSet::empty();

    for raw in tokens {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        match parse_token(raw)? {
            Some(modifier) => set.push(modifier, raw)?,
            None => set.passthrough.push(raw.to_string()),
        }
    }

    Ok(set)
}

/// Parse one token. `Ok(None)` means "not a modifier".
fn parse_token(raw: &str) -> Result<Option<Modifier>, ParseError> {
    let token = raw.to_lowercase();

    if let Some(rest) = token.strip_prefix('e') {
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            return parse_effort(raw, rest).map(Some);
        }
        return Ok(None);
    }

    let (family, rest) = if let Some(rest) = token.strip_prefix("ma") {
        (Family::FreeAccuracy, rest)
    } else if let Some(rest) = token.strip_prefix('m') {
        (Family::Main, rest)
    } else if let Some(rest) = token.strip_prefix('a') {
        (Family::Ki, rest)
    } else {
        return Ok(None);
    };

    let mut chars = rest.chars();
    let op = match chars.next() {
        Some(op @ ('+' | '-' | '*' | '/')) => op,
        _ => return Ok(None),
    };
    let value = chars.as_str();

    let modifier = match op {
        '+' | '-' => {
            let magnitude = parse_int(raw, value)?;
            let delta = if op == '-' { -magnitude } else { magnitude };
            match family {
                Family::Ki => Modifier::KiAgility(delta),
                Family::Main => Modifier::MainStat(delta),
                Family::FreeAccuracy => Modifier::FreeAgility(delta),
            }
        }
        _ => {
            let ratio =
                Ratio::from_decimal(value).ok_or_else(|| ParseError::InvalidNumber(raw.into()))?;
            let ratio = (if op == '/' { ratio.recip() } else { Some(ratio) })
                .filter(|r| !r.is_zero())
                .ok_or_else(|| ParseError::ZeroRatio(raw.into()))?;
            match family {
                Family::Ki => Modifier::KiAccuracy(ratio),
                Family::Main => Modifier::RollScale(ratio),
                Family::FreeAccuracy => Modifier::FreeAccuracy(ratio),
            }
        }
    };

    Ok(Some(modifier))
}

fn parse_effort(raw: &str, digits: &str) -> Result<Modifier, ParseError> {
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidNumber(raw.to_string()));
    }
    let level: u8 = digits
        .parse()
        .map_err(|_| ParseError::EffortOutOfRange(raw.to_string()))?;
    EffortLevel::new(level)
        .map(Modifier::Effort)
        .ok_or_else(|| ParseError::EffortOutOfRange(raw.to_string()))
}

fn parse_int(raw: &str, digits: &str) -> Result<i64, ParseError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::InvalidNumber(raw.to_string()));
    }
    digits
        .parse()
        .map_err(|_| ParseError::Overflow(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_normal_effort() {
        let set = parse_modifiers(Vec::<String>::new()).unwrap();
        assert_eq!(set.effort(), EffortLevel::NORMAL);
        assert_eq!(set.roll_scale(), Ratio::ONE);
        assert!(set.modifiers().is_empty());
    }

    #[test]
    fn test_parse_full_command() {
        let set = ModifierSet::parse("@vegeta e4 a+5 a*1.5 m+10 m/2 ma-3 ma*2").unwrap();
        assert_eq!(set.effort().level(), 4);
        assert_eq!(set.ki_agility(), 5);
        assert_eq!(set.ki_accuracy(), Ratio::new(3, 2).unwrap());
        assert_eq!(set.main_stat(), 10);
        assert_eq!(set.roll_scale(), Ratio::new(1, 2).unwrap());
        assert_eq!(set.free_agility(), -3);
        assert_eq!(set.free_accuracy(), Ratio::whole(2));
        assert_eq!(set.accuracy_agility_delta(), 2);
        assert_eq!(set.accuracy_multiplier(), Ratio::whole(3));
        assert_eq!(set.passthrough(), &["@vegeta".to_string()]);
    }

    #[test]
    fn test_repeated_tokens_accumulate() {
        let set = ModifierSet::parse("m+5 m+7 m*2 m*1.5 e5 e1").unwrap();
        assert_eq!(set.main_stat(), 12);
        assert_eq!(set.roll_scale(), Ratio::whole(3));
        // last effort wins
        assert_eq!(set.effort().level(), 1);
    }

    #[test]
    fn test_unknown_tokens_pass_through() {
        let set = ModifierSet::parse("mark everyone attack <@1234> a m ma e").unwrap();
        assert!(set.modifiers().is_empty());
        assert_eq!(set.passthrough().len(), 8);
    }

    #[test]
    fn test_case_insensitive() {
        let set = ModifierSet::parse("MA+4 E3").unwrap();
        assert_eq!(set.free_agility(), 4);
        assert_eq!(set.effort().level(), 3);
    }

    #[test]
    fn test_malformed_tokens_error() {
        assert_eq!(
            ModifierSet::parse("m+abc").unwrap_err(),
            ParseError::InvalidNumber("m+abc".to_string())
        );
        assert!(matches!(
            ModifierSet::parse("e9"),
            Err(ParseError::EffortOutOfRange(_))
        ));
        assert!(matches!(
            ModifierSet::parse("a/0"),
            Err(ParseError::ZeroRatio(_))
        ));
        assert!(matches!(
            ModifierSet::parse("ma*"),
            Err(ParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            ModifierSet::parse("m+-5"),
            Err(ParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            ModifierSet::parse("a+99999999999999999999"),
            Err(ParseError::Overflow(_))
        ));
        assert_eq!(ModifierSet::parse("e2x").unwrap_err().token(), "e2x");
    }

    #[test]
    fn test_ki_costed_flags() {
        assert!(ModifierSet::parse("a+1").unwrap().has_ki_costed());
        assert!(ModifierSet::parse("a*2").unwrap().has_ki_costed());
        assert!(!ModifierSet::parse("m+1 ma+1 m*2 ma*2").unwrap().has_ki_costed());
    }

    #[test]
    fn test_ratio_decimal_parsing() {
        assert_eq!(Ratio::from_decimal("1.5"), Ratio::new(3, 2));
        assert_eq!(Ratio::from_decimal(".25"), Ratio::new(1, 4));
        assert_eq!(Ratio::from_decimal("2."), Some(Ratio::whole(2)));
        assert_eq!(Ratio::from_decimal("."), None);
        assert_eq!(Ratio::from_decimal("1.2.3"), None);
        assert_eq!("7/10".parse::<Ratio>(), Ok(Ratio::new(7, 10).unwrap()));
    }

    #[test]
    fn test_ratio_apply_floors() {
        let r = Ratio::new(7, 10).unwrap();
        assert_eq!(r.apply(15), 10);
        assert_eq!(Ratio::ONE.apply(u64::MAX), u64::MAX);
        assert_eq!(Ratio::whole(2).apply(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_ratio_steps_above_one() {
        let half = Ratio::new(1, 2).unwrap();
        assert_eq!(Ratio::ONE.steps_above_one(half), 0);
        assert_eq!(Ratio::new(1, 2).unwrap().steps_above_one(half), 0);
        assert_eq!(Ratio::new(3, 2).unwrap().steps_above_one(half), 1);
        assert_eq!(Ratio::new(6, 5).unwrap().steps_above_one(half), 1);
        assert_eq!(Ratio::whole(2).steps_above_one(half), 2);
        assert_eq!(Ratio::new(21, 10).unwrap().steps_above_one(half), 3);
    }

    #[test]
    fn test_ratio_serde_as_string() {
        let json = serde_json::to_string(&Ratio::new(4, 5).unwrap()).unwrap();
        assert_eq!(json, "\"4/5\"");
        let back: Ratio = serde_json::from_str("\"0.8\"").unwrap();
        assert_eq!(back, Ratio::new(4, 5).unwrap());
    }

    #[test]
    fn test_effort_serde_checks_range() {
        assert_eq!(serde_json::to_string(&EffortLevel::NORMAL).unwrap(), "2");
        let back: EffortLevel = serde_json::from_str("4").unwrap();
        assert_eq!(back.index(), 3);
        assert!(serde_json::from_str::<EffortLevel>("0").is_err());
        assert!(serde_json::from_str::<EffortLevel>("9").is_err());

        let mut json = serde_json::to_value(ModifierSet::parse("e3 a+1").unwrap()).unwrap();
        json["effort"] = serde_json::json!(9);
        assert!(serde_json::from_value::<ModifierSet>(json).is_err());
    }
}
