//! Majority specifications: "2/3" or "66%" parsed into an exact rational.

use crate::domain::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Required share of yes weight, as `numerator / denominator`.
///
/// The denominator is never zero. The numerator may be zero or exceed the
/// denominator; such thresholds are accepted as written (always reached, or
/// never reached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Majority {
    pub numerator: u32,
    pub denominator: u32,
}

impl Majority {
    /// Simple majority, used when a proposal carries no specification.
    pub const SIMPLE: Majority = Majority {
        numerator: 1,
        denominator: 2,
    };

    pub fn new(numerator: u32, denominator: u32) -> Result<Self, DomainError> {
        if denominator == 0 {
            return Err(DomainError::InvalidSpecification(
                "denominator cannot be zero".to_string(),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Parse a fraction (`n/d`) or a percentage (`p%`, `p.q%`).
    ///
    /// Percentages are rounded to the nearest whole percent, ties to even, and
    /// returned over 100: `"66.5%"` becomes `66/100`, `"67.5%"` becomes `68/100`.
    /// Sub-percent precision is dropped on purpose.
    pub fn parse(spec: &str) -> Result<Self, DomainError> {
        let spec = spec.trim();

        if let Some((num, den)) = spec.split_once('/') {
            if is_digits(num) && is_digits(den) {
                let numerator = parse_u32(num, spec)?;
                let denominator = parse_u32(den, spec)?;
                return Self::new(numerator, denominator);
            }
        }

        if let Some(value) = spec.strip_suffix('%') {
            let (int_part, frac_part) = match value.split_once('.') {
                Some((i, f)) => (i, Some(f)),
                None => (value, None),
            };
            let well_formed = is_digits(int_part) && frac_part.is_none_or(is_digits);
            if well_formed {
                let parsed: f64 = value.parse().map_err(|_| invalid(spec))?;
                let rounded = parsed.round_ties_even();
                if rounded > f64::from(u32::MAX) {
                    return Err(invalid(spec));
                }
                return Self::new(rounded as u32, 100);
            }
        }

        Err(invalid(spec))
    }

    /// Parse an optional specification, falling back to [`Majority::SIMPLE`].
    pub fn parse_or_default(spec: Option<&str>) -> Result<Self, DomainError> {
        match spec.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Self::parse(s),
            None => Ok(Self::SIMPLE),
        }
    }
}

impl Default for Majority {
    fn default() -> Self {
        Self::SIMPLE
    }
}

impl fmt::Display for Majority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_u32(digits: &str, spec: &str) -> Result<u32, DomainError> {
    digits.parse().map_err(|_| invalid(spec))
}

fn invalid(spec: &str) -> DomainError {
    DomainError::InvalidSpecification(format!("'{}' is neither a fraction nor a percentage", spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraction() {
        assert_eq!(Majority::parse("2/3").unwrap(), Majority::new(2, 3).unwrap());
        assert_eq!(Majority::parse(" 1/2 ").unwrap(), Majority::SIMPLE);
    }

    #[test]
    fn test_parse_percent() {
        let m = Majority::parse("66%").unwrap();
        assert_eq!((m.numerator, m.denominator), (66, 100));
    }

    #[test]
    fn test_parse_fractional_percent_rounds_half_to_even() {
        assert_eq!(Majority::parse("66.4%").unwrap().numerator, 66);
        assert_eq!(Majority::parse("66.6%").unwrap().numerator, 67);
        assert_eq!(Majority::parse("66.5%").unwrap().numerator, 66);
        assert_eq!(Majority::parse("67.5%").unwrap().numerator, 68);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for spec in ["x", "", "-1/2", "1/-2", "2 of 3", "1/2/3", "66", "%", ".5%", "5.%", "1e2%"] {
            assert!(
                matches!(Majority::parse(spec), Err(DomainError::InvalidSpecification(_))),
                "{spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_zero_denominator() {
        let err = Majority::parse("5/0").unwrap_err();
        assert!(err.to_string().contains("cannot be zero"));
    }

    #[test]
    fn test_parse_overflow() {
        assert!(Majority::parse("99999999999/2").is_err());
        assert!(Majority::parse("99999999999%").is_err());
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(Majority::parse_or_default(None).unwrap(), Majority::SIMPLE);
        assert_eq!(Majority::parse_or_default(Some("  ")).unwrap(), Majority::SIMPLE);
        assert_eq!(
            Majority::parse_or_default(Some("3/4")).unwrap().to_string(),
            "3/4"
        );
    }
}
