//! Weighted tally and majority evaluation.
//!
//! All comparisons are integer cross-multiplications; nothing here touches
//! floating point.

use crate::domain::{DomainError, Majority, Vote, VoteChoice};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weighted totals of the votes on one motion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

impl Tally {
    pub fn new(yes: u64, no: u64, abstain: u64) -> Self {
        Self { yes, no, abstain }
    }

    /// Sum the captured weights of `votes` per choice. Fails with
    /// `InvalidWeight` when a per-choice sum no longer fits a `u64`.
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Result<Self, DomainError> {
        let mut tally = Self::default();
        for vote in votes {
            tally.add(vote.choice, vote.weight)?;
        }
        Ok(tally)
    }

    pub fn add(&mut self, choice: VoteChoice, weight: u64) -> Result<(), DomainError> {
        let slot = match choice {
            VoteChoice::Yes => &mut self.yes,
            VoteChoice::No => &mut self.no,
            VoteChoice::Abstain => &mut self.abstain,
        };
        *slot = slot
            .checked_add(weight)
            .ok_or(DomainError::InvalidWeight(weight))?;
        Ok(())
    }

    /// Abstentions are part of the total.
    pub fn total(&self) -> u128 {
        u128::from(self.yes) + u128::from(self.no) + u128::from(self.abstain)
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "yes {} / no {} / abstain {}",
            self.yes, self.no, self.abstain
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pending,
    Passed,
    /// Part of the result contract; [`evaluate`] itself never produces it.
    Failed,
}

impl Verdict {
    pub fn is_passed(self) -> bool {
        self == Verdict::Passed
    }
}

/// Decide whether `tally` satisfies the requirement.
///
/// Unanimous motions pass only with yes weight and no dissent or abstention;
/// otherwise they stay pending. Non-unanimous motions pass when
/// `yes * den >= total * num`. Not reaching the threshold never fails a
/// motion, it only leaves it pending.
pub fn evaluate(tally: &Tally, majority: Majority, unanimous: bool) -> Verdict {
    let total = tally.total();
    if total == 0 {
        return Verdict::Pending;
    }

    if unanimous {
        return if tally.no == 0 && tally.abstain == 0 && tally.yes > 0 {
            Verdict::Passed
        } else {
            Verdict::Pending
        };
    }

    let lhs = u128::from(tally.yes) * u128::from(majority.denominator);
    let rhs = total * u128::from(majority.numerator);
    if lhs >= rhs {
        Verdict::Passed
    } else {
        Verdict::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(n: u32, d: u32) -> Majority {
        Majority::new(n, d).unwrap()
    }

    #[test]
    fn test_simple_majority_reached() {
        assert_eq!(evaluate(&Tally::new(2, 1, 0), m(1, 2), false), Verdict::Passed);
    }

    #[test]
    fn test_two_thirds_not_reached() {
        assert_eq!(evaluate(&Tally::new(1, 2, 0), m(2, 3), false), Verdict::Pending);
    }

    #[test]
    fn test_empty_tally_is_pending() {
        assert_eq!(evaluate(&Tally::default(), m(0, 1), false), Verdict::Pending);
        assert_eq!(evaluate(&Tally::default(), m(1, 2), true), Verdict::Pending);
    }

    #[test]
    fn test_unanimous() {
        assert_eq!(evaluate(&Tally::new(3, 0, 0), m(1, 2), true), Verdict::Passed);
        assert_eq!(evaluate(&Tally::new(2, 1, 0), m(1, 2), true), Verdict::Pending);
        assert_eq!(evaluate(&Tally::new(2, 0, 1), m(1, 2), true), Verdict::Pending);
        assert_eq!(evaluate(&Tally::new(0, 0, 2), m(0, 1), true), Verdict::Pending);
    }

    #[test]
    fn test_abstain_dilutes_but_boundary_is_inclusive() {
        // 1 * 2 >= 2 * 1
        assert_eq!(evaluate(&Tally::new(1, 0, 1), m(1, 2), false), Verdict::Passed);
        // 1 * 2 < 3 * 1
        assert_eq!(evaluate(&Tally::new(1, 0, 2), m(1, 2), false), Verdict::Pending);
    }

    #[test]
    fn test_exact_two_thirds_boundary() {
        assert_eq!(evaluate(&Tally::new(2, 1, 0), m(2, 3), false), Verdict::Passed);
        assert_eq!(evaluate(&Tally::new(66, 34, 0), m(2, 3), false), Verdict::Pending);
        assert_eq!(evaluate(&Tally::new(66, 34, 0), m(66, 100), false), Verdict::Passed);
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let tally = Tally::new(u64::MAX, u64::MAX, 0);
        assert_eq!(evaluate(&tally, m(1, 2), false), Verdict::Passed);
        assert_eq!(evaluate(&tally, m(u32::MAX, u32::MAX - 1), false), Verdict::Pending);
    }

    #[test]
    fn test_monotonic_in_yes() {
        let thresholds = [m(1, 2), m(2, 3), m(3, 4), m(66, 100), m(1, 1), m(0, 1), m(5, 3)];
        for majority in thresholds {
            for no in 0..6u64 {
                for abstain in 0..6u64 {
                    let mut passed_before = false;
                    for yes in 0..20u64 {
                        let passed = evaluate(&Tally::new(yes, no, abstain), majority, false)
                            .is_passed();
                        assert!(
                            !(passed_before && !passed),
                            "{majority} regressed at yes={yes} no={no} abstain={abstain}"
                        );
                        passed_before = passed;
                    }
                }
            }
        }
    }

    #[test]
    fn test_evaluate_never_fails() {
        for yes in 0..4u64 {
            for no in 0..4u64 {
                for unanimous in [false, true] {
                    let verdict = evaluate(&Tally::new(yes, no, 1), m(3, 4), unanimous);
                    assert_ne!(verdict, Verdict::Failed);
                }
            }
        }
    }

    fn vote(voter_id: i64, choice: VoteChoice, weight: u64) -> Vote {
        Vote {
            motion_id: 1,
            voter_id,
            choice,
            reason: None,
            weight,
            cast_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_from_votes_sums_captured_weights() {
        let votes = [
            vote(1, VoteChoice::Yes, 3),
            vote(2, VoteChoice::No, 1),
            vote(3, VoteChoice::Abstain, 2),
            vote(4, VoteChoice::Yes, 1),
        ];
        assert_eq!(Tally::from_votes(&votes).unwrap(), Tally::new(4, 1, 2));
    }

    #[test]
    fn test_from_votes_rejects_overflowing_sum() {
        let votes = [
            vote(1, VoteChoice::Yes, u64::MAX),
            vote(2, VoteChoice::No, u64::MAX),
            vote(3, VoteChoice::Yes, 1),
        ];
        assert!(matches!(
            Tally::from_votes(&votes),
            Err(DomainError::InvalidWeight(1))
        ));
        assert!(Tally::from_votes(&votes[..2]).is_ok());
    }
}
