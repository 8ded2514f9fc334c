use crate::{Fragment, KEY_SHIFT};
use num_bigint::BigUint;
use std::collections::BTreeSet;

/// A mock [crate::Solver] that considers a group solvable once it holds `threshold`
/// distinct fragments.
///
/// The value of a solvable group is the sum of the payloads of its distinct fragments, so it
/// does not depend on the order (or repetition) of fragments.
#[derive(Clone, Copy, Debug)]
pub struct Quorum {
    threshold: usize,
}

impl Quorum {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Mask selecting the payload bits of a [Fragment].
    pub const PAYLOAD_MASK: Fragment = (1 << KEY_SHIFT) - 1;
}

impl crate::Solver for Quorum {
    fn solve(&self, fragments: &[Fragment]) -> Option<BigUint> {
        let distinct: BTreeSet<_> = fragments.iter().copied().collect();
        if distinct.len() < self.threshold {
            return None;
        }
        Some(
            distinct
                .into_iter()
                .map(|fragment| BigUint::from(fragment & Self::PAYLOAD_MASK))
                .sum(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Solver;

    const KEY: Fragment = 5 << KEY_SHIFT;

    #[test]
    fn test_threshold() {
        let solver = Quorum::new(3);
        assert_eq!(solver.solve(&[]), None);
        assert_eq!(solver.solve(&[KEY | 1, KEY | 2]), None);
        assert_eq!(
            solver.solve(&[KEY | 1, KEY | 2, KEY | 4]),
            Some(BigUint::from(7u32))
        );
    }

    #[test]
    fn test_duplicates_ignored() {
        let solver = Quorum::new(2);
        assert_eq!(solver.solve(&[KEY | 1, KEY | 1]), None);
        assert_eq!(
            solver.solve(&[KEY | 1, KEY | 1, KEY | 3]),
            Some(BigUint::from(4u32))
        );
    }

    #[test]
    fn test_idempotent_and_order_insensitive() {
        let solver = Quorum::new(3);
        let fragments = [KEY | 10, KEY | 20, KEY | 30, KEY | 40];
        let mut reversed = fragments;
        reversed.reverse();

        let first = solver.solve(&fragments);
        assert_eq!(first, Some(BigUint::from(100u32)));
        assert_eq!(solver.solve(&fragments), first);
        assert_eq!(solver.solve(&reversed), first);
    }

    #[test]
    fn test_large_payloads() {
        let solver = Quorum::new(2);
        let value = solver
            .solve(&[KEY | Quorum::PAYLOAD_MASK, KEY | (Quorum::PAYLOAD_MASK - 1)])
            .unwrap();
        assert_eq!(
            value,
            BigUint::from(Quorum::PAYLOAD_MASK) * 2u32 - 1u32
        );
    }
}
