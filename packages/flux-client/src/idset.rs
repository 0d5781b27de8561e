//! Compact sets of non-negative integer ids.
//!
//! Flux encodes broker ranks as comma-separated ids and inclusive ranges,
//! optionally wrapped in brackets: `"0-3,7"`, `"[5]"`. [`IdSet`] decodes that
//! form into sorted, disjoint ranges so membership and minimum queries stay
//! cheap regardless of how many ids a range covers.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::IdSetError;

/// A decoded set of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    /// Sorted, non-overlapping, non-adjacent ranges
    ranges: Vec<RangeInclusive<u32>>,
}

impl IdSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the textual range form.
    pub fn decode(s: &str) -> Result<Self, IdSetError> {
        let body = match (s.strip_prefix('['), s.ends_with(']')) {
            (Some(rest), true) => &rest[..rest.len() - 1],
            (None, false) => s,
            _ => return Err(IdSetError::Unbalanced(s.to_string())),
        };

        let mut ranges = Vec::new();
        if body.is_empty() {
            return Ok(Self { ranges });
        }
        for token in body.split(',') {
            ranges.push(parse_token(token)?);
        }
        Ok(Self::from_ranges(ranges))
    }

    fn from_ranges(mut ranges: Vec<RangeInclusive<u32>>) -> Self {
        ranges.sort_by_key(|r| *r.start());

        let mut merged: Vec<RangeInclusive<u32>> = Vec::with_capacity(ranges.len());
        for r in ranges {
            match merged.last_mut() {
                Some(last) if *r.start() <= last.end().saturating_add(1) => {
                    if r.end() > last.end() {
                        *last = *last.start()..=*r.end();
                    }
                }
                _ => merged.push(r),
            }
        }
        Self { ranges: merged }
    }

    /// True if `id` is a member.
    pub fn contains(&self, id: u32) -> bool {
        let idx = self.ranges.partition_point(|r| *r.end() < id);
        self.ranges
            .get(idx)
            .map(|r| r.contains(&id))
            .unwrap_or(false)
    }

    /// Smallest member. An empty set is an error, not zero.
    pub fn first(&self) -> Result<u32, IdSetError> {
        self.ranges
            .first()
            .map(|r| *r.start())
            .ok_or(IdSetError::Empty)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(|r| (*r.end() - *r.start()) as usize + 1)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }
}

fn parse_id(s: &str, token: &str) -> Result<u32, IdSetError> {
    // u32::from_str accepts a leading '+', which is not part of the encoding
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdSetError::InvalidToken(token.to_string()));
    }
    s.parse()
        .map_err(|_| IdSetError::InvalidToken(token.to_string()))
}

fn parse_token(token: &str) -> Result<RangeInclusive<u32>, IdSetError> {
    match token.split_once('-') {
        Some((lo, hi)) => {
            let lo = parse_id(lo, token)?;
            let hi = parse_id(hi, token)?;
            if lo > hi {
                return Err(IdSetError::ReversedRange { lo, hi });
            }
            Ok(lo..=hi)
        }
        None => {
            let id = parse_id(token, token)?;
            Ok(id..=id)
        }
    }
}

impl FromStr for IdSet {
    type Err = IdSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl FromIterator<u32> for IdSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::from_ranges(iter.into_iter().map(|id| id..=id).collect())
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if r.start() == r.end() {
                write!(f, "{}", r.start())?;
            } else {
                write!(f, "{}-{}", r.start(), r.end())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_decode_ranges_and_singletons() {
        let set = IdSet::decode("0-3,7").unwrap();

        for id in [0, 1, 2, 3, 7] {
            assert!(set.contains(id), "expected {id} in set");
        }
        for id in [4, 5, 6, 8, 100] {
            assert!(!set.contains(id), "did not expect {id} in set");
        }
        assert_eq!(set.len(), 5);
        assert_eq!(set.first(), Ok(0));
    }

    #[test]
    fn test_first_is_minimum_not_first_token() {
        let set = IdSet::decode("9,4-5,12").unwrap();
        assert_eq!(set.first(), Ok(4));
    }

    #[test]
    fn test_brackets_accepted() {
        assert_eq!(IdSet::decode("[1-2,5]").unwrap().to_string(), "1-2,5");
        assert!(IdSet::decode("[]").unwrap().is_empty());
    }

    #[test]
    fn test_empty_set() {
        let set = IdSet::decode("").unwrap();
        assert!(set.is_empty());
        assert!(!set.contains(0));
        assert_eq!(set.first(), Err(IdSetError::Empty));
    }

    #[test]
    fn test_malformed_rejected() {
        for bad in [
            "a", "1,,2", "1-", "-1", "3-1", "1 ,2", " 1", "+1", "1-2-3", "[1", "1]",
            "4294967296", "0x10",
        ] {
            assert!(IdSet::decode(bad).is_err(), "expected {bad:?} to fail");
        }
        assert_eq!(
            IdSet::decode("3-1"),
            Err(IdSetError::ReversedRange { lo: 3, hi: 1 })
        );
    }

    #[test]
    fn test_overlapping_ranges_merge() {
        let set = IdSet::decode("5-8,0-2,3,7-10").unwrap();
        assert_eq!(set.to_string(), "0-10");
        assert_eq!(set.len(), 11);
    }

    #[test]
    fn test_max_id() {
        let set = IdSet::decode("4294967290-4294967295").unwrap();
        assert!(set.contains(u32::MAX));
        assert_eq!(set.first(), Ok(4294967290));
    }

    fn encode(ids: &BTreeSet<u32>) -> String {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    proptest! {
        #[test]
        fn prop_membership_matches_encoded_ids(
            ids in prop::collection::btree_set(0u32..512, 0..64),
            probe in 0u32..600,
        ) {
            let set = IdSet::decode(&encode(&ids)).unwrap();
            prop_assert_eq!(set.contains(probe), ids.contains(&probe));
            prop_assert_eq!(set.len(), ids.len());
        }

        #[test]
        fn prop_ranges_match_explicit_membership(
            ranges in prop::collection::vec((0u32..256, 0u32..32), 1..8),
            probe in 0u32..300,
        ) {
            let text = ranges
                .iter()
                .map(|(lo, span)| format!("{}-{}", lo, lo + span))
                .collect::<Vec<_>>()
                .join(",");
            let expected: BTreeSet<u32> = ranges
                .iter()
                .flat_map(|(lo, span)| *lo..=lo + span)
                .collect();

            let set = IdSet::decode(&text).unwrap();
            prop_assert_eq!(set.contains(probe), expected.contains(&probe));
            prop_assert_eq!(set.first().ok(), expected.iter().next().copied());
        }

        #[test]
        fn prop_canonical_form_decodes_to_same_set(
            ids in prop::collection::btree_set(0u32..1024, 0..64),
        ) {
            let set: IdSet = ids.iter().copied().collect();
            prop_assert_eq!(IdSet::decode(&set.to_string()).unwrap(), set);
        }

        #[test]
        fn prop_garbage_never_decodes(s in "[0-9]*[a-zA-Z ;]+[0-9,-]*") {
            prop_assert!(IdSet::decode(&s).is_err());
        }
    }
}
