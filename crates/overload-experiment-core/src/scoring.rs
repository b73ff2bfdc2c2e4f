use std::collections::{BTreeMap, BTreeSet};

use time::OffsetDateTime;

use crate::catalog::Decision;
use crate::session::TlxRatings;

/// Percentage of decision pairs whose relative order in `given` agrees with
/// `ideal`, rounded half up.
///
/// Returns `None` (undefined score) unless both slices are permutations of
/// the same identifier set with at least one pair to compare.
#[must_use]
pub fn pairwise_rank_agreement(ideal: &[String], given: &[String]) -> Option<u8> {
    if ideal.len() != given.len() || ideal.len() < 2 {
        return None;
    }

    let ideal_set: BTreeSet<&str> = ideal.iter().map(String::as_str).collect();
    let given_positions: BTreeMap<&str, usize> = given
        .iter()
        .enumerate()
        .map(|(position, id)| (id.as_str(), position))
        .collect();

    if ideal_set.len() != ideal.len()
        || given_positions.len() != given.len()
        || !ideal_set.iter().all(|id| given_positions.contains_key(id))
    {
        return None;
    }

    let mut agree = 0_usize;
    let mut total = 0_usize;
    for (i, earlier) in ideal.iter().enumerate() {
        for later in &ideal[i + 1..] {
            total += 1;
            if given_positions[earlier.as_str()] < given_positions[later.as_str()] {
                agree += 1;
            }
        }
    }

    u8::try_from((agree * 200 + total) / (2 * total)).ok()
}

/// Correctness of a single-choice trial: the chosen decision's ground truth.
#[must_use]
pub fn single_choice_correct(decision: &Decision) -> bool {
    decision.correct
}

/// Ranking-task correctness signal: does the top-ranked entry match the ideal top entry.
#[must_use]
pub fn top_choice_matches(ideal: &[String], ranking: &[String]) -> bool {
    match (ideal.first(), ranking.first()) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

/// Mean of the six workload ratings rounded half up to an integer on the 0–20 scale.
#[must_use]
pub fn tlx_average(ratings: &TlxRatings) -> u8 {
    let values = ratings.values();
    let sum: u32 = values.iter().map(|value| u32::from(*value)).sum();
    let count = u32::try_from(values.len()).unwrap_or(u32::MAX).max(1);
    u8::try_from((sum * 2 + count) / (count * 2)).unwrap_or(u8::MAX)
}

/// Whole seconds between two instants, rounded half up; zero if `finished` precedes `started`.
#[must_use]
pub fn elapsed_whole_seconds(started: OffsetDateTime, finished: OffsetDateTime) -> u64 {
    let millis = (finished - started).whole_milliseconds();
    if millis <= 0 {
        return 0;
    }
    u64::try_from((millis + 500) / 1000).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TlxDimension;
    use proptest::prelude::*;
    use time::Duration;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| (*id).to_string()).collect()
    }

    fn ratings_all(value: u8) -> TlxRatings {
        let mut ratings = TlxRatings::default();
        for dimension in TlxDimension::ALL {
            assert!(ratings.set(dimension, value));
        }
        ratings
    }

    #[test]
    fn identical_ranking_scores_100() {
        let ideal = ids(&["B", "C", "A", "D"]);
        assert_eq!(pairwise_rank_agreement(&ideal, &ideal), Some(100));
    }

    #[test]
    fn reversed_ranking_scores_0() {
        let ideal = ids(&["B", "C", "A", "D"]);
        let reversed = ids(&["D", "A", "C", "B"]);
        assert_eq!(pairwise_rank_agreement(&ideal, &reversed), Some(0));
    }

    #[test]
    fn catalog_order_against_s1_ideal_rounds_to_nearest() {
        // ideal B,C,A,D vs given A,B,C,D: agreeing pairs B<C, B<D, C<D, A<D = 4/6
        let ideal = ids(&["B", "C", "A", "D"]);
        let given = ids(&["A", "B", "C", "D"]);
        assert_eq!(pairwise_rank_agreement(&ideal, &given), Some(67));
    }

    #[test]
    fn mismatched_inputs_are_undefined() {
        let ideal = ids(&["B", "C", "A", "D"]);
        assert_eq!(pairwise_rank_agreement(&ideal, &ids(&["B", "C", "A"])), None);
        assert_eq!(
            pairwise_rank_agreement(&ideal, &ids(&["B", "C", "A", "A"])),
            None
        );
        assert_eq!(
            pairwise_rank_agreement(&ideal, &ids(&["B", "C", "A", "E"])),
            None
        );
        assert_eq!(pairwise_rank_agreement(&[], &[]), None);
        assert_eq!(pairwise_rank_agreement(&ids(&["A"]), &ids(&["A"])), None);
    }

    #[test]
    fn top_choice_signal_only_inspects_first_entry() {
        let ideal = ids(&["B", "C", "A", "D"]);
        assert!(top_choice_matches(&ideal, &ids(&["B", "D", "A", "C"])));
        assert!(!top_choice_matches(&ideal, &ids(&["C", "B", "A", "D"])));
        assert!(!top_choice_matches(&ideal, &[]));
    }

    #[test]
    fn tlx_average_of_uniform_ratings_is_that_rating() {
        assert_eq!(tlx_average(&ratings_all(10)), 10);
        assert_eq!(tlx_average(&ratings_all(0)), 0);
        assert_eq!(tlx_average(&ratings_all(20)), 20);
    }

    #[test]
    fn tlx_average_rounds_half_up() {
        let mut ratings = ratings_all(10);
        // sum 63 → 10.5
        assert!(ratings.set(TlxDimension::Mental, 13));
        assert_eq!(tlx_average(&ratings), 11);
        // sum 62 → 10.33
        assert!(ratings.set(TlxDimension::Mental, 12));
        assert_eq!(tlx_average(&ratings), 10);
    }

    #[test]
    fn elapsed_seconds_round_to_nearest() {
        let start = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(elapsed_whole_seconds(start, start + Duration::milliseconds(1_499)), 1);
        assert_eq!(elapsed_whole_seconds(start, start + Duration::milliseconds(1_500)), 2);
        assert_eq!(elapsed_whole_seconds(start, start - Duration::seconds(3)), 0);
    }

    fn permutation() -> impl Strategy<Value = Vec<String>> {
        (2_usize..8).prop_flat_map(|len| {
            Just((0..len).map(|index| format!("d{index}")).collect::<Vec<_>>()).prop_shuffle()
        })
    }

    proptest! {
        #[test]
        fn score_is_bounded_and_extremes_hold(ideal in permutation()) {
            prop_assert_eq!(pairwise_rank_agreement(&ideal, &ideal), Some(100));
            let mut reversed = ideal.clone();
            reversed.reverse();
            prop_assert_eq!(pairwise_rank_agreement(&ideal, &reversed), Some(0));
        }

        #[test]
        fn score_depends_only_on_relative_order(
            (ideal, given) in permutation().prop_flat_map(|ideal| {
                let shuffled = Just(ideal.clone()).prop_shuffle();
                (Just(ideal), shuffled)
            })
        ) {
            let score = pairwise_rank_agreement(&ideal, &given);
            prop_assert!(score.is_some_and(|value| value <= 100));

            // Renaming identifiers identically in both sequences keeps every pair's relative order.
            let rename = |ids: &[String]| ids.iter().map(|id| format!("x-{id}")).collect::<Vec<_>>();
            prop_assert_eq!(pairwise_rank_agreement(&rename(&ideal), &rename(&given)), score);
        }
    }
}
