use std::collections::BTreeMap;

use crate::catalog::{Artifact, Scenario};
use crate::policy::ModePolicy;

/// Title suffix of an artifact that absorbed one or more duplicates.
pub const CONSOLIDATED_MARKER: &str = " (konsoliderad)";

/// Produces the ordered artifacts to display for a scenario under a mode policy.
///
/// Steps run in fixed order: decoy injection, consolidation, adaptive reveal,
/// then a stable descending-priority sort. The result depends only on the
/// inputs, so repeated calls with the same cursor yield the same list.
#[must_use]
pub fn present_artifacts(
    scenario: &Scenario,
    policy: &ModePolicy,
    reveal_cursor: usize,
) -> Vec<Artifact> {
    let mut artifacts = scenario.artifacts.clone();
    artifacts.extend(inject_decoys(scenario, policy.decoys));

    if policy.consolidate {
        artifacts = consolidate(artifacts);
    }

    if policy.adaptive_reveal {
        sort_by_priority(&mut artifacts);
        artifacts.truncate(reveal_cursor.saturating_add(1));
    }

    sort_by_priority(&mut artifacts);
    artifacts
}

/// Whether an artifact body starts hidden until opened.
#[must_use]
pub fn body_collapsed(policy: &ModePolicy, artifact: &Artifact) -> bool {
    policy.collapse_bodies && !artifact.decoy
}

fn inject_decoys(scenario: &Scenario, count: usize) -> Vec<Artifact> {
    scenario
        .decoy_pool
        .iter()
        .take(count)
        .enumerate()
        .map(|(index, decoy)| Artifact {
            id: format!("{}_{index}", decoy.id),
            decoy: true,
            ..decoy.clone()
        })
        .collect()
}

fn consolidate(artifacts: Vec<Artifact>) -> Vec<Artifact> {
    let mut groups: Vec<(Artifact, usize)> = Vec::with_capacity(artifacts.len());
    let mut slots: BTreeMap<String, usize> = BTreeMap::new();

    for artifact in artifacts {
        let key = artifact
            .duplicate_of
            .clone()
            .unwrap_or_else(|| artifact.id.clone());

        if let Some(slot) = slots.get(&key) {
            groups[*slot].1 += 1;
            continue;
        }

        slots.insert(key.clone(), groups.len());
        groups.push((
            Artifact {
                id: key,
                ..artifact
            },
            0,
        ));
    }

    groups
        .into_iter()
        .map(|(mut representative, absorbed)| {
            if absorbed > 0 || representative.duplicate_of.is_some() {
                representative.title.push_str(CONSOLIDATED_MARKER);
            }
            representative.duplicate_of = None;
            representative
        })
        .collect()
}

fn sort_by_priority(artifacts: &mut [Artifact]) {
    // slice::sort_by is stable, so equal priorities keep their relative order.
    artifacts.sort_by(|left, right| right.priority.cmp(&left.priority));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Priority};
    use crate::policy::ExperimentMode;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn scenario(id: &str) -> Scenario {
        let catalog = must_ok(Catalog::builtin());
        must_ok(catalog.scenario(id)).clone()
    }

    fn ids(artifacts: &[Artifact]) -> Vec<&str> {
        artifacts.iter().map(|artifact| artifact.id.as_str()).collect()
    }

    #[test]
    fn baseline_injects_three_distinct_decoys_from_pool() {
        let s1 = scenario("S1");
        let shown = present_artifacts(&s1, &ExperimentMode::Baseline.policy(), 0);

        let decoys: Vec<&Artifact> = shown.iter().filter(|artifact| artifact.decoy).collect();
        assert_eq!(shown.len(), s1.artifacts.len() + 3);
        assert_eq!(decoys.len(), 3);
        assert_eq!(
            decoys.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["dx1_0", "dx2_1", "dx3_2"]
        );
        assert!(decoys.iter().all(|d| d.priority == Priority::Low));
    }

    #[test]
    fn zero_decoys_adds_nothing() {
        let s1 = scenario("S1");
        let policy = ModePolicy {
            decoys: 0,
            ..ModePolicy::BASELINE
        };
        let shown = present_artifacts(&s1, &policy, 0);
        assert_eq!(shown.len(), s1.artifacts.len());
        assert!(shown.iter().all(|artifact| !artifact.decoy));
    }

    #[test]
    fn decoy_count_beyond_pool_is_capped() {
        let s2 = scenario("S2");
        let policy = ModePolicy {
            decoys: 10,
            ..ModePolicy::BASELINE
        };
        let shown = present_artifacts(&s2, &policy, 0);
        assert_eq!(shown.iter().filter(|a| a.decoy).count(), s2.decoy_pool.len());
    }

    #[test]
    fn filtered_mode_consolidates_duplicate_into_marked_artifact() {
        let s1 = scenario("S1");
        let shown = present_artifacts(&s1, &ExperimentMode::Filtered.policy(), 0);

        assert!(!ids(&shown).contains(&"a5"));
        let merged: Vec<&Artifact> = shown.iter().filter(|a| a.id == "a1").collect();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].title.ends_with(CONSOLIDATED_MARKER));
        assert_eq!(merged[0].duplicate_of, None);

        let a3 = shown.iter().find(|a| a.id == "a3");
        assert!(a3.is_some_and(|a| !a.title.contains(CONSOLIDATED_MARKER)));
        // 5 catalog artifacts - 1 duplicate + 1 decoy
        assert_eq!(shown.len(), 5);
    }

    #[test]
    fn baseline_keeps_duplicates_as_distinct_entries() {
        let s1 = scenario("S1");
        let shown = present_artifacts(&s1, &ExperimentMode::Baseline.policy(), 0);
        let shown_ids = ids(&shown);
        assert!(shown_ids.contains(&"a1"));
        assert!(shown_ids.contains(&"a5"));
        assert!(shown
            .iter()
            .all(|artifact| !artifact.title.contains(CONSOLIDATED_MARKER)));
    }

    #[test]
    fn output_is_stably_sorted_by_descending_priority() {
        let s1 = scenario("S1");
        let shown = present_artifacts(&s1, &ExperimentMode::Baseline.policy(), 0);
        assert_eq!(
            ids(&shown),
            vec!["a1", "a3", "a5", "a2", "a4", "dx1_0", "dx2_1", "dx3_2"]
        );
    }

    #[test]
    fn adaptive_reveal_shows_cursor_plus_one_highest_priority_items() {
        let s3 = scenario("S3");
        let policy = ExperimentMode::Adaptive.policy();

        assert_eq!(ids(&present_artifacts(&s3, &policy, 0)), vec!["c2"]);
        assert_eq!(ids(&present_artifacts(&s3, &policy, 1)), vec!["c2", "c4"]);
        assert_eq!(
            ids(&present_artifacts(&s3, &policy, 2)),
            vec!["c2", "c4", "c1"]
        );
        assert_eq!(present_artifacts(&s3, &policy, 99).len(), s3.artifacts.len());
    }

    #[test]
    fn presentation_is_idempotent_for_fixed_inputs() {
        let s2 = scenario("S2");
        for mode in ExperimentMode::ALL {
            let policy = mode.policy();
            assert_eq!(
                present_artifacts(&s2, &policy, 1),
                present_artifacts(&s2, &policy, 1)
            );
        }
    }

    #[test]
    fn only_non_decoy_bodies_collapse_under_baseline() {
        let s1 = scenario("S1");
        let policy = ExperimentMode::Baseline.policy();
        for artifact in present_artifacts(&s1, &policy, 0) {
            assert_eq!(body_collapsed(&policy, &artifact), !artifact.decoy);
        }
        let filtered = ExperimentMode::Filtered.policy();
        assert!(s1
            .artifacts
            .iter()
            .all(|artifact| !body_collapsed(&filtered, artifact)));
    }
}
