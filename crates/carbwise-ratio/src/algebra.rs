// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure interval algebra over a user's ratio periods.
//!
//! Nothing here touches storage: every function takes the current list of
//! periods and returns a decision or a plan. [`crate::RatioIntervalStore`]
//! feeds it from storage and applies the result.

use serde::{Deserialize, Serialize};

use carbwise_core::types::{NewRatioPeriod, RatioBatch, RatioPeriod};
use carbwise_core::{MINUTES_PER_DAY, TimePeriod, ValidationError};

/// How much of the day the schedule covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageStatus {
    Partial,
    Full,
    Exceeded,
}

pub fn validate_ratio(ratio: f64) -> Result<f64, ValidationError> {
    if ratio.is_finite() && ratio > 0.0 {
        Ok(ratio)
    } else {
        Err(ValidationError::NonPositiveRatio)
    }
}

pub fn total_coverage(periods: &[RatioPeriod]) -> u32 {
    periods.iter().map(|p| p.period.duration_minutes()).sum()
}

pub fn coverage_status(total_minutes: u32) -> CoverageStatus {
    match total_minutes.cmp(&MINUTES_PER_DAY) {
        std::cmp::Ordering::Less => CoverageStatus::Partial,
        std::cmp::Ordering::Equal => CoverageStatus::Full,
        std::cmp::Ordering::Greater => CoverageStatus::Exceeded,
    }
}

/// Periods (other than `excluding`) sharing at least one minute with `candidate`.
pub fn find_conflicts<'a>(
    periods: &'a [RatioPeriod],
    candidate: &TimePeriod,
    excluding: Option<i64>,
) -> Vec<&'a RatioPeriod> {
    periods
        .iter()
        .filter(|p| Some(p.id) != excluding)
        .filter(|p| p.period.overlaps(candidate))
        .collect()
}

/// Rejects `candidate` if it overlaps another period or would push total
/// coverage past a day.
pub fn check_insertable(
    periods: &[RatioPeriod],
    candidate: &TimePeriod,
    excluding: Option<i64>,
) -> Result<(), ValidationError> {
    let conflicts = find_conflicts(periods, candidate, excluding);
    if !conflicts.is_empty() {
        return Err(ValidationError::Overlap {
            conflicts: conflicts.iter().map(|p| p.period).collect(),
        });
    }
    let others: u32 = periods
        .iter()
        .filter(|p| Some(p.id) != excluding)
        .map(|p| p.period.duration_minutes())
        .sum();
    let total_minutes = others + candidate.duration_minutes();
    if total_minutes > MINUTES_PER_DAY {
        return Err(ValidationError::CoverageExceeded { total_minutes });
    }
    Ok(())
}

/// The first period, in start order, whose range contains `minute`.
pub fn lookup(periods: &[RatioPeriod], minute: u32) -> Option<&RatioPeriod> {
    periods.iter().find(|p| p.period.contains(minute))
}

/// What removing `cut` from `base` leaves, in order from `base`'s start.
pub fn subtract(base: &TimePeriod, cut: &TimePeriod) -> Vec<TimePeriod> {
    let mut pieces = merge_adjacent(base.segments());
    for (cut_start, cut_end) in cut.segments() {
        pieces = pieces
            .into_iter()
            .flat_map(|(start, end)| {
                if end <= cut_start || cut_end <= start {
                    return vec![(start, end)];
                }
                let mut left = Vec::with_capacity(2);
                if start < cut_start {
                    left.push((start, cut_start));
                }
                if cut_end < end {
                    left.push((cut_end, end));
                }
                left
            })
            .collect();
    }
    pieces.sort_unstable();
    let mut pieces = merge_adjacent(pieces);

    // Pieces touching both ends of the day are one period across midnight.
    let mut periods = Vec::with_capacity(pieces.len());
    let across_midnight = pieces.len() >= 2
        && pieces[0].0 == 0
        && pieces[pieces.len() - 1].1 == MINUTES_PER_DAY;
    if across_midnight {
        let evening = pieces.remove(pieces.len() - 1);
        let morning = pieces.remove(0);
        periods.extend(TimePeriod::from_segments(&[morning, evening]));
    }
    periods.extend(
        pieces
            .into_iter()
            .filter_map(|(start, end)| TimePeriod::from_minutes(start, end).ok()),
    );

    let origin = base.start_minute();
    periods.sort_by_key(|p| (p.start_minute() + MINUTES_PER_DAY - origin) % MINUTES_PER_DAY);
    periods
}

fn merge_adjacent(mut segments: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    segments.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(segments.len());
    for (start, end) in segments {
        match merged.last_mut() {
            Some(last) if last.1 >= start => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// One proposed modification to an existing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeriodChange {
    /// The period is entirely covered and goes away.
    Delete { id: i64, period: TimePeriod },
    /// The period keeps its id and ratio but changes bounds. Any
    /// `split_off` ranges are inserted as new periods with the same ratio.
    Resize {
        id: i64,
        from: TimePeriod,
        to: TimePeriod,
        ratio: f64,
        split_off: Vec<TimePeriod>,
    },
}

/// Changes an edit would force on neighbouring periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub changes: Vec<PeriodChange>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Storage mutations for the changeset, without the edited period itself.
    pub fn to_batch(&self, periods: &[RatioPeriod]) -> RatioBatch {
        let mut batch = RatioBatch::default();
        for change in &self.changes {
            match change {
                PeriodChange::Delete { id, .. } => batch.delete.push(*id),
                PeriodChange::Resize {
                    id,
                    to,
                    ratio,
                    split_off,
                    ..
                } => {
                    if let Some(existing) = periods.iter().find(|p| p.id == *id) {
                        batch.update.push(RatioPeriod {
                            period: *to,
                            ..existing.clone()
                        });
                    }
                    batch.insert.extend(split_off.iter().map(|period| NewRatioPeriod {
                        period: *period,
                        ratio: *ratio,
                    }));
                }
            }
        }
        batch
    }
}

/// Computes what must happen to the other periods for `target_id` to take
/// `new_period`. Empty when nothing overlaps.
pub fn plan_changeset(
    periods: &[RatioPeriod],
    target_id: i64,
    new_period: &TimePeriod,
) -> Changeset {
    let changes = find_conflicts(periods, new_period, Some(target_id))
        .into_iter()
        .map(|conflict| {
            let mut remaining = subtract(&conflict.period, new_period).into_iter();
            match remaining.next() {
                None => PeriodChange::Delete {
                    id: conflict.id,
                    period: conflict.period,
                },
                Some(kept) => PeriodChange::Resize {
                    id: conflict.id,
                    from: conflict.period,
                    to: kept,
                    ratio: conflict.ratio,
                    split_off: remaining.collect(),
                },
            }
        })
        .collect();
    Changeset { changes }
}

/// The neighbour that absorbs a deleted period's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeInto {
    pub neighbor_id: i64,
    pub from: TimePeriod,
    pub to: TimePeriod,
    pub ratio: f64,
}

/// What deleting a period will do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub removed: RatioPeriod,
    pub merge: Option<MergeInto>,
}

impl DeletePlan {
    pub fn to_batch(&self, periods: &[RatioPeriod]) -> RatioBatch {
        let mut batch = RatioBatch {
            delete: vec![self.removed.id],
            ..RatioBatch::default()
        };
        if let Some(merge) = &self.merge {
            if let Some(neighbor) = periods.iter().find(|p| p.id == merge.neighbor_id) {
                batch.update.push(RatioPeriod {
                    period: merge.to,
                    ..neighbor.clone()
                });
            }
        }
        batch
    }
}

/// Plans the deletion of `id`.
///
/// A neighbour is adjacent when it shares a boundary with the removed
/// period. With one adjacent neighbour it absorbs the freed range; with
/// two, the preceding one does. `None` when `id` is not in `periods`.
pub fn plan_delete(periods: &[RatioPeriod], id: i64) -> Option<DeletePlan> {
    let removed = periods.iter().find(|p| p.id == id)?.clone();
    let others: Vec<&RatioPeriod> = periods.iter().filter(|p| p.id != id).collect();

    let previous = others
        .iter()
        .find(|p| p.end_minute() == removed.start_minute());
    let next = others
        .iter()
        .find(|p| p.start_minute() == removed.end_minute());

    let merge = match (previous, next) {
        (Some(prev), Some(next)) if prev.id == next.id => {
            // The neighbour wraps all the way round: it now owns the whole day.
            Some((prev, TimePeriod::from_minutes(prev.start_minute(), prev.start_minute())))
        }
        (Some(prev), _) => Some((
            prev,
            TimePeriod::from_minutes(prev.start_minute(), removed.end_minute()),
        )),
        (None, Some(next)) => Some((
            next,
            TimePeriod::from_minutes(removed.start_minute(), next.end_minute()),
        )),
        (None, None) => None,
    };

    let merge = merge.and_then(|(neighbor, to)| {
        to.ok().map(|to| MergeInto {
            neighbor_id: neighbor.id,
            from: neighbor.period,
            to,
            ratio: neighbor.ratio,
        })
    });

    Some(DeletePlan { removed, merge })
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbwise_core::types::UserId;

    fn tp(text: &str) -> TimePeriod {
        TimePeriod::parse(text).unwrap()
    }

    fn rp(id: i64, text: &str, ratio: f64) -> RatioPeriod {
        RatioPeriod {
            id,
            user_id: UserId(1),
            period: tp(text),
            ratio,
        }
    }

    fn day_schedule() -> Vec<RatioPeriod> {
        vec![
            rp(1, "08:00-12:00", 1.5),
            rp(2, "12:00-20:00", 1.0),
            rp(3, "20:00-08:00", 0.8),
        ]
    }

    #[test]
    fn full_day_schedule_coverage_and_wraparound_lookup() {
        let periods = day_schedule();
        assert_eq!(total_coverage(&periods), 1440);
        assert_eq!(coverage_status(total_coverage(&periods)), CoverageStatus::Full);
        assert_eq!(lookup(&periods, 6 * 60).unwrap().ratio, 0.8);
        assert_eq!(lookup(&periods, 8 * 60).unwrap().ratio, 1.5);
        assert_eq!(lookup(&periods, 19 * 60 + 59).unwrap().ratio, 1.0);
    }

    #[test]
    fn lookup_outside_any_period_is_none() {
        let periods = vec![rp(1, "08:00-12:00", 1.5)];
        assert!(lookup(&periods, 7 * 60 + 59).is_none());
        assert!(lookup(&periods, 12 * 60).is_none());
    }

    #[test]
    fn overlap_is_reported_with_conflicts() {
        let periods = day_schedule();
        let err = check_insertable(&periods, &tp("07:00-09:00"), None).unwrap_err();
        match err {
            ValidationError::Overlap { conflicts } => {
                assert_eq!(conflicts, vec![tp("08:00-12:00"), tp("20:00-08:00")]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(check_insertable(&periods, &tp("07:00-09:00"), Some(1)).is_err());
    }

    #[test]
    fn insertable_when_only_the_excluded_period_overlaps() {
        let periods = vec![rp(1, "08:00-12:00", 1.5), rp(2, "12:00-14:00", 1.0)];
        assert!(check_insertable(&periods, &tp("09:00-11:00"), Some(1)).is_ok());
    }

    #[test]
    fn ratio_must_be_positive() {
        assert_eq!(validate_ratio(1.2), Ok(1.2));
        assert_eq!(validate_ratio(0.0), Err(ValidationError::NonPositiveRatio));
        assert_eq!(validate_ratio(-1.0), Err(ValidationError::NonPositiveRatio));
        assert_eq!(validate_ratio(f64::NAN), Err(ValidationError::NonPositiveRatio));
    }

    #[test]
    fn subtract_trims_either_side() {
        assert_eq!(subtract(&tp("08:00-12:00"), &tp("10:00-14:00")), vec![tp("08:00-10:00")]);
        assert_eq!(subtract(&tp("08:00-12:00"), &tp("06:00-09:00")), vec![tp("09:00-12:00")]);
        assert!(subtract(&tp("08:00-12:00"), &tp("07:00-13:00")).is_empty());
    }

    #[test]
    fn subtract_splits_around_an_inner_cut() {
        assert_eq!(
            subtract(&tp("08:00-20:00"), &tp("12:00-14:00")),
            vec![tp("08:00-12:00"), tp("14:00-20:00")]
        );
    }

    #[test]
    fn subtract_keeps_wrapping_remainder_whole() {
        assert_eq!(
            subtract(&tp("20:00-08:00"), &tp("06:00-09:00")),
            vec![tp("20:00-06:00")]
        );
        assert_eq!(
            subtract(&tp("20:00-08:00"), &tp("23:00-01:00")),
            vec![tp("20:00-23:00"), tp("01:00-08:00")]
        );
        assert_eq!(
            subtract(&tp("00:00-24:00"), &tp("08:00-12:00")),
            vec![tp("12:00-08:00")]
        );
    }

    #[test]
    fn changeset_deletes_swallowed_and_shrinks_partial() {
        let periods = day_schedule();
        // Period 2 grows to 10:00-22:00.
        let changeset = plan_changeset(&periods, 2, &tp("10:00-22:00"));
        assert_eq!(
            changeset.changes,
            vec![
                PeriodChange::Resize {
                    id: 1,
                    from: tp("08:00-12:00"),
                    to: tp("08:00-10:00"),
                    ratio: 1.5,
                    split_off: vec![],
                },
                PeriodChange::Resize {
                    id: 3,
                    from: tp("20:00-08:00"),
                    to: tp("22:00-08:00"),
                    ratio: 0.8,
                    split_off: vec![],
                },
            ]
        );

        let swallow = plan_changeset(&periods, 2, &tp("07:00-21:00"));
        assert!(swallow
            .changes
            .contains(&PeriodChange::Delete { id: 1, period: tp("08:00-12:00") }));
    }

    #[test]
    fn changeset_without_conflicts_is_empty() {
        let periods = vec![rp(1, "08:00-12:00", 1.5), rp(2, "14:00-16:00", 1.0)];
        assert!(plan_changeset(&periods, 2, &tp("13:00-17:00")).is_empty());
    }

    #[test]
    fn changeset_batch_carries_split_remainder() {
        let periods = vec![rp(1, "08:00-20:00", 1.5), rp(2, "21:00-22:00", 1.0)];
        let changeset = plan_changeset(&periods, 2, &tp("12:00-14:00"));
        let batch = changeset.to_batch(&periods);
        assert_eq!(batch.update.len(), 1);
        assert_eq!(batch.update[0].period, tp("08:00-12:00"));
        assert_eq!(
            batch.insert,
            vec![NewRatioPeriod {
                period: tp("14:00-20:00"),
                ratio: 1.5
            }]
        );
    }

    #[test]
    fn deleting_only_period_does_not_merge() {
        let periods = vec![rp(1, "08:00-12:00", 1.5)];
        let plan = plan_delete(&periods, 1).unwrap();
        assert!(plan.merge.is_none());
        assert_eq!(plan.to_batch(&periods).delete, vec![1]);
    }

    #[test]
    fn single_adjacent_neighbor_absorbs_range() {
        let periods = vec![rp(1, "08:00-12:00", 1.5), rp(2, "12:00-20:00", 1.0)];

        let plan = plan_delete(&periods, 2).unwrap();
        let merge = plan.merge.unwrap();
        assert_eq!(merge.neighbor_id, 1);
        assert_eq!(merge.to, tp("08:00-20:00"));

        let plan = plan_delete(&periods, 1).unwrap();
        assert_eq!(plan.merge.unwrap().to, tp("08:00-20:00"));
    }

    #[test]
    fn two_adjacent_neighbors_merge_into_preceding() {
        let plan = plan_delete(&day_schedule(), 2).unwrap();
        let merge = plan.merge.unwrap();
        assert_eq!(merge.neighbor_id, 1);
        assert_eq!(merge.to, tp("08:00-20:00"));
    }

    #[test]
    fn wrapping_neighbor_across_midnight() {
        let periods = vec![rp(1, "20:00-08:00", 0.8), rp(2, "08:00-10:00", 1.5)];
        let plan = plan_delete(&periods, 1).unwrap();
        let merge = plan.merge.unwrap();
        assert_eq!(merge.neighbor_id, 2);
        assert_eq!(merge.to, tp("20:00-10:00"));
    }

    #[test]
    fn neighbor_on_both_sides_takes_the_whole_day() {
        let periods = vec![rp(1, "08:00-20:00", 1.0), rp(2, "20:00-08:00", 0.8)];
        let merge = plan_delete(&periods, 2).unwrap().merge.unwrap();
        assert_eq!(merge.neighbor_id, 1);
        assert_eq!(merge.to.duration_minutes(), 1440);
    }

    #[test]
    fn non_adjacent_delete_is_plain() {
        let periods = vec![rp(1, "08:00-10:00", 1.5), rp(2, "12:00-14:00", 1.0)];
        assert!(plan_delete(&periods, 2).unwrap().merge.is_none());
        assert!(plan_delete(&periods, 9).is_none());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn period_strategy() -> impl Strategy<Value = TimePeriod> {
            (0u32..1440, 0u32..1440).prop_map(|(s, e)| TimePeriod::from_minutes(s, e).unwrap())
        }

        proptest! {
            #[test]
            fn single_period_lookup_matches_membership(p in period_strategy(), m in 0u32..1440) {
                let periods = vec![RatioPeriod { id: 1, user_id: UserId(1), period: p, ratio: 1.3 }];
                let found = lookup(&periods, m).map(|r| r.ratio);
                prop_assert_eq!(found, p.contains(m).then_some(1.3));
            }

            #[test]
            fn accepted_periods_never_share_a_minute(
                candidates in proptest::collection::vec(period_strategy(), 1..8),
            ) {
                let mut accepted: Vec<RatioPeriod> = Vec::new();
                for (id, candidate) in candidates.into_iter().enumerate() {
                    if check_insertable(&accepted, &candidate, None).is_ok() {
                        accepted.push(RatioPeriod { id: id as i64, user_id: UserId(1), period: candidate, ratio: 1.0 });
                    }
                }
                prop_assert!(total_coverage(&accepted) <= MINUTES_PER_DAY);
                for m in 0..MINUTES_PER_DAY {
                    let owners = accepted.iter().filter(|p| p.period.contains(m)).count();
                    prop_assert!(owners <= 1, "minute {} owned by {} periods", m, owners);
                }
            }

            #[test]
            fn subtract_leaves_exactly_the_uncut_minutes(
                base in period_strategy(),
                cut in period_strategy(),
            ) {
                let pieces = subtract(&base, &cut);
                for m in 0..MINUTES_PER_DAY {
                    let expected = base.contains(m) && !cut.contains(m);
                    let covered = pieces.iter().filter(|p| p.contains(m)).count();
                    prop_assert_eq!(covered, usize::from(expected));
                }
            }
        }
    }
}
