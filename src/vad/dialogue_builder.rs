use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// One planned dialogue group: either an extension of the device's
/// already-open dialogue, or a brand new one. `dialogue_id` for a `New`
/// group is pre-generated so the plan is fully determined before any
/// database write happens.
#[derive(Debug, Clone)]
pub enum DialogueGroup {
    Continue {
        dialogue_id: Uuid,
        segments: Vec<(DateTime<Utc>, DateTime<Utc>)>,
        new_end_ts: DateTime<Utc>,
    },
    New {
        dialogue_id: Uuid,
        segments: Vec<(DateTime<Utc>, DateTime<Utc>)>,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    },
}

impl DialogueGroup {
    pub fn dialogue_id(&self) -> Uuid {
        match self {
            DialogueGroup::Continue { dialogue_id, .. } => *dialogue_id,
            DialogueGroup::New { dialogue_id, .. } => *dialogue_id,
        }
    }

    pub fn segments(&self) -> &[(DateTime<Utc>, DateTime<Utc>)] {
        match self {
            DialogueGroup::Continue { segments, .. } => segments,
            DialogueGroup::New { segments, .. } => segments,
        }
    }

    fn last_end(&self) -> DateTime<Utc> {
        self.segments().last().expect("group always has >=1 segment").1
    }
}

/// Result of stitching one chunk's segments against the device's prior
/// continuation state.
#[derive(Debug, Clone)]
pub struct StitchPlan {
    pub groups: Vec<DialogueGroup>,
    /// The dialogue id to leave "open" in `device_dialogue_state`, or
    /// `None` to clear the continuation.
    pub final_open_dialogue_id: Option<Uuid>,
    pub final_last_speech_end_ts: Option<DateTime<Utc>>,
}

/// The device's dialogue-continuation state as loaded `FOR UPDATE`, plus
/// the start timestamp of the open dialogue (needed to evaluate the
/// `max_dialogue` bound when extending it) — `None` unless a dialogue is
/// open.
pub struct ContinuationInput {
    pub open_dialogue: Option<(Uuid, DateTime<Utc>)>,
    pub last_speech_end_ts: Option<DateTime<Utc>>,
}

/// Stitches one chunk's absolute speech segments (already sorted ascending
/// by start) into dialogue groups, given the device's current continuation
/// state. `new_id` is called once per brand-new dialogue group so the
/// caller controls id generation (tests can supply a deterministic
/// sequence).
///
/// Every segment in `segments` is always assigned to some group — a
/// continuation split never drops a tail of segments; the grouping pass
/// below always runs to the end of the slice.
pub fn plan_stitch(
    continuation: &ContinuationInput,
    chunk_end_ts: DateTime<Utc>,
    segments: &[(DateTime<Utc>, DateTime<Utc>)],
    silence_gap: Duration,
    max_dialogue: Duration,
    mut new_id: impl FnMut() -> Uuid,
) -> StitchPlan {
    if segments.is_empty() {
        return plan_stitch_empty(continuation, chunk_end_ts, silence_gap);
    }

    let continues = continuation.open_dialogue.filter(|_| {
        matches!(
            continuation.last_speech_end_ts,
            Some(last_end) if segments[0].0 - last_end <= silence_gap
        )
    });

    let mut groups: Vec<DialogueGroup> = Vec::new();

    // `group_anchor_start` is the timestamp the `max_dialogue` bound is
    // measured from: the existing dialogue's start when continuing, or the
    // first segment's start for a brand-new group.
    let (mut group_id, mut group_is_continuation, mut group_anchor_start) = match continues {
        Some((id, start)) => (id, true, start),
        None => (new_id(), false, segments[0].0),
    };
    let mut group_segments: Vec<(DateTime<Utc>, DateTime<Utc>)> = vec![segments[0]];
    let mut prev_end = segments[0].1;

    for &(seg_start, seg_end) in &segments[1..] {
        let gap = seg_start - prev_end;
        let would_exceed_max = (seg_end - group_anchor_start) > max_dialogue;
        if gap > silence_gap || would_exceed_max {
            groups.push(finalize_group(
                group_id,
                group_is_continuation,
                std::mem::take(&mut group_segments),
            ));
            group_id = new_id();
            group_is_continuation = false;
            group_anchor_start = seg_start;
        }
        group_segments.push((seg_start, seg_end));
        prev_end = seg_end;
    }
    groups.push(finalize_group(group_id, group_is_continuation, group_segments));

    let last_end = groups.last().expect("at least one group").last_end();
    let last_dialogue_id = groups.last().expect("at least one group").dialogue_id();

    let (final_open_dialogue_id, final_last_speech_end_ts) =
        if chunk_end_ts - last_end < silence_gap {
            (Some(last_dialogue_id), Some(last_end))
        } else {
            (None, Some(last_end))
        };

    StitchPlan {
        groups,
        final_open_dialogue_id,
        final_last_speech_end_ts,
    }
}

fn finalize_group(
    dialogue_id: Uuid,
    is_continuation: bool,
    segments: Vec<(DateTime<Utc>, DateTime<Utc>)>,
) -> DialogueGroup {
    let start_ts = segments.first().expect("non-empty group").0;
    let end_ts = segments.last().expect("non-empty group").1;
    if is_continuation {
        DialogueGroup::Continue {
            dialogue_id,
            segments,
            new_end_ts: end_ts,
        }
    } else {
        DialogueGroup::New {
            dialogue_id,
            segments,
            start_ts,
            end_ts,
        }
    }
}

fn plan_stitch_empty(
    continuation: &ContinuationInput,
    chunk_end_ts: DateTime<Utc>,
    silence_gap: Duration,
) -> StitchPlan {
    match (continuation.open_dialogue, continuation.last_speech_end_ts) {
        (Some(_), Some(last_end)) if chunk_end_ts - last_end > silence_gap => StitchPlan {
            groups: vec![],
            final_open_dialogue_id: None,
            final_last_speech_end_ts: None,
        },
        (open, last_end) => StitchPlan {
            groups: vec![],
            final_open_dialogue_id: open.map(|(id, _)| id),
            final_last_speech_end_ts: last_end,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn ids() -> impl FnMut() -> Uuid {
        let mut n = 0u128;
        move || {
            n += 1;
            Uuid::from_u128(n)
        }
    }

    #[test]
    fn no_segments_clears_continuation_after_long_silence() {
        let open_id = Uuid::from_u128(1);
        let continuation = ContinuationInput {
            open_dialogue: Some((open_id, ts(0))),
            last_speech_end_ts: Some(ts(0)),
        };
        let plan = plan_stitch(
            &continuation,
            ts(20),
            &[],
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert!(plan.groups.is_empty());
        assert_eq!(plan.final_open_dialogue_id, None);
    }

    #[test]
    fn no_segments_leaves_continuation_untouched_within_gap() {
        let open_id = Uuid::from_u128(1);
        let continuation = ContinuationInput {
            open_dialogue: Some((open_id, ts(0))),
            last_speech_end_ts: Some(ts(0)),
        };
        let plan = plan_stitch(
            &continuation,
            ts(10),
            &[],
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.final_open_dialogue_id, Some(open_id));
        assert_eq!(plan.final_last_speech_end_ts, Some(ts(0)));
    }

    #[test]
    fn exact_silence_gap_equality_does_not_split() {
        let continuation = ContinuationInput {
            open_dialogue: None,
            last_speech_end_ts: None,
        };
        let segs = vec![(ts(0), ts(5)), (ts(17), ts(20))]; // gap exactly 12s
        let plan = plan_stitch(
            &continuation,
            ts(30),
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.groups.len(), 1);
    }

    #[test]
    fn gap_exceeding_silence_gap_splits() {
        let continuation = ContinuationInput {
            open_dialogue: None,
            last_speech_end_ts: None,
        };
        let segs = vec![(ts(0), ts(5)), (ts(18), ts(20))]; // gap 13s > 12s
        let plan = plan_stitch(
            &continuation,
            ts(30),
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.groups.len(), 2);
    }

    #[test]
    fn continuation_extends_existing_dialogue_across_chunk_boundary() {
        let open_id = Uuid::from_u128(42);
        let continuation = ContinuationInput {
            open_dialogue: Some((open_id, ts(-50))), // dialogue started 50s before this chunk's t=0
            last_speech_end_ts: Some(ts(-8)),
        };
        // gap from last_speech_end (-8) to first seg start (2) is 10s <= 12s gap -> continues
        let segs = vec![(ts(2), ts(10))];
        let plan = plan_stitch(
            &continuation,
            ts(30),
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.groups.len(), 1);
        match &plan.groups[0] {
            DialogueGroup::Continue { dialogue_id, new_end_ts, .. } => {
                assert_eq!(*dialogue_id, open_id);
                assert_eq!(*new_end_ts, ts(10));
            }
            DialogueGroup::New { .. } => panic!("expected continuation"),
        }
    }

    #[test]
    fn all_segments_after_continuation_split_are_still_grouped() {
        // Regression test for the source defect this implementation fixes:
        // after a continuation splits off into a new dialogue, every
        // remaining segment must still pass through grouping instead of
        // being dropped.
        let open_id = Uuid::from_u128(7);
        let continuation = ContinuationInput {
            open_dialogue: Some((open_id, ts(-100))),
            last_speech_end_ts: Some(ts(-5)),
        };
        // First segment continues (gap 3s <= 12s). Second segment is far
        // enough away (gap 50s) to force a split into a new dialogue. Third
        // segment immediately follows the second (gap 2s) and must land in
        // that same new dialogue, not be dropped.
        let segs = vec![(ts(-2), ts(0)), (ts(50), ts(55)), (ts(57), ts(60))];
        let plan = plan_stitch(
            &continuation,
            ts(70),
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.groups.len(), 2);
        assert!(matches!(plan.groups[0], DialogueGroup::Continue { .. }));
        match &plan.groups[1] {
            DialogueGroup::New { segments, .. } => assert_eq!(segments.len(), 2),
            DialogueGroup::Continue { .. } => panic!("expected new dialogue"),
        }
    }

    #[test]
    fn max_dialogue_forces_split_even_without_silence_gap() {
        let continuation = ContinuationInput {
            open_dialogue: None,
            last_speech_end_ts: None,
        };
        let segs = vec![(ts(0), ts(5)), (ts(10), ts(125))]; // second seg end - group start = 125 > 120
        let plan = plan_stitch(
            &continuation,
            ts(130),
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.groups.len(), 2);
    }

    #[test]
    fn oversize_single_segment_is_not_subdivided() {
        let continuation = ContinuationInput {
            open_dialogue: None,
            last_speech_end_ts: None,
        };
        let segs = vec![(ts(0), ts(200))]; // single segment longer than max_dialogue
        let plan = plan_stitch(
            &continuation,
            ts(205),
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.groups.len(), 1);
    }

    #[test]
    fn final_continuation_open_when_chunk_ends_soon_after_last_segment() {
        let continuation = ContinuationInput {
            open_dialogue: None,
            last_speech_end_ts: None,
        };
        let segs = vec![(ts(0), ts(5))];
        let plan = plan_stitch(
            &continuation,
            ts(8), // 3s after last segment end, < 12s gap
            &segs,
            Duration::seconds(12),
            Duration::seconds(120),
            ids(),
        );
        assert_eq!(plan.final_open_dialogue_id, Some(plan.groups[0].dialogue_id()));
    }
}
