use crate::models::SpeechSegment;

/// Splits 16-bit mono PCM into fixed-duration frames, dropping a trailing
/// partial frame (the VAD predicate requires a fixed frame length).
pub fn audio_to_frames(pcm: &[i16], sample_rate: u32, frame_duration_ms: u32) -> Vec<Vec<i16>> {
    let frame_len = (sample_rate as u64 * frame_duration_ms as u64 / 1000) as usize;
    if frame_len == 0 {
        return Vec::new();
    }
    pcm.chunks_exact(frame_len).map(|c| c.to_vec()).collect()
}

/// Turns a stream of per-frame voiced/unvoiced flags into smoothed
/// `(start_ms, end_ms)` segments via a two-parameter hysteresis state
/// machine: a run of `min_speech_ms` continuous voiced frames opens a
/// segment (back-dated to the start of that run, not where the threshold
/// was crossed); a run of `min_silence_ms` continuous unvoiced frames closes
/// it (back-dated the same way). A segment still open at the last frame is
/// closed at that frame's end.
pub fn frames_to_segments(
    speech_flags: &[bool],
    frame_duration_ms: u32,
    min_speech_ms: u32,
    min_silence_ms: u32,
) -> Vec<SpeechSegment> {
    let mut segments = Vec::new();
    let frame_ms = frame_duration_ms as i64;

    let mut in_segment = false;
    let mut segment_start_ms: i64 = 0;
    let mut consecutive_speech: u32 = 0;
    let mut consecutive_silence: u32 = 0;

    for (i, &voiced) in speech_flags.iter().enumerate() {
        let frame_index = i as i64;
        if !in_segment {
            if voiced {
                consecutive_speech += 1;
            } else {
                consecutive_speech = 0;
            }
            if (consecutive_speech as u64 * frame_ms as u64) >= min_speech_ms as u64 {
                let run_start_frame = frame_index - (consecutive_speech as i64 - 1);
                segment_start_ms = run_start_frame * frame_ms;
                in_segment = true;
                consecutive_silence = 0;
            }
        } else {
            if !voiced {
                consecutive_silence += 1;
            } else {
                consecutive_silence = 0;
            }
            if (consecutive_silence as u64 * frame_ms as u64) >= min_silence_ms as u64 {
                let run_start_frame = frame_index - (consecutive_silence as i64 - 1);
                let segment_end_ms = run_start_frame * frame_ms;
                segments.push(SpeechSegment {
                    start_ms: segment_start_ms,
                    end_ms: segment_end_ms,
                });
                in_segment = false;
                consecutive_speech = 0;
            }
        }
    }

    if in_segment {
        let end_ms = speech_flags.len() as i64 * frame_ms;
        segments.push(SpeechSegment {
            start_ms: segment_start_ms,
            end_ms,
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_segment_after_min_speech_run_and_backdates_start() {
        // 30ms frames, min_speech_ms=90 (3 frames), min_silence_ms=90 (3 frames)
        let flags = vec![false, false, true, true, true, true, false, false, false];
        let segs = frames_to_segments(&flags, 30, 90, 90);
        assert_eq!(segs.len(), 1);
        // run of voiced frames starts at index 2 -> 2*30 = 60ms
        assert_eq!(segs[0].start_ms, 60);
        // silence run starts at index 6 -> 6*30 = 180ms
        assert_eq!(segs[0].end_ms, 180);
    }

    #[test]
    fn still_voiced_at_eof_closes_at_last_frame_end() {
        let flags = vec![true, true, true, true];
        let segs = frames_to_segments(&flags, 30, 90, 90);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].start_ms, 0);
        assert_eq!(segs[0].end_ms, 4 * 30);
    }

    #[test]
    fn brief_voiced_blip_below_threshold_never_opens() {
        let flags = vec![false, true, false, false, false];
        let segs = frames_to_segments(&flags, 30, 90, 90);
        assert!(segs.is_empty());
    }

    #[test]
    fn brief_silence_gap_below_threshold_does_not_split() {
        // speech, brief gap (1 frame, below min_silence of 3), speech again
        let flags = vec![true, true, true, false, true, true, true];
        let segs = frames_to_segments(&flags, 30, 90, 90);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].start_ms, 0);
        assert_eq!(segs[0].end_ms, 7 * 30);
    }
}
