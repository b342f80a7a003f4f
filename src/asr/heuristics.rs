use regex::Regex;
use std::sync::OnceLock;

fn repeated_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(.)\1{2,}").unwrap())
}

fn punctuation_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.?!]{3,}").unwrap())
}

/// The transcript-quality signals the accurate-pass decision is based on.
#[derive(Debug, Clone, Copy)]
pub struct TranscriptQuality<'a> {
    pub text: &'a str,
    pub avg_logprob: f32,
    pub no_speech_prob: f32,
    pub audio_duration_sec: f64,
}

/// Fraction of characters inside 3+ repeated-character runs, scaled by 3
/// and capped at 1.0; repeated-word ratio when it exceeds 0.5 (otherwise
/// contributes 0); count of 3+ end-punctuation runs scaled by 0.2 and
/// capped at 1.0; count of tokens over 30 characters scaled by 0.3 and
/// capped at 1.0 — averaged over all four sub-scores.
pub fn garbage_score(text: &str) -> f64 {
    const TOTAL_CHECKS: f64 = 4.0;

    if text.is_empty() || text.len() < 10 {
        return 0.0;
    }

    let repeated_chars_score = {
        let matched: usize = repeated_chars_re()
            .find_iter(text)
            .map(|m| m.as_str().len())
            .sum();
        let frac = matched as f64 / text.len() as f64;
        (frac * 3.0).min(1.0)
    };

    // Diversity ratio: 1 - unique_words/total_words, so all-distinct text
    // scores 0 and all-repeated text scores close to 1. Gated on >3 words
    // so short utterances never get penalized by a small-sample fluke.
    let words: Vec<String> = text.split_whitespace().map(|w| w.to_lowercase()).collect();
    let repeated_word_score = if words.len() > 3 {
        let unique: std::collections::HashSet<&str> = words.iter().map(|w| w.as_str()).collect();
        let repetition_ratio = 1.0 - (unique.len() as f64 / words.len() as f64);
        if repetition_ratio > 0.5 {
            repetition_ratio
        } else {
            0.0
        }
    } else {
        0.0
    };

    let punctuation_score = {
        let runs = punctuation_run_re().find_iter(text).count();
        (runs as f64 * 0.2).min(1.0)
    };

    let long_word_score = {
        let long_words = words.iter().filter(|w| w.len() > 30).count();
        (long_words as f64 * 0.3).min(1.0)
    };

    (repeated_chars_score + repeated_word_score + punctuation_score + long_word_score) / TOTAL_CHECKS
}

/// Decides whether the "fast" pass result is good enough or whether an
/// "accurate" pass should be run, per the heuristics enumerated in the
/// ASR stage design. Never escalates audio shorter than
/// `min_duration_for_accurate`, regardless of how poor the signals look.
pub fn needs_accurate_pass(
    quality: TranscriptQuality<'_>,
    min_duration_for_accurate: f64,
    avg_logprob_threshold: f32,
    min_text_length_ratio: f32,
) -> bool {
    if quality.audio_duration_sec < min_duration_for_accurate {
        return false;
    }

    if quality.avg_logprob < avg_logprob_threshold {
        return true;
    }

    let min_expected_len = quality.audio_duration_sec as f32 * min_text_length_ratio;
    if (quality.text.len() as f32) < min_expected_len {
        return true;
    }

    if garbage_score(quality.text) > 0.3 {
        return true;
    }

    if quality.no_speech_prob > 0.7 && quality.text.len() > 10 {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_audio_never_escalates() {
        let q = TranscriptQuality {
            text: "",
            avg_logprob: -5.0,
            no_speech_prob: 1.0,
            audio_duration_sec: 5.0,
        };
        assert!(!needs_accurate_pass(q, 15.0, -0.7, 0.5));
    }

    #[test]
    fn low_avg_logprob_escalates() {
        let q = TranscriptQuality {
            text: "a reasonably long transcript that should otherwise pass all other checks fine",
            avg_logprob: -0.9,
            no_speech_prob: 0.1,
            audio_duration_sec: 30.0,
        };
        assert!(needs_accurate_pass(q, 15.0, -0.7, 0.5));
    }

    #[test]
    fn sufficient_fast_pass_does_not_escalate() {
        let text = "a".repeat(20); // 20 chars for 30s audio at 0.5 ratio needs >=15 chars
        let q = TranscriptQuality {
            text: &text,
            avg_logprob: -0.3,
            no_speech_prob: 0.05,
            audio_duration_sec: 30.0,
        };
        assert!(!needs_accurate_pass(q, 15.0, -0.7, 0.5));
    }

    #[test]
    fn garbage_score_escalates_independently_of_other_signals() {
        let text = "aaaaaaaaaa aaaaaaaaaa aaaaaaaaaa aaaaaaaaaa aaaaaaaaaa aaaaaaaaaa";
        let q = TranscriptQuality {
            text,
            avg_logprob: -0.1,
            no_speech_prob: 0.0,
            audio_duration_sec: 20.0,
        };
        assert!(garbage_score(text) > 0.3);
        assert!(needs_accurate_pass(q, 15.0, -0.7, 0.5));
    }

    #[test]
    fn no_speech_prob_with_some_text_escalates() {
        let q = TranscriptQuality {
            text: "a transcript longer than ten characters",
            avg_logprob: -0.1,
            no_speech_prob: 0.9,
            audio_duration_sec: 30.0,
        };
        assert!(needs_accurate_pass(q, 15.0, -0.7, 0.5));
    }

    #[test]
    fn short_text_never_scores_as_garbage() {
        assert_eq!(garbage_score(""), 0.0);
        assert_eq!(garbage_score("a b a"), 0.0);
    }

    #[test]
    fn alternating_word_pair_uses_diversity_ratio_not_dominant_share() {
        // 6 words, 2 unique -> diversity ratio 1 - 2/6 = 0.667, which exceeds
        // the 0.5 gate (a max-share formula would instead compute 0.5 here
        // and wrongly fail to flag it).
        let text = "a b a b a b";
        let score = garbage_score(text);
        assert!((score - (0.6666_f64 / 4.0)).abs() < 0.001, "got {score}");
    }
}
