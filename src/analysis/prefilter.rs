/// Whether a dialogue should skip the LLM call entirely, and why. The two
/// checks below are evaluated independently and sequentially — either one
/// alone is sufficient to skip. They are NOT folded into one compound
/// condition: check A looks only at transcript length; check B only fires
/// when duration is short AND no marker is present.
pub fn should_skip(
    transcript: &str,
    duration_sec: f64,
    min_text_len: usize,
    min_duration_sec: f64,
    upsell_markers: &[String],
) -> Option<&'static str> {
    let trimmed = transcript.trim();

    if trimmed.len() < min_text_len {
        return Some("transcript too short");
    }

    if duration_sec < min_duration_sec {
        let lowercased = trimmed.to_lowercase();
        let has_marker = upsell_markers.iter().any(|m| lowercased.contains(m.as_str()));
        if !has_marker {
            return Some("dialogue too short with no upsell markers");
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> Vec<String> {
        vec!["coffee".to_string(), "dessert".to_string()]
    }

    #[test]
    fn short_text_skips_regardless_of_markers() {
        // 4-char transcript, contains a marker substring-ish but length check fires first
        let reason = should_skip("coff", 30.0, 10, 6.0, &markers());
        assert_eq!(reason, Some("transcript too short"));
    }

    #[test]
    fn short_duration_without_marker_skips() {
        let reason = should_skip("one tea please no thanks", 4.0, 10, 6.0, &markers());
        assert_eq!(reason, Some("dialogue too short with no upsell markers"));
    }

    #[test]
    fn short_duration_with_marker_does_not_skip_on_check_b() {
        let reason = should_skip("would you like a coffee with that", 4.0, 10, 6.0, &markers());
        assert_eq!(reason, None);
    }

    #[test]
    fn long_enough_transcript_and_duration_never_skips() {
        let reason = should_skip("a perfectly ordinary longer exchange about the order", 30.0, 10, 6.0, &markers());
        assert_eq!(reason, None);
    }
}
