use crate::error::VadError;

/// The out-of-scope external collaborator named in the pipeline's scope
/// statement: a frame-level voiced/unvoiced predicate. The framing and
/// hysteresis smoothing that turns a stream of these booleans into
/// `(start_ms, end_ms)` segments is core pipeline logic and lives in
/// [`super::framing`], not behind this trait.
pub trait VoiceActivityDetector: Send {
    /// `frame` is 16-bit signed mono PCM at `sample_rate` Hz. Returns
    /// whether the frame contains voice.
    fn is_speech(&mut self, frame: &[i16], sample_rate: u32) -> Result<bool, VadError>;
}

/// WebRTC's VAD, the same engine the source system's VAD worker used
/// (via its own `webrtcvad` binding), at one of its four aggressiveness
/// tiers (0 = least aggressive about filtering out non-speech, 3 = most).
pub struct WebRtcVad {
    inner: webrtc_vad::Vad,
}

impl WebRtcVad {
    pub fn new(aggressiveness: u8) -> Self {
        let mode = match aggressiveness {
            0 => webrtc_vad::VadMode::Quality,
            1 => webrtc_vad::VadMode::LowBitrate,
            2 => webrtc_vad::VadMode::Aggressive,
            _ => webrtc_vad::VadMode::VeryAggressive,
        };
        Self {
            inner: webrtc_vad::Vad::new_with_rate_and_mode(webrtc_vad::SampleRate::Rate16kHz, mode),
        }
    }
}

impl VoiceActivityDetector for WebRtcVad {
    fn is_speech(&mut self, frame: &[i16], sample_rate: u32) -> Result<bool, VadError> {
        if sample_rate != 16_000 {
            return Err(VadError::Detector(format!(
                "webrtc-vad only supports 16kHz input, got {sample_rate}"
            )));
        }
        self.inner
            .is_voice_segment(frame)
            .map_err(|e| VadError::Detector(format!("{e:?}")))
    }
}
