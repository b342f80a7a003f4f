//! Shared audio decode/transcode helpers used by both the VAD worker (which
//! decodes a whole chunk to PCM for framing) and the ASR worker (which
//! extracts and concatenates dialogue segments into one WAV).

use std::io::Cursor;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::BlobError;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decoded mono PCM at the pipeline's working sample rate (16kHz, 16-bit).
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Decodes an OGG/Vorbis (or other symphonia-supported container) byte
/// buffer to mono 16kHz 16-bit PCM, downmixing and resampling as needed.
pub fn decode_to_pcm16_mono_16k(bytes: &[u8]) -> Result<DecodedAudio, BlobError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("ogg");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BlobError::Decode(format!("probe failed: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| BlobError::Decode("no decodable audio track".to_string()))?
        .clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| BlobError::Decode(format!("decoder init failed: {e}")))?;

    let source_rate = track.codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);
    let mut mono_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(_)) => break,
            Err(e) => return Err(BlobError::Decode(format!("packet read failed: {e}"))),
        };
        if packet.track_id() != track.id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(BlobError::Decode(format!("decode failed: {e}"))),
        };
        append_downmixed(&decoded, &mut mono_samples);
    }

    let resampled = if source_rate == TARGET_SAMPLE_RATE {
        mono_samples
    } else {
        linear_resample(&mono_samples, source_rate, TARGET_SAMPLE_RATE)
    };

    let samples = resampled
        .into_iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate: TARGET_SAMPLE_RATE,
    })
}

fn append_downmixed(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    macro_rules! downmix {
        ($buf:expr) => {{
            let spec = $buf.spec();
            let channels = spec.channels.count().max(1);
            let frames = $buf.frames();
            for i in 0..frames {
                let mut acc = 0.0f32;
                for ch in 0..channels {
                    acc += f32::from(*$buf.chan(ch).get(i).unwrap());
                }
                out.push(acc / channels as f32);
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => {
            let spec = buf.spec();
            let channels = spec.channels.count().max(1);
            let frames = buf.frames();
            for i in 0..frames {
                let mut acc = 0.0f32;
                for ch in 0..channels {
                    acc += *buf.chan(ch).get(i).unwrap();
                }
                out.push(acc / channels as f32);
            }
        }
        AudioBufferRef::S32(buf) => downmix!(buf),
        AudioBufferRef::S16(buf) => downmix!(buf),
        _ => {}
    }
}

/// Nearest-neighbor-free linear resampler. Adequate for VAD/ASR input
/// conditioning where sub-sample timing precision is not required.
fn linear_resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = input.get(idx).copied().unwrap_or(0.0);
        let b = input.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Writes mono 16kHz 16-bit PCM as a WAV file to `path`.
pub fn write_wav(path: &std::path::Path, samples: &[i16], sample_rate: u32) -> Result<(), BlobError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| BlobError::Decode(format!("wav create failed: {e}")))?;
    for &s in samples {
        writer
            .write_sample(s)
            .map_err(|e| BlobError::Decode(format!("wav write failed: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| BlobError::Decode(format!("wav finalize failed: {e}")))?;
    Ok(())
}

/// Slices `[start_ms, end_ms)` out of mono 16-bit PCM at `sample_rate`.
pub fn slice_ms(samples: &[i16], sample_rate: u32, start_ms: i64, end_ms: i64) -> Vec<i16> {
    let start = ((start_ms.max(0) as u64) * sample_rate as u64 / 1000) as usize;
    let end = ((end_ms.max(0) as u64) * sample_rate as u64 / 1000) as usize;
    let end = end.min(samples.len());
    if start >= end {
        return Vec::new();
    }
    samples[start..end].to_vec()
}
