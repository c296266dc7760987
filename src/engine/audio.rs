//! Audio decoding and resampling to 16kHz mono f32.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::EngineError;

/// Sample rate expected by the model.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decoded clip ready for inference.
#[derive(Debug)]
pub struct DecodedAudio {
    /// Mono samples at [`TARGET_SAMPLE_RATE`].
    pub samples: Vec<f32>,
    /// Length of the source clip in seconds.
    pub duration: f64,
}

/// Decode an audio file into 16kHz mono f32 samples.
///
/// The file extension is only a probing hint; the container is detected from
/// its content.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, EngineError> {
    let file = File::open(path)
        .map_err(|e| EngineError::Decode(format!("cannot open {}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    decode_stream(mss, &hint)
}

fn decode_stream(mss: MediaSourceStream, hint: &Hint) -> Result<DecodedAudio, EngineError> {
    let probed = symphonia::default::get_probe()
        .format(
            hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EngineError::Decode(format!("probe failed: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EngineError::Decode("no audio track found".into()))?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let source_rate = codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| EngineError::Decode(format!("codec init failed: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(EngineError::Decode(format!("packet read: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skipped rather than failing the whole clip.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(EngineError::Decode(format!("decode: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        if channels > 1 {
            mono.extend(
                sample_buf
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            mono.extend_from_slice(sample_buf.samples());
        }
    }

    if mono.is_empty() {
        return Err(EngineError::Decode("no audio samples decoded".into()));
    }

    let duration = mono.len() as f64 / f64::from(source_rate);

    let samples = if source_rate != TARGET_SAMPLE_RATE {
        resample(&mono, source_rate, TARGET_SAMPLE_RATE)?
    } else {
        mono
    };

    Ok(DecodedAudio { samples, duration })
}

/// Resample mono audio from `from_rate` to `to_rate` using rubato.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, EngineError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| EngineError::Decode(format!("resampler init: {e}")))?;

    let expected_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(expected_len + chunk_size);

    for chunk in samples.chunks(chunk_size) {
        let mut input = chunk.to_vec();
        // The resampler wants full chunks; pad the tail with silence.
        input.resize(chunk_size, 0.0);

        let resampled = resampler
            .process(&[input], None)
            .map_err(|e| EngineError::Decode(format!("resample: {e}")))?;

        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate(expected_len);
    Ok(output)
}
