//! Whisper transcription backend.
//!
//! Uses whisper.cpp via whisper-rs. The context (model weights) is loaded once and
//! shared; every call creates its own decoding state, so overlapping requests never
//! see each other's intermediate results.

use std::os::raw::c_int;

use log::{debug, info};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
    WhisperVadParams,
};

use crate::audio_store::StagedAudio;
use crate::config::EngineConfig;
use crate::engine::audio::decode_file;
use crate::engine::model::ModelSpec;
use crate::engine::{
    ClipInfo, EngineError, ModelInfo, Segment, StartupError, Transcription, TranscriptionConfig,
    TranscriptionEngine,
};

/// Language code understood by whisper.cpp as "detect it"
const AUTO_LANGUAGE: &str = "auto";

pub struct WhisperEngine {
    ctx: WhisperContext,
    info: ModelInfo,
    vad_model: String,
    threads: c_int,
}

impl WhisperEngine {
    /// Resolve the artifacts and load the model into memory.
    pub fn load(config: &EngineConfig) -> Result<Self, StartupError> {
        let spec = ModelSpec::resolve(config)?;

        info!(
            "Loading Whisper model {} (device={}, compute_type={:?}, threads={})",
            spec.model_path.display(),
            spec.device,
            spec.compute_type,
            spec.threads
        );

        let model_path = spec
            .model_path
            .to_str()
            .ok_or_else(|| StartupError::Load("model path is not valid UTF-8".into()))?;
        let vad_model = spec
            .vad_model_path
            .to_str()
            .ok_or_else(|| StartupError::Load("VAD model path is not valid UTF-8".into()))?
            .to_string();

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(spec.use_gpu());

        let ctx = WhisperContext::new_with_params(model_path, ctx_params)
            .map_err(|e| StartupError::Load(e.to_string()))?;

        info!("Whisper model loaded");

        Ok(Self {
            ctx,
            info: ModelInfo::from_config(config),
            vad_model,
            threads: c_int::try_from(spec.threads).unwrap_or(c_int::MAX),
        })
    }

    fn full_params<'a>(&'a self, config: &'a TranscriptionConfig) -> FullParams<'a, 'a> {
        let strategy = if config.beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size: c_int::try_from(config.beam_size).unwrap_or(c_int::MAX),
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        };

        let mut params = FullParams::new(strategy);
        params.set_language(Some(config.language.as_deref().unwrap_or(AUTO_LANGUAGE)));
        params.set_translate(false);
        params.set_n_threads(self.threads);

        params.enable_vad(true);
        params.set_vad_model_path(Some(self.vad_model.as_str()));
        params.set_vad_params(WhisperVadParams::default());

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params
    }
}

impl TranscriptionEngine for WhisperEngine {
    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn transcribe(
        &self,
        audio: &StagedAudio,
        config: &TranscriptionConfig,
    ) -> Result<Transcription, EngineError> {
        let decoded = decode_file(audio.path())?;
        debug!(
            "Decoded {} samples ({:.2}s) from {}",
            decoded.samples.len(),
            decoded.duration,
            audio.path().display()
        );

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| EngineError::Inference(format!("failed to create state: {e}")))?;

        state
            .full(self.full_params(config), &decoded.samples)
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let language = match &config.language {
            Some(language) => Some(language.clone()),
            None => whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string),
        };

        let total = state.full_n_segments();
        Ok(Transcription {
            segments: Box::new(WhisperSegments {
                state,
                next: 0,
                total,
            }),
            info: ClipInfo {
                language,
                duration: Some(decoded.duration),
            },
        })
    }
}

/// Reads segments out of a finished decoding state, one at a time.
struct WhisperSegments {
    state: WhisperState,
    next: c_int,
    total: c_int,
}

impl Iterator for WhisperSegments {
    type Item = Result<Segment, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let Some(segment) = self.state.get_segment(index) else {
            return Some(Err(EngineError::Inference(format!(
                "segment {index} out of range"
            ))));
        };

        let text = match segment.to_str_lossy() {
            Ok(text) => text.into_owned(),
            Err(e) => return Some(Err(EngineError::Inference(e.to_string()))),
        };

        // Timestamps are in centiseconds.
        Some(Ok(Segment {
            start: segment.start_timestamp() as f64 / 100.0,
            end: segment.end_timestamp() as f64 / 100.0,
            text,
        }))
    }
}
