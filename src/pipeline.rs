//! Request pipeline
//!
//! Takes one upload from validation to a finished transcript:
//! validate → stage → resolve configuration → transcribe → fold → release.
//!
//! The staged file and the inference permit are moved into the blocking task that
//! runs the engine, so the file is released when inference finishes on every path,
//! including failures, panics, and callers that stopped waiting for the result.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::audio_store::{AudioStore, StagedAudio};
use crate::engine::{
    EngineError, ModelInfo, Segment, Transcription, TranscriptionConfig, TranscriptionEngine,
};
use crate::models::TranscriptResult;

/// One inbound clip
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub data: Vec<u8>,
    /// Filename declared by the client, if any
    pub filename: Option<String>,
}

/// Unvalidated request parameters as received from the client
#[derive(Debug, Clone, Default)]
pub struct TranscribeRequest {
    pub upload: Option<AudioUpload>,
    pub language: Option<String>,
    pub beam_size: Option<i64>,
}

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No audio payload in the request
    #[error("No audio file provided in the request")]
    NoAudioFile,

    /// beam_size is not a positive integer
    #[error("Invalid beam_size: {0}. Must be a positive integer")]
    InvalidBeamSize(String),

    /// The upload could not be written to the staging area
    #[error("Failed to stage audio: {0}")]
    Staging(#[source] io::Error),

    /// The engine failed, or the inference task died
    #[error("Transcription failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// True for errors caused by the client's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NoAudioFile | Self::InvalidBeamSize(_))
    }
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

/// Joins segment texts into one transcript
///
/// Consumes the sequence exactly once, in order. Each text is trimmed, the
/// pieces are joined with single spaces and the joined string is trimmed.
pub fn fold_segments<I>(segments: I) -> Result<String, EngineError>
where
    I: IntoIterator<Item = Result<Segment, EngineError>>,
{
    let mut text = String::new();
    for (index, segment) in segments.into_iter().enumerate() {
        let segment = segment?;
        if index > 0 {
            text.push(' ');
        }
        text.push_str(segment.text.trim());
    }
    Ok(text.trim().to_string())
}

/// Per-process pipeline state shared by all requests
pub struct Pipeline {
    engine: Arc<dyn TranscriptionEngine>,
    store: AudioStore,
    default_beam_size: u32,
    gate: Arc<Semaphore>,
}

impl Pipeline {
    /// Creates the pipeline
    ///
    /// `max_concurrent_inferences` bounds how many engine calls may run at
    /// once; 1 serializes them.
    pub fn new(
        engine: Arc<dyn TranscriptionEngine>,
        store: AudioStore,
        default_beam_size: u32,
        max_concurrent_inferences: usize,
    ) -> Self {
        Self {
            engine,
            store,
            default_beam_size: default_beam_size.max(1),
            gate: Arc::new(Semaphore::new(max_concurrent_inferences.max(1))),
        }
    }

    pub fn model_info(&self) -> &ModelInfo {
        self.engine.model_info()
    }

    pub fn store(&self) -> &AudioStore {
        &self.store
    }

    pub fn default_beam_size(&self) -> u32 {
        self.default_beam_size
    }

    /// Resolves the effective decoding configuration
    ///
    /// An empty language means auto-detect, any other value is passed through
    /// unchanged; a missing beam size falls back to the process default.
    pub fn resolve_config(
        &self,
        language: Option<String>,
        beam_size: Option<i64>,
    ) -> Result<TranscriptionConfig, PipelineError> {
        let beam_size = match beam_size {
            None => self.default_beam_size,
            Some(value) => u32::try_from(value)
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| PipelineError::InvalidBeamSize(value.to_string()))?,
        };

        let language = language.filter(|l| !l.is_empty());

        Ok(TranscriptionConfig {
            language,
            beam_size,
        })
    }

    /// Runs one request through the pipeline
    pub async fn transcribe(
        &self,
        request: TranscribeRequest,
    ) -> Result<TranscriptResult, PipelineError> {
        let upload = request.upload.ok_or(PipelineError::NoAudioFile)?;
        let config = self.resolve_config(request.language, request.beam_size)?;

        let staged = self
            .store
            .stage(&upload.data, upload.filename.as_deref())
            .await
            .map_err(|e| {
                error!("Failed to stage upload: {}", e);
                PipelineError::Staging(e)
            })?;

        let permit = match Arc::clone(&self.gate).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                staged.release();
                return Err(PipelineError::Inference(format!(
                    "inference gate closed: {}",
                    e
                )));
            }
        };

        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = run_inference(engine.as_ref(), &staged, &config);
            staged.release();
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Inference task failed: {}", e);
                Err(PipelineError::Inference(format!(
                    "inference task aborted: {}",
                    e
                )))
            }
        }
    }
}

/// Transcribes and folds one staged clip; runs on a blocking thread
fn run_inference(
    engine: &dyn TranscriptionEngine,
    staged: &StagedAudio,
    config: &TranscriptionConfig,
) -> Result<TranscriptResult, PipelineError> {
    let start = Instant::now();
    info!(
        "Transcribing {} (language={}, beam_size={})",
        staged.path().display(),
        config.language.as_deref().unwrap_or("auto"),
        config.beam_size
    );

    let result = engine
        .transcribe(staged, config)
        .and_then(|Transcription { segments, info }| {
            let text = fold_segments(segments)?;
            Ok(TranscriptResult {
                text,
                language: config.language.clone().or(info.language),
                duration: info.duration,
            })
        });

    match result {
        Ok(transcript) => {
            info!(
                "Transcribed {} in {:.2}s ({} chars)",
                staged.path().display(),
                start.elapsed().as_secs_f64(),
                transcript.text.len()
            );
            Ok(transcript)
        }
        Err(e) => {
            error!("Transcription of {} failed: {}", staged.path().display(), e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockBehavior, MockEngine};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    fn upload(data: &[u8], filename: Option<&str>) -> Option<AudioUpload> {
        Some(AudioUpload {
            data: data.to_vec(),
            filename: filename.map(str::to_string),
        })
    }

    fn pipeline(engine: Arc<MockEngine>, dir: &Path, default_beam_size: u32) -> Pipeline {
        Pipeline::new(engine, AudioStore::new(dir), default_beam_size, 1)
    }

    fn staged_files(dir: &Path) -> usize {
        fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    fn seg(text: &str) -> Result<Segment, EngineError> {
        Ok(Segment {
            start: 0.0,
            end: 1.0,
            text: text.to_string(),
        })
    }

    #[test]
    fn test_fold_trims_and_joins() {
        let text = fold_segments(vec![seg("  hello "), seg("world  ")]).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_fold_keeps_separator_of_blank_segments() {
        let text = fold_segments(vec![seg(" a"), seg("   "), seg("b ")]).unwrap();
        assert_eq!(text, "a  b");
        // Blank edges disappear with the final trim
        let text = fold_segments(vec![seg("  "), seg("a"), seg(" ")]).unwrap();
        assert_eq!(text, "a");
        assert_eq!(fold_segments(Vec::new()).unwrap(), "");
    }

    #[test]
    fn test_fold_consumes_single_pass_iterator() {
        let texts = vec!["  one", "two ", " three "];
        let stream = texts.into_iter().map(seg);
        assert_eq!(fold_segments(stream).unwrap(), "one two three");
    }

    #[test]
    fn test_fold_propagates_stream_error() {
        let stream = vec![
            seg("ok"),
            Err(EngineError::Inference("boom".to_string())),
            seg("never"),
        ];
        assert!(fold_segments(stream).is_err());
    }

    #[tokio::test]
    async fn test_resolve_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(Arc::new(MockEngine::with_segments(&[])), dir.path(), 4);

        let config = p.resolve_config(None, None).unwrap();
        assert_eq!(config.beam_size, 4);
        assert_eq!(config.language, None);

        let config = p.resolve_config(Some(String::new()), Some(2)).unwrap();
        assert_eq!(config.beam_size, 2);
        assert_eq!(config.language, None);

        let config = p.resolve_config(Some("fr".to_string()), None).unwrap();
        assert_eq!(config.language.as_deref(), Some("fr"));

        // A non-empty hint reaches the engine untouched
        let config = p.resolve_config(Some(" pt-BR".to_string()), None).unwrap();
        assert_eq!(config.language.as_deref(), Some(" pt-BR"));
    }

    #[tokio::test]
    async fn test_resolve_config_rejects_non_positive_beam() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(Arc::new(MockEngine::with_segments(&[])), dir.path(), 1);

        for value in [0, -3, i64::from(u32::MAX) + 1] {
            let err = p.resolve_config(None, Some(value)).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidBeamSize(_)));
            assert!(err.is_client_error());
        }
    }

    #[tokio::test]
    async fn test_success_folds_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::with_segments(&["  hello ", "world  "]));
        let p = pipeline(engine.clone(), dir.path(), 3);

        let result = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", Some("clip.wav")),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.text, "hello world");
        assert_eq!(result.language.as_deref(), Some("en"));
        assert_eq!(result.duration, Some(2.5));

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].existed);
        assert_eq!(calls[0].config.beam_size, 3);
        assert!(calls[0].path.to_string_lossy().ends_with(".wav"));
        assert!(!calls[0].path.exists());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_supplied_language_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::with_segments(&["hola"]).detected_language(Some("en")));
        let p = pipeline(engine.clone(), dir.path(), 1);

        let result = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", None),
                language: Some("es".to_string()),
                beam_size: Some(5),
            })
            .await
            .unwrap();

        assert_eq!(result.language.as_deref(), Some("es"));
        let calls = engine.calls();
        assert_eq!(calls[0].config.language.as_deref(), Some("es"));
        assert_eq!(calls[0].config.beam_size, 5);
    }

    #[tokio::test]
    async fn test_unknown_duration_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            MockEngine::with_segments(&["x"])
                .duration(None)
                .detected_language(None),
        );
        let p = pipeline(engine, dir.path(), 1);

        let result = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", None),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.duration, None);
        assert_eq!(result.language, None);
    }

    #[tokio::test]
    async fn test_missing_upload_never_stages() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::with_segments(&["x"]));
        let p = pipeline(engine.clone(), dir.path(), 1);

        let err = p.transcribe(TranscribeRequest::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoAudioFile));
        assert!(engine.calls().is_empty());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_invalid_beam_never_stages() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::with_segments(&["x"]));
        let p = pipeline(engine.clone(), dir.path(), 1);

        let err = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", None),
                beam_size: Some(0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBeamSize(_)));
        assert!(engine.calls().is_empty());
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_releases() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(MockBehavior::Fail("model exploded".into())));
        let p = pipeline(engine.clone(), dir.path(), 1);

        let err = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", Some("a.mp3")),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Inference(_)));
        assert_eq!(err.to_string(), "Transcription failed: model exploded");
        assert_eq!(engine.calls().len(), 1);
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_releases() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(MockBehavior::FailMidStream("lost".into())));
        let p = pipeline(engine, dir.path(), 1);

        let err = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", None),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("lost"));
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_staging_failure_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let engine = Arc::new(MockEngine::with_segments(&["x"]));
        let p = pipeline(engine.clone(), &blocker, 1);

        let err = p
            .transcribe(TranscribeRequest {
                upload: upload(b"audio", None),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Staging(_)));
        assert!(!err.is_client_error());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_get_their_own_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            MockEngine::new(MockBehavior::EchoAudio).delay(Duration::from_millis(50)),
        );
        let p = Arc::new(pipeline(engine.clone(), dir.path(), 1));

        let first = {
            let p = Arc::clone(&p);
            tokio::spawn(async move {
                p.transcribe(TranscribeRequest {
                    upload: upload(b"first clip", None),
                    ..Default::default()
                })
                .await
            })
        };
        let second = {
            let p = Arc::clone(&p);
            tokio::spawn(async move {
                p.transcribe(TranscribeRequest {
                    upload: upload(b"second clip", None),
                    ..Default::default()
                })
                .await
            })
        };

        assert_eq!(first.await.unwrap().unwrap().text, "first clip");
        assert_eq!(second.await.unwrap().unwrap().text, "second clip");
        assert_eq!(engine.max_in_flight(), 1);
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gate_allows_configured_parallelism() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(
            MockEngine::new(MockBehavior::EchoAudio).delay(Duration::from_millis(200)),
        );
        let p = Arc::new(Pipeline::new(
            engine.clone(),
            AudioStore::new(dir.path()),
            1,
            2,
        ));

        let tasks: Vec<_> = (0..2)
            .map(|i| {
                let p = Arc::clone(&p);
                tokio::spawn(async move {
                    p.transcribe(TranscribeRequest {
                        upload: upload(format!("clip {i}").as_bytes(), None),
                        ..Default::default()
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(engine.max_in_flight(), 2);
    }
}
