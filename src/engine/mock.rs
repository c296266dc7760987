//! In-memory engine used by the pipeline and handler tests.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::audio_store::StagedAudio;
use crate::engine::{
    ClipInfo, EngineError, ModelInfo, Segment, Transcription, TranscriptionConfig,
    TranscriptionEngine,
};

/// What the mock produces for every call
#[derive(Clone)]
pub enum MockBehavior {
    /// Emit these segment texts in order
    Segments(Vec<String>),
    /// Emit the staged file's bytes (UTF-8) as a single segment
    EchoAudio,
    /// Fail before producing anything
    Fail(String),
    /// Emit the first segment, then fail while iterating
    FailMidStream(String),
}

/// What the mock observed during one call
#[derive(Debug, Clone)]
pub struct MockCall {
    pub config: TranscriptionConfig,
    pub path: PathBuf,
    pub existed: bool,
}

pub struct MockEngine {
    info: ModelInfo,
    behavior: MockBehavior,
    detected_language: Option<String>,
    duration: Option<f64>,
    delay: Option<Duration>,
    calls: Mutex<Vec<MockCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockEngine {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            info: ModelInfo {
                model: "small".to_string(),
                device: "cpu".to_string(),
                compute_type: "int8".to_string(),
            },
            behavior,
            detected_language: Some("en".to_string()),
            duration: Some(2.5),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_segments(texts: &[&str]) -> Self {
        Self::new(MockBehavior::Segments(
            texts.iter().map(|t| t.to_string()).collect(),
        ))
    }

    pub fn detected_language(mut self, language: Option<&str>) -> Self {
        self.detected_language = language.map(str::to_string);
        self
    }

    pub fn duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of simultaneous `transcribe` calls seen
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn segment(text: String) -> Result<Segment, EngineError> {
    Ok(Segment {
        start: 0.0,
        end: 0.0,
        text,
    })
}

impl TranscriptionEngine for MockEngine {
    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn transcribe(
        &self,
        audio: &StagedAudio,
        config: &TranscriptionConfig,
    ) -> Result<Transcription, EngineError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        self.calls.lock().unwrap().push(MockCall {
            config: config.clone(),
            path: audio.path().to_path_buf(),
            existed: audio.path().exists(),
        });

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let bytes = fs::read(audio.path());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let segments: Vec<Result<Segment, EngineError>> = match &self.behavior {
            MockBehavior::Segments(texts) => texts.iter().cloned().map(segment).collect(),
            MockBehavior::EchoAudio => {
                let bytes = bytes.map_err(|e| EngineError::Decode(e.to_string()))?;
                vec![segment(format!(" {} ", String::from_utf8_lossy(&bytes)))]
            }
            MockBehavior::Fail(message) => return Err(EngineError::Inference(message.clone())),
            MockBehavior::FailMidStream(message) => vec![
                segment("partial".to_string()),
                Err(EngineError::Inference(message.clone())),
            ],
        };

        let language = config
            .language
            .clone()
            .or_else(|| self.detected_language.clone());

        Ok(Transcription {
            segments: Box::new(segments.into_iter()),
            info: ClipInfo {
                language,
                duration: self.duration,
            },
        })
    }
}
