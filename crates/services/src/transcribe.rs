//! Transcription service client
//!
//! Converts a recorded audio file into text via an ASR HTTP endpoint.
//! Absence of speech is signaled by returning no text, not by an error.

use async_trait::async_trait;
use std::path::Path;

use crate::ServiceError;

/// Transcription service configuration
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// ASR endpoint URL
    pub url: String,
    /// Application key passed as a query parameter
    pub app_key: String,
    /// PCM sample rate of the submitted audio
    pub sample_rate: u32,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9000/stream/v1/asr".to_string(),
            app_key: String::new(),
            sample_rate: 16000,
        }
    }
}

/// Speech-to-text collaborator
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `audio_path`.
    ///
    /// Returns `None` when the service recognized nothing.
    async fn transcribe(&self, audio_path: &Path) -> Result<Option<String>, ServiceError>;
}

/// HTTP transcription client
pub struct HttpTranscriber {
    client: reqwest::Client,
    config: TranscriberConfig,
}

impl HttpTranscriber {
    /// Create a new client
    pub fn new(config: TranscriberConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request_url(&self) -> String {
        format!(
            "{}?appkey={}&format=pcm&sample_rate={}\
             &enable_punctuation_prediction=true\
             &enable_inverse_text_normalization=true\
             &enable_voice_detection=false",
            self.config.url, self.config.app_key, self.config.sample_rate
        )
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Option<String>, ServiceError> {
        let audio = tokio::fs::read(audio_path).await?;

        tracing::debug!(
            path = %audio_path.display(),
            bytes = audio.len(),
            "Submitting audio for transcription"
        );

        let response = self
            .client
            .post(self.request_url())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let text = body
            .get("result")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        match &text {
            Some(text) => tracing::info!(text = %text, "Transcription result"),
            None => tracing::info!("Transcription returned no text"),
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_carries_parameters() {
        let transcriber = HttpTranscriber::new(TranscriberConfig {
            url: "http://asr.example/v1/asr".to_string(),
            app_key: "key123".to_string(),
            sample_rate: 16000,
        });

        let url = transcriber.request_url();
        assert!(url.starts_with("http://asr.example/v1/asr?appkey=key123"));
        assert!(url.contains("format=pcm"));
        assert!(url.contains("sample_rate=16000"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let transcriber = HttpTranscriber::new(TranscriberConfig::default());
        let result = transcriber
            .transcribe(Path::new("/nonexistent/audio.pcm"))
            .await;
        assert!(matches!(result, Err(ServiceError::Io(_))));
    }
}
