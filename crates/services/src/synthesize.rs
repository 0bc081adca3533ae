//! Speech synthesis service client
//!
//! Converts reply text into audio files and produces the ordered clip list
//! the segment sequencer consumes.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use std::path::PathBuf;

use avatar_agent_core::Clip;

use crate::generate::StyledLine;
use crate::ServiceError;

/// Synthesis service configuration
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    /// TTS endpoint URL
    pub url: String,
    /// Voice identifier
    pub voice: String,
    /// Speech speed (service-specific scale)
    pub speed: u32,
    /// Directory synthesized audio files are written to
    pub audio_dir: PathBuf,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9002/task/tts/direct".to_string(),
            voice: "zhixiaoxia".to_string(),
            speed: 50,
            audio_dir: PathBuf::from("/tmp/avatar-agent/audio"),
        }
    }
}

/// Speech synthesis collaborator
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize one text in one style, returning its clips in order
    async fn synthesize(&self, text: &str, style: &str) -> Result<Vec<Clip>, ServiceError>;

    /// Synthesize a styled clip plan, preserving line order
    async fn synthesize_plan(&self, lines: &[StyledLine]) -> Result<Vec<Clip>, ServiceError> {
        let mut clips = Vec::new();
        for line in lines {
            let batch = self.synthesize(&line.text, &line.style).await?;
            for mut clip in batch {
                clip.index = clips.len();
                clips.push(clip);
            }
        }
        Ok(clips)
    }
}

/// HTTP synthesis client
pub struct HttpSynthesizer {
    client: reqwest::Client,
    config: SynthesizerConfig,
}

impl HttpSynthesizer {
    /// Create a new client
    pub fn new(config: SynthesizerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request_body(&self, text: &str, style: &str) -> serde_json::Value {
        json!({
            "text": text,
            "args": {
                "vcn": self.config.voice,
                "speed": self.config.speed,
                "style": style,
            },
        })
    }

    async fn write_audio_file(&self, audio: &[u8]) -> Result<PathBuf, ServiceError> {
        tokio::fs::create_dir_all(&self.config.audio_dir).await?;

        let path = self
            .config
            .audio_dir
            .join(format!("{}.wav", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, audio).await?;

        Ok(path)
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, style: &str) -> Result<Vec<Clip>, ServiceError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&self.request_body(text, style))
            .send()
            .await?
            .error_for_status()?;

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ServiceError::MissingResult(
                "synthesis returned no audio".to_string(),
            ));
        }

        let path = self.write_audio_file(&audio).await?;
        tracing::info!(
            path = %path.display(),
            bytes = audio.len(),
            style,
            "Synthesized clip"
        );

        let clip = Clip::new(path.to_string_lossy(), style, 0).with_base64(BASE64.encode(&audio));
        Ok(vec![clip])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let synthesizer = HttpSynthesizer::new(SynthesizerConfig::default());
        let body = synthesizer.request_body("hello", "happy");

        assert_eq!(body["text"], "hello");
        assert_eq!(body["args"]["vcn"], "zhixiaoxia");
        assert_eq!(body["args"]["speed"], 50);
        assert_eq!(body["args"]["style"], "happy");
    }

    #[tokio::test]
    async fn test_write_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer = HttpSynthesizer::new(SynthesizerConfig {
            audio_dir: dir.path().to_path_buf(),
            ..SynthesizerConfig::default()
        });

        let path = synthesizer.write_audio_file(b"RIFFdata").await.unwrap();
        assert!(path.exists());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"RIFFdata");
    }

    /// Plan synthesis preserves line order and assigns contiguous indices.
    struct StubSynthesizer;

    #[async_trait]
    impl Synthesizer for StubSynthesizer {
        async fn synthesize(&self, text: &str, style: &str) -> Result<Vec<Clip>, ServiceError> {
            Ok(vec![Clip::new(format!("/a/{}.wav", text), style, 0)])
        }
    }

    #[tokio::test]
    async fn test_synthesize_plan_preserves_order() {
        let lines = vec![
            StyledLine {
                style: "happy".to_string(),
                text: "one".to_string(),
            },
            StyledLine {
                style: "calm".to_string(),
                text: "two".to_string(),
            },
            StyledLine {
                style: "sad".to_string(),
                text: "three".to_string(),
            },
        ];

        let clips = StubSynthesizer.synthesize_plan(&lines).await.unwrap();
        assert_eq!(clips.len(), 3);
        assert_eq!(
            clips.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(clips[0].style, "happy");
        assert_eq!(clips[2].audio_path, "/a/three.wav");
    }
}
