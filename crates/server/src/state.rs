//! Application State
//!
//! Shared state across all handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use avatar_agent_config::Settings;
use avatar_agent_relay::{RelayBufferConfig, SessionRegistry, SessionRegistryConfig};
use avatar_agent_services::{
    GeneratorConfig, HttpGenerator, HttpSynthesizer, HttpTranscriber, SynthesizerConfig,
    TranscriberConfig,
};
use avatar_agent_services::{Generator, Synthesizer, Transcriber};

use crate::session::SessionManager;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Viewer session manager
    pub sessions: Arc<SessionManager>,
    /// Frame buffer registry
    pub registry: Arc<SessionRegistry>,
    /// Speech-to-text collaborator
    pub transcriber: Arc<dyn Transcriber>,
    /// Text generation collaborator
    pub generator: Arc<dyn Generator>,
    /// Speech synthesis collaborator
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Settings) -> Self {
        let sessions = Arc::new(SessionManager::with_config(
            config.server.max_sessions,
            Duration::from_secs(config.server.session_timeout_secs),
            Duration::from_secs(config.server.cleanup_interval_secs),
        ));

        let registry = Arc::new(SessionRegistry::new(SessionRegistryConfig {
            buffer: RelayBufferConfig {
                capacity: config.relay.frame_capacity,
                poll_interval: config.relay.poll_interval(),
                max_attempts: config.relay.max_delivery_attempts,
                backoff_step: config.relay.retry_backoff(),
                ..RelayBufferConfig::default()
            },
            status_interval: config.relay.status_interval(),
            sweep_interval: config.relay.sweep_interval(),
            pressure_warn_ratio: config.relay.pressure_warn_ratio,
        }));

        let transcriber = Arc::new(HttpTranscriber::new(TranscriberConfig {
            url: config.services.transcription.url.clone(),
            app_key: config.services.transcription.app_key.clone(),
            sample_rate: config.services.transcription.sample_rate,
        }));

        let generator = Arc::new(HttpGenerator::new(GeneratorConfig {
            url: config.services.generation.url.clone(),
            api_key: config.services.generation.api_key.clone(),
            model: config.services.generation.model.clone(),
            system_prompt: config.services.generation.system_prompt.clone(),
        }));

        let synthesizer = Arc::new(HttpSynthesizer::new(SynthesizerConfig {
            url: config.services.synthesis.url.clone(),
            voice: config.services.synthesis.voice.clone(),
            speed: config.services.synthesis.speed,
            audio_dir: PathBuf::from(&config.services.audio_dir),
        }));

        Self {
            config: Arc::new(config),
            sessions,
            registry,
            transcriber,
            generator,
            synthesizer,
        }
    }
}
