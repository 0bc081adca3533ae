//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Render engine connection configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Frame relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Collaborator service endpoints
    #[serde(default)]
    pub services: ServicesConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.frame_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.frame_capacity".to_string(),
                message: "Frame buffer capacity must be at least 1".to_string(),
            });
        }

        if self.relay.max_delivery_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "relay.max_delivery_attempts".to_string(),
                message: "At least one delivery attempt is required".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.relay.pressure_warn_ratio) {
            return Err(ConfigError::InvalidValue {
                field: "relay.pressure_warn_ratio".to_string(),
                message: "Pressure warning ratio must be within 0.0..=1.0".to_string(),
            });
        }

        if self.engine.connect_timeout_secs == 0 || self.engine.segment_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.timeouts".to_string(),
                message: "Connect and segment timeouts must be non-zero".to_string(),
            });
        }

        if self.engine.url.is_empty() {
            return Err(ConfigError::MissingField("engine.url".to_string()));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent viewer sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle session expiry in seconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Expired-session cleanup interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_sessions() -> usize {
    100
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_cleanup_interval() -> u64 {
    300
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
            session_timeout_secs: default_session_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            cors_enabled: default_true(),
        }
    }
}

/// Render engine connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// WebSocket URL of the render engine
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Connection establishment bound in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-segment completion wait bound in seconds
    #[serde(default = "default_segment_timeout")]
    pub segment_timeout_secs: u64,

    /// JPEG quality requested per frame
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Ask the engine to batch frame sends
    #[serde(default)]
    pub batch_send: bool,

    /// Ask the engine for verbose progress messages
    #[serde(default)]
    pub verbose: bool,
}

fn default_engine_url() -> String {
    "ws://127.0.0.1:8765".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_segment_timeout() -> u64 {
    60
}
fn default_jpeg_quality() -> u8 {
    50
}

impl EngineConfig {
    /// Connection establishment bound
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-segment completion wait bound
    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            connect_timeout_secs: default_connect_timeout(),
            segment_timeout_secs: default_segment_timeout(),
            jpeg_quality: default_jpeg_quality(),
            batch_send: false,
            verbose: false,
        }
    }
}

/// Frame relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Frame buffer capacity per session
    #[serde(default = "default_frame_capacity")]
    pub frame_capacity: usize,

    /// Delivery loop poll bound in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delivery attempts per frame before it is dropped
    #[serde(default = "default_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Backoff step between attempts in milliseconds (linear: step x attempt)
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Aggregate status report interval in seconds
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,

    /// Stale buffer sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Aggregate utilization above which a capacity-pressure warning is logged
    #[serde(default = "default_pressure_ratio")]
    pub pressure_warn_ratio: f64,
}

fn default_frame_capacity() -> usize {
    100
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_delivery_attempts() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    100
}
fn default_status_interval() -> u64 {
    30
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_pressure_ratio() -> f64 {
    0.8
}

impl RelayConfig {
    /// Delivery loop poll bound
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff step between delivery attempts
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Aggregate status report interval
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Stale buffer sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            frame_capacity: default_frame_capacity(),
            poll_interval_ms: default_poll_interval(),
            max_delivery_attempts: default_delivery_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            status_interval_secs: default_status_interval(),
            sweep_interval_secs: default_sweep_interval(),
            pressure_warn_ratio: default_pressure_ratio(),
        }
    }
}

/// Collaborator service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Transcription (speech-to-text) service
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Text generation (LLM) service
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Speech synthesis (TTS) service
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Directory where per-turn audio files are written
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
}

fn default_audio_dir() -> String {
    "/tmp/avatar-agent/audio".to_string()
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            transcription: TranscriptionConfig::default(),
            generation: GenerationConfig::default(),
            synthesis: SynthesisConfig::default(),
            audio_dir: default_audio_dir(),
        }
    }
}

/// Transcription service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// ASR endpoint URL
    #[serde(default = "default_transcription_url")]
    pub url: String,

    /// Application key passed as a query parameter
    #[serde(default)]
    pub app_key: String,

    /// Expected PCM sample rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_transcription_url() -> String {
    "http://127.0.0.1:9000/stream/v1/asr".to_string()
}
fn default_sample_rate() -> u32 {
    16000
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: default_transcription_url(),
            app_key: String::new(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Text generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Chat-completions endpoint URL
    #[serde(default = "default_generation_url")]
    pub url: String,

    /// Bearer token (set via AVATAR_AGENT__SERVICES__GENERATION__API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// Model identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// System prompt prepended to every request
    #[serde(default)]
    pub system_prompt: String,
}

fn default_generation_url() -> String {
    "http://127.0.0.1:9001/v1/chat/completions".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            api_key: String::new(),
            model: default_generation_model(),
            system_prompt: String::new(),
        }
    }
}

/// Speech synthesis service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// TTS endpoint URL
    #[serde(default = "default_synthesis_url")]
    pub url: String,

    /// Voice identifier
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Speech speed (service-specific scale)
    #[serde(default = "default_speed")]
    pub speed: u32,
}

fn default_synthesis_url() -> String {
    "http://127.0.0.1:9002/task/tts/direct".to_string()
}
fn default_voice() -> String {
    "zhixiaoxia".to_string()
}
fn default_speed() -> u32 {
    50
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            url: default_synthesis_url(),
            voice: default_voice(),
            speed: default_speed(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: default_true(),
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (AVATAR_AGENT_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("AVATAR_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
