//! Audio clip types
//!
//! A clip is one unit of render work: a reference to synthesized audio plus
//! the avatar style it should be rendered with.

use serde::{Deserialize, Serialize};

/// One audio segment submitted for avatar rendering.
///
/// Immutable once created. The `index` records the clip's position in the
/// submission order of its list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    /// Absolute path of the audio file the render engine reads.
    pub audio_path: String,

    /// Base64-encoded audio payload, echoed to the viewer before rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,

    /// Emotion/style tag selecting the avatar variant.
    pub style: String,

    /// Position in the submission order.
    pub index: usize,
}

impl Clip {
    /// Create a new clip
    pub fn new(
        audio_path: impl Into<String>,
        style: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            audio_path: audio_path.into(),
            audio_base64: None,
            style: style.into(),
            index,
        }
    }

    /// Attach the inline base64 payload for the viewer echo
    pub fn with_base64(mut self, base64: impl Into<String>) -> Self {
        self.audio_base64 = Some(base64.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_creation() {
        let clip = Clip::new("/tmp/a.wav", "neutral", 0);
        assert_eq!(clip.audio_path, "/tmp/a.wav");
        assert_eq!(clip.style, "neutral");
        assert_eq!(clip.index, 0);
        assert!(clip.audio_base64.is_none());
    }

    #[test]
    fn test_clip_with_base64() {
        let clip = Clip::new("/tmp/a.wav", "happy", 2).with_base64("aGVsbG8=");
        assert_eq!(clip.audio_base64.as_deref(), Some("aGVsbG8="));
    }
}
