use thiserror::Error;

/// Errors reported synchronously by caller-invoked player operations.
///
/// Failures on the decode/render threads never surface here; they become
/// log events and state transitions instead.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no audio is loaded for playback")]
    NotLoaded,
    #[error("invalid audio source: {0}")]
    InvalidSource(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors produced while constructing or repositioning a decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open audio source: {0}")]
    Open(String),
    #[error("failed to seek audio stream: {0}")]
    Seek(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced while constructing an output engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable output device: {0}")]
    Device(String),
    #[error("failed to build output stream: {0}")]
    Stream(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_error_messages_are_distinguishable() {
        assert_eq!(
            PlayerError::NotLoaded.to_string(),
            "no audio is loaded for playback"
        );
        assert_eq!(
            PlayerError::InvalidSource("empty url".to_string()).to_string(),
            "invalid audio source: empty url"
        );
    }

    #[test]
    fn decode_error_converts_into_player_error() {
        let err: PlayerError = DecodeError::Open("bad container".to_string()).into();
        assert!(matches!(err, PlayerError::Decode(_)));
    }
}
