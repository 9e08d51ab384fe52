//! Error types for the instance host
//!
//! Library seams return these typed errors; the binary wraps them in
//! `anyhow` at the edges.

use thiserror::Error;

/// Failure reported by a platform collaborator (instantiation, UI request)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Typed-state codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value tree contains a shape the typed representation cannot hold
    #[error("unsupported value type '{kind}' at '{path}'")]
    UnsupportedType { kind: &'static str, path: String },
}

/// Preset store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("preset index {index} out of range (store holds {len} presets)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Instance manager errors, delivered to the observer as a single terminal
/// notification per attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("no audio component matching {0} is registered")]
    ComponentNotFound(String),

    #[error("instantiation succeeded but returned no plugin instance")]
    NilInstance,

    #[error("plugin returned no UI surface")]
    NilUiSurface,

    #[error("platform error: {0}")]
    Platform(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("instance manager is no longer running")]
    ActorGone,
}

impl From<PlatformError> for HostError {
    fn from(err: PlatformError) -> Self {
        HostError::Platform(err.0)
    }
}

/// Errors from session operations that combine the manager and the store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no instance in slot {slot} ({live} live)")]
    NoSuchSlot { slot: usize, live: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_display() {
        let err = HostError::ComponentNotFound("aumu/Demo/Acme".to_string());
        assert!(err.to_string().contains("aumu/Demo/Acme"));

        let err: HostError = PlatformError::new("sandbox denied").into();
        assert_eq!(err.to_string(), "platform error: sandbox denied");

        let err: HostError = CodecError::UnsupportedType {
            kind: "boolean",
            path: "params.bypass".to_string(),
        }
        .into();
        assert!(err.to_string().contains("boolean"));
        assert!(err.to_string().contains("params.bypass"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::IndexOutOfRange { index: 3, len: 2 };
        assert!(err.to_string().contains("3"));
        assert!(err.to_string().contains("2 presets"));
    }

    #[test]
    fn test_session_error_is_transparent() {
        let err: SessionError = StoreError::IndexOutOfRange { index: 1, len: 0 }.into();
        assert_eq!(
            err.to_string(),
            StoreError::IndexOutOfRange { index: 1, len: 0 }.to_string()
        );

        let err: SessionError = HostError::NilInstance.into();
        assert!(matches!(err, SessionError::Host(HostError::NilInstance)));
    }
}
