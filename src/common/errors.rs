use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::protocol::ResolutionTier;

/// Failures while materialising the frame store at startup. All of them are fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("catalog is empty, nothing to serve")]
    EmptyCatalog,

    #[error("no frame source configured for {title} at {tier}")]
    MissingTier {
        title: String,
        tier: ResolutionTier,
    },

    #[error("failed to read frame source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame source {path} for {title} at {tier} contains no frames")]
    Empty {
        title: String,
        tier: ResolutionTier,
        path: PathBuf,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Client-side transport and protocol failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("server closed the connection")]
    Closed,

    #[error("unparseable load reply: {0:?}")]
    InvalidLoad(String),

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: u32, limit: u32 },
}

/// Operations rejected by the playback state machine.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("playback session has been stopped")]
    Stopped,

    #[error("playback has not started")]
    NotPlaying,

    #[error("playback is already paused")]
    AlreadyPaused,

    #[error("playback is not paused")]
    NotPaused,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("none of {0} were found")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
