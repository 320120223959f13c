use std::fmt;

use super::tier::ResolutionTier;

/// Longest command the server will interpret; anything longer is malformed.
pub const MAX_COMMAND_LEN: usize = 1024;

/// A `title,tier,index` frame lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub title: String,
    pub tier: ResolutionTier,
    pub index: u64,
}

impl FrameRequest {
    pub fn new(title: impl Into<String>, tier: ResolutionTier, index: u64) -> Self {
        Self {
            title: title.into(),
            tier,
            index,
        }
    }

    /// Strict three-field parse. Returns `None` for anything that is not
    /// exactly `<non-empty title>,<known tier>,<unsigned index>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut fields = raw.split(',');
        let (title, tier, index) = (fields.next()?, fields.next()?, fields.next()?);
        if fields.next().is_some() || title.is_empty() {
            return None;
        }
        if !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            tier: tier.parse().ok()?,
            index: index.parse().ok()?,
        })
    }
}

impl fmt::Display for FrameRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.title, self.tier, self.index)
    }
}

/// One client-to-server command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load,
    Pause,
    Play,
    Frame(FrameRequest),
    /// Anything that did not parse; answered like a missing frame.
    Malformed(String),
}

impl Command {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "load" => Self::Load,
            "pause" => Self::Pause,
            "play" => Self::Play,
            other => FrameRequest::parse(other)
                .map(Self::Frame)
                .unwrap_or_else(|| Self::Malformed(other.to_string())),
        }
    }

    /// Wire form, newline-terminated.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Load => "load\n".to_string(),
            Self::Pause => "pause\n".to_string(),
            Self::Play => "play\n".to_string(),
            Self::Frame(request) => format!("{}\n", request),
            Self::Malformed(raw) => format!("{}\n", raw),
        }
    }
}
