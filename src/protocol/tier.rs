use std::{fmt, str::FromStr};

/// Nominal video quality level. Ordered from lowest to highest quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ResolutionTier {
    P240 = 0,
    P480 = 1,
    P720 = 2,
    P1080 = 3,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 4] = [Self::P240, Self::P480, Self::P720, Self::P1080];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::P240 => "240p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::P240,
            1 => Self::P480,
            2 => Self::P720,
            _ => Self::P1080,
        }
    }

    /// Maps a round-trip latency to the tier the link can sustain.
    /// `None` is a failed probe and is treated as the worst case.
    pub fn for_latency(latency_ms: Option<f64>) -> Self {
        match latency_ms {
            Some(ms) if ms < 50.0 => Self::P1080,
            Some(ms) if ms < 100.0 => Self::P720,
            Some(ms) if ms < 150.0 => Self::P480,
            _ => Self::P240,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(pub String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resolution tier {:?}", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for ResolutionTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_thresholds() {
        let cases = [
            (49.0, ResolutionTier::P1080),
            (50.0, ResolutionTier::P720),
            (99.0, ResolutionTier::P720),
            (100.0, ResolutionTier::P480),
            (149.0, ResolutionTier::P480),
            (150.0, ResolutionTier::P240),
            (9999.0, ResolutionTier::P240),
        ];
        for (latency, expected) in cases {
            assert_eq!(
                ResolutionTier::for_latency(Some(latency)),
                expected,
                "latency {latency}"
            );
        }
    }

    #[test]
    fn failed_probe_is_lowest_tier() {
        assert_eq!(ResolutionTier::for_latency(None), ResolutionTier::P240);
        assert_eq!(ResolutionTier::for_latency(Some(f64::NAN)), ResolutionTier::P240);
    }

    #[test]
    fn wire_names_parse_strictly() {
        for tier in ResolutionTier::ALL {
            assert_eq!(tier.as_str().parse::<ResolutionTier>(), Ok(tier));
            assert_eq!(ResolutionTier::from_u8(tier as u8), tier);
        }
        assert!("1080".parse::<ResolutionTier>().is_err());
        assert!("720P".parse::<ResolutionTier>().is_err());
        assert!(" 480p".parse::<ResolutionTier>().is_err());
    }

    #[test]
    fn tiers_order_by_quality() {
        assert!(ResolutionTier::P240 < ResolutionTier::P480);
        assert!(ResolutionTier::P720 < ResolutionTier::P1080);
    }
}
