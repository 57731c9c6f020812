//! # Domain Models
//!
//! Typed values produced by the Last.fm gateway and consumed by the
//! aggregation and formatting layers. All of them are plain data: nothing here
//! is persisted, every score shown to users is derived from these on demand.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// A single scrobble as returned by the recent-tracks call.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub artist: String,
    pub name: String,
    /// Last.fm sends an empty album for singles and untagged files.
    pub album: Option<String>,
    /// The track is playing right now; such entries carry no timestamp.
    pub now_playing: bool,
    pub played_at: Option<DateTime<Utc>>,
}

/// Time window over which top-lists are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Period {
    #[default]
    Overall,
    SevenDay,
    OneMonth,
    ThreeMonth,
    SixMonth,
    TwelveMonth,
}

impl Period {
    /// Every period in the order shown to users.
    pub const ALL: [Period; 6] = [
        Period::Overall,
        Period::SevenDay,
        Period::OneMonth,
        Period::ThreeMonth,
        Period::SixMonth,
        Period::TwelveMonth,
    ];

    /// The string the Last.fm API expects for `period=`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Period::Overall => "overall",
            Period::SevenDay => "7day",
            Period::OneMonth => "1month",
            Period::ThreeMonth => "3month",
            Period::SixMonth => "6month",
            Period::TwelveMonth => "12month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a period flag names no known window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period '{0}'")]
pub struct UnknownPeriod(pub String);

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| UnknownPeriod(s.to_string()))
    }
}

/// Result of a pairwise tasteometer comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct TasteComparison {
    /// Similarity in `[0, 1]`.
    pub score: f64,
    /// How many artists the two libraries share in total.
    pub matching_artist_count: u32,
    /// A sample of the shared artists, possibly shorter than the full count.
    pub sample_artist_names: Vec<String>,
}

/// Account summary from `user.getInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub name: String,
    pub playcount: u64,
    pub registered: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopArtist {
    pub name: String,
    pub playcount: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopAlbum {
    pub artist: String,
    pub name: String,
    pub playcount: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopTrack {
    pub artist: String,
    pub name: String,
    pub playcount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parses_every_api_name() {
        for period in Period::ALL {
            assert_eq!(period.as_str().parse::<Period>(), Ok(period));
        }
    }

    #[test]
    fn test_period_rejects_unknown_names() {
        assert_eq!(
            "fortnight".parse::<Period>(),
            Err(UnknownPeriod("fortnight".to_string()))
        );
        // The router strips the leading dash before parsing.
        assert!("-7day".parse::<Period>().is_err());
    }

    #[test]
    fn test_period_defaults_to_overall() {
        assert_eq!(Period::default(), Period::Overall);
        assert_eq!(Period::default().to_string(), "overall");
    }
}
