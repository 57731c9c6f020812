//! # Reply Formatting
//!
//! One function per reply kind, each taking structured values and returning
//! the single line sent back to IRC. Keeping every template here means the
//! router never concatenates strings itself.

use chrono::{DateTime, Utc};

use crate::lastfm_client::{GatewayError, SERVICE_NAME};
use crate::models::{Period, TasteComparison, TopAlbum, TopArtist, TopTrack, Track, UserInfo};

/// How a reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Addressed to the sender (`nick: text` in a channel).
    Direct,
    /// Said to the channel as-is.
    Channel,
}

/// One outbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub mode: ReplyMode,
}

impl Reply {
    pub fn direct(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: ReplyMode::Direct,
        }
    }

    pub fn channel(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: ReplyMode::Channel,
        }
    }
}

/// `"<artist> - <name> [<album>] (<recency>)"`, album only when known.
#[must_use]
pub fn format_track(track: &Track, now: DateTime<Utc>) -> String {
    let mut line = format!("{} - {}", track.artist, track.name);

    if let Some(album) = track.album.as_deref().filter(|a| !a.is_empty()) {
        line.push_str(&format!(" [{album}]"));
    }

    let recency = if track.now_playing {
        "Listening now".to_string()
    } else {
        track
            .played_at
            .map_or_else(|| "unknown time".to_string(), |at| time_ago(at, now))
    };

    format!("{line} ({recency})")
}

/// Relative rendering of a past instant, e.g. `"3 hours ago"`.
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const WEEK: i64 = 7 * DAY;
    const MONTH: i64 = 30 * DAY;
    const YEAR: i64 = 365 * DAY;

    let seconds = (now - then).num_seconds().max(0);

    let (count, unit) = match seconds {
        s if s < MINUTE => return "less than a minute ago".to_string(),
        s if s < HOUR => (s / MINUTE, "minute"),
        s if s < DAY => (s / HOUR, "hour"),
        s if s < WEEK => (s / DAY, "day"),
        s if s < MONTH => (s / WEEK, "week"),
        s if s < YEAR => (s / MONTH, "month"),
        s => (s / YEAR, "year"),
    };

    format!("{count} {} ago", plural(count, unit))
}

fn plural(count: impl Into<i64>, noun: &str) -> String {
    if count.into() == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

#[must_use]
pub fn format_last(user: &str, track: &Track, now: DateTime<Utc>) -> String {
    format!("{user}: {}", format_track(track, now))
}

#[must_use]
pub fn format_missing_track(user: &str, index: impl std::fmt::Display) -> String {
    format!("{user} has no scrobbles at position {index}")
}

#[must_use]
pub fn format_plays(user: &str, info: &UserInfo) -> String {
    format!(
        "{user}: {} plays since {}",
        info.playcount,
        info.registered.format("%d %b %Y")
    )
}

/// Similarity line with the shared-artist parenthetical when there are any.
#[must_use]
pub fn format_compare(user1: &str, user2: &str, percentage: f64, comparison: &TasteComparison) -> String {
    let mut line = format!("{user1} and {user2} have {percentage:.2}% similar taste");

    let matches = comparison.matching_artist_count;
    if matches > 0 {
        let artists = plural(matches, "artist");
        let names = &comparison.sample_artist_names;

        if names.is_empty() {
            line.push_str(&format!(" ({matches} {artists} in common)"));
        } else if matches as usize > names.len() {
            line.push_str(&format!(
                " ({matches} {artists} in common, including: {})",
                names.join(", ")
            ));
        } else {
            line.push_str(&format!(" ({matches} {artists} in common: {})", names.join(", ")));
        }
    }

    line
}

#[must_use]
pub fn format_best_friend(user: &str, friend: &str) -> String {
    format!("{user}'s best friend is {friend}")
}

#[must_use]
pub fn format_no_friends(user: &str) -> String {
    format!("{user} has no friends on {SERVICE_NAME}")
}

#[must_use]
pub fn format_hipster(user: &str, score: f64) -> String {
    format!("{user} is {score:.2}% mainstream")
}

#[must_use]
pub fn format_hipster_insufficient(user: &str) -> String {
    format!("{user} does not have enough plays to measure mainstreamness")
}

#[must_use]
pub fn format_battle_winner(winner: &str, score: f64) -> String {
    format!("{winner} wins with {score:.2}% mainstream")
}

#[must_use]
pub fn format_battle_no_contestants() -> String {
    "Nobody in the battle has enough plays to measure mainstreamness".to_string()
}

#[must_use]
pub fn format_top_artist(user: &str, artist: &TopArtist) -> String {
    format!("{user}: {} ({} plays)", artist.name, artist.playcount)
}

#[must_use]
pub fn format_top_album(user: &str, album: &TopAlbum) -> String {
    format!("{user}: {} - {} ({} plays)", album.artist, album.name, album.playcount)
}

#[must_use]
pub fn format_top_track(user: &str, track: &TopTrack) -> String {
    format!("{user}: {} - {} ({} plays)", track.artist, track.name, track.playcount)
}

/// `kind` is the singular noun: "artist", "album" or "track".
#[must_use]
pub fn format_no_top(user: &str, kind: &str, period: Period) -> String {
    format!("{user} has no top {kind}s for {period}")
}

#[must_use]
pub fn format_unknown_period(raw: &str) -> String {
    let valid: Vec<&str> = Period::ALL.iter().map(|p| p.as_str()).collect();
    format!("Unknown period '{raw}' (use one of: {})", valid.join(", "))
}

#[must_use]
pub fn format_associated(username: &str) -> String {
    format!("Your nick is now associated with the {SERVICE_NAME} account '{username}'")
}

#[must_use]
pub fn format_own_association(username: Option<&str>) -> String {
    match username {
        Some(username) => format!("Your nick is associated with the {SERVICE_NAME} account '{username}'"),
        None => format!("Your nick is not associated with a {SERVICE_NAME} account"),
    }
}

#[must_use]
pub fn format_nick_association(nick: &str, username: Option<&str>) -> String {
    match username {
        Some(username) => format!("{nick} is associated with the {SERVICE_NAME} account '{username}'"),
        None => format!("{nick} is not associated with a {SERVICE_NAME} account"),
    }
}

#[must_use]
pub fn format_gateway_error(error: &GatewayError) -> String {
    format!("{SERVICE_NAME} error: {}", error.message())
}

#[must_use]
pub fn format_help_list(commands: &[&str]) -> String {
    format!("commands: {}", commands.join(", "))
}

#[must_use]
pub fn format_help_usage(command: &str, usage: &str) -> String {
    format!("{command} {usage}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn track(album: Option<&str>, now_playing: bool, played_at: Option<DateTime<Utc>>) -> Track {
        Track {
            artist: "Low".to_string(),
            name: "Sunflower".to_string(),
            album: album.map(str::to_string),
            now_playing,
            played_at,
        }
    }

    #[test]
    fn test_now_playing_ignores_timestamp() {
        let t = track(Some("Things We Lost in the Fire"), true, Some(now() - Duration::days(3)));
        assert_eq!(
            format_track(&t, now()),
            "Low - Sunflower [Things We Lost in the Fire] (Listening now)"
        );
    }

    #[test]
    fn test_album_only_when_present() {
        let at = Some(now() - Duration::hours(3));
        assert_eq!(format_track(&track(None, false, at), now()), "Low - Sunflower (3 hours ago)");
        assert_eq!(format_track(&track(Some(""), false, at), now()), "Low - Sunflower (3 hours ago)");
    }

    #[test]
    fn test_missing_timestamp() {
        assert_eq!(format_track(&track(None, false, None), now()), "Low - Sunflower (unknown time)");
    }

    #[test]
    fn test_time_ago_units() {
        let cases = [
            (Duration::seconds(5), "less than a minute ago"),
            (Duration::minutes(1), "1 minute ago"),
            (Duration::minutes(59), "59 minutes ago"),
            (Duration::hours(1), "1 hour ago"),
            (Duration::days(2), "2 days ago"),
            (Duration::days(14), "2 weeks ago"),
            (Duration::days(65), "2 months ago"),
            (Duration::days(800), "2 years ago"),
        ];

        for (ago, expected) in cases {
            assert_eq!(time_ago(now() - ago, now()), expected, "for {ago:?}");
        }
    }

    #[test]
    fn test_future_timestamp_is_treated_as_now() {
        assert_eq!(time_ago(now() + Duration::hours(1), now()), "less than a minute ago");
    }

    #[test]
    fn test_plays_date_format() {
        let info = UserInfo {
            name: "rj".to_string(),
            playcount: 12345,
            registered: Utc.with_ymd_and_hms(2002, 11, 20, 11, 50, 40).unwrap(),
        };
        assert_eq!(format_plays("rj", &info), "rj: 12345 plays since 20 Nov 2002");
    }

    fn comparison(matches: u32, names: &[&str]) -> TasteComparison {
        TasteComparison {
            score: 0.5,
            matching_artist_count: matches,
            sample_artist_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_compare_without_matches() {
        assert_eq!(
            format_compare("a", "b", 0.0, &comparison(0, &[])),
            "a and b have 0.00% similar taste"
        );
    }

    #[test]
    fn test_compare_wording_and_plurals() {
        assert_eq!(
            format_compare("a", "b", 50.0, &comparison(1, &["Low"])),
            "a and b have 50.00% similar taste (1 artist in common: Low)"
        );
        assert_eq!(
            format_compare("a", "b", 50.0, &comparison(2, &["Low", "Slint"])),
            "a and b have 50.00% similar taste (2 artists in common: Low, Slint)"
        );
        assert_eq!(
            format_compare("a", "b", 50.0, &comparison(12, &["Low", "Slint"])),
            "a and b have 50.00% similar taste (12 artists in common, including: Low, Slint)"
        );
    }

    #[test]
    fn test_association_wording() {
        assert_eq!(
            format_own_association(None),
            "Your nick is not associated with a Last.fm account"
        );
        assert_eq!(
            format_nick_association("bob", Some("rj")),
            "bob is associated with the Last.fm account 'rj'"
        );
    }

    #[test]
    fn test_gateway_error_is_trimmed() {
        let err = GatewayError::Api {
            code: 6,
            message: "  User not found\n".to_string(),
        };
        assert_eq!(format_gateway_error(&err), "Last.fm error: User not found");
    }

    #[test]
    fn test_unknown_period_lists_choices() {
        assert_eq!(
            format_unknown_period("fortnight"),
            "Unknown period 'fortnight' (use one of: overall, 7day, 1month, 3month, 6month, 12month)"
        );
    }
}
