//! # Last.fm Gateway
//!
//! Typed calls against the Last.fm 2.0 web API. The rest of the crate only
//! talks to the [`MusicService`] trait, so tests can swap in an in-memory
//! implementation and the router never sees HTTP or JSON.
//!
//! ## Error Handling Strategy
//!
//! Every failure, whether Last.fm reported it (unknown user, rate limit) or
//! the request never completed, surfaces as a [`GatewayError`]. The router
//! treats all of them the same way: report the message to the channel and
//! abandon the command. Nothing is retried here.
//!
//! ## Rate Limiting
//!
//! Last.fm asks clients to stay under five requests per second. The client
//! sleeps between requests to honour that, which matters for `bestfriend`
//! and `hipsterbattle` where one command fans out into many calls.

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, trace, warn};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::{Period, TasteComparison, TopAlbum, TopArtist, TopTrack, Track, UserInfo};

/// Human-readable name used in error replies.
pub const SERVICE_NAME: &str = "Last.fm";

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200); // 5 req/sec
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FRIENDS_PAGE_SIZE: u32 = 200;
const CHART_PAGE_SIZE: u32 = 1000;

/// Errors raised by any gateway call.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Last.fm answered with its JSON error envelope.
    #[error("{message} (code {code})")]
    Api { code: i64, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Text shown to IRC users.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            GatewayError::Api { message, .. } => message.trim().to_string(),
            other => other.to_string().trim().to_string(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The calls the bot makes against the music service.
pub trait MusicService {
    /// One page of scrobbles, newest first. `page` counts from 1 in steps of
    /// `limit` entries. A track playing right now is included ahead of the
    /// regular entries on the first page only.
    fn recent_tracks(&self, user: &str, limit: u32, page: u32) -> GatewayResult<Vec<Track>>;

    fn user_info(&self, user: &str) -> GatewayResult<UserInfo>;

    /// `limit` of `None` uses the service default page size.
    fn top_artists(&self, user: &str, period: Period, limit: Option<u32>)
        -> GatewayResult<Vec<TopArtist>>;

    fn top_albums(&self, user: &str, period: Period, limit: Option<u32>)
        -> GatewayResult<Vec<TopAlbum>>;

    fn top_tracks(&self, user: &str, period: Period, limit: Option<u32>)
        -> GatewayResult<Vec<TopTrack>>;

    /// Every friend of `user`, no matter how many pages that takes.
    fn friends(&self, user: &str) -> GatewayResult<Vec<String>>;

    fn compare_taste(&self, user1: &str, user2: &str) -> GatewayResult<TasteComparison>;

    /// Names of every globally charting artist.
    fn global_top_artists(&self) -> GatewayResult<Vec<String>>;
}

/// Blocking Last.fm client.
pub struct LastFmClient {
    client: Client,
    api_key: String,
    base_url: String,
    chart_limit: u32,
    last_request: Mutex<Instant>,
}

impl std::fmt::Debug for LastFmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LastFmClient")
            .field("base_url", &self.base_url)
            .field("chart_limit", &self.chart_limit)
            .finish_non_exhaustive()
    }
}

impl LastFmClient {
    pub fn new(api_key: &str) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("lastirc/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: LASTFM_API_BASE.to_string(),
            chart_limit: 0,
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        })
    }

    /// Stop reading the global chart after `chart_limit` artists. `0` reads
    /// every page.
    #[must_use]
    pub fn with_chart_limit(mut self, chart_limit: u32) -> Self {
        self.chart_limit = chart_limit;
        self
    }

    fn rate_limit(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let elapsed = last.elapsed();
        if elapsed < RATE_LIMIT_INTERVAL {
            std::thread::sleep(RATE_LIMIT_INTERVAL - elapsed);
        }
        *last = Instant::now();
    }

    /// Issue one API call and decode its body into `T`.
    fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> GatewayResult<T> {
        self.rate_limit();

        let mut query: Vec<(&str, String)> = vec![
            ("method", method.to_string()),
            ("api_key", self.api_key.clone()),
            ("format", "json".to_string()),
        ];
        query.extend(params.iter().cloned());

        debug!("Last.fm call {method} {params:?}");
        let response = self.client.get(&self.base_url).query(&query).send()?;
        let status = response.status();
        let body = response.text()?;
        trace!("Last.fm {method} answered {status}: {body}");

        decode_body(&body).map_err(|err| {
            if !status.is_success() && matches!(err, GatewayError::InvalidResponse(_)) {
                warn!("Last.fm {method} failed with status {status}");
                GatewayError::InvalidResponse(format!("HTTP status {status}"))
            } else {
                err
            }
        })
    }
}

/// Decode a Last.fm body, mapping the error envelope to [`GatewayError::Api`].
fn decode_body<T: DeserializeOwned>(body: &str) -> GatewayResult<T> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

    if let Some(code) = value.get("error").and_then(serde_json::Value::as_i64) {
        let message = value
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(GatewayError::Api { code, message });
    }

    serde_json::from_value(value).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

impl MusicService for LastFmClient {
    fn recent_tracks(&self, user: &str, limit: u32, page: u32) -> GatewayResult<Vec<Track>> {
        let body: RecentTracksResponse = self.call(
            "user.getrecenttracks",
            &[
                ("user", user.to_string()),
                ("limit", limit.to_string()),
                ("page", page.to_string()),
            ],
        )?;
        Ok(body
            .recenttracks
            .track
            .into_vec()
            .into_iter()
            .map(RecentTrack::into_track)
            .filter(|track| page == 1 || !track.now_playing)
            .collect())
    }

    fn user_info(&self, user: &str) -> GatewayResult<UserInfo> {
        let body: UserInfoResponse = self.call("user.getinfo", &[("user", user.to_string())])?;
        let registered = timestamp(body.user.registered.unixtime.as_u64()?)?;
        Ok(UserInfo {
            name: body.user.name,
            playcount: body.user.playcount.as_u64()?,
            registered,
        })
    }

    fn top_artists(&self, user: &str, period: Period, limit: Option<u32>) -> GatewayResult<Vec<TopArtist>> {
        let body: TopArtistsResponse =
            self.call("user.gettopartists", &top_params(user, period, limit))?;
        body.topartists
            .artist
            .into_vec()
            .into_iter()
            .map(|a| {
                Ok(TopArtist {
                    name: a.name,
                    playcount: a.playcount.as_u64()?,
                })
            })
            .collect()
    }

    fn top_albums(&self, user: &str, period: Period, limit: Option<u32>) -> GatewayResult<Vec<TopAlbum>> {
        let body: TopAlbumsResponse =
            self.call("user.gettopalbums", &top_params(user, period, limit))?;
        body.topalbums
            .album
            .into_vec()
            .into_iter()
            .map(|a| {
                Ok(TopAlbum {
                    artist: a.artist.name,
                    name: a.name,
                    playcount: a.playcount.as_u64()?,
                })
            })
            .collect()
    }

    fn top_tracks(&self, user: &str, period: Period, limit: Option<u32>) -> GatewayResult<Vec<TopTrack>> {
        let body: TopTracksResponse =
            self.call("user.gettoptracks", &top_params(user, period, limit))?;
        body.toptracks
            .track
            .into_vec()
            .into_iter()
            .map(|t| {
                Ok(TopTrack {
                    artist: t.artist.name,
                    name: t.name,
                    playcount: t.playcount.as_u64()?,
                })
            })
            .collect()
    }

    fn friends(&self, user: &str) -> GatewayResult<Vec<String>> {
        let names = collect_pages(None, |page| {
            let body: FriendsResponse = self.call(
                "user.getfriends",
                &[
                    ("user", user.to_string()),
                    ("limit", FRIENDS_PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let total_pages = total_pages(body.friends.attr.as_ref())?;
            Ok((names_of(body.friends.user), total_pages))
        })?;

        debug!("{user} has {} friends", names.len());
        Ok(names)
    }

    fn compare_taste(&self, user1: &str, user2: &str) -> GatewayResult<TasteComparison> {
        let body: CompareResponse = self.call(
            "tasteometer.compare",
            &[
                ("type1", "user".to_string()),
                ("type2", "user".to_string()),
                ("value1", user1.to_string()),
                ("value2", user2.to_string()),
            ],
        )?;

        let result = body.comparison.result;
        Ok(TasteComparison {
            score: result.score.as_f64()?,
            matching_artist_count: u32::try_from(result.artists.attr.matches.as_u64()?)
                .unwrap_or(u32::MAX),
            sample_artist_names: result.artists.artist.into_vec().into_iter().map(|a| a.name).collect(),
        })
    }

    fn global_top_artists(&self) -> GatewayResult<Vec<String>> {
        let cap = (self.chart_limit > 0).then_some(self.chart_limit as usize);

        let names = collect_pages(cap, |page| {
            let body: ChartArtistsResponse = self.call(
                "chart.gettopartists",
                &[
                    ("limit", CHART_PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ],
            )?;
            let total_pages = total_pages(body.artists.attr.as_ref())?;
            Ok((names_of(body.artists.artist), total_pages))
        })?;

        debug!("Global chart has {} artists", names.len());
        Ok(names)
    }
}

/// Walk a paginated call from page 1 until its last page, an empty page, or
/// until `cap` names have been collected.
///
/// `fetch` returns the names on one page together with the total page count
/// the service reported.
fn collect_pages<F>(cap: Option<usize>, mut fetch: F) -> GatewayResult<Vec<String>>
where
    F: FnMut(u32) -> GatewayResult<(Vec<String>, u64)>,
{
    let mut names = Vec::new();
    let mut page: u32 = 1;

    loop {
        let (batch, total_pages) = fetch(page)?;
        let exhausted = batch.is_empty() || u64::from(page) >= total_pages;
        names.extend(batch);

        if let Some(cap) = cap {
            if names.len() >= cap {
                names.truncate(cap);
                break;
            }
        }
        if exhausted {
            break;
        }
        page += 1;
    }

    Ok(names)
}

fn total_pages(attr: Option<&PageAttr>) -> GatewayResult<u64> {
    attr.map_or(Ok(1), |a| a.total_pages.as_u64())
}

fn names_of(entries: OneOrMany<NamedField>) -> Vec<String> {
    entries.into_vec().into_iter().map(|e| e.name).collect()
}

fn top_params(user: &str, period: Period, limit: Option<u32>) -> Vec<(&'static str, String)> {
    let mut params = vec![("user", user.to_string()), ("period", period.as_str().to_string())];
    if let Some(limit) = limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

fn timestamp(secs: u64) -> GatewayResult<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| GatewayError::InvalidResponse(format!("timestamp out of range: {secs}")))
}

// Wire format. Last.fm encodes most numbers as strings and collapses
// single-element lists into a bare object, hence the lenient helpers.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(serde_json::Number),
    Text(String),
}

impl Lenient {
    fn as_u64(&self) -> GatewayResult<u64> {
        match self {
            Lenient::Number(n) => n.as_u64(),
            Lenient::Text(s) if s.is_empty() => Some(0),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
        .ok_or_else(|| GatewayError::InvalidResponse(format!("expected an integer, got {self:?}")))
    }

    fn as_f64(&self) -> GatewayResult<f64> {
        match self {
            Lenient::Number(n) => n.as_f64(),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
        .ok_or_else(|| GatewayError::InvalidResponse(format!("expected a number, got {self:?}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TextField {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct NamedField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany<RecentTrack>,
}

#[derive(Debug, Deserialize)]
struct RecentTrack {
    artist: TextField,
    name: String,
    album: Option<TextField>,
    #[serde(rename = "@attr")]
    attr: Option<NowPlayingAttr>,
    date: Option<TrackDate>,
}

#[derive(Debug, Deserialize)]
struct NowPlayingAttr {
    #[serde(default)]
    nowplaying: String,
}

#[derive(Debug, Deserialize)]
struct TrackDate {
    uts: Lenient,
}

impl RecentTrack {
    fn into_track(self) -> Track {
        let now_playing = self.attr.is_some_and(|a| a.nowplaying == "true");
        let played_at = self
            .date
            .and_then(|d| d.uts.as_u64().ok())
            .and_then(|secs| timestamp(secs).ok());

        Track {
            artist: self.artist.text,
            name: self.name,
            album: self.album.map(|a| a.text).filter(|a| !a.is_empty()),
            now_playing,
            played_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: String,
    playcount: Lenient,
    registered: Registered,
}

#[derive(Debug, Deserialize)]
struct Registered {
    unixtime: Lenient,
}

#[derive(Debug, Deserialize)]
struct TopArtistsResponse {
    topartists: TopArtists,
}

#[derive(Debug, Deserialize)]
struct TopArtists {
    #[serde(default)]
    artist: OneOrMany<RawTopArtist>,
}

#[derive(Debug, Deserialize)]
struct RawTopArtist {
    name: String,
    playcount: Lenient,
}

#[derive(Debug, Deserialize)]
struct TopAlbumsResponse {
    topalbums: TopAlbums,
}

#[derive(Debug, Deserialize)]
struct TopAlbums {
    #[serde(default)]
    album: OneOrMany<RawTopEntry>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    toptracks: TopTracks,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    #[serde(default)]
    track: OneOrMany<RawTopEntry>,
}

#[derive(Debug, Deserialize)]
struct RawTopEntry {
    name: String,
    playcount: Lenient,
    artist: NamedField,
}

#[derive(Debug, Deserialize)]
struct FriendsResponse {
    friends: Friends,
}

#[derive(Debug, Deserialize)]
struct Friends {
    #[serde(default)]
    user: OneOrMany<NamedField>,
    #[serde(rename = "@attr")]
    attr: Option<PageAttr>,
}

#[derive(Debug, Deserialize)]
struct PageAttr {
    #[serde(rename = "totalPages")]
    total_pages: Lenient,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    comparison: Comparison,
}

#[derive(Debug, Deserialize)]
struct Comparison {
    result: ComparisonResult,
}

#[derive(Debug, Deserialize)]
struct ComparisonResult {
    score: Lenient,
    artists: ComparisonArtists,
}

#[derive(Debug, Deserialize)]
struct ComparisonArtists {
    #[serde(default)]
    artist: OneOrMany<NamedField>,
    #[serde(rename = "@attr")]
    attr: MatchesAttr,
}

#[derive(Debug, Deserialize)]
struct MatchesAttr {
    matches: Lenient,
}

#[derive(Debug, Deserialize)]
struct ChartArtistsResponse {
    artists: ChartArtists,
}

#[derive(Debug, Deserialize)]
struct ChartArtists {
    #[serde(default)]
    artist: OneOrMany<NamedField>,
    #[serde(rename = "@attr")]
    attr: Option<PageAttr>,
}
