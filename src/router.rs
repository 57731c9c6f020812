//! # Command Router
//!
//! Turns an IRC line into at most one reply.
//!
//! ## Routing
//!
//! Commands are matched against one ordered pattern table. Patterns are tried
//! in declaration order and the first match wins, which is what separates
//! overlapping prefixes such as `assoc?` and `assoc`. Text that matches no
//! pattern is ignored without a reply.
//!
//! ## Users
//!
//! Any command that takes an optional user resolves a missing one through
//! the [`IdentityStore`]: stored association first, then the sender's nick.
//! `hipsterbattle` is the exception and uses its arguments literally.
//!
//! ## Failures
//!
//! A gateway failure ends the command with a single `Last.fm error: ...`
//! reply to the channel. Store failures are logged and produce no reply.
//! Neither ever stops the bot.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::{Captures, Regex};

use crate::algorithm::{self, ChartCache};
use crate::db::IdentityStore;
use crate::format::{self, Reply};
use crate::lastfm_client::{GatewayError, GatewayResult, MusicService};
use crate::models::{Period, Track};

/// Recent tracks per page. Last.fm serves at most 200 per request.
pub const RECENT_TRACKS_PAGE_SIZE: u32 = 200;

/// Command prefix used when the configuration does not set one.
pub const DEFAULT_PREFIX: &str = "!";

/// Usage lines shown by `help`, in display order.
pub const HELP: [(&str, &str); 11] = [
    ("assoc", "{user}: Associate user with your nick"),
    ("assoc?", "[nick]: Retrieve user associated with nick"),
    ("last", "[-index] [user]: Retrieve user's last scrobble"),
    ("plays", "[user]: Retrieve user's scrobble count"),
    ("compare", "[user] {user}: Compare music taste of two users"),
    ("bestfriend", "[user]: Determine which of user's friends has most similar taste"),
    ("hipster", "[-period] [user]: Calculate how mainstream user's taste is"),
    ("hipsterbattle", "[-period] {users...}: Calculate which user has least mainstream taste"),
    ("topartist", "[-period] [user]: Retrieve user's most played artist"),
    ("topalbum", "[-period] [user]: Retrieve user's most played album"),
    ("toptrack", "[-period] [user]: Retrieve user's most played track"),
];

/// A chat message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub nick: String,
    /// Channel name, or the bot's own nick for a private query.
    pub channel: String,
    pub text: String,
}

/// Which top-list a `top*` command reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopKind {
    Artist,
    Album,
    Track,
}

impl TopKind {
    const fn noun(self) -> &'static str {
        match self {
            TopKind::Artist => "artist",
            TopKind::Album => "album",
            TopKind::Track => "track",
        }
    }
}

/// Names of the rows in the pattern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    AssociateQuery,
    Associate,
    Last,
    Plays,
    Compare,
    BestFriend,
    Hipster,
    HipsterBattle,
    TopArtist,
    TopAlbum,
    TopTrack,
    Help,
}

/// A parsed command with its captured arguments.
///
/// Periods stay raw (without the leading `-`) until the handler runs, so an
/// unknown period can be reported instead of silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AssociateQuery { nick: Option<String> },
    Associate { username: Option<String> },
    Last { index: Option<String>, user: Option<String> },
    Plays { user: Option<String> },
    Compare { user1: Option<String>, user2: String },
    BestFriend { user: Option<String> },
    Hipster { period: Option<String>, user: Option<String> },
    HipsterBattle { period: Option<String>, users: Vec<String> },
    Top { kind: TopKind, period: Option<String>, user: Option<String> },
    Help { command: Option<String> },
}

lazy_static! {
    /// The ordered pattern table. Order is priority.
    static ref COMMAND_TABLE: Vec<(CommandKind, Regex)> = [
        (CommandKind::AssociateQuery, r"^assoc(?:iate)?\?(?: (\S+))?$"),
        (CommandKind::Associate, r"^assoc(?:iate)?(?: (\S+))?$"),
        (CommandKind::Last, r"^last(?: -(\d+))?(?: ([^-\s]\S*))?$"),
        (CommandKind::Plays, r"^plays(?: (\S+))?$"),
        (CommandKind::Compare, r"^compare(?: (\S+))? (\S+)$"),
        (CommandKind::BestFriend, r"^bestfriend(?: (\S+))?$"),
        (CommandKind::Hipster, r"^hipster(?: -(\S+))?(?: (\S+))?$"),
        // The user list may not start with `-`, so a lone period flag is not a user.
        (CommandKind::HipsterBattle, r"^hipsterbattle(?: -(\S+))? ([^-\s].*)$"),
        (CommandKind::TopArtist, r"^topartist(?: -(\S+))?(?: (\S+))?$"),
        (CommandKind::TopAlbum, r"^topalbum(?: -(\S+))?(?: (\S+))?$"),
        (CommandKind::TopTrack, r"^toptrack(?: -(\S+))?(?: (\S+))?$"),
        (CommandKind::Help, r"^help(?: (\S+))?$"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("command pattern is valid")))
    .collect();
}

/// Kinds in priority order.
pub fn command_kinds() -> Vec<CommandKind> {
    COMMAND_TABLE.iter().map(|(kind, _)| *kind).collect()
}

fn capture(caps: &Captures<'_>, group: usize) -> Option<String> {
    caps.get(group).map(|m| m.as_str().to_string())
}

/// Match `text` (prefix already removed) against the pattern table.
pub fn parse_command(text: &str) -> Option<Command> {
    let (kind, caps) = COMMAND_TABLE
        .iter()
        .find_map(|(kind, regex)| regex.captures(text).map(|caps| (*kind, caps)))?;

    let command = match kind {
        CommandKind::AssociateQuery => Command::AssociateQuery { nick: capture(&caps, 1) },
        CommandKind::Associate => Command::Associate { username: capture(&caps, 1) },
        CommandKind::Last => Command::Last {
            index: capture(&caps, 1),
            user: capture(&caps, 2),
        },
        CommandKind::Plays => Command::Plays { user: capture(&caps, 1) },
        CommandKind::Compare => Command::Compare {
            user1: capture(&caps, 1),
            user2: capture(&caps, 2)?,
        },
        CommandKind::BestFriend => Command::BestFriend { user: capture(&caps, 1) },
        CommandKind::Hipster => Command::Hipster {
            period: capture(&caps, 1),
            user: capture(&caps, 2),
        },
        CommandKind::HipsterBattle => Command::HipsterBattle {
            period: capture(&caps, 1),
            users: caps
                .get(2)
                .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        },
        CommandKind::TopArtist | CommandKind::TopAlbum | CommandKind::TopTrack => Command::Top {
            kind: match kind {
                CommandKind::TopArtist => TopKind::Artist,
                CommandKind::TopAlbum => TopKind::Album,
                _ => TopKind::Track,
            },
            period: capture(&caps, 1),
            user: capture(&caps, 2),
        },
        CommandKind::Help => Command::Help { command: capture(&caps, 1) },
    };

    Some(command)
}

/// Why a command stopped early.
#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

type CommandResult = Result<Option<Reply>, CommandError>;

/// Routes messages to handlers and owns the state they share.
pub struct Router<S: MusicService> {
    service: S,
    store: IdentityStore,
    chart: ChartCache,
    prefix: String,
    clock: fn() -> DateTime<Utc>,
}

impl<S: MusicService> Router<S> {
    pub fn new(service: S, store: IdentityStore, prefix: impl Into<String>) -> Self {
        Self {
            service,
            store,
            chart: ChartCache::new(),
            prefix: prefix.into(),
            clock: Utc::now,
        }
    }

    /// Replace the time source used for "3 hours ago" style output.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn chart_cache(&self) -> &ChartCache {
        &self.chart
    }

    /// Process one message. Returns no replies for anything that is not a
    /// recognised command.
    pub fn handle(&mut self, message: &IncomingMessage) -> Vec<Reply> {
        let Some(text) = message.text.strip_prefix(self.prefix.as_str()) else {
            return Vec::new();
        };

        let Some(command) = parse_command(text.trim_end()) else {
            debug!("Ignoring unrecognised command from {}: {text}", message.nick);
            return Vec::new();
        };

        info!("{} in {}: {command:?}", message.nick, message.channel);

        match self.execute(&message.nick, command) {
            Ok(reply) => reply.into_iter().collect(),
            Err(CommandError::Gateway(err)) => {
                warn!("Gateway call failed for {}: {err}", message.nick);
                vec![Reply::channel(format::format_gateway_error(&err))]
            }
            Err(CommandError::Store(err)) => {
                error!("Identity store failure for {}: {err:#}", message.nick);
                Vec::new()
            }
        }
    }

    fn execute(&mut self, nick: &str, command: Command) -> CommandResult {
        match command {
            Command::AssociateQuery { nick: target } => self.associate_query(nick, target.as_deref()),
            Command::Associate { username } => self.associate(nick, username.as_deref()),
            Command::Last { index, user } => self.last(nick, index.as_deref(), user.as_deref()),
            Command::Plays { user } => self.plays(nick, user.as_deref()),
            Command::Compare { user1, user2 } => self.compare(nick, user1.as_deref(), &user2),
            Command::BestFriend { user } => self.best_friend(nick, user.as_deref()),
            Command::Hipster { period, user } => self.hipster(nick, period.as_deref(), user.as_deref()),
            Command::HipsterBattle { period, users } => self.hipster_battle(period.as_deref(), &users),
            Command::Top { kind, period, user } => self.top(nick, kind, period.as_deref(), user.as_deref()),
            Command::Help { command } => Ok(help(command.as_deref())),
        }
    }

    fn associate(&mut self, nick: &str, username: Option<&str>) -> CommandResult {
        let text = match username {
            Some(username) => {
                self.store.set(nick, username)?;
                format::format_associated(username)
            }
            None => format::format_own_association(self.store.get(nick)?.as_deref()),
        };
        Ok(Some(Reply::direct(text)))
    }

    fn associate_query(&mut self, nick: &str, target: Option<&str>) -> CommandResult {
        let Some(target) = target else {
            return self.associate(nick, None);
        };

        let username = self.store.get(target)?;
        Ok(Some(Reply::channel(format::format_nick_association(
            target,
            username.as_deref(),
        ))))
    }

    fn last(&self, nick: &str, index: Option<&str>, user: Option<&str>) -> CommandResult {
        let user = self.store.resolve(nick, user)?;

        // Zero, or more digits than a u32 holds, is a position nobody has.
        let raw = index.unwrap_or("1");
        let Some(index) = raw.parse::<u32>().ok().filter(|i| *i >= 1) else {
            return Ok(Some(Reply::channel(format::format_missing_track(&user, raw))));
        };

        let track = if index <= RECENT_TRACKS_PAGE_SIZE {
            self.service
                .recent_tracks(&user, index, 1)?
                .into_iter()
                .nth(index as usize - 1)
        } else {
            self.paged_track(&user, index)?
        };

        let text = match track {
            Some(track) => format::format_last(&user, &track, (self.clock)()),
            None => format::format_missing_track(&user, index),
        };
        Ok(Some(Reply::channel(text)))
    }

    /// Track at `index` when it lies past the first page.
    ///
    /// A track playing right now holds position 1 but only ever appears on
    /// the first page, so the scrobble pages are shifted by one when it exists.
    fn paged_track(&self, user: &str, index: u32) -> GatewayResult<Option<Track>> {
        let playing = self
            .service
            .recent_tracks(user, 1, 1)?
            .first()
            .is_some_and(|track| track.now_playing);

        let scrobble = index - u32::from(playing) - 1;
        let page = scrobble / RECENT_TRACKS_PAGE_SIZE + 1;
        let offset = (scrobble % RECENT_TRACKS_PAGE_SIZE) as usize;
        debug!("{user} position {index} is page {page} offset {offset}");

        Ok(self
            .service
            .recent_tracks(user, RECENT_TRACKS_PAGE_SIZE, page)?
            .into_iter()
            .filter(|track| !track.now_playing)
            .nth(offset))
    }

    fn plays(&self, nick: &str, user: Option<&str>) -> CommandResult {
        let user = self.store.resolve(nick, user)?;
        let info = self.service.user_info(&user)?;
        Ok(Some(Reply::channel(format::format_plays(&user, &info))))
    }

    fn compare(&self, nick: &str, user1: Option<&str>, user2: &str) -> CommandResult {
        let user1 = self.store.resolve(nick, user1)?;
        let comparison = self.service.compare_taste(&user1, user2)?;
        let percentage = algorithm::taste_percentage(&comparison);
        Ok(Some(Reply::channel(format::format_compare(
            &user1,
            user2,
            percentage,
            &comparison,
        ))))
    }

    fn best_friend(&self, nick: &str, user: Option<&str>) -> CommandResult {
        let user = self.store.resolve(nick, user)?;
        let text = match algorithm::best_friend_of(&self.service, &user)? {
            Some(friend) => format::format_best_friend(&user, &friend),
            None => format::format_no_friends(&user),
        };
        Ok(Some(Reply::channel(text)))
    }

    fn hipster(&self, nick: &str, period: Option<&str>, user: Option<&str>) -> CommandResult {
        let period = match parse_period(period) {
            Ok(period) => period,
            Err(reply) => return Ok(Some(reply)),
        };
        let user = self.store.resolve(nick, user)?;

        let text = match algorithm::user_hipster_score(&self.service, &self.chart, &user, period)? {
            Some(score) => format::format_hipster(&user, score),
            None => format::format_hipster_insufficient(&user),
        };
        Ok(Some(Reply::channel(text)))
    }

    fn hipster_battle(&self, period: Option<&str>, users: &[String]) -> CommandResult {
        let period = match parse_period(period) {
            Ok(period) => period,
            Err(reply) => return Ok(Some(reply)),
        };

        let mut scores = Vec::with_capacity(users.len());
        for user in users {
            match algorithm::user_hipster_score(&self.service, &self.chart, user, period)? {
                Some(score) => scores.push((user.clone(), score)),
                None => debug!("{user} sits out the battle: no plays for {period}"),
            }
        }

        let text = match algorithm::battle_winner(&scores) {
            Some((winner, score)) => format::format_battle_winner(winner, score),
            None => format::format_battle_no_contestants(),
        };
        Ok(Some(Reply::channel(text)))
    }

    fn top(&self, nick: &str, kind: TopKind, period: Option<&str>, user: Option<&str>) -> CommandResult {
        let period = match parse_period(period) {
            Ok(period) => period,
            Err(reply) => return Ok(Some(reply)),
        };
        let user = self.store.resolve(nick, user)?;

        let text = match kind {
            TopKind::Artist => self
                .service
                .top_artists(&user, period, Some(1))?
                .first()
                .map(|artist| format::format_top_artist(&user, artist)),
            TopKind::Album => self
                .service
                .top_albums(&user, period, Some(1))?
                .first()
                .map(|album| format::format_top_album(&user, album)),
            TopKind::Track => self
                .service
                .top_tracks(&user, period, Some(1))?
                .first()
                .map(|track| format::format_top_track(&user, track)),
        }
        .unwrap_or_else(|| format::format_no_top(&user, kind.noun(), period));

        Ok(Some(Reply::channel(text)))
    }
}

/// Period from the raw flag, or the reply explaining why it is invalid.
fn parse_period(raw: Option<&str>) -> Result<Period, Reply> {
    match raw {
        None => Ok(Period::default()),
        Some(raw) => raw
            .parse()
            .map_err(|_| Reply::channel(format::format_unknown_period(raw))),
    }
}

fn help(command: Option<&str>) -> Option<Reply> {
    match command {
        None => {
            let names: Vec<&str> = HELP.iter().map(|(name, _)| *name).collect();
            Some(Reply::direct(format::format_help_list(&names)))
        }
        Some(command) => HELP
            .iter()
            .find(|(name, _)| *name == command)
            .map(|(name, usage)| Reply::direct(format::format_help_usage(name, usage))),
    }
}
