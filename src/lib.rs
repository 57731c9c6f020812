//! IRC bot that answers Last.fm questions about channel members.
//!
//! Core modules:
//! - [`router`] - Command parsing and dispatch
//! - [`algorithm`] - Mainstream score, best friend and comparison aggregation
//! - [`db`] - Nick to Last.fm account associations
//! - [`format`] - Reply templates
//! - [`lastfm_client`] - Last.fm API gateway
//!
//! ### Supporting Modules
//!
//! - [`models`] - Values returned by the gateway
//! - [`irc`] - Minimal IRC transport
//! - [`config`] - TOML configuration and data directory defaults
//! - [`cli`] - Command-line interface definitions with clap integration
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use lastirc::db::IdentityStore;
//! use lastirc::lastfm_client::LastFmClient;
//! use lastirc::router::{IncomingMessage, Router};
//!
//! let store = IdentityStore::open(std::path::Path::new("associations.db"))?;
//! let client = LastFmClient::new("api key")?;
//! let mut router = Router::new(client, store, "!");
//!
//! let replies = router.handle(&IncomingMessage {
//!     nick: "alice".to_string(),
//!     channel: "#music".to_string(),
//!     text: "!hipster -7day".to_string(),
//! });
//! for reply in replies {
//!     println!("{}", reply.text);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Commands
//!
//! | Command | Reply |
//! |---|---|
//! | `assoc [user]` | Set or show your association |
//! | `assoc? [nick]` | Show someone's association |
//! | `last [-N] [user]` | Nth most recent scrobble |
//! | `plays [user]` | Total plays and registration date |
//! | `compare [user] user` | Tasteometer similarity |
//! | `bestfriend [user]` | Friend with the most similar taste |
//! | `hipster [-period] [user]` | Share of plays going to charting artists |
//! | `hipsterbattle [-period] users...` | Least mainstream user wins |
//! | `topartist`/`topalbum`/`toptrack [-period] [user]` | Most played entry |
//! | `help [command]` | Command list or usage |
//!
//! ## Error Handling
//!
//! Library functions return `anyhow::Result` except the gateway, which uses
//! [`lastfm_client::GatewayError`] so the router can tell Last.fm failures
//! apart and report them to the channel. A failing command never stops the bot.
//!
//! ## Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```

pub mod algorithm;
pub mod cli;
pub mod config;
pub mod db;
pub mod format;
pub mod irc;
pub mod lastfm_client;
pub mod models;
pub mod router;
