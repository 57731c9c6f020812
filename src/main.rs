//! # lastirc - Last.fm statistics for IRC
//!
//! Sits in IRC channels and answers commands such as `!last`, `!compare` and
//! `!hipster` with data from Last.fm.
//!
//! ## Usage
//!
//! ```bash
//! # Serve the channels listed in lastirc.toml
//! lastirc run
//!
//! # Try a command without connecting to IRC
//! lastirc exec --nick alice '!topartist -7day'
//!
//! # Edit associations offline
//! lastirc assoc set alice alice_fm
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{error, info};
use std::time::Duration;

use lastirc::cli::{self, AssocAction};
use lastirc::config::Config;
use lastirc::db::IdentityStore;
use lastirc::irc::{IrcSession, SessionConfig};
use lastirc::lastfm_client::LastFmClient;
use lastirc::router::{IncomingMessage, Router};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=info lastirc run` - Commands and connection events
/// - `RUST_LOG=lastirc::lastfm_client=trace lastirc run` - Raw API traffic
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command.unwrap_or(cli::Command::Run) {
        cli::Command::Run => {
            let config = Config::load(&args.config)?;
            let mut router = build_router(&config)?;
            serve(&config, &mut router);
        }
        cli::Command::Exec { nick, text } => {
            let config = Config::load(&args.config)?;
            let mut router = build_router(&config)?;

            let message = IncomingMessage {
                nick,
                channel: "#lastirc".to_string(),
                text: text.join(" "),
            };
            let replies = router.handle(&message);
            if replies.is_empty() {
                eprintln!("No reply (unknown command or missing prefix '{}')", router.prefix());
            }
            for reply in replies {
                println!("{}", reply.text);
            }
        }
        cli::Command::Assoc { action } => {
            let config = Config::load(&args.config)?;
            let mut store = IdentityStore::open(&config.store_path()?)?;
            run_assoc(&mut store, action)?;
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}

fn build_router(config: &Config) -> Result<Router<LastFmClient>> {
    let store_path = config.store_path()?;
    info!("Using identity store {}", store_path.display());
    let store = IdentityStore::open(&store_path)?;

    let client = LastFmClient::new(&config.lastfm.token)
        .context("Failed to build Last.fm client")?
        .with_chart_limit(config.lastfm.chart_limit);

    Ok(Router::new(client, store, config.irc.prefix.clone()))
}

/// Keep a session alive forever, backing off between failed connections.
fn serve(config: &Config, router: &mut Router<LastFmClient>) {
    let mut delay = INITIAL_RECONNECT_DELAY;

    loop {
        let session_config = SessionConfig {
            nick: config.irc.nick.clone(),
            channels: config.irc.channels.clone(),
        };

        match IrcSession::connect(&config.irc.server, config.irc.port, session_config) {
            Ok(mut session) => {
                delay = INITIAL_RECONNECT_DELAY;
                if let Err(e) = session.run(router) {
                    error!("IRC session ended: {e:#}");
                }
            }
            Err(e) => error!("{e:#}"),
        }

        info!("Reconnecting in {}s", delay.as_secs());
        std::thread::sleep(delay);
        delay = (delay * 2).min(MAX_RECONNECT_DELAY);
    }
}

fn run_assoc(store: &mut IdentityStore, action: AssocAction) -> Result<()> {
    match action {
        AssocAction::Set { nick, username } => {
            store.set(&nick, &username)?;
            println!("{nick} -> {username}");
        }
        AssocAction::Get { nick } => match store.get(&nick)? {
            Some(username) => println!("{nick} -> {username}"),
            None => println!("{nick} is not associated"),
        },
        AssocAction::Remove { nick } => {
            if store.remove(&nick)? {
                println!("Removed association for {nick}");
            } else {
                println!("{nick} was not associated");
            }
        }
        AssocAction::List => {
            for (nick, username) in store.list()? {
                println!("{nick} -> {username}");
            }
        }
    }
    Ok(())
}
