//! # IRC Transport
//!
//! Just enough of RFC 1459 to sit in a few channels and answer commands:
//! registration, `PING`, joining after the welcome numeric, `PRIVMSG` in and
//! out, and the usual CTCP `VERSION`/`TIME`/`PING` answers.
//!
//! The session is generic over its reader and writer so the event loop can be
//! driven from memory in tests.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{debug, info, trace, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use crate::format::{Reply, ReplyMode};
use crate::lastfm_client::MusicService;
use crate::router::{IncomingMessage, Router};

const CTCP_DELIM: char = '\u{1}';

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    /// Source of the line (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcLine {
    /// Nick part of the prefix, if the line came from a user.
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|prefix| prefix.split('!').next().unwrap_or(prefix))
    }
}

/// Parse one line without its trailing CRLF.
pub fn parse_line(line: &str) -> Option<IrcLine> {
    let mut rest = line.trim_end_matches(['\r', '\n']);
    if rest.is_empty() {
        return None;
    }

    let prefix = if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, tail) = stripped.split_once(' ')?;
        rest = tail;
        Some(prefix.to_string())
    } else {
        None
    };

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };

    let mut words = head.split(' ').filter(|w| !w.is_empty());
    let command = words.next()?.to_ascii_uppercase();
    let mut params: Vec<String> = words.map(str::to_string).collect();
    if let Some(trailing) = trailing {
        params.push(trailing.to_string());
    }

    Some(IrcLine {
        prefix,
        command,
        params,
    })
}

/// Target and text for a reply to `message`.
///
/// Private queries are answered privately. In a channel, direct replies are
/// addressed to the sender.
pub fn reply_target(own_nick: &str, message: &IncomingMessage, reply: &Reply) -> (String, String) {
    let text = reply.text.replace(['\r', '\n'], " ");

    if message.channel.eq_ignore_ascii_case(own_nick) {
        return (message.nick.clone(), text);
    }

    match reply.mode {
        ReplyMode::Direct => (message.channel.clone(), format!("{}: {text}", message.nick)),
        ReplyMode::Channel => (message.channel.clone(), text),
    }
}

/// Answer to a CTCP request body (without the delimiters), if supported.
pub fn ctcp_response(request: &str) -> Option<String> {
    let (command, argument) = request.split_once(' ').unwrap_or((request, ""));

    match command.to_ascii_uppercase().as_str() {
        "VERSION" => Some(format!("VERSION lastirc {}", env!("CARGO_PKG_VERSION"))),
        "TIME" => Some(format!("TIME {}", Utc::now().to_rfc2822())),
        "PING" => Some(format!("PING {argument}").trim_end().to_string()),
        _ => None,
    }
}

/// Connection-level settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub nick: String,
    pub channels: Vec<String>,
}

/// One IRC connection.
pub struct IrcSession<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    nick: String,
    channels: Vec<String>,
}

impl IrcSession<BufReader<TcpStream>, TcpStream> {
    /// Open a TCP connection to `server:port`.
    pub fn connect(server: &str, port: u16, config: SessionConfig) -> Result<Self> {
        info!("Connecting to {server}:{port} as {}", config.nick);
        let stream = TcpStream::connect((server, port))
            .with_context(|| format!("Failed to connect to IRC server {server}:{port}"))?;
        let reader = BufReader::new(
            stream
                .try_clone()
                .context("Failed to clone IRC socket for reading")?,
        );
        Ok(Self::new(reader, stream, config))
    }
}

impl<R: BufRead, W: Write> IrcSession<R, W> {
    pub fn new(reader: R, writer: W, config: SessionConfig) -> Self {
        Self {
            reader,
            writer,
            nick: config.nick,
            channels: config.channels,
        }
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    fn send(&mut self, line: &str) -> Result<()> {
        trace!(">> {line}");
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .and_then(|()| self.writer.flush())
            .context("Failed to write to IRC connection")
    }

    fn register(&mut self) -> Result<()> {
        let nick = self.nick.clone();
        self.send(&format!("NICK {nick}"))?;
        self.send(&format!("USER {nick} 0 * :lastirc Last.fm bot"))
    }

    /// Register and serve until the server closes the connection.
    ///
    /// Returns an error when the connection drops; the caller decides whether
    /// to reconnect.
    pub fn run<S: MusicService>(&mut self, router: &mut Router<S>) -> Result<()> {
        self.register()?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .context("Failed to read from IRC connection")?;
            if read == 0 {
                bail!("IRC server closed the connection");
            }

            trace!("<< {}", line.trim_end());
            if let Some(parsed) = parse_line(&line) {
                self.dispatch(&parsed, router)?;
            }
        }
    }

    fn dispatch<S: MusicService>(&mut self, line: &IrcLine, router: &mut Router<S>) -> Result<()> {
        match line.command.as_str() {
            "PING" => {
                let token = line.params.first().cloned().unwrap_or_default();
                self.send(&format!("PONG :{token}"))?;
            }
            "001" => {
                info!("Registered as {}", self.nick);
                for channel in self.channels.clone() {
                    self.send(&format!("JOIN {channel}"))?;
                }
            }
            "433" => {
                warn!("Nick {} is taken, trying {}_", self.nick, self.nick);
                self.nick.push('_');
                let nick = self.nick.clone();
                self.send(&format!("NICK {nick}"))?;
            }
            "PRIVMSG" => self.on_privmsg(line, router)?,
            other => debug!("Unhandled IRC command {other}"),
        }
        Ok(())
    }

    fn on_privmsg<S: MusicService>(&mut self, line: &IrcLine, router: &mut Router<S>) -> Result<()> {
        let (Some(nick), [target, text, ..]) = (line.source_nick(), line.params.as_slice()) else {
            return Ok(());
        };

        if let Some(request) = text
            .strip_prefix(CTCP_DELIM)
            .map(|t| t.trim_end_matches(CTCP_DELIM))
        {
            if let Some(response) = ctcp_response(request) {
                debug!("Answering CTCP {request} from {nick}");
                self.send(&format!("NOTICE {nick} :{CTCP_DELIM}{response}{CTCP_DELIM}"))?;
            }
            return Ok(());
        }

        let message = IncomingMessage {
            nick: nick.to_string(),
            channel: target.clone(),
            text: text.clone(),
        };

        for reply in router.handle(&message) {
            let (to, text) = reply_target(&self.nick, &message, &reply);
            self.send(&format!("PRIVMSG {to} :{text}"))?;
        }
        Ok(())
    }
}
