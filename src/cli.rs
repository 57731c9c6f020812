//! # Command-Line Interface Module
//!
//! Clap definitions for the `lastirc` binary.
//!
//! ## Commands
//!
//! - `run`: Connect to IRC and answer commands (the default)
//! - `exec`: Run a single chat command locally and print the replies
//! - `assoc`: Inspect or edit the nick association table offline
//! - `completion`: Print a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! lastirc --config /etc/lastirc.toml run
//! lastirc exec --nick alice '!hipster -7day'
//! lastirc assoc set alice alice_fm
//! ```

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "lastirc")]
#[command(about = "lastirc: Last.fm statistics for your IRC channel")]
#[command(version)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "LASTIRC_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// The subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the configured IRC server and serve commands
    ///
    /// Reconnects after the connection drops, waiting a little longer after
    /// each consecutive failure.
    Run,

    /// Run one chat command as if it was said in a channel
    ///
    /// Uses the real Last.fm API and identity store; replies are printed to
    /// stdout instead of being sent to IRC.
    Exec {
        /// Nick the command is sent as
        #[arg(short, long)]
        nick: String,

        /// Command text including the prefix, e.g. `!last -2`
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Manage nick to Last.fm account associations
    Assoc {
        #[command(subcommand)]
        action: AssocAction,
    },

    /// Generate shell completions
    ///
    /// Usage: lastirc completion bash > ~/.local/share/bash-completion/completions/lastirc
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum AssocAction {
    /// Associate a nick with a Last.fm username
    Set { nick: String, username: String },
    /// Show the username associated with a nick
    Get { nick: String },
    /// Forget the association for a nick
    Remove { nick: String },
    /// List every association
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_run_is_optional() {
        let args = Args::try_parse_from(["lastirc"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_exec_joins_words() {
        let args = Args::try_parse_from(["lastirc", "exec", "--nick", "alice", "!compare", "bob"]).unwrap();
        match args.command {
            Some(Command::Exec { nick, text }) => {
                assert_eq!(nick, "alice");
                assert_eq!(text.join(" "), "!compare bob");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_assoc_set() {
        let args = Args::try_parse_from(["lastirc", "-c", "x.toml", "assoc", "set", "alice", "rj"]).unwrap();
        assert_eq!(args.config, PathBuf::from("x.toml"));
        assert!(matches!(
            args.command,
            Some(Command::Assoc { action: AssocAction::Set { .. } })
        ));
    }

    #[test]
    fn test_completion_shell() {
        let args = Args::try_parse_from(["lastirc", "completion", "zsh"]).unwrap();
        assert!(matches!(args.command, Some(Command::Completion { shell: Shell::Zsh })));
        assert!(Args::try_parse_from(["lastirc", "completion", "tcsh"]).is_err());
    }
}
