//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file instead of searching
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--yes` / `-y`: Accept every confirmation
//! - `--no-interactive`: Decline every confirmation
//! - `--dry-run`: Work on an in-memory copy of a file store

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

/// refsync - keep two-way document references consistent
#[derive(Parser, Debug)]
#[command(name = "refsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the standard locations
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Accept every confirmation
    #[arg(short = 'y', long, global = true, conflicts_with = "no_interactive")]
    pub yes: bool,

    /// Disable interactive prompts; every confirmation is declined
    #[arg(long, global = true)]
    pub no_interactive: bool,

    /// Apply changes to an in-memory copy of a file store
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Determine if interactive mode is enabled.
    ///
    /// Returns false when `--no-interactive` or `--quiet` was set, when the
    /// config disables it, or when stdin is not a terminal.
    pub fn interactive(&self, config_default: bool) -> bool {
        if self.no_interactive || self.quiet {
            false
        } else {
            config_default && std::io::stdin().is_terminal()
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report missing and stale reciprocal references without changing anything
    #[command(
        name = "check",
        long_about = "Report missing and stale reciprocal references.\n\n\
            For every relationship declared for the document's type, lists the \
            targets that do not point back at the document and the documents \
            that point at it without being listed. Nothing is written.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Check an artist before publishing
    refsync check artist-1

    # Check against a specific dataset config
    refsync --config staging.toml check event-7"
    )]
    Check {
        /// Document id (with or without the drafts. prefix)
        id: String,
    },

    /// Publish a draft and reconcile its reciprocal references
    #[command(
        name = "publish",
        long_about = "Publish a draft and reconcile its reciprocal references.\n\n\
            Checks for targets missing a back-reference, syncs derived fields, \
            publishes, then offers to add missing references, remove stale \
            ones and add a first-time document to its listing page. Every \
            repair asks for confirmation.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Publish, answering each prompt
    refsync publish event-7

    # Publish and accept every repair
    refsync publish event-7 --yes

    # Try it against a copy of the dataset
    refsync publish event-7 --yes --dry-run"
    )]
    Publish {
        /// Document id (with or without the drafts. prefix)
        id: String,
    },

    /// Delete a document after removing references to it
    #[command(
        name = "delete",
        long_about = "Delete a document after removing references to it.\n\n\
            Lists every document that references this one, asks for \
            confirmation, strips the references, then deletes both the draft \
            and published revisions.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Delete an artist and unlink it from its events
    refsync delete artist-1"
    )]
    Delete {
        /// Document id (with or without the drafts. prefix)
        id: String,
    },

    /// Show which actions are available for a document
    #[command(name = "actions")]
    Actions {
        /// Document id (with or without the drafts. prefix)
        id: String,
    },

    /// Inspect or create configuration
    #[command(
        name = "config",
        after_help = "\
WORKFLOW EXAMPLES:
    # Show the configuration in effect
    refsync config show

    # Check a config file
    refsync --config refsync.toml config validate

    # Write a starter config with the built-in registry
    refsync config init"
    )]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.\n\n\
            Outputs a completion script for the specified shell. Add the output \
            to your shell's configuration to enable tab-completion for refsync commands.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    refsync completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    refsync completion zsh >> ~/.zshrc

    # Fish
    refsync completion fish > ~/.config/fish/completions/refsync.fish

    # PowerShell
    refsync completion powershell >> $PROFILE"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration in effect as TOML
    Show,
    /// Load and validate the configuration
    Validate,
    /// Write a starter config file holding the built-in registry
    Init {
        /// Where to write it
        #[arg(default_value = "refsync.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Shells supported by `completion`.
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["refsync", "publish", "event-1", "--yes", "--dry-run"])
            .unwrap();
        assert!(cli.yes);
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Command::Publish { ref id } if id == "event-1"));
    }

    #[test]
    fn yes_conflicts_with_no_interactive() {
        assert!(Cli::try_parse_from(["refsync", "--yes", "--no-interactive", "check", "a"]).is_err());
    }

    #[test]
    fn quiet_disables_interaction() {
        let cli = Cli::try_parse_from(["refsync", "-q", "check", "a"]).unwrap();
        assert!(!cli.interactive(true));
    }

    #[test]
    fn config_init_defaults_to_local_file() {
        let cli = Cli::try_parse_from(["refsync", "config", "init"]).unwrap();
        match cli.command {
            Command::Config {
                action: ConfigAction::Init { path, force },
            } => {
                assert_eq!(path, PathBuf::from("refsync.toml"));
                assert!(!force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
