//! cli
//!
//! Command-line interface layer for refsync.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the tracing subscriber
//! - Load configuration and open the document store
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Reference checks and repairs live in
//! [`crate::sync`] and [`crate::workflow`]; handlers only resolve the
//! document, pick a confirmer and print the report.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::store::{create_store, DocumentStore, StoreKind};
use crate::ui::output::Verbosity;
use crate::ui::prompts::{AutoConfirmer, Confirmer, TerminalConfirmer};
use args::Command;

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub verbosity: Verbosity,
    /// Prompts may be shown
    pub interactive: bool,
    /// Accept every prompt without asking
    pub assume_yes: bool,
    pub dry_run: bool,
}

impl Context {
    /// Open the configured store.
    ///
    /// With `dry_run`, a file store is loaded into memory instead and never
    /// written back.
    pub fn store(&self) -> Result<Box<dyn DocumentStore>> {
        let mut settings = self.config.store();
        if self.dry_run {
            let kind = StoreKind::parse(settings.kind.as_deref().unwrap_or("file"))?;
            if kind == StoreKind::Http {
                bail!("--dry-run needs a file or memory store");
            }
            settings.kind = Some(StoreKind::Memory.as_str().to_string());
        }
        create_store(&settings).context("failed to open document store")
    }

    /// The confirmer implied by the flags.
    ///
    /// A non-interactive terminal confirmer refuses every prompt, which the
    /// workflows treat as a decline.
    pub fn confirmer(&self) -> Box<dyn Confirmer> {
        if self.assume_yes {
            Box::new(AutoConfirmer { answer: true })
        } else {
            Box::new(TerminalConfirmer::new(self.interactive))
        }
    }
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `--debug` selects debug level for this crate.
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("refsync=debug")
        } else {
            EnvFilter::new("refsync=warn")
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    // Completion needs neither config nor store.
    if let Command::Completion { shell } = cli.command {
        return commands::completion(shell);
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let ctx = Context {
        interactive: cli.interactive(config.interactive()),
        verbosity: Verbosity::from_flags(cli.quiet, cli.debug),
        assume_yes: cli.yes,
        dry_run: cli.dry_run,
        config,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(commands::dispatch(cli.command, &ctx))
}
