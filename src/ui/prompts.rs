//! ui::prompts
//!
//! The interactive confirmation boundary.
//!
//! # Design
//!
//! Workflows ask for a decision through the [`Confirmer`] trait and suspend
//! until it answers. There is no timeout. Closing a prompt, failing to read
//! an answer, or running without a terminal all count as a decline, so a
//! workflow always moves on to its next step.
//!
//! Implementations:
//! - [`TerminalConfirmer`]: `[y/N]` on stdin
//! - [`AutoConfirmer`]: fixed answer for `--yes` and non-interactive runs
//! - [`ScriptedConfirmer`]: queued answers that records every prompt

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(String),
}

/// A question put to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub header: String,
    pub body: String,
    /// Labels of the affected documents.
    pub items: Vec<String>,
    pub accept_label: String,
    pub decline_label: String,
}

impl Confirmation {
    pub fn new(header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
            items: Vec::new(),
            accept_label: "Yes".into(),
            decline_label: "No".into(),
        }
    }

    pub fn with_items(mut self, items: Vec<String>) -> Self {
        self.items = items;
        self
    }

    pub fn with_labels(mut self, accept: impl Into<String>, decline: impl Into<String>) -> Self {
        self.accept_label = accept.into();
        self.decline_label = decline.into();
        self
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        if !self.body.is_empty() {
            writeln!(f, "{}", self.body)?;
        }
        for item in &self.items {
            writeln!(f, "  - {}", item)?;
        }
        Ok(())
    }
}

/// Something that can answer a [`Confirmation`].
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask for a decision.
    ///
    /// `Ok(true)` accepts. `Ok(false)` and any error decline.
    async fn confirm(&self, confirmation: &Confirmation) -> Result<bool, PromptError>;
}

/// Asks on the terminal, defaulting to no.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirmer {
    interactive: bool,
}

impl TerminalConfirmer {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, confirmation: &Confirmation) -> Result<bool, PromptError> {
        if !self.interactive {
            return Err(PromptError::NotInteractive);
        }

        let prompt = format!("{}{}? [y/N] ", confirmation, confirmation.accept_label);
        tokio::task::spawn_blocking(move || read_answer(&prompt))
            .await
            .map_err(|e| PromptError::IoError(e.to_string()))?
    }
}

fn read_answer(prompt: &str) -> Result<bool, PromptError> {
    let mut stdout = io::stdout();
    stdout
        .write_all(prompt.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|e| PromptError::IoError(format!("Failed to flush stdout: {}", e)))?;

    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|e| PromptError::IoError(format!("Failed to read input: {}", e)))?;
    if read == 0 {
        return Err(PromptError::Cancelled);
    }

    let answer = input.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Gives the same answer to every prompt.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirmer {
    pub answer: bool,
}

#[async_trait]
impl Confirmer for AutoConfirmer {
    async fn confirm(&self, _confirmation: &Confirmation) -> Result<bool, PromptError> {
        Ok(self.answer)
    }
}

/// Answers from a queue and records every prompt it is shown.
///
/// A `None` answer closes the prompt. When the queue runs dry every further
/// prompt is closed.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<Option<bool>>>,
    seen: Mutex<Vec<Confirmation>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = Option<bool>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Accept every prompt up to `count`.
    pub fn accepting(count: usize) -> Self {
        Self::new(std::iter::repeat(Some(true)).take(count))
    }

    /// Every prompt shown so far, in order.
    pub fn prompts(&self) -> Vec<Confirmation> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Headers of every prompt shown so far.
    pub fn headers(&self) -> Vec<String> {
        self.prompts().into_iter().map(|c| c.header).collect()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, confirmation: &Confirmation) -> Result<bool, PromptError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(confirmation.clone());
        let next = self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .flatten();
        next.ok_or(PromptError::Cancelled)
    }
}
