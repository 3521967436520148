//! Confirmation prompts: interactive on a terminal, auto-accepting otherwise.

use std::sync::Arc;

use dialoguer::Confirm;
use is_terminal::IsTerminal;
use tracing::info;

use crate::contract::Prompt;
use crate::error::{PackageError, Result};

/// Environment variable that forces non-interactive mode.
pub const NON_INTERACTIVE_ENV: &str = "VSIXPACK_NON_INTERACTIVE";

/// Asks on the terminal; defaults to "no".
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()
            .map_err(|e| PackageError::processor(format!("confirmation prompt failed: {e}")))
    }
}

/// Answers "yes" to everything.
#[derive(Debug, Default)]
pub struct AutoConfirm;

impl Prompt for AutoConfirm {
    fn confirm(&self, question: &str) -> Result<bool> {
        info!(question, "Auto-confirming in non-interactive mode");
        Ok(true)
    }
}

/// Picks the prompt for this process: auto-confirm when requested, when
/// [`NON_INTERACTIVE_ENV`] is set, or when stdout is not a terminal.
pub fn default_prompt(non_interactive: bool) -> Arc<dyn Prompt> {
    let forced = non_interactive || std::env::var_os(NON_INTERACTIVE_ENV).is_some();
    if forced || !std::io::stdout().is_terminal() {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(TerminalPrompt)
    }
}
