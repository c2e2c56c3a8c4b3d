//! Where the sleep-time text comes from.

use crate::error::AppError;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PROMPT: &str =
    "Enter both sleep start and end time in format \"hour:minute[am|pm]\" (may be embedded in other text): ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOrigin {
    Clipboard,
    Prompt,
}

impl TextOrigin {
    /// How messages refer to the text.
    pub fn noun(self) -> &'static str {
        match self {
            TextOrigin::Clipboard => "clipboard",
            TextOrigin::Prompt => "input",
        }
    }

    /// Interactive input may take long enough for the hub to drop the session.
    pub fn is_interactive(self) -> bool {
        matches!(self, TextOrigin::Prompt)
    }
}

#[async_trait]
pub trait SleepTextSource: Send {
    fn origin(&self) -> TextOrigin;

    async fn read_text(&mut self) -> Result<String, AppError>;
}

/// Reads the system clipboard.
pub struct ClipboardSource;

#[async_trait]
impl SleepTextSource for ClipboardSource {
    fn origin(&self) -> TextOrigin {
        TextOrigin::Clipboard
    }

    async fn read_text(&mut self) -> Result<String, AppError> {
        tokio::task::spawn_blocking(|| arboard::Clipboard::new()?.get_text())
            .await
            .map_err(|e| AppError::Io(std::io::Error::other(e)))?
            .map_err(|e| AppError::Input(format!("Couldn't read the clipboard: {e}")))
    }
}

/// Asks on stdout and reads one line from stdin.
pub struct PromptSource;

#[async_trait]
impl SleepTextSource for PromptSource {
    fn origin(&self) -> TextOrigin {
        TextOrigin::Prompt
    }

    async fn read_text(&mut self) -> Result<String, AppError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
