//! Access token acquisition and caching
//!
//! Tokens are cached as JSON on disk. When no usable cache exists the operator
//! is prompted for a token once, and the answer is saved for the next run.

use crate::utils::get_timestamp;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token file error: {0}")]
    Io(#[from] io::Error),
    #[error("token file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no token was entered")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    /// Milliseconds since the Unix epoch
    pub obtained_at: u64,
}

impl Token {
    pub fn new(access_token: &str) -> Self {
        Self {
            access_token: access_token.to_string(),
            obtained_at: get_timestamp(),
        }
    }
}

pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no token has been cached yet.
    pub fn load_cached(&self) -> Result<Option<Token>, AuthError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, token: &Token) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(token)?)?;
        Ok(())
    }
}

/// Prompts for a token and reads one line from `input`.
pub async fn request_interactive<R: AsyncBufRead + Unpin>(input: R) -> Result<Token, AuthError> {
    eprintln!("Paste an access token and press Enter:");

    let mut lines = input.lines();
    let line = lines.next_line().await?.unwrap_or_default();
    let access_token = line.trim();
    if access_token.is_empty() {
        return Err(AuthError::Empty);
    }

    Ok(Token::new(access_token))
}

/// Loads the cached token, falling back to the interactive prompt and caching its result.
pub async fn acquire_token<R: AsyncBufRead + Unpin>(
    store: &FileTokenStore,
    input: R,
) -> Result<Token, AuthError> {
    match store.load_cached() {
        Ok(Some(token)) => {
            info!("Loaded cached token from {}", store.path().display());
            return Ok(token);
        }
        Ok(None) => info!("No cached token at {}", store.path().display()),
        Err(e) => warn!("Ignoring unreadable token cache: {}", e),
    }

    let token = request_interactive(input).await?;
    store.save(&token)?;
    info!("Saved token to {}", store.path().display());
    Ok(token)
}
