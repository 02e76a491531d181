//! systemd-boot loader.conf editing
//!
//! loader.conf is a list of `key value...` lines. Values may be quoted, so
//! every line is tokenized with shell-word rules. Editing touches only the
//! line that carries the key; all other lines are written back exactly as
//! they were read, except blank lines which are dropped.

use crate::record::write_atomic;
use crate::{ConfigError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of setting a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The key's line was rewritten
    Updated,
    /// No line declares the key; nothing was changed
    KeyMissing,
}

/// Menu editor access, written as `editor 1` / `editor 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Enable,
    Disable,
}

impl EditorMode {
    /// Value written to loader.conf
    pub fn as_value(self) -> &'static str {
        match self {
            EditorMode::Enable => "1",
            EditorMode::Disable => "0",
        }
    }
}

impl fmt::Display for EditorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorMode::Enable => write!(f, "enabled"),
            EditorMode::Disable => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    raw: String,
    /// `None` for comments and lines that do not tokenize
    tokens: Option<Vec<String>>,
    /// Trailing `# ...` text, kept when the line is rewritten
    comment: Option<String>,
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('#') {
            return Self {
                raw: raw.to_string(),
                tokens: None,
                comment: None,
            };
        }

        let (head, comment) = match comment_start(raw) {
            Some(at) => (&raw[..at], Some(raw[at..].to_string())),
            None => (raw, None),
        };
        let tokens = shlex::split(head);
        if tokens.is_none() {
            warn!(line = raw, "Keeping loader.conf line that does not tokenize");
        }

        Self {
            raw: raw.to_string(),
            tokens,
            comment,
        }
    }

    fn is_blank(&self) -> bool {
        matches!(&self.tokens, Some(tokens) if tokens.is_empty())
    }

    fn key(&self) -> Option<&str> {
        self.tokens.as_ref()?.first().map(String::as_str)
    }

    fn value(&self) -> Option<&str> {
        self.tokens.as_ref()?.get(1).map(String::as_str)
    }

    fn set_value(&mut self, value: &str) {
        if let Some(tokens) = self.tokens.as_mut() {
            if tokens.len() > 1 {
                tokens[1] = value.to_string();
            } else {
                tokens.push(value.to_string());
            }
            self.raw = match &self.comment {
                Some(comment) => format!("{} {}", join_tokens(tokens), comment),
                None => join_tokens(tokens),
            };
        }
    }
}

/// Byte offset of a `#` that starts a word outside of quotes
fn comment_start(raw: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut word_start = true;

    for (at, c) in raw.char_indices() {
        if escaped {
            escaped = false;
            word_start = false;
            continue;
        }
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => escaped = true,
            Some(_) => {}
            None => match c {
                '\\' => escaped = true,
                '\'' | '"' => quote = Some(c),
                '#' if word_start => return Some(at),
                _ => {}
            },
        }
        word_start = quote.is_none() && c.is_whitespace();
    }
    None
}

/// systemd-boot only understands double quotes
fn quote_token(token: &str) -> String {
    let plain = !token.is_empty()
        && !token.starts_with('#')
        && !token
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if plain {
        token.to_string()
    } else {
        format!("\"{}\"", token.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn join_tokens(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| quote_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// An in-memory loader.conf
#[derive(Debug, Clone)]
pub struct LoaderConf {
    path: PathBuf,
    lines: Vec<Line>,
}

impl LoaderConf {
    /// Read and tokenize a loader.conf
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Ok(Self::parse(path, &content))
    }

    /// Tokenize loader.conf content that will be saved to `path`
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            lines: content.split('\n').map(Line::parse).collect(),
        }
    }

    /// Value of the last line declaring `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .find(|line| line.key() == Some(key))
            .and_then(Line::value)
    }

    /// Replace the value of `key`.
    ///
    /// Lines are scanned from the end, so when a key is declared twice the
    /// declaration systemd-boot actually honours is the one changed. A key
    /// that no line declares is left unset.
    pub fn set(&mut self, key: &str, value: &str) -> SetOutcome {
        match self
            .lines
            .iter_mut()
            .rev()
            .find(|line| line.key() == Some(key))
        {
            Some(line) => {
                line.set_value(value);
                debug!(key, value, "Updated loader.conf key");
                SetOutcome::Updated
            }
            None => SetOutcome::KeyMissing,
        }
    }

    /// Set `key`, adding a new line at the end when it is not declared
    pub fn upsert(&mut self, key: &str, value: &str) {
        if self.set(key, value) == SetOutcome::KeyMissing {
            let tokens = vec![key.to_string(), value.to_string()];
            self.lines.push(Line {
                raw: join_tokens(&tokens),
                tokens: Some(tokens),
                comment: None,
            });
        }
    }

    /// Serialize, dropping blank lines
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .filter(|line| !line.is_blank())
            .map(|line| line.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write back to the file this was loaded from
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.path)
    }

    /// Write to another location
    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.render())
    }
}

/// Set `key` to `value` in the loader.conf at `path`.
///
/// The file is only rewritten when the key exists.
pub fn set_key(path: &Path, key: &str, value: &str) -> Result<SetOutcome> {
    let mut conf = LoaderConf::load(path)?;
    let outcome = conf.set(key, value);
    if outcome == SetOutcome::Updated {
        conf.save()?;
    } else {
        warn!(path = %path.display(), key, "Key not declared, leaving file unchanged");
    }
    Ok(outcome)
}

/// Validate a menu timeout: a non-negative decimal integer of any length.
///
/// Returns the canonical form written to loader.conf, without leading zeros.
pub fn parse_timeout(raw: &str) -> Result<String> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::Validation(format!(
            "timeout must be a non-negative integer, got '{}'",
            raw
        )));
    }
    let digits = raw.trim_start_matches('0');
    Ok(if digits.is_empty() { "0" } else { digits }.to_string())
}

/// Validate and write the menu timeout
pub fn set_timeout(path: &Path, raw: &str) -> Result<SetOutcome> {
    let seconds = parse_timeout(raw)?;
    set_key(path, "timeout", &seconds)
}

/// Write the editor flag
pub fn set_editor(path: &Path, mode: EditorMode) -> Result<SetOutcome> {
    set_key(path, "editor", mode.as_value())
}
